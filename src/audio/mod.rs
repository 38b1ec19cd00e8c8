//! One-shot sound effects requested by other domains through `PlaySfxEvent`.

use bevy::prelude::*;

use crate::shared::*;

/// Maps SFX IDs to audio file paths.
fn sfx_path(sfx_id: &str) -> Option<&'static str> {
    match sfx_id {
        "hoe" => Some("audio/hoe.ogg"),
        "water" => Some("audio/water.ogg"),
        "plant" => Some("audio/plant.ogg"),
        "axe" => Some("audio/axe.ogg"),
        "success" => Some("audio/success.ogg"),
        _ => None,
    }
}

pub fn handle_play_sfx(
    mut events: EventReader<PlaySfxEvent>,
    mut commands: Commands,
    asset_server: Res<AssetServer>,
) {
    for event in events.read() {
        match sfx_path(&event.sfx_id) {
            Some(path) => {
                commands.spawn((
                    AudioPlayer::new(asset_server.load(path)),
                    PlaybackSettings::DESPAWN,
                ));
            }
            None => debug!("No sound for sfx id {:?}", event.sfx_id),
        }
    }
}

pub struct AudioFxPlugin;

impl Plugin for AudioFxPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, handle_play_sfx);
    }
}
