use bevy::prelude::*;
use bevy::window::{PresentMode, WindowResolution};

use farming_island::shared::*;
use farming_island::{audio, auth, config, data, farming, player, save, world};

fn main() {
    App::new()
        .add_plugins(
            DefaultPlugins
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "Farming Island".into(),
                        resolution: WindowResolution::new(SCREEN_WIDTH, SCREEN_HEIGHT),
                        present_mode: PresentMode::AutoVsync,
                        resizable: true,
                        ..default()
                    }),
                    ..default()
                })
                .set(ImagePlugin::default_nearest()),
        )
        // Game state
        .init_state::<GameState>()
        // Shared resources
        .init_resource::<PlayerState>()
        .init_resource::<Weather>()
        .init_resource::<SkyState>()
        // Events
        .add_event::<ToolUseEvent>()
        .add_event::<PlantSeedEvent>()
        .add_event::<DayEndEvent>()
        .add_event::<CropHarvestedEvent>()
        .add_event::<ItemPickupEvent>()
        .add_event::<PlaySfxEvent>()
        // Settings and data loading
        .add_plugins(config::ConfigPlugin)
        .add_plugins(data::DataPlugin)
        // Domain plugins
        .add_plugins(auth::AuthPlugin)
        .add_plugins(player::PlayerPlugin)
        .add_plugins(farming::FarmingPlugin)
        .add_plugins(world::WorldPlugin)
        .add_plugins(audio::AudioFxPlugin)
        .add_plugins(save::SavePlugin)
        // Camera
        .add_systems(Startup, setup_camera)
        .run();
}

fn setup_camera(mut commands: Commands) {
    commands.spawn(Camera2d);
}
