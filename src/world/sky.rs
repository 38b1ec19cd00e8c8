//! Day-to-night tint.

use bevy::prelude::*;

use crate::shared::*;

/// Channel units per second the sky moves toward night.
pub const SKY_DARKEN_RATE: f32 = 2.0;

#[derive(Component, Debug)]
pub struct SkyOverlay;

/// Moves every channel above its night value down by `rate * dt`, never past it.
pub fn darken(sky: &mut SkyState, dt: f32) {
    for (channel, night) in sky.start_color.iter_mut().zip(SKY_NIGHT_COLOR) {
        if *channel > night {
            *channel = (*channel - SKY_DARKEN_RATE * dt).max(night);
        }
    }
}

/// How dark the overlay should be: 0 at full day white.
pub fn overlay_alpha(sky: &SkyState) -> f32 {
    let brightness = sky.start_color.iter().sum::<f32>() / (3.0 * 255.0);
    (1.0 - brightness).clamp(0.0, 1.0)
}

pub fn spawn_sky_overlay(mut commands: Commands) {
    commands.spawn((
        Node {
            position_type: PositionType::Absolute,
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            ..default()
        },
        BackgroundColor(Color::srgba(0.0, 0.0, 0.1, 0.0)),
        SkyOverlay,
    ));
}

pub fn advance_sky(time: Res<Time>, mut sky: ResMut<SkyState>) {
    darken(&mut sky, time.delta_secs());
}

pub fn apply_sky_overlay(sky: Res<SkyState>, mut overlays: Query<&mut BackgroundColor, With<SkyOverlay>>) {
    if !sky.is_changed() {
        return;
    }
    let alpha = overlay_alpha(&sky);
    for mut background in &mut overlays {
        background.0 = Color::srgba(0.0, 0.0, 0.1, alpha);
    }
}

pub fn reset_sky_on_day_end(mut day_end_events: EventReader<DayEndEvent>, mut sky: ResMut<SkyState>) {
    if day_end_events.read().count() > 0 {
        sky.start_color = SKY_DAY_COLOR;
    }
}
