//! World domain — trees and fruit, weather, the day cycle and the sky.
//!
//! Responsible for:
//! - Spawning map trees and their fruit
//! - Axe interaction with trees
//! - Turning a night's sleep into a DayEndEvent with freshly rolled weather
//! - Regrowing fruit and resetting the sky each morning

use bevy::prelude::*;
use rand::Rng;

use crate::shared::*;

pub mod sky;
pub mod trees;

pub use trees::{Fruit, Tree};

pub struct WorldPlugin;

impl Plugin for WorldPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            OnExit(GameState::Loading),
            (roll_initial_weather, trees::spawn_trees, sky::spawn_sky_overlay),
        )
        .add_systems(
            Update,
            (
                begin_new_day,
                trees::handle_axe,
                trees::regrow_fruit,
                sky::reset_sky_on_day_end,
                sky::advance_sky,
            )
                .chain()
                .run_if(in_state(GameState::Playing)),
        )
        .add_systems(PostUpdate, sky::apply_sky_overlay);
    }
}

/// Roughly a one-in-four chance of rain.
pub fn roll_rain(rng: &mut impl Rng) -> bool {
    rng.gen_range(0..=10) > 7
}

fn roll_initial_weather(mut weather: ResMut<Weather>) {
    weather.raining = roll_rain(&mut rand::thread_rng());
    info!("Weather: {}", if weather.raining { "rain" } else { "clear" });
}

/// A sleeping player ends the day: roll tomorrow's weather and announce it.
pub fn begin_new_day(
    mut player: ResMut<PlayerState>,
    mut weather: ResMut<Weather>,
    mut day_end_writer: EventWriter<DayEndEvent>,
) {
    if !player.sleeping {
        return;
    }
    player.sleeping = false;
    weather.raining = roll_rain(&mut rand::thread_rng());
    day_end_writer.send(DayEndEvent { raining: weather.raining });
    info!(
        "New day begins ({})",
        if weather.raining { "raining" } else { "clear" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_rain_is_the_minority() {
        let mut rng = StdRng::seed_from_u64(42);
        let rainy = (0..11_000).filter(|_| roll_rain(&mut rng)).count();
        // 3 of 11 outcomes.
        assert!(rainy > 2_500 && rainy < 3_500, "rainy days: {rainy}");
    }
}
