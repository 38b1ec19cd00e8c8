//! Farming domain — soil grid, tilling, watering, planting, growth, harvest.
//!
//! Communicates with other domains through crate::shared events/resources.
//! `SoilGrid` is the single owner of cell state; sprites are rebuilt from it
//! in PostUpdate.

use std::collections::HashMap;

use bevy::prelude::*;

use crate::data::FarmMap;
use crate::shared::*;

pub mod autotile;
pub mod codec;
pub mod grid;
pub mod plants;
pub mod render;
pub mod soil;

pub use autotile::{resolve_tile_variant, SoilTileVariant};
pub use codec::{GridCodec, RawValue};
pub use grid::{CellTags, Grid, GridPos};
pub use plants::{Plant, PlantRegistry};
pub use soil::SoilGrid;

/// Sprite entities keyed by grid position.
#[derive(Resource, Default, Debug)]
pub struct FarmEntities {
    pub soil: HashMap<GridPos, Entity>,
    pub water: HashMap<GridPos, Entity>,
    pub plants: HashMap<GridPos, Entity>,
}

pub struct FarmingPlugin;

impl Plugin for FarmingPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SoilGrid>()
            .init_resource::<FarmEntities>()
            .add_systems(OnExit(GameState::Loading), setup_soil)
            .add_systems(
                Update,
                (
                    soil::handle_tool_use,
                    soil::handle_plant_seed,
                    soil::on_day_end,
                )
                    .run_if(in_state(GameState::Playing)),
            )
            // Visual sync — runs after all state mutations
            .add_systems(
                PostUpdate,
                (
                    render::sync_soil_tiles,
                    render::sync_water_overlays,
                    render::sync_plants,
                    render::spawn_harvest_particles,
                    render::tick_harvest_particles,
                )
                    .run_if(in_state(GameState::Playing)),
            );
    }
}

/// Builds the soil grid from the map's farmable layer.
pub fn setup_soil(mut commands: Commands, map: Res<FarmMap>) {
    let grid = map.farmable_grid();
    info!(
        "Soil grid ready: {}x{} cells",
        grid.width(),
        grid.height()
    );
    commands.insert_resource(SoilGrid::new(grid));
}
