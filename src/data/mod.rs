//! Data layer — the static farm map definition.
//!
//! Runs in OnEnter(GameState::Loading): reads `assets/maps/farm.ron` when it
//! exists, otherwise uses the built-in layout, then moves on to Playing.
//! A `FarmMap` inserted before startup (tests do this) is left untouched.

use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::farming::{CellTags, Grid, GridPos};
use crate::shared::*;

pub const FARM_MAP_PATH: &str = "assets/maps/farm.ron";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeSize {
    Small,
    Large,
}

impl TreeSize {
    /// Sprite size in map pixels.
    pub fn size(self) -> Vec2 {
        match self {
            TreeSize::Small => Vec2::new(96.0, 128.0),
            TreeSize::Large => Vec2::new(128.0, 160.0),
        }
    }

    /// Where fruit can hang, relative to the tree's top-left corner.
    pub fn fruit_anchors(self) -> &'static [(i32, i32)] {
        match self {
            TreeSize::Small => &[(18, 17), (30, 37), (12, 50), (30, 45), (20, 30), (30, 10)],
            TreeSize::Large => &[(30, 24), (60, 65), (50, 50), (16, 40), (45, 50), (42, 70)],
        }
    }
}

/// One tree placement. `x`/`y` is the top-left corner in map pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeSpawn {
    pub size: TreeSize,
    pub x: i32,
    pub y: i32,
}

/// Static farm map: farmable layer bounds and tiles, trees, player start, bed.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmMap {
    /// Farmable layer size in tiles.
    pub width: usize,
    pub height: usize,
    /// Farmable tiles as (x, y).
    pub farmable: Vec<(usize, usize)>,
    pub trees: Vec<TreeSpawn>,
    pub player_start: (f32, f32),
    /// Bed interaction area as (x, y, width, height) in map pixels.
    pub bed: (f32, f32, f32, f32),
}

impl Default for FarmMap {
    fn default() -> Self {
        let mut farmable = Vec::new();
        for y in 8..16 {
            for x in 10..22 {
                farmable.push((x, y));
            }
        }
        for y in 18..22 {
            for x in 24..30 {
                farmable.push((x, y));
            }
        }

        let trees = vec![
            TreeSpawn { size: TreeSize::Small, x: 256, y: 320 },
            TreeSpawn { size: TreeSize::Large, x: 448, y: 1152 },
            TreeSpawn { size: TreeSize::Small, x: 1600, y: 384 },
            TreeSpawn { size: TreeSize::Large, x: 2048, y: 640 },
            TreeSpawn { size: TreeSize::Small, x: 1344, y: 1536 },
        ];

        Self {
            width: 40,
            height: 30,
            farmable,
            trees,
            player_start: (1000.0, 1200.0),
            bed: (192.0, 1536.0, 128.0, 96.0),
        }
    }
}

impl FarmMap {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(ron::from_str(&text)?)
    }

    /// Fresh soil grid: Farmable on every farmable tile inside the bounds.
    pub fn farmable_grid(&self) -> Grid {
        let mut grid = Grid::new(self.height, self.width);
        for &(x, y) in &self.farmable {
            match grid.get_mut(GridPos::new(x, y)) {
                Some(cell) => cell.insert(CellTags::FARMABLE),
                None => warn!("Farmable tile ({x}, {y}) lies outside the {}x{} map", self.width, self.height),
            }
        }
        grid
    }

    pub fn player_start(&self) -> Vec2 {
        Vec2::new(self.player_start.0, self.player_start.1)
    }

    pub fn bed_rect(&self) -> Rect {
        let (x, y, w, h) = self.bed;
        Rect::new(x, y, x + w, y + h)
    }
}

pub struct DataPlugin;

impl Plugin for DataPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(OnEnter(GameState::Loading), load_farm_map);
    }
}

fn load_farm_map(
    mut commands: Commands,
    existing: Option<Res<FarmMap>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if existing.is_none() {
        let path = Path::new(FARM_MAP_PATH);
        let map = if path.exists() {
            match FarmMap::load(path) {
                Ok(map) => {
                    info!("DataPlugin: loaded farm map from {}", path.display());
                    map
                }
                Err(e) => {
                    warn!("DataPlugin: {} is unreadable ({e}), using built-in map", path.display());
                    FarmMap::default()
                }
            }
        } else {
            FarmMap::default()
        };
        info!(
            "  Farm map: {}x{} tiles, {} farmable, {} trees",
            map.width,
            map.height,
            map.farmable.len(),
            map.trees.len()
        );
        commands.insert_resource(map);
    }

    next_state.set(GameState::Playing);
}
