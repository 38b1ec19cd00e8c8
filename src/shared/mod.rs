//! Shared components, resources, events, and states for Farming Island.
//!
//! This is the type contract. Every domain plugin imports from here.
//! No domain imports from any other domain's systems directly.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ═══════════════════════════════════════════════════════════════════════
// GAME STATE — top-level state machine
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, States, Default)]
pub enum GameState {
    #[default]
    Loading,
    Playing,
    Paused,
}

// ═══════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════

/// Edge length of one map tile (and one soil cell) in map pixels.
pub const TILE_SIZE: f32 = 64.0;
pub const SCREEN_WIDTH: f32 = 1280.0;
pub const SCREEN_HEIGHT: f32 = 720.0;

pub const NUM_SAVE_SLOTS: u8 = 3;

/// Tool target offsets relative to the player centre, per facing.
pub const PLAYER_TOOL_OFFSET_LEFT: Vec2 = Vec2::new(-50.0, 40.0);
pub const PLAYER_TOOL_OFFSET_RIGHT: Vec2 = Vec2::new(50.0, 40.0);
pub const PLAYER_TOOL_OFFSET_UP: Vec2 = Vec2::new(0.0, -10.0);
pub const PLAYER_TOOL_OFFSET_DOWN: Vec2 = Vec2::new(0.0, 50.0);

/// Player collision box, already shrunk from the 192×192 character frame.
pub const PLAYER_HITBOX_SIZE: Vec2 = Vec2::new(66.0, 122.0);

// Render layers (z values). Map y grows downward; render flips it.
pub mod layers {
    pub const SOIL: f32 = 2.0;
    pub const SOIL_WATER: f32 = 3.0;
    pub const GROUND_PLANT: f32 = 5.0;
    pub const MAIN: f32 = 7.0;
    pub const FRUIT: f32 = 8.0;
}

/// Convert a map-pixel point (y down) into a Bevy world translation (y up).
pub fn map_to_world(point: Vec2, z: f32) -> Vec3 {
    Vec3::new(point.x, -point.y, z)
}

// ═══════════════════════════════════════════════════════════════════════
// ITEMS & CROPS
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropKind {
    Corn,
    Tomato,
}

impl CropKind {
    /// Age gained per growth tick while the plant's cell is watered.
    pub fn growth_rate(self) -> f32 {
        match self {
            CropKind::Corn => 1.0,
            CropKind::Tomato => 0.7,
        }
    }

    /// Number of frames in the crop's growth sprite strip.
    pub fn frame_count(self) -> usize {
        match self {
            CropKind::Corn => 4,
            CropKind::Tomato => 4,
        }
    }

    /// Vertical offset of the sprite relative to its soil cell.
    pub fn y_offset(self) -> f32 {
        match self {
            CropKind::Corn => -16.0,
            CropKind::Tomato => -8.0,
        }
    }

    pub fn harvest_item(self) -> ItemKind {
        match self {
            CropKind::Corn => ItemKind::Corn,
            CropKind::Tomato => ItemKind::Tomato,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            CropKind::Corn => "corn",
            CropKind::Tomato => "tomato",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Wood,
    Apple,
    Corn,
    Tomato,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    Hoe,
    Axe,
    WateringCan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Facing {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Facing {
    pub fn tool_offset(self) -> Vec2 {
        match self {
            Facing::Up => PLAYER_TOOL_OFFSET_UP,
            Facing::Down => PLAYER_TOOL_OFFSET_DOWN,
            Facing::Left => PLAYER_TOOL_OFFSET_LEFT,
            Facing::Right => PLAYER_TOOL_OFFSET_RIGHT,
        }
    }
}

/// One entry of the hotbar: tools first, then seeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotbarItem {
    Tool(ToolKind),
    Seed(CropKind),
}

pub const HOTBAR: [HotbarItem; 5] = [
    HotbarItem::Tool(ToolKind::Hoe),
    HotbarItem::Tool(ToolKind::Axe),
    HotbarItem::Tool(ToolKind::WateringCan),
    HotbarItem::Seed(CropKind::Corn),
    HotbarItem::Seed(CropKind::Tomato),
];

// ═══════════════════════════════════════════════════════════════════════
// PLAYER
// ═══════════════════════════════════════════════════════════════════════

#[derive(Component, Debug, Clone, Default)]
pub struct Player;

/// Player position, inventories and money. Position is in map pixels.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub position: Vec2,
    pub facing: Facing,
    pub items: BTreeMap<ItemKind, u32>,
    pub seeds: BTreeMap<CropKind, u32>,
    pub money: u32,
    pub selected: usize,
    pub sleeping: bool,
}

impl Default for PlayerState {
    fn default() -> Self {
        let items = [
            (ItemKind::Wood, 20),
            (ItemKind::Apple, 20),
            (ItemKind::Corn, 20),
            (ItemKind::Tomato, 20),
        ]
        .into_iter()
        .collect();
        let seeds = [(CropKind::Corn, 5), (CropKind::Tomato, 5)]
            .into_iter()
            .collect();

        Self {
            position: Vec2::ZERO,
            facing: Facing::Down,
            items,
            seeds,
            money: 200,
            selected: 0,
            sleeping: false,
        }
    }
}

impl PlayerState {
    pub fn add_item(&mut self, item: ItemKind, quantity: u32) {
        *self.items.entry(item).or_insert(0) += quantity;
    }

    pub fn item_count(&self, item: ItemKind) -> u32 {
        self.items.get(&item).copied().unwrap_or(0)
    }

    pub fn seed_count(&self, crop: CropKind) -> u32 {
        self.seeds.get(&crop).copied().unwrap_or(0)
    }

    /// Removes one seed; returns false if none were left.
    pub fn take_seed(&mut self, crop: CropKind) -> bool {
        match self.seeds.get_mut(&crop) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn hitbox(&self) -> Rect {
        Rect::from_center_size(self.position, PLAYER_HITBOX_SIZE)
    }

    pub fn tool_target(&self) -> Vec2 {
        self.position + self.facing.tool_offset()
    }

    pub fn selected_item(&self) -> HotbarItem {
        HOTBAR[self.selected % HOTBAR.len()]
    }
}

// ═══════════════════════════════════════════════════════════════════════
// WEATHER & SKY
// ═══════════════════════════════════════════════════════════════════════

#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Weather {
    pub raining: bool,
}

pub const SKY_DAY_COLOR: [f32; 3] = [255.0, 255.0, 255.0];
pub const SKY_NIGHT_COLOR: [f32; 3] = [38.0, 101.0, 189.0];

/// Day-to-night gradient. `start_color` drifts toward `SKY_NIGHT_COLOR`.
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct SkyState {
    pub start_color: [f32; 3],
}

impl Default for SkyState {
    fn default() -> Self {
        Self {
            start_color: SKY_DAY_COLOR,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════

/// The player swung a tool at a map-pixel point.
#[derive(Event, Debug, Clone)]
pub struct ToolUseEvent {
    pub tool: ToolKind,
    pub target: Vec2,
}

/// The player used a seed at a map-pixel point.
#[derive(Event, Debug, Clone)]
pub struct PlantSeedEvent {
    pub crop: CropKind,
    pub target: Vec2,
}

/// Sent when the player goes to bed. All overnight logic hangs off this.
/// `raining` is the weather already rolled for the new day.
#[derive(Event, Debug, Clone, Default)]
pub struct DayEndEvent {
    pub raining: bool,
}

#[derive(Event, Debug, Clone)]
pub struct CropHarvestedEvent {
    pub crop: CropKind,
    pub x: usize,
    pub y: usize,
}

#[derive(Event, Debug, Clone)]
pub struct ItemPickupEvent {
    pub item: ItemKind,
    pub quantity: u32,
}

#[derive(Event, Debug, Clone)]
pub struct PlaySfxEvent {
    pub sfx_id: String,
}
