//! Growing crops and the per-farm plant set.

use bevy::prelude::*;

use super::grid::{Grid, GridPos};
use crate::shared::*;

/// Size of one crop growth frame in map pixels.
pub const PLANT_SPRITE_SIZE: Vec2 = Vec2::splat(TILE_SIZE);

/// A crop growing on one soil cell. `pos` refers back to the cell; the grid
/// owns the cell, not the plant.
#[derive(Debug, Clone, PartialEq)]
pub struct Plant {
    pub kind: CropKind,
    pub pos: GridPos,
    pub age: f32,
}

impl Plant {
    pub fn new(kind: CropKind, pos: GridPos) -> Self {
        Self { kind, pos, age: 0.0 }
    }

    /// Builds a plant with a stored age, clamped into `[0, max_age]`.
    pub fn with_age(kind: CropKind, pos: GridPos, age: f32) -> Self {
        let mut plant = Self::new(kind, pos);
        plant.age = if age.is_finite() {
            age.clamp(0.0, plant.max_age())
        } else {
            0.0
        };
        plant
    }

    pub fn max_age(&self) -> f32 {
        self.kind.frame_count().saturating_sub(1) as f32
    }

    pub fn harvestable(&self) -> bool {
        self.age >= self.max_age()
    }

    /// Index of the growth frame currently shown.
    pub fn frame(&self) -> usize {
        (self.age.max(0.0).floor() as usize).min(self.kind.frame_count().saturating_sub(1))
    }

    /// Past the seedling frame: drawn on the main layer and collidable.
    pub fn is_sprouted(&self) -> bool {
        self.frame() > 0
    }

    pub fn layer(&self) -> f32 {
        if self.is_sprouted() {
            layers::MAIN
        } else {
            layers::GROUND_PLANT
        }
    }

    /// Sprite rect, bottom-centred on the cell plus the crop's vertical offset.
    pub fn rect(&self) -> Rect {
        let cell = self.pos.rect(TILE_SIZE);
        let mid_bottom = Vec2::new(cell.center().x, cell.max.y + self.kind.y_offset());
        Rect::from_corners(
            mid_bottom - Vec2::new(PLANT_SPRITE_SIZE.x / 2.0, PLANT_SPRITE_SIZE.y),
            mid_bottom + Vec2::new(PLANT_SPRITE_SIZE.x / 2.0, 0.0),
        )
    }

    /// Collision box; seedlings have none.
    pub fn hitbox(&self) -> Option<Rect> {
        if !self.is_sprouted() {
            return None;
        }
        let rect = self.rect();
        let shrink = Vec2::new(26.0, rect.height() * 0.4);
        Some(Rect::from_center_size(rect.center(), rect.size() - shrink))
    }

    /// Advances one growth tick if the cell is watered. Returns whether the age changed.
    pub fn grow(&mut self, watered: bool) -> bool {
        if !watered || self.harvestable() {
            return false;
        }
        self.age = (self.age + self.kind.growth_rate()).min(self.max_age());
        true
    }
}

/// Live plants in planting order, at most one per cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlantRegistry {
    plants: Vec<Plant>,
}

impl PlantRegistry {
    /// Adds a plant; refuses a second plant on an occupied cell.
    pub fn insert(&mut self, plant: Plant) -> bool {
        if self.get(plant.pos).is_some() {
            return false;
        }
        self.plants.push(plant);
        true
    }

    pub fn get(&self, pos: GridPos) -> Option<&Plant> {
        self.plants.iter().find(|p| p.pos == pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plant> {
        self.plants.iter()
    }

    pub fn len(&self) -> usize {
        self.plants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plants.is_empty()
    }

    pub fn clear(&mut self) {
        self.plants.clear();
    }

    /// One growth tick for every plant, gated on its own cell being watered.
    pub fn grow_all(&mut self, grid: &Grid) {
        for plant in &mut self.plants {
            let watered = grid.get(plant.pos).is_some_and(|c| c.is_watered());
            plant.grow(watered);
        }
    }

    /// Removes and returns every harvestable plant whose sprite overlaps `region`.
    pub fn take_harvestable(&mut self, region: Rect) -> Vec<Plant> {
        let (ripe, rest): (Vec<Plant>, Vec<Plant>) = std::mem::take(&mut self.plants)
            .into_iter()
            .partition(|p| p.harvestable() && !p.rect().intersect(region).is_empty());
        self.plants = rest;
        ripe
    }
}
