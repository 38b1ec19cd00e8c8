//! Visual synchronisation — keeps soil, water and plant sprites in step with `SoilGrid`.

use bevy::prelude::*;

use super::autotile::SoilTileVariant;
use super::grid::GridPos;
use super::plants::Plant;
use super::soil::{SoilGrid, WATER_VARIANTS};
use super::FarmEntities;
use crate::shared::*;

#[derive(Component, Debug, Clone)]
pub struct SoilTileSprite {
    pub pos: GridPos,
    pub variant: SoilTileVariant,
}

#[derive(Component, Debug, Clone)]
pub struct WaterOverlaySprite {
    pub pos: GridPos,
    pub variant: usize,
}

#[derive(Component, Debug, Clone)]
pub struct PlantSprite {
    pub pos: GridPos,
}

/// Short-lived flash left behind by a harvested plant.
#[derive(Component, Debug)]
pub struct HarvestParticle {
    pub timer: Timer,
}

const PARTICLE_SECS: f32 = 0.2;

/// Placeholder colour for a soil tile. Isolated tiles read slightly lighter
/// than tiles joined to their neighbours.
pub fn soil_color(variant: SoilTileVariant) -> Color {
    match variant {
        SoilTileVariant::Isolated => Color::srgb(0.50, 0.36, 0.22),
        SoilTileVariant::Surrounded => Color::srgb(0.40, 0.28, 0.17),
        _ => Color::srgb(0.45, 0.32, 0.20),
    }
}

pub fn water_color(variant: usize) -> Color {
    let shade = 0.05 * (variant % WATER_VARIANTS) as f32;
    Color::srgba(0.20 + shade, 0.30 + shade, 0.55, 0.45)
}

/// Seedling → ripe gradient for plant placeholders.
pub fn plant_color(plant: &Plant) -> Color {
    if plant.harvestable() {
        return match plant.kind {
            CropKind::Corn => Color::srgb(0.95, 0.80, 0.25),
            CropKind::Tomato => Color::srgb(0.85, 0.20, 0.15),
        };
    }
    let t = plant.age / plant.max_age().max(1.0);
    Color::srgb(0.30 - 0.10 * t, 0.55 + 0.20 * t, 0.25)
}

fn tile_translation(pos: GridPos, z: f32) -> Vec3 {
    map_to_world(pos.rect(TILE_SIZE).center(), z)
}

// ─────────────────────────────────────────────────────────────────────────────
// Soil tiles
// ─────────────────────────────────────────────────────────────────────────────

pub fn sync_soil_tiles(
    mut commands: Commands,
    soil: Res<SoilGrid>,
    mut farm_entities: ResMut<FarmEntities>,
    mut tiles: Query<(&mut SoilTileSprite, &mut Sprite)>,
) {
    if !soil.is_changed() {
        return;
    }

    for (&pos, &variant) in soil.tiles() {
        if let Some(&entity) = farm_entities.soil.get(&pos) {
            if let Ok((mut tile, mut sprite)) = tiles.get_mut(entity) {
                if tile.variant != variant {
                    tile.variant = variant;
                    sprite.color = soil_color(variant);
                }
                continue;
            }
        }
        let entity = commands
            .spawn((
                Sprite {
                    color: soil_color(variant),
                    custom_size: Some(Vec2::splat(TILE_SIZE)),
                    ..default()
                },
                Transform::from_translation(tile_translation(pos, layers::SOIL)),
                SoilTileSprite { pos, variant },
            ))
            .id();
        farm_entities.soil.insert(pos, entity);
    }

    let stale: Vec<GridPos> = farm_entities
        .soil
        .keys()
        .filter(|pos| !soil.tiles().contains_key(pos))
        .copied()
        .collect();
    for pos in stale {
        if let Some(entity) = farm_entities.soil.remove(&pos) {
            commands.entity(entity).despawn_recursive();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Water overlays
// ─────────────────────────────────────────────────────────────────────────────

pub fn sync_water_overlays(
    mut commands: Commands,
    soil: Res<SoilGrid>,
    mut farm_entities: ResMut<FarmEntities>,
) {
    if !soil.is_changed() {
        return;
    }

    for (&pos, &variant) in soil.water_overlays() {
        if farm_entities.water.contains_key(&pos) {
            continue;
        }
        let entity = commands
            .spawn((
                Sprite {
                    color: water_color(variant),
                    custom_size: Some(Vec2::splat(TILE_SIZE)),
                    ..default()
                },
                Transform::from_translation(tile_translation(pos, layers::SOIL_WATER)),
                WaterOverlaySprite { pos, variant },
            ))
            .id();
        farm_entities.water.insert(pos, entity);
    }

    let stale: Vec<GridPos> = farm_entities
        .water
        .keys()
        .filter(|pos| !soil.water_overlays().contains_key(pos))
        .copied()
        .collect();
    for pos in stale {
        if let Some(entity) = farm_entities.water.remove(&pos) {
            commands.entity(entity).despawn_recursive();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plants
// ─────────────────────────────────────────────────────────────────────────────

pub fn sync_plants(
    mut commands: Commands,
    soil: Res<SoilGrid>,
    mut farm_entities: ResMut<FarmEntities>,
    mut sprites: Query<(&mut Sprite, &mut Transform), With<PlantSprite>>,
) {
    if !soil.is_changed() {
        return;
    }

    for plant in soil.plants().iter() {
        let rect = plant.rect();
        let translation = map_to_world(rect.center(), plant.layer());

        if let Some(&entity) = farm_entities.plants.get(&plant.pos) {
            if let Ok((mut sprite, mut transform)) = sprites.get_mut(entity) {
                sprite.color = plant_color(plant);
                transform.translation = translation;
                continue;
            }
        }
        let entity = commands
            .spawn((
                Sprite {
                    color: plant_color(plant),
                    custom_size: Some(rect.size() * 0.6),
                    ..default()
                },
                Transform::from_translation(translation),
                PlantSprite { pos: plant.pos },
            ))
            .id();
        farm_entities.plants.insert(plant.pos, entity);
    }

    let stale: Vec<GridPos> = farm_entities
        .plants
        .keys()
        .filter(|pos| soil.plants().get(**pos).is_none())
        .copied()
        .collect();
    for pos in stale {
        if let Some(entity) = farm_entities.plants.remove(&pos) {
            commands.entity(entity).despawn_recursive();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harvest particles
// ─────────────────────────────────────────────────────────────────────────────

pub fn spawn_harvest_particles(
    mut commands: Commands,
    mut harvested: EventReader<CropHarvestedEvent>,
) {
    for event in harvested.read() {
        let plant = Plant::new(event.crop, GridPos::new(event.x, event.y));
        let rect = plant.rect();
        commands.spawn((
            Sprite {
                color: Color::srgba(1.0, 1.0, 1.0, 0.9),
                custom_size: Some(rect.size() * 0.6),
                ..default()
            },
            Transform::from_translation(map_to_world(rect.center(), layers::MAIN)),
            HarvestParticle {
                timer: Timer::from_seconds(PARTICLE_SECS, TimerMode::Once),
            },
        ));
    }
}

pub fn tick_harvest_particles(
    mut commands: Commands,
    time: Res<Time>,
    mut particles: Query<(Entity, &mut HarvestParticle)>,
) {
    for (entity, mut particle) in &mut particles {
        particle.timer.tick(time.delta());
        if particle.timer.finished() {
            commands.entity(entity).despawn_recursive();
        }
    }
}
