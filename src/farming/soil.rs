//! Soil grid resource and the systems that mutate it.

use std::collections::BTreeMap;

use bevy::prelude::*;
use rand::Rng;

use super::autotile::{tile_variant_at, SoilTileVariant};
use super::grid::{CellTags, Grid, GridPos};
use super::plants::{Plant, PlantRegistry};
use crate::shared::*;

/// Number of interchangeable water overlay sprites.
pub const WATER_VARIANTS: usize = 3;

/// Planted and Watered are only valid on cells that are Farmable and Tilled.
fn is_cultivated(cell: CellTags) -> bool {
    cell.is_farmable() && cell.is_tilled()
}

/// The farm's soil: cell tags, derived tile shapes and hit rects, water
/// overlays, and the plants growing on it.
#[derive(Resource, Debug, Clone, Default)]
pub struct SoilGrid {
    grid: Grid,
    hit_rects: Vec<(GridPos, Rect)>,
    tiles: BTreeMap<GridPos, SoilTileVariant>,
    water: BTreeMap<GridPos, usize>,
    plants: PlantRegistry,
}

impl SoilGrid {
    pub fn new(grid: Grid) -> Self {
        let mut soil = Self {
            grid,
            ..default()
        };
        soil.rebuild_geometry();
        soil.sync_water_overlays();
        soil
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn plants(&self) -> &PlantRegistry {
        &self.plants
    }

    /// Tile shape for every tilled cell.
    pub fn tiles(&self) -> &BTreeMap<GridPos, SoilTileVariant> {
        &self.tiles
    }

    /// Water overlay sprite variant for every watered cell.
    pub fn water_overlays(&self) -> &BTreeMap<GridPos, usize> {
        &self.water
    }

    pub fn hit_rects(&self) -> impl Iterator<Item = Rect> + '_ {
        self.hit_rects.iter().map(|(_, rect)| *rect)
    }

    /// Farmable cell whose hit rect contains `point` (right and bottom edges excluded).
    pub fn hit_cell(&self, point: Vec2) -> Option<GridPos> {
        self.hit_rects
            .iter()
            .find(|(_, r)| {
                point.x >= r.min.x && point.x < r.max.x && point.y >= r.min.y && point.y < r.max.y
            })
            .map(|(pos, _)| *pos)
    }

    fn cell_under(&self, point: Vec2) -> Option<(GridPos, CellTags)> {
        let pos = GridPos::from_point(point, TILE_SIZE)?;
        self.grid.get(pos).map(|cell| (pos, cell))
    }

    pub fn is_watered(&self, pos: GridPos) -> bool {
        self.grid.get(pos).is_some_and(|c| c.is_watered())
    }

    /// Tills the farmable cell under `point`. When it is raining every
    /// cultivated cell is watered straight away. Returns whether anything changed.
    pub fn till(&mut self, point: Vec2, raining: bool) -> bool {
        let Some(pos) = self.hit_cell(point) else {
            return false;
        };
        let Some(cell) = self.grid.get_mut(pos) else {
            return false;
        };
        if !cell.is_farmable() || cell.is_tilled() {
            return false;
        }
        cell.insert(CellTags::TILLED);
        self.rebuild_geometry();
        if raining {
            self.water_all();
        }
        true
    }

    pub fn water(&mut self, point: Vec2) -> bool {
        let Some((pos, cell)) = self.cell_under(point) else {
            return false;
        };
        if !is_cultivated(cell) || cell.is_watered() {
            return false;
        }
        self.set_watered(pos);
        true
    }

    /// Waters every cultivated, unwatered cell. Returns how many were watered.
    pub fn water_all(&mut self) -> usize {
        let dry: Vec<GridPos> = self
            .grid
            .iter()
            .filter(|(_, cell)| is_cultivated(*cell) && !cell.is_watered())
            .map(|(pos, _)| pos)
            .collect();
        for &pos in &dry {
            self.set_watered(pos);
        }
        dry.len()
    }

    fn set_watered(&mut self, pos: GridPos) {
        if let Some(cell) = self.grid.get_mut(pos) {
            cell.insert(CellTags::WATERED);
            self.water
                .insert(pos, rand::thread_rng().gen_range(0..WATER_VARIANTS));
        }
    }

    pub fn remove_water(&mut self) {
        for (_, cell) in self.grid.iter_mut() {
            cell.remove(CellTags::WATERED);
        }
        self.water.clear();
    }

    /// Plants `crop` on the cultivated, unplanted cell under `point`.
    pub fn plant_seed(&mut self, point: Vec2, crop: CropKind) -> bool {
        let Some((pos, cell)) = self.cell_under(point) else {
            return false;
        };
        if !is_cultivated(cell) || cell.is_planted() {
            return false;
        }
        if !self.plants.insert(Plant::new(crop, pos)) {
            return false;
        }
        if let Some(cell) = self.grid.get_mut(pos) {
            cell.insert(CellTags::PLANTED);
        }
        true
    }

    /// One growth tick for every plant.
    pub fn update_plants(&mut self) {
        self.plants.grow_all(&self.grid);
    }

    /// Removes every ripe plant overlapping `region` and clears Planted on
    /// exactly those cells.
    pub fn harvest(&mut self, region: Rect) -> Vec<Plant> {
        let taken = self.plants.take_harvestable(region);
        for plant in &taken {
            if let Some(cell) = self.grid.get_mut(plant.pos) {
                cell.remove(CellTags::PLANTED);
            }
        }
        taken
    }

    /// Swaps in a new grid and rebuilds tile shapes, hit rects and water
    /// overlays from it. Watered and Planted tags on cells that are not
    /// cultivated are cleared. Plants are left alone.
    pub fn replace_grid(&mut self, mut grid: Grid) {
        for (pos, cell) in grid.iter_mut() {
            if (cell.is_watered() || cell.is_planted()) && !is_cultivated(*cell) {
                debug!("Clearing watered/planted tags on uncultivated cell {pos:?}");
                cell.remove(CellTags::WATERED);
                cell.remove(CellTags::PLANTED);
            }
        }
        self.grid = grid;
        self.water.clear();
        self.rebuild_geometry();
        self.sync_water_overlays();
    }

    /// Replaces the plant set. Plants off cultivated cells are dropped, each
    /// kept plant marks its cell Planted, and Planted tags without a plant are cleared.
    pub fn restore_plants(&mut self, plants: impl IntoIterator<Item = Plant>) {
        self.plants.clear();
        for plant in plants {
            let Some(cell) = self.grid.get(plant.pos) else {
                warn!("Dropping {:?} plant outside the soil grid at {:?}", plant.kind, plant.pos);
                continue;
            };
            if !is_cultivated(cell) {
                warn!("Dropping {:?} plant on untilled cell {:?}", plant.kind, plant.pos);
                continue;
            }
            if !self.plants.insert(plant) {
                debug!("Skipping duplicate plant record");
            }
        }

        let planted: Vec<GridPos> = self.plants.iter().map(|p| p.pos).collect();
        for (pos, cell) in self.grid.iter_mut() {
            if planted.contains(&pos) {
                cell.insert(CellTags::PLANTED);
            } else {
                cell.remove(CellTags::PLANTED);
            }
        }
    }

    fn rebuild_geometry(&mut self) {
        self.hit_rects = self
            .grid
            .iter()
            .filter(|(_, cell)| cell.is_farmable())
            .map(|(pos, _)| (pos, pos.rect(TILE_SIZE)))
            .collect();

        self.tiles = self
            .grid
            .iter()
            .filter_map(|(pos, _)| tile_variant_at(&self.grid, pos).map(|v| (pos, v)))
            .collect();
    }

    fn sync_water_overlays(&mut self) {
        let mut rng = rand::thread_rng();
        let watered: Vec<GridPos> = self
            .grid
            .iter()
            .filter(|(_, cell)| cell.is_watered())
            .map(|(pos, _)| pos)
            .collect();
        self.water.retain(|pos, _| watered.contains(pos));
        for pos in watered {
            self.water
                .entry(pos)
                .or_insert_with(|| rng.gen_range(0..WATER_VARIANTS));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Systems
// ─────────────────────────────────────────────────────────────────────────────

/// Hoe tills, watering can waters. The axe is handled by the world domain.
pub fn handle_tool_use(
    mut tool_events: EventReader<ToolUseEvent>,
    mut soil: ResMut<SoilGrid>,
    weather: Res<Weather>,
    mut sfx_events: EventWriter<PlaySfxEvent>,
) {
    for event in tool_events.read() {
        match event.tool {
            ToolKind::Hoe => {
                if soil.till(event.target, weather.raining) {
                    sfx_events.send(PlaySfxEvent { sfx_id: "hoe".to_string() });
                }
            }
            ToolKind::WateringCan => {
                if soil.water(event.target) {
                    sfx_events.send(PlaySfxEvent { sfx_id: "water".to_string() });
                }
            }
            ToolKind::Axe => {}
        }
    }
}

/// Plants a seed and spends it. Failed plantings keep the seed.
pub fn handle_plant_seed(
    mut seed_events: EventReader<PlantSeedEvent>,
    mut soil: ResMut<SoilGrid>,
    mut player: ResMut<PlayerState>,
    mut sfx_events: EventWriter<PlaySfxEvent>,
) {
    for event in seed_events.read() {
        if player.seed_count(event.crop) == 0 {
            debug!("No {} seeds left", event.crop.id());
            continue;
        }
        if soil.plant_seed(event.target, event.crop) {
            player.take_seed(event.crop);
            sfx_events.send(PlaySfxEvent { sfx_id: "plant".to_string() });
        }
    }
}

/// Overnight: grow, dry out, then let the new day's rain water everything.
pub fn on_day_end(mut day_end_events: EventReader<DayEndEvent>, mut soil: ResMut<SoilGrid>) {
    for event in day_end_events.read() {
        soil.update_plants();
        soil.remove_water();
        if event.raining {
            let watered = soil.water_all();
            debug!("Rain watered {watered} cells");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn farm(height: usize, width: usize) -> SoilGrid {
        let mut grid = Grid::new(height, width);
        for (_, cell) in grid.iter_mut() {
            cell.insert(CellTags::FARMABLE);
        }
        SoilGrid::new(grid)
    }

    fn centre(x: usize, y: usize) -> Vec2 {
        GridPos::new(x, y).rect(TILE_SIZE).center()
    }

    #[test]
    fn test_replace_grid_clears_tags_on_uncultivated_cells() {
        let mut soil = farm(1, 3);
        let mut grid = Grid::new(1, 3);
        *grid.get_mut(GridPos::new(0, 0)).unwrap() = CellTags::FARMABLE | CellTags::WATERED;
        *grid.get_mut(GridPos::new(1, 0)).unwrap() = CellTags::WATERED | CellTags::PLANTED;
        *grid.get_mut(GridPos::new(2, 0)).unwrap() =
            CellTags::FARMABLE | CellTags::TILLED | CellTags::WATERED;
        soil.replace_grid(grid);

        assert_eq!(soil.grid().get(GridPos::new(0, 0)), Some(CellTags::FARMABLE));
        assert_eq!(soil.grid().get(GridPos::new(1, 0)), Some(CellTags::EMPTY));
        assert!(soil.is_watered(GridPos::new(2, 0)));
        assert_eq!(soil.water_overlays().len(), 1);
        assert!(soil.water_overlays().contains_key(&GridPos::new(2, 0)));
    }

    #[test]
    fn test_till_is_idempotent() {
        let mut soil = farm(3, 3);
        assert!(soil.till(centre(1, 1), false));
        let after_first = soil.grid().clone();
        assert!(!soil.till(centre(1, 1), false));
        assert_eq!(soil.grid(), &after_first);
        assert_eq!(soil.tiles().len(), 1);
    }

    #[test]
    fn test_till_rejects_unfarmable_and_off_grid() {
        let mut grid = Grid::new(2, 2);
        *grid.get_mut(GridPos::new(0, 0)).unwrap() = CellTags::FARMABLE;
        let mut soil = SoilGrid::new(grid);
        assert!(!soil.till(centre(1, 1), false));
        assert!(!soil.till(Vec2::new(-5.0, 10.0), false));
        assert!(!soil.till(Vec2::new(500.0, 500.0), false));
        assert!(soil.till(centre(0, 0), false));
    }

    #[test]
    fn test_till_in_rain_waters_everything_tilled() {
        let mut soil = farm(2, 2);
        soil.till(centre(0, 0), false);
        soil.till(centre(1, 0), true);
        assert!(soil.is_watered(GridPos::new(0, 0)));
        assert!(soil.is_watered(GridPos::new(1, 0)));
        assert!(!soil.is_watered(GridPos::new(0, 1)));
        assert_eq!(soil.water_overlays().len(), 2);
    }

    #[test]
    fn test_tiles_follow_neighbours() {
        let mut soil = farm(3, 3);
        soil.till(centre(0, 1), false);
        soil.till(centre(1, 1), false);
        soil.till(centre(2, 1), false);
        assert_eq!(
            soil.tiles().get(&GridPos::new(1, 1)),
            Some(&SoilTileVariant::Horizontal)
        );
        assert_eq!(soil.tiles().get(&GridPos::new(0, 1)), Some(&SoilTileVariant::Left));
    }

    #[test]
    fn test_water_needs_tilled_cell() {
        let mut soil = farm(2, 2);
        assert!(!soil.water(centre(0, 0)));
        soil.till(centre(0, 0), false);
        assert!(soil.water(centre(0, 0)));
        assert!(!soil.water(centre(0, 0)));
        soil.remove_water();
        assert!(!soil.is_watered(GridPos::new(0, 0)));
        assert!(soil.water_overlays().is_empty());
    }

    #[test]
    fn test_plant_seed_once_per_cell() {
        let mut soil = farm(2, 2);
        assert!(!soil.plant_seed(centre(0, 0), CropKind::Corn));
        soil.till(centre(0, 0), false);
        assert!(soil.plant_seed(centre(0, 0), CropKind::Corn));
        assert!(!soil.plant_seed(centre(0, 0), CropKind::Tomato));
        assert_eq!(soil.plants().len(), 1);
        assert!(soil.grid().get(GridPos::new(0, 0)).unwrap().is_planted());
    }

    #[test]
    fn test_growth_only_when_watered() {
        let mut soil = farm(1, 1);
        soil.till(centre(0, 0), false);
        soil.plant_seed(centre(0, 0), CropKind::Corn);
        soil.update_plants();
        assert_eq!(soil.plants().get(GridPos::new(0, 0)).unwrap().age, 0.0);
        soil.water(centre(0, 0));
        soil.update_plants();
        assert_eq!(soil.plants().get(GridPos::new(0, 0)).unwrap().age, 1.0);
    }

    #[test]
    fn test_harvest_clears_only_its_cell() {
        let mut soil = farm(1, 3);
        for x in 0..3 {
            soil.till(centre(x, 0), false);
            soil.plant_seed(centre(x, 0), CropKind::Corn);
        }
        soil.restore_plants(vec![
            Plant::with_age(CropKind::Corn, GridPos::new(0, 0), 3.0),
            Plant::with_age(CropKind::Corn, GridPos::new(1, 0), 1.0),
            Plant::with_age(CropKind::Corn, GridPos::new(2, 0), 3.0),
        ]);
        let before = soil.grid().clone();

        let taken = soil.harvest(Rect::new(0.0, 0.0, 60.0, 64.0));
        assert_eq!(taken.len(), 1);

        for (pos, cell) in soil.grid().iter() {
            let old = before.get(pos).unwrap();
            if pos == GridPos::new(0, 0) {
                assert!(!cell.is_planted());
                let mut expected = old;
                expected.remove(CellTags::PLANTED);
                assert_eq!(cell, expected);
            } else {
                assert_eq!(cell, old);
            }
        }
    }

    #[test]
    fn test_restore_plants_reconciles_tags() {
        let mut grid = Grid::new(1, 3);
        let cultivated = CellTags::FARMABLE | CellTags::TILLED;
        *grid.get_mut(GridPos::new(0, 0)).unwrap() = cultivated;
        *grid.get_mut(GridPos::new(1, 0)).unwrap() = cultivated | CellTags::PLANTED;
        *grid.get_mut(GridPos::new(2, 0)).unwrap() = CellTags::FARMABLE;
        let mut soil = SoilGrid::new(grid);

        soil.restore_plants(vec![
            Plant::new(CropKind::Corn, GridPos::new(0, 0)),
            Plant::new(CropKind::Tomato, GridPos::new(2, 0)),
            Plant::new(CropKind::Tomato, GridPos::new(7, 7)),
        ]);

        assert_eq!(soil.plants().len(), 1);
        assert!(soil.grid().get(GridPos::new(0, 0)).unwrap().is_planted());
        assert!(!soil.grid().get(GridPos::new(1, 0)).unwrap().is_planted());
        assert!(!soil.grid().get(GridPos::new(2, 0)).unwrap().is_planted());
    }

    #[test]
    fn test_replace_grid_rebuilds_derived_state() {
        let mut soil = farm(2, 2);
        let mut grid = Grid::new(2, 2);
        *grid.get_mut(GridPos::new(1, 1)).unwrap() =
            CellTags::FARMABLE | CellTags::TILLED | CellTags::WATERED;
        soil.replace_grid(grid);
        assert_eq!(soil.hit_rects().count(), 1);
        assert_eq!(soil.tiles().len(), 1);
        assert_eq!(soil.water_overlays().len(), 1);
        assert!(soil.water_overlays().values().all(|&v| v < WATER_VARIANTS));
    }
}
