//! World snapshots: what a save slot holds, and how it is captured from and
//! written back into the live world.
//!
//! Document layout (JSON):
//!
//! ```text
//! { "version": 1,
//!   "player": { "pos": [x, y], "inventory": {..}, "seeds": {..}, "money": n },
//!   "soil":   { "grid": [[["Farmable", "Tilled"], ..], ..], "plants": [{ "x", "y", "type", "age" }] },
//!   "fruit":  [{ "tree_x", "tree_y", "offset_x", "offset_y" }],
//!   "map":    { "rain": bool },
//!   "sky":    { "start_color": [r, g, b] } }
//! ```
//!
//! Every section is optional on read. A section that is missing or cannot be
//! parsed leaves the matching live state untouched.

use std::collections::BTreeMap;

use bevy::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data::FarmMap;
use crate::farming::codec::repair;
use crate::farming::{GridCodec, GridPos, Plant, RawValue, SoilGrid};
use crate::shared::*;
use crate::world::trees::{attach_fruit, despawn_trees, fruit_offsets, spawn_map_trees, trees_in_world};
use crate::world::Tree;

pub const SNAPSHOT_VERSION: u32 = 1;

// ═══════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<[f32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<BTreeMap<ItemKind, u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeds: Option<BTreeMap<CropKind, u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub money: Option<u32>,
}

impl PlayerRecord {
    pub fn capture(player: &PlayerState) -> Self {
        Self {
            pos: Some(player.position.to_array()),
            inventory: Some(player.items.clone()),
            seeds: Some(player.seeds.clone()),
            money: Some(player.money),
        }
    }

    /// Overwrites the fields present in the record and keeps the rest.
    pub fn apply(&self, player: &mut PlayerState) {
        if let Some(pos) = self.pos {
            player.position = Vec2::from_array(pos);
        }
        if let Some(inventory) = &self.inventory {
            player.items = inventory.clone();
        }
        if let Some(seeds) = &self.seeds {
            player.seeds = seeds.clone();
        }
        if let Some(money) = self.money {
            player.money = money;
        }
    }

    fn from_section(section: &Map<String, Value>) -> Self {
        Self {
            pos: field(section, "pos"),
            inventory: field(section, "inventory"),
            seeds: field(section, "seeds"),
            money: field(section, "money"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantRecord {
    pub x: usize,
    pub y: usize,
    #[serde(rename = "type")]
    pub kind: CropKind,
    pub age: f32,
}

impl PlantRecord {
    pub fn capture(plant: &Plant) -> Self {
        Self {
            x: plant.pos.x,
            y: plant.pos.y,
            kind: plant.kind,
            age: plant.age,
        }
    }

    pub fn to_plant(&self) -> Plant {
        Plant::with_age(self.kind, GridPos::new(self.x, self.y), self.age)
    }
}

/// Soil grid plus its plants. Restored as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SoilRecord {
    /// Raw grid document; repaired by `GridCodec` on restore.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<Value>,
    pub plants: Vec<PlantRecord>,
}

impl SoilRecord {
    pub fn capture(soil: &SoilGrid) -> Self {
        Self {
            grid: Some(soil.grid().to_value()),
            plants: soil.plants().iter().map(PlantRecord::capture).collect(),
        }
    }

    fn from_section(section: &Map<String, Value>) -> Self {
        Self {
            grid: section.get("grid").filter(|v| !v.is_null()).cloned(),
            plants: list(section.get("plants"), "plant"),
        }
    }
}

/// One fruit hanging on the tree whose top-left corner is `(tree_x, tree_y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FruitRecord {
    pub tree_x: i32,
    pub tree_y: i32,
    pub offset_x: i32,
    pub offset_y: i32,
}

impl FruitRecord {
    pub fn tree_pos(&self) -> IVec2 {
        IVec2::new(self.tree_x, self.tree_y)
    }

    pub fn offset(&self) -> IVec2 {
        IVec2::new(self.offset_x, self.offset_y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MapRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rain: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SkyRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_color: Option<[f32; 3]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorldSnapshot {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soil: Option<SoilRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fruit: Option<Vec<FruitRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<MapRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sky: Option<SkyRecord>,
}

// ═══════════════════════════════════════════════════════════════════════
// LENIENT PARSING
// ═══════════════════════════════════════════════════════════════════════

/// Reads one field of a section, repairing index-keyed maps first.
/// Missing, null and malformed fields all come back as `None`.
fn field<T: DeserializeOwned>(section: &Map<String, Value>, key: &str) -> Option<T> {
    let value = section.get(key).filter(|v| !v.is_null())?;
    let repaired = repair(RawValue::from(value)).into_value();
    match serde_json::from_value(repaired) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("Ignoring saved field {key:?}: {e}");
            None
        }
    }
}

/// Reads a list of records. Gaps left by the remote store are skipped and
/// malformed entries are dropped one by one.
fn list<T: DeserializeOwned>(value: Option<&Value>, what: &str) -> Vec<T> {
    let Some(value) = value else {
        return Vec::new();
    };
    let RawValue::Sequence(items) = repair(RawValue::from(value)) else {
        warn!("Ignoring saved {what} list: not a list");
        return Vec::new();
    };
    items
        .into_iter()
        .filter(|item| !matches!(item, RawValue::Sequence(inner) if inner.is_empty()))
        .filter_map(|item| match serde_json::from_value(item.into_value()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Dropping malformed {what} record: {e}");
                None
            }
        })
        .collect()
}

fn section<'a>(doc: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    match doc.get(key)? {
        Value::Object(section) => Some(section),
        Value::Null => None,
        other => {
            warn!("Ignoring saved {key} section: expected an object, got {other}");
            None
        }
    }
}

impl WorldSnapshot {
    /// Parses a save document, keeping whatever sections are readable.
    /// Returns `None` when the document is not an object at all.
    pub fn from_value(doc: &Value) -> Option<Self> {
        let Value::Object(doc) = doc else {
            warn!("Save document is not an object; treating the slot as empty");
            return None;
        };

        let version = match doc.get("version").and_then(Value::as_u64) {
            Some(v) => u32::try_from(v).unwrap_or_else(|_| {
                warn!("Save version {v} is out of range, reading as version {SNAPSHOT_VERSION}");
                SNAPSHOT_VERSION
            }),
            None => {
                debug!("Save document has no version, reading as version {SNAPSHOT_VERSION}");
                SNAPSHOT_VERSION
            }
        };
        if version != SNAPSHOT_VERSION {
            warn!(
                "Save has version {} but current version is {}. Attempting to load anyway.",
                version, SNAPSHOT_VERSION
            );
        }

        let fruit = doc
            .get("fruit")
            .or_else(|| doc.get("apples"))
            .map(|value| list(Some(value), "fruit"));

        Some(Self {
            version,
            player: section(doc, "player").map(PlayerRecord::from_section),
            soil: section(doc, "soil").map(SoilRecord::from_section),
            fruit,
            map: section(doc, "map").map(|s| MapRecord { rain: field(s, "rain") }),
            sky: section(doc, "sky").map(|s| SkyRecord {
                start_color: field(s, "start_color"),
            }),
        })
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// CAPTURE / RESTORE
// ═══════════════════════════════════════════════════════════════════════

fn capture_fruit(world: &mut World) -> Vec<FruitRecord> {
    let mut records = Vec::new();
    for (entity, top_left, alive) in trees_in_world(world) {
        if !alive {
            continue;
        }
        for offset in fruit_offsets(world, entity) {
            records.push(FruitRecord {
                tree_x: top_left.x,
                tree_y: top_left.y,
                offset_x: offset.x,
                offset_y: offset.y,
            });
        }
    }
    records.sort_by_key(|r| (r.tree_x, r.tree_y, r.offset_x, r.offset_y));
    records
}

/// Captures the current world. Sections whose resource is absent are left out.
pub fn snapshot(world: &mut World) -> WorldSnapshot {
    WorldSnapshot {
        version: SNAPSHOT_VERSION,
        player: world.get_resource::<PlayerState>().map(PlayerRecord::capture),
        soil: world.get_resource::<SoilGrid>().map(SoilRecord::capture),
        fruit: Some(capture_fruit(world)),
        map: world
            .get_resource::<Weather>()
            .map(|w| MapRecord { rain: Some(w.raining) }),
        sky: world.get_resource::<SkyState>().map(|s| SkyRecord {
            start_color: Some(s.start_color),
        }),
    }
}

fn restore_soil(record: &SoilRecord, world: &mut World) {
    let dims = world
        .get_resource::<FarmMap>()
        .map(|map| (map.height, map.width));
    let Some(mut soil) = world.get_resource_mut::<SoilGrid>() else {
        warn!("No soil grid to restore into");
        return;
    };

    if let Some(raw) = &record.grid {
        let (height, width) = dims.unwrap_or((soil.grid().height(), soil.grid().width()));
        soil.replace_grid(GridCodec::normalize_within(raw, height, width));
    }
    soil.restore_plants(record.plants.iter().map(PlantRecord::to_plant));
}

/// Rebuilds the map's trees, carrying over the fruit the old ones had, then
/// applies the snapshot's own fruit records.
fn restore_trees(fruit: Option<&[FruitRecord]>, world: &mut World) {
    if let Some(map) = world.get_resource::<FarmMap>().cloned() {
        let backup = despawn_trees(world);
        let rebuilt = spawn_map_trees(world, &map);
        for entity in rebuilt {
            let Some(top_left) = world.get::<Tree>(entity).map(|t| t.top_left) else {
                continue;
            };
            for (_, offsets) in backup.iter().filter(|(pos, _)| *pos == top_left) {
                for &offset in offsets {
                    attach_fruit(world, entity, offset);
                }
            }
        }
    } else {
        warn!("No farm map loaded; keeping the current trees");
    }

    let Some(records) = fruit else {
        return;
    };
    let trees = trees_in_world(world);
    let mut orphaned = 0;
    for record in records {
        match trees.iter().find(|(_, top_left, _)| *top_left == record.tree_pos()) {
            Some(&(entity, _, _)) => {
                attach_fruit(world, entity, record.offset());
            }
            None => orphaned += 1,
        }
    }
    if orphaned > 0 {
        warn!("{orphaned} saved fruit had no tree to hang on");
    }
}

/// Writes a snapshot into the world. Order: player, weather, soil, trees,
/// fruit, sky. Sections missing from the snapshot are skipped.
pub fn restore(snapshot: &WorldSnapshot, world: &mut World) {
    if let Some(record) = &snapshot.player {
        match world.get_resource_mut::<PlayerState>() {
            Some(mut player) => record.apply(&mut player),
            None => warn!("No player state to restore into"),
        }
    }

    if let Some(rain) = snapshot.map.and_then(|m| m.rain) {
        if let Some(mut weather) = world.get_resource_mut::<Weather>() {
            weather.raining = rain;
        }
    }

    if let Some(record) = &snapshot.soil {
        restore_soil(record, world);
    }

    restore_trees(snapshot.fruit.as_deref(), world);

    if let Some(color) = snapshot.sky.and_then(|s| s.start_color) {
        if let Some(mut sky) = world.get_resource_mut::<SkyState>() {
            sky.start_color = color;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::data::{TreeSize, TreeSpawn};
    use crate::farming::CellTags;
    use crate::world::trees::spawn_tree;
    use crate::world::Fruit;

    fn small_map() -> FarmMap {
        FarmMap {
            width: 4,
            height: 3,
            farmable: (0..4).flat_map(|x| (0..3).map(move |y| (x, y))).collect(),
            trees: vec![
                TreeSpawn { size: TreeSize::Small, x: 300, y: 0 },
                TreeSpawn { size: TreeSize::Large, x: 600, y: 0 },
            ],
            player_start: (10.0, 10.0),
            bed: (0.0, 0.0, 10.0, 10.0),
        }
    }

    fn test_world() -> World {
        let map = small_map();
        let mut world = World::new();
        world.insert_resource(SoilGrid::new(map.farmable_grid()));
        world.insert_resource(map.clone());
        world.init_resource::<PlayerState>();
        world.init_resource::<Weather>();
        world.init_resource::<SkyState>();
        for spawn in &map.trees {
            spawn_tree(&mut world, spawn, &[IVec2::new(18, 17)]);
        }
        world
    }

    fn centre(x: usize, y: usize) -> Vec2 {
        GridPos::new(x, y).rect(TILE_SIZE).center()
    }

    fn fruit_count(world: &mut World) -> usize {
        world.query::<&Fruit>().iter(world).count()
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut world = test_world();
        {
            let mut soil = world.resource_mut::<SoilGrid>();
            soil.till(centre(1, 1), false);
            soil.water(centre(1, 1));
            soil.plant_seed(centre(1, 1), CropKind::Tomato);
            soil.update_plants();
        }
        world.resource_mut::<PlayerState>().money = 999;
        world.resource_mut::<Weather>().raining = true;
        world.resource_mut::<SkyState>().start_color = [100.0, 120.0, 200.0];

        let doc = snapshot(&mut world).to_value().unwrap();
        let text = serde_json::to_string_pretty(&doc).unwrap();
        let parsed = WorldSnapshot::from_value(&serde_json::from_str(&text).unwrap()).unwrap();

        let mut fresh = test_world();
        restore(&parsed, &mut fresh);

        assert_eq!(fresh.resource::<PlayerState>().money, 999);
        assert!(fresh.resource::<Weather>().raining);
        assert_eq!(fresh.resource::<SkyState>().start_color, [100.0, 120.0, 200.0]);
        let soil = fresh.resource::<SoilGrid>();
        assert_eq!(soil.grid(), world.resource::<SoilGrid>().grid());
        let plant = soil.plants().get(GridPos::new(1, 1)).unwrap();
        assert_eq!(plant.kind, CropKind::Tomato);
        assert!((plant.age - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_missing_sections_leave_state_alone() {
        let mut world = test_world();
        world.resource_mut::<PlayerState>().money = 42;
        world.resource_mut::<SoilGrid>().till(centre(0, 0), false);
        let before = world.resource::<SoilGrid>().grid().clone();

        let partial = WorldSnapshot::from_value(&json!({
            "player": { "money": 7 },
            "sky": {}
        }))
        .unwrap();
        restore(&partial, &mut world);

        let player = world.resource::<PlayerState>();
        assert_eq!(player.money, 7);
        assert_eq!(player.items, PlayerState::default().items);
        assert_eq!(world.resource::<SoilGrid>().grid(), &before);
        assert_eq!(world.resource::<SkyState>().start_color, SKY_DAY_COLOR);
    }

    #[test]
    fn test_restore_twice_does_not_duplicate_trees_or_fruit() {
        let mut world = test_world();
        let snap = snapshot(&mut world);
        assert_eq!(snap.fruit.as_ref().map(Vec::len), Some(2));

        restore(&snap, &mut world);
        restore(&snap, &mut world);

        assert_eq!(trees_in_world(&mut world).len(), 2);
        assert_eq!(fruit_count(&mut world), 2);
    }

    #[test]
    fn test_fruit_records_hang_on_rebuilt_trees() {
        let mut world = test_world();
        let doc = json!({
            "apples": [
                { "tree_x": 600, "tree_y": 0, "offset_x": 30, "offset_y": 37 },
                { "tree_x": 5, "tree_y": 5, "offset_x": 1, "offset_y": 1 }
            ]
        });
        restore(&WorldSnapshot::from_value(&doc).unwrap(), &mut world);

        // Two backed-up fruit plus one from the record; the orphan is dropped.
        assert_eq!(fruit_count(&mut world), 3);
    }

    #[test]
    fn test_plants_on_untilled_cells_are_dropped() {
        let mut world = test_world();
        let doc = json!({
            "soil": {
                "grid": [[["Farmable", "Tilled", "Planted"], ["Farmable", "Planted"]]],
                "plants": [
                    { "x": 0, "y": 0, "type": "corn", "age": 9.0 },
                    { "x": 1, "y": 0, "type": "corn", "age": 1.0 }
                ]
            }
        });
        restore(&WorldSnapshot::from_value(&doc).unwrap(), &mut world);

        let soil = world.resource::<SoilGrid>();
        assert_eq!(soil.grid().height(), 3);
        assert_eq!(soil.grid().width(), 4);
        assert_eq!(soil.plants().len(), 1);
        assert_eq!(soil.plants().get(GridPos::new(0, 0)).unwrap().age, 3.0);
        let untilled = soil.grid().get(GridPos::new(1, 0)).unwrap();
        assert!(!untilled.contains(CellTags::PLANTED));
    }

    #[test]
    fn test_watered_tags_on_uncultivated_cells_are_dropped() {
        let mut world = test_world();
        let doc = json!({ "soil": { "grid": [[["Farmable", "Watered"], ["Watered"]]] } });
        restore(&WorldSnapshot::from_value(&doc).unwrap(), &mut world);

        let soil = world.resource::<SoilGrid>();
        assert!(soil.water_overlays().is_empty());
        assert!(!soil.is_watered(GridPos::new(0, 0)));
        assert!(!soil.is_watered(GridPos::new(1, 0)));
        assert_eq!(soil.grid().get(GridPos::new(0, 0)), Some(CellTags::FARMABLE));
    }

    #[test]
    fn test_far_sparse_grid_keys_fit_the_map() {
        let mut world = test_world();
        let doc = json!({ "soil": { "grid": { "60000": { "60000": ["Farmable"] } } } });
        restore(&WorldSnapshot::from_value(&doc).unwrap(), &mut world);

        let soil = world.resource::<SoilGrid>();
        assert_eq!((soil.grid().height(), soil.grid().width()), (3, 4));
        assert!(soil.grid().iter().all(|(_, cell)| cell.is_empty()));
    }

    #[test]
    fn test_non_object_document_is_no_snapshot() {
        assert!(WorldSnapshot::from_value(&json!([])).is_none());
        assert!(WorldSnapshot::from_value(&json!("save")).is_none());
        assert!(WorldSnapshot::from_value(&Value::Null).is_none());
        assert!(WorldSnapshot::from_value(&json!({})).is_some());
    }

    #[test]
    fn test_out_of_range_version_falls_back_to_current() {
        let doc = json!({ "version": 4_294_967_297u64, "player": { "money": 5 } });
        let snap = WorldSnapshot::from_value(&doc).unwrap();
        assert_eq!(snap.version, SNAPSHOT_VERSION);
        assert_eq!(snap.player.unwrap().money, Some(5));
    }

    #[test]
    fn test_reshaped_lists_are_read() {
        let doc = json!({
            "version": 1,
            "soil": {
                "grid": { "0": { "1": ["Farmable", "Tilled"] } },
                "plants": { "0": { "x": 1, "y": 0, "type": "tomato", "age": 2 } }
            },
            "sky": { "start_color": { "0": 10, "1": 20, "2": 30 } }
        });
        let snap = WorldSnapshot::from_value(&doc).unwrap();
        let soil = snap.soil.unwrap();
        assert_eq!(soil.plants.len(), 1);
        assert_eq!(soil.plants[0].kind, CropKind::Tomato);
        assert_eq!(snap.sky.unwrap().start_color, Some([10.0, 20.0, 30.0]));
    }

    #[test]
    fn test_malformed_fields_are_skipped() {
        let doc = json!({
            "player": { "pos": "nowhere", "money": 12, "seeds": { "corn": 3 } },
            "map": { "rain": "maybe" },
            "sky": 4
        });
        let snap = WorldSnapshot::from_value(&doc).unwrap();
        let player = snap.player.unwrap();
        assert_eq!(player.pos, None);
        assert_eq!(player.money, Some(12));
        assert_eq!(player.seeds.unwrap().get(&CropKind::Corn), Some(&3));
        assert_eq!(snap.map.unwrap().rain, None);
        assert!(snap.sky.is_none());
    }
}
