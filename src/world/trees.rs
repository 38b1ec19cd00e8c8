//! Trees and the fruit hanging on them.
//!
//! Fruit are child entities of their tree, positioned by an offset from the
//! tree's top-left corner. Snapshots record fruit by that offset plus the
//! tree's position, because a reload rebuilds trees as new entities.

use bevy::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::data::{FarmMap, TreeSize, TreeSpawn};
use crate::shared::*;

pub const TREE_MAX_HEALTH: u32 = 5;
pub const FRUIT_SIZE: Vec2 = Vec2::splat(16.0);

#[derive(Component, Debug, Clone, PartialEq)]
pub struct Tree {
    pub size: TreeSize,
    /// Top-left corner in map pixels.
    pub top_left: IVec2,
    pub health: u32,
    pub alive: bool,
}

impl Tree {
    pub fn new(spawn: &TreeSpawn) -> Self {
        Self {
            size: spawn.size,
            top_left: IVec2::new(spawn.x, spawn.y),
            health: TREE_MAX_HEALTH,
            alive: true,
        }
    }

    pub fn rect(&self) -> Rect {
        let min = self.top_left.as_vec2();
        Rect::from_corners(min, min + self.size.size())
    }
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fruit {
    pub offset: IVec2,
}

fn tree_color(alive: bool) -> Color {
    if alive {
        Color::srgb(0.20, 0.45, 0.20)
    } else {
        Color::srgb(0.40, 0.30, 0.20)
    }
}

fn tree_bundle(tree: Tree) -> impl Bundle {
    let rect = tree.rect();
    (
        Sprite {
            color: tree_color(tree.alive),
            custom_size: Some(rect.size()),
            ..default()
        },
        Transform::from_translation(map_to_world(rect.center(), layers::MAIN)),
        tree,
    )
}

/// Fruit sprite placed relative to its parent tree's transform.
fn fruit_bundle(tree: &Tree, offset: IVec2) -> impl Bundle {
    let delta = offset.as_vec2() + FRUIT_SIZE / 2.0 - tree.size.size() / 2.0;
    (
        Sprite {
            color: Color::srgb(0.85, 0.15, 0.15),
            custom_size: Some(FRUIT_SIZE),
            ..default()
        },
        Transform::from_xyz(delta.x, -delta.y, layers::FRUIT - layers::MAIN),
        Fruit { offset },
    )
}

/// Each anchor independently bears fruit with a 2-in-11 chance.
pub fn roll_fruit(size: TreeSize, rng: &mut impl Rng) -> Vec<IVec2> {
    size.fruit_anchors()
        .iter()
        .filter(|_| rng.gen_range(0..=10) < 2)
        .map(|&(x, y)| IVec2::new(x, y))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// World-level helpers (exclusive systems and restore)
// ─────────────────────────────────────────────────────────────────────────────

pub fn spawn_tree(world: &mut World, spawn: &TreeSpawn, fruit: &[IVec2]) -> Entity {
    let tree = Tree::new(spawn);
    let mut entity = world.spawn(tree_bundle(tree.clone()));
    entity.with_children(|parent| {
        for &offset in fruit {
            parent.spawn(fruit_bundle(&tree, offset));
        }
    });
    entity.id()
}

/// Spawns every tree of the map with no fruit.
pub fn spawn_map_trees(world: &mut World, map: &FarmMap) -> Vec<Entity> {
    map.trees
        .iter()
        .map(|spawn| spawn_tree(world, spawn, &[]))
        .collect()
}

pub fn fruit_offsets(world: &World, tree: Entity) -> Vec<IVec2> {
    let Some(children) = world.get::<Children>(tree) else {
        return Vec::new();
    };
    children
        .iter()
        .filter_map(|&child| world.get::<Fruit>(child).map(|f| f.offset))
        .collect()
}

/// Live trees as (entity, top-left, alive).
pub fn trees_in_world(world: &mut World) -> Vec<(Entity, IVec2, bool)> {
    let mut query = world.query::<(Entity, &Tree)>();
    query
        .iter(world)
        .map(|(entity, tree)| (entity, tree.top_left, tree.alive))
        .collect()
}

/// Despawns all trees with their fruit; returns each tree's position and fruit offsets.
pub fn despawn_trees(world: &mut World) -> Vec<(IVec2, Vec<IVec2>)> {
    let trees = trees_in_world(world);
    let mut backup = Vec::with_capacity(trees.len());
    for (entity, top_left, _) in trees {
        backup.push((top_left, fruit_offsets(world, entity)));
        world.entity_mut(entity).despawn_recursive();
    }
    backup
}

/// Hangs a fruit on `tree` at `offset` unless one is already there.
pub fn attach_fruit(world: &mut World, tree: Entity, offset: IVec2) -> bool {
    let Some(tree_data) = world.get::<Tree>(tree).cloned() else {
        return false;
    };
    if !tree_data.alive || fruit_offsets(world, tree).contains(&offset) {
        return false;
    }
    world.entity_mut(tree).with_children(|parent| {
        parent.spawn(fruit_bundle(&tree_data, offset));
    });
    true
}

// ─────────────────────────────────────────────────────────────────────────────
// Systems
// ─────────────────────────────────────────────────────────────────────────────

/// Populates the farm's trees, each with a fresh roll of fruit.
pub fn spawn_trees(world: &mut World) {
    let Some(map) = world.get_resource::<FarmMap>().cloned() else {
        warn!("No farm map loaded, skipping tree spawn");
        return;
    };
    let mut rng = rand::thread_rng();
    for spawn in &map.trees {
        let fruit = roll_fruit(spawn.size, &mut rng);
        spawn_tree(world, spawn, &fruit);
    }
    info!("Spawned {} trees", map.trees.len());
}

/// Axe hits: knock off one fruit if any, and fell the tree at zero health.
pub fn handle_axe(
    mut commands: Commands,
    mut tool_events: EventReader<ToolUseEvent>,
    mut trees: Query<(Entity, &mut Tree, &mut Sprite, Option<&Children>)>,
    fruit: Query<(), With<Fruit>>,
    mut pickup_writer: EventWriter<ItemPickupEvent>,
    mut sfx_writer: EventWriter<PlaySfxEvent>,
) {
    let mut rng = rand::thread_rng();
    for event in tool_events.read() {
        if event.tool != ToolKind::Axe {
            continue;
        }
        for (entity, mut tree, mut sprite, children) in trees.iter_mut() {
            if !tree.alive || !tree.rect().contains(event.target) {
                continue;
            }

            tree.health = tree.health.saturating_sub(1);
            sfx_writer.send(PlaySfxEvent { sfx_id: "axe".to_string() });

            let hanging: Vec<Entity> = children
                .map(|c| c.iter().copied().filter(|&e| fruit.contains(e)).collect())
                .unwrap_or_default();
            if let Some(&dropped) = hanging.choose(&mut rng) {
                commands.entity(dropped).despawn_recursive();
                pickup_writer.send(ItemPickupEvent { item: ItemKind::Apple, quantity: 1 });
            }

            if tree.health == 0 {
                tree.alive = false;
                sprite.color = tree_color(false);
                commands.entity(entity).despawn_descendants();
                pickup_writer.send(ItemPickupEvent { item: ItemKind::Wood, quantity: 1 });
                info!("Tree at {:?} felled", tree.top_left);
            }
            break;
        }
    }
}

/// New day: every standing tree drops its fruit and grows a fresh set.
pub fn regrow_fruit(
    mut commands: Commands,
    mut day_end_events: EventReader<DayEndEvent>,
    trees: Query<(Entity, &Tree)>,
) {
    if day_end_events.read().count() == 0 {
        return;
    }
    let mut rng = rand::thread_rng();
    for (entity, tree) in &trees {
        if !tree.alive {
            continue;
        }
        let offsets = roll_fruit(tree.size, &mut rng);
        commands
            .entity(entity)
            .despawn_descendants()
            .with_children(|parent| {
                for offset in offsets {
                    parent.spawn(fruit_bundle(tree, offset));
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_tree() -> TreeSpawn {
        TreeSpawn { size: TreeSize::Small, x: 100, y: 200 }
    }

    #[test]
    fn test_roll_fruit_uses_anchors() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let fruit = roll_fruit(TreeSize::Large, &mut rng);
            for offset in fruit {
                assert!(TreeSize::Large
                    .fruit_anchors()
                    .contains(&(offset.x, offset.y)));
            }
        }
    }

    #[test]
    fn test_attach_fruit_skips_duplicates() {
        let mut world = World::new();
        let tree = spawn_tree(&mut world, &small_tree(), &[IVec2::new(18, 17)]);
        assert!(!attach_fruit(&mut world, tree, IVec2::new(18, 17)));
        assert!(attach_fruit(&mut world, tree, IVec2::new(30, 37)));
        assert_eq!(fruit_offsets(&world, tree).len(), 2);
    }

    #[test]
    fn test_despawn_trees_backs_up_fruit() {
        let mut world = World::new();
        spawn_tree(&mut world, &small_tree(), &[IVec2::new(12, 50)]);
        let backup = despawn_trees(&mut world);
        assert_eq!(backup, vec![(IVec2::new(100, 200), vec![IVec2::new(12, 50)])]);
        assert!(trees_in_world(&mut world).is_empty());
        assert_eq!(world.query::<&Fruit>().iter(&world).count(), 0);
    }

    #[test]
    fn test_tree_rect() {
        let tree = Tree::new(&small_tree());
        assert_eq!(tree.rect().min, Vec2::new(100.0, 200.0));
        assert_eq!(tree.rect().max, Vec2::new(196.0, 328.0));
    }
}
