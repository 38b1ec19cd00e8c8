//! Player domain — movement, hotbar selection, tool and seed use, sleeping,
//! and picking up ripe crops by walking into them.

use bevy::prelude::*;

use crate::data::FarmMap;
use crate::farming::SoilGrid;
use crate::shared::*;

pub const PLAYER_SPEED: f32 = 200.0;

/// Cooldown timer to prevent tool spam.
#[derive(Resource)]
pub struct ToolCooldown {
    pub timer: Timer,
}

impl Default for ToolCooldown {
    fn default() -> Self {
        let mut timer = Timer::from_seconds(0.35, TimerMode::Once);
        // Ready on the first press.
        timer.tick(timer.duration());
        Self { timer }
    }
}

pub struct PlayerPlugin;

impl Plugin for PlayerPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ToolCooldown>();

        app.add_systems(OnExit(GameState::Loading), spawn_player);

        app.add_systems(
            Update,
            (
                player_movement,
                hotbar_cycle,
                use_selected_item.after(player_movement),
                go_to_bed,
                collect_ripe_plants.after(player_movement),
                apply_item_pickups,
                sync_player_transform.after(player_movement),
                camera_follow_player.after(sync_player_transform),
            )
                .run_if(in_state(GameState::Playing)),
        );

        app.add_systems(Update, toggle_pause);
    }
}

fn spawn_player(mut commands: Commands, map: Res<FarmMap>, mut player: ResMut<PlayerState>) {
    player.position = map.player_start();
    commands.spawn((
        Sprite {
            color: Color::srgb(0.85, 0.70, 0.50),
            custom_size: Some(PLAYER_HITBOX_SIZE),
            ..default()
        },
        Transform::from_translation(map_to_world(player.position, layers::MAIN)),
        Player,
    ));
}

/// WASD / arrow keys. Map y grows downward, so Up subtracts.
pub fn player_movement(
    time: Res<Time>,
    keyboard: Res<ButtonInput<KeyCode>>,
    mut player: ResMut<PlayerState>,
) {
    if player.sleeping {
        return;
    }

    let mut dir = Vec2::ZERO;
    if keyboard.pressed(KeyCode::KeyW) || keyboard.pressed(KeyCode::ArrowUp) {
        dir.y -= 1.0;
    }
    if keyboard.pressed(KeyCode::KeyS) || keyboard.pressed(KeyCode::ArrowDown) {
        dir.y += 1.0;
    }
    if keyboard.pressed(KeyCode::KeyA) || keyboard.pressed(KeyCode::ArrowLeft) {
        dir.x -= 1.0;
    }
    if keyboard.pressed(KeyCode::KeyD) || keyboard.pressed(KeyCode::ArrowRight) {
        dir.x += 1.0;
    }
    if dir == Vec2::ZERO {
        return;
    }

    // Diagonals face along the vertical axis.
    player.facing = if dir.y.abs() >= dir.x.abs() {
        if dir.y < 0.0 {
            Facing::Up
        } else {
            Facing::Down
        }
    } else if dir.x < 0.0 {
        Facing::Left
    } else {
        Facing::Right
    };

    let delta = dir.normalize() * PLAYER_SPEED * time.delta_secs();
    player.position += delta;
}

/// Q cycles through tools, E through seeds.
pub fn hotbar_cycle(keyboard: Res<ButtonInput<KeyCode>>, mut player: ResMut<PlayerState>) {
    let want_tool = keyboard.just_pressed(KeyCode::KeyQ);
    let want_seed = keyboard.just_pressed(KeyCode::KeyE);
    if !want_tool && !want_seed {
        return;
    }

    let is_tool = |i: usize| matches!(HOTBAR[i], HotbarItem::Tool(_));
    let len = HOTBAR.len();
    let start = player.selected % len;
    let next = (1..=len)
        .map(|step| (start + step) % len)
        .find(|&i| is_tool(i) == want_tool);
    if let Some(index) = next {
        player.selected = index;
        debug!("Selected {:?}", HOTBAR[index]);
    }
}

/// Space uses whatever the hotbar points at, at the tile in front of the player.
pub fn use_selected_item(
    time: Res<Time>,
    keyboard: Res<ButtonInput<KeyCode>>,
    mut cooldown: ResMut<ToolCooldown>,
    player: Res<PlayerState>,
    mut tool_events: EventWriter<ToolUseEvent>,
    mut seed_events: EventWriter<PlantSeedEvent>,
) {
    cooldown.timer.tick(time.delta());
    if player.sleeping || !keyboard.just_pressed(KeyCode::Space) || !cooldown.timer.finished() {
        return;
    }
    cooldown.timer.reset();

    let target = player.tool_target();
    match player.selected_item() {
        HotbarItem::Tool(tool) => {
            tool_events.send(ToolUseEvent { tool, target });
        }
        HotbarItem::Seed(crop) => {
            seed_events.send(PlantSeedEvent { crop, target });
        }
    }
}

/// Tab while standing at the bed puts the player to sleep.
pub fn go_to_bed(
    keyboard: Res<ButtonInput<KeyCode>>,
    map: Res<FarmMap>,
    mut player: ResMut<PlayerState>,
) {
    if !keyboard.just_pressed(KeyCode::Tab) || player.sleeping {
        return;
    }
    if player.hitbox().intersect(map.bed_rect()).is_empty() {
        return;
    }
    player.sleeping = true;
    info!("Player went to bed");
}

/// Walking into a ripe plant harvests it.
pub fn collect_ripe_plants(
    mut player: ResMut<PlayerState>,
    mut soil: ResMut<SoilGrid>,
    mut harvested_writer: EventWriter<CropHarvestedEvent>,
    mut sfx_writer: EventWriter<PlaySfxEvent>,
) {
    let reach = player.hitbox();
    let any_ripe = soil
        .plants()
        .iter()
        .any(|p| p.harvestable() && !p.rect().intersect(reach).is_empty());
    if !any_ripe {
        return;
    }

    for plant in soil.harvest(reach) {
        player.add_item(plant.kind.harvest_item(), 1);
        harvested_writer.send(CropHarvestedEvent {
            crop: plant.kind,
            x: plant.pos.x,
            y: plant.pos.y,
        });
        sfx_writer.send(PlaySfxEvent { sfx_id: "success".to_string() });
    }
}

pub fn apply_item_pickups(
    mut pickups: EventReader<ItemPickupEvent>,
    mut player: ResMut<PlayerState>,
) {
    for event in pickups.read() {
        player.add_item(event.item, event.quantity);
    }
}

fn sync_player_transform(
    player: Res<PlayerState>,
    mut query: Query<&mut Transform, With<Player>>,
) {
    if !player.is_changed() {
        return;
    }
    for mut transform in &mut query {
        transform.translation = map_to_world(player.position, layers::MAIN);
    }
}

fn camera_follow_player(
    player: Res<PlayerState>,
    mut cameras: Query<&mut Transform, (With<Camera2d>, Without<Player>)>,
) {
    for mut transform in &mut cameras {
        let target = map_to_world(player.position, transform.translation.z);
        transform.translation = target;
    }
}

/// Escape flips between Playing and Paused.
fn toggle_pause(
    keyboard: Res<ButtonInput<KeyCode>>,
    state: Res<State<GameState>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if !keyboard.just_pressed(KeyCode::Escape) {
        return;
    }
    match state.get() {
        GameState::Playing => next_state.set(GameState::Paused),
        GameState::Paused => next_state.set(GameState::Playing),
        GameState::Loading => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hotbar_cycle_skips_to_kind() {
        let mut app = App::new();
        app.init_resource::<ButtonInput<KeyCode>>()
            .init_resource::<PlayerState>()
            .add_systems(Update, hotbar_cycle);

        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .press(KeyCode::KeyE);
        app.update();
        assert_eq!(
            app.world().resource::<PlayerState>().selected_item(),
            HotbarItem::Seed(CropKind::Corn)
        );

        let mut keys = app.world_mut().resource_mut::<ButtonInput<KeyCode>>();
        keys.release(KeyCode::KeyE);
        keys.clear();
        keys.press(KeyCode::KeyQ);
        app.update();
        assert_eq!(
            app.world().resource::<PlayerState>().selected_item(),
            HotbarItem::Tool(ToolKind::Hoe)
        );
    }
}
