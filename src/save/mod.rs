//! Save domain — save slots, loading, autosave and new games.
//!
//! Snapshots are captured and restored by exclusive systems so that the
//! whole world is rebuilt inside one frame. Remote writes go to a
//! background queue and report back through `SaveCompleteEvent` when done.

use std::sync::Arc;

use bevy::ecs::event::EventCursor;
use bevy::prelude::*;

use crate::auth::{sign_in_from_settings, AuthSession, Identity};
use crate::config::GameSettings;
use crate::data::FarmMap;
use crate::farming::SoilGrid;
use crate::shared::*;
use crate::world::trees::{despawn_trees, spawn_trees};

pub mod local;
pub mod queue;
pub mod remote;
pub mod snapshot;
pub mod store;

pub use remote::{DocumentClient, FileDocumentStore, MemoryDocumentStore, RemoteBackend};
pub use snapshot::{restore, snapshot, WorldSnapshot};
pub use store::{Backend, LoadOutcome, RemoteOutcome, SaveReport, SaveStore, SlotState, StoreError};

// ═══════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════

/// Which backends a save or load request may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveRoute {
    /// Save mode and read preference from the settings.
    #[default]
    Configured,
    LocalOnly,
}

/// Sent by key bindings (or any UI) to trigger a save.
#[derive(Event, Debug, Clone)]
pub struct SaveRequestEvent {
    pub slot: u8,
    pub route: SaveRoute,
}

/// Sent to trigger loading a specific slot.
#[derive(Event, Debug, Clone)]
pub struct LoadRequestEvent {
    pub slot: u8,
    pub route: SaveRoute,
}

/// Sent once per backend after a save to it finishes (success or failure).
#[derive(Event, Debug, Clone)]
pub struct SaveCompleteEvent {
    pub slot: u8,
    pub backend: Backend,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Sent by SavePlugin after a load completes. `restored` is false when no
/// backend had anything for the slot.
#[derive(Event, Debug, Clone)]
pub struct LoadCompleteEvent {
    pub slot: u8,
    pub success: bool,
    pub restored: bool,
    pub error_message: Option<String>,
}

/// Resets the world to a fresh farm.
#[derive(Event, Debug, Clone)]
pub struct NewGameEvent {
    pub active_slot: u8,
}

// ═══════════════════════════════════════════════════════════════════════
// RESOURCES
// ═══════════════════════════════════════════════════════════════════════

/// Tracks which save slot F5/F9 and autosave use.
#[derive(Resource, Debug, Clone, Default)]
pub struct ActiveSaveSlot {
    pub slot: u8,
}

/// Client used for remote saves, overriding the file store named in the
/// settings. Without either, cloud saves fail over to the local slot.
#[derive(Resource, Clone)]
pub struct RemoteDocuments(pub Arc<dyn DocumentClient>);

/// Set once the first entry into Playing has requested its load, so that
/// coming back from Paused does not reload.
#[derive(Resource, Debug, Default)]
pub struct InitialLoad {
    pub requested: bool,
}

// ═══════════════════════════════════════════════════════════════════════
// PLUGIN
// ═══════════════════════════════════════════════════════════════════════

pub struct SavePlugin;

impl Plugin for SavePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<InitialLoad>()
            .add_event::<SaveRequestEvent>()
            .add_event::<LoadRequestEvent>()
            .add_event::<SaveCompleteEvent>()
            .add_event::<LoadCompleteEvent>()
            .add_event::<NewGameEvent>()
            .add_systems(Startup, init_save_store.after(sign_in_from_settings))
            .add_systems(OnEnter(GameState::Playing), request_initial_load)
            .add_systems(
                Update,
                (
                    save_keybinds,
                    handle_new_game,
                    handle_load_requests,
                    handle_save_requests,
                )
                    .chain()
                    .run_if(in_state(GameState::Playing).or(in_state(GameState::Paused))),
            )
            .add_systems(
                Update,
                autosave
                    .after(handle_save_requests)
                    .run_if(in_state(GameState::Playing)),
            )
            .add_systems(Update, poll_remote_saves);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// SYSTEMS
// ═══════════════════════════════════════════════════════════════════════

/// Builds the save store from settings unless one was inserted already.
pub fn init_save_store(world: &mut World) {
    let settings = world
        .get_resource::<GameSettings>()
        .cloned()
        .unwrap_or_default();

    if !world.contains_resource::<ActiveSaveSlot>() {
        let slot = settings.active_slot.min(NUM_SAVE_SLOTS - 1);
        world.insert_resource(ActiveSaveSlot { slot });
    }
    if world.contains_resource::<SaveStore>() {
        return;
    }

    let remote = match (world.get_resource::<RemoteDocuments>(), &settings.remote) {
        (Some(docs), _) => Some(RemoteBackend::new(docs.0.clone())),
        (None, Some(remote)) => {
            info!("Remote saves go to {}", remote.documents_dir.display());
            Some(RemoteBackend::new(Arc::new(FileDocumentStore::new(&remote.documents_dir))))
        }
        (None, None) => {
            info!("No remote document store; saves stay local");
            None
        }
    };
    let identity = current_identity(world);
    let mut store = SaveStore::from_settings(&settings, remote);
    store.refresh_slot_states(identity.as_ref());
    for slot in 0..NUM_SAVE_SLOTS {
        debug!("Slot {}: {:?}", slot, store.slot_state(slot));
    }
    world.insert_resource(store);
}

fn current_identity(world: &World) -> Option<Identity> {
    world
        .get_resource::<AuthSession>()
        .and_then(|session| session.identity().cloned())
}

fn request_initial_load(
    mut initial: ResMut<InitialLoad>,
    active_slot: Res<ActiveSaveSlot>,
    mut load_writer: EventWriter<LoadRequestEvent>,
) {
    if initial.requested {
        return;
    }
    initial.requested = true;
    load_writer.send(LoadRequestEvent {
        slot: active_slot.slot,
        route: SaveRoute::Configured,
    });
}

/// 1/2/3 save locally, 4/5/6 load locally, F5/F9 save/load the active slot
/// through the configured backends.
pub fn save_keybinds(
    keyboard: Res<ButtonInput<KeyCode>>,
    active_slot: Res<ActiveSaveSlot>,
    mut save_writer: EventWriter<SaveRequestEvent>,
    mut load_writer: EventWriter<LoadRequestEvent>,
) {
    const SAVE_KEYS: [KeyCode; 3] = [KeyCode::Digit1, KeyCode::Digit2, KeyCode::Digit3];
    const LOAD_KEYS: [KeyCode; 3] = [KeyCode::Digit4, KeyCode::Digit5, KeyCode::Digit6];

    for (slot, key) in (0u8..).zip(SAVE_KEYS) {
        if keyboard.just_pressed(key) {
            save_writer.send(SaveRequestEvent { slot, route: SaveRoute::LocalOnly });
        }
    }
    for (slot, key) in (0u8..).zip(LOAD_KEYS) {
        if keyboard.just_pressed(key) {
            load_writer.send(LoadRequestEvent { slot, route: SaveRoute::LocalOnly });
        }
    }
    if keyboard.just_pressed(KeyCode::F5) {
        info!("F5 quicksave to slot {}", active_slot.slot);
        save_writer.send(SaveRequestEvent {
            slot: active_slot.slot,
            route: SaveRoute::Configured,
        });
    }
    if keyboard.just_pressed(KeyCode::F9) {
        info!("F9 quickload from slot {}", active_slot.slot);
        load_writer.send(LoadRequestEvent {
            slot: active_slot.slot,
            route: SaveRoute::Configured,
        });
    }
}

/// Reads the events this system has not seen yet, leaving them in place
/// for any other reader.
fn read_events<E: Event + Clone>(world: &World, cursor: &mut EventCursor<E>) -> Vec<E> {
    world
        .get_resource::<Events<E>>()
        .map(|events| cursor.read(events).cloned().collect())
        .unwrap_or_default()
}

/// Turns a save report into one completion event per backend that finished.
fn report_events(report: &SaveReport) -> Vec<SaveCompleteEvent> {
    let mut events = Vec::new();
    if let Some(local) = &report.local {
        events.push(SaveCompleteEvent {
            slot: report.slot,
            backend: Backend::Local,
            success: local.is_ok(),
            error_message: local.as_ref().err().map(ToString::to_string),
        });
    }
    match &report.remote {
        RemoteOutcome::Written => events.push(SaveCompleteEvent {
            slot: report.slot,
            backend: Backend::Remote,
            success: true,
            error_message: None,
        }),
        RemoteOutcome::Failed(StoreError::Unauthenticated) => {}
        RemoteOutcome::Failed(e) => events.push(SaveCompleteEvent {
            slot: report.slot,
            backend: Backend::Remote,
            success: false,
            error_message: Some(e.to_string()),
        }),
        RemoteOutcome::Skipped | RemoteOutcome::Queued(_) => {}
    }
    events
}

fn failed_save(slot: u8, error: &StoreError) -> SaveCompleteEvent {
    SaveCompleteEvent {
        slot,
        backend: Backend::Local,
        success: false,
        error_message: Some(error.to_string()),
    }
}

pub fn handle_save_requests(world: &mut World, mut cursor: Local<EventCursor<SaveRequestEvent>>) {
    let requests = read_events(world, &mut cursor);
    if requests.is_empty() {
        return;
    }
    if !world.contains_resource::<SaveStore>() {
        warn!("Save requested before the save store exists");
        return;
    }
    let identity = current_identity(world);

    for request in requests {
        let slot = request.slot;
        info!("Saving to slot {}...", slot);
        let snap = snapshot(world);
        let mut store = world.resource_mut::<SaveStore>();

        let events = match request.route {
            SaveRoute::LocalOnly => match store.save_local(slot, &snap) {
                Ok(()) => vec![SaveCompleteEvent {
                    slot,
                    backend: Backend::Local,
                    success: true,
                    error_message: None,
                }],
                Err(e) => {
                    warn!("Save to slot {} failed: {}", slot, e);
                    vec![failed_save(slot, &e)]
                }
            },
            SaveRoute::Configured => match store.save(slot, &snap, identity.as_ref()) {
                Ok(report) => report_events(&report),
                Err(e) => {
                    warn!("Save to slot {} failed: {}", slot, e);
                    vec![failed_save(slot, &e)]
                }
            },
        };

        if events.iter().any(|e| e.success) {
            if let Some(mut active) = world.get_resource_mut::<ActiveSaveSlot>() {
                active.slot = slot;
            }
        }
        for event in events {
            world.send_event(event);
        }
    }
}

pub fn handle_load_requests(world: &mut World, mut cursor: Local<EventCursor<LoadRequestEvent>>) {
    let requests = read_events(world, &mut cursor);
    if requests.is_empty() {
        return;
    }
    let identity = current_identity(world);

    for request in requests {
        let slot = request.slot;
        info!("Loading from slot {}...", slot);
        let Some(store) = world.get_resource::<SaveStore>() else {
            warn!("Load requested before the save store exists");
            return;
        };
        let outcome = match request.route {
            SaveRoute::Configured => store.load(slot, identity.as_ref()),
            SaveRoute::LocalOnly => store.load_from(slot, identity.as_ref(), &[Backend::Local]),
        };

        let event = match outcome {
            Ok(LoadOutcome::Loaded { snapshot, source }) => {
                restore(&snapshot, world);
                if let Some(mut active) = world.get_resource_mut::<ActiveSaveSlot>() {
                    active.slot = slot;
                }
                info!("Load from slot {} succeeded ({:?}).", slot, source);
                LoadCompleteEvent {
                    slot,
                    success: true,
                    restored: true,
                    error_message: None,
                }
            }
            Ok(LoadOutcome::NoSnapshot) => {
                info!("Slot {} is empty; keeping the current world", slot);
                LoadCompleteEvent {
                    slot,
                    success: true,
                    restored: false,
                    error_message: None,
                }
            }
            Err(e) => {
                warn!("Load from slot {} failed: {}", slot, e);
                LoadCompleteEvent {
                    slot,
                    success: false,
                    restored: false,
                    error_message: Some(e.to_string()),
                }
            }
        };
        world.send_event(event);
    }
}

fn real_seconds(world: &World) -> Option<f64> {
    world
        .get_resource::<Time<Real>>()
        .map(|time| time.elapsed_secs_f64())
}

/// Saves the active slot every autosave interval of real time.
pub fn autosave(world: &mut World) {
    if !world.contains_resource::<SaveStore>() {
        return;
    }
    let Some(now) = real_seconds(world) else {
        return;
    };
    let slot = world
        .get_resource::<ActiveSaveSlot>()
        .map_or(0, |active| active.slot);
    let identity = current_identity(world);

    let result = world.resource_scope(|world, mut store: Mut<SaveStore>| {
        store.auto_save_if_due(now, slot, || snapshot(world), identity.as_ref())
    });
    let events = match result {
        None => return,
        Some(Ok(report)) => report_events(&report),
        Some(Err(e)) => {
            warn!("Autosave to slot {} failed: {}", slot, e);
            vec![failed_save(slot, &e)]
        }
    };
    for event in events {
        world.send_event(event);
    }
}

pub fn poll_remote_saves(
    store: Option<ResMut<SaveStore>>,
    mut complete_writer: EventWriter<SaveCompleteEvent>,
) {
    let Some(mut store) = store else {
        return;
    };
    for done in store.poll_remote_writes() {
        complete_writer.send(SaveCompleteEvent {
            slot: done.slot,
            backend: Backend::Remote,
            success: done.result.is_ok(),
            error_message: done.result.err().map(|e| e.to_string()),
        });
    }
}

/// Resets player, soil, weather, sky and trees to a fresh farm.
pub fn handle_new_game(world: &mut World, mut cursor: Local<EventCursor<NewGameEvent>>) {
    let Some(event) = read_events(world, &mut cursor).pop() else {
        return;
    };
    info!("Starting new game in slot {}", event.active_slot);

    let map = world.get_resource::<FarmMap>().cloned().unwrap_or_default();
    world.insert_resource(PlayerState {
        position: map.player_start(),
        ..default()
    });
    world.insert_resource(SoilGrid::new(map.farmable_grid()));
    world.insert_resource(Weather::default());
    world.insert_resource(SkyState::default());
    despawn_trees(world);
    spawn_trees(world);

    let slot = event.active_slot.min(NUM_SAVE_SLOTS - 1);
    match world.get_resource_mut::<ActiveSaveSlot>() {
        Some(mut active) => active.slot = slot,
        None => world.insert_resource(ActiveSaveSlot { slot }),
    }
    let now = real_seconds(world).unwrap_or_default();
    if let Some(mut store) = world.get_resource_mut::<SaveStore>() {
        store.reset_autosave(now);
    }
    info!("New game initialized.");
}
