//! Save slots across the local and remote backends.
//!
//! `SaveStore` owns both backends and decides which one a save or load goes
//! to from `SavePolicy`. Remote failures never undo or block a local write,
//! and a load that finds nothing anywhere is a normal outcome.

use bevy::prelude::*;
use serde_json::Value;
use thiserror::Error;

use super::local::{platform_store, LocalStore};
use super::queue::{RemoteWriteQueue, RemoteWriteResult, Submitted};
use super::remote::RemoteBackend;
use super::snapshot::WorldSnapshot;
use crate::auth::Identity;
use crate::config::{GameSettings, ReadPreference, SaveMode};
use crate::shared::NUM_SAVE_SLOTS;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not logged in")]
    Unauthenticated,
    #[error("backend unavailable: {0}")]
    Backend(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("no save slot {0}")]
    InvalidSlot(u8),
}

/// Which backends hold the latest save of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Empty,
    LocalOnly,
    RemoteOnly,
    Synced,
}

impl SlotState {
    fn from_presence(local: bool, remote: bool) -> Self {
        match (local, remote) {
            (false, false) => SlotState::Empty,
            (true, false) => SlotState::LocalOnly,
            (false, true) => SlotState::RemoteOnly,
            (true, true) => SlotState::Synced,
        }
    }

    pub fn has_local(self) -> bool {
        matches!(self, SlotState::LocalOnly | SlotState::Synced)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SavePolicy {
    pub mode: SaveMode,
    pub read_preference: ReadPreference,
    /// Cloud saves also write the local slot.
    pub mirror_locally: bool,
}

impl SavePolicy {
    pub fn from_settings(settings: &GameSettings) -> Self {
        Self {
            mode: settings.save_mode,
            read_preference: settings.read_preference,
            mirror_locally: settings.mirror_cloud_saves_locally,
        }
    }

    pub fn read_order(&self) -> &'static [Backend] {
        match self.read_preference {
            ReadPreference::RemoteFirst => &[Backend::Remote, Backend::Local],
            ReadPreference::LocalFirst => &[Backend::Local, Backend::Remote],
            ReadPreference::LocalOnly => &[Backend::Local],
        }
    }
}

/// Outcome of the remote half of a save.
#[derive(Debug)]
pub enum RemoteOutcome {
    /// The policy did not ask for a remote write.
    Skipped,
    Written,
    /// Handed to the background queue; the result arrives later.
    Queued(Submitted),
    Failed(StoreError),
}

#[derive(Debug)]
pub struct SaveReport {
    pub slot: u8,
    /// `None` when the policy did not write locally.
    pub local: Option<Result<(), StoreError>>,
    pub remote: RemoteOutcome,
}

impl SaveReport {
    /// At least one backend accepted (or is about to accept) the save.
    pub fn succeeded(&self) -> bool {
        matches!(self.local, Some(Ok(())))
            || matches!(self.remote, RemoteOutcome::Written | RemoteOutcome::Queued(_))
    }

    pub fn error_message(&self) -> Option<String> {
        let mut errors = Vec::new();
        if let Some(Err(e)) = &self.local {
            errors.push(format!("local: {e}"));
        }
        if let RemoteOutcome::Failed(e) = &self.remote {
            errors.push(format!("remote: {e}"));
        }
        (!errors.is_empty()).then(|| errors.join("; "))
    }
}

#[derive(Debug)]
pub enum LoadOutcome {
    Loaded { snapshot: WorldSnapshot, source: Backend },
    NoSnapshot,
}

/// Fires once per elapsed interval. The first poll only starts the clock.
#[derive(Debug, Clone, PartialEq)]
pub struct AutosaveTimer {
    pub interval_secs: f64,
    last: Option<f64>,
}

impl AutosaveTimer {
    pub fn new(interval_secs: f64) -> Self {
        Self {
            interval_secs,
            last: None,
        }
    }

    pub fn poll(&mut self, now_secs: f64) -> bool {
        let Some(last) = self.last else {
            self.last = Some(now_secs);
            return false;
        };
        if now_secs - last >= self.interval_secs {
            self.last = Some(now_secs);
            return true;
        }
        false
    }

    pub fn reset(&mut self, now_secs: f64) {
        self.last = Some(now_secs);
    }
}

#[derive(Resource)]
pub struct SaveStore {
    local: Box<dyn LocalStore>,
    remote: Option<RemoteBackend>,
    policy: SavePolicy,
    slots: [SlotState; NUM_SAVE_SLOTS as usize],
    autosave: AutosaveTimer,
    queue: RemoteWriteQueue,
    /// Remote writes go through the background queue instead of blocking.
    background_writes: bool,
}

impl SaveStore {
    pub fn new(local: Box<dyn LocalStore>, remote: Option<RemoteBackend>, policy: SavePolicy) -> Self {
        Self {
            local,
            remote,
            policy,
            slots: Default::default(),
            autosave: AutosaveTimer::new(30.0),
            queue: RemoteWriteQueue::default(),
            background_writes: false,
        }
    }

    pub fn from_settings(settings: &GameSettings, remote: Option<RemoteBackend>) -> Self {
        Self::new(
            platform_store(&settings.saves_dir),
            remote,
            SavePolicy::from_settings(settings),
        )
        .with_autosave_interval(settings.autosave_interval_secs)
        .with_background_writes(true)
    }

    pub fn with_autosave_interval(mut self, secs: f64) -> Self {
        self.autosave = AutosaveTimer::new(secs);
        self
    }

    pub fn with_background_writes(mut self, enabled: bool) -> Self {
        self.background_writes = enabled;
        self
    }

    pub fn policy(&self) -> SavePolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: SavePolicy) {
        self.policy = policy;
    }

    pub fn slot_state(&self, slot: u8) -> Option<SlotState> {
        self.slots.get(slot as usize).copied()
    }

    pub fn remote_idle(&self) -> bool {
        self.queue.is_idle()
    }

    fn check_slot(slot: u8) -> Result<(), StoreError> {
        if slot >= NUM_SAVE_SLOTS {
            return Err(StoreError::InvalidSlot(slot));
        }
        Ok(())
    }

    fn mark(&mut self, slot: u8, local: bool, remote: bool) {
        if let Some(state) = self.slots.get_mut(slot as usize) {
            *state = SlotState::from_presence(local, remote);
        }
    }

    /// Probes both backends for every slot.
    pub fn refresh_slot_states(&mut self, identity: Option<&Identity>) {
        for slot in 0..NUM_SAVE_SLOTS {
            let local = matches!(self.local.read(slot), Ok(Some(_)));
            let remote = match (&self.remote, identity) {
                (Some(remote), Some(_)) => matches!(remote.read(slot, identity), Ok(Some(_))),
                _ => false,
            };
            self.mark(slot, local, remote);
        }
    }

    pub fn save_local(&mut self, slot: u8, snapshot: &WorldSnapshot) -> Result<(), StoreError> {
        Self::check_slot(slot)?;
        let text = serde_json::to_string_pretty(&snapshot.to_value()?)?;
        self.local.write(slot, &text)?;
        info!("Saved slot {} to {}", slot, self.local.describe(slot));
        self.mark(slot, true, false);
        Ok(())
    }

    fn save_remote(&mut self, slot: u8, doc: Value, identity: Option<&Identity>) -> RemoteOutcome {
        let Some(remote) = &self.remote else {
            return RemoteOutcome::Failed(StoreError::Backend("no remote store configured".into()));
        };
        let Some(identity) = identity else {
            debug!("Not logged in; skipping remote save of slot {slot}");
            return RemoteOutcome::Failed(StoreError::Unauthenticated);
        };
        if self.background_writes {
            return RemoteOutcome::Queued(self.queue.submit(remote, slot, doc, identity.clone()));
        }
        match remote.write(slot, &doc, Some(identity)) {
            Ok(()) => RemoteOutcome::Written,
            Err(e) => RemoteOutcome::Failed(e),
        }
    }

    /// Saves by policy. Local mode writes the local slot only; cloud mode
    /// writes the remote slot and, when mirroring, the local one as well.
    pub fn save(
        &mut self,
        slot: u8,
        snapshot: &WorldSnapshot,
        identity: Option<&Identity>,
    ) -> Result<SaveReport, StoreError> {
        Self::check_slot(slot)?;
        let doc = snapshot.to_value()?;

        if self.policy.mode == SaveMode::Local {
            return Ok(SaveReport {
                slot,
                local: Some(self.save_local(slot, snapshot)),
                remote: RemoteOutcome::Skipped,
            });
        }

        let local = self
            .policy
            .mirror_locally
            .then(|| self.save_local(slot, snapshot));
        let remote = self.save_remote(slot, doc, identity);
        let local_ok = matches!(local, Some(Ok(())));
        match &remote {
            RemoteOutcome::Written => {
                info!("Saved slot {slot} to the remote store");
                self.mark(slot, local_ok, true);
            }
            RemoteOutcome::Failed(e) => warn!("Remote save of slot {slot} failed: {e}"),
            RemoteOutcome::Queued(_) | RemoteOutcome::Skipped => {}
        }
        Ok(SaveReport { slot, local, remote })
    }

    /// Collects background remote writes that have finished.
    pub fn poll_remote_writes(&mut self) -> Vec<RemoteWriteResult> {
        let Some(remote) = &self.remote else {
            return Vec::new();
        };
        let finished = self.queue.poll(remote);
        for done in &finished {
            match &done.result {
                Ok(()) => {
                    info!("Saved slot {} to the remote store", done.slot);
                    let local = self.policy.mirror_locally
                        && self.slot_state(done.slot).is_some_and(SlotState::has_local);
                    self.mark(done.slot, local, true);
                }
                Err(e) => warn!("Remote save of slot {} failed: {e}", done.slot),
            }
        }
        finished
    }

    fn read_local(&self, slot: u8) -> Option<WorldSnapshot> {
        match self.local.read(slot) {
            Ok(Some(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(doc) => WorldSnapshot::from_value(&doc),
                Err(e) => {
                    warn!("Local save {} is not valid JSON: {e}", self.local.describe(slot));
                    None
                }
            },
            Ok(None) => {
                debug!("No local save at {}", self.local.describe(slot));
                None
            }
            Err(e) => {
                warn!("Could not read {}: {e}", self.local.describe(slot));
                None
            }
        }
    }

    fn read_remote(&self, slot: u8, identity: Option<&Identity>) -> Option<WorldSnapshot> {
        let remote = self.remote.as_ref()?;
        // A write still on its way to the store is newer than what the store holds.
        if let Some(doc) = identity.and_then(|id| self.queue.latest_document(slot, &id.id)) {
            debug!("Remote save of slot {slot} still in progress; loading the queued copy");
            return WorldSnapshot::from_value(doc);
        }
        match remote.read(slot, identity) {
            Ok(Some(doc)) => WorldSnapshot::from_value(&doc),
            Ok(None) => {
                debug!("No remote save for slot {slot}");
                None
            }
            Err(StoreError::Unauthenticated) => {
                debug!("Not logged in; skipping remote load of slot {slot}");
                None
            }
            Err(e) => {
                warn!("Remote load of slot {slot} failed: {e}");
                None
            }
        }
    }

    /// Loads by read preference, falling through to the next backend when
    /// one has nothing. Finding nothing at all is not an error.
    pub fn load(&self, slot: u8, identity: Option<&Identity>) -> Result<LoadOutcome, StoreError> {
        self.load_from(slot, identity, self.policy.read_order())
    }

    /// Loads from the given backends in order.
    pub fn load_from(
        &self,
        slot: u8,
        identity: Option<&Identity>,
        order: &[Backend],
    ) -> Result<LoadOutcome, StoreError> {
        Self::check_slot(slot)?;
        for &backend in order {
            let found = match backend {
                Backend::Local => self.read_local(slot),
                Backend::Remote => self.read_remote(slot, identity),
            };
            if let Some(snapshot) = found {
                info!("Loaded slot {slot} from {backend:?} store");
                return Ok(LoadOutcome::Loaded {
                    snapshot,
                    source: backend,
                });
            }
        }
        Ok(LoadOutcome::NoSnapshot)
    }

    /// Autosave check for the main loop. Builds the snapshot and saves only
    /// when the interval has elapsed; the timer restarts whether or not the
    /// save succeeds.
    pub fn auto_save_if_due(
        &mut self,
        now_secs: f64,
        slot: u8,
        snapshot: impl FnOnce() -> WorldSnapshot,
        identity: Option<&Identity>,
    ) -> Option<Result<SaveReport, StoreError>> {
        if !self.autosave.poll(now_secs) {
            return None;
        }
        info!("Autosaving to slot {slot}");
        Some(self.save(slot, &snapshot(), identity))
    }

    pub fn reset_autosave(&mut self, now_secs: f64) {
        self.autosave.reset(now_secs);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::save::local::FileStore;
    use crate::save::remote::MemoryDocumentStore;
    use crate::save::snapshot::{MapRecord, PlayerRecord};

    fn identity() -> Identity {
        Identity {
            id: "farmer".into(),
            token: "token".into(),
        }
    }

    fn snapshot_with_money(money: u32) -> WorldSnapshot {
        WorldSnapshot {
            version: 1,
            player: Some(PlayerRecord {
                money: Some(money),
                ..Default::default()
            }),
            map: Some(MapRecord { rain: Some(false) }),
            ..Default::default()
        }
    }

    fn money(outcome: LoadOutcome) -> Option<u32> {
        match outcome {
            LoadOutcome::Loaded { snapshot, .. } => snapshot.player.and_then(|p| p.money),
            LoadOutcome::NoSnapshot => None,
        }
    }

    fn store(dir: &tempfile::TempDir, mode: SaveMode) -> (SaveStore, Arc<MemoryDocumentStore>) {
        let docs = Arc::new(MemoryDocumentStore::default());
        let policy = SavePolicy {
            mode,
            read_preference: ReadPreference::RemoteFirst,
            mirror_locally: true,
        };
        let store = SaveStore::new(
            Box::new(FileStore::new(dir.path())),
            Some(RemoteBackend::new(docs.clone())),
            policy,
        );
        (store, docs)
    }

    #[test]
    fn test_local_mode_never_touches_remote() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, docs) = store(&dir, SaveMode::Local);
        let report = store.save(0, &snapshot_with_money(5), Some(&identity())).unwrap();
        assert!(report.succeeded());
        assert!(matches!(report.remote, RemoteOutcome::Skipped));
        assert_eq!(docs.write_count(), 0);
        assert_eq!(store.slot_state(0), Some(SlotState::LocalOnly));
        assert!(dir.path().join("save_1.json").exists());
    }

    #[test]
    fn test_cloud_mode_mirrors_and_syncs() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, docs) = store(&dir, SaveMode::Cloud);
        store.save(1, &snapshot_with_money(8), Some(&identity())).unwrap();
        assert_eq!(docs.write_count(), 1);
        assert_eq!(store.slot_state(1), Some(SlotState::Synced));
        assert!(dir.path().join("save_2.json").exists());
    }

    #[test]
    fn test_remote_failure_keeps_local_write() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, docs) = store(&dir, SaveMode::Cloud);
        docs.set_offline(true);
        let report = store.save(0, &snapshot_with_money(3), Some(&identity())).unwrap();
        assert!(report.succeeded());
        assert!(matches!(report.remote, RemoteOutcome::Failed(StoreError::Backend(_))));
        assert!(report.error_message().unwrap().starts_with("remote:"));
        assert_eq!(store.slot_state(0), Some(SlotState::LocalOnly));
    }

    #[test]
    fn test_missing_identity_degrades_to_local() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, docs) = store(&dir, SaveMode::Cloud);
        let report = store.save(2, &snapshot_with_money(1), None).unwrap();
        assert!(matches!(report.remote, RemoteOutcome::Failed(StoreError::Unauthenticated)));
        assert_eq!(docs.write_count(), 0);
        assert_eq!(money(store.load(2, None).unwrap()), Some(1));
    }

    #[test]
    fn test_remote_first_load_falls_back_to_local() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, docs) = store(&dir, SaveMode::Local);
        store.save(0, &snapshot_with_money(11), None).unwrap();

        // Remote has nothing.
        assert_eq!(money(store.load(0, Some(&identity())).unwrap()), Some(11));
        // Remote unreachable.
        docs.set_offline(true);
        assert_eq!(money(store.load(0, Some(&identity())).unwrap()), Some(11));
    }

    #[test]
    fn test_remote_first_prefers_remote() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _docs) = store(&dir, SaveMode::Local);
        store.save(0, &snapshot_with_money(1), None).unwrap();
        store.set_policy(SavePolicy {
            mode: SaveMode::Cloud,
            mirror_locally: false,
            ..store.policy()
        });
        store.save(0, &snapshot_with_money(2), Some(&identity())).unwrap();

        let outcome = store.load(0, Some(&identity())).unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded { source: Backend::Remote, .. }));
        assert_eq!(money(outcome), Some(2));
        assert_eq!(
            money(store.load_from(0, None, &[Backend::Local]).unwrap()),
            Some(1)
        );
    }

    #[test]
    fn test_nothing_anywhere_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(&dir, SaveMode::Cloud);
        assert!(matches!(
            store.load(1, Some(&identity())).unwrap(),
            LoadOutcome::NoSnapshot
        ));
        assert!(matches!(store.load(3, None), Err(StoreError::InvalidSlot(3))));
    }

    #[test]
    fn test_corrupt_local_file_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("save_1.json"), "{ not json").unwrap();
        let (store, _) = store(&dir, SaveMode::Local);
        assert!(matches!(store.load(0, None).unwrap(), LoadOutcome::NoSnapshot));
    }

    #[test]
    fn test_autosave_fires_once_per_interval() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(&dir, SaveMode::Local);
        let mut store = store.with_autosave_interval(30.0);
        let mut fired = 0;
        for tick in 0..=120 {
            let now = 100.0 + tick as f64 * 0.5;
            if store
                .auto_save_if_due(now, 0, || snapshot_with_money(tick), None)
                .is_some()
            {
                fired += 1;
            }
        }
        // Clock starts at 100; saves at 130 and 160.
        assert_eq!(fired, 2);
    }

    #[test]
    fn test_autosave_timer_restarts_after_failed_save() {
        let dir = tempfile::tempdir().unwrap();
        let (store, docs) = store(&dir, SaveMode::Cloud);
        let mut store = store
            .with_autosave_interval(30.0)
            .with_background_writes(false);
        docs.set_offline(true);
        assert!(store.auto_save_if_due(0.0, 0, || snapshot_with_money(0), Some(&identity())).is_none());
        assert!(store.auto_save_if_due(30.0, 0, || snapshot_with_money(0), Some(&identity())).is_some());
        assert!(store.auto_save_if_due(45.0, 0, || snapshot_with_money(0), Some(&identity())).is_none());
        assert!(store.auto_save_if_due(60.0, 0, || snapshot_with_money(0), Some(&identity())).is_some());
    }

    #[test]
    fn test_refresh_slot_states() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = store(&dir, SaveMode::Cloud);
        store.save(0, &snapshot_with_money(1), Some(&identity())).unwrap();
        store.set_policy(SavePolicy {
            mirror_locally: false,
            ..store.policy()
        });
        store.save(1, &snapshot_with_money(1), Some(&identity())).unwrap();

        let mut fresh = store_sharing(&dir, &store);
        fresh.refresh_slot_states(Some(&identity()));
        assert_eq!(fresh.slot_state(0), Some(SlotState::Synced));
        assert_eq!(fresh.slot_state(1), Some(SlotState::RemoteOnly));
        assert_eq!(fresh.slot_state(2), Some(SlotState::Empty));
        fresh.refresh_slot_states(None);
        assert_eq!(fresh.slot_state(0), Some(SlotState::LocalOnly));
    }

    #[test]
    fn test_non_object_documents_fall_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("save_1.json"), "[]").unwrap();
        let (mut store, docs) = store(&dir, SaveMode::Local);
        assert!(matches!(
            store.load(0, Some(&identity())).unwrap(),
            LoadOutcome::NoSnapshot
        ));

        store.save(0, &snapshot_with_money(4), None).unwrap();
        RemoteBackend::new(docs.clone())
            .write(0, &serde_json::json!(["junk"]), Some(&identity()))
            .unwrap();
        let outcome = store.load(0, Some(&identity())).unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded { source: Backend::Local, .. }));
        assert_eq!(money(outcome), Some(4));
    }

    /// Document store whose writes take a while to land.
    struct SlowDocuments {
        inner: MemoryDocumentStore,
        delay: std::time::Duration,
    }

    impl crate::save::remote::DocumentClient for SlowDocuments {
        fn get(&self, path: &str, token: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get(path, token)
        }

        fn set(&self, path: &str, doc: &Value, token: &str) -> Result<(), StoreError> {
            std::thread::sleep(self.delay);
            self.inner.set(path, doc, token)
        }
    }

    #[test]
    fn test_load_sees_save_still_uploading() {
        use std::time::{Duration, Instant};

        bevy::tasks::IoTaskPool::get_or_init(bevy::tasks::TaskPool::new);
        let dir = tempfile::tempdir().unwrap();
        let docs = Arc::new(SlowDocuments {
            inner: MemoryDocumentStore::default(),
            delay: Duration::from_millis(300),
        });
        let policy = SavePolicy {
            mode: SaveMode::Cloud,
            read_preference: ReadPreference::RemoteFirst,
            mirror_locally: false,
        };
        let mut store = SaveStore::new(
            Box::new(FileStore::new(dir.path())),
            Some(RemoteBackend::new(docs)),
            policy,
        )
        .with_background_writes(true);
        let drain = |store: &mut SaveStore| {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !store.remote_idle() && Instant::now() < deadline {
                store.poll_remote_writes();
                std::thread::sleep(Duration::from_millis(5));
            }
        };

        store.save(0, &snapshot_with_money(1), Some(&identity())).unwrap();
        drain(&mut store);
        assert_eq!(money(store.load(0, Some(&identity())).unwrap()), Some(1));

        store.save(0, &snapshot_with_money(2), Some(&identity())).unwrap();
        assert!(!store.remote_idle());
        let outcome = store.load(0, Some(&identity())).unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded { source: Backend::Remote, .. }));
        assert_eq!(money(outcome), Some(2));

        drain(&mut store);
        assert!(store.remote_idle());
        assert_eq!(money(store.load(0, Some(&identity())).unwrap()), Some(2));
    }

    fn store_sharing(dir: &tempfile::TempDir, other: &SaveStore) -> SaveStore {
        SaveStore::new(
            Box::new(FileStore::new(dir.path())),
            other.remote.clone(),
            other.policy(),
        )
    }
}
