//! Local save slots: one pretty-printed JSON file per slot on native,
//! `localStorage` entries in the browser.

#[cfg(not(target_arch = "wasm32"))]
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(target_arch = "wasm32")]
use bevy::log::debug;

use super::store::StoreError;

/// Raw text storage for save slots. Reading a slot that was never written
/// returns `Ok(None)`.
pub trait LocalStore: Send + Sync {
    fn read(&self, slot: u8) -> Result<Option<String>, StoreError>;
    fn write(&self, slot: u8, text: &str) -> Result<(), StoreError>;
    fn describe(&self, slot: u8) -> String;
}

/// `save_1.json` for slot 0, `save_2.json` for slot 1, …
pub fn slot_file_name(slot: u8) -> String {
    format!("save_{}.json", u16::from(slot) + 1)
}

/// Save files in one directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn slot_path(&self, slot: u8) -> PathBuf {
        self.dir.join(slot_file_name(slot))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl LocalStore for FileStore {
    fn read(&self, slot: u8) -> Result<Option<String>, StoreError> {
        let path = self.slot_path(slot);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path)?))
    }

    fn write(&self, slot: u8, text: &str) -> Result<(), StoreError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        let path = self.slot_path(slot);
        // Write to a temp file first, then rename for atomicity
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, text)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn describe(&self, slot: u8) -> String {
        self.slot_path(slot).display().to_string()
    }
}

#[cfg(target_arch = "wasm32")]
impl LocalStore for FileStore {
    fn read(&self, _slot: u8) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    fn write(&self, _slot: u8, _text: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("no filesystem in the browser".into()))
    }

    fn describe(&self, slot: u8) -> String {
        self.slot_path(slot).display().to_string()
    }
}

/// Browser `localStorage`, keyed by the same file names.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Default)]
pub struct WebStorageStore;

#[cfg(target_arch = "wasm32")]
impl WebStorageStore {
    fn storage() -> Result<web_sys::Storage, StoreError> {
        web_sys::window()
            .and_then(|w| w.local_storage().ok().flatten())
            .ok_or_else(|| StoreError::Backend("localStorage unavailable".into()))
    }
}

#[cfg(target_arch = "wasm32")]
impl LocalStore for WebStorageStore {
    fn read(&self, slot: u8) -> Result<Option<String>, StoreError> {
        Self::storage()?
            .get_item(&slot_file_name(slot))
            .map_err(|e| StoreError::Backend(format!("{e:?}")))
    }

    fn write(&self, slot: u8, text: &str) -> Result<(), StoreError> {
        Self::storage()?
            .set_item(&slot_file_name(slot), text)
            .map_err(|e| StoreError::Backend(format!("{e:?}")))
    }

    fn describe(&self, slot: u8) -> String {
        format!("localStorage[{}]", slot_file_name(slot))
    }
}

/// The platform's local store rooted at `dir`.
pub fn platform_store(dir: &Path) -> Box<dyn LocalStore> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        Box::new(FileStore::new(dir))
    }
    #[cfg(target_arch = "wasm32")]
    {
        debug!("Ignoring saves dir {} in the browser", dir.display());
        Box::new(WebStorageStore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_file_names_are_one_based() {
        assert_eq!(slot_file_name(0), "save_1.json");
        assert_eq!(slot_file_name(2), "save_3.json");
        assert_eq!(slot_file_name(255), "save_256.json");
    }

    #[test]
    fn test_missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.read(1).unwrap().is_none());
    }

    #[test]
    fn test_write_creates_dir_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("saves"));
        store.write(0, "{\"version\": 1}").unwrap();
        store.write(0, "{\"version\": 2}").unwrap();

        assert_eq!(store.read(0).unwrap().as_deref(), Some("{\"version\": 2}"));
        let names: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["save_1.json".to_string()]);
    }
}
