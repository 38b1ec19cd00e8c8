//! Remote save slots in a keyed document store.
//!
//! Documents live at `users/{id}/saves/slot_{n}` and are read and written
//! with the player's identity token. The store keeps no arrays: lists are
//! written as maps keyed by index, and nulls and empty collections are not
//! stored at all. A list only comes back as a list when more than half of
//! its indices are present. Whatever is read from here must go through the
//! lenient snapshot parser and the grid codec.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bevy::prelude::*;
use serde_json::{Map, Value};

use super::store::StoreError;
use crate::auth::Identity;

/// Transport to the document store.
pub trait DocumentClient: Send + Sync {
    fn get(&self, path: &str, token: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, path: &str, doc: &Value, token: &str) -> Result<(), StoreError>;
}

pub fn slot_document_path(user_id: &str, slot: u8) -> String {
    format!("users/{user_id}/saves/slot_{slot}")
}

/// Save-slot view of a document store. Cloning shares the client.
#[derive(Clone)]
pub struct RemoteBackend {
    client: Arc<dyn DocumentClient>,
}

impl std::fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBackend").finish_non_exhaustive()
    }
}

impl RemoteBackend {
    pub fn new(client: Arc<dyn DocumentClient>) -> Self {
        Self { client }
    }

    pub fn read(&self, slot: u8, identity: Option<&Identity>) -> Result<Option<Value>, StoreError> {
        let identity = identity.ok_or(StoreError::Unauthenticated)?;
        self.client
            .get(&slot_document_path(&identity.id, slot), &identity.token)
    }

    pub fn write(&self, slot: u8, doc: &Value, identity: Option<&Identity>) -> Result<(), StoreError> {
        let identity = identity.ok_or(StoreError::Unauthenticated)?;
        self.client
            .set(&slot_document_path(&identity.id, slot), doc, &identity.token)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════

/// Converts a document into the shape the store keeps. `None` means
/// nothing is stored.
pub fn store_shape(value: &Value) -> Option<Value> {
    let entries: Map<String, Value> = match value {
        Value::Null => return None,
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| store_shape(item).map(|v| (i.to_string(), v)))
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(k, item)| store_shape(item).map(|v| (k.clone(), v)))
            .collect(),
        leaf => return Some(leaf.clone()),
    };
    (!entries.is_empty()).then_some(Value::Object(entries))
}

fn array_index(key: &str) -> Option<usize> {
    let index: usize = key.parse().ok()?;
    (index.to_string() == key).then_some(index)
}

/// What a read returns for a stored value: index-keyed maps that are more
/// than half full become arrays with null gaps.
pub fn read_shape(value: &Value) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };
    let children: Map<String, Value> = map
        .iter()
        .map(|(k, v)| (k.clone(), read_shape(v)))
        .collect();

    let indices: Option<Vec<usize>> = children.keys().map(|k| array_index(k)).collect();
    if let Some(indices) = indices {
        if let Some(&max) = indices.iter().max() {
            if indices.len() * 2 > max + 1 {
                let mut items = vec![Value::Null; max + 1];
                for (index, (_, child)) in indices.into_iter().zip(children) {
                    items[index] = child;
                }
                return Value::Array(items);
            }
        }
    }
    Value::Object(children)
}

/// Document store kept in memory, reshaping documents the way the real
/// store does. Used in tests.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<String, Value>>,
    offline: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryDocumentStore {
    /// Makes every call fail as if the service were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// The document as stored, before read reshaping.
    pub fn raw(&self, path: &str) -> Option<Value> {
        self.docs.lock().ok()?.get(path).cloned()
    }

    fn check(&self, token: &str) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("document store unreachable".into()));
        }
        if token.is_empty() {
            return Err(StoreError::Unauthenticated);
        }
        Ok(())
    }
}

impl DocumentClient for MemoryDocumentStore {
    fn get(&self, path: &str, token: &str) -> Result<Option<Value>, StoreError> {
        self.check(token)?;
        let docs = self
            .docs
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(docs.get(path).map(read_shape))
    }

    fn set(&self, path: &str, doc: &Value, token: &str) -> Result<(), StoreError> {
        self.check(token)?;
        let mut docs = self
            .docs
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        match store_shape(doc) {
            Some(stored) => {
                docs.insert(path.to_string(), stored);
            }
            None => {
                docs.remove(path);
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!("Stored document at {path}");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// FILE STORE
// ═══════════════════════════════════════════════════════════════════════

/// Document store kept as JSON files under one directory, one file per
/// document path. Documents are reshaped the same way as in memory.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    root: PathBuf,
}

impl FileDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file_for(&self, path: &str) -> Result<PathBuf, StoreError> {
        if path.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
            return Err(StoreError::Backend(format!("bad document path {path}")));
        }
        Ok(self.root.join(format!("{path}.json")))
    }
}

impl DocumentClient for FileDocumentStore {
    fn get(&self, path: &str, token: &str) -> Result<Option<Value>, StoreError> {
        if token.is_empty() {
            return Err(StoreError::Unauthenticated);
        }
        let file = self.file_for(path)?;
        if !file.exists() {
            return Ok(None);
        }
        let stored: Value = serde_json::from_str(&fs::read_to_string(&file)?)?;
        Ok(Some(read_shape(&stored)))
    }

    fn set(&self, path: &str, doc: &Value, token: &str) -> Result<(), StoreError> {
        if token.is_empty() {
            return Err(StoreError::Unauthenticated);
        }
        let file = self.file_for(path)?;
        match store_shape(doc) {
            Some(stored) => {
                if let Some(dir) = file.parent() {
                    fs::create_dir_all(dir)?;
                }
                let tmp = file.with_extension("json.tmp");
                fs::write(&tmp, serde_json::to_string(&stored)?)?;
                fs::rename(&tmp, &file)?;
            }
            None => {
                if file.exists() {
                    fs::remove_file(&file)?;
                }
            }
        }
        debug!("Stored document at {}", file.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> Identity {
        Identity {
            id: "u1".into(),
            token: "t".into(),
        }
    }

    #[test]
    fn test_arrays_are_stored_as_index_maps() {
        let doc = json!({ "grid": [[["Farmable"], []], [[], []]], "plants": [], "money": 0 });
        assert_eq!(
            store_shape(&doc),
            Some(json!({ "grid": { "0": { "0": { "0": "Farmable" } } }, "money": 0 }))
        );
    }

    #[test]
    fn test_dense_maps_read_back_as_arrays() {
        let stored = json!({ "0": "a", "2": "c", "3": "d" });
        assert_eq!(read_shape(&stored), json!(["a", null, "c", "d"]));
    }

    #[test]
    fn test_sparse_maps_stay_maps() {
        let stored = json!({ "3": { "0": "Tilled" } });
        assert_eq!(read_shape(&stored), json!({ "3": ["Tilled"] }));
        let named = json!({ "01": 1, "1": 2 });
        assert_eq!(read_shape(&named), named);
    }

    #[test]
    fn test_backend_paths_and_identity() {
        let store = Arc::new(MemoryDocumentStore::default());
        let backend = RemoteBackend::new(store.clone());
        assert!(matches!(
            backend.write(1, &json!({ "a": 1 }), None),
            Err(StoreError::Unauthenticated)
        ));

        backend.write(1, &json!({ "a": 1 }), Some(&identity())).unwrap();
        assert_eq!(store.raw("users/u1/saves/slot_1"), Some(json!({ "a": 1 })));
        assert_eq!(backend.read(1, Some(&identity())).unwrap(), Some(json!({ "a": 1 })));
        assert_eq!(backend.read(2, Some(&identity())).unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let doc = json!({ "soil": { "grid": [[[], ["Farmable"]]] }, "money": 3 });
        RemoteBackend::new(Arc::new(FileDocumentStore::new(dir.path())))
            .write(0, &doc, Some(&identity()))
            .unwrap();
        assert!(dir.path().join("users/u1/saves/slot_0.json").exists());

        let reopened = RemoteBackend::new(Arc::new(FileDocumentStore::new(dir.path())));
        assert_eq!(
            reopened.read(0, Some(&identity())).unwrap(),
            Some(json!({ "soil": { "grid": [{ "1": ["Farmable"] }] }, "money": 3 }))
        );
        assert_eq!(reopened.read(1, Some(&identity())).unwrap(), None);
    }

    #[test]
    fn test_file_store_rejects_missing_token_and_odd_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::new(dir.path());
        assert!(matches!(
            store.set("users/u1/saves/slot_0", &json!({ "a": 1 }), ""),
            Err(StoreError::Unauthenticated)
        ));
        assert!(matches!(
            store.get("users/../saves/slot_0", "t"),
            Err(StoreError::Backend(_))
        ));
    }

    #[test]
    fn test_offline_store_fails() {
        let store = Arc::new(MemoryDocumentStore::default());
        store.set_offline(true);
        let backend = RemoteBackend::new(store.clone());
        assert!(matches!(
            backend.read(0, Some(&identity())),
            Err(StoreError::Backend(_))
        ));
        assert_eq!(store.write_count(), 0);
    }
}
