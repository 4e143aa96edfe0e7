//! Local key-value persistence for Feedscout.
//!
//! Pipelines persist their seen set and cursor under namespaced keys. Hosts
//! provide any [`KeyValueStore`]; [`FileStore`] keeps everything in one JSON file.

pub mod seen;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::{Result, ScoutError};

pub use seen::{SeenReason, SeenSetStore};

/// String key-value persistence.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Build a namespaced key.
pub fn namespaced_key(namespace: &str, key: &str) -> String {
    format!("{namespace}:{key}")
}

/// Read and deserialize a JSON value.
pub fn get_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize and write a JSON value.
pub fn set_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
///
/// Writes go to a `.tmp` sibling first and are renamed into place.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    ///
    /// A corrupt file falls back to its `.tmp` sibling, then to an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let values = Self::read_with_tmp_fallback(&path);
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    fn tmp_path(path: &Path) -> PathBuf {
        path.with_extension("json.tmp")
    }

    fn read_with_tmp_fallback(path: &Path) -> BTreeMap<String, String> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(_) => return BTreeMap::new(),
        };
        match serde_json::from_slice(&bytes) {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to parse store, trying tmp fallback");
                std::fs::read(Self::tmp_path(path))
                    .ok()
                    .and_then(|tmp| serde_json::from_slice(&tmp).ok())
                    .unwrap_or_default()
            }
        }
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(values)?;
        let tmp = Self::tmp_path(&self.path);
        std::fs::write(&tmp, &bytes)
            .map_err(|e| ScoutError::Store(format!("failed to write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            ScoutError::Store(format!("failed to persist {}: {}", self.path.display(), e))
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }
}
