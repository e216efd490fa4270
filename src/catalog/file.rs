//! File-backed catalog store.
//!
//! The whole catalog is one JSON object mapping key paths to values. UTF-8
//! values are stored as strings, anything else as a byte array. Every write
//! rewrites the file through a temporary file and a rename.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::catalog::store::{CatalogStore, MemoryStore, StoreError};

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<Vec<u8>> for StoredValue {
    fn from(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => StoredValue::Text(text),
            Err(e) => StoredValue::Bytes(e.into_bytes()),
        }
    }
}

impl From<StoredValue> for Vec<u8> {
    fn from(value: StoredValue) -> Self {
        match value {
            StoredValue::Text(text) => text.into_bytes(),
            StoredValue::Bytes(bytes) => bytes,
        }
    }
}

/// A [`MemoryStore`] mirrored to a JSON document on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    memory: MemoryStore,
    /// Serializes writers so the file always reflects one consistent state.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open the catalog at `path`. A missing file is an empty catalog.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self {
            path: path.into(),
            memory: MemoryStore::new(),
            write_lock: Mutex::new(()),
        };
        store.reload()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, discarding the in-memory view.
    pub fn reload(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entries = read_document(&self.path)?;
        self.memory
            .replace_all(entries.into_iter().map(|(key, value)| (key, value.into())));
        tracing::debug!(path = %self.path.display(), keys = self.memory.len(), "Catalog loaded");
        Ok(())
    }

    fn persist(&self) -> Result<(), StoreError> {
        let document: BTreeMap<String, StoredValue> = self
            .memory
            .list("")?
            .into_iter()
            .map(|(key, value)| (key, value.into()))
            .collect();
        let io_error = |source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };

        let encoded = serde_json::to_vec_pretty(&document).map_err(|source| StoreError::Document {
            path: self.path.display().to_string(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, encoded).map_err(io_error)?;
        fs::rename(&tmp, &self.path).map_err(io_error)?;
        Ok(())
    }

    fn write<T>(&self, op: impl FnOnce(&MemoryStore) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = op(&self.memory)?;
        self.persist()?;
        Ok(result)
    }
}

fn read_document(path: &Path) -> Result<BTreeMap<String, StoredValue>, StoreError> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }
    serde_json::from_slice(&content).map_err(|source| StoreError::Document {
        path: path.display().to_string(),
        source,
    })
}

impl CatalogStore for FileStore {
    fn set_raw(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.write(|memory| memory.set_raw(key, value))
    }

    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.memory.get_raw(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        self.memory.list(prefix)
    }

    fn delete(&self, prefix: &str) -> Result<usize, StoreError> {
        self.write(|memory| memory.delete(prefix))
    }
}
