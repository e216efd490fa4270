//! Key/value store interface for the endpoint catalog.
//!
//! Keys are `/`-separated paths. Directories are implicit: a prefix exists
//! as long as some key lives below it.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid key path {0:?}")]
    InvalidKey(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed catalog document {path}: {source}")]
    Document {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot encode value for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The narrow store interface the catalog consumes.
pub trait CatalogStore: Send + Sync {
    /// Store raw bytes under `key`, replacing any previous value.
    fn set_raw(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Every key at or below `prefix`, sorted by key. An empty prefix lists everything.
    fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    /// Remove every key at or below `prefix`. Returns how many keys went away.
    fn delete(&self, prefix: &str) -> Result<usize, StoreError>;

    fn set_json(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.set_raw(key, bytes)
    }
}

pub(crate) fn check_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.starts_with('/') || key.ends_with('/') || key.contains("//") {
        Err(StoreError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

fn under(key: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || key == prefix
        || (key.starts_with(prefix) && key.as_bytes().get(prefix.len()) == Some(&b'/'))
}

/// In-process store backed by a concurrent map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the whole content at once.
    pub(crate) fn replace_all(&self, entries: impl IntoIterator<Item = (String, Vec<u8>)>) {
        self.entries.clear();
        for (key, value) in entries {
            self.entries.insert(key, value);
        }
    }
}

impl CatalogStore for MemoryStore {
    fn set_raw(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        check_key(key)?;
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let prefix = prefix.trim_end_matches('/');
        let mut entries: Vec<(String, Vec<u8>)> = self
            .entries
            .iter()
            .filter(|entry| under(entry.key(), prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    fn delete(&self, prefix: &str) -> Result<usize, StoreError> {
        let prefix = prefix.trim_end_matches('/');
        let before = self.entries.len();
        self.entries.retain(|key, _| !under(key, prefix));
        Ok(before - self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.set_raw("app/c/svc/nodes/a", b"1".to_vec()).unwrap();
        store.set_raw("app/c/svc/nodes/b", b"2".to_vec()).unwrap();
        store.set_raw("app/c/svc2/nodes/a", b"3".to_vec()).unwrap();
        store
    }

    #[test]
    fn list_is_sorted_and_respects_segment_boundaries() {
        let store = seeded();
        let keys: Vec<String> = store.list("app/c/svc").unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["app/c/svc/nodes/a", "app/c/svc/nodes/b"]);
        assert_eq!(store.list("").unwrap().len(), 3);
    }

    #[test]
    fn delete_is_recursive() {
        let store = seeded();
        assert_eq!(store.delete("app/c/svc/").unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.delete("app/c/missing").unwrap(), 0);
    }

    #[test]
    fn set_json_encodes_value() {
        let store = MemoryStore::new();
        store
            .set_json("k", &serde_json::json!({"ip": "127.0.0.1", "port": 8080}))
            .unwrap();
        let raw = store.get_raw("k").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value["port"], 8080);
    }

    #[test]
    fn malformed_keys_rejected() {
        let store = MemoryStore::new();
        for key in ["", "/abs", "trailing/", "a//b"] {
            assert!(matches!(store.set_raw(key, vec![]), Err(StoreError::InvalidKey(_))));
        }
    }
}
