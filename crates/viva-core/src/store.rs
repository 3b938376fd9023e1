//! Durable key-value stores backing snapshot persistence.
//!
//! Values are opaque bytes keyed by string. `SledStore` is the on-disk store;
//! `MemoryStore` keeps everything in a DashMap (tests, ephemeral hosts).

use crate::error::VivaResult;
use dashmap::DashMap;
use sled::Db;
use std::path::Path;

/// Synchronous, device-local key-value store.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> VivaResult<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> VivaResult<()>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> VivaResult<()>;
}

/// Sled-backed store.
pub struct SledStore {
    db: Db,
}

impl SledStore {
    /// Opens or creates a Sled database at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> VivaResult<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &str) -> VivaResult<Option<Vec<u8>>> {
        Ok(self.db.get(key.as_bytes())?.map(|iv| iv.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> VivaResult<()> {
        self.db.insert(key.as_bytes(), value)?;
        self.db.flush()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> VivaResult<()> {
        self.db.remove(key.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    map: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> VivaResult<Option<Vec<u8>>> {
        Ok(self.map.get(key).map(|v| v.clone()))
    }

    fn set(&self, key: &str, value: &[u8]) -> VivaResult<()> {
        self.map.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> VivaResult<()> {
        self.map.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sled_store_set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open_path(dir.path()).unwrap();
        store.set("k", b"v1").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v1".to_vec()));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        // removing again is a no-op
        store.remove("k").unwrap();
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryStore::new();
        store.set("k", b"a").unwrap();
        store.set("k", b"b").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"b".to_vec()));
        assert_eq!(store.len(), 1);
    }
}
