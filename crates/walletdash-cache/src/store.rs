//! Durable key-value storage backends.
//!
//! `FileStore` keeps one JSON document per key:
//! - Writes go to a temp file and are renamed into place, so a crash mid-write
//!   leaves either the old or the new document, never a torn one
//! - Each key is independent; a damaged file only affects its own key

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};

const FILE_EXT: &str = "json";
const TEMP_EXT: &str = "json.tmp";

/// Minimal string key-value store.
pub trait KvStore: Send + Sync {
    /// Read a value. `Ok(None)` if the key does not exist.
    fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Write a value, replacing any previous one.
    fn put(&self, key: &str, value: &str) -> CacheResult<()>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> CacheResult<()>;

    /// List keys starting with `prefix`.
    fn keys(&self, prefix: &str) -> CacheResult<Vec<String>>;
}

fn validate_key(key: &str) -> CacheResult<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}

/// Directory-backed store.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> CacheResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "Opened file store");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{FILE_EXT}"))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{TEMP_EXT}"))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        validate_key(key)?;
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> CacheResult<()> {
        validate_key(key)?;
        let temp = self.temp_path_for(key);
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&temp, self.path_for(key)) {
            if let Err(cleanup) = fs::remove_file(&temp) {
                warn!(?cleanup, key, "Failed to remove temp file after rename failure");
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        validate_key(key)?;
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self, prefix: &str) -> CacheResult<Vec<String>> {
        let suffix = format!(".{FILE_EXT}");
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(key) = name.strip_suffix(&suffix) {
                if key.starts_with(prefix) {
                    keys.push(key.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-memory store, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
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
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        validate_key(key)?;
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: &str, value: &str) -> CacheResult<()> {
        validate_key(key)?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        validate_key(key)?;
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> CacheResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert!(store.get("a_key").unwrap().is_none());
        store.put("a_key", "{\"v\":1}").unwrap();
        assert_eq!(store.get("a_key").unwrap().as_deref(), Some("{\"v\":1}"));

        store.put("a_key", "{\"v\":2}").unwrap();
        assert_eq!(store.get("a_key").unwrap().as_deref(), Some("{\"v\":2}"));

        store.remove("a_key").unwrap();
        assert!(store.get("a_key").unwrap().is_none());
        // Removing twice is fine.
        store.remove("a_key").unwrap();
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FileStore::open(dir.path())
            .unwrap()
            .put("persisted", "hello")
            .unwrap();

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("persisted").unwrap().as_deref(), Some("hello"));
    }

    #[test]
    fn test_file_store_keys_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.put("cache_b", "1").unwrap();
        store.put("cache_a", "1").unwrap();
        store.put("other", "1").unwrap();
        // Leftover temp files are not keys.
        std::fs::write(dir.path().join("cache_c.json.tmp"), "x").unwrap();

        assert_eq!(store.keys("cache_").unwrap(), vec!["cache_a", "cache_b"]);
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.put("../escape", "x"),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(store.get("").is_err());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.put("k1", "v1").unwrap();
        store.put("k2", "v2").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.keys("k").unwrap(), vec!["k1", "k2"]);
        store.remove("k1").unwrap();
        assert_eq!(store.get("k1").unwrap(), None);
    }
}
