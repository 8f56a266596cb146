//! Key-value backends for global-scope records
//!
//! Values are opaque JSON strings. `compare_and_swap` is the atomic
//! conditional write the lock manager relies on.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use tracing::debug;

use crate::StoreError;

/// Minimal key-value capability
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically replace the value at `key` if it currently equals `expected`
    ///
    /// `expected = None` means "key absent"; `new = None` deletes the key.
    /// Returns false (and writes nothing) when the current value differs.
    fn compare_and_swap(&self, key: &str, expected: Option<&str>, new: Option<&str>) -> Result<bool, StoreError>;
}

/// Single JSON file holding a string map, guarded by an exclusive file lock
///
/// The lock is held for the full read-modify-write, so concurrent processes
/// sharing the file serialize on it.
pub struct FileKvStore {
    path: PathBuf,
}

impl FileKvStore {
    /// Open (or lazily create) the store file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), "FileKvStore::open: called");
        Ok(Self { path })
    }

    /// Default location: `<data_dir>/agentflow/global.json`
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("agentflow")
            .join("global.json")
    }

    fn open_locked(&self) -> Result<File, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.lock_exclusive()?;
        Ok(file)
    }

    fn read_map(file: &mut File) -> Result<BTreeMap<String, String>, StoreError> {
        let mut content = String::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_string(&mut content)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_map(file: &mut File, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(map)?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(content.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Run `f` over the map while holding the file lock
    fn with_map<T>(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> (T, bool)) -> Result<T, StoreError> {
        let mut file = self.open_locked()?;
        let mut map = Self::read_map(&mut file)?;
        let (result, dirty) = f(&mut map);
        if dirty {
            Self::write_map(&mut file, &map)?;
        }
        FileExt::unlock(&file)?;
        Ok(result)
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        debug!(%key, "FileKvStore::get: called");
        self.with_map(|map| (map.get(key).cloned(), false))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        debug!(%key, value_len = value.len(), "FileKvStore::set: called");
        self.with_map(|map| {
            map.insert(key.to_string(), value.to_string());
            ((), true)
        })
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        debug!(%key, "FileKvStore::delete: called");
        self.with_map(|map| {
            let existed = map.remove(key).is_some();
            ((), existed)
        })
    }

    fn compare_and_swap(&self, key: &str, expected: Option<&str>, new: Option<&str>) -> Result<bool, StoreError> {
        debug!(%key, expected_present = expected.is_some(), new_present = new.is_some(), "FileKvStore::compare_and_swap: called");
        self.with_map(|map| swap_in(map, key, expected, new))
    }
}

/// Conditional write on an in-memory map; returns `(swapped, dirty)`
fn swap_in(map: &mut BTreeMap<String, String>, key: &str, expected: Option<&str>, new: Option<&str>) -> (bool, bool) {
    if map.get(key).map(String::as_str) != expected {
        debug!(%key, "compare_and_swap: current value differs");
        return (false, false);
    }
    match new {
        Some(value) => {
            map.insert(key.to_string(), value.to_string());
        }
        None => {
            map.remove(key);
        }
    }
    (true, true)
}

/// In-process store, used by tests and single-process deployments
#[derive(Default)]
pub struct MemoryKvStore {
    map: Mutex<BTreeMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StoreError> {
        self.map
            .lock()
            .map_err(|_| StoreError::Kv("memory store mutex poisoned".to_string()))
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn compare_and_swap(&self, key: &str, expected: Option<&str>, new: Option<&str>) -> Result<bool, StoreError> {
        let mut map = self.lock()?;
        Ok(swap_in(&mut map, key, expected, new).0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(store: &dyn KvStore) {
        assert_eq!(store.get("a").unwrap(), None);
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

        // Absent-expected fails when present
        assert!(!store.compare_and_swap("a", None, Some("2")).unwrap());
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

        // Matching expected swaps
        assert!(store.compare_and_swap("a", Some("1"), Some("2")).unwrap());
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));

        // Swap to None deletes
        assert!(store.compare_and_swap("a", Some("2"), None).unwrap());
        assert_eq!(store.get("a").unwrap(), None);

        // Create-if-absent
        assert!(store.compare_and_swap("b", None, Some("x")).unwrap());
        store.delete("b").unwrap();
        assert_eq!(store.get("b").unwrap(), None);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryKvStore::new());
    }

    #[test]
    fn test_file_store() {
        let temp = TempDir::new().unwrap();
        let store = FileKvStore::open(temp.path().join("nested").join("global.json")).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_file_store_persists_across_handles() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("global.json");
        FileKvStore::open(&path).unwrap().set("k", "v").unwrap();
        let reopened = FileKvStore::open(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_file_store_concurrent_create_if_absent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("global.json");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let store = FileKvStore::open(&path).unwrap();
                    store.compare_and_swap("lock", None, Some(&format!("{}", i))).unwrap()
                })
            })
            .collect();

        let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count();
        assert_eq!(winners, 1);
    }
}
