//! Filesystem-backed key/value store
//!
//! Stores each key as a small file in an XDG-compliant cache directory
//! (`~/.cache/coinwatch/` on Linux), so cached market data and the rate-limit
//! counter survive across runs.

use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;

use super::KvStore;

/// Key/value store persisting entries as individual files.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where entries are stored
    dir: PathBuf,
}

impl FileStore {
    /// Creates a new FileStore in the XDG-compliant cache directory.
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no
    /// home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "coinwatch")?;
        Some(Self {
            dir: project_dirs.cache_dir().to_path_buf(),
        })
    }

    /// Creates a new FileStore with a custom directory.
    ///
    /// Useful for testing or when a specific storage location is needed.
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), value)
    }

    fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.path_for(key));
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let key = name.strip_suffix(".json")?;
                key.starts_with(prefix).then(|| key.to_string())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[test]
    fn test_set_creates_file_in_store_directory() {
        let (store, temp_dir) = create_test_store();

        store.set("test_key", "{\"value\":42}").expect("Set should succeed");

        let expected_path = temp_dir.path().join("test_key.json");
        assert!(expected_path.exists(), "Store file should exist");
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.get("nonexistent_key").is_none());
    }

    #[test]
    fn test_get_returns_stored_value() {
        let (store, _temp_dir) = create_test_store();

        store.set("a_key", "hello").expect("Set should succeed");

        assert_eq!(store.get("a_key").as_deref(), Some("hello"));
    }

    #[test]
    fn test_set_overwrites_existing_value() {
        let (store, _temp_dir) = create_test_store();

        store.set("a_key", "first").expect("Set should succeed");
        store.set("a_key", "second").expect("Set should succeed");

        assert_eq!(store.get("a_key").as_deref(), Some("second"));
    }

    #[test]
    fn test_remove_deletes_entry() {
        let (store, _temp_dir) = create_test_store();

        store.set("a_key", "value").expect("Set should succeed");
        store.remove("a_key");

        assert!(store.get("a_key").is_none());
    }

    #[test]
    fn test_remove_missing_key_is_silent() {
        let (store, _temp_dir) = create_test_store();
        store.remove("never_stored");
    }

    #[test]
    fn test_keys_with_prefix_filters_entries() {
        let (store, _temp_dir) = create_test_store();

        store.set("cache_one", "1").expect("Set should succeed");
        store.set("cache_two", "2").expect("Set should succeed");
        store.set("rate_limit", "3").expect("Set should succeed");

        let mut keys = store.keys_with_prefix("cache_");
        keys.sort();
        assert_eq!(keys, vec!["cache_one", "cache_two"]);
    }

    #[test]
    fn test_keys_with_prefix_on_missing_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::with_dir(temp_dir.path().join("never_created"));

        assert!(store.keys_with_prefix("cache_").is_empty());
    }

    #[test]
    fn test_set_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested = temp_dir.path().join("nested").join("store");
        let store = FileStore::with_dir(nested.clone());

        store.set("a_key", "value").expect("Set should succeed");

        assert!(nested.exists(), "Nested directory should be created");
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(store) = FileStore::new() {
            let path_str = store.dir.to_string_lossy();
            assert!(
                path_str.contains("coinwatch"),
                "Store path should contain project name"
            );
        }
        // Test passes if new() returns None (e.g., no home directory in CI)
    }
}
