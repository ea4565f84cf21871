//! Persistent feature cache.
//!
//! A single JSON snapshot maps `(filename, method)` keys to cached records of
//! modification time, derived title and feature vector. The store is read
//! fully into memory, mutated, and rewritten wholesale; saves go through a
//! sibling temp file and an atomic rename so a crash mid-write never leaves a
//! half-written snapshot. Concurrent refresh runs are last-writer-wins —
//! callers serialize refreshes if they can overlap.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::Method;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One cached extraction result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Source file modification time, epoch seconds.
    pub mtime: f64,
    /// Display title derived from the filename at extraction time.
    pub title: String,
    pub vector: Vec<f64>,
}

/// The whole-file snapshot store. BTreeMap keeps serialization deterministic:
/// an unchanged corpus re-serializes to identical bytes.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CacheStore {
    #[serde(default)]
    pub files: BTreeMap<String, CacheRecord>,
}

/// Composite cache key for a corpus file under a given extraction method.
pub fn cache_key(filename: &str, method: Method) -> String {
    format!("{filename}_{}", method.as_str())
}

impl CacheStore {
    /// Load the snapshot. A missing file is an empty store; an unreadable or
    /// corrupt file is logged and treated as empty (it will be rebuilt).
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            log::debug!("No feature cache at {}, starting empty", path.display());
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(store) => store,
                Err(e) => {
                    log::warn!(
                        "Failed to parse feature cache {}: {}. Starting empty.",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!(
                    "Failed to read feature cache {}: {}. Starting empty.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Replace the on-disk snapshot atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let json = serde_json::to_string_pretty(self)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("feature_cache.json");
        let tmp = path.with_file_name(format!(".{file_name}.tmp"));
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        log::debug!("Feature cache saved to {}", path.display());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&CacheRecord> {
        self.files.get(key)
    }

    pub fn insert(&mut self, key: String, record: CacheRecord) {
        self.files.insert(key, record);
    }

    /// Garbage-collect records for the given method whose filenames are no
    /// longer present. Records of other methods are untouched. Returns the
    /// number of removed entries.
    pub fn remove_stale(&mut self, method: Method, current_keys: &HashSet<String>) -> usize {
        let suffix = format!("_{}", method.as_str());
        let stale: Vec<String> = self
            .files
            .keys()
            .filter(|k| k.ends_with(&suffix) && !current_keys.contains(*k))
            .cloned()
            .collect();
        for key in &stale {
            log::info!("Removing stale cache entry: {key}");
            self.files.remove(key);
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(mtime: f64) -> CacheRecord {
        CacheRecord {
            mtime,
            title: "Song".into(),
            vector: vec![1.0, 0.0],
        }
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(cache_key("tune.mp3", Method::Dsp), "tune.mp3_dsp");
        assert_eq!(cache_key("tune.mp3", Method::Ai), "tune.mp3_ai");
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::load(&dir.path().join("nope.json"));
        assert!(store.files.is_empty());
    }

    #[test]
    fn test_load_corrupt_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = CacheStore::load(&path);
        assert!(store.files.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut store = CacheStore::default();
        store.insert(cache_key("a.mp3", Method::Dsp), record(100.5));
        store.save(&path).unwrap();

        let loaded = CacheStore::load(&path);
        let rec = loaded.get("a.mp3_dsp").unwrap();
        assert_eq!(rec.mtime, 100.5);
        assert_eq!(rec.vector, vec![1.0, 0.0]);
    }

    #[test]
    fn test_save_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");

        let mut store = CacheStore::default();
        store.insert(cache_key("z.mp3", Method::Dsp), record(1.0));
        store.insert(cache_key("a.mp3", Method::Dsp), record(2.0));
        store.save(&a).unwrap();
        store.save(&b).unwrap();

        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn test_remove_stale_respects_method() {
        let mut store = CacheStore::default();
        store.insert("kept.mp3_dsp".into(), record(1.0));
        store.insert("gone.mp3_dsp".into(), record(1.0));
        store.insert("gone.mp3_ai".into(), record(1.0));

        let current: HashSet<String> = ["kept.mp3_dsp".to_string()].into();
        let removed = store.remove_stale(Method::Dsp, &current);

        assert_eq!(removed, 1);
        assert!(store.get("kept.mp3_dsp").is_some());
        assert!(store.get("gone.mp3_dsp").is_none());
        // Other method's record for the same vanished file survives.
        assert!(store.get("gone.mp3_ai").is_some());
    }
}
