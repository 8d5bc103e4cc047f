//! Conversion Store - Persist conversion snapshots on disk
//!
//! One JSON file per conversion (`<key>.json`) in the store directory. Keys
//! are `conversion_<millis>`; a clash within the same millisecond gets a
//! `_<n>` suffix so nothing is silently overwritten.

pub mod templates;

pub use templates::{MappingTemplateRegistry, StoredTemplate};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Settings, HIGH_STORAGE_MB};
use crate::error::{StoreError, StoreResult};
use crate::models::ConversionResult;

/// Prefix of every conversion key
pub const KEY_PREFIX: &str = "conversion_";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A stored conversion with its key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredConversion {
    pub key: String,
    #[serde(flatten)]
    pub result: ConversionResult,
}

/// Store usage summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStatus {
    /// Number of stored conversions
    pub count: usize,
    /// Estimated usage in MB, two decimals
    pub used_mb: f64,
    /// Configured quota in MB
    pub quota_mb: Option<f64>,
    /// Usage is above the high-water mark
    pub high: bool,
}

/// File-backed store of conversion results
#[derive(Debug, Clone)]
pub struct ConversionStore {
    /// Directory where conversions are stored
    dir: PathBuf,
    /// Optional size limit in bytes
    quota: Option<u64>,
}

impl ConversionStore {
    /// Create a store over a directory (created lazily on first save)
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: PathBuf::from(dir.as_ref()),
            quota: None,
        }
    }

    /// Create a store from settings (directory and quota)
    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_dir(&settings.store_dir).with_quota(settings.quota_bytes())
    }

    /// Set the size limit in bytes
    pub fn with_quota(mut self, quota: Option<u64>) -> Self {
        self.quota = quota;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First unused key for a timestamp
    pub fn next_key(&self, timestamp: i64) -> String {
        let base = format!("{}{}", KEY_PREFIX, timestamp);
        if !self.path_for(&base).exists() {
            return base;
        }
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|key| !self.path_for(key).exists())
            .unwrap_or(base)
    }

    /// Save a result under a fresh key derived from its timestamp
    pub fn save(&self, result: &ConversionResult) -> StoreResult<String> {
        let key = self.next_key(result.timestamp);
        self.save_as(&key, result)?;
        Ok(key)
    }

    /// Save a result under an explicit key, replacing any previous entry
    pub fn save_as(&self, key: &str, result: &ConversionResult) -> StoreResult<()> {
        validate_key(key)?;
        let content = serde_json::to_string(result)?;

        if let Some(quota) = self.quota {
            let existing = self.entry_size(key).unwrap_or(0);
            let entry = (key.len() + content.len()) as u64;
            let needed = self.size_bytes().saturating_sub(existing) + entry;
            if needed > quota {
                return Err(StoreError::QuotaExceeded { needed, quota });
            }
        }

        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), content)?;
        Ok(())
    }

    /// Load a result. Missing, unreadable and corrupt entries are all absent.
    pub fn get(&self, key: &str) -> Option<ConversionResult> {
        validate_key(key).ok()?;
        let content = fs::read_to_string(self.path_for(key)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// All readable conversions, newest first
    pub fn list_all(&self) -> Vec<StoredConversion> {
        let mut all: Vec<StoredConversion> = self
            .keys()
            .into_iter()
            .filter_map(|key| self.get(&key).map(|result| StoredConversion { key, result }))
            .collect();

        all.sort_by(|a, b| {
            b.result
                .timestamp
                .cmp(&a.result.timestamp)
                .then_with(|| b.key.cmp(&a.key))
        });
        all
    }

    /// Delete a conversion
    pub fn delete(&self, key: &str) -> StoreResult<()> {
        if validate_key(key).is_err() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every conversion. Returns the number removed.
    pub fn clear_all(&self) -> StoreResult<usize> {
        let keys = self.keys();
        for key in &keys {
            fs::remove_file(self.path_for(key))?;
        }
        Ok(keys.len())
    }

    /// Key lengths plus stored bytes over all entries
    pub fn size_bytes(&self) -> u64 {
        self.keys()
            .iter()
            .filter_map(|key| self.entry_size(key))
            .sum()
    }

    /// Estimated usage in MB, rounded to two decimals
    pub fn size_estimate_mb(&self) -> f64 {
        round_mb(self.size_bytes())
    }

    /// Usage summary with the high-water flag
    pub fn storage_status(&self) -> StorageStatus {
        let used_mb = self.size_estimate_mb();
        StorageStatus {
            count: self.keys().len(),
            used_mb,
            quota_mb: self.quota.map(round_mb),
            high: used_mb > HIGH_STORAGE_MB,
        }
    }

    /// Keys of all entries on disk
    fn keys(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };

        entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if !path.extension().is_some_and(|e| e == "json") {
                    return None;
                }
                let stem = path.file_stem()?.to_str()?;
                stem.starts_with(KEY_PREFIX).then(|| stem.to_string())
            })
            .collect()
    }

    fn entry_size(&self, key: &str) -> Option<u64> {
        let len = fs::metadata(self.path_for(key)).ok()?.len();
        Some(key.len() as u64 + len)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

/// Keys become file names: only ASCII letters, digits, `_` and `-`.
fn validate_key(key: &str) -> StoreResult<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

fn round_mb(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn result_at(timestamp: i64, filename: &str) -> ConversionResult {
        let record = json!({"name": "Widget", "price": 9.99});
        ConversionResult {
            timestamp,
            filename: filename.to_string(),
            sheet: "Sheet1".to_string(),
            data: vec![record.as_object().cloned().unwrap_or_default()],
        }
    }

    #[test]
    fn test_save_and_get() {
        let dir = tempdir().unwrap();
        let store = ConversionStore::with_dir(dir.path());

        let result = result_at(1_700_000_000_000, "products.xlsx");
        let key = store.save(&result).unwrap();

        assert_eq!(key, "conversion_1700000000000");
        assert_eq!(store.get(&key), Some(result));
        assert_eq!(store.get("conversion_404"), None);
    }

    #[test]
    fn test_same_millisecond_keys_do_not_collide() {
        let dir = tempdir().unwrap();
        let store = ConversionStore::with_dir(dir.path());

        let first = store.save(&result_at(42, "a.csv")).unwrap();
        let second = store.save(&result_at(42, "b.csv")).unwrap();
        let third = store.save(&result_at(42, "c.csv")).unwrap();

        assert_eq!(first, "conversion_42");
        assert_eq!(second, "conversion_42_1");
        assert_eq!(third, "conversion_42_2");
        assert_eq!(store.get(&first).unwrap().filename, "a.csv");
        assert_eq!(store.list_all().len(), 3);
    }

    #[test]
    fn test_list_all_newest_first() {
        let dir = tempdir().unwrap();
        let store = ConversionStore::with_dir(dir.path());
        store.save(&result_at(100, "old.csv")).unwrap();
        store.save(&result_at(300, "new.csv")).unwrap();
        store.save(&result_at(200, "mid.csv")).unwrap();

        let names: Vec<String> = store
            .list_all()
            .into_iter()
            .map(|c| c.result.filename)
            .collect();
        assert_eq!(names, ["new.csv", "mid.csv", "old.csv"]);
    }

    #[test]
    fn test_corrupt_entries_are_skipped() {
        let dir = tempdir().unwrap();
        let store = ConversionStore::with_dir(dir.path());
        store.save(&result_at(1, "ok.csv")).unwrap();
        fs::write(dir.path().join("conversion_2.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.json"), "{}").unwrap();

        assert_eq!(store.list_all().len(), 1);
        assert_eq!(store.get("conversion_2"), None);
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let store = ConversionStore::with_dir(dir.path());
        let key = store.save(&result_at(5, "x.csv")).unwrap();

        store.delete(&key).unwrap();
        assert_eq!(store.get(&key), None);
        assert!(matches!(store.delete(&key), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete("../escape"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_invalid_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let store = ConversionStore::with_dir(dir.path());
        let result = result_at(5, "x.csv");

        assert!(matches!(
            store.save_as("../outside", &result),
            Err(StoreError::InvalidKey(_))
        ));
        assert_eq!(store.get("../outside"), None);
    }

    #[test]
    fn test_clear_all_keeps_unrelated_files() {
        let dir = tempdir().unwrap();
        let store = ConversionStore::with_dir(dir.path());
        store.save(&result_at(1, "a.csv")).unwrap();
        store.save(&result_at(2, "b.csv")).unwrap();
        fs::write(dir.path().join("settings.json"), "{}").unwrap();

        assert_eq!(store.clear_all().unwrap(), 2);
        assert!(store.list_all().is_empty());
        assert!(dir.path().join("settings.json").exists());
        assert_eq!(store.size_bytes(), 0);
    }

    #[test]
    fn test_size_counts_keys_and_content() {
        let dir = tempdir().unwrap();
        let store = ConversionStore::with_dir(dir.path());
        let result = result_at(7, "a.csv");
        let key = store.save(&result).unwrap();

        let content = serde_json::to_string(&result).unwrap();
        assert_eq!(store.size_bytes(), (key.len() + content.len()) as u64);
        assert_eq!(store.size_estimate_mb(), 0.0);
    }

    #[test]
    fn test_quota_exceeded() {
        let dir = tempdir().unwrap();
        let store = ConversionStore::with_dir(dir.path()).with_quota(Some(64));

        let err = store.save(&result_at(1, "big.xlsx")).unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { quota: 64, .. }));
        assert!(store.list_all().is_empty());
    }

    #[test]
    fn test_storage_status() {
        let dir = tempdir().unwrap();
        let store = ConversionStore::with_dir(dir.path());
        store.save(&result_at(1, "a.csv")).unwrap();

        let status = store.storage_status();
        assert_eq!(status.count, 1);
        assert!(!status.high);
        assert_eq!(status.quota_mb, None);
    }

    #[test]
    fn test_missing_dir_reads_as_empty() {
        let dir = tempdir().unwrap();
        let store = ConversionStore::with_dir(dir.path().join("not-created"));
        assert!(store.list_all().is_empty());
        assert_eq!(store.size_bytes(), 0);
        assert_eq!(store.clear_all().unwrap(), 0);
    }
}
