//! Runtime settings and limits.
//!
//! Settings come from the environment (a `.env` file is loaded first when
//! present). Every value has a default so the tool works without any setup.

use std::env;
use std::path::PathBuf;

/// Maximum accepted workbook size (50 MB).
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Rows returned by a preview when no count is given.
pub const DEFAULT_PREVIEW_ROWS: usize = 10;

/// Store usage above this many megabytes is reported as high.
pub const HIGH_STORAGE_MB: f64 = 2.0;

/// Default directory of saved conversions
const DEFAULT_STORE_DIR: &str = ".sheetmap/conversions";

/// Default directory of saved mapping templates
const DEFAULT_TEMPLATE_DIR: &str = ".sheetmap/templates";

const DEFAULT_PORT: u16 = 3000;

/// Process settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Conversion store directory (`SHEETMAP_STORE_DIR`)
    pub store_dir: PathBuf,
    /// Mapping template directory (`SHEETMAP_TEMPLATE_DIR`)
    pub template_dir: PathBuf,
    /// Optional store quota in megabytes (`SHEETMAP_QUOTA_MB`)
    pub quota_mb: Option<f64>,
    /// HTTP port (`SHEETMAP_PORT`)
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
            quota_mb: None,
            port: DEFAULT_PORT,
        }
    }
}

impl Settings {
    /// Read settings from the process environment, loading `.env` first.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup.
    ///
    /// Unparseable numbers fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            store_dir: non_empty("SHEETMAP_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_dir),
            template_dir: non_empty("SHEETMAP_TEMPLATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.template_dir),
            quota_mb: non_empty("SHEETMAP_QUOTA_MB")
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|mb| mb.is_finite() && *mb > 0.0),
            port: non_empty("SHEETMAP_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.port),
        }
    }

    /// Quota in bytes, if one is configured.
    pub fn quota_bytes(&self) -> Option<u64> {
        self.quota_mb.map(|mb| (mb * 1024.0 * 1024.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[]));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.port, 3000);
        assert!(settings.quota_bytes().is_none());
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("SHEETMAP_STORE_DIR", "/tmp/conv"),
            ("SHEETMAP_TEMPLATE_DIR", "/tmp/tpl"),
            ("SHEETMAP_QUOTA_MB", "5"),
            ("SHEETMAP_PORT", "8080"),
        ]));
        assert_eq!(settings.store_dir, PathBuf::from("/tmp/conv"));
        assert_eq!(settings.template_dir, PathBuf::from("/tmp/tpl"));
        assert_eq!(settings.quota_bytes(), Some(5 * 1024 * 1024));
        assert_eq!(settings.port, 8080);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let settings = Settings::from_lookup(lookup(&[
            ("SHEETMAP_QUOTA_MB", "lots"),
            ("SHEETMAP_PORT", "-1"),
            ("SHEETMAP_STORE_DIR", "  "),
        ]));
        assert_eq!(settings.quota_mb, None);
        assert_eq!(settings.port, 3000);
        assert_eq!(settings.store_dir, PathBuf::from(DEFAULT_STORE_DIR));
    }
}
