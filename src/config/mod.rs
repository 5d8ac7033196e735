//! # Config Module
//!
//! Run configuration, read once at the start of a run.
//!
//! ## Example
//! ```json
//! {
//!   "root": "/home/me/Pictures",
//!   "batch_size": 100,
//!   "thumbnail_max_width": 200,
//!   "thumbnail_max_height": 150,
//!   "fingerprint": { "exact": false, "difference": true, "perceptual": false, "group_by": "difference" },
//!   "include_videos": false
//! }
//! ```

use crate::core::fingerprint::FingerprintKind;
use crate::core::storage::LocalStorage;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which fingerprint slots are computed, and which one groups duplicates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    pub exact: bool,
    pub difference: bool,
    pub perceptual: bool,
    pub group_by: FingerprintKind,
}

impl FingerprintConfig {
    /// Enabled kinds, in slot order
    pub fn enabled_kinds(&self) -> Vec<FingerprintKind> {
        FingerprintKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }

    pub fn is_enabled(&self, kind: FingerprintKind) -> bool {
        match kind {
            FingerprintKind::Exact => self.exact,
            FingerprintKind::Difference => self.difference,
            FingerprintKind::Perceptual => self.perceptual,
        }
    }

    /// Enable a kind and group by it
    pub fn group_by(mut self, kind: FingerprintKind) -> Self {
        match kind {
            FingerprintKind::Exact => self.exact = true,
            FingerprintKind::Difference => self.difference = true,
            FingerprintKind::Perceptual => self.perceptual = true,
        }
        self.group_by = kind;
        self
    }
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            exact: false,
            difference: true,
            perceptual: false,
            group_by: FingerprintKind::Difference,
        }
    }
}

/// Configuration for a catalog run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Directory tree to catalog
    pub root: PathBuf,
    /// Catalog data root (None = platform data directory)
    pub data_dir: Option<PathBuf>,
    /// Maximum entries committed per batch
    pub batch_size: usize,
    pub thumbnail_max_width: u32,
    pub thumbnail_max_height: u32,
    pub fingerprint: FingerprintConfig,
    /// Catalog videos (first frames come from an external extractor)
    pub include_videos: bool,
    /// Include hidden files and directories
    pub include_hidden: bool,
    /// Number of catalog snapshots retained
    pub backups_to_keep: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            data_dir: None,
            batch_size: 100,
            thumbnail_max_width: 200,
            thumbnail_max_height: 150,
            fingerprint: FingerprintConfig::default(),
            include_videos: false,
            include_hidden: false,
            backups_to_keep: 3,
        }
    }
}

impl CatalogConfig {
    /// Configuration for a root with defaults everywhere else
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check every option against its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".to_string()));
        }
        if self.thumbnail_max_width == 0 || self.thumbnail_max_height == 0 {
            return Err(ConfigError::Invalid(
                "thumbnail dimensions must be positive".to_string(),
            ));
        }
        if self.fingerprint.enabled_kinds().is_empty() {
            return Err(ConfigError::Invalid(
                "at least one fingerprint kind must be enabled".to_string(),
            ));
        }
        if !self.fingerprint.is_enabled(self.fingerprint.group_by) {
            return Err(ConfigError::Invalid(format!(
                "grouping by {} requires that fingerprint to be enabled",
                self.fingerprint.group_by
            )));
        }
        if self.backups_to_keep == 0 {
            return Err(ConfigError::Invalid("backups_to_keep must be positive".to_string()));
        }
        Ok(())
    }

    /// Resolved data root
    pub fn data_root(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(LocalStorage::default_data_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CatalogConfig::new("/photos");
        assert!(config.validate().is_ok());
        assert_eq!(
            config.fingerprint.enabled_kinds(),
            vec![FingerprintKind::Difference]
        );
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = CatalogConfig {
            batch_size: 0,
            ..CatalogConfig::new("/photos")
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_thumbnail_size_is_rejected() {
        let config = CatalogConfig {
            thumbnail_max_height: 0,
            ..CatalogConfig::new("/photos")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn grouping_kind_must_be_enabled() {
        let config = CatalogConfig {
            fingerprint: FingerprintConfig {
                exact: true,
                difference: false,
                perceptual: false,
                group_by: FingerprintKind::Difference,
            },
            ..CatalogConfig::new("/photos")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn no_enabled_kind_is_rejected() {
        let config = CatalogConfig {
            fingerprint: FingerprintConfig {
                exact: false,
                difference: false,
                perceptual: false,
                group_by: FingerprintKind::Exact,
            },
            ..CatalogConfig::new("/photos")
        };
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("at least one"));
    }

    #[test]
    fn group_by_enables_the_kind() {
        let fingerprint = FingerprintConfig::default().group_by(FingerprintKind::Perceptual);
        assert!(fingerprint.perceptual);
        assert!(fingerprint.difference);
        assert_eq!(fingerprint.group_by, FingerprintKind::Perceptual);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = CatalogConfig::from_json(
            r#"{ "root": "/photos", "batch_size": 25, "fingerprint": { "exact": true } }"#,
        )
        .unwrap();

        assert_eq!(config.root, PathBuf::from("/photos"));
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.thumbnail_max_width, 200);
        assert!(config.fingerprint.exact);
        assert!(config.fingerprint.difference);
        assert_eq!(config.fingerprint.group_by, FingerprintKind::Difference);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            CatalogConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
