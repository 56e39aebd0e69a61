//! Configuration loading.
//!
//! Layered sources, lowest priority first: built-in defaults, an optional
//! `modsync.toml` next to the working directory, then `MODSYNC_*` environment
//! variables (`MODSYNC_ARCHIVE_URL`, `MODSYNC_MODS_DIR`, ...).

use crate::error::SyncError;
use config::{Config, Environment, File, FileFormat};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const CONFIG_FILE: &str = "modsync.toml";
const ENV_PREFIX: &str = "MODSYNC";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// URL of the reference zip archive.
    pub archive_url: String,

    /// The live tree to synchronize. Unset means the caller has to supply a
    /// path before a sync can start.
    #[serde(default)]
    pub mods_dir: Option<PathBuf>,

    /// Where backup zips land. Defaults to the desktop, then the home
    /// directory.
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// Drop VCS metadata, caches and editor litter from the live-side scan.
    #[serde(default = "default_filter_garbage")]
    pub filter_garbage: bool,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_filter_garbage() -> bool {
    true
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            archive_url: String::new(),
            mods_dir: None,
            backup_dir: None,
            filter_garbage: default_filter_garbage(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from the layered sources.
    pub fn load() -> Result<Self, SyncError> {
        let settings = Config::builder()
            .set_default("filter_garbage", default_filter_garbage())?
            .set_default("http_timeout_secs", default_http_timeout_secs() as i64)?
            .add_source(File::new(CONFIG_FILE, FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Backup destination, falling back to desktop then home when unset.
    pub fn backup_dir(&self) -> Result<PathBuf, SyncError> {
        if let Some(dir) = &self.backup_dir {
            return Ok(dir.clone());
        }
        let dirs = UserDirs::new()
            .ok_or_else(|| SyncError::Config("no home directory available".to_string()))?;
        Ok(dirs
            .desktop_dir()
            .unwrap_or_else(|| dirs.home_dir())
            .to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = SyncConfig::default();
        assert!(config.filter_garbage);
        assert_eq!(config.http_timeout_secs, 30);
        assert!(config.mods_dir.is_none());
    }

    #[test]
    fn explicit_backup_dir_wins() {
        let config = SyncConfig {
            backup_dir: Some(PathBuf::from("/tmp/backups")),
            ..SyncConfig::default()
        };
        assert_eq!(config.backup_dir().unwrap(), PathBuf::from("/tmp/backups"));
    }

    #[test]
    fn fallback_backup_dir_exists_under_home() {
        let config = SyncConfig::default();
        let dir = config.backup_dir().unwrap();
        assert!(dir.is_absolute());
    }

    #[test]
    fn serialized_form_round_trips() {
        let config = SyncConfig {
            archive_url: "https://example.com/mods.zip".to_string(),
            mods_dir: Some(PathBuf::from("/games/mods")),
            ..SyncConfig::default()
        };
        let serialized = serde_json::to_string(&config).unwrap();
        let parsed: SyncConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(parsed.archive_url, config.archive_url);
        assert_eq!(parsed.mods_dir, config.mods_dir);
    }
}
