//! Config file handling.
//!
//! Reads `~/.coopdesk/config.toml` unless `--config` points elsewhere:
//!
//! ```toml
//! [storage]
//! data_dir = "/var/lib/coopdesk"
//! # sqlite_path = "/var/lib/coopdesk/coopdesk.sqlite"
//! # blob_dir = "/var/lib/coopdesk/uploads"
//!
//! [log]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};

use coopdesk_core::ServiceConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub storage: ServiceConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl FileConfig {
    /// Default config file path: ~/.coopdesk/config.toml.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }

    /// Load config from disk, or return default if the file doesn't exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: FileConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?;
        Ok(config)
    }
}

/// Return the coopdesk config directory (~/.coopdesk).
fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".coopdesk")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.log.level, "info");
        assert!(config.storage.data_dir.is_none());
    }

    #[test]
    fn test_parse_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[storage]\ndata_dir = \"/srv/coopdesk\"\n\n[log]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = FileConfig::load(&path).unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(
            config.storage.resolve_sqlite_path(),
            PathBuf::from("/srv/coopdesk/coopdesk.sqlite")
        );
    }

    #[test]
    fn test_invalid_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage\n").unwrap();
        assert!(FileConfig::load(&path).is_err());
    }
}
