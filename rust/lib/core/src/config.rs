use std::path::PathBuf;

use serde::Deserialize;

/// Storage locations shared by every module.
///
/// Binaries fill this from their config file and command-line flags, then
/// pass it to storage initialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base directory for all persisted state.
    pub data_dir: Option<PathBuf>,

    /// Path to the SQLite database file.
    /// Defaults to `{data_dir}/coopdesk.sqlite` if not specified.
    pub sqlite_path: Option<PathBuf>,

    /// Directory for uploaded documents and receipts.
    /// Defaults to `{data_dir}/uploads/` if not specified.
    pub blob_dir: Option<PathBuf>,
}

impl ServiceConfig {
    /// Layer `overrides` on top of `self`; fields set in `overrides` win.
    ///
    /// Binaries load the config file first, then apply command-line flags.
    pub fn merge(self, overrides: ServiceConfig) -> Self {
        Self {
            data_dir: overrides.data_dir.or(self.data_dir),
            sqlite_path: overrides.sqlite_path.or(self.sqlite_path),
            blob_dir: overrides.blob_dir.or(self.blob_dir),
        }
    }

    /// Resolve the SQLite database path, falling back to `{data_dir}/coopdesk.sqlite`.
    pub fn resolve_sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("coopdesk.sqlite"))
    }

    /// Resolve the upload storage directory.
    pub fn resolve_blob_dir(&self) -> PathBuf {
        self.blob_dir
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("uploads"))
    }

    fn resolve_data_subpath(&self, name: &str) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(|d| d.join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }
}
