pub mod catalog;
pub mod contracts;
pub mod ledger;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use ::contracts::ContractsModule;
use coopdesk_blob::{BlobStore, FileStore, Upload, store_upload};
use coopdesk_core::{ServiceConfig, ServiceError};
use coopdesk_sql::{SQLStore, SqliteStore};

/// Opened stores for one command invocation.
pub struct App {
    pub module: ContractsModule,
    pub blobs: FileStore,
}

/// Open the database (migrating it) and the upload directory.
pub fn open(config: &ServiceConfig) -> Result<App> {
    let db = open_db(config)?;
    let module = ContractsModule::new(db)?;

    let blob_dir = config.resolve_blob_dir();
    let blobs = FileStore::open(&blob_dir)
        .map_err(|e| anyhow::anyhow!("failed to open upload dir {}: {}", blob_dir.display(), e))?;

    Ok(App { module, blobs })
}

/// Open the database without running migrations.
pub fn open_db(config: &ServiceConfig) -> Result<Arc<dyn SQLStore>> {
    let path = config.resolve_sqlite_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    debug!("using database {}", path.display());
    let db = SqliteStore::open(&path)
        .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?;
    Ok(Arc::new(db))
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Request body from `--json` or `-f <file>`.
pub fn read_body(json: Option<String>, file: Option<&Path>) -> Result<serde_json::Value> {
    let text = if let Some(path) = file {
        std::fs::read_to_string(path)?
    } else if let Some(json) = json {
        json
    } else {
        anyhow::bail!("Provide --json or -f <file>.");
    };
    Ok(serde_json::from_str(&text)?)
}

/// Store a local file as an upload and return its storage path.
pub fn attach(blobs: &dyn BlobStore, path: &Path, folder: &str) -> Result<String> {
    let upload = Upload {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        bytes: std::fs::read(path)?,
    };
    let outcome = store_upload(blobs, &upload, folder);
    match (outcome.path, outcome.error) {
        (Some(stored), _) => Ok(stored),
        (None, error) => anyhow::bail!(
            "{}: {}",
            path.display(),
            error.unwrap_or_else(|| "upload rejected".to_string())
        ),
    }
}

/// Store the optional local file under `folder`, then run `write` with its
/// storage path. The stored file is removed again when `write` fails, so no
/// upload outlives a rejected write.
pub fn with_upload<T>(
    blobs: &dyn BlobStore,
    local: Option<&Path>,
    folder: &str,
    write: impl FnOnce(Option<String>) -> Result<T, ServiceError>,
) -> Result<T> {
    let stored = local.map(|path| attach(blobs, path, folder)).transpose()?;
    match write(stored.clone()) {
        Ok(value) => Ok(value),
        Err(err) => {
            if let Some(key) = stored {
                debug!("discarding upload {} after failed write", key);
                if let Err(e) = blobs.delete(&key) {
                    warn!("failed to remove upload {}: {}", key, e);
                }
            }
            Err(err.into())
        }
    }
}

/// Whether the upload at `key` is still present. `None` when nothing was
/// uploaded.
pub fn upload_present(blobs: &dyn BlobStore, key: Option<&str>) -> Result<Option<bool>> {
    match key.filter(|k| !k.is_empty()) {
        Some(key) => Ok(Some(blobs.exists(key)?)),
        None => Ok(None),
    }
}

/// Collect present `(key, value)` pairs into a filter map.
pub fn filter_map<'a>(pairs: impl IntoIterator<Item = (&'a str, Option<String>)>) -> HashMap<String, String> {
    pairs
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
        .collect()
}

/// Ask for confirmation on stderr unless `yes` is set.
pub fn confirm(yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    eprint!("Are you sure? [y/N]: ");
    let mut s = String::new();
    std::io::stdin().read_line(&mut s)?;
    Ok(s.trim().eq_ignore_ascii_case("y"))
}
