//! Upload handling for contract documents and payment receipts.
//!
//! Stores never see upload bytes; they persist the `path` of a successful
//! [`UploadOutcome`] and nothing else.

use serde::Serialize;
use tracing::{info, warn};

use crate::traits::BlobStore;

/// Largest accepted upload, in bytes.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png"];

/// A raw upload as received from the caller.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-side file name; only its extension is used.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Result of storing an upload: exactly one of `path` / `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub path: Option<String>,
    pub error: Option<String>,
}

impl UploadOutcome {
    fn stored(path: String) -> Self {
        Self {
            path: Some(path),
            error: None,
        }
    }

    fn rejected(error: impl Into<String>) -> Self {
        Self {
            path: None,
            error: Some(error.into()),
        }
    }
}

/// Validate `upload` and store it under `folder/<random>.<ext>`.
pub fn store_upload(blob: &dyn BlobStore, upload: &Upload, folder: &str) -> UploadOutcome {
    if upload.bytes.is_empty() {
        return UploadOutcome::rejected("El archivo está vacío");
    }
    if upload.bytes.len() > MAX_UPLOAD_BYTES {
        return UploadOutcome::rejected("El archivo supera el tamaño máximo de 10 MB");
    }

    let extension = match upload.file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => String::new(),
    };
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return UploadOutcome::rejected("Formato no permitido (solo PDF, JPG o PNG)");
    }

    let key = format!(
        "{}/{}.{}",
        folder.trim_matches('/'),
        uuid::Uuid::new_v4().simple(),
        extension
    );
    match blob.put(&key, &upload.bytes) {
        Ok(()) => {
            info!("stored upload {} ({} bytes)", key, upload.bytes.len());
            UploadOutcome::stored(key)
        }
        Err(e) => {
            warn!("upload {} failed: {}", key, e);
            UploadOutcome::rejected("No se pudo guardar el archivo")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileStore;

    fn upload(name: &str, bytes: &[u8]) -> Upload {
        Upload {
            file_name: name.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn stores_allowed_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let outcome = store_upload(&store, &upload("Contrato Firmado.PDF", b"%PDF"), "contratos");
        assert!(outcome.error.is_none());
        let path = outcome.path.unwrap();
        assert!(path.starts_with("contratos/"));
        assert!(path.ends_with(".pdf"));
        assert!(store.exists(&path).unwrap());
    }

    #[test]
    fn rejects_bad_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let empty = store_upload(&store, &upload("a.pdf", b""), "comprobantes");
        assert!(empty.path.is_none());
        assert!(empty.error.is_some());

        let exe = store_upload(&store, &upload("virus.exe", b"MZ"), "comprobantes");
        assert!(exe.path.is_none());

        let no_ext = store_upload(&store, &upload("README", b"x"), "comprobantes");
        assert!(no_ext.path.is_none());

        let big = vec![0u8; MAX_UPLOAD_BYTES + 1];
        let too_big = store_upload(&store, &Upload { file_name: "a.png".into(), bytes: big }, "x");
        assert!(too_big.path.is_none());
    }
}
