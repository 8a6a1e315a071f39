use crate::error::BlobError;

/// BlobStore keeps uploaded files (signed contracts, payment receipts).
///
/// Keys are path-like strings: `contratos/2f1c...e9.pdf`,
/// `comprobantes/77ab...01.png`. Stores only ever persist the key; the bytes
/// live behind this trait.
pub trait BlobStore: Send + Sync {
    /// Store a blob. Overwrites if the key already exists.
    fn put(&self, key: &str, data: &[u8]) -> Result<(), BlobError>;

    /// Delete a blob. No-op if the key does not exist.
    fn delete(&self, key: &str) -> Result<(), BlobError>;

    /// Check whether a blob exists.
    fn exists(&self, key: &str) -> Result<bool, BlobError>;
}
