pub mod filesystem;

pub use filesystem::LocalContentStore;

use crate::error::StorageError;

/// Blob store for raw uploads, addressed by an opaque file reference.
pub trait ContentStore: Send + Sync {
    /// Stores `bytes` under `key` and returns the file reference.
    /// Never overwrites an existing blob.
    fn put(&self, key: &str, extension: &str, bytes: &[u8]) -> Result<String, StorageError>;

    fn get(&self, file_ref: &str) -> Result<Vec<u8>, StorageError>;

    /// Removes a blob. Deleting a missing blob is not an error.
    fn delete(&self, file_ref: &str) -> Result<(), StorageError>;
}
