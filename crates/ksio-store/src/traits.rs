use ksio_types::Key;

use crate::error::StoreResult;

/// Blocking storage backend.
///
/// All implementations must satisfy these invariants:
/// - `read` returns the full content last written under the key, or an error.
/// - `write` replaces the full content under the key.
/// - Calls may block; callers run them on a background worker.
/// - All I/O errors are propagated, never silently ignored.
pub trait StorageBackend: Send + Sync + 'static {
    /// Read every byte stored under `key`.
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if
    /// nothing has been written under the key.
    fn read(&self, key: &Key) -> StoreResult<Vec<u8>>;

    /// Replace the content stored under `key` with `data`.
    fn write(&self, key: &Key, data: &[u8]) -> StoreResult<()>;

    /// Check whether the key currently holds content.
    ///
    /// Default implementation attempts a read. Backends may override for
    /// better performance.
    fn exists(&self, key: &Key) -> StoreResult<bool> {
        match self.read(key) {
            Ok(_) => Ok(true),
            Err(crate::StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
