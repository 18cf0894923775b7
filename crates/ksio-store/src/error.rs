use std::io;

use ksio_types::{Key, OpError};

/// Errors from storage backend transfers.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Nothing is stored under the key.
    #[error("not found: {0}")]
    NotFound(Key),

    /// The backend refused access to the key.
    #[error("permission denied: {0}")]
    PermissionDenied(Key),

    /// The key names something that is not a regular file, such as a
    /// directory.
    #[error("not a file: {0}")]
    NotAFile(Key),

    /// The resource is held by someone outside this process.
    #[error("resource locked: {0}")]
    Locked(Key),

    /// The key cannot be mapped onto this backend.
    #[error("invalid key {key}: {reason}")]
    InvalidKey { key: Key, reason: String },

    /// The transfer started but failed.
    #[error("I/O error on {key}: {source}")]
    Io {
        key: Key,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Classify an I/O error raised while transferring `key`.
    pub fn from_io(key: &Key, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(key.clone()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(key.clone()),
            io::ErrorKind::WouldBlock => Self::Locked(key.clone()),
            _ => Self::Io {
                key: key.clone(),
                source: err,
            },
        }
    }

    /// The key the failed transfer addressed.
    pub fn key(&self) -> &Key {
        match self {
            Self::NotFound(key)
            | Self::NotAFile(key)
            | Self::PermissionDenied(key)
            | Self::Locked(key) => key,
            Self::InvalidKey { key, .. } | Self::Io { key, .. } => key,
        }
    }

    /// Returns `true` when the resource could not be accessed at all, as
    /// opposed to a transfer that broke midway.
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }
}

impl From<StoreError> for OpError {
    fn from(err: StoreError) -> Self {
        let key = err.key().clone();
        let reason = match &err {
            StoreError::Io { source, .. } => source.to_string(),
            StoreError::InvalidKey { reason, .. } => reason.clone(),
            StoreError::NotFound(_) => "not found".into(),
            StoreError::NotAFile(_) => "not a file".into(),
            StoreError::PermissionDenied(_) => "permission denied".into(),
            StoreError::Locked(_) => "locked".into(),
        };
        if err.is_unavailable() {
            OpError::ResourceUnavailable { key, reason }
        } else {
            OpError::IoFailure { key, reason }
        }
    }
}

/// Result alias for backend transfers.
pub type StoreResult<T> = Result<T, StoreError>;
