use thiserror::Error;

use crate::key::Key;

/// Errors produced by type construction and parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),

    #[error("codec error: {0}")]
    Codec(String),
}

/// Failure recorded in an operation result.
///
/// Operation bodies never raise through a chain. Every failure from the
/// storage backend or from text conversion is captured as one of these
/// variants and handed back to the caller that submitted the operation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OpError {
    /// The backend could not open or access the resource (not found,
    /// permission denied, locked, unusable key).
    #[error("resource unavailable: {key}: {reason}")]
    ResourceUnavailable { key: Key, reason: String },

    /// The transfer started but did not complete.
    #[error("I/O failure on {key}: {reason}")]
    IoFailure { key: Key, reason: String },

    /// Bytes could not be decoded, or text encoded, under the requested scheme.
    #[error("encoding failure on {key}: {reason}")]
    EncodingFailure { key: Key, reason: String },

    /// The worker running the operation was torn down before producing a
    /// result (runtime shutdown or a panicking backend).
    #[error("operation on {key} was abandoned before completion")]
    Abandoned { key: Key },
}

impl OpError {
    /// The key the failed operation addressed.
    pub fn key(&self) -> &Key {
        match self {
            Self::ResourceUnavailable { key, .. }
            | Self::IoFailure { key, .. }
            | Self::EncodingFailure { key, .. }
            | Self::Abandoned { key } => key,
        }
    }

    /// Returns `true` for failures caused by the resource being inaccessible
    /// rather than by a broken transfer.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ResourceUnavailable { .. })
    }
}
