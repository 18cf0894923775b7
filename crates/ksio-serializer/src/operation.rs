//! Operations and their results.

use std::fmt;

use bytes::Bytes;
use ksio_types::{Key, OpError};

/// Direction of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Read,
    Write,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// A unit of work against one key. Immutable once submitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Read every byte stored under the key.
    Read { key: Key },
    /// Replace the content under the key with `payload`.
    Write { key: Key, payload: Bytes },
}

impl Operation {
    pub fn read(key: Key) -> Self {
        Self::Read { key }
    }

    pub fn write(key: Key, payload: impl Into<Bytes>) -> Self {
        Self::Write {
            key,
            payload: payload.into(),
        }
    }

    pub fn key(&self) -> &Key {
        match self {
            Self::Read { key } | Self::Write { key, .. } => key,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Read { .. } => OperationKind::Read,
            Self::Write { .. } => OperationKind::Write,
        }
    }
}

/// Outcome of a read: the stored bytes, or the failure that prevented
/// retrieving them.
pub type ReadResult = Result<Bytes, OpError>;

/// Outcome of a write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteResult {
    /// `true` when the backend accepted the full payload.
    pub success: bool,
    /// Why the write failed, when it did.
    pub error: Option<OpError>,
}

impl WriteResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: OpError) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }

    /// Convert into a `Result` for `?`-style composition.
    pub fn into_result(self) -> Result<(), OpError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl From<Result<(), OpError>> for WriteResult {
    fn from(result: Result<(), OpError>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(err) => Self::failed(err),
        }
    }
}

/// Outcome of one [`Operation`]. Produced exactly once per operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationResult {
    Read(ReadResult),
    Write(WriteResult),
}

impl OperationResult {
    pub(crate) fn abandoned(kind: OperationKind, key: Key) -> Self {
        let err = OpError::Abandoned { key };
        match kind {
            OperationKind::Read => Self::Read(Err(err)),
            OperationKind::Write => Self::Write(WriteResult::failed(err)),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Read(_) => OperationKind::Read,
            Self::Write(_) => OperationKind::Write,
        }
    }

    /// The failure, if the operation did not succeed.
    pub fn error(&self) -> Option<&OpError> {
        match self {
            Self::Read(Err(err)) => Some(err),
            Self::Read(Ok(_)) => None,
            Self::Write(w) => w.error.as_ref(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error().is_none()
    }

    /// The bytes returned by a successful read.
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Read(Ok(bytes)) => Some(bytes),
            _ => None,
        }
    }
}
