use thiserror::Error;

/// Errors raised while constructing a serializer.
///
/// Operation failures never appear here: they are recorded in the
/// operation's own result.
#[derive(Debug, Error)]
pub enum SerializerError {
    /// `KeyedSerializer::new` was called outside a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

/// Convenience alias used throughout the serializer crate.
pub type SerializerResult<T> = std::result::Result<T, SerializerError>;
