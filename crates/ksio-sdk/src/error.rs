use thiserror::Error;

/// Errors raised by the SDK before an operation is submitted.
///
/// Failures of submitted operations are not errors at this level; they are
/// delivered in the operation's result.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid key: {0}")]
    InvalidKey(#[from] ksio_types::TypeError),

    #[error("serializer error: {0}")]
    Serializer(#[from] ksio_serializer::SerializerError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
