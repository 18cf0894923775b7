//! High-level read/write API for keyed serial I/O.
//!
//! [`SerialFiles`] is the entry point for applications. It validates keys,
//! converts text, submits operations to a [`KeyedSerializer`] and hands the
//! results back either as futures or through callbacks run by a
//! [`CompletionDispatcher`] on a designated execution context.
//!
//! ```no_run
//! # async fn demo() -> ksio_sdk::SdkResult<()> {
//! use ksio_sdk::{Config, InlineDispatcher, SerialFiles};
//!
//! let files = SerialFiles::open(&Config::default(), InlineDispatcher)?;
//! let saved = files.write_string("save/slot1.json", "{}")?;
//! let loaded = files.read_string("save/slot1.json")?;
//! assert!(saved.await.success);
//! assert_eq!(loaded.await.unwrap(), "{}");
//! # Ok(())
//! # }
//! ```
//!
//! [`KeyedSerializer`]: ksio_serializer::KeyedSerializer

pub mod config;
pub mod dispatch;
pub mod error;
pub mod files;

pub use config::{Config, StorageConfig, TextConfig};
pub use dispatch::{context, Callback, CompletionDispatcher, ContextDispatcher, ContextLoop, InlineDispatcher};
pub use error::{SdkError, SdkResult};
pub use files::SerialFiles;

pub use ksio_serializer::{ReadConsistency, ReadResult, SerializerConfig, SerializerStats, WriteResult};
pub use ksio_types::{Encoding, Key, OpError};
