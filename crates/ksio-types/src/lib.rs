//! Foundation types for keyed serial I/O (ksio).
//!
//! This crate provides the identity and failure types shared by every other
//! ksio crate. It has no knowledge of storage or scheduling.
//!
//! # Key Types
//!
//! - [`Key`]: Opaque, validated identifier of a shared resource (a file path)
//! - [`Ticket`]: Identity of one submitted operation within a serializer
//! - [`Encoding`]: Text encoding applied by the text read/write shapes
//! - [`OpError`]: Failure recorded in an operation result

pub mod encoding;
pub mod error;
pub mod key;
pub mod ticket;

pub use encoding::Encoding;
pub use error::{OpError, TypeError};
pub use key::Key;
pub use ticket::Ticket;
