//! Storage backends for keyed serial I/O.
//!
//! A backend performs exactly one blocking transfer per call: read all bytes
//! stored under a key, or replace them with a new buffer. Backends know
//! nothing about ordering; the serializer guarantees that a given key is
//! touched by at most one transfer at a time as long as every access flows
//! through the same serializer instance.
//!
//! # Storage Backends
//!
//! All backends implement the [`StorageBackend`] trait:
//!
//! - [`FsBackend`] -- keys are file paths, optionally confined under a root
//! - [`InMemoryBackend`] -- `HashMap`-based store with a transfer log and
//!   fault injection, for tests and embedding
//!
//! # Design Rules
//!
//! 1. Transfers are whole-buffer: no partial or range writes.
//! 2. A write replaces the previous content entirely (truncate semantics).
//! 3. Failures are reported, never retried or swallowed.
//! 4. Backend errors convert into the operation failure taxonomy via
//!    `From<StoreError> for OpError`.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use fs::FsBackend;
pub use memory::{InMemoryBackend, TransferKind, TransferRecord};
pub use traits::StorageBackend;
