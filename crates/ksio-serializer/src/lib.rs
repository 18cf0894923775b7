//! Keyed operation serializer.
//!
//! Reads and writes against named resources are submitted concurrently and
//! turned into per-key FIFO chains:
//!
//! - operations on the same key run one at a time, in submission order, and
//!   each observes the effect of the one before it;
//! - operations on different keys never wait on each other;
//! - a read arriving while a write to the same key is running can be
//!   answered from that write's payload (read-your-write) without touching
//!   the backend;
//! - a key's bookkeeping disappears as soon as its last operation retires.
//!
//! # Lifecycle
//!
//! ```text
//! submitted ──(predecessor retired)──▶ running ──(transfer done)──▶ completed
//!                                                                      │
//!                           chain-cleaned ◀──(still the tail?)─────────┘
//! ```
//!
//! A submission is linked to its predecessor by a one-shot "start" message.
//! The predecessor posts it after retiring, so a chain of any length holds
//! no worker thread while it waits. Transfers run on the runtime's blocking
//! pool. Failures never escape a chain: they are recorded in the result and
//! the next operation runs as usual.
//!
//! # Modules
//!
//! - [`operation`]: [`Operation`], [`OperationResult`], [`WriteResult`]
//! - [`serializer`]: [`KeyedSerializer`] and [`SerializerStats`]
//! - [`pending`]: the [`Pending`] result handle
//! - [`config`]: [`SerializerConfig`] and [`ReadConsistency`]

mod chain;
pub mod config;
pub mod error;
pub mod operation;
pub mod pending;
pub mod serializer;

pub use config::{ReadConsistency, SerializerConfig};
pub use error::{SerializerError, SerializerResult};
pub use operation::{Operation, OperationKind, OperationResult, ReadResult, WriteResult};
pub use pending::Pending;
pub use serializer::{KeyedSerializer, SerializerStats};
