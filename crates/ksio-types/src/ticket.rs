use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one submitted operation within a serializer instance.
///
/// Tickets are issued in strictly increasing order per serializer. A chain's
/// tail handle is a ticket; cleanup compares the retiring ticket against the
/// recorded tail and removes the chain only on an exact match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticket(u64);

impl Ticket {
    /// Wrap a raw ticket number.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw ticket number.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
