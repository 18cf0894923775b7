//! Per-key chain bookkeeping.
//!
//! The table maps each key with outstanding activity to its chain entry.
//! An entry records the tail ticket, the unclaimed "tail finished" signal
//! that the next submission will wait on, how many operations are still
//! unretired, and, in shadow mode, the payload of the newest chained write.
//!
//! Every method here runs under the serializer's single bookkeeping lock and
//! does only map and pointer updates.

use std::collections::HashMap;

use bytes::Bytes;
use ksio_types::{Key, Ticket};
use tokio::sync::oneshot;

/// Signal posted by an operation when it has fully retired; the successor
/// in its chain starts when it arrives.
pub(crate) type StartSignal = oneshot::Receiver<()>;

/// Payload of the newest chained write, visible to reads before the
/// physical transfer finishes.
#[derive(Debug)]
struct Shadow {
    owner: Ticket,
    payload: Bytes,
    started: bool,
}

#[derive(Debug)]
struct ChainEntry {
    tail: Ticket,
    tail_done: Option<StartSignal>,
    depth: usize,
    shadow: Option<Shadow>,
}

/// Outcome of admitting a submission into the table.
#[derive(Debug)]
pub(crate) enum Admission {
    /// Answered from the shadow; the read never enters the chain.
    Shadowed(Bytes),
    /// Chained. Start immediately when `None`, otherwise when the signal
    /// from the previous tail arrives.
    Chained(Option<StartSignal>),
}

/// Outcome of retiring an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Retirement {
    /// The operation was the tail; the key's entry was removed.
    Drained,
    /// A newer operation is chained and owns future cleanup.
    Superseded,
    /// No entry existed for the key.
    Untracked,
}

#[derive(Debug, Default)]
pub(crate) struct ChainTable {
    entries: HashMap<Key, ChainEntry>,
}

impl ChainTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Admit a read with ticket `ticket` whose retirement is announced
    /// through `done`. With `allow_shadow`, a live shadow answers the read
    /// and the chain is left untouched.
    pub(crate) fn admit_read(
        &mut self,
        key: &Key,
        ticket: Ticket,
        done: StartSignal,
        allow_shadow: bool,
    ) -> Admission {
        if allow_shadow {
            if let Some(payload) = self.live_shadow(key) {
                return Admission::Shadowed(payload);
            }
        }
        Admission::Chained(self.append(key, ticket, done, None))
    }

    /// Admit a write. `shadow` is the payload to expose to later reads, if
    /// shadowing is enabled. Returns the predecessor's start signal.
    pub(crate) fn admit_write(
        &mut self,
        key: &Key,
        ticket: Ticket,
        done: StartSignal,
        shadow: Option<Bytes>,
    ) -> Option<StartSignal> {
        let shadow = shadow.map(|payload| Shadow {
            owner: ticket,
            payload,
            started: false,
        });
        self.append(key, ticket, done, shadow)
    }

    fn append(
        &mut self,
        key: &Key,
        ticket: Ticket,
        done: StartSignal,
        shadow: Option<Shadow>,
    ) -> Option<StartSignal> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                let wait_on = entry.tail_done.take();
                entry.tail = ticket;
                entry.tail_done = Some(done);
                entry.depth += 1;
                if shadow.is_some() {
                    entry.shadow = shadow;
                }
                wait_on
            }
            None => {
                self.entries.insert(
                    key.clone(),
                    ChainEntry {
                        tail: ticket,
                        tail_done: Some(done),
                        depth: 1,
                        shadow,
                    },
                );
                None
            }
        }
    }

    /// Shadow payload a read may return right now: the newest write must be
    /// the tail (nothing queued behind it) and must already be running
    /// (everything queued before it has retired).
    fn live_shadow(&self, key: &Key) -> Option<Bytes> {
        let entry = self.entries.get(key)?;
        let shadow = entry.shadow.as_ref()?;
        (shadow.owner == entry.tail && shadow.started).then(|| shadow.payload.clone())
    }

    /// Record that the operation `ticket` has started its transfer.
    pub(crate) fn mark_started(&mut self, key: &Key, ticket: Ticket) {
        if let Some(shadow) = self
            .entries
            .get_mut(key)
            .and_then(|entry| entry.shadow.as_mut())
        {
            if shadow.owner == ticket {
                shadow.started = true;
            }
        }
    }

    /// Retire the operation `ticket`. The entry is removed only if
    /// `ticket` is still the recorded tail, compared by identity under the
    /// same lock as every insert, so a submission racing this call is never
    /// lost.
    pub(crate) fn retire(&mut self, key: &Key, ticket: Ticket) -> Retirement {
        let Some(entry) = self.entries.get_mut(key) else {
            return Retirement::Untracked;
        };
        if entry.tail == ticket {
            self.entries.remove(key);
            return Retirement::Drained;
        }
        entry.depth = entry.depth.saturating_sub(1);
        if entry.shadow.as_ref().is_some_and(|s| s.owner == ticket) {
            entry.shadow = None;
        }
        Retirement::Superseded
    }

    /// Number of keys with at least one unretired operation.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unretired operations chained on `key`.
    pub(crate) fn depth(&self, key: &Key) -> usize {
        self.entries.get(key).map_or(0, |e| e.depth)
    }

    /// Unretired operations across all keys.
    pub(crate) fn in_flight(&self) -> usize {
        self.entries.values().map(|e| e.depth).sum()
    }

    #[cfg(test)]
    fn tail(&self, key: &Key) -> Option<Ticket> {
        self.entries.get(key).map(|e| e.tail)
    }
}
