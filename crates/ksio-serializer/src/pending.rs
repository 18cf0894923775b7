use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use ksio_types::{Key, Ticket};
use tokio::sync::oneshot;

enum State<T> {
    Waiting(oneshot::Receiver<T>),
    Ready(Option<T>),
}

/// Handle to the eventual result of a submitted operation.
///
/// Returned immediately by every submission. Awaiting it yields the
/// operation's terminal result. Dropping it does not cancel the operation:
/// the chain still runs it to completion.
pub struct Pending<T> {
    state: State<T>,
    key: Key,
    ticket: Option<Ticket>,
    abandoned: fn(Key) -> T,
}

// The result is never pinned; it is moved out of the channel by value.
impl<T> Unpin for Pending<T> {}

impl<T> Pending<T> {
    pub(crate) fn waiting(
        rx: oneshot::Receiver<T>,
        key: Key,
        ticket: Ticket,
        abandoned: fn(Key) -> T,
    ) -> Self {
        Self {
            state: State::Waiting(rx),
            key,
            ticket: Some(ticket),
            abandoned,
        }
    }

    /// A handle that is already resolved, for results produced without
    /// entering a chain.
    pub fn ready(key: Key, value: T, abandoned: fn(Key) -> T) -> Self {
        Self {
            state: State::Ready(Some(value)),
            key,
            ticket: None,
            abandoned,
        }
    }

    /// The key the operation addresses.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The ticket the operation was chained under, or `None` if it was
    /// answered without entering a chain.
    pub fn ticket(&self) -> Option<Ticket> {
        self.ticket
    }
}

impl<T> Future for Pending<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        match &mut this.state {
            State::Ready(value) => {
                Poll::Ready(value.take().expect("Pending polled after completion"))
            }
            State::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(value)) => Poll::Ready(value),
                // The worker was dropped before sending a result.
                Poll::Ready(Err(_)) => Poll::Ready((this.abandoned)(this.key.clone())),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl<T> std::fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resolved = matches!(self.state, State::Ready(_));
        f.debug_struct("Pending")
            .field("key", &self.key)
            .field("ticket", &self.ticket)
            .field("resolved", &resolved)
            .finish()
    }
}
