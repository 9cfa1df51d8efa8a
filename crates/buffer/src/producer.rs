//! The buffer producer interface (spec §4.7: "`Enqueue(msg) error` plus
//! backpressure on full").

use crate::error::BufferError;
use async_trait::async_trait;
use hermod_message::Message;

/// Accepts messages from the source reader and hands them to the
/// dispatch loop.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Enqueue a message, waiting for room if the buffer is full (spec
    /// §4.7: this is the suspension point the `block` backpressure
    /// strategy relies on).
    async fn enqueue(&self, msg: Message) -> Result<(), BufferError>;

    /// Enqueue without waiting; returns [`BufferError::Full`] immediately
    /// if there is no room. Used by the `drop`/`sample` backpressure
    /// strategies, which must never suspend the reader.
    fn try_enqueue(&self, msg: Message) -> Result<(), BufferError>;

    /// Remove and return the next message, waiting if the buffer is
    /// empty. Returns `None` once the buffer is closed and drained.
    async fn dequeue(&self) -> Option<Message>;

    /// Signal that no further messages will be enqueued; wakes any
    /// pending `dequeue` calls once the buffer drains (spec §4.5
    /// "Graceful: ... buffer drains").
    fn close(&self);
}
