//! An object pool recycling [`Message`] allocations (spec §3 "reference-
//! counted in an object pool to minimize allocation"). Grounded on the
//! RAII-guard pattern used for external resource pooling elsewhere in
//! this lineage, narrowed to a single `Vec`-backed free list since
//! messages are fixed-shape, locally-owned allocations rather than
//! externally-validated resources.

use crate::message::Message;
use parking_lot::Mutex;
use std::sync::Arc;

struct Inner {
    free: Mutex<Vec<Message>>,
    max_idle: usize,
}

/// A pool of reusable [`Message`] allocations.
///
/// Checking out a message never blocks: the pool hands back a recycled,
/// `reset()` message if one is idle, or allocates a fresh one otherwise.
#[derive(Clone)]
pub struct MessagePool {
    inner: Arc<Inner>,
}

impl MessagePool {
    /// Construct a pool that retains at most `max_idle` messages between
    /// checkouts; excess returns are simply dropped.
    #[must_use]
    pub fn new(max_idle: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                free: Mutex::new(Vec::with_capacity(max_idle)),
                max_idle,
            }),
        }
    }

    /// Check out a message, recycled if one is idle.
    #[must_use]
    pub fn checkout(&self) -> PooledMessage {
        let message = self.inner.free.lock().pop().unwrap_or_default();
        PooledMessage {
            message: Some(message),
            pool: self.inner.clone(),
        }
    }

    /// Number of idle messages currently held by the pool.
    #[must_use]
    pub fn idle_len(&self) -> usize {
        self.inner.free.lock().len()
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A checked-out [`Message`]; returns its allocation to the pool on drop.
pub struct PooledMessage {
    message: Option<Message>,
    pool: Arc<Inner>,
}

impl PooledMessage {
    /// Take ownership of the message, skipping the return-to-pool step.
    #[must_use]
    pub fn into_inner(mut self) -> Message {
        self.message.take().expect("pooled message used after into_inner")
    }
}

impl std::ops::Deref for PooledMessage {
    type Target = Message;

    fn deref(&self) -> &Message {
        self.message.as_ref().expect("pooled message used after into_inner")
    }
}

impl std::ops::DerefMut for PooledMessage {
    fn deref_mut(&mut self) -> &mut Message {
        self.message.as_mut().expect("pooled message used after into_inner")
    }
}

impl Drop for PooledMessage {
    fn drop(&mut self) {
        if let Some(mut message) = self.message.take() {
            let mut free = self.pool.free.lock();
            if free.len() < self.pool.max_idle {
                message.reset();
                free.push(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Operation;

    #[test]
    fn checkout_then_drop_recycles_the_allocation() {
        let pool = MessagePool::new(4);
        assert_eq!(pool.idle_len(), 0);
        {
            let mut msg = pool.checkout();
            msg.after = vec![1, 2, 3];
        }
        assert_eq!(pool.idle_len(), 1);
    }

    #[test]
    fn recycled_message_is_reset() {
        let pool = MessagePool::new(4);
        {
            let mut msg = pool.checkout();
            msg.id = Some(hermod_core::MessageId::v4());
            msg.after = vec![1, 2, 3];
        }
        let msg = pool.checkout();
        assert!(msg.id.is_none());
        assert!(msg.after.is_empty());
    }

    #[test]
    fn into_inner_skips_recycling() {
        let pool = MessagePool::new(4);
        let pooled = pool.checkout();
        let message = pooled.into_inner();
        assert!(message.id.is_none());
        assert_eq!(pool.idle_len(), 0);
    }

    #[test]
    fn excess_returns_beyond_max_idle_are_dropped() {
        let pool = MessagePool::new(1);
        {
            let _a = pool.checkout();
            let _b = pool.checkout();
        }
        assert!(pool.idle_len() <= 1);
    }

    #[test]
    fn checked_out_message_is_independently_mutable() {
        let pool = MessagePool::new(4);
        let mut msg = pool.checkout();
        msg.operation = Some(Operation::Create);
        assert_eq!(msg.operation, Some(Operation::Create));
    }
}
