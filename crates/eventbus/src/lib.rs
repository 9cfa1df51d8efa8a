#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Hermod Event Bus
//!
//! Generic broadcast event bus. Spec §5: "Subscriber channels are
//! buffered... and never blocked on by the publisher: slow subscribers
//! get dropped events rather than stalling the engine." [`EventBus<T>`]
//! is used both for workflow status changes (registry → API/CLI
//! subscribers) and for sampled live-message traces — two independent
//! instantiations of the same generic bus, rather than two bespoke
//! pub/sub implementations.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

/// Broadcast-based event bus over any `Clone`-able event type.
pub struct EventBus<T: Clone> {
    sender: broadcast::Sender<T>,
    emitted: AtomicU64,
}

impl<T: Clone> EventBus<T> {
    /// Create a new event bus with the given channel capacity (spec §5:
    /// "default 100-1000 slots").
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            emitted: AtomicU64::new(0),
        }
    }

    /// Emit an event to all subscribers. Returns silently if there are no
    /// active subscribers — this is fire-and-forget, never backpressure.
    pub fn emit(&self, event: T) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(event);
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventSubscriber<T> {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Total number of events emitted since creation.
    #[must_use]
    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Handle for receiving events from an [`EventBus`].
///
/// A lagging subscriber (buffer overflowed before it could drain) skips
/// forward to the next event rather than erroring out — it has already
/// missed events and raising would only compound the loss.
pub struct EventSubscriber<T: Clone> {
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> EventSubscriber<T> {
    /// Receive the next event, waiting asynchronously. `None` once the
    /// publisher has been dropped.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Shared handle to an [`EventBus`], cheap to clone and pass into
/// per-engine closures (spec §9 "Mutable global singletons" — owned
/// top-down by the registry, never a process-wide static).
pub type SharedEventBus<T> = Arc<EventBus<T>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Sample(u32);

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus: EventBus<Sample> = EventBus::new(16);
        bus.emit(Sample(1));
        assert_eq!(bus.total_emitted(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn subscriber_receives_via_try_recv() {
        let bus: EventBus<Sample> = EventBus::new(16);
        let mut sub = bus.subscribe();
        bus.emit(Sample(7));
        assert_eq!(sub.try_recv(), Some(Sample(7)));
    }

    #[tokio::test]
    async fn subscriber_receives_via_recv() {
        let bus: EventBus<Sample> = EventBus::new(16);
        let mut sub = bus.subscribe();
        bus.emit(Sample(9));
        assert_eq!(sub.recv().await, Some(Sample(9)));
    }

    #[test]
    fn multiple_subscribers_each_get_a_copy() {
        let bus: EventBus<Sample> = EventBus::new(16);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        bus.emit(Sample(1));
        assert!(sub1.try_recv().is_some());
        assert!(sub2.try_recv().is_some());
    }

    #[test]
    fn subscriber_count_tracks_active_subscriptions() {
        let bus: EventBus<Sample> = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        let sub1 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        let sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(sub1);
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub2);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_forward_instead_of_erroring() {
        let bus: EventBus<Sample> = EventBus::new(2);
        let mut sub = bus.subscribe();
        bus.emit(Sample(1));
        bus.emit(Sample(2));
        bus.emit(Sample(3)); // overflows the lagging subscriber's buffer
        let next = sub.recv().await;
        assert!(next.is_some());
    }
}
