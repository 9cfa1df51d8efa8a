use crate::capability::{Discoverer, ReadyChecker, Sampler, Snapshottable, Stateful};
use crate::error::AdapterError;
use crate::Loggable;
use async_trait::async_trait;
use hermod_message::Message;

/// A source adapter: reads messages from an external system and
/// acknowledges delivery once downstream has durably accepted them
/// (spec §6 "Source adapter capability set").
///
/// Optional capabilities ([`Stateful`], [`Discoverer`], [`Sampler`],
/// [`ReadyChecker`], [`Snapshottable`], [`Loggable`]) are probed through
/// the `as_*` accessor methods below rather than downcasting a trait
/// object — an adapter that implements one overrides the matching
/// accessor to return `Some(self)`.
#[async_trait]
pub trait Source: Send + Sync {
    /// Read the next message, or `Ok(None)` if none is currently
    /// available (a non-blocking poll, not an error).
    async fn read(&self) -> Result<Option<Message>, AdapterError>;

    /// Acknowledge that `message` has been durably handed off
    /// downstream (committing an offset, releasing a lock, …).
    async fn ack(&self, message: &Message) -> Result<(), AdapterError>;

    /// Check connectivity without reading. The engine's status machine
    /// uses repeated `ping` failures to decide `reconnecting:source`
    /// (spec §4.5).
    async fn ping(&self) -> Result<(), AdapterError>;

    /// Release any held resources. No further calls are made after
    /// `close` returns.
    async fn close(&self) -> Result<(), AdapterError>;

    /// Expose [`Stateful`] if this adapter implements it.
    fn as_stateful(&self) -> Option<&dyn Stateful> {
        None
    }

    /// Expose [`Discoverer`] if this adapter implements it.
    fn as_discoverer(&self) -> Option<&dyn Discoverer> {
        None
    }

    /// Expose [`Sampler`] if this adapter implements it.
    fn as_sampler(&self) -> Option<&dyn Sampler> {
        None
    }

    /// Expose [`ReadyChecker`] if this adapter implements it.
    fn as_ready_checker(&self) -> Option<&dyn ReadyChecker> {
        None
    }

    /// Expose [`Snapshottable`] if this adapter implements it.
    fn as_snapshottable(&self) -> Option<&dyn Snapshottable> {
        None
    }

    /// Expose [`Loggable`] if this adapter implements it.
    fn as_loggable(&self) -> Option<&dyn Loggable> {
        None
    }
}
