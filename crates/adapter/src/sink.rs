use crate::capability::{Browser, Compressible, Discoverer, Idempotent, Loggable, Sampler};
use crate::error::AdapterError;
use async_trait::async_trait;
use hermod_message::Message;

/// A sink adapter: writes messages to an external system (spec §6
/// "Sink adapter capability set").
///
/// See [`crate::Source`] for the capability-probing convention shared
/// by both adapter kinds.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Write `message`. The engine retries per the workflow's
    /// [`hermod_model::SinkPolicy`] on transient failure.
    async fn write(&self, message: &Message) -> Result<(), AdapterError>;

    /// Check connectivity without writing.
    async fn ping(&self) -> Result<(), AdapterError>;

    /// Release any held resources. No further calls are made after
    /// `close` returns.
    async fn close(&self) -> Result<(), AdapterError>;

    /// Expose [`Discoverer`] if this adapter implements it.
    fn as_discoverer(&self) -> Option<&dyn Discoverer> {
        None
    }

    /// Expose [`Sampler`] if this adapter implements it.
    fn as_sampler(&self) -> Option<&dyn Sampler> {
        None
    }

    /// Expose [`Browser`] if this adapter implements it.
    fn as_browser(&self) -> Option<&dyn Browser> {
        None
    }

    /// Expose [`Loggable`] if this adapter implements it.
    fn as_loggable(&self) -> Option<&dyn Loggable> {
        None
    }

    /// Expose [`Compressible`] if this adapter implements it.
    fn as_compressible(&self) -> Option<&dyn Compressible> {
        None
    }

    /// Expose [`Idempotent`] if this adapter implements it.
    fn as_idempotent(&self) -> Option<&dyn Idempotent> {
        None
    }
}
