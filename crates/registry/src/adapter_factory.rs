//! The seam between the registry and protocol-specific adapters (spec
//! §1: "the core sees each as an opaque capability set"). Postgres CDC,
//! Kafka, HTTP, SMTP, … adapters are out of scope for this core; a
//! downstream crate implements [`AdapterFactory`] to plug them in.

use async_trait::async_trait;
use hermod_adapter::{AdapterError, Sink as SinkAdapter, Source as SourceAdapter};
use hermod_model::{Sink, Source};
use std::sync::Arc;

/// Constructs the live adapter backing a catalog source/sink row.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    /// Build the adapter for `source`, using its `source_type` and
    /// `config` to select and parameterize the concrete driver.
    async fn build_source(&self, source: &Source) -> Result<Arc<dyn SourceAdapter>, AdapterError>;

    /// Build the adapter for `sink`.
    async fn build_sink(&self, sink: &Sink) -> Result<Arc<dyn SinkAdapter>, AdapterError>;
}

/// A factory returning scriptable [`hermod_adapter::mock`] doubles,
/// ignoring `source_type`/`sink_type` entirely. Used by the registry and
/// reconciler's own test suites, and by `apps/worker --catalog memory`
/// local smoke-testing, where no real protocol adapter is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockAdapterFactory;

#[async_trait]
impl AdapterFactory for MockAdapterFactory {
    async fn build_source(&self, _source: &Source) -> Result<Arc<dyn SourceAdapter>, AdapterError> {
        Ok(Arc::new(hermod_adapter::mock::MockSource::new()))
    }

    async fn build_sink(&self, _sink: &Sink) -> Result<Arc<dyn SinkAdapter>, AdapterError> {
        Ok(Arc::new(hermod_adapter::mock::MockSink::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermod_core::{SinkId, SourceId};

    #[tokio::test]
    async fn mock_factory_builds_healthy_adapters_for_any_type() {
        let factory = MockAdapterFactory;
        let source = Source::new(SourceId::v4(), "anything");
        let sink = Sink::new(SinkId::v4(), "anything");
        let source_adapter = factory.build_source(&source).await.unwrap();
        let sink_adapter = factory.build_sink(&sink).await.unwrap();
        assert!(source_adapter.ping().await.is_ok());
        assert!(sink_adapter.ping().await.is_ok());
    }
}
