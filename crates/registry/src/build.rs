//! Assembles one workflow's [`Engine`] from its catalog rows (spec §4.4
//! `StartWorkflow` steps a-i): validate the DAG, build a sub-source
//! adapter per `source` node and a dispatcher per reachable `sink`
//! node, construct the buffer, and wire the router/evaluator/
//! checkpoint/schema machinery per the workflow's policy.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use hermod_adapter::{AdapterError, Sink as SinkAdapter, Source as SourceAdapter};
use hermod_buffer::BufferError;
use hermod_catalog::Catalog;
use hermod_core::{NodeId, SinkId, SourceId};
use hermod_engine::{
    ActivityCallback, Engine, EngineConfig, SchemaValidator, SinkDispatcher, StatusCallback,
    TraceCallback,
};
use hermod_engine::idempotency::InMemoryIdempotencyStore;
use hermod_model::{Node, NodeType, Sink, SinkPolicy, Source, Workflow};
use hermod_node::{NodeEvaluator, Router};
use hermod_resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy, Schedule};
use hermod_telemetry::MetricsRegistry;
use hermod_workflow::{ValidatedDag, ValidationError};

use crate::adapter_factory::AdapterFactory;

/// Everything that can go wrong assembling an engine, ahead of ever
/// starting it (spec §7 "Configuration" error class, surfaced
/// synchronously from `StartWorkflow`).
#[derive(Debug, Error)]
pub enum BuildError {
    /// The DAG itself is invalid (spec §8 "DAG validation").
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A `source`/`sink` node's `ref_id` does not name a row the caller
    /// supplied.
    #[error("node {node_id} references unknown {kind} {ref_id}")]
    MissingRef {
        /// The referencing node.
        node_id: NodeId,
        /// `"source"` or `"sink"`.
        kind: &'static str,
        /// The dangling reference string.
        ref_id: String,
    },
    /// A `source`/`sink` node has no `ref_id` at all.
    #[error("node {0} has no ref_id")]
    MissingRefId(NodeId),
    /// A `ref_id` is not a well-formed id.
    #[error("node {node_id} has a malformed ref_id: {ref_id}")]
    MalformedRefId {
        /// The referencing node.
        node_id: NodeId,
        /// The unparseable reference string.
        ref_id: String,
    },
    /// Constructing an adapter failed.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    /// Constructing the buffer failed.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// The product of [`build_engine`]: the engine plus the catalog rows it
/// ended up depending on, so the registry can track them for
/// `StopEngine`'s "clear dependent source/sink status if no other
/// workflow references them" step.
pub struct BuiltEngine {
    /// The assembled, not-yet-started engine.
    pub engine: Arc<Engine>,
    /// Every stateful node's id, for the registry's checkpoint ticker.
    pub stateful_nodes: Vec<NodeId>,
    /// Source ids this engine's DAG references.
    pub source_ids: Vec<SourceId>,
    /// Sink ids this engine's DAG references.
    pub sink_ids: Vec<SinkId>,
}

/// Assemble an [`Engine`] for `workflow` (spec §4.4 `StartWorkflow`
/// (a)-(i)). `sources`/`sinks` must contain every row referenced by a
/// `source`/`sink` node in the workflow's DAG; missing rows are a
/// [`BuildError::MissingRef`].
///
/// # Errors
///
/// See [`BuildError`]'s variants.
pub async fn build_engine(
    workflow: &Workflow,
    sources: &HashMap<SourceId, Source>,
    sinks: &HashMap<SinkId, Sink>,
    catalog: Arc<dyn Catalog>,
    adapters: &dyn AdapterFactory,
    metrics: Arc<MetricsRegistry>,
    buffer_config: &hermod_buffer::Config,
    on_status_change: StatusCallback,
    on_trace: TraceCallback,
    on_activity: ActivityCallback,
) -> Result<BuiltEngine, BuildError> {
    let validated = ValidatedDag::validate(workflow.dag.clone())?;
    let dag = validated.dag();

    let (multi_source, source_ids) = build_sources(dag.nodes.iter(), sources, adapters).await?;

    let dlq_sink = match &workflow.policy.dlq_sink_ref {
        Some(ref_id) => Some(resolve_sink(ref_id, sinks, adapters).await?),
        None => None,
    };

    let (dispatchers, sink_ids) = match build_sinks(
        workflow,
        dag.nodes.iter(),
        sinks,
        adapters,
        dlq_sink.clone(),
        metrics.clone(),
    )
    .await
    {
        Ok(built) => built,
        Err(err) => {
            multi_source.close().await.ok();
            return Err(err);
        }
    };

    let buffer = hermod_buffer::build(buffer_config)?;

    let schema = workflow.policy.schema.as_ref().map(SchemaValidator::new);
    let stateful_nodes: Vec<NodeId> = dag
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Stateful)
        .map(|n| n.id)
        .collect();

    let router = Router::new(&validated, metrics.clone());
    let evaluator = NodeEvaluator::new();
    let config = EngineConfig::from_policy(&workflow.policy);

    let engine = Engine::new(
        workflow.id,
        multi_source,
        router,
        evaluator,
        dispatchers,
        buffer,
        catalog,
        stateful_nodes.clone(),
        schema,
        dlq_sink,
        config,
        metrics,
        on_status_change,
        on_trace,
        on_activity,
    );

    Ok(BuiltEngine {
        engine: Arc::new(engine),
        stateful_nodes,
        source_ids,
        sink_ids,
    })
}

async fn build_sources<'a>(
    nodes: impl Iterator<Item = &'a Node>,
    sources: &HashMap<SourceId, Source>,
    adapters: &dyn AdapterFactory,
) -> Result<(hermod_engine::MultiSource, Vec<SourceId>), BuildError> {
    let mut built: Vec<(NodeId, Arc<dyn SourceAdapter>)> = Vec::new();
    let mut ids = Vec::new();

    for node in nodes.filter(|n| n.node_type == NodeType::Source) {
        match resolve_source(node, sources, adapters).await {
            Ok((id, adapter)) => {
                ids.push(id);
                built.push((node.id, adapter));
            }
            Err(err) => {
                for (_, adapter) in &built {
                    adapter.close().await.ok();
                }
                return Err(err);
            }
        }
    }

    Ok((hermod_engine::MultiSource::new(built), ids))
}

async fn resolve_source(
    node: &Node,
    sources: &HashMap<SourceId, Source>,
    adapters: &dyn AdapterFactory,
) -> Result<(SourceId, Arc<dyn SourceAdapter>), BuildError> {
    let ref_id = node.ref_id.as_ref().ok_or(BuildError::MissingRefId(node.id))?;
    let id = SourceId::parse(ref_id).map_err(|_| BuildError::MalformedRefId {
        node_id: node.id,
        ref_id: ref_id.clone(),
    })?;
    let source = sources.get(&id).ok_or_else(|| BuildError::MissingRef {
        node_id: node.id,
        kind: "source",
        ref_id: ref_id.clone(),
    })?;
    let adapter = adapters.build_source(source).await?;
    Ok((id, adapter))
}

async fn resolve_sink(
    ref_id: &str,
    sinks: &HashMap<SinkId, Sink>,
    adapters: &dyn AdapterFactory,
) -> Result<Arc<dyn SinkAdapter>, BuildError> {
    let id = SinkId::parse(ref_id).map_err(|_| BuildError::MalformedRefId {
        node_id: NodeId::nil(),
        ref_id: ref_id.to_string(),
    })?;
    let sink = sinks.get(&id).ok_or_else(|| BuildError::MissingRef {
        node_id: NodeId::nil(),
        kind: "sink",
        ref_id: ref_id.to_string(),
    })?;
    adapters.build_sink(sink).await.map_err(BuildError::from)
}

async fn build_sinks<'a>(
    workflow: &Workflow,
    nodes: impl Iterator<Item = &'a Node>,
    sinks: &HashMap<SinkId, Sink>,
    adapters: &dyn AdapterFactory,
    dlq_sink: Option<Arc<dyn SinkAdapter>>,
    metrics: Arc<MetricsRegistry>,
) -> Result<(HashMap<NodeId, Arc<SinkDispatcher>>, Vec<SinkId>), BuildError> {
    let mut dispatchers = HashMap::new();
    let mut ids = Vec::new();

    for node in nodes.filter(|n| n.node_type == NodeType::Sink) {
        let ref_id = node.ref_id.as_ref().ok_or(BuildError::MissingRefId(node.id))?;
        let id = SinkId::parse(ref_id).map_err(|_| BuildError::MalformedRefId {
            node_id: node.id,
            ref_id: ref_id.clone(),
        })?;
        let sink = sinks.get(&id).ok_or_else(|| BuildError::MissingRef {
            node_id: node.id,
            kind: "sink",
            ref_id: ref_id.clone(),
        })?;
        let adapter = adapters.build_sink(sink).await?;
        ids.push(id);

        let policy = workflow
            .policy
            .sink_policies
            .get(&node.id.to_string())
            .cloned()
            .unwrap_or_default();

        let idempotency = sink_wants_idempotency(&policy)
            .then(|| Arc::new(InMemoryIdempotencyStore::new(std::time::Duration::from_secs(3600))) as Arc<dyn hermod_engine::idempotency::IdempotencyStore>);

        let dispatcher = SinkDispatcher::new(
            workflow.id,
            node.id,
            adapter,
            CircuitBreaker::new(
                id.to_string(),
                CircuitBreakerConfig {
                    threshold: policy.circuit_breaker_threshold,
                    interval: std::time::Duration::from_millis(policy.circuit_breaker_interval_ms),
                    cool_off: std::time::Duration::from_millis(policy.circuit_breaker_cooldown_ms),
                },
            ),
            retry_policy(&policy),
            dlq_sink.clone(),
            idempotency,
            metrics.clone(),
        );
        dispatchers.insert(node.id, Arc::new(dispatcher));
    }

    Ok((dispatchers, ids))
}

/// Sinks configured with an explicit retry schedule get it verbatim;
/// otherwise exponential backoff capped at 30s, matching
/// `RetryPolicy::default`'s schedule shape (spec §4.5 "exponential
/// schedule (or explicit `retry_intervals` list)").
fn retry_policy(policy: &SinkPolicy) -> RetryPolicy {
    let schedule = if policy.retry_intervals_ms.is_empty() {
        Schedule::Exponential {
            base: std::time::Duration::from_millis(100),
            max: std::time::Duration::from_secs(30),
        }
    } else {
        Schedule::Intervals(
            policy
                .retry_intervals_ms
                .iter()
                .map(|ms| std::time::Duration::from_millis(*ms))
                .collect(),
        )
    };
    RetryPolicy {
        max_retries: policy.max_retries,
        schedule,
    }
}

/// A sink opts into idempotency by configuring a spill path... no —
/// there is no explicit policy flag for this in spec §3's `SinkPolicy`;
/// idempotency is driven by the sink adapter's own
/// [`hermod_adapter::Idempotent`] capability once wired to a real
/// adapter. The in-memory store is attached unconditionally here so the
/// claim-before-send path (spec §4.8) is always exercised against the
/// mock/test adapters this core ships; a real `Idempotent` adapter
/// overrides it via `set_idempotency_store` at the protocol-adapter
/// layer (out of this core's scope).
fn sink_wants_idempotency(_policy: &SinkPolicy) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter_factory::MockAdapterFactory;
    use hermod_catalog::InMemoryCatalog;
    use hermod_core::{EdgeId, WorkflowId};
    use hermod_model::{Dag, Edge};

    fn linear_workflow() -> (Workflow, HashMap<SourceId, Source>, HashMap<SinkId, Sink>) {
        let source = Source::new(SourceId::v4(), "mock");
        let sink = Sink::new(SinkId::v4(), "mock");
        let source_node = Node::new(NodeId::v4(), NodeType::Source).with_ref(source.id.to_string());
        let sink_node = Node::new(NodeId::v4(), NodeType::Sink).with_ref(sink.id.to_string());

        let mut wf = Workflow::new(WorkflowId::v4(), "wf");
        wf.dag = Dag {
            nodes: vec![source_node.clone(), sink_node.clone()],
            edges: vec![Edge::new(EdgeId::v4(), source_node.id, sink_node.id)],
        };

        let mut sources = HashMap::new();
        sources.insert(source.id, source);
        let mut sinks = HashMap::new();
        sinks.insert(sink.id, sink);
        (wf, sources, sinks)
    }

    fn noop() -> (StatusCallback, TraceCallback, ActivityCallback) {
        (Arc::new(|_, _| {}), Arc::new(|_| {}), Arc::new(|_| {}))
    }

    #[tokio::test]
    async fn builds_an_engine_for_a_valid_linear_workflow() {
        let (wf, sources, sinks) = linear_workflow();
        let catalog: Arc<dyn Catalog> = Arc::new(InMemoryCatalog::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let (on_status, on_trace, on_activity) = noop();

        let built = build_engine(
            &wf,
            &sources,
            &sinks,
            catalog,
            &MockAdapterFactory,
            metrics,
            &hermod_buffer::Config::default(),
            on_status,
            on_trace,
            on_activity,
        )
        .await
        .unwrap();

        assert_eq!(built.source_ids.len(), 1);
        assert_eq!(built.sink_ids.len(), 1);
        assert!(built.stateful_nodes.is_empty());
    }

    #[tokio::test]
    async fn missing_source_ref_fails_with_a_named_node() {
        let (wf, _sources, sinks) = linear_workflow();
        let catalog: Arc<dyn Catalog> = Arc::new(InMemoryCatalog::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let (on_status, on_trace, on_activity) = noop();

        let err = build_engine(
            &wf,
            &HashMap::new(),
            &sinks,
            catalog,
            &MockAdapterFactory,
            metrics,
            &hermod_buffer::Config::default(),
            on_status,
            on_trace,
            on_activity,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BuildError::MissingRef { kind: "source", .. }));
    }

    #[tokio::test]
    async fn invalid_dag_fails_before_touching_any_adapter() {
        let (mut wf, sources, sinks) = linear_workflow();
        wf.dag.edges.clear(); // now the sink node is unreachable
        let catalog: Arc<dyn Catalog> = Arc::new(InMemoryCatalog::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let (on_status, on_trace, on_activity) = noop();

        let err = build_engine(
            &wf,
            &sources,
            &sinks,
            catalog,
            &MockAdapterFactory,
            metrics,
            &hermod_buffer::Config::default(),
            on_status,
            on_trace,
            on_activity,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BuildError::Validation(_)));
    }
}
