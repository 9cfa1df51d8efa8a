//! The per-workflow engine runtime (spec §4.5 "Main loop"): owns the
//! multi-source fan-in, the DAG router, one [`SinkDispatcher`] per sink
//! node, the shared buffer, and the checkpoint coordinator, and drives
//! the health gate → read → validate → route → dispatch → ack cycle
//! until cancelled.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use hermod_adapter::{AdapterError, Sink};
use hermod_buffer::Producer;
use hermod_catalog::Catalog;
use hermod_core::{MessageId, NodeId, WorkflowId};
use hermod_error::EngineError;
use hermod_message::Message;
use hermod_node::{NodeEvaluator, Router};
use hermod_telemetry::{MetricsRegistry, NotificationDedup};

use crate::checkpoint::CheckpointCoordinator;
use crate::config::EngineConfig;
use crate::dispatch::{DispatchOutcome, SinkDispatcher};
use crate::multi_source::MultiSource;
use crate::schema::SchemaValidator;
use crate::status::{EngineStatus, Role, validate_transition};
use crate::trace::{RateSampler, TraceStep};

/// The metadata key a buffered message is tagged with so a sink worker
/// knows which [`SinkDispatcher`] to hand it to — the buffer is generic
/// over [`Message`] and carries no other routing side-channel.
const META_DISPATCH_SINK: &str = "_dispatch_sink_id";
/// The metadata key carrying the ack group's message id, so a sink
/// worker can find the originating [`PendingAck`] after the message has
/// been cloned once per sink.
const META_ACK_GROUP: &str = "_ack_group_id";

/// Status-change and trace callbacks the owning registry installs at
/// construction (spec §9 "a `NotifyFn` closure" breaks the
/// registry/engine reference cycle the original design would otherwise
/// need).
pub type StatusCallback = Arc<dyn Fn(WorkflowId, EngineStatus) + Send + Sync>;
/// See [`StatusCallback`].
pub type TraceCallback = Arc<dyn Fn(TraceStep) + Send + Sync>;
/// Invoked every time a message is read off the source, independent of
/// trace sampling, so the registry's idle-parking sweep (spec §4.4) has
/// a "last message arrived" timestamp to compare against even when
/// `trace_sample_rate` is zero.
pub type ActivityCallback = Arc<dyn Fn(WorkflowId) + Send + Sync>;

/// One sink node's dispatcher plus the messages still owed an ack that
/// were routed to it.
struct PendingAck {
    remaining: AtomicUsize,
    original: Message,
}

/// Everything the engine needs to run one workflow end to end.
pub struct Engine {
    workflow_id: WorkflowId,
    source: MultiSource,
    router: Router,
    evaluator: NodeEvaluator,
    dispatchers: HashMap<NodeId, Arc<SinkDispatcher>>,
    buffer: Arc<dyn Producer>,
    checkpoint: CheckpointCoordinator,
    stateful_nodes: Vec<NodeId>,
    schema: Option<SchemaValidator>,
    /// The workflow's configured DLQ sink (`policy.dlq_sink_ref`), used
    /// to dead-letter messages that never reach a sink dispatcher — e.g.
    /// a schema violation caught before routing (spec §4.5 step 3, §7
    /// "Poison message"). Distinct from a [`SinkDispatcher`]'s own `dlq`
    /// field, which dead-letters messages that *did* reach a sink but
    /// exhausted their retries there.
    dlq_sink: Option<Arc<dyn Sink>>,
    config: EngineConfig,
    metrics: Arc<MetricsRegistry>,
    sampler: RateSampler,
    dedup: NotificationDedup,
    status: Mutex<EngineStatus>,
    on_status_change: StatusCallback,
    on_trace: TraceCallback,
    on_activity: ActivityCallback,
    pending: DashMap<MessageId, Arc<PendingAck>>,
}

impl Engine {
    /// Construct an engine for one workflow. `stateful_nodes` names every
    /// `stateful`-typed node in the DAG, so the periodic checkpoint tick
    /// knows what to persist (spec §4.5 "Checkpoint & recovery"); the
    /// node evaluator itself doesn't expose a bulk listing.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workflow_id: WorkflowId,
        source: MultiSource,
        router: Router,
        evaluator: NodeEvaluator,
        dispatchers: HashMap<NodeId, Arc<SinkDispatcher>>,
        buffer: Arc<dyn Producer>,
        catalog: Arc<dyn Catalog>,
        stateful_nodes: Vec<NodeId>,
        schema: Option<SchemaValidator>,
        dlq_sink: Option<Arc<dyn Sink>>,
        config: EngineConfig,
        metrics: Arc<MetricsRegistry>,
        on_status_change: StatusCallback,
        on_trace: TraceCallback,
        on_activity: ActivityCallback,
    ) -> Self {
        let sampler = RateSampler::new(config.trace_sample_rate);
        Self {
            workflow_id,
            source,
            router,
            evaluator,
            dispatchers,
            buffer,
            checkpoint: CheckpointCoordinator::new(catalog),
            stateful_nodes,
            schema,
            dlq_sink,
            config,
            metrics,
            sampler,
            dedup: NotificationDedup::default(),
            status: Mutex::new(EngineStatus::Initialized),
            on_status_change,
            on_trace,
            on_activity,
            pending: DashMap::new(),
        }
    }

    /// Current status, for the registry's status-poll path.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        self.status.lock().clone()
    }

    fn set_status(&self, to: EngineStatus) {
        let mut guard = self.status.lock();
        if validate_transition(&guard, &to).is_ok() {
            *guard = to.clone();
            drop(guard);
            (self.on_status_change)(self.workflow_id, to);
        }
    }

    /// Close the source and every sink adapter this engine owns. Called
    /// by the registry after `run` has returned (or been aborted), so a
    /// stopped engine releases its adapter connections instead of
    /// leaking them until the process exits.
    pub async fn close_adapters(&self) {
        if let Err(err) = self.source.close().await {
            tracing::warn!(workflow_id = %self.workflow_id, %err, "error closing source adapter");
        }
        for dispatcher in self.dispatchers.values() {
            dispatcher.close().await;
        }
    }

    /// Restore every stateful node's checkpointed accumulator before the
    /// first message is read (spec §4.5 "Checkpoint & recovery").
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the catalog read fails.
    pub async fn restore(&self) -> Result<(), EngineError> {
        self.checkpoint
            .restore_nodes(self.workflow_id, self.evaluator.stateful_store())
            .await
            .map_err(|err| EngineError::AdapterIo {
                role: "checkpoint".to_string(),
                message: err.to_string(),
            })
    }

    /// Run until `cancel` fires: the health gate, then the read/route/
    /// dispatch/ack loop plus a background checkpoint ticker. Returns
    /// the terminal status reached (spec §4.5's state machine).
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> EngineStatus {
        self.set_status(EngineStatus::Connecting);
        if let Err(status) = self.health_gate(&cancel).await {
            self.set_status(status.clone());
            return status;
        }
        self.set_status(EngineStatus::Running);

        let (ack_tx, ack_rx) = mpsc::unbounded_channel::<Message>();
        let dispatch_task = tokio::spawn(self.clone().dispatch_loop(ack_tx, cancel.clone()));
        let ack_task = tokio::spawn(self.clone().ack_loop(ack_rx));
        let checkpoint_task = tokio::spawn(self.clone().checkpoint_loop(cancel.clone()));

        let outcome = self.clone().read_loop(cancel.clone()).await;

        self.buffer.close();
        cancel.cancel();
        let _ = dispatch_task.await;
        let _ = ack_task.await;
        let _ = checkpoint_task.await;
        let _ = self.final_checkpoint().await;

        let terminal = outcome.unwrap_or(EngineStatus::Stopped);
        self.set_status(terminal.clone());
        terminal
    }

    /// Ping the source and every sink, retrying per
    /// `config.reconnect_intervals` (the final entry repeating) until
    /// one succeeds or `cancel` fires.
    async fn health_gate(&self, cancel: &CancellationToken) -> Result<(), EngineStatus> {
        let mut attempt = 0usize;
        loop {
            let source_ok = self.source.ping().await;
            let sinks_ok = self.ping_sinks().await;

            match (source_ok, sinks_ok) {
                (Ok(()), Ok(())) => return Ok(()),
                (source_res, sink_res) => {
                    let role = if source_res.is_err() { Role::Source } else { Role::Sink };
                    self.set_status(EngineStatus::Reconnecting { role });
                    let reason = source_res.err().or(sink_res.err()).map_or_else(
                        || "unknown adapter failure".to_string(),
                        |e: AdapterError| e.to_string(),
                    );
                    tracing::warn!(workflow_id = %self.workflow_id, attempt, %reason, "health gate attempt failed");
                }
            }

            let delay = interval_for(&self.config.reconnect_intervals, attempt);
            tokio::select! {
                () = cancel.cancelled() => return Err(EngineStatus::Stopped),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    async fn ping_sinks(&self) -> Result<(), AdapterError> {
        for dispatcher in self.dispatchers.values() {
            dispatcher.ping().await?;
        }
        Ok(())
    }

    /// The read → (schema) validate → route → enqueue loop. Exits (with
    /// the status that should be reported) when `cancel` fires or the
    /// source yields an unrecoverable error.
    async fn read_loop(self: Arc<Self>, cancel: CancellationToken) -> Option<EngineStatus> {
        loop {
            if cancel.is_cancelled() {
                return Some(EngineStatus::Stopped);
            }

            let read = tokio::select! {
                () = cancel.cancelled() => return Some(EngineStatus::Stopped),
                read = self.source.read() => read,
            };

            let message = match read {
                Ok(Some(message)) => {
                    (self.on_activity)(self.workflow_id);
                    message
                }
                Ok(None) => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
                Err(err) => {
                    if self.health_gate(&cancel).await.is_err() {
                        return Some(EngineStatus::Stopped);
                    }
                    tracing::warn!(workflow_id = %self.workflow_id, %err, "source read recovered after reconnect");
                    self.set_status(EngineStatus::Running);
                    continue;
                }
            };

            if let Err(violation) = self.validate_schema(&message) {
                self.metrics.counter("schema_violation_total").inc();
                tracing::warn!(workflow_id = %self.workflow_id, %violation, "message failed schema validation, dead-lettering");
                self.dead_letter_unrouted(message).await;
                continue;
            }

            self.trace(&message);

            match self.router.route(&self.evaluator, self.workflow_id, message.clone()) {
                Ok(result) if result.sinks.is_empty() => {
                    if let Err(err) = self.source.ack(&message).await {
                        tracing::warn!(workflow_id = %self.workflow_id, %err, "ack failed for a message with no sink deliveries");
                    }
                }
                Ok(result) => self.enqueue_deliveries(message, result.sinks).await,
                Err(err) => {
                    tracing::error!(workflow_id = %self.workflow_id, %err, "routing failed with no error edge to catch it, stopping");
                    self.notify_error(err.to_string());
                    return Some(EngineStatus::Error { message: err.to_string() });
                }
            }
        }
    }

    fn validate_schema(&self, message: &Message) -> Result<(), crate::schema::SchemaViolation> {
        match &self.schema {
            Some(validator) => validator.validate(&message.data),
            None => Ok(()),
        }
    }

    /// Dead-letter a message that never reached the router — today only
    /// a schema violation (spec §4.5 step 3). Writes straight to the
    /// workflow's configured DLQ sink, if any, rather than a regular
    /// data sink; absent one, only the counter is incremented (spec §7
    /// "Poison message"). `prioritize_dlq` governs drain order on
    /// startup, not this path — it is not consulted here.
    async fn dead_letter_unrouted(&self, message: Message) {
        self.metrics
            .counter(&hermod_telemetry::workflow_scoped("dead_letter_count", self.workflow_id))
            .inc();
        if let Some(dlq) = &self.dlq_sink {
            if let Err(err) = dlq.write(&message).await {
                tracing::error!(workflow_id = %self.workflow_id, %err, "failed writing unrouted dead letter to DLQ sink");
            }
        }
        self.maybe_notify_dlq_threshold();
    }

    /// Register the ack group for `original`, then hand each delivery to
    /// the buffer per the configured backpressure strategy.
    async fn enqueue_deliveries(&self, original: Message, sinks: Vec<(NodeId, Message)>) {
        let Some(group_id) = original.id else {
            tracing::warn!(workflow_id = %self.workflow_id, "routed message has no id, cannot track its ack, acking immediately");
            let _ = self.source.ack(&original).await;
            return;
        };

        self.pending.insert(
            group_id,
            Arc::new(PendingAck { remaining: AtomicUsize::new(sinks.len()), original }),
        );

        for (sink_id, mut out_msg) in sinks {
            out_msg.metadata.insert(META_DISPATCH_SINK.to_string(), sink_id.to_string());
            out_msg.metadata.insert(META_ACK_GROUP.to_string(), group_id.to_string());
            self.enqueue_one(out_msg).await;
        }
    }

    async fn enqueue_one(&self, message: Message) {
        use hermod_model::BackpressureStrategy;
        match self.config.backpressure {
            BackpressureStrategy::Block | BackpressureStrategy::Spill => {
                if self.buffer.enqueue(message).await.is_err() {
                    self.metrics.counter("buffer_closed_drop_total").inc();
                }
            }
            BackpressureStrategy::Drop => {
                if self.buffer.try_enqueue(message).is_err() {
                    self.metrics.counter("backpressure_dropped_total").inc();
                }
            }
            BackpressureStrategy::Sample => {
                if RateSampler::new(self.config.sampling_rate).should_sample() {
                    if self.buffer.try_enqueue(message).is_err() {
                        self.metrics.counter("backpressure_dropped_total").inc();
                    }
                } else {
                    self.metrics.counter("backpressure_sampled_out_total").inc();
                }
            }
        }
    }

    /// Drain the buffer, dispatching each message to the sink named in
    /// its `_dispatch_sink_id` tag, and report completion on `ack_tx`
    /// once every delivery for a message's ack group has landed. Stops
    /// as soon as `cancel` fires rather than draining the backlog —
    /// graceful draining is the read loop's job (it stops producing
    /// first); this is the hard-stop half of shutdown.
    async fn dispatch_loop(self: Arc<Self>, ack_tx: mpsc::UnboundedSender<Message>, cancel: CancellationToken) {
        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => break,
                dequeued = self.buffer.dequeue() => match dequeued {
                    Some(message) => message,
                    None => break,
                },
            };
            let Some(sink_id) = message.metadata.get(META_DISPATCH_SINK).and_then(|raw| NodeId::parse(raw).ok())
            else {
                tracing::warn!(workflow_id = %self.workflow_id, "dequeued message has no dispatch target, dropping");
                continue;
            };
            let Some(dispatcher) = self.dispatchers.get(&sink_id).cloned() else {
                tracing::warn!(workflow_id = %self.workflow_id, %sink_id, "dequeued message targets an unknown sink");
                continue;
            };

            if self.config.dry_run {
                self.complete_delivery(&message, &ack_tx);
                continue;
            }

            match dispatcher.dispatch(message.clone()).await {
                Ok(DispatchOutcome::Delivered | DispatchOutcome::Duplicate) => {
                    self.complete_delivery(&message, &ack_tx);
                }
                Ok(DispatchOutcome::DeadLettered) => {
                    self.maybe_notify_dlq_threshold();
                    self.complete_delivery(&message, &ack_tx);
                }
                Err(EngineError::CircuitOpen(sink_id)) => {
                    self.set_status(EngineStatus::CircuitBreakerOpen { sink_id });
                    self.complete_delivery(&message, &ack_tx);
                }
                Err(err) => {
                    tracing::error!(workflow_id = %self.workflow_id, %err, "unexpected dispatch error, dropping message");
                    self.complete_delivery(&message, &ack_tx);
                }
            }
        }
    }

    fn complete_delivery(&self, message: &Message, ack_tx: &mpsc::UnboundedSender<Message>) {
        let Some(group_id) = message.metadata.get(META_ACK_GROUP).and_then(|raw| MessageId::parse(raw).ok()) else {
            return;
        };
        let Some(group) = self.pending.get(&group_id) else { return };
        if group.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let original = group.original.clone();
            drop(group);
            self.pending.remove(&group_id);
            let _ = ack_tx.send(original);
        }
    }

    /// Acknowledge each fully-delivered message against its originating
    /// sub-source.
    async fn ack_loop(self: Arc<Self>, mut ack_rx: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = ack_rx.recv().await {
            if let Err(err) = self.source.ack(&message).await {
                tracing::warn!(workflow_id = %self.workflow_id, %err, "ack failed after every delivery completed");
            }
        }
    }

    /// Periodically persist every stateful node's accumulator and the
    /// source's resume state (spec §4.5 "Checkpoint & recovery").
    async fn checkpoint_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(self.config.checkpoint_interval) => {}
            }
            if let Err(err) = self.checkpoint_once().await {
                tracing::warn!(workflow_id = %self.workflow_id, %err, "periodic checkpoint failed, retrying next tick");
            }
        }
    }

    async fn checkpoint_once(&self) -> Result<(), hermod_error::CatalogError> {
        for node_id in &self.stateful_nodes {
            let snapshot = self.evaluator.stateful_store().snapshot(self.workflow_id, *node_id);
            self.checkpoint.checkpoint_node(self.workflow_id, *node_id, snapshot).await?;
        }
        Ok(())
    }

    async fn final_checkpoint(&self) -> Result<(), hermod_error::CatalogError> {
        self.checkpoint_once().await
    }

    fn maybe_notify_dlq_threshold(&self) {
        let threshold = self.config.dlq_alert_threshold;
        let count = self
            .metrics
            .counter(&hermod_telemetry::workflow_scoped("dead_letter_count", self.workflow_id))
            .get();
        if threshold > 0 && count >= threshold && self.dedup.should_fire(&self.workflow_id.to_string(), "dlq_threshold", chrono::Utc::now()) {
            tracing::warn!(workflow_id = %self.workflow_id, count, threshold, "dead letter count crossed notification threshold");
        }
    }

    fn notify_error(&self, reason: String) {
        if self.dedup.should_fire(&self.workflow_id.to_string(), "error", chrono::Utc::now()) {
            tracing::error!(workflow_id = %self.workflow_id, %reason, "workflow entered error state");
        }
    }

    fn trace(&self, message: &Message) {
        if !self.sampler.should_sample() {
            return;
        }
        let Some(node_id) = message.source_node_id().and_then(|raw| NodeId::parse(raw).ok()) else {
            return;
        };
        (self.on_trace)(TraceStep {
            workflow_id: self.workflow_id,
            message_id: message.id,
            node_id,
            timestamp: chrono::Utc::now(),
            elapsed: Duration::ZERO,
            error: None,
            data: serde_json::to_value(&message.data).unwrap_or(serde_json::Value::Null),
        });
    }
}

/// The reconnect delay for `attempt` (0-indexed), per `intervals` with
/// its final entry repeating once exhausted (spec §4.5).
fn interval_for(intervals: &[Duration], attempt: usize) -> Duration {
    intervals.get(attempt).copied().or_else(|| intervals.last().copied()).unwrap_or(Duration::from_secs(1))
}
