//! Per-sink dispatch: retry schedule, circuit breaker, idempotent writes,
//! and the dead-letter path once retries are exhausted (spec §4.5, §7
//! "Poison message").

use crate::idempotency::{IdempotencyKey, IdempotencyStore};
use hermod_adapter::{AdapterError, Sink};
use hermod_core::{NodeId, WorkflowId};
use hermod_error::EngineError;
use hermod_message::Message;
use hermod_resilience::{BreakerOpen, CircuitBreaker, RetryPolicy};
use hermod_telemetry::MetricsRegistry;
use std::sync::Arc;

/// What happened to one message handed to [`SinkDispatcher::dispatch`].
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Written successfully.
    Delivered,
    /// Retries exhausted; written to the DLQ sink (or, absent one,
    /// counted and dropped).
    DeadLettered,
    /// Skipped: an idempotency claim for this message already exists.
    Duplicate,
}

/// Wraps one sink adapter with its retry schedule, circuit breaker, and
/// idempotency checks (spec §4.5 "per-sink worker pool").
pub struct SinkDispatcher {
    workflow_id: WorkflowId,
    node_id: NodeId,
    sink: Arc<dyn Sink>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    dlq: Option<Arc<dyn Sink>>,
    idempotency: Option<Arc<dyn IdempotencyStore>>,
    metrics: Arc<MetricsRegistry>,
}

impl SinkDispatcher {
    /// Construct a dispatcher for one sink node.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        node_id: NodeId,
        sink: Arc<dyn Sink>,
        breaker: CircuitBreaker,
        retry: RetryPolicy,
        dlq: Option<Arc<dyn Sink>>,
        idempotency: Option<Arc<dyn IdempotencyStore>>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self { workflow_id, node_id, sink, breaker, retry, dlq, idempotency, metrics }
    }

    /// The circuit breaker guarding this sink, for the engine's status
    /// machine to poll after a failed write.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Check connectivity of the wrapped sink, for the engine's health
    /// gate (spec §4.5).
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] if the sink is unreachable.
    pub async fn ping(&self) -> Result<(), AdapterError> {
        self.sink.ping().await
    }

    /// Write `message`, retrying per `self.retry` on transient failure,
    /// up to the circuit breaker's own rejection. Dead-letters the
    /// message once retries are exhausted rather than blocking this
    /// sink's lane forever on one poison message.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CircuitOpen`] if the breaker is open
    /// before any attempt is made — the caller treats this as a signal
    /// to surface `circuit_breaker_open:<sink>` rather than retry
    /// locally.
    pub async fn dispatch(&self, message: Message) -> Result<DispatchOutcome, EngineError> {
        if let Err(BreakerOpen { sink_id }) = self.breaker.check() {
            return Err(EngineError::CircuitOpen(sink_id));
        }

        if let Some(store) = &self.idempotency {
            if let Some(message_id) = message.id {
                let key = IdempotencyKey::generate(self.workflow_id, self.node_id, message_id);
                if !store.claim(&key).await {
                    self.metrics.counter("sink_duplicate_skipped_total").inc();
                    return Ok(DispatchOutcome::Duplicate);
                }
            }
        }

        let mut attempt = 0usize;
        loop {
            match self.sink.write(&message).await {
                Ok(()) => {
                    self.breaker.record_success();
                    if let (Some(store), Some(message_id)) = (&self.idempotency, message.id) {
                        let key = IdempotencyKey::generate(self.workflow_id, self.node_id, message_id);
                        store.mark_sent(&key).await;
                    }
                    return Ok(DispatchOutcome::Delivered);
                }
                Err(err) => {
                    let opened = self.breaker.record_failure();
                    if opened {
                        tracing::warn!(node_id = %self.node_id, "circuit breaker opened after repeated write failures");
                    }
                    if self.retry.exhausted(attempt) {
                        return self.dead_letter(message, &err).await;
                    }
                    tracing::warn!(node_id = %self.node_id, %err, attempt, "sink write failed, retrying");
                    tokio::time::sleep(self.retry.schedule.delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Close the wrapped sink (and DLQ sink, if any), for the registry's
    /// `StopEngine` teardown once the engine's run loop has exited.
    pub async fn close(&self) {
        if let Err(err) = self.sink.close().await {
            tracing::warn!(node_id = %self.node_id, %err, "error closing sink adapter");
        }
        if let Some(dlq) = &self.dlq {
            if let Err(err) = dlq.close().await {
                tracing::warn!(node_id = %self.node_id, %err, "error closing DLQ sink adapter");
            }
        }
    }

    async fn dead_letter(
        &self,
        message: Message,
        cause: &AdapterError,
    ) -> Result<DispatchOutcome, EngineError> {
        // Scoped per workflow (spec §3/§7 "a per-workflow `dlq_count`
        // counter") since `metrics` is one registry shared by every
        // engine/dispatcher the registry builds.
        self.metrics
            .counter(&hermod_telemetry::workflow_scoped("dead_letter_count", self.workflow_id))
            .inc();
        tracing::error!(node_id = %self.node_id, %cause, "retries exhausted, dead-lettering message");
        if let Some(dlq) = &self.dlq {
            if let Err(dlq_err) = dlq.write(&message).await {
                tracing::error!(node_id = %self.node_id, %dlq_err, "failed writing to DLQ sink too");
            }
        }
        Ok(DispatchOutcome::DeadLettered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermod_adapter::mock::{MockError, MockSink};
    use hermod_message::Operation;
    use hermod_resilience::{CircuitBreakerConfig, Schedule};
    use std::time::Duration;

    fn dispatcher(sink: Arc<dyn Sink>, dlq: Option<Arc<dyn Sink>>) -> SinkDispatcher {
        SinkDispatcher::new(
            WorkflowId::v4(),
            NodeId::v4(),
            sink,
            CircuitBreaker::new("sink-1", CircuitBreakerConfig { threshold: 2, ..CircuitBreakerConfig::default() }),
            RetryPolicy { max_retries: 1, schedule: Schedule::Intervals(vec![Duration::from_millis(1)]) },
            dlq,
            None,
            Arc::new(MetricsRegistry::new()),
        )
    }

    fn msg() -> Message {
        Message::new(Operation::Create, "public", "orders")
    }

    #[tokio::test]
    async fn a_healthy_sink_delivers_on_the_first_attempt() {
        let sink: Arc<dyn Sink> = Arc::new(MockSink::new());
        let d = dispatcher(sink, None);
        assert_eq!(d.dispatch(msg()).await.unwrap(), DispatchOutcome::Delivered);
    }

    #[tokio::test]
    async fn exhausted_retries_dead_letter_to_the_configured_dlq() {
        let sink: Arc<dyn Sink> = Arc::new(
            MockSink::new().with_writes(vec![Err(MockError::Io("down".into())), Err(MockError::Io("down".into()))]),
        );
        let dlq = Arc::new(MockSink::new());
        let d = dispatcher(sink, Some(dlq.clone()));
        let outcome = d.dispatch(msg()).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::DeadLettered);
        assert_eq!(dlq.received().len(), 1);
    }

    #[tokio::test]
    async fn breaker_open_rejects_before_attempting_a_write() {
        let sink: Arc<dyn Sink> = Arc::new(
            MockSink::new().with_writes(vec![
                Err(MockError::Io("down".into())),
                Err(MockError::Io("down".into())),
            ]),
        );
        let d = dispatcher(sink, None);
        // threshold is 2: the first dispatch exhausts its one retry (two
        // failed attempts), opening the breaker.
        let _ = d.dispatch(msg()).await.unwrap();
        let err = d.dispatch(msg()).await.unwrap_err();
        assert!(matches!(err, EngineError::CircuitOpen(_)));
    }
}
