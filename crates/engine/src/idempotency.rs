//! Pluggable idempotency stores for sink dispatch (spec §4.8).
//!
//! A sink that implements [`hermod_adapter::Idempotent`] is configured
//! with a key template; the dispatcher derives a key per message and
//! `Claim`s it before writing. Unlike node evaluation's in-process
//! dedup (a local seen-set is enough there), sink writes must survive a
//! worker crash mid-send, so the store is a trait — the in-memory
//! implementation here is a reference, not the only legal backend.

use async_trait::async_trait;
use hermod_core::{MessageId, NodeId, WorkflowId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// A deterministic key identifying one (sink node, message) send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Generate a key from the sink node and message being dispatched.
    #[must_use]
    pub fn generate(workflow_id: WorkflowId, sink_node_id: NodeId, message_id: MessageId) -> Self {
        Self(format!("{workflow_id}:{sink_node_id}:{message_id}"))
    }

    /// The underlying key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Claim-before-send dedup for sink writes (spec §4.8).
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Attempt to claim `key`. Returns `true` if this is the first (or
    /// first-since-expiry) claim and the caller should proceed with the
    /// write; `false` if another attempt already holds an unexpired
    /// claim and this send should be skipped as a duplicate.
    async fn claim(&self, key: &IdempotencyKey) -> bool;

    /// Record that the write for `key` completed. Stores that
    /// distinguish "claimed" from "confirmed sent" (to reclaim a key
    /// whose owner crashed between claim and send) use this to promote
    /// the entry; the in-memory store treats a successful claim as
    /// sufficient and this is a no-op.
    async fn mark_sent(&self, key: &IdempotencyKey);
}

/// In-memory [`IdempotencyStore`] with a fixed TTL per claim, swept
/// lazily on access rather than by a background task (spec §4.8 "TTL
/// cleanup").
pub struct InMemoryIdempotencyStore {
    ttl: Duration,
    claims: Mutex<HashMap<String, Instant>>,
}

impl InMemoryIdempotencyStore {
    /// Construct a store whose claims expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, claims: Mutex::new(HashMap::new()) }
    }

    /// Drop every expired claim; returns how many were swept. Safe to
    /// call from a periodic maintenance tick.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut claims = self.claims.lock();
        let before = claims.len();
        claims.retain(|_, claimed_at| now.duration_since(*claimed_at) < self.ttl);
        before - claims.len()
    }

    /// Number of live (possibly stale-but-unswept) claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.lock().len()
    }

    /// `true` if no claims are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.lock().is_empty()
    }
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 3600))
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn claim(&self, key: &IdempotencyKey) -> bool {
        let now = Instant::now();
        let mut claims = self.claims.lock();
        match claims.get(key.as_str()) {
            Some(claimed_at) if now.duration_since(*claimed_at) < self.ttl => false,
            _ => {
                claims.insert(key.as_str().to_owned(), now);
                true
            }
        }
    }

    async fn mark_sent(&self, _key: &IdempotencyKey) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> IdempotencyKey {
        IdempotencyKey::generate(WorkflowId::v4(), NodeId::v4(), MessageId::v4())
    }

    #[test]
    fn generate_is_deterministic() {
        let workflow = WorkflowId::v4();
        let node = NodeId::v4();
        let message = MessageId::v4();
        assert_eq!(
            IdempotencyKey::generate(workflow, node, message),
            IdempotencyKey::generate(workflow, node, message)
        );
    }

    #[tokio::test]
    async fn first_claim_succeeds_second_is_a_duplicate() {
        let store = InMemoryIdempotencyStore::default();
        let key = key();
        assert!(store.claim(&key).await);
        assert!(!store.claim(&key).await);
    }

    #[tokio::test]
    async fn expired_claims_can_be_reclaimed() {
        let store = InMemoryIdempotencyStore::new(Duration::from_millis(10));
        let key = key();
        assert!(store.claim(&key).await);
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(store.claim(&key).await);
    }

    #[tokio::test]
    async fn sweep_expired_drops_only_stale_entries() {
        let store = InMemoryIdempotencyStore::new(Duration::from_millis(10));
        store.claim(&key()).await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(store.sweep_expired(), 1);
        assert!(store.is_empty());
    }
}
