//! Multi-source fan-in (spec §4.5): a workflow's `source` nodes each own
//! an adapter; every inbound message is tagged with its originating
//! node id so a later `ack` and the router's ingress resolution both
//! know which sub-source it came from.

use hermod_adapter::{AdapterError, Source};
use hermod_core::NodeId;
use hermod_message::Message;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One source node's adapter, keyed by the node id the router expects
/// to see in [`hermod_message::META_SOURCE_NODE_ID`].
struct SubSource {
    node_id: NodeId,
    adapter: Arc<dyn Source>,
}

/// Fans multiple source adapters into a single read/ack/ping surface.
///
/// Reads round-robin across sub-sources so one noisy source can't starve
/// the others; each returned message is tagged with the sub-source's
/// node id before being handed to the router.
pub struct MultiSource {
    subs: Vec<SubSource>,
    next: std::sync::atomic::AtomicUsize,
}

impl MultiSource {
    /// Build a fan-in over `sources`, a `(node id, adapter)` pair per
    /// `source`-typed DAG node.
    #[must_use]
    pub fn new(sources: Vec<(NodeId, Arc<dyn Source>)>) -> Self {
        Self {
            subs: sources
                .into_iter()
                .map(|(node_id, adapter)| SubSource { node_id, adapter })
                .collect(),
            next: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Poll each sub-source in round-robin order, starting from the one
    /// after the last that yielded a message; returns the first message
    /// found, tagged with its originating node id. `Ok(None)` means no
    /// sub-source currently has anything to read.
    pub async fn read(&self) -> Result<Option<Message>, AdapterError> {
        let len = self.subs.len();
        if len == 0 {
            return Ok(None);
        }
        let start = self.next.load(std::sync::atomic::Ordering::Relaxed) % len;
        for offset in 0..len {
            let idx = (start + offset) % len;
            let sub = &self.subs[idx];
            if let Some(mut message) = sub.adapter.read().await? {
                message.set_source_node_id(sub.node_id.to_string());
                self.next.store((idx + 1) % len, std::sync::atomic::Ordering::Relaxed);
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    /// Acknowledge `message` against the sub-source it was tagged with.
    /// Falls back to the first sub-source if the tag is missing or
    /// unknown (mirrors the router's own ingress fallback).
    pub async fn ack(&self, message: &Message) -> Result<(), AdapterError> {
        self.resolve(message).adapter.ack(message).await
    }

    /// Ping every sub-source; returns the first error encountered, if
    /// any (spec §4.5 "Ping returns first error").
    pub async fn ping(&self) -> Result<(), AdapterError> {
        for sub in &self.subs {
            sub.adapter.ping().await?;
        }
        Ok(())
    }

    /// Close every sub-source; returns the first error encountered, if
    /// any, after attempting to close all of them.
    pub async fn close(&self) -> Result<(), AdapterError> {
        let mut first_err = None;
        for sub in &self.subs {
            if let Err(err) = sub.adapter.close().await {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Union of every stateful sub-source's persisted state, each key
    /// namespaced by its owning node id (spec §4.5 "State is a union of
    /// per-sub-source states with the nodeId as namespace prefix").
    /// Sub-sources that don't implement [`hermod_adapter::Stateful`]
    /// contribute nothing.
    #[must_use]
    pub fn get_state(&self) -> BTreeMap<String, String> {
        let mut merged = BTreeMap::new();
        for sub in &self.subs {
            let Some(stateful) = sub.adapter.as_stateful() else { continue };
            for (key, value) in stateful.get_state() {
                merged.insert(format!("{}:{key}", sub.node_id), value);
            }
        }
        merged
    }

    /// Split a namespaced snapshot from [`MultiSource::get_state`] back
    /// out to each sub-source by its node-id prefix.
    pub fn set_state(&self, state: BTreeMap<String, String>) {
        let mut by_node: std::collections::HashMap<NodeId, BTreeMap<String, String>> =
            std::collections::HashMap::new();
        for (key, value) in state {
            let Some((prefix, rest)) = key.split_once(':') else { continue };
            let Ok(node_id) = NodeId::parse(prefix) else { continue };
            by_node.entry(node_id).or_default().insert(rest.to_string(), value);
        }
        for sub in &self.subs {
            if let Some(stateful) = sub.adapter.as_stateful() {
                if let Some(state) = by_node.remove(&sub.node_id) {
                    stateful.set_state(state);
                }
            }
        }
    }

    fn resolve(&self, message: &Message) -> &SubSource {
        message
            .source_node_id()
            .and_then(|raw| NodeId::parse(raw).ok())
            .and_then(|id| self.subs.iter().find(|sub| sub.node_id == id))
            .unwrap_or(&self.subs[0])
    }
}
