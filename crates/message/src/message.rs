//! The engine-internal unit of work (spec §3).

use hermod_core::{MessageId, Value};
use std::collections::BTreeMap;

/// The reserved metadata key carrying the ingress node id through
/// multi-source fan-in (spec §3, §4.6 "Stateful aggregation" and the
/// router's unknown-source-node-id fallback).
pub const META_SOURCE_NODE_ID: &str = "_source_node_id";

/// The kind of change a message represents (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// A new row/record was created.
    Create,
    /// An existing row/record was changed.
    Update,
    /// A row/record was removed.
    Delete,
    /// A row/record was read (e.g. a full-table snapshot scan).
    Read,
}

/// Engine-internal unit of work (spec §3).
///
/// Every [`Clone`] is a deep copy — `before`/`after` byte buffers and the
/// parsed `data` tree are all owned. Reuse across messages happens at the
/// allocation level via [`MessagePool`], not by sharing message contents.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Engine-unique id, assigned at ingress.
    pub id: Option<MessageId>,
    /// The kind of change this message represents.
    pub operation: Option<Operation>,
    /// Logical stream origin, e.g. a table or topic name.
    pub table: String,
    /// Logical namespace for `table`, e.g. a schema or database name.
    pub schema: String,
    /// Raw pre-change payload, if the source adapter provides one.
    pub before: Vec<u8>,
    /// Raw post-change payload.
    pub after: Vec<u8>,
    /// Parsed payload, keyed by field name.
    pub data: Value,
    /// Free-form string metadata; see [`META_SOURCE_NODE_ID`].
    pub metadata: BTreeMap<String, String>,
}

impl Message {
    /// Construct a message for the given source table/schema.
    #[must_use]
    pub fn new(operation: Operation, schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            id: Some(MessageId::v4()),
            operation: Some(operation),
            table: table.into(),
            schema: schema.into(),
            before: Vec::new(),
            after: Vec::new(),
            data: Value::Null,
            metadata: BTreeMap::new(),
        }
    }

    /// The ingress node id recorded in `metadata`, if any (spec §4.6).
    #[must_use]
    pub fn source_node_id(&self) -> Option<&str> {
        self.metadata.get(META_SOURCE_NODE_ID).map(String::as_str)
    }

    /// Record the ingress node id in `metadata`.
    pub fn set_source_node_id(&mut self, node_id: impl Into<String>) {
        self.metadata
            .insert(META_SOURCE_NODE_ID.to_string(), node_id.into());
    }

    /// Clear all fields in place, preserving allocated capacity, so the
    /// message can be handed back into a [`MessagePool`] for reuse.
    pub(crate) fn reset(&mut self) {
        self.id = None;
        self.operation = None;
        self.table.clear();
        self.schema.clear();
        self.before.clear();
        self.after.clear();
        self.data = Value::Null;
        self.metadata.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_has_a_fresh_id() {
        let msg = Message::new(Operation::Create, "public", "orders");
        assert!(msg.id.is_some());
        assert_eq!(msg.operation, Some(Operation::Create));
    }

    #[test]
    fn source_node_id_roundtrips() {
        let mut msg = Message::new(Operation::Update, "public", "orders");
        assert!(msg.source_node_id().is_none());
        msg.set_source_node_id("node-1");
        assert_eq!(msg.source_node_id(), Some("node-1"));
    }

    #[test]
    fn clone_is_a_deep_copy() {
        let mut msg = Message::new(Operation::Create, "public", "orders");
        msg.after = vec![1, 2, 3];
        let mut cloned = msg.clone();
        cloned.after.push(4);
        assert_eq!(msg.after, vec![1, 2, 3]);
        assert_eq!(cloned.after, vec![1, 2, 3, 4]);
    }

    #[test]
    fn reset_clears_but_keeps_the_message_usable() {
        let mut msg = Message::new(Operation::Delete, "public", "orders");
        msg.set_source_node_id("node-1");
        msg.after = vec![9; 64];
        msg.reset();
        assert!(msg.id.is_none());
        assert!(msg.after.is_empty());
        assert!(msg.metadata.is_empty());
    }
}
