//! Unique identifiers for Hermod entities.
//!
//! Strongly-typed UUID identifiers built on [`domain-key`](https://crates.io/crates/domain-key)
//! `Uuid<D>` wrappers. Each identifier type is parameterized by a unique
//! domain marker, so the compiler rejects mixing e.g. a `WorkflowId` where
//! a `SourceId` is expected.
//!
//! All ID types are `Copy` (16 bytes, stack-allocated) and support `v4()`,
//! `nil()`, `parse(&str)`, full serde support, `Display`, `FromStr`, `Eq`,
//! `Ord`, `Hash`.

use domain_key::define_uuid;

pub use domain_key::UuidParseError;

define_uuid!(WorkflowIdDomain => WorkflowId);
define_uuid!(NodeIdDomain => NodeId);
define_uuid!(EdgeIdDomain => EdgeId);
define_uuid!(SourceIdDomain => SourceId);
define_uuid!(SinkIdDomain => SinkId);
define_uuid!(WorkerIdDomain => WorkerId);
define_uuid!(MessageIdDomain => MessageId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_id_v4_is_non_nil() {
        assert!(!WorkflowId::v4().is_nil());
    }

    #[test]
    fn different_id_types_are_incompatible_at_the_type_level() {
        fn accepts_workflow(_id: WorkflowId) {}
        fn accepts_node(_id: NodeId) {}
        accepts_workflow(WorkflowId::v4());
        accepts_node(NodeId::v4());
        // accepts_workflow(NodeId::v4()); // would not compile
    }

    #[test]
    fn id_parse_roundtrips() {
        let id = WorkerId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn id_parse_invalid_errors() {
        assert!(SourceId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn id_serde_roundtrip() {
        let id = SinkId::v4();
        let json = serde_json::to_string(&id).unwrap();
        let back: SinkId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn id_ordering_is_consistent() {
        let a = NodeId::nil();
        let b = NodeId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert!(a < b);
    }
}
