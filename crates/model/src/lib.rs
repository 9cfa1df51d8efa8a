#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Hermod Model
//!
//! Record types for the Hermod data model (spec §3): workflows and their
//! DAGs, sources, sinks, workers, and the state/lease blobs the catalog
//! persists on their behalf.

mod node;
mod policy;
mod source_sink;
mod state;
mod worker;
mod workflow;

pub use node::{Edge, Node, NodeType, NodeUnitTest, LABEL_DEFAULT, LABEL_ERROR};
pub use policy::{
    BackpressureStrategy, Policy, ResourceRequest, Retention, SchemaPolicy, SinkPolicy, Tier,
};
pub use source_sink::{Sink, SinkStatus, Source};
pub use state::{Lease, NodeState};
pub use worker::Worker;
pub use workflow::{Dag, Ownership, Workflow, WorkflowStatus};
