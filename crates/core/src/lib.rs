#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Hermod Core
//!
//! Shared, dependency-light foundations for the Hermod workflow engine:
//! strongly-typed identifiers and the canonical dynamic [`Value`] used at
//! the engine boundary (spec §3, §9).

mod id;
mod value;

pub use id::{
    EdgeId, MessageId, NodeId, SinkId, SourceId, UuidParseError, WorkerId, WorkflowId,
};
pub use value::{PathError, Value};
