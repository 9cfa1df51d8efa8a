#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Hermod Message
//!
//! The engine-internal unit of work (spec §3) and the pool that recycles
//! its allocations as messages flow from source to sinks.

mod message;
mod pool;

pub use message::{Message, Operation, META_SOURCE_NODE_ID};
pub use pool::{MessagePool, PooledMessage};
