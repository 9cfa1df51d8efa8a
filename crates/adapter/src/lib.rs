#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Hermod Adapter
//!
//! Source and sink adapter traits (spec §6 "Source/sink adapter
//! capability sets"), the optional-capability probing convention shared
//! by both (`as_stateful`, `as_discoverer`, … returning `Option<&dyn
//! Trait>` rather than a `dyn Any` downcast), and [`mock`]'s in-memory
//! test doubles.
//!
//! This crate only defines the seam; concrete adapters (Postgres CDC,
//! Kafka, S3, …) are out of scope (spec Non-goals) and live in
//! downstream crates that depend on this one.

pub mod capability;
pub mod error;
pub mod mock;
mod sink;
mod source;

pub use capability::{
    Browser, Compressible, CompressorKind, Discoverer, Idempotent, Loggable, ReadyChecker, Sampler,
    Snapshottable, Stateful,
};
pub use error::AdapterError;
pub use sink::Sink;
pub use source::Source;
