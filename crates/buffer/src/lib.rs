#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Hermod Buffer
//!
//! The bounded producer that sits between a source reader and the
//! engine's dispatch loop (spec §4.7): ring (default), file, or combined.

mod combined;
mod config;
mod error;
mod file;
mod producer;
mod ring;

pub use combined::CombinedBuffer;
pub use config::{BufferType, Compression, Config};
pub use error::BufferError;
pub use file::FileBuffer;
pub use producer::Producer;
pub use ring::RingBuffer;

use std::sync::Arc;

/// Construct the [`Producer`] named by `config.buffer_type`.
///
/// # Errors
///
/// Returns [`BufferError::Io`] if a file-backed variant's directory
/// cannot be created.
pub fn build(config: &Config) -> Result<Arc<dyn Producer>, BufferError> {
    Ok(match config.buffer_type {
        BufferType::Ring => Arc::new(RingBuffer::new(config.ring_cap)),
        BufferType::File => Arc::new(FileBuffer::new(
            config.dir.clone(),
            config.file_buffer_size,
            config.compression,
        )?),
        BufferType::Combined => Arc::new(CombinedBuffer::new(
            config.ring_cap,
            config.dir.clone(),
            config.file_buffer_size,
            config.compression,
        )?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_defaults_to_a_ring_buffer() {
        let config = Config::default();
        let producer = build(&config).unwrap();
        drop(producer);
    }
}
