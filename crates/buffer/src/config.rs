//! Buffer selection via environment (spec §6 "Environment variables").

use std::path::PathBuf;

/// Which [`Producer`](crate::Producer) implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferType {
    /// Bounded FIFO in memory (default).
    Ring,
    /// Directory-backed, one file per page.
    File,
    /// Ring buffer that spills to disk once full.
    Combined,
}

impl Default for BufferType {
    fn default() -> Self {
        Self::Ring
    }
}

/// Spilled-page compression (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// No compression.
    None,
    /// `flate2`/gzip.
    Gzip,
    /// `zstd`.
    Zstd,
    /// `snap`/Snappy.
    Snappy,
}

impl Default for Compression {
    fn default() -> Self {
        Self::None
    }
}

/// Resolved buffer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which producer implementation to use.
    pub buffer_type: BufferType,
    /// Ring buffer capacity, in messages.
    pub ring_cap: usize,
    /// Directory for file-backed pages.
    pub dir: PathBuf,
    /// Approximate bytes per page file before rolling to a new one.
    pub file_buffer_size: usize,
    /// Compression applied to spilled/file pages.
    pub compression: Compression,
}

impl Config {
    /// Read `HERMOD_BUFFER_TYPE`, `HERMOD_BUFFER_RING_CAP`,
    /// `HERMOD_BUFFER_DIR`, `HERMOD_FILEBUFFER_SIZE`,
    /// `HERMOD_BUFFER_COMPRESSION` from the process environment, falling
    /// back to defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            buffer_type: std::env::var("HERMOD_BUFFER_TYPE")
                .ok()
                .and_then(|v| parse_buffer_type(&v))
                .unwrap_or_default(),
            ring_cap: std::env::var("HERMOD_BUFFER_RING_CAP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            dir: std::env::var("HERMOD_BUFFER_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/hermod-buffer")),
            file_buffer_size: std::env::var("HERMOD_FILEBUFFER_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8 * 1024 * 1024),
            compression: std::env::var("HERMOD_BUFFER_COMPRESSION")
                .ok()
                .and_then(|v| parse_compression(&v))
                .unwrap_or_default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_type: BufferType::default(),
            ring_cap: 1000,
            dir: PathBuf::from("/tmp/hermod-buffer"),
            file_buffer_size: 8 * 1024 * 1024,
            compression: Compression::default(),
        }
    }
}

fn parse_buffer_type(v: &str) -> Option<BufferType> {
    match v {
        "ring" => Some(BufferType::Ring),
        "file" => Some(BufferType::File),
        "combined" => Some(BufferType::Combined),
        _ => None,
    }
}

fn parse_compression(v: &str) -> Option<Compression> {
    match v {
        "none" => Some(Compression::None),
        "gzip" => Some(Compression::Gzip),
        "zstd" => Some(Compression::Zstd),
        "snappy" => Some(Compression::Snappy),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_ring_uncompressed() {
        let config = Config::default();
        assert_eq!(config.buffer_type, BufferType::Ring);
        assert_eq!(config.compression, Compression::None);
    }

    #[test]
    fn unknown_env_values_fall_back_to_default() {
        assert_eq!(parse_buffer_type("bogus"), None);
        assert_eq!(parse_compression("bogus"), None);
    }

    #[test]
    fn recognizes_every_documented_variant() {
        assert_eq!(parse_buffer_type("file"), Some(BufferType::File));
        assert_eq!(parse_buffer_type("combined"), Some(BufferType::Combined));
        assert_eq!(parse_compression("zstd"), Some(Compression::Zstd));
        assert_eq!(parse_compression("snappy"), Some(Compression::Snappy));
    }
}
