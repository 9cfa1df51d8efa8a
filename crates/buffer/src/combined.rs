//! Ring buffer that spills to disk once full (spec §4.7).

use crate::config::Compression;
use crate::error::BufferError;
use crate::file::FileBuffer;
use crate::producer::Producer;
use crate::ring::RingBuffer;
use async_trait::async_trait;
use hermod_message::Message;
use std::path::PathBuf;
use std::time::Duration;

/// A ring buffer backed by a [`FileBuffer`] overflow: `enqueue` tries the
/// ring first and only pays the serialization cost of spilling once the
/// ring is full. `dequeue` drains the ring ahead of the spill, so the
/// spill acts purely as overflow capacity, never as a second queue with
/// its own ordering.
pub struct CombinedBuffer {
    ring: RingBuffer,
    spill: FileBuffer,
}

impl CombinedBuffer {
    /// Construct a combined buffer with `ring_cap` in-memory slots and a
    /// disk-backed overflow rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Io`] if `dir` cannot be created.
    pub fn new(
        ring_cap: usize,
        dir: impl Into<PathBuf>,
        page_bytes: usize,
        compression: Compression,
    ) -> Result<Self, BufferError> {
        Ok(Self {
            ring: RingBuffer::new(ring_cap),
            spill: FileBuffer::new(dir, page_bytes, compression)?,
        })
    }
}

#[async_trait]
impl Producer for CombinedBuffer {
    async fn enqueue(&self, msg: Message) -> Result<(), BufferError> {
        match self.ring.offer(msg) {
            Ok(()) => Ok(()),
            Err(msg) => {
                tracing::debug!("ring buffer full, spilling to disk");
                self.spill.enqueue(msg).await
            }
        }
    }

    fn try_enqueue(&self, msg: Message) -> Result<(), BufferError> {
        match self.ring.offer(msg) {
            Ok(()) => Ok(()),
            Err(msg) => self.spill.try_enqueue(msg),
        }
    }

    async fn dequeue(&self) -> Option<Message> {
        loop {
            if let Some(msg) = self.ring.try_dequeue() {
                return Some(msg);
            }
            if let Some(msg) = self.spill.try_dequeue() {
                return Some(msg);
            }
            if self.is_closed() {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn close(&self) {
        self.ring.close();
        self.spill.close();
    }
}

impl CombinedBuffer {
    fn is_closed(&self) -> bool {
        self.spill.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermod_message::Operation;

    #[tokio::test]
    async fn fits_entirely_in_the_ring_when_under_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let buf = CombinedBuffer::new(4, dir.path(), 1024, Compression::None).unwrap();
        buf.enqueue(Message::new(Operation::Create, "public", "a"))
            .await
            .unwrap();
        let msg = buf.dequeue().await.unwrap();
        assert_eq!(msg.table, "a");
    }

    #[tokio::test]
    async fn spills_to_disk_once_the_ring_is_full() {
        let dir = tempfile::tempdir().unwrap();
        let buf = CombinedBuffer::new(1, dir.path(), 1, Compression::None).unwrap();
        buf.enqueue(Message::new(Operation::Create, "public", "a"))
            .await
            .unwrap();
        buf.enqueue(Message::new(Operation::Update, "public", "b"))
            .await
            .unwrap();
        let first = buf.dequeue().await.unwrap();
        let second = buf.dequeue().await.unwrap();
        assert_eq!(first.table, "a");
        assert_eq!(second.table, "b");
    }
}
