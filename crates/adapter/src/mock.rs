use crate::error::AdapterError;
use crate::sink::Sink;
use crate::source::Source;
use async_trait::async_trait;
use hermod_message::Message;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A script of canned results consumed in order, then cycled (index
/// wraps) so a short alternating pattern (e.g. `[Err, Ok]`) repeats
/// forever — enough to drive the reconnect-and-flicker scenario (spec
/// §8.5) where `Ping` toggles error/nil every tick.
struct Script<T> {
    steps: Vec<T>,
    next: AtomicUsize,
}

impl<T: Clone> Script<T> {
    fn new(steps: Vec<T>) -> Self {
        Self {
            steps,
            next: AtomicUsize::new(0),
        }
    }

    fn step(&self) -> Option<T> {
        if self.steps.is_empty() {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.steps.len();
        Some(self.steps[i].clone())
    }
}

/// A scriptable in-memory [`Source`] test double (spec §6 "this is the
/// adapter-boundary test double the spec's scenarios assume").
pub struct MockSource {
    reads: Script<Result<Option<Message>, MockError>>,
    pings: Script<Result<(), MockError>>,
    acked: Mutex<Vec<Message>>,
}

/// A cloneable stand-in for [`AdapterError`], which does not implement
/// `Clone` (its variants carry owned strings scripted once and replayed
/// many times).
#[derive(Debug, Clone)]
pub enum MockError {
    /// See [`AdapterError::Io`].
    Io(String),
}

impl From<MockError> for AdapterError {
    fn from(err: MockError) -> Self {
        match err {
            MockError::Io(msg) => AdapterError::Io(msg),
        }
    }
}

impl MockSource {
    /// Build a mock that always returns no message and always pings
    /// healthy, until reconfigured with [`MockSource::with_reads`] /
    /// [`MockSource::with_pings`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            reads: Script::new(vec![Ok(None)]),
            pings: Script::new(vec![Ok(())]),
            acked: Mutex::new(Vec::new()),
        }
    }

    /// Script the sequence of `read` results (cycles once exhausted).
    #[must_use]
    pub fn with_reads(mut self, reads: Vec<Result<Option<Message>, MockError>>) -> Self {
        self.reads = Script::new(reads);
        self
    }

    /// Script the sequence of `ping` results (cycles once exhausted).
    #[must_use]
    pub fn with_pings(mut self, pings: Vec<Result<(), MockError>>) -> Self {
        self.pings = Script::new(pings);
        self
    }

    /// Messages acknowledged so far, in order.
    pub fn acked(&self) -> Vec<Message> {
        self.acked.lock().expect("mock source lock poisoned").clone()
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for MockSource {
    async fn read(&self) -> Result<Option<Message>, AdapterError> {
        match self.reads.step() {
            Some(Ok(msg)) => Ok(msg),
            Some(Err(err)) => Err(err.into()),
            None => Ok(None),
        }
    }

    async fn ack(&self, message: &Message) -> Result<(), AdapterError> {
        self.acked
            .lock()
            .expect("mock source lock poisoned")
            .push(message.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<(), AdapterError> {
        match self.pings.step() {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => Err(err.into()),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// A scriptable in-memory [`Sink`] test double.
pub struct MockSink {
    writes: Script<Result<(), MockError>>,
    received: Mutex<Vec<Message>>,
}

impl MockSink {
    /// Build a mock that accepts every write.
    #[must_use]
    pub fn new() -> Self {
        Self {
            writes: Script::new(vec![Ok(())]),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Script the sequence of `write` results (cycles once exhausted).
    #[must_use]
    pub fn with_writes(mut self, writes: Vec<Result<(), MockError>>) -> Self {
        self.writes = Script::new(writes);
        self
    }

    /// Messages accepted so far, in order.
    pub fn received(&self) -> Vec<Message> {
        self.received.lock().expect("mock sink lock poisoned").clone()
    }
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for MockSink {
    async fn write(&self, message: &Message) -> Result<(), AdapterError> {
        match self.writes.step() {
            Some(Ok(())) => {
                self.received
                    .lock()
                    .expect("mock sink lock poisoned")
                    .push(message.clone());
                Ok(())
            }
            Some(Err(err)) => Err(err.into()),
            None => Ok(()),
        }
    }

    async fn ping(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_source_cycles_its_script() {
        let source = MockSource::new().with_pings(vec![
            Err(MockError::Io("down".into())),
            Ok(()),
        ]);
        assert!(source.ping().await.is_err());
        assert!(source.ping().await.is_ok());
        assert!(source.ping().await.is_err());
    }

    #[tokio::test]
    async fn mock_source_records_acks() {
        let source = MockSource::new();
        let msg = Message::default();
        source.ack(&msg).await.unwrap();
        assert_eq!(source.acked().len(), 1);
    }

    #[tokio::test]
    async fn mock_sink_records_writes_and_replays_errors() {
        let sink = MockSink::new().with_writes(vec![Ok(()), Err(MockError::Io("full".into()))]);
        let msg = Message::default();
        sink.write(&msg).await.unwrap();
        assert!(sink.write(&msg).await.is_err());
        assert_eq!(sink.received().len(), 1);
    }
}
