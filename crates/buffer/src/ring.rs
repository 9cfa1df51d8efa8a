//! Bounded FIFO in-memory buffer (spec §4.7, the default variant).

use crate::error::BufferError;
use crate::producer::Producer;
use async_trait::async_trait;
use hermod_message::Message;
use tokio::sync::Mutex;
use tokio::sync::mpsc;

/// A bounded, in-memory ring buffer. `enqueue` suspends the caller when
/// full; `try_enqueue` fails immediately instead.
pub struct RingBuffer {
    sender: mpsc::Sender<Message>,
    receiver: Mutex<mpsc::Receiver<Message>>,
}

impl RingBuffer {
    /// Construct a ring buffer holding at most `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Remove and return the next message without waiting; `None` if the
    /// ring is currently empty or another caller holds the receiver.
    pub fn try_dequeue(&self) -> Option<Message> {
        self.receiver.try_lock().ok()?.try_recv().ok()
    }

    /// Like [`Producer::try_enqueue`], but hands the message back on
    /// failure instead of dropping it, so a full-ring caller can fall
    /// back to spilling it elsewhere.
    pub fn offer(&self, msg: Message) -> Result<(), Message> {
        self.sender.try_send(msg).map_err(|err| match err {
            mpsc::error::TrySendError::Full(msg) | mpsc::error::TrySendError::Closed(msg) => msg,
        })
    }
}

#[async_trait]
impl Producer for RingBuffer {
    async fn enqueue(&self, msg: Message) -> Result<(), BufferError> {
        self.sender.send(msg).await.map_err(|_| BufferError::Closed)
    }

    fn try_enqueue(&self, msg: Message) -> Result<(), BufferError> {
        self.sender.try_send(msg).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => BufferError::Full,
            mpsc::error::TrySendError::Closed(_) => BufferError::Closed,
        })
    }

    async fn dequeue(&self) -> Option<Message> {
        self.receiver.lock().await.recv().await
    }

    fn close(&self) {
        // `mpsc::Sender` closes once every clone is dropped; callers stop
        // enqueuing and `dequeue` drains the remaining backlog to `None`.
    }
}
