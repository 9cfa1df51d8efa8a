//! Directory-backed buffer: one file per page (spec §4.7).

use crate::config::Compression;
use crate::error::BufferError;
use crate::producer::Producer;
use async_trait::async_trait;
use hermod_message::Message;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

struct Page {
    path: PathBuf,
    messages: VecDeque<Message>,
}

/// A directory-backed buffer. Each page is a newline-delimited JSON file
/// under `dir`, optionally compressed; pages roll over once they exceed
/// roughly `page_bytes` of serialized message data and are deleted once
/// fully consumed.
pub struct FileBuffer {
    dir: PathBuf,
    page_bytes: usize,
    compression: Compression,
    next_page_id: AtomicU64,
    state: Mutex<State>,
    notify: Notify,
    closed: std::sync::atomic::AtomicBool,
}

struct State {
    write_buf: Vec<u8>,
    write_page: Option<PathBuf>,
    pending: VecDeque<Page>,
}

impl FileBuffer {
    /// Construct a file buffer rooted at `dir`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Io`] if `dir` cannot be created.
    pub fn new(dir: impl Into<PathBuf>, page_bytes: usize, compression: Compression) -> Result<Self, BufferError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            page_bytes: page_bytes.max(1),
            compression,
            next_page_id: AtomicU64::new(0),
            state: Mutex::new(State {
                write_buf: Vec::new(),
                write_page: None,
                pending: VecDeque::new(),
            }),
            notify: Notify::new(),
            closed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    fn page_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("page-{id:020}.bin"))
    }

    fn encode(&self, msg: &Message) -> Result<Vec<u8>, BufferError> {
        let mut line = serde_json::to_vec(msg)?;
        line.push(b'\n');
        Ok(line)
    }

    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self.compression {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut encoder =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Compression::Zstd => zstd::encode_all(data, 0),
            Compression::Snappy => {
                let mut writer = snap::write::FrameEncoder::new(Vec::new());
                writer.write_all(data)?;
                writer
                    .into_inner()
                    .map_err(|e| std::io::Error::other(e.to_string()))
            }
        }
    }

    fn decompress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self.compression {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut decoder = flate2::read::GzDecoder::new(data);
                let mut out = Vec::new();
                decoder.read_to_end(&mut out)?;
                Ok(out)
            }
            Compression::Zstd => zstd::decode_all(data),
            Compression::Snappy => {
                let mut reader = snap::read::FrameDecoder::new(data);
                let mut out = Vec::new();
                reader.read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }

    fn flush_locked(&self, state: &mut State) -> Result<(), BufferError> {
        let Some(path) = state.write_page.take() else {
            return Ok(());
        };
        let compressed = self.compress(&state.write_buf)?;
        std::fs::write(&path, compressed)?;
        state.write_buf.clear();
        Ok(())
    }

    fn load_page(&self, path: &Path) -> Result<VecDeque<Message>, BufferError> {
        let raw = std::fs::read(path)?;
        let data = self.decompress(&raw)?;
        let mut messages = VecDeque::new();
        for line in data.split(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }
            messages.push_back(serde_json::from_slice(line)?);
        }
        Ok(messages)
    }

    /// One non-blocking attempt to pop a message: `Some(Some(_))` is a hit,
    /// `Some(None)` means try again (a page rolled), `None` means nothing
    /// is available right now.
    fn try_step(&self) -> Option<Option<Message>> {
        let mut state = self.state.lock().expect("file buffer mutex poisoned");
        if let Some(front) = state.pending.front_mut() {
            if let Some(msg) = front.messages.pop_front() {
                if front.messages.is_empty() {
                    let page = state.pending.pop_front().unwrap();
                    let _ = std::fs::remove_file(&page.path);
                }
                return Some(Some(msg));
            }
            state.pending.pop_front();
        }
        if state.write_page.is_some() && !state.write_buf.is_empty() {
            self.flush_locked(&mut state).ok()?;
            if let Ok(entries) = std::fs::read_dir(&self.dir) {
                let mut paths: Vec<PathBuf> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .collect();
                paths.sort();
                for path in paths {
                    if let Ok(messages) = self.load_page(&path) {
                        state.pending.push_back(Page { path, messages });
                    }
                }
            }
            return Some(None);
        }
        None
    }

    /// Remove and return the next message without waiting; `None` if
    /// nothing is currently on disk.
    pub fn try_dequeue(&self) -> Option<Message> {
        loop {
            match self.try_step() {
                Some(Some(msg)) => return Some(msg),
                Some(None) => continue,
                None => return None,
            }
        }
    }

    /// `true` once [`Producer::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Producer for FileBuffer {
    async fn enqueue(&self, msg: Message) -> Result<(), BufferError> {
        self.try_enqueue(msg)?;
        self.notify.notify_one();
        Ok(())
    }

    fn try_enqueue(&self, msg: Message) -> Result<(), BufferError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BufferError::Closed);
        }
        let encoded = self.encode(&msg)?;
        let mut state = self.state.lock().expect("file buffer mutex poisoned");
        if state.write_page.is_none() {
            let id = self.next_page_id.fetch_add(1, Ordering::Relaxed);
            state.write_page = Some(self.page_path(id));
        }
        state.write_buf.extend_from_slice(&encoded);
        if state.write_buf.len() >= self.page_bytes {
            self.flush_locked(&mut state)?;
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Option<Message> {
        loop {
            match self.try_step() {
                Some(Some(msg)) => return Some(msg),
                Some(None) => continue,
                None if self.closed.load(Ordering::Acquire) => return None,
                None => self.notify.notified().await,
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}
