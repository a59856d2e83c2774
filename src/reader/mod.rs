// src/reader/mod.rs

pub mod queue;
pub mod window;

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{info, debug, warn, error, trace};

use crate::config::{PulseConfig, ReadMode, SeparatorSet};
use crate::error::{Error, Result};
use crate::types::RunId;
use self::queue::BoundedChunkQueue;
use self::window::{cut_window, WindowSource};

pub use self::queue::{DataAccess, DataProvider, Popped, PushOutcome, QueueAccess};

/// What a call to `ChunkProducer::produce_next` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProduceOutcome {
    /// A chunk covering `range` was queued; `queued` is the queue length after the push.
    Produced { range: Range<u64>, queued: usize },
    /// The queue is at capacity; nothing was read.
    QueueFull,
    /// The whole file has been queued; the run is over for the reader.
    EndOfStream,
    /// Not running, or paused.
    Inactive,
}

/// Reads a file as a stream of separator-aligned chunks into a bounded queue.
pub struct ChunkProducer {
    chunk_size: usize,
    separators: SeparatorSet,
    read_mode: ReadMode,
    queue: Arc<BoundedChunkQueue>,
    path: Option<PathBuf>,
    source: Option<WindowSource>,
    /// Next byte of the file to read.
    cursor: u64,
    run: RunId,
    running: bool,
    paused: bool,
    chunks_produced: u64,
}

impl ChunkProducer {
    pub fn new(config: &PulseConfig, queue: Arc<BoundedChunkQueue>) -> Self {
        Self {
            chunk_size: config.chunk_size_bytes.max(1),
            separators: config.separator_set(),
            read_mode: config.read_mode,
            queue,
            path: None,
            source: None,
            cursor: 0,
            run: RunId::default(),
            running: false,
            paused: false,
            chunks_produced: 0,
        }
    }

    /// Open `path` for reading and return its size. An active run is
    /// cancelled first.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<u64> {
        if self.running {
            info!("Opening a new file while {} is active; cancelling it", self.run);
            self.cancel();
        }
        self.source = None;
        self.path = Some(path.as_ref().to_path_buf());

        let source = WindowSource::open(&path, self.read_mode)?;
        let size = source.size();
        info!("Opened {:?} for reading ({} bytes)", source.path(), size);
        self.source = Some(source);
        self.cursor = 0;
        Ok(size)
    }

    /// Begin a run from the start of the opened file, returning the file size.
    ///
    /// A closed file (after a cancel or a finished run) is reopened from the
    /// remembered path.
    pub fn start(&mut self, run: RunId) -> Result<u64> {
        if self.running {
            debug!("Restarting reader: {} replaced by {}", self.run, run);
            self.cancel();
        }

        if self.source.is_none() {
            let path = self.path.clone()
                .ok_or_else(|| Error::worker("start requested before a file was opened"))?;
            self.open(path)?;
        }
        let size = self.total_bytes();

        self.queue.clear();
        self.cursor = 0;
        self.chunks_produced = 0;
        self.run = run;
        self.running = true;
        self.paused = false;
        info!("Reading started for {} ({} bytes)", run, size);
        Ok(size)
    }

    /// Queue the next chunk if the queue has room.
    ///
    /// Any read or mapping failure stops the run; the caller reports it as fatal.
    pub fn produce_next(&mut self) -> Result<ProduceOutcome> {
        if !self.running || self.paused {
            trace!("produce_next while inactive (running={}, paused={})", self.running, self.paused);
            return Ok(ProduceOutcome::Inactive);
        }

        if self.queue.is_full() {
            trace!("Chunk queue full ({}), deferring read", self.queue.capacity());
            return Ok(ProduceOutcome::QueueFull);
        }

        let total = self.total_bytes();
        if self.cursor >= total {
            self.running = false;
            self.source = None;
            info!("File reading completed for {} (EOF reached after {} chunks)",
                self.run, self.chunks_produced);
            return Ok(ProduceOutcome::EndOfStream);
        }

        let remaining = total - self.cursor;
        let window_len = (self.chunk_size as u64).min(remaining) as usize;
        let reaches_eof = window_len as u64 == remaining;

        let run = self.run;
        let cursor = self.cursor;
        let read = match self.source.as_mut() {
            Some(source) => source.read_window(run, cursor, window_len),
            None => Err(Error::worker("reader is running without an open file")),
        };
        let mut chunk = match read {
            Ok(chunk) => chunk,
            Err(e) => {
                error!("Reading window at {} failed: {}", cursor, e);
                self.abort();
                return Err(e);
            }
        };

        let cut = cut_window(chunk.as_bytes(), &self.separators, reaches_eof);
        if cut.may_split_token {
            warn!("No separator in {} bytes at offset {}; a token may be split", window_len, cursor);
        }
        chunk.truncate(cut.len);
        let range = chunk.byte_range();
        self.cursor += cut.len as u64;

        let pushed = self.queue.push(chunk);
        self.chunks_produced += 1;
        debug!("Queued chunk {:?} ({} in queue)", range, pushed.len);

        Ok(ProduceOutcome::Produced { range, queued: pushed.len })
    }

    /// Stop self-scheduling reads. Returns whether the state changed.
    pub fn pause(&mut self) -> bool {
        if !self.running || self.paused {
            return false;
        }
        self.paused = true;
        info!("Reading paused at byte {}", self.cursor);
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.running || !self.paused {
            return false;
        }
        self.paused = false;
        info!("Reading resumed at byte {}", self.cursor);
        true
    }

    /// Stop the run, drop queued chunks and close the file. Idempotent.
    pub fn cancel(&mut self) {
        let dropped = self.queue.clear();
        if self.running || self.source.is_some() {
            info!("Reading cancelled for {} ({} queued chunk(s) dropped)", self.run, dropped);
        }
        self.running = false;
        self.paused = false;
        self.source = None;
        self.cursor = 0;
    }

    /// Stop after a failure; the run cannot continue without a new start.
    pub fn abort(&mut self) {
        self.running = false;
        self.paused = false;
        self.source = None;
    }

    pub fn can_produce(&self) -> bool {
        self.running && !self.paused && self.queue.has_headroom()
    }

    /// Running and unpaused, but held back by a full queue.
    pub fn is_waiting_for_headroom(&self) -> bool {
        self.running && !self.paused && self.queue.is_full()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn total_bytes(&self) -> u64 {
        self.source.as_ref().map(WindowSource::size).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config(chunk_size: usize, queue: usize) -> PulseConfig {
        PulseConfig {
            chunk_size_bytes: chunk_size,
            max_chunks_in_mem_num: queue,
            ..PulseConfig::default()
        }
    }

    fn file_with(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn drain_text(queue: &BoundedChunkQueue) -> Vec<String> {
        let mut access = queue.acquire();
        let mut out = Vec::new();
        while let Some(popped) = access.pop() {
            out.push(String::from_utf8(popped.chunk.as_bytes().to_vec()).unwrap());
        }
        out
    }

    #[test]
    fn chunks_end_on_separators() {
        let file = file_with("hello world hello");
        let cfg = config(8, 16);
        let queue = Arc::new(BoundedChunkQueue::new(cfg.max_chunks_in_mem_num));
        let mut producer = ChunkProducer::new(&cfg, queue.clone());
        producer.open(file.path()).unwrap();
        producer.start(RunId::new(1)).unwrap();

        loop {
            match producer.produce_next().unwrap() {
                ProduceOutcome::Produced { .. } => continue,
                ProduceOutcome::EndOfStream => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(!producer.is_running());
        assert_eq!(drain_text(&queue), vec!["hello ", "world ", "hello"]);
    }

    #[test]
    fn word_longer_than_a_window_is_published_whole() {
        let file = file_with("abcdefghij kl");
        let cfg = config(4, 16);
        let queue = Arc::new(BoundedChunkQueue::new(cfg.max_chunks_in_mem_num));
        let mut producer = ChunkProducer::new(&cfg, queue.clone());
        producer.open(file.path()).unwrap();
        producer.start(RunId::new(1)).unwrap();

        while let ProduceOutcome::Produced { .. } = producer.produce_next().unwrap() {}
        assert_eq!(drain_text(&queue), vec!["abcd", "efgh", "ij ", "kl"]);
    }

    #[test]
    fn full_queue_defers_reading() {
        let file = file_with("a b c d e f g h ");
        let cfg = config(2, 2);
        let queue = Arc::new(BoundedChunkQueue::new(cfg.max_chunks_in_mem_num));
        let mut producer = ChunkProducer::new(&cfg, queue.clone());
        producer.open(file.path()).unwrap();
        producer.start(RunId::new(1)).unwrap();

        assert!(matches!(producer.produce_next().unwrap(), ProduceOutcome::Produced { queued: 1, .. }));
        assert!(matches!(producer.produce_next().unwrap(), ProduceOutcome::Produced { queued: 2, .. }));
        assert_eq!(producer.produce_next().unwrap(), ProduceOutcome::QueueFull);
        assert!(producer.is_waiting_for_headroom());
        assert_eq!(producer.cursor(), 4);

        queue.acquire().pop().unwrap();
        assert!(producer.can_produce());
        assert!(matches!(producer.produce_next().unwrap(), ProduceOutcome::Produced { .. }));
    }

    #[test]
    fn paused_producer_does_not_read() {
        let file = file_with("one two three ");
        let cfg = config(4, 8);
        let queue = Arc::new(BoundedChunkQueue::new(cfg.max_chunks_in_mem_num));
        let mut producer = ChunkProducer::new(&cfg, queue.clone());
        producer.open(file.path()).unwrap();
        producer.start(RunId::new(1)).unwrap();
        producer.produce_next().unwrap();

        assert!(producer.pause());
        assert!(!producer.pause());
        assert_eq!(producer.produce_next().unwrap(), ProduceOutcome::Inactive);
        assert_eq!(queue.len(), 1);

        assert!(producer.resume());
        assert!(matches!(producer.produce_next().unwrap(), ProduceOutcome::Produced { .. }));
    }

    #[test]
    fn cancel_clears_queue_and_restart_reopens() {
        let file = file_with("alpha beta gamma ");
        let cfg = config(6, 8);
        let queue = Arc::new(BoundedChunkQueue::new(cfg.max_chunks_in_mem_num));
        let mut producer = ChunkProducer::new(&cfg, queue.clone());
        producer.open(file.path()).unwrap();
        producer.start(RunId::new(1)).unwrap();
        producer.produce_next().unwrap();
        producer.produce_next().unwrap();

        producer.cancel();
        producer.cancel();
        assert!(queue.is_empty());
        assert!(!producer.is_running());
        assert_eq!(producer.total_bytes(), 0);

        assert_eq!(producer.start(RunId::new(2)).unwrap(), 17);
        match producer.produce_next().unwrap() {
            ProduceOutcome::Produced { range, .. } => assert_eq!(range, 0..6),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(queue.acquire().pop().unwrap().chunk.run(), RunId::new(2));
    }

    #[test]
    fn empty_file_ends_immediately() {
        let file = file_with("");
        let cfg = config(16, 4);
        let queue = Arc::new(BoundedChunkQueue::new(cfg.max_chunks_in_mem_num));
        let mut producer = ChunkProducer::new(&cfg, queue.clone());
        assert_eq!(producer.open(file.path()).unwrap(), 0);
        producer.start(RunId::new(1)).unwrap();
        assert_eq!(producer.produce_next().unwrap(), ProduceOutcome::EndOfStream);
        assert!(queue.is_empty());
    }

    #[test]
    fn start_without_open_fails() {
        let cfg = config(16, 4);
        let mut producer = ChunkProducer::new(&cfg, Arc::new(BoundedChunkQueue::new(4)));
        assert!(producer.start(RunId::new(1)).is_err());
        assert!(!producer.is_running());
    }

    #[test]
    fn open_failure_is_reported() {
        let cfg = config(16, 4);
        let mut producer = ChunkProducer::new(&cfg, Arc::new(BoundedChunkQueue::new(4)));
        assert!(matches!(producer.open("/no/such/input.txt"), Err(Error::Open { .. })));
        assert!(!producer.is_running());
    }
}
