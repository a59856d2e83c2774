use std::fmt;
use std::ops::Range;
use std::path::PathBuf;
use memmap2::Mmap;
use serde::{Serialize, Deserialize};

/// Identifies one start..finish/cancel cycle. Chunks and stream signals are
/// tagged with it so leftovers of a cancelled run can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RunId(u64);

impl RunId {
    pub const fn new(id: u64) -> Self {
        RunId(id)
    }

    pub fn next(self) -> Self {
        RunId(self.0.wrapping_add(1))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run#{}", self.0)
    }
}

/// Backing storage of a chunk.
pub enum ChunkStorage {
    /// A mapped file window; only `start..end` of it belongs to the chunk.
    Mapped(Mmap),
    Owned(Vec<u8>),
}

/// A contiguous, immutable byte range of the source file.
pub struct Chunk {
    run: RunId,
    file_offset: u64,
    storage: ChunkStorage,
    start: usize,
    end: usize,
}

impl Chunk {
    /// Chunk over the first `len` bytes of a mapped window.
    pub fn mapped(run: RunId, file_offset: u64, map: Mmap, len: usize) -> Self {
        let end = len.min(map.len());
        Self {
            run,
            file_offset,
            storage: ChunkStorage::Mapped(map),
            start: 0,
            end,
        }
    }

    pub fn owned(run: RunId, file_offset: u64, bytes: Vec<u8>) -> Self {
        let end = bytes.len();
        Self {
            run,
            file_offset,
            storage: ChunkStorage::Owned(bytes),
            start: 0,
            end,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.storage {
            ChunkStorage::Mapped(map) => &map[self.start..self.end],
            ChunkStorage::Owned(bytes) => &bytes[self.start..self.end],
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    /// Absolute byte range of the chunk within the source file.
    pub fn byte_range(&self) -> Range<u64> {
        self.file_offset..self.file_offset + self.len() as u64
    }

    /// Shorten the chunk to its first `len` bytes. Used when the cut is moved
    /// back to a separator.
    pub fn truncate(&mut self, len: usize) {
        self.end = self.start + len.min(self.len());
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.storage, ChunkStorage::Mapped(_))
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("run", &self.run)
            .field("range", &self.byte_range())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

/// Bytes consumed so far against the size of the file being analysed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunProgress {
    pub processed_bytes: u64,
    pub total_bytes: u64,
}

impl RunProgress {
    /// Percentage in 0..=100; 0 when the total is unknown or empty.
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        let ratio = self.processed_bytes as f64 / self.total_bytes as f64;
        (ratio * 100.0).clamp(0.0, 100.0) as u8
    }
}

/// One line of the ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedWord {
    pub count: u64,
    pub word: String,
}

impl RankedWord {
    pub fn new<S: Into<String>>(count: u64, word: S) -> Self {
        Self { count, word: word.into() }
    }
}

/// Point-in-time view of a run: progress plus the ranking, highest count first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub progress: u8,
    pub processed_bytes: u64,
    pub total_bytes: u64,
    pub top: Vec<RankedWord>,
}

impl Snapshot {
    pub fn new(progress: RunProgress, top: Vec<RankedWord>) -> Self {
        Self {
            progress: progress.percent(),
            processed_bytes: progress.processed_bytes,
            total_bytes: progress.total_bytes,
            top,
        }
    }

    pub fn leader(&self) -> Option<&RankedWord> {
        self.top.first()
    }
}

/// Notifications delivered to whoever drives a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PulseEvent {
    Snapshot(Snapshot),
    /// A chunk was skipped; counting continues.
    AnalysisWarning(String),
    /// The run stopped and needs an explicit restart.
    Fatal(String),
    /// The reader hit end of file; the analyzer is draining what is queued.
    ReadingFinished,
    /// Every chunk of the run has been counted.
    Finished(Snapshot),
    HeadroomAvailable,
    RunningChanged(bool),
    PausedChanged(bool),
    Status(String),
}

/// Commands a session accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open(PathBuf),
    Start,
    Pause,
    Resume,
    Cancel,
}
