// src/reader/queue.rs

use std::collections::VecDeque;
use parking_lot::{Mutex, MutexGuard};
use log::{debug, trace};

use crate::types::Chunk;

/// A chunk taken off a provider, plus whether taking it brought the queue
/// back under its capacity.
#[derive(Debug)]
pub struct Popped {
    pub chunk: Chunk,
    /// The queue was at or above capacity before this pop and is below it now.
    pub released_headroom: bool,
}

/// Exclusive access to a provider's chunks. Dropping it (or calling
/// `release`) gives the lock back.
pub trait DataAccess {
    fn is_empty(&self) -> bool;

    fn pop(&mut self) -> Option<Popped>;

    fn release(self)
    where
        Self: Sized,
    {
    }
}

/// Source of chunks consumed by the analyzer.
pub trait DataProvider: Send + Sync {
    type Access<'a>: DataAccess
    where
        Self: 'a;

    fn acquire(&self) -> Self::Access<'_>;
}

/// Result of a push, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    /// Queue length after the push.
    pub len: usize,
    /// The push went over capacity (only possible if a push raced a full check).
    pub overshoot: bool,
}

/// FIFO of chunks waiting for the analyzer, bounded by `capacity`.
///
/// The lock is only held for a single push, pop, size check or clear.
pub struct BoundedChunkQueue {
    chunks: Mutex<VecDeque<Chunk>>,
    capacity: usize,
}

impl BoundedChunkQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            chunks: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.lock().is_empty()
    }

    /// The producer must not read ahead while this holds.
    pub fn is_full(&self) -> bool {
        self.chunks.lock().len() >= self.capacity
    }

    pub fn has_headroom(&self) -> bool {
        !self.is_full()
    }

    pub fn push(&self, chunk: Chunk) -> PushOutcome {
        let mut chunks = self.chunks.lock();
        chunks.push_back(chunk);
        let len = chunks.len();
        let overshoot = len > self.capacity;
        if overshoot {
            debug!("Chunk queue over capacity: {}/{}", len, self.capacity);
        }
        PushOutcome { len, overshoot }
    }

    /// Drop every queued chunk, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut chunks = self.chunks.lock();
        let dropped = chunks.len();
        chunks.clear();
        if dropped > 0 {
            trace!("Discarded {} queued chunk(s)", dropped);
        }
        dropped
    }
}

/// Locked view of a `BoundedChunkQueue`.
pub struct QueueAccess<'a> {
    chunks: MutexGuard<'a, VecDeque<Chunk>>,
    capacity: usize,
}

impl DataAccess for QueueAccess<'_> {
    fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn pop(&mut self) -> Option<Popped> {
        let before = self.chunks.len();
        let chunk = self.chunks.pop_front()?;
        Some(Popped {
            chunk,
            released_headroom: before >= self.capacity && before - 1 < self.capacity,
        })
    }
}

impl DataProvider for BoundedChunkQueue {
    type Access<'a> = QueueAccess<'a>;

    fn acquire(&self) -> QueueAccess<'_> {
        QueueAccess {
            chunks: self.chunks.lock(),
            capacity: self.capacity,
        }
    }
}
