// src/pipeline/signals.rs

use std::path::PathBuf;
use crossbeam_channel::{Sender, TrySendError};
use log::trace;

use crate::types::{PulseEvent, RunId};

/// Inbox of the reader worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderMessage {
    Open(PathBuf),
    Start(RunId),
    Pause,
    Resume,
    Cancel,
    /// The analyzer brought the queue back under capacity.
    Headroom,
    Shutdown,
}

/// Inbox of the analyzer worker. Session commands and the reader's stream
/// signals share it, so a `Start(run)` is always seen before any chunk of `run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerMessage {
    Start(RunId),
    Pause,
    Resume,
    Cancel,
    Shutdown,
    Opened { total_bytes: u64 },
    ChunkReady(RunId),
    EndOfStream(RunId),
    /// The reader stopped `run` after a fatal error.
    Aborted(RunId),
}

/// Sending half of the event stream.
#[derive(Clone)]
pub struct EventSink {
    sender: Sender<PulseEvent>,
}

impl EventSink {
    pub fn new(sender: Sender<PulseEvent>) -> Self {
        Self { sender }
    }

    /// Deliver an event the consumer must not miss, waiting for room if needed.
    /// Returns false once nobody is listening.
    pub fn emit(&self, event: PulseEvent) -> bool {
        trace!("event: {:?}", event);
        self.sender.send(event).is_ok()
    }

    /// Deliver a periodic event only if there is room right now.
    pub fn offer(&self, event: PulseEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!("event stream full, dropping a periodic event");
                false
            },
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}
