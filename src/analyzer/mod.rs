// src/analyzer/mod.rs

pub mod ranking;

use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use ahash::AHashMap;
use log::{info, debug, warn, trace};

use crate::config::PulseConfig;
use crate::error::{panic_message, Error, Result};
use crate::parser::{PatternTokenizer, TextTokenizer};
use crate::reader::{DataAccess, DataProvider, Popped};
use crate::types::{Chunk, RunId, RunProgress, Snapshot};

pub use self::ranking::FrequencyTable;

/// Lifecycle of the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerState {
    Idle,
    Running,
    Paused,
    Finished,
}

/// What a call to `FrequencyAnalyzer::consume_chunk` did.
#[derive(Debug)]
pub enum ConsumeOutcome {
    /// Nothing to take: the queue is empty or no run is active.
    Empty,
    Consumed { bytes: usize, tokens: u64, released_headroom: bool },
    /// The chunk could not be processed and was dropped; earlier counts stand.
    Skipped { bytes: usize, released_headroom: bool, error: Error },
    /// The chunk belonged to an earlier run and was discarded.
    Stale { released_headroom: bool },
}

impl ConsumeOutcome {
    pub fn released_headroom(&self) -> bool {
        match self {
            ConsumeOutcome::Empty => false,
            ConsumeOutcome::Consumed { released_headroom, .. }
            | ConsumeOutcome::Skipped { released_headroom, .. }
            | ConsumeOutcome::Stale { released_headroom } => *released_headroom,
        }
    }
}

/// Summary of a final drain.
#[derive(Debug, Default)]
pub struct DrainReport {
    pub consumed: usize,
    pub stale: usize,
    /// Non-fatal errors of skipped chunks, in order.
    pub skipped: Vec<Error>,
    pub released_headroom: bool,
}

/// Turns a stream of chunks into word counts and a live ranking.
///
/// All counting state is owned here; the provider is only touched for the
/// duration of a single pop.
pub struct FrequencyAnalyzer<P: DataProvider> {
    provider: Arc<P>,
    tokenizer: Box<dyn TextTokenizer>,
    table: FrequencyTable,
    progress: RunProgress,
    state: AnalyzerState,
    run: RunId,
    strict_utf8: bool,
    chunks_consumed: u64,
}

impl<P: DataProvider> FrequencyAnalyzer<P> {
    pub fn new(config: &PulseConfig, provider: Arc<P>) -> Result<Self> {
        let tokenizer = PatternTokenizer::from_config(config)?;
        Ok(Self::with_tokenizer(config, provider, Box::new(tokenizer)))
    }

    pub fn with_tokenizer(
        config: &PulseConfig,
        provider: Arc<P>,
        tokenizer: Box<dyn TextTokenizer>,
    ) -> Self {
        debug!("Analyzer initialised (top_n={}, strict_utf8={})", config.top_n, config.strict_utf8);
        Self {
            provider,
            tokenizer,
            table: FrequencyTable::new(config.top_n),
            progress: RunProgress::default(),
            state: AnalyzerState::Idle,
            run: RunId::default(),
            strict_utf8: config.strict_utf8,
            chunks_consumed: 0,
        }
    }

    /// Reset counts and progress and begin accepting chunks of `run`.
    pub fn start_analysis(&mut self, run: RunId) {
        info!("Analysis started for {}", run);
        self.table.clear();
        self.progress.processed_bytes = 0;
        self.chunks_consumed = 0;
        self.run = run;
        self.state = AnalyzerState::Running;
    }

    pub fn set_total_bytes(&mut self, total_bytes: u64) {
        self.progress.total_bytes = total_bytes;
    }

    /// Take one chunk from the provider and count it.
    pub fn consume_chunk(&mut self) -> ConsumeOutcome {
        if !self.is_active() {
            return ConsumeOutcome::Empty;
        }

        let popped = {
            let mut access = self.provider.acquire();
            let popped = if access.is_empty() { None } else { access.pop() };
            access.release();
            popped
        };
        let Some(Popped { chunk, released_headroom }) = popped else {
            return ConsumeOutcome::Empty;
        };

        if chunk.run() != self.run {
            trace!("Discarding {:?} left over from an earlier run", chunk);
            return ConsumeOutcome::Stale { released_headroom };
        }

        let bytes = chunk.len();
        // Skipped chunks still count towards progress so a run can reach 100%.
        self.progress.processed_bytes += bytes as u64;

        let tallied = panic::catch_unwind(AssertUnwindSafe(|| self.tally_chunk(&chunk)))
            .unwrap_or_else(|payload| Err(Error::analysis(format!(
                "panic while tokenizing {:?}: {}", chunk.byte_range(), panic_message(payload.as_ref())
            ))));

        match tallied {
            Ok(tally) => {
                let mut tokens = 0;
                for (word, occurrences) in tally {
                    self.table.record_many(&word, occurrences);
                    tokens += occurrences;
                }
                self.chunks_consumed += 1;
                trace!("Counted {} tokens in {:?}", tokens, chunk.byte_range());
                ConsumeOutcome::Consumed { bytes, tokens, released_headroom }
            },
            Err(error) => {
                warn!("Skipping chunk {:?}: {}", chunk.byte_range(), error);
                ConsumeOutcome::Skipped { bytes, released_headroom, error }
            },
        }
    }

    /// Decode and tokenize a chunk without touching the counting state, so a
    /// failure leaves no partial effects behind.
    fn tally_chunk(&self, chunk: &Chunk) -> Result<AHashMap<String, u64>> {
        let text = self.decode(chunk)?;
        let mut tally: AHashMap<String, u64> = AHashMap::new();
        self.tokenizer.for_each_token(&text, &mut |token| {
            if let Some(count) = tally.get_mut(token) {
                *count += 1;
            } else {
                tally.insert(token.to_owned(), 1);
            }
        });
        Ok(tally)
    }

    fn decode<'c>(&self, chunk: &'c Chunk) -> Result<Cow<'c, str>> {
        let bytes = chunk.as_bytes();
        if self.strict_utf8 {
            std::str::from_utf8(bytes).map(Cow::Borrowed).map_err(|e| Error::decode(format!(
                "chunk {:?} is not valid UTF-8: {}", chunk.byte_range(), e
            )))
        } else {
            Ok(String::from_utf8_lossy(bytes))
        }
    }

    /// Current progress and ranking. Never changes counting state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.progress, self.table.top())
    }

    /// Snapshot for a timer tick; `None` while the timer is stopped.
    pub fn snapshot_tick(&self) -> Option<Snapshot> {
        if self.timer_active() {
            Some(self.snapshot())
        } else {
            None
        }
    }

    /// Stop the snapshot timer. Chunks keep being consumed.
    pub fn pause_analysis(&mut self) -> bool {
        if self.state != AnalyzerState::Running {
            return false;
        }
        info!("Analysis paused");
        self.state = AnalyzerState::Paused;
        true
    }

    pub fn resume_analysis(&mut self) -> bool {
        if self.state != AnalyzerState::Paused {
            return false;
        }
        info!("Analysis resumed");
        self.state = AnalyzerState::Running;
        true
    }

    /// Drop all counts and return the zero-state snapshot.
    pub fn cancel_analysis(&mut self) -> Snapshot {
        if self.state != AnalyzerState::Idle {
            info!("Analysis cancelled for {}", self.run);
        }
        self.state = AnalyzerState::Idle;
        self.table.clear();
        self.progress.processed_bytes = 0;
        self.chunks_consumed = 0;
        self.snapshot()
    }

    /// Count everything still queued, then mark the run finished.
    pub fn drain_remaining(&mut self) -> DrainReport {
        let mut report = DrainReport::default();
        if !self.is_active() {
            return report;
        }

        loop {
            let outcome = self.consume_chunk();
            report.released_headroom |= outcome.released_headroom();
            match outcome {
                ConsumeOutcome::Empty => break,
                ConsumeOutcome::Consumed { .. } => report.consumed += 1,
                ConsumeOutcome::Stale { .. } => report.stale += 1,
                ConsumeOutcome::Skipped { error, .. } => report.skipped.push(error),
            }
        }

        self.state = AnalyzerState::Finished;
        info!("Analysis finished for {}: {} tokens, {} distinct, {} chunk(s) in final drain",
            self.run, self.table.total_tokens(), self.table.distinct_words(), report.consumed);
        report
    }

    /// Stop after the reader failed. Counts so far are kept but the run is over.
    pub fn halt(&mut self) -> Snapshot {
        if self.is_active() {
            warn!("Analysis halted for {} after a reader failure", self.run);
            self.state = AnalyzerState::Finished;
        }
        self.snapshot()
    }

    /// Chunks of the current run are being accepted.
    pub fn is_active(&self) -> bool {
        matches!(self.state, AnalyzerState::Running | AnalyzerState::Paused)
    }

    pub fn timer_active(&self) -> bool {
        self.state == AnalyzerState::Running
    }

    pub fn state(&self) -> AnalyzerState {
        self.state
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn progress(&self) -> RunProgress {
        self.progress
    }

    pub fn table(&self) -> &FrequencyTable {
        &self.table
    }

    pub fn chunks_consumed(&self) -> u64 {
        self.chunks_consumed
    }
}
