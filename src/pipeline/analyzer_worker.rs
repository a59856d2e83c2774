// src/pipeline/analyzer_worker.rs

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use crossbeam_channel::{never, select, tick, Receiver, Sender};
use log::{info, debug, warn, error};

use crate::analyzer::{AnalyzerState, ConsumeOutcome, FrequencyAnalyzer};
use crate::error::{panic_message, Error};
use crate::reader::DataProvider;
use crate::types::{PulseEvent, RunId};
use super::signals::{AnalyzerMessage, EventSink, ReaderMessage};

/// Thread body owning the `FrequencyAnalyzer` and its snapshot timer.
pub struct AnalyzerWorker<P: DataProvider> {
    analyzer: FrequencyAnalyzer<P>,
    inbox: Receiver<AnalyzerMessage>,
    reader: Sender<ReaderMessage>,
    events: EventSink,
    interval: Duration,
    ticker: Receiver<Instant>,
    /// Highest run id that has stopped (finished, failed or cancelled).
    settled: Arc<AtomicU64>,
    announced_running: bool,
}

impl<P: DataProvider> AnalyzerWorker<P> {
    pub fn new(
        analyzer: FrequencyAnalyzer<P>,
        inbox: Receiver<AnalyzerMessage>,
        reader: Sender<ReaderMessage>,
        events: EventSink,
        interval: Duration,
        settled: Arc<AtomicU64>,
    ) -> Self {
        Self {
            analyzer,
            inbox,
            reader,
            events,
            interval,
            ticker: never(),
            settled,
            announced_running: false,
        }
    }

    pub fn run(mut self) {
        debug!("Analyzer worker started (snapshot every {:?})", self.interval);
        loop {
            // Cloned so the select does not borrow `self` across the handlers.
            let inbox = self.inbox.clone();
            let ticker = self.ticker.clone();
            let keep_going = select! {
                recv(inbox) -> message => match message {
                    Ok(message) => self.guarded(|worker| worker.handle(message)),
                    Err(_) => false,
                },
                recv(ticker) -> _ => {
                    if let Some(snapshot) = self.analyzer.snapshot_tick() {
                        self.events.offer(PulseEvent::Snapshot(snapshot));
                    }
                    true
                },
            };
            if !keep_going {
                break;
            }
        }
        self.settle();
        debug!("Analyzer worker stopped");
    }

    fn guarded<F>(&mut self, work: F) -> bool
    where
        F: FnOnce(&mut Self) -> bool,
    {
        match panic::catch_unwind(AssertUnwindSafe(|| work(&mut *self))) {
            Ok(keep_going) => keep_going,
            Err(payload) => {
                let error = Error::worker(format!("analyzer panicked: {}", panic_message(payload.as_ref())));
                error!("{}", error);
                // The reader keeps nothing useful once counting is gone.
                let _ = self.reader.send(ReaderMessage::Cancel);
                self.analyzer.halt();
                self.stop_timer();
                self.events.emit(PulseEvent::Fatal(error.to_string()));
                self.settle();
                true
            },
        }
    }

    fn handle(&mut self, message: AnalyzerMessage) -> bool {
        match message {
            AnalyzerMessage::Start(run) => {
                self.analyzer.start_analysis(run);
                self.start_timer();
                self.announce_running(true);
                self.events.emit(PulseEvent::PausedChanged(false));
                self.events.emit(PulseEvent::Status(format!("Analysis started ({})", run)));
                self.events.offer(PulseEvent::Snapshot(self.analyzer.snapshot()));
            },
            AnalyzerMessage::Opened { total_bytes } => {
                self.analyzer.set_total_bytes(total_bytes);
            },
            AnalyzerMessage::Pause => {
                if self.analyzer.pause_analysis() {
                    self.stop_timer();
                    self.events.emit(PulseEvent::PausedChanged(true));
                    self.events.emit(PulseEvent::Status("Paused".to_string()));
                }
            },
            AnalyzerMessage::Resume => {
                if self.analyzer.resume_analysis() {
                    self.start_timer();
                    self.events.emit(PulseEvent::PausedChanged(false));
                    self.events.emit(PulseEvent::Status("Resumed".to_string()));
                }
            },
            AnalyzerMessage::Cancel => {
                let was_idle = self.analyzer.state() == AnalyzerState::Idle;
                self.settle();
                let snapshot = self.analyzer.cancel_analysis();
                self.stop_timer();
                if !was_idle {
                    self.events.emit(PulseEvent::Snapshot(snapshot));
                    self.events.emit(PulseEvent::Status("Cancelled".to_string()));
                }
            },
            AnalyzerMessage::ChunkReady(run) => {
                if self.is_current(run) {
                    self.consume_one();
                }
            },
            AnalyzerMessage::EndOfStream(run) => {
                if self.is_current(run) {
                    self.finish();
                }
            },
            AnalyzerMessage::Aborted(run) => {
                if self.is_current(run) {
                    self.analyzer.halt();
                    self.stop_timer();
                    self.settle();
                }
            },
            AnalyzerMessage::Shutdown => {
                info!("Analyzer worker shutting down");
                return false;
            },
        }
        true
    }

    fn is_current(&self, run: RunId) -> bool {
        self.analyzer.is_active() && self.analyzer.run() == run
    }

    /// Count the next chunk of the current run, skipping leftovers of older ones.
    fn consume_one(&mut self) {
        loop {
            let outcome = self.analyzer.consume_chunk();
            if outcome.released_headroom() {
                self.release_headroom();
            }
            match outcome {
                ConsumeOutcome::Stale { .. } => continue,
                ConsumeOutcome::Skipped { error, .. } => {
                    self.events.emit(PulseEvent::AnalysisWarning(error.to_string()));
                },
                ConsumeOutcome::Consumed { .. } | ConsumeOutcome::Empty => {},
            }
            break;
        }
    }

    fn finish(&mut self) {
        let report = self.analyzer.drain_remaining();
        if report.released_headroom {
            self.release_headroom();
        }
        for error in report.skipped {
            self.events.emit(PulseEvent::AnalysisWarning(error.to_string()));
        }
        if report.stale > 0 {
            warn!("Dropped {} stale chunk(s) while finishing", report.stale);
        }
        self.stop_timer();
        let snapshot = self.analyzer.snapshot();
        self.events.emit(PulseEvent::Snapshot(snapshot.clone()));
        self.events.emit(PulseEvent::Finished(snapshot));
        self.settle();
        self.events.emit(PulseEvent::Status("Analysis finished".to_string()));
    }

    fn release_headroom(&self) {
        let _ = self.reader.send(ReaderMessage::Headroom);
        self.events.offer(PulseEvent::HeadroomAvailable);
    }

    fn start_timer(&mut self) {
        self.ticker = tick(self.interval);
    }

    fn stop_timer(&mut self) {
        self.ticker = never();
    }

    /// Mark the current run as stopped for the session.
    fn settle(&mut self) {
        self.settled.fetch_max(self.analyzer.run().get(), Ordering::SeqCst);
        self.announce_running(false);
    }

    fn announce_running(&mut self, running: bool) {
        if self.announced_running != running {
            self.announced_running = running;
            self.events.emit(PulseEvent::RunningChanged(running));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded};
    use crate::config::PulseConfig;
    use crate::reader::queue::BoundedChunkQueue;
    use crate::types::Chunk;

    struct Harness {
        queue: Arc<BoundedChunkQueue>,
        worker: AnalyzerWorker<BoundedChunkQueue>,
        reader: Receiver<ReaderMessage>,
        events: Receiver<PulseEvent>,
    }

    fn harness(capacity: usize, run: RunId) -> Harness {
        let config = PulseConfig::default();
        let queue = Arc::new(BoundedChunkQueue::new(capacity));
        let mut analyzer = FrequencyAnalyzer::new(&config, queue.clone()).unwrap();
        analyzer.start_analysis(run);
        let (_inbox_tx, inbox) = unbounded();
        let (reader_tx, reader) = unbounded();
        let (event_tx, events) = bounded(64);
        let worker = AnalyzerWorker::new(
            analyzer,
            inbox,
            reader_tx,
            EventSink::new(event_tx),
            Duration::from_millis(100),
            Arc::new(AtomicU64::new(0)),
        );
        Harness { queue, worker, reader, events }
    }

    fn push(queue: &BoundedChunkQueue, run: RunId, offset: u64, text: &str) {
        queue.push(Chunk::owned(run, offset, text.as_bytes().to_vec()));
    }

    #[test]
    fn popping_from_a_full_queue_wakes_the_reader() {
        let run = RunId::new(1);
        let mut h = harness(2, run);
        push(&h.queue, run, 0, "alpha ");
        push(&h.queue, run, 6, "beta ");

        assert!(h.worker.handle(AnalyzerMessage::ChunkReady(run)));
        assert_eq!(h.reader.try_recv(), Ok(ReaderMessage::Headroom));
        assert!(h.events.try_iter().any(|e| e == PulseEvent::HeadroomAvailable));
        assert_eq!(h.queue.len(), 1);

        // 1 -> 0 does not cross the capacity, so the reader is left alone.
        assert!(h.worker.handle(AnalyzerMessage::ChunkReady(run)));
        assert!(h.reader.try_recv().is_err());
    }

    #[test]
    fn stale_chunk_releasing_headroom_still_wakes_the_reader() {
        let run = RunId::new(2);
        let mut h = harness(2, run);
        push(&h.queue, RunId::new(1), 0, "old ");
        push(&h.queue, run, 0, "new ");

        assert!(h.worker.handle(AnalyzerMessage::ChunkReady(run)));
        assert_eq!(h.reader.try_recv(), Ok(ReaderMessage::Headroom));
        assert!(h.reader.try_recv().is_err());
        assert!(h.queue.is_empty());
        assert_eq!(h.worker.analyzer.snapshot().top[0].word, "new");
    }

    #[test]
    fn draining_a_full_queue_at_the_end_wakes_the_reader() {
        let run = RunId::new(1);
        let mut h = harness(2, run);
        push(&h.queue, run, 0, "one ");
        push(&h.queue, run, 4, "two");

        assert!(h.worker.handle(AnalyzerMessage::EndOfStream(run)));
        assert_eq!(h.reader.try_recv(), Ok(ReaderMessage::Headroom));
        let finished = h.events.try_iter().find_map(|event| match event {
            PulseEvent::Finished(snapshot) => Some(snapshot),
            _ => None,
        });
        assert_eq!(finished.map(|s| s.top.len()), Some(2));
    }

    #[test]
    fn chunk_ready_for_another_run_is_ignored() {
        let run = RunId::new(3);
        let mut h = harness(1, run);
        push(&h.queue, run, 0, "kept ");

        assert!(h.worker.handle(AnalyzerMessage::ChunkReady(RunId::new(2))));
        assert!(h.reader.try_recv().is_err());
        assert_eq!(h.queue.len(), 1);
    }
}
