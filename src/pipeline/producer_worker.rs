// src/pipeline/producer_worker.rs

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use crossbeam_channel::{select, Receiver, Sender, TryRecvError};
use log::{info, debug, warn, error};

use crate::error::{panic_message, Error};
use crate::reader::{ChunkProducer, ProduceOutcome};
use crate::types::{PulseEvent, RunId};
use super::signals::{AnalyzerMessage, EventSink, ReaderMessage};

/// How long a reader held back by a full queue waits before checking again.
const HEADROOM_RETRY: Duration = Duration::from_millis(50);

/// Thread body owning the `ChunkProducer`.
pub struct ProducerWorker {
    producer: ChunkProducer,
    inbox: Receiver<ReaderMessage>,
    analyzer: Sender<AnalyzerMessage>,
    events: EventSink,
    headroom_retry: Duration,
}

impl ProducerWorker {
    pub fn new(
        producer: ChunkProducer,
        inbox: Receiver<ReaderMessage>,
        analyzer: Sender<AnalyzerMessage>,
        events: EventSink,
    ) -> Self {
        Self { producer, inbox, analyzer, events, headroom_retry: HEADROOM_RETRY }
    }

    pub fn run(mut self) {
        debug!("Reader worker started");
        loop {
            let message = if self.producer.can_produce() {
                match self.inbox.try_recv() {
                    Ok(message) => Some(message),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else if self.producer.is_waiting_for_headroom() {
                let retry = self.headroom_retry;
                select! {
                    recv(self.inbox) -> message => match message {
                        Ok(message) => Some(message),
                        Err(_) => break,
                    },
                    default(retry) => None,
                }
            } else {
                match self.inbox.recv() {
                    Ok(message) => Some(message),
                    Err(_) => break,
                }
            };

            let keep_going = match message {
                Some(message) => self.guarded(|worker| worker.handle(message)),
                None if self.producer.can_produce() => self.guarded(ProducerWorker::step),
                None => true,
            };
            if !keep_going {
                break;
            }
        }
        self.producer.cancel();
        debug!("Reader worker stopped");
    }

    /// Run one unit of work, turning a panic into a fatal error for the run.
    fn guarded<F>(&mut self, work: F) -> bool
    where
        F: FnOnce(&mut Self) -> bool,
    {
        match panic::catch_unwind(AssertUnwindSafe(|| work(&mut *self))) {
            Ok(keep_going) => keep_going,
            Err(payload) => {
                let error = Error::worker(format!("reader panicked: {}", panic_message(payload.as_ref())));
                self.fail(error)
            },
        }
    }

    fn handle(&mut self, message: ReaderMessage) -> bool {
        match message {
            ReaderMessage::Open(path) => match self.producer.open(&path) {
                Ok(total_bytes) => {
                    self.events.emit(PulseEvent::Status(format!(
                        "Opened {} ({} bytes)", path.display(), total_bytes
                    )));
                    self.notify(AnalyzerMessage::Opened { total_bytes })
                },
                Err(e) => {
                    error!("Cannot open {:?}: {}", path, e);
                    self.events.emit(PulseEvent::Fatal(e.to_string()));
                    true
                },
            },
            ReaderMessage::Start(run) => match self.producer.start(run) {
                Ok(total_bytes) => self.notify(AnalyzerMessage::Opened { total_bytes }),
                Err(e) => self.fail_run(run, e),
            },
            ReaderMessage::Pause => {
                self.producer.pause();
                true
            },
            ReaderMessage::Resume => {
                self.producer.resume();
                true
            },
            ReaderMessage::Cancel => {
                self.producer.cancel();
                true
            },
            // The loop re-checks the queue on every pass.
            ReaderMessage::Headroom => true,
            ReaderMessage::Shutdown => {
                info!("Reader worker shutting down");
                false
            },
        }
    }

    fn step(&mut self) -> bool {
        let run = self.producer.run();
        match self.producer.produce_next() {
            Ok(ProduceOutcome::Produced { .. }) => self.notify(AnalyzerMessage::ChunkReady(run)),
            Ok(ProduceOutcome::EndOfStream) => {
                self.events.emit(PulseEvent::ReadingFinished);
                self.events.emit(PulseEvent::Status("File reading completed".to_string()));
                self.notify(AnalyzerMessage::EndOfStream(run))
            },
            Ok(ProduceOutcome::QueueFull) | Ok(ProduceOutcome::Inactive) => true,
            Err(e) => self.fail(e),
        }
    }

    /// Stop the current run and tell both the analyzer and the consumer.
    fn fail(&mut self, error: Error) -> bool {
        let run = self.producer.run();
        self.fail_run(run, error)
    }

    fn fail_run(&mut self, run: RunId, error: Error) -> bool {
        error!("Reader failed during {}: {}", run, error);
        self.producer.abort();
        self.events.emit(PulseEvent::Fatal(error.to_string()));
        self.notify(AnalyzerMessage::Aborted(run))
    }

    fn notify(&self, message: AnalyzerMessage) -> bool {
        if self.analyzer.send(message).is_err() {
            warn!("Analyzer worker is gone; stopping the reader");
            return false;
        }
        true
    }
}
