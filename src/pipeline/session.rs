// src/pipeline/session.rs

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender};
use log::{info, debug, warn, error};

use crate::analyzer::FrequencyAnalyzer;
use crate::config::PulseConfig;
use crate::error::{Error, Result};
use crate::reader::queue::BoundedChunkQueue;
use crate::reader::ChunkProducer;
use crate::types::{Command, PulseEvent, RunId};
use super::analyzer_worker::AnalyzerWorker;
use super::producer_worker::ProducerWorker;
use super::signals::{AnalyzerMessage, EventSink, ReaderMessage};

/// Room for events the consumer has not read yet. Periodic snapshots are
/// dropped when it is full; everything else waits.
const EVENT_CAPACITY: usize = 256;

const READER_THREAD: &str = "wordpulse-reader";
const ANALYZER_THREAD: &str = "wordpulse-analyzer";

struct WorkerHandle {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

/// Reports a worker's exit when its thread body returns or unwinds.
struct ExitNotice {
    name: &'static str,
    exited: Sender<&'static str>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.exited.send(self.name);
    }
}

/// Runs a reader and an analyzer worker over one file at a time.
///
/// Commands return as soon as they are queued; results arrive on `events()`.
pub struct PulseSession {
    config: PulseConfig,
    reader: Sender<ReaderMessage>,
    analyzer: Sender<AnalyzerMessage>,
    events: Receiver<PulseEvent>,
    exited: Receiver<&'static str>,
    workers: Vec<WorkerHandle>,
    settled: Arc<AtomicU64>,
    run: RunId,
    started: bool,
    paused: bool,
    stopped: bool,
}

impl PulseSession {
    /// Validate `config` and start both workers.
    pub fn spawn(config: PulseConfig) -> Result<Self> {
        config.validate()?;

        let queue = Arc::new(BoundedChunkQueue::new(config.max_chunks_in_mem_num));
        let producer = ChunkProducer::new(&config, Arc::clone(&queue));
        let analyzer = FrequencyAnalyzer::new(&config, queue)?;

        let (reader_tx, reader_rx) = unbounded();
        let (analyzer_tx, analyzer_rx) = unbounded();
        let (event_tx, event_rx) = bounded(EVENT_CAPACITY);
        let (exit_tx, exit_rx) = unbounded();
        let settled = Arc::new(AtomicU64::new(0));

        let producer_worker = ProducerWorker::new(
            producer,
            reader_rx,
            analyzer_tx.clone(),
            EventSink::new(event_tx.clone()),
        );
        let analyzer_worker = AnalyzerWorker::new(
            analyzer,
            analyzer_rx,
            reader_tx.clone(),
            EventSink::new(event_tx),
            config.snapshot_interval(),
            Arc::clone(&settled),
        );

        let mut workers = Vec::with_capacity(2);
        workers.push(spawn_worker(READER_THREAD, exit_tx.clone(), move || producer_worker.run())?);
        workers.push(spawn_worker(ANALYZER_THREAD, exit_tx, move || analyzer_worker.run())?);

        info!("Session started (chunk size {} bytes, queue depth {}, top {})",
            config.chunk_size_bytes, config.max_chunks_in_mem_num, config.top_n);

        Ok(Self {
            config,
            reader: reader_tx,
            analyzer: analyzer_tx,
            events: event_rx,
            exited: exit_rx,
            workers,
            settled,
            run: RunId::default(),
            started: false,
            paused: false,
            stopped: false,
        })
    }

    pub fn events(&self) -> &Receiver<PulseEvent> {
        &self.events
    }

    pub fn config(&self) -> &PulseConfig {
        &self.config
    }

    /// Select the file for the next run. An active run is cancelled.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        debug!("open {:?}", path);
        self.analyzer.send(AnalyzerMessage::Cancel)?;
        self.reader.send(ReaderMessage::Open(path))?;
        self.started = false;
        self.paused = false;
        Ok(())
    }

    /// Start a fresh run of the opened file and return its id.
    ///
    /// A paused run is resumed instead; a running one is restarted from the
    /// beginning.
    pub fn start(&mut self) -> Result<RunId> {
        if self.paused && self.is_running() {
            self.resume()?;
            return Ok(self.run);
        }

        self.run = self.run.next();
        // The analyzer must learn about the run before any of its chunks.
        self.analyzer.send(AnalyzerMessage::Start(self.run))?;
        self.reader.send(ReaderMessage::Start(self.run))?;
        self.started = true;
        self.paused = false;
        info!("Started {}", self.run);
        Ok(self.run)
    }

    /// Returns false when there is no running, unpaused run.
    pub fn pause(&mut self) -> Result<bool> {
        if !self.is_running() || self.paused {
            return Ok(false);
        }
        self.reader.send(ReaderMessage::Pause)?;
        self.analyzer.send(AnalyzerMessage::Pause)?;
        self.paused = true;
        Ok(true)
    }

    pub fn resume(&mut self) -> Result<bool> {
        if !self.is_running() || !self.paused {
            return Ok(false);
        }
        self.reader.send(ReaderMessage::Resume)?;
        self.analyzer.send(AnalyzerMessage::Resume)?;
        self.paused = false;
        Ok(true)
    }

    /// Stop the run and reset counts. Harmless when nothing runs.
    pub fn cancel(&mut self) -> Result<()> {
        self.reader.send(ReaderMessage::Cancel)?;
        self.analyzer.send(AnalyzerMessage::Cancel)?;
        self.started = false;
        self.paused = false;
        Ok(())
    }

    pub fn send(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Open(path) => self.open(path),
            Command::Start => self.start().map(|_| ()),
            Command::Pause => self.pause().map(|_| ()),
            Command::Resume => self.resume().map(|_| ()),
            Command::Cancel => self.cancel(),
        }
    }

    /// A run was started and has not finished, failed or been cancelled.
    pub fn is_running(&self) -> bool {
        self.started && self.settled.load(Ordering::SeqCst) < self.run.get()
    }

    pub fn is_paused(&self) -> bool {
        self.paused && self.is_running()
    }

    pub fn current_run(&self) -> RunId {
        self.run
    }

    /// Stop both workers, waiting up to `stop_timeout_ms` for them.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        let _ = self.reader.send(ReaderMessage::Shutdown);
        let _ = self.analyzer.send(AnalyzerMessage::Shutdown);

        let timeout = self.config.stop_timeout();
        let deadline = Instant::now() + timeout;
        // Keep draining events so a worker blocked on a full stream can exit.
        let mut events = self.events.clone();
        let exited = self.exited.clone();
        let mut pending = self.workers.iter().filter(|w| w.handle.is_some()).count();

        while pending > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            select! {
                recv(exited) -> name => match name {
                    Ok(name) => {
                        pending -= 1;
                        self.join_worker(name);
                    },
                    Err(_) => break,
                },
                recv(events) -> event => {
                    if event.is_err() {
                        events = never();
                    }
                },
                default(remaining) => break,
            }
        }

        let stuck: Vec<&'static str> = self.workers
            .iter_mut()
            .filter_map(|worker| worker.handle.take().map(|_| worker.name))
            .collect();
        if stuck.is_empty() {
            info!("Session stopped");
            Ok(())
        } else {
            // Dropping the handles detaches the threads.
            error!("Worker(s) {:?} did not stop within {:?}; detached", stuck, timeout);
            Err(Error::worker(format!("{} did not stop within {:?}", stuck.join(", "), timeout)))
        }
    }

    fn join_worker(&mut self, name: &'static str) {
        let Some(worker) = self.workers.iter_mut().find(|w| w.name == name) else {
            return;
        };
        if let Some(handle) = worker.handle.take() {
            if handle.join().is_err() {
                warn!("Worker {} ended with a panic", name);
            } else {
                debug!("Worker {} joined", name);
            }
        }
    }
}

impl Drop for PulseSession {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Session teardown incomplete: {}", e);
        }
    }
}

fn spawn_worker<F>(name: &'static str, exited: Sender<&'static str>, body: F) -> Result<WorkerHandle>
where
    F: FnOnce() + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _notice = ExitNotice { name, exited };
            body();
        })?;
    Ok(WorkerHandle { name, handle: Some(handle) })
}
