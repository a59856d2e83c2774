use std::io::Write;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

use wordpulse::{PulseConfig, PulseEvent, PulseSession, RankedWord, ReadMode, Snapshot};

const PATIENCE: Duration = Duration::from_secs(30);

fn write_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn config(chunk_size: usize) -> PulseConfig {
    PulseConfig {
        chunk_size_bytes: chunk_size,
        max_chunks_in_mem_num: 2,
        update_interval_ms: 5,
        top_n: 3,
        ..PulseConfig::default()
    }
}

/// Collect events until `done` accepts one, which is returned last.
fn wait_for<F>(session: &PulseSession, mut done: F) -> Vec<PulseEvent>
where
    F: FnMut(&PulseEvent) -> bool,
{
    let deadline = Instant::now() + PATIENCE;
    let mut seen = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = session.events()
            .recv_timeout(remaining)
            .unwrap_or_else(|_| panic!("timed out; events so far: {:?}", seen));
        let finished = done(&event);
        seen.push(event);
        if finished {
            return seen;
        }
    }
}

fn wait_for_finish(session: &PulseSession) -> Snapshot {
    let events = wait_for(session, |e| matches!(e, PulseEvent::Finished(_) | PulseEvent::Fatal(_)));
    match events.last() {
        Some(PulseEvent::Finished(snapshot)) => snapshot.clone(),
        other => panic!("run did not finish: {:?}", other),
    }
}

fn expected_top() -> Vec<RankedWord> {
    vec![
        RankedWord::new(1000, "hello"),
        RankedWord::new(500, "world"),
        RankedWord::new(250, "again"),
    ]
}

fn sample() -> String {
    "Hello world, hello! ".repeat(250) + &"hello world again hello ".repeat(250)
}

#[test]
fn run_finishes_with_the_full_ranking() {
    let text = sample();
    let file = write_file(&text);
    for mode in [ReadMode::Mmap, ReadMode::Read] {
        let mut session = PulseSession::spawn(PulseConfig { read_mode: mode, ..config(64) }).unwrap();
        session.open(file.path()).unwrap();
        let run = session.start().unwrap();

        let events = wait_for(&session, |e| matches!(e, PulseEvent::Finished(_)));
        assert!(events.contains(&PulseEvent::RunningChanged(true)));
        assert!(events.contains(&PulseEvent::ReadingFinished));

        let Some(PulseEvent::Finished(snapshot)) = events.last() else { unreachable!() };
        assert_eq!(snapshot.top, expected_top());
        assert_eq!(snapshot.progress, 100);
        assert_eq!(snapshot.processed_bytes, text.len() as u64);
        assert_eq!(snapshot.total_bytes, text.len() as u64);
        for event in &events {
            if let PulseEvent::Snapshot(s) = event {
                assert!(s.top.len() <= 3);
            }
        }

        wait_for(&session, |e| *e == PulseEvent::RunningChanged(false));
        assert!(!session.is_running());
        assert_eq!(session.current_run(), run);
        session.shutdown().unwrap();
    }
}

#[test]
fn missing_file_is_fatal() {
    let mut session = PulseSession::spawn(config(64)).unwrap();
    session.open("/no/such/dir/input.txt").unwrap();
    let events = wait_for(&session, |e| matches!(e, PulseEvent::Fatal(_)));
    let Some(PulseEvent::Fatal(message)) = events.last() else { unreachable!() };
    assert!(message.contains("input.txt"));

    // Starting anyway fails the run instead of hanging.
    session.start().unwrap();
    wait_for(&session, |e| matches!(e, PulseEvent::Fatal(_)));
    wait_for(&session, |e| *e == PulseEvent::RunningChanged(false));
    assert!(!session.is_running());
    session.shutdown().unwrap();
}

#[test]
fn pause_holds_the_run_until_resumed() {
    let text = sample().repeat(8);
    let file = write_file(&text);
    let mut session = PulseSession::spawn(config(32)).unwrap();
    session.open(file.path()).unwrap();
    session.start().unwrap();
    assert!(session.pause().unwrap());
    assert!(!session.pause().unwrap());
    assert!(session.is_paused());

    let events = wait_for(&session, |e| {
        matches!(e, PulseEvent::PausedChanged(true) | PulseEvent::Finished(_))
    });
    assert_eq!(events.last(), Some(&PulseEvent::PausedChanged(true)));

    // Nothing finishes while paused.
    std::thread::sleep(Duration::from_millis(200));
    while let Ok(event) = session.events().try_recv() {
        assert!(!matches!(event, PulseEvent::Finished(_)), "finished while paused");
    }

    // Start while paused resumes rather than restarting.
    let run = session.current_run();
    assert_eq!(session.start().unwrap(), run);
    assert!(!session.is_paused());
    let snapshot = wait_for_finish(&session);
    let top: Vec<u64> = snapshot.top.iter().map(|w| w.count).collect();
    assert_eq!(top, vec![8000, 4000, 2000]);
    session.shutdown().unwrap();
}

#[test]
fn cancel_then_restart_counts_from_scratch() {
    let text = sample();
    let file = write_file(&text);
    let mut session = PulseSession::spawn(config(16)).unwrap();
    session.open(file.path()).unwrap();
    session.start().unwrap();
    wait_for(&session, |e| matches!(e, PulseEvent::Snapshot(s) if s.processed_bytes > 0)
        || matches!(e, PulseEvent::Finished(_)));

    session.cancel().unwrap();
    assert!(!session.is_running());
    session.start().unwrap();
    let snapshot = wait_for_finish(&session);
    assert_eq!(snapshot.top, expected_top());
    assert_eq!(snapshot.processed_bytes, text.len() as u64);
    session.shutdown().unwrap();
}

#[test]
fn start_while_running_restarts() {
    let text = sample();
    let file = write_file(&text);
    let mut session = PulseSession::spawn(config(16)).unwrap();
    session.open(file.path()).unwrap();
    let first = session.start().unwrap();
    let second = session.start().unwrap();
    assert!(second > first);

    let snapshot = wait_for_finish(&session);
    assert_eq!(snapshot.top, expected_top());
    session.shutdown().unwrap();
}

#[test]
fn empty_file_finishes_with_zero_progress() {
    let file = write_file("");
    let mut session = PulseSession::spawn(config(64)).unwrap();
    session.open(file.path()).unwrap();
    session.start().unwrap();
    let snapshot = wait_for_finish(&session);
    assert_eq!(snapshot.progress, 0);
    assert!(snapshot.top.is_empty());
    session.shutdown().unwrap();
}

#[test]
fn invalid_config_is_rejected_by_spawn() {
    let config = PulseConfig { top_n: 0, ..PulseConfig::default() };
    assert!(PulseSession::spawn(config).is_err());
}
