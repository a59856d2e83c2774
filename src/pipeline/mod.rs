//! Threaded runtime: a reader and an analyzer worker connected by the bounded
//! chunk queue and one-way messages, driven by a `PulseSession`.

pub mod signals;
pub mod producer_worker;
pub mod analyzer_worker;
pub mod session;

pub use self::session::PulseSession;
pub use self::signals::{AnalyzerMessage, EventSink, ReaderMessage};
