//! wordpulse streams a large text file through a bounded queue of
//! separator-aligned chunks and keeps a live ranking of its most frequent words.
//! A reader worker and an analyzer worker run side by side; a `PulseSession`
//! drives them and reports progress and rankings as events.

// Module declarations
pub mod error;
pub mod config;
pub mod types;
pub mod parser;
pub mod reader;
pub mod analyzer;
pub mod pipeline;
pub mod utils;

// Re-exports
pub use error::{Error, Result};
pub use config::{PulseConfig, ReadMode, SeparatorSet};
pub use types::{Command, PulseEvent, RankedWord, RunId, Snapshot};
pub use parser::{PatternTokenizer, TextTokenizer};
pub use reader::{ChunkProducer, DataAccess, DataProvider, ProduceOutcome};
pub use reader::queue::BoundedChunkQueue;
pub use analyzer::{FrequencyAnalyzer, FrequencyTable};
pub use pipeline::PulseSession;
