use thiserror::Error;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("File mapping failed: {0}")]
    Mapping(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

// Type alias for Result
pub type Result<T> = std::result::Result<T, Error>;

// Helper functions for common error conversions
impl Error {
    pub fn open<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        Error::Open { path: path.into(), source }
    }

    pub fn mapping<S: Into<String>>(msg: S) -> Self {
        Error::Mapping(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Error::Decode(msg.into())
    }

    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        Error::Analysis(msg.into())
    }

    pub fn channel<S: Into<String>>(msg: S) -> Self {
        Error::Channel(msg.into())
    }

    pub fn worker<S: Into<String>>(msg: S) -> Self {
        Error::Worker(msg.into())
    }

    /// Whether this error ends the current run. Decode and analysis failures
    /// only cost the chunk they occurred in.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Decode(_) | Error::Analysis(_))
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        Error::Channel("receiving side disconnected".to_string())
    }
}

/// Render a `catch_unwind` payload as text.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_level_errors_are_not_fatal() {
        assert!(!Error::decode("bad utf-8").is_fatal());
        assert!(!Error::analysis("boom").is_fatal());
        assert!(Error::mapping("no memory").is_fatal());
        assert!(Error::open("missing.txt", io::Error::from(io::ErrorKind::NotFound)).is_fatal());
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let caught = std::panic::catch_unwind(|| panic!("worker exploded")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "worker exploded");
    }
}
