pub mod separators;

use serde::{Serialize, Deserialize};
use std::path::Path;
use std::fs;
use std::time::Duration;
use log::{info, warn, trace, LevelFilter};
use regex::Regex;

use crate::error::{Error, Result};
pub use separators::SeparatorSet;

/// Separators used when the configuration does not name any.
pub const DEFAULT_SEPARATORS: &str = " \t\n\r.,!?;:'\"()[]{}<>-/\\|&*@#%^+=~`";

/// How the reader pulls a window of the file into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// Map each window with `mmap`; the chunk keeps the mapping alive.
    Mmap,
    /// `read` each window into an owned buffer.
    Read,
}

impl ReadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadMode::Mmap => "mmap",
            ReadMode::Read => "read",
        }
    }
}

/// Run parameters shared read-only by the reader and the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default = "default_max_chunks_in_mem_num")]
    pub max_chunks_in_mem_num: usize,

    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: usize,

    #[serde(default = "default_word_pattern")]
    pub word_pattern: String,

    #[serde(default)]
    pub case_sensitive: bool,

    #[serde(default = "default_word_separators")]
    pub word_separators: String,

    #[serde(default = "default_read_mode")]
    pub read_mode: ReadMode,

    /// Skip chunks that are not valid UTF-8 instead of decoding them lossily.
    #[serde(default)]
    pub strict_utf8: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Grace period a worker gets to acknowledge shutdown.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

// Default functions
fn default_top_n() -> usize { 15 }
fn default_max_chunks_in_mem_num() -> usize { 10 }
fn default_update_interval_ms() -> u64 { 1 }
fn default_chunk_size_bytes() -> usize { 128 * 1024 }
fn default_word_pattern() -> String { r"\w+".to_string() }
fn default_word_separators() -> String { DEFAULT_SEPARATORS.to_string() }
fn default_read_mode() -> ReadMode { ReadMode::Mmap }
fn default_log_level() -> String { "info".to_string() }
fn default_stop_timeout_ms() -> u64 { 3000 }

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            max_chunks_in_mem_num: default_max_chunks_in_mem_num(),
            update_interval_ms: default_update_interval_ms(),
            chunk_size_bytes: default_chunk_size_bytes(),
            word_pattern: default_word_pattern(),
            case_sensitive: false,
            word_separators: default_word_separators(),
            read_mode: default_read_mode(),
            strict_utf8: false,
            log_level: default_log_level(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl PulseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(Error::config("top_n must be positive"));
        }
        if self.max_chunks_in_mem_num == 0 {
            return Err(Error::config("max_chunks_in_mem_num must be positive"));
        }
        if self.update_interval_ms == 0 {
            return Err(Error::config("update_interval_ms must be positive"));
        }
        if self.chunk_size_bytes == 0 {
            return Err(Error::config("chunk_size_bytes must be positive"));
        }
        if self.stop_timeout_ms == 0 {
            return Err(Error::config("stop_timeout_ms must be positive"));
        }
        Regex::new(&self.word_pattern)?;
        parse_level(&self.log_level)?;
        Ok(())
    }

    /// Parse and validate a JSON configuration file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let absolute_path = fs::canonicalize(&path)
            .unwrap_or_else(|_| path.as_ref().to_path_buf());
        trace!("Loading configuration from: {:?}", absolute_path);

        let content = fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, falling back to the built-in defaults on any problem.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_json(&path) {
            Ok(config) => {
                info!("Config loaded from {:?}: pattern {:?}, top_n {}",
                    path.as_ref(), config.word_pattern, config.top_n);
                config
            },
            Err(e) => {
                warn!("Cannot use config {:?} ({}), using defaults", path.as_ref(), e);
                Self::default()
            }
        }
    }

    /// Apply a single `key=value` override.
    ///
    /// Returns `None` when the key is unknown. The caller re-validates once all
    /// overrides are applied.
    pub fn apply_setting(&mut self, key: &str, value: &str) -> Option<Result<()>> {
        let value = value.trim().trim_matches('"');
        match key.trim() {
            "top_n" => Some(parse_number(key, value).map(|v| self.top_n = v)),
            "max_chunks_in_mem_num" => {
                Some(parse_number(key, value).map(|v| self.max_chunks_in_mem_num = v))
            },
            "update_interval_ms" => {
                Some(parse_number(key, value).map(|v| self.update_interval_ms = v))
            },
            "chunk_size_bytes" => {
                Some(parse_number(key, value).map(|v| self.chunk_size_bytes = v))
            },
            "stop_timeout_ms" => {
                Some(parse_number(key, value).map(|v| self.stop_timeout_ms = v))
            },
            "word_pattern" => {
                self.word_pattern = value.to_string();
                Some(Ok(()))
            },
            "word_separators" => {
                self.word_separators = value.to_string();
                Some(Ok(()))
            },
            "log_level" => {
                self.log_level = value.to_string();
                Some(Ok(()))
            },
            "case_sensitive" => Some(parse_flag(key, value).map(|v| self.case_sensitive = v)),
            "strict_utf8" => Some(parse_flag(key, value).map(|v| self.strict_utf8 = v)),
            "read_mode" => match value {
                "mmap" => {
                    self.read_mode = ReadMode::Mmap;
                    Some(Ok(()))
                },
                "read" => {
                    self.read_mode = ReadMode::Read;
                    Some(Ok(()))
                },
                other => Some(Err(Error::config(
                    format!("Invalid read_mode value (must be mmap/read): {}", other)
                ))),
            },
            _ => None,
        }
    }

    /// Compile the separator string, warning about anything outside ASCII.
    pub fn separator_set(&self) -> SeparatorSet {
        let (set, rejected) = SeparatorSet::from_ascii(&self.word_separators);
        if !rejected.is_empty() {
            warn!("Ignoring {} non-ASCII separator(s): {:?}", rejected.len(), rejected);
        }
        if set.is_empty() {
            warn!("Separator set is empty; chunks will not be aligned on word boundaries");
        }
        set
    }

    pub fn compile_pattern(&self) -> Result<Regex> {
        Ok(Regex::new(&self.word_pattern)?)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn get_log_level(&self) -> LevelFilter {
        parse_level(&self.log_level).unwrap_or(LevelFilter::Info)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| Error::config(
        format!("Invalid {} value (must be a positive integer): {}", key, value)
    ))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    value.parse().map_err(|_| Error::config(
        format!("Invalid {} value (must be true/false): {}", key, value)
    ))
}

fn parse_level(value: &str) -> Result<LevelFilter> {
    value.parse().map_err(|_| Error::config(format!("Invalid log_level: {}", value)))
}
