// src/utils/logger.rs

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use chrono::Local;
use env_logger::{Builder, Target};
use log::LevelFilter;

use crate::error::{Error, Result};

/// Install the global logger.
///
/// Lines go to stderr, or are appended to `log_file` when one is given so
/// they do not interleave with the progress display.
pub fn init_logging(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(buf,
                "{} [{}] ({}) - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                std::thread::current().name().unwrap_or("main"),
                record.args()
            )
        })
        .filter(None, level);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::open(path, e))?;
        builder.target(Target::Pipe(Box::new(file)));
    } else {
        builder.target(Target::Stderr);
    }

    builder
        .try_init()
        .map_err(|e| Error::config(format!("logger already initialised: {}", e)))
}
