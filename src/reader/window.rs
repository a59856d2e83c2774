use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use memmap2::MmapOptions;
use log::debug;

use crate::config::{ReadMode, SeparatorSet};
use crate::error::{Error, Result};
use crate::types::{Chunk, RunId};

/// Open file handle that hands out bounded windows of its content.
pub struct WindowSource {
    file: File,
    file_size: u64,
    file_path: PathBuf,
    read_mode: ReadMode,
}

impl WindowSource {
    pub fn open<P: AsRef<Path>>(path: P, read_mode: ReadMode) -> Result<Self> {
        let file_path = path.as_ref().to_path_buf();
        let file = File::open(&file_path).map_err(|e| Error::open(&file_path, e))?;
        let metadata = file.metadata().map_err(|e| Error::open(&file_path, e))?;
        if metadata.is_dir() {
            return Err(Error::open(
                &file_path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path is a directory"),
            ));
        }
        let file_size = metadata.len();

        debug!("Opened {:?} ({} bytes, {} windows)", file_path, file_size, read_mode.as_str());

        Ok(Self {
            file,
            file_size,
            file_path,
            read_mode,
        })
    }

    pub fn size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Load `len` bytes starting at `offset` as a chunk of `run`.
    pub fn read_window(&mut self, run: RunId, offset: u64, len: usize) -> Result<Chunk> {
        if len == 0 || offset + len as u64 > self.file_size {
            return Err(Error::mapping(format!(
                "window {}+{} outside of {:?} ({} bytes)",
                offset, len, self.file_path, self.file_size
            )));
        }

        match self.read_mode {
            ReadMode::Mmap => {
                // Safety: the file is opened read-only and is not expected to
                // change while it is being analysed.
                let map = unsafe { MmapOptions::new().offset(offset).len(len).map(&self.file) }
                    .map_err(|e| Error::mapping(format!(
                        "cannot map {} bytes at {} of {:?}: {}", len, offset, self.file_path, e
                    )))?;
                Ok(Chunk::mapped(run, offset, map, len))
            },
            ReadMode::Read => {
                let mut buffer = Vec::new();
                buffer.try_reserve_exact(len).map_err(|e| Error::mapping(format!(
                    "cannot allocate {} bytes for a window: {}", len, e
                )))?;
                buffer.resize(len, 0);
                self.file.seek(SeekFrom::Start(offset))?;
                self.file.read_exact(&mut buffer)?;
                Ok(Chunk::owned(run, offset, buffer))
            },
        }
    }
}

/// How much of a window to publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cut {
    pub len: usize,
    /// The window had no separator and does not end the file, so the last
    /// token may continue in the next chunk.
    pub may_split_token: bool,
}

/// Decide where to cut `window`.
///
/// The cut lands right after the last separator so no token straddles two
/// chunks. A window that ends the file, or that contains no separator at
/// all, is published whole.
pub fn cut_window(window: &[u8], separators: &SeparatorSet, reaches_eof: bool) -> Cut {
    if reaches_eof {
        return Cut { len: window.len(), may_split_token: false };
    }
    match separators.rfind(window) {
        Some(last) => Cut { len: last + 1, may_split_token: false },
        None => Cut { len: window.len(), may_split_token: true },
    }
}
