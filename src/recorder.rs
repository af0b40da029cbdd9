//! Buffered line recorder for CSV captures.
//!
//! Thin wrapper over a buffered file writer with the retry semantics the
//! measurement loop needs: a write that fails transiently is retried until
//! it succeeds or shutdown is requested.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::warn;

use crate::error::{AnemoError, Result};

const RETRY_DELAY: Duration = Duration::from_millis(1);

pub struct Recorder {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl Recorder {
    /// Create the file (and its parent directory), write the header line,
    /// and buffer subsequent writes with `buffer_bytes` capacity.
    pub fn create(path: &Path, header: &str, buffer_bytes: usize) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| AnemoError::Recorder {
                path: path.display().to_string(),
                source,
            })?;
        }
        let file = File::create(path).map_err(|source| AnemoError::Recorder {
            path: path.display().to_string(),
            source,
        })?;
        let mut recorder = Self {
            writer: BufWriter::with_capacity(buffer_bytes.max(512), file),
            path: path.to_path_buf(),
        };
        recorder.write_line(header)?;
        Ok(recorder)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .map_err(|source| AnemoError::Recorder {
                path: self.path.display().to_string(),
                source,
            })
    }

    /// Retry a line write until it lands or `shutdown` is raised.
    pub fn write_line_retry(&mut self, line: &str, shutdown: &AtomicBool) -> Result<()> {
        loop {
            match self.write_line(line) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if shutdown.load(Ordering::Relaxed) {
                        return Err(err);
                    }
                    warn!("recorder write failed, retrying: {err}");
                    std::thread::sleep(RETRY_DELAY);
                }
            }
        }
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush().map_err(|source| AnemoError::Recorder {
            path: self.path.display().to_string(),
            source,
        })
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
