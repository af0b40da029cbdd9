//! Raw-frame persistence: error dumps and on-demand captures.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::warn;

use crate::driver::{AcousticFrontEnd, CaptureContext, Channel, PulsePattern};
use crate::error::Result;
use crate::recorder::Recorder;

const DUMP_HEADER: &str = "North,South,East,West";
const DUMP_BUFFER_BYTES: usize = 20_000;

/// Writes the four raw channel frames of a faulted cycle to a timestamped
/// CSV, at most once per second.
pub struct ErrorDumper {
    dir: PathBuf,
    min_interval: Duration,
    last_dump: Option<Instant>,
}

impl ErrorDumper {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            min_interval: Duration::from_secs(1),
            last_dump: None,
        }
    }

    /// Dump the frames unless the previous dump was under a second ago.
    /// Returns the path written, or None when rate-limited.
    pub fn dump(
        &mut self,
        frames: &[Vec<u16>; 4],
        err_count: u64,
        shutdown: &AtomicBool,
    ) -> Result<Option<PathBuf>> {
        if let Some(last) = self.last_dump
            && last.elapsed() < self.min_interval
        {
            return Ok(None);
        }
        self.last_dump = Some(Instant::now());

        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let path = self.dir.join(format!("{stamp}_{err_count}_err.csv"));
        write_frames(&path, frames, shutdown)?;
        Ok(Some(path))
    }
}

/// Write one frame set as CSV, one sample per row in channel order.
pub fn write_frames(path: &Path, frames: &[Vec<u16>; 4], shutdown: &AtomicBool) -> Result<()> {
    let mut recorder = Recorder::create(path, DUMP_HEADER, DUMP_BUFFER_BYTES)?;
    let len = frames.iter().map(Vec::len).min().unwrap_or(0);
    let mut line = String::with_capacity(32);
    for j in 0..len {
        line.clear();
        let _ = write!(
            line,
            "{},{},{},{}",
            frames[Channel::North.index()][j],
            frames[Channel::South.index()][j],
            frames[Channel::East.index()][j],
            frames[Channel::West.index()][j],
        );
        recorder.write_line_retry(&line, shutdown)?;
    }
    recorder.finish()
}

/// Capture `cycles` rounds of all four channels and record them, for
/// offline inspection with the analyzer.
pub fn record_raw_frames(
    path: &Path,
    fe: &mut dyn AcousticFrontEnd,
    pulse: &PulsePattern,
    ctx: &CaptureContext,
    cycles: usize,
    shutdown: &AtomicBool,
) -> Result<()> {
    let mut recorder = Recorder::create(path, DUMP_HEADER, DUMP_BUFFER_BYTES)?;
    let mut frames: [Vec<u16>; 4] = std::array::from_fn(|_| vec![0u16; ctx.sample_len]);
    let mut line = String::with_capacity(32);
    for _ in 0..cycles {
        for ch in Channel::ALL {
            fe.measure_channel(ch, pulse, &mut frames[ch.index()], false)?;
        }
        for j in 0..ctx.sample_len {
            line.clear();
            let _ = write!(
                line,
                "{},{},{},{}",
                frames[0][j], frames[1][j], frames[2][j], frames[3][j]
            );
            recorder.write_line_retry(&line, shutdown)?;
        }
    }
    recorder.finish()
}

/// Parse a frame CSV back into four channel frames. Used by the offline
/// analyzer; rows with the wrong column count are rejected.
pub fn read_frames(path: &Path) -> Result<[Vec<u16>; 4]> {
    let contents = std::fs::read_to_string(path)?;
    let mut frames: [Vec<u16>; 4] = std::array::from_fn(|_| Vec::new());
    for (lineno, line) in contents.lines().enumerate() {
        if lineno == 0 && line.starts_with("North") {
            continue;
        }
        let mut fields = line.split(',');
        for frame in frames.iter_mut() {
            let field = fields.next().ok_or_else(|| {
                crate::error::AnemoError::Config(format!(
                    "{}: line {} has fewer than 4 columns",
                    path.display(),
                    lineno + 1
                ))
            })?;
            let value = field.trim().parse::<u16>().map_err(|_| {
                crate::error::AnemoError::Config(format!(
                    "{}: line {} has a non-numeric sample",
                    path.display(),
                    lineno + 1
                ))
            })?;
            frame.push(value);
        }
    }
    if frames[0].is_empty() {
        warn!("{}: no samples parsed", path.display());
    }
    Ok(frames)
}
