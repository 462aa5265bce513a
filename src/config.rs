//! Configuration for a tail run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default settle delay between a change notification and reopening.
pub const DEFAULT_WATCH_DELAY: Duration = Duration::from_secs(2);

/// Options controlling a single tailed file.
#[derive(Debug, Clone)]
pub struct TailOptions {
    /// Text encoding of the tailed file. Only UTF-8 is supported.
    pub encoding: String,

    /// Skip checkpoint reads and writes entirely for this run.
    pub no_checkpoint: bool,

    /// Lines per batch before a drain and checkpoint cycle. 0 means
    /// unbounded (drain only at end of stream).
    pub batch_limit: usize,

    /// Pause after a drained batch when the consumer does not request
    /// its own delay.
    pub batch_delay: Duration,

    /// Settle delay between a change notification and reopening,
    /// absorbing duplicate platform events.
    pub watch_delay: Duration,

    /// Directory holding checkpoint records, created on first use.
    pub checkpoint_dir: PathBuf,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            encoding: "utf8".to_string(),
            no_checkpoint: false,
            batch_limit: 0,
            batch_delay: Duration::ZERO,
            watch_delay: DEFAULT_WATCH_DELAY,
            checkpoint_dir: PathBuf::from(".checkpoints"),
        }
    }
}

impl TailOptions {
    /// Checks option values and the tailed path for combinations the
    /// tailer cannot honor.
    pub fn validate(&self, path: &Path) -> Result<()> {
        match self.encoding.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => {}
            other => {
                return Err(Error::Config {
                    message: format!("unsupported encoding: {}", other),
                });
            }
        }
        input_kind(path)?;
        Ok(())
    }
}

/// How the bytes behind a tailed path are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// An append-only plain text file.
    Plain,
    /// A gzip archive, read once in full and never watched afterwards.
    GzipArchive,
}

/// Classifies a path by suffix, rejecting compressed formats the tailer
/// cannot decode.
pub fn input_kind(path: &Path) -> Result<InputKind> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("gz") => Ok(InputKind::GzipArchive),
        Some("bz2") | Some("xz") | Some("zst") | Some("zip") => Err(Error::UnsupportedArchive {
            path: path.display().to_string(),
        }),
        _ => Ok(InputKind::Plain),
    }
}
