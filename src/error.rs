//! Error types for the log tailer library.

use thiserror::Error;

/// The main error type for tailing operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors when reading files or consulting file metadata.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching errors from the notify crate.
    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Checkpoint records that fail to encode or decode.
    #[error("Checkpoint record error: {0}")]
    CheckpointFormat(#[from] serde_json::Error),

    /// A checkpoint write that still looked wrong after the retry.
    #[error("Checkpoint save failed for {path}: {message}")]
    CheckpointSave { path: String, message: String },

    /// Rejected configuration values.
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Compressed inputs in a format other than gzip.
    #[error("Unsupported archive format: {path}")]
    UnsupportedArchive { path: String },

    /// The consumer side has gone away (event channel or ack dropped).
    #[error("Stream closed")]
    StreamClosed,
}

/// A convenient Result type for tailing operations.
pub type Result<T> = std::result::Result<T, Error>;
