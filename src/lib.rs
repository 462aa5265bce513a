//! A log tailing library with durable resume across restarts.
//!
//! This library follows files as they grow, survives rotation and
//! recreation, and checkpoints confirmed read positions so a restarted
//! process continues where the previous one stopped instead of
//! re-reading or losing lines. Gzip archives are read once, start to
//! end. Lines are delivered in flow-controlled batches: after each
//! batch the consumer acknowledges a drain notification, and only then
//! is the position persisted and reading resumed.
//!
//! # Example
//!
//! ```rust,no_run
//! use log_tailer::{tail, TailEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tailer = tail("app.log").await?;
//!
//!     while let Some(event) = tailer.next_event().await {
//!         match event {
//!             TailEvent::Line { text, number } => println!("{}: {}", number, text),
//!             TailEvent::Drain(ack) => ack.ack(),
//!             TailEvent::End => println!("caught up"),
//!             TailEvent::IrrelevantFile(_) => {}
//!             TailEvent::Error(e) => eprintln!("Error: {}", e),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

// Internal modules - not part of public API
mod checkpoint;
mod config;
mod error;
mod events;
mod file_id;
mod lines;
mod position;
mod reader;
mod stream;
mod watcher;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use config::{DEFAULT_WATCH_DELAY, TailOptions};
pub use error::{Error, Result};
pub use events::{BatchAck, TailEvent};
pub use stream::Tailer;

use std::path::Path;

/// Starts tailing a file with default options.
///
/// Checkpoints go to `.checkpoints` in the working directory, batches
/// are unbounded, and the watch settle delay is two seconds. Use
/// [`Tailer::new`] with a [`TailOptions`] to change any of that.
///
/// # Example
///
/// ```rust,no_run
/// use log_tailer::{tail, TailEvent};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut tailer = tail("app.log").await?;
///
///     while let Some(event) = tailer.next_event().await {
///         if let TailEvent::Drain(ack) = event {
///             ack.ack();
///         }
///     }
///
///     Ok(())
/// }
/// ```
pub async fn tail<P: AsRef<Path>>(path: P) -> Result<Tailer> {
    Tailer::new(path, TailOptions::default()).await
}
