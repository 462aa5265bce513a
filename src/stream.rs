//! The consumer-facing handle for one tailed file.
//!
//! A [`Tailer`] owns a background engine task and exposes its
//! notifications as an async event sequence. Stopping is cooperative:
//! cancellation is observed at the engine's wait points, never in the
//! middle of a checkpoint write.

use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::config::TailOptions;
use crate::error::Result;
use crate::events::TailEvent;
use crate::reader::TailState;

/// An active tail of one file, producing [`TailEvent`]s.
pub struct Tailer {
    receiver: UnboundedReceiverStream<TailEvent>,
    cancel: CancellationToken,
    _task_handle: JoinHandle<()>,
}

impl Tailer {
    /// Starts tailing `path` with the given options.
    ///
    /// Configuration problems (an unsupported encoding or archive
    /// format, an unusable checkpoint directory) are reported here,
    /// before any background work begins. A missing file is not an
    /// error; the tail waits for it to appear.
    pub async fn new<P: AsRef<Path>>(path: P, options: TailOptions) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let state = TailState::new(path.as_ref(), options, tx, cancel.clone()).await?;
        let task_handle = tokio::spawn(state.run());

        Ok(Tailer {
            receiver: UnboundedReceiverStream::new(rx),
            cancel,
            _task_handle: task_handle,
        })
    }

    /// Waits for the next event. `None` means the tail has finished:
    /// stopped, failed fatally, or read an archive to its end.
    pub async fn next_event(&mut self) -> Option<TailEvent> {
        self.receiver.next().await
    }

    /// Requests a stop. Idempotent; the engine finishes any in-flight
    /// checkpoint write first.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Tailer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Stream for Tailer {
    type Item = TailEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}
