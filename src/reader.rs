//! The tail engine: one task per tailed file.
//!
//! The engine opens the file (reconciling against a checkpoint), pumps
//! lines to the consumer in flow-controlled batches, persists the
//! confirmed position at drain points, and re-arms a filesystem watch
//! at end of stream. All state for one tail lives on one task; nothing
//! here is shared.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::{InputKind, TailOptions, input_kind};
use crate::error::{Error, Result};
use crate::events::{BatchAck, TailEvent};
use crate::lines::LineSource;
use crate::position::{Advance, Position};
use crate::watcher::{FileWatcher, RenameSemantics, WatchSignal, rename_semantics};

/// What the engine does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Open the file and pump it to end of stream.
    Open,
    /// Wait for a filesystem signal, arming a watch if none is active.
    Watch,
    /// Nothing can wake this tail anymore except a stop request.
    Idle,
    /// The tail is finished, fatally or by request.
    Stop,
}

/// Per-file run state, owned by the engine task.
pub(crate) struct TailState {
    path: PathBuf,
    options: TailOptions,
    kind: InputKind,
    rename_semantics: RenameSemantics,
    store: Option<CheckpointStore>,
    events: mpsc::UnboundedSender<TailEvent>,
    cancel: CancellationToken,

    position: Position,
    batch_count: usize,
    saw_end_of_stream: bool,
    /// The persisted byte offset is only a safe seek target in the
    /// window between an observed end of stream and the next read.
    trust_bytes: bool,
    lines_at_eof: Option<u64>,
    watcher: Option<FileWatcher>,
}

impl TailState {
    pub(crate) async fn new(
        path: &Path,
        options: TailOptions,
        events: mpsc::UnboundedSender<TailEvent>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        options.validate(path)?;
        let path = std::path::absolute(path)?;
        let kind = input_kind(&path)?;

        let store = if options.no_checkpoint {
            None
        } else {
            Some(CheckpointStore::open(&options.checkpoint_dir).await?)
        };

        Ok(Self {
            path,
            options,
            kind,
            rename_semantics: rename_semantics(),
            store,
            events,
            cancel,
            position: Position::new(0),
            batch_count: 0,
            saw_end_of_stream: false,
            trust_bytes: false,
            lines_at_eof: None,
            watcher: None,
        })
    }

    /// Drives this tail until it stops. Consumes the state; the task
    /// owns it exclusively.
    pub(crate) async fn run(mut self) {
        let mut step = match tokio::fs::metadata(&self.path).await {
            Ok(_) => Step::Open,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "watching for file to appear");
                Step::Watch
            }
            Err(err) => {
                error!(path = %self.path.display(), error = %err, "cannot stat file");
                let _ = self.send(TailEvent::Error(err.into()));
                Step::Idle
            }
        };

        loop {
            step = match step {
                Step::Open => self.open_and_pump().await,
                Step::Watch => self.await_change().await,
                Step::Idle => self.idle().await,
                Step::Stop => break,
            };
        }
        debug!(path = %self.path.display(), "tail finished");
    }

    /// One full pass: consult the checkpoint, open, pump to EOF.
    async fn open_and_pump(&mut self) -> Step {
        let mark = match &self.store {
            Some(store) => match store.load(&self.path).await {
                Ok(mark) => mark,
                Err(err @ Error::CheckpointFormat(_)) => {
                    warn!(error = %err, "unreadable checkpoint record, starting fresh");
                    None
                }
                Err(err) => {
                    error!(error = %err, "checkpoint load failed");
                    let _ = self.send(TailEvent::Error(err));
                    return Step::Idle;
                }
            },
            None => None,
        };

        let mut source = match self.open_source(mark.as_ref()).await {
            Ok(source) => source,
            Err(Error::Io(err)) if err.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "file disappeared before open, watching");
                return Step::Watch;
            }
            Err(err) => {
                error!(path = %self.path.display(), error = %err, "cannot open file");
                let _ = self.send(TailEvent::Error(err));
                return Step::Idle;
            }
        };

        self.pump(&mut source).await
    }

    /// Builds the line source for this open, seeding the position from
    /// the checkpoint when one is usable.
    async fn open_source(&mut self, mark: Option<&Checkpoint>) -> Result<LineSource> {
        debug!(path = %self.path.display(), "opening for read");

        if self.kind == InputKind::GzipArchive {
            // Compressed byte offsets say nothing about decompressed
            // content, so archives only ever resume by line count.
            let start = mark.map(|m| m.lines).unwrap_or(0);
            if start > 0 {
                debug!(lines_start = start, "resuming archive by line count");
            }
            self.position = Position::new(start);
            return LineSource::open_archive(&self.path).await;
        }

        if let Some(mark) = mark {
            if self.trust_bytes && mark.bytes > 0 {
                if let Some(lines_at_eof) = self.lines_at_eof {
                    if lines_at_eof != mark.lines {
                        warn!(
                            lines_at_eof,
                            recorded = mark.lines,
                            "line count at end of stream disagrees with checkpoint"
                        );
                    }
                }
                info!(
                    bytes_start = mark.bytes,
                    lines = mark.lines,
                    "resuming by byte offset"
                );
                self.position = Position::at_offset(mark.lines, mark.bytes);
                return LineSource::open_plain(&self.path, Some(mark.bytes)).await;
            }
            if mark.lines > 0 {
                debug!(lines_start = mark.lines, "resuming by line count");
                self.position = Position::new(mark.lines);
                return LineSource::open_plain(&self.path, None).await;
            }
        }

        self.position = Position::new(0);
        LineSource::open_plain(&self.path, None).await
    }

    /// Pulls lines until end of stream, honoring the batch limit.
    async fn pump(&mut self, source: &mut LineSource) -> Step {
        loop {
            if self.cancel.is_cancelled() {
                return Step::Stop;
            }

            if self.options.batch_limit > 0 && self.batch_count >= self.options.batch_limit {
                debug!(limit = self.options.batch_limit, "batch full");
                if let Some(step) = self.drain_and_save(true).await {
                    return step;
                }
                continue;
            }

            match source.next_line().await {
                Ok(Some(line)) => {
                    // A fresh read invalidates the byte-offset trust
                    // window and re-arms end of stream handling.
                    self.trust_bytes = false;
                    self.saw_end_of_stream = false;

                    match self.position.advance(line.consumed) {
                        Advance::Skip => {}
                        Advance::Emit {
                            number,
                            finished_skip,
                        } => {
                            if let Some(skipped) = finished_skip {
                                info!(skipped, "skipped already confirmed lines");
                            }
                            self.batch_count += 1;
                            let event = TailEvent::Line {
                                text: line.text,
                                number,
                            };
                            if !self.send(event) {
                                return Step::Stop;
                            }
                        }
                    }
                }
                Ok(None) => return self.end_stream().await,
                Err(err) => {
                    error!(path = %self.path.display(), error = %err, "read failed");
                    let _ = self.send(TailEvent::Error(err));
                    return match self.kind {
                        InputKind::GzipArchive => Step::Stop,
                        InputKind::Plain => Step::Watch,
                    };
                }
            }
        }
    }

    /// End of the current open. Flushes the batch, persists the
    /// position, notifies the consumer, and hands over to watching.
    ///
    /// Idempotent: a second end of stream without an intervening
    /// successful read is suppressed.
    async fn end_stream(&mut self) -> Step {
        info!(path = %self.path.display(), "end of stream");

        if self.saw_end_of_stream {
            debug!("suppressing duplicate end of stream");
        } else {
            self.saw_end_of_stream = true;
            self.trust_bytes = true;
            self.lines_at_eof = Some(self.position.current_line());

            if let Some(step) = self.drain_and_save(false).await {
                return step;
            }
            if !self.send(TailEvent::End) {
                return Step::Stop;
            }
        }

        match self.kind {
            InputKind::GzipArchive => {
                // Archives never grow; this tail is complete.
                debug!("archive fully read, not watching");
                Step::Stop
            }
            InputKind::Plain => Step::Watch,
        }
    }

    /// Emits a drain, waits for the consumer's acknowledgement, and
    /// persists the confirmed position. With `pause_after`, sleeps for
    /// the consumer's requested delay (or the configured default)
    /// before reading resumes.
    ///
    /// Returns the step to bail out with, or `None` to continue.
    async fn drain_and_save(&mut self, pause_after: bool) -> Option<Step> {
        let (ack, reply) = BatchAck::channel();
        if !self.send(TailEvent::Drain(ack)) {
            return Some(Step::Stop);
        }

        let cancel = self.cancel.clone();
        let delay = tokio::select! {
            _ = cancel.cancelled() => return Some(Step::Stop),
            reply = reply => match reply {
                Ok(delay) => delay,
                Err(_) => {
                    warn!("drain acknowledgement dropped, halting this tail");
                    let _ = self.send(TailEvent::Error(Error::StreamClosed));
                    return Some(Step::Stop);
                }
            },
        };

        if let Some(store) = &self.store {
            let lines = self.position.current_line();
            let bytes = self.position.byte_offset();
            if let Err(err) = store.save(&self.path, lines, bytes).await {
                error!(error = %err, "checkpoint save failed, halting");
                let _ = self.send(TailEvent::Error(err));
                return Some(Step::Stop);
            }
        }
        self.batch_count = 0;

        if pause_after {
            let pause = delay.unwrap_or(self.options.batch_delay);
            if !pause.is_zero() {
                debug!(seconds = pause.as_secs_f64(), "pausing between batches");
                tokio::select! {
                    _ = cancel.cancelled() => return Some(Step::Stop),
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }
        None
    }

    /// Waits for the next relevant filesystem signal.
    async fn await_change(&mut self) -> Step {
        if self.watcher.is_none() {
            match FileWatcher::watch(&self.path).await {
                Ok(watcher) => self.watcher = Some(watcher),
                Err(err) => {
                    error!(path = %self.path.display(), error = %err, "cannot establish watch");
                    let _ = self.send(TailEvent::Error(err));
                    return Step::Idle;
                }
            }
        }

        let cancel = self.cancel.clone();
        let signal = match self.watcher.as_mut() {
            Some(watcher) => tokio::select! {
                _ = cancel.cancelled() => return Step::Stop,
                signal = watcher.next_signal() => signal,
            },
            None => return Step::Idle,
        };

        match signal {
            None => {
                warn!("watch backend closed");
                Step::Stop
            }
            Some(WatchSignal::Irrelevant(name)) => {
                let _ = self.send(TailEvent::IrrelevantFile(name));
                Step::Watch
            }
            Some(WatchSignal::Content) => {
                // Dropping the watch before the settle delay suppresses
                // the rapid duplicate events platforms like to send.
                self.watcher = None;
                if !self.settle().await {
                    return Step::Stop;
                }
                Step::Open
            }
            Some(WatchSignal::PathChanged) => {
                self.watcher = None;
                self.path_changed().await
            }
        }
    }

    /// The watched path was created, removed, or renamed. Platform
    /// events disagree about which name they carry, so a fresh stat of
    /// the target is the ground truth.
    async fn path_changed(&mut self) -> Step {
        if self.rename_semantics == RenameSemantics::Unknown {
            error!(
                os = std::env::consts::OS,
                "rename semantics unknown on this platform, ignoring path event"
            );
            return Step::Idle;
        }

        match tokio::fs::metadata(&self.path).await {
            Ok(_) => {
                if !self.settle().await {
                    return Step::Stop;
                }
                Step::Open
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "file went away, watching for it to reappear");
                Step::Watch
            }
            Err(err) => {
                error!(error = %err, "stat failed while handling path change");
                let _ = self.send(TailEvent::Error(err.into()));
                Step::Idle
            }
        }
    }

    /// Lets duplicate notifications settle before reopening.
    async fn settle(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.options.watch_delay) => true,
        }
    }

    async fn idle(&mut self) -> Step {
        self.cancel.cancelled().await;
        Step::Stop
    }

    /// False when the consumer side is gone.
    fn send(&self, event: TailEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_id::FileId;
    use std::time::Duration;
    use tempfile::tempdir;

    fn options_in(dir: &Path) -> TailOptions {
        TailOptions {
            watch_delay: Duration::from_millis(50),
            checkpoint_dir: dir.join("marks"),
            ..TailOptions::default()
        }
    }

    async fn state_for(path: &Path, options: TailOptions) -> TailState {
        let (tx, _rx) = mpsc::unbounded_channel();
        // The receiver is dropped; these tests never pump events.
        TailState::new(path, options, tx, CancellationToken::new())
            .await
            .unwrap()
    }

    async fn mark_for(path: &Path, lines: u64, bytes: u64) -> Checkpoint {
        let meta = tokio::fs::metadata(path).await.unwrap();
        Checkpoint {
            file_path: path.to_path_buf(),
            bytes,
            lines,
            file_id: FileId::from_metadata(&meta),
        }
    }

    #[tokio::test]
    async fn test_new_rejects_unsupported_archives() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = TailState::new(
            &dir.path().join("app.log.bz2"),
            options_in(dir.path()),
            tx,
            CancellationToken::new(),
        )
        .await;

        match result {
            Err(Error::UnsupportedArchive { .. }) => {}
            other => panic!("Expected UnsupportedArchive, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_new_rejects_unknown_encoding() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let options = TailOptions {
            encoding: "utf16".to_string(),
            ..options_in(dir.path())
        };

        let result = TailState::new(
            &dir.path().join("app.log"),
            options,
            tx,
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_no_checkpoint_skips_the_store() {
        let dir = tempdir().unwrap();
        let options = TailOptions {
            no_checkpoint: true,
            ..options_in(dir.path())
        };

        let state = state_for(&dir.path().join("app.log"), options).await;

        assert!(state.store.is_none());
        // The store directory must not have been created either.
        assert!(!dir.path().join("marks").exists());
    }

    #[tokio::test]
    async fn test_open_source_fresh_file_starts_at_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        tokio::fs::write(&path, b"one\ntwo\n").await.unwrap();

        let mut state = state_for(&path, options_in(dir.path())).await;
        state.open_source(None).await.unwrap();

        assert_eq!(state.position, Position::new(0));
    }

    #[tokio::test]
    async fn test_open_source_without_trust_replays_by_line_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        tokio::fs::write(&path, b"one\ntwo\nthree\n").await.unwrap();

        let mut state = state_for(&path, options_in(dir.path())).await;
        let mark = mark_for(&path, 2, 8).await;

        // A checkpoint not taken at end of stream must not be used as
        // a seek target.
        assert!(!state.trust_bytes);
        state.open_source(Some(&mark)).await.unwrap();

        assert_eq!(state.position, Position::new(2));
        assert!(state.position.replaying());
    }

    #[tokio::test]
    async fn test_open_source_with_trust_seeks_by_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        tokio::fs::write(&path, b"one\ntwo\n").await.unwrap();

        let mut state = state_for(&path, options_in(dir.path())).await;
        state.trust_bytes = true;
        state.lines_at_eof = Some(2);
        let mark = mark_for(&path, 2, 8).await;

        state.open_source(Some(&mark)).await.unwrap();

        assert_eq!(state.position, Position::at_offset(2, 8));
        assert!(!state.position.replaying());
    }

    #[tokio::test]
    async fn test_open_source_trusted_zero_bytes_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        tokio::fs::write(&path, b"one\n").await.unwrap();

        let mut state = state_for(&path, options_in(dir.path())).await;
        state.trust_bytes = true;
        let mark = mark_for(&path, 1, 0).await;

        state.open_source(Some(&mark)).await.unwrap();

        assert_eq!(state.position, Position::new(1));
    }

    #[tokio::test]
    async fn test_open_source_archive_resumes_by_line_count_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log.gz");

        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        std::io::Write::write_all(&mut encoder, b"one\ntwo\nthree\n").unwrap();
        tokio::fs::write(&path, encoder.finish().unwrap())
            .await
            .unwrap();

        let mut state = state_for(&path, options_in(dir.path())).await;
        state.trust_bytes = true;
        let mark = mark_for(&path, 2, 14).await;

        state.open_source(Some(&mark)).await.unwrap();

        // Byte trust is meaningless for compressed input.
        assert_eq!(state.position, Position::new(2));
    }

    #[tokio::test]
    async fn test_open_source_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.log");

        let mut state = state_for(&path, options_in(dir.path())).await;
        match state.open_source(None).await {
            Err(Error::Io(err)) => assert_eq!(err.kind(), ErrorKind::NotFound),
            other => panic!("Expected NotFound, got {:?}", other.map(|_| ())),
        }
    }
}
