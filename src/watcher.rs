//! Filesystem watching using the notify crate.
//!
//! A watch targets the tailed file directly when it exists, or the
//! nearest existing ancestor directory while it does not. Raw notify
//! events are classified into the few signals the tail engine acts on.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;

/// What a batch of platform events means for the tailed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WatchSignal {
    /// Content under the watched path changed; reopen and read.
    Content,
    /// The path itself changed: created, removed, or renamed.
    PathChanged,
    /// A sibling file changed while watching a shared directory.
    Irrelevant(String),
}

/// How the platform names files in rename notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RenameSemantics {
    /// Events carry the affected path's new name.
    ReportsNewName,
    /// Events only ever carry the originally watched name.
    ReportsOldNameOnly,
    /// Unrecognized platform; take no automatic action on renames.
    Unknown,
}

/// Resolved once at startup, not per event.
pub(crate) fn rename_semantics() -> RenameSemantics {
    match std::env::consts::OS {
        "macos" => RenameSemantics::ReportsNewName,
        "linux" | "freebsd" | "windows" => RenameSemantics::ReportsOldNameOnly,
        _ => RenameSemantics::Unknown,
    }
}

/// An active watch on a tailed path.
///
/// Dropping the handle stops the watch; the engine clears its slot to
/// suppress late events that arrive before a settle delay elapses.
pub(crate) struct FileWatcher {
    _watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
    target: PathBuf,
    #[cfg(test)]
    watched_path: PathBuf,
    watching_parent: bool,
}

impl FileWatcher {
    /// Starts watching `target`, or its nearest existing ancestor
    /// directory when the target does not exist yet.
    pub(crate) async fn watch(target: &Path) -> Result<Self> {
        let watched_path = resolve_ancestor(target).await?;
        let watching_parent = watched_path != target;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(&watched_path, RecursiveMode::NonRecursive)?;
        info!(
            path = %watched_path.display(),
            watching_parent,
            "watching"
        );

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
            target: target.to_path_buf(),
            #[cfg(test)]
            watched_path,
            watching_parent,
        })
    }

    /// Waits for the next signal worth acting on. `None` means the
    /// platform side of the watch shut down.
    pub(crate) async fn next_signal(&mut self) -> Option<WatchSignal> {
        loop {
            let event = match self.receiver.recv().await? {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "watch error event");
                    continue;
                }
            };
            debug!(kind = ?event.kind, paths = ?event.paths, "watch event");
            if let Some(signal) = self.classify(&event) {
                return Some(signal);
            }
        }
    }

    fn classify(&self, event: &Event) -> Option<WatchSignal> {
        if self.watching_parent {
            if event.paths.is_empty() {
                return None;
            }
            let target_name = self.target.file_name()?.to_string_lossy();
            if !event_names_file(event, &target_name) {
                let name = event
                    .paths
                    .first()
                    .and_then(|path| path.file_name())
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                return Some(WatchSignal::Irrelevant(name));
            }
        }

        match event.kind {
            EventKind::Create(_) | EventKind::Remove(_) => Some(WatchSignal::PathChanged),
            EventKind::Modify(ModifyKind::Name(_)) => Some(WatchSignal::PathChanged),
            EventKind::Modify(ModifyKind::Metadata(_)) => None,
            EventKind::Modify(_) => Some(WatchSignal::Content),
            // Some backends only report a generic event for writes.
            EventKind::Any => Some(WatchSignal::Content),
            EventKind::Access(_) | EventKind::Other => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn watched_path(&self) -> &Path {
        &self.watched_path
    }

    #[cfg(test)]
    pub(crate) fn watching_parent(&self) -> bool {
        self.watching_parent
    }
}

/// Walks up from `target` until a path that exists is found, stopping
/// at the filesystem root.
pub(crate) async fn resolve_ancestor(target: &Path) -> Result<PathBuf> {
    let mut candidate = target.to_path_buf();
    loop {
        match tokio::fs::metadata(&candidate).await {
            Ok(_) => {
                debug!(path = %candidate.display(), "resolved ancestor");
                return Ok(candidate);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => match candidate.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    candidate = parent.to_path_buf();
                }
                // Filesystem apex; nothing further to walk.
                _ => return Ok(candidate),
            },
            Err(err) => return Err(err.into()),
        }
    }
}

/// True when any of the event's paths is named `target_file_name`.
pub(crate) fn event_names_file(event: &Event, target_file_name: &str) -> bool {
    event.paths.iter().any(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy() == target_file_name)
            .unwrap_or(false)
    })
}
