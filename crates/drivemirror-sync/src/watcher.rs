//! Local change watcher
//!
//! Provides a [`FileWatcher`] that wraps the `notify` crate to monitor the
//! local root recursively, converting raw OS events into [`ChangeEvent`]
//! values delivered through a bounded channel.
//!
//! ## Architecture
//!
//! ```text
//! inotify / FSEvents
//!       │  (notify callback thread, blocking_send)
//!       ▼
//!  FileWatcher  ──→  mpsc::channel  ──→  LocalChangeDispatcher
//! ```
//!
//! There is no debouncing: every mapped notification becomes one event.

use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::SyncError;

// ============================================================================
// ChangeEvent
// ============================================================================

/// What happened to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A filesystem change under the local root
///
/// Decoupled from the `notify` crate's raw event types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub is_directory: bool,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self {
            kind,
            path: path.into(),
            is_directory,
        }
    }
}

// ============================================================================
// FileWatcher
// ============================================================================

/// Watches a directory tree using the OS-native mechanism
///
/// Dropping the watcher unsubscribes from the OS and closes the event
/// channel once the receiver has drained it.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    watched: Option<PathBuf>,
}

impl FileWatcher {
    /// Creates a watcher and the receiver its events arrive on
    ///
    /// `capacity` bounds the channel; when the dispatcher falls behind, the
    /// notify thread blocks rather than dropping events.
    ///
    /// # Errors
    /// Returns [`SyncError::Watch`] if the OS watcher cannot be created
    pub fn new(capacity: usize) -> Result<(Self, mpsc::Receiver<ChangeEvent>), SyncError> {
        let (tx, rx) = mpsc::channel::<ChangeEvent>(capacity.max(1));

        let watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for change in map_notify_event(&event) {
                        if tx.blocking_send(change).is_err() {
                            debug!("Change receiver dropped, discarding event");
                            return;
                        }
                    }
                }
                Err(err) => error!(error = %err, "File watcher error"),
            },
            notify::Config::default(),
        )
        .map_err(|e| SyncError::Watch(format!("Failed to create file watcher: {e}")))?;

        Ok((
            Self {
                watcher,
                watched: None,
            },
            rx,
        ))
    }

    /// Starts watching `path` recursively
    ///
    /// # Errors
    /// Returns [`SyncError::Watch`] if the path cannot be watched (does not
    /// exist, permission denied, inotify watch limit reached)
    pub fn watch(&mut self, path: &Path) -> Result<(), SyncError> {
        info!(path = %path.display(), "Starting recursive watch");
        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| SyncError::Watch(format!("Failed to watch {}: {e}", path.display())))?;
        self.watched = Some(path.to_path_buf());
        Ok(())
    }

    /// Stops watching the current path, if any
    pub fn unwatch(&mut self) {
        if let Some(path) = self.watched.take() {
            info!(path = %path.display(), "Stopping watch");
            if let Err(e) = self.watcher.unwatch(&path) {
                warn!(path = %path.display(), error = %e, "Failed to unwatch");
            }
        }
    }

    pub fn watched_path(&self) -> Option<&Path> {
        self.watched.as_deref()
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.unwatch();
    }
}

// ============================================================================
// Event mapping - notify::Event → ChangeEvent
// ============================================================================

/// Converts a `notify::Event` into zero or more [`ChangeEvent`]s
///
/// - `Create(*)` → `Created`
/// - `Modify(Data | Any)` → `Modified`
/// - `Remove(*)` → `Deleted`
/// - `Modify(Name(From))` → `Deleted`, `Modify(Name(To))` → `Created`
/// - `Modify(Name(Any))` (backends that cannot pair renames) → `Created` if
///   the path exists, else `Deleted`
/// - `Modify(Name(Both))` is ignored; inotify already reported its halves
/// - metadata, access and other events are ignored
pub fn map_notify_event(event: &notify::Event) -> Vec<ChangeEvent> {
    let kind = match &event.kind {
        EventKind::Create(create) => {
            let is_dir = matches!(create, CreateKind::Folder);
            return map_paths(event, ChangeKind::Created, Some(is_dir));
        }
        EventKind::Remove(remove) => {
            let is_dir = match remove {
                RemoveKind::Folder => Some(true),
                RemoveKind::File => Some(false),
                _ => None,
            };
            return map_paths(event, ChangeKind::Deleted, is_dir);
        }
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            ChangeKind::Modified
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Deleted,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
            return event
                .paths
                .iter()
                .map(|path| {
                    let kind = if path.exists() {
                        ChangeKind::Created
                    } else {
                        ChangeKind::Deleted
                    };
                    ChangeEvent::new(kind, path.clone(), path.is_dir())
                })
                .collect();
        }
        other => {
            trace!(kind = ?other, "Ignoring event kind");
            return Vec::new();
        }
    };
    map_paths(event, kind, None)
}

/// One event per path; `is_dir` falls back to looking at the filesystem
fn map_paths(event: &notify::Event, kind: ChangeKind, is_dir: Option<bool>) -> Vec<ChangeEvent> {
    event
        .paths
        .iter()
        .map(|path| {
            let is_directory = is_dir.unwrap_or_else(|| path.is_dir());
            debug!(path = %path.display(), ?kind, is_directory, "Mapped notify event");
            ChangeEvent::new(kind, path.clone(), is_directory)
        })
        .collect()
}
