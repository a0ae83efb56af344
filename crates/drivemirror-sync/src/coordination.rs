//! Coordination between the reconciliation loop and the change dispatcher
//!
//! Both control paths act on the same names. [`NameLocks`] makes every
//! upload, download and delete of one name single-flight, while different
//! names proceed in parallel. [`EngineWrites`] remembers what the engine
//! itself left on disk, so the watcher events it caused can be told apart
//! from user changes. [`RecentNames`] records the dispatcher's uploads, so
//! reconciliation does not delete a file that was just pushed.

use std::fs::Metadata;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use drivemirror_core::domain::FileName;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

// ============================================================================
// NameLocks
// ============================================================================

/// Single-flight locks keyed by file name
#[derive(Debug, Default)]
pub struct NameLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Held while an operation on one name is in progress
#[derive(Debug)]
pub struct NameGuard {
    _guard: OwnedMutexGuard<()>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other operation holds `name`, then holds it
    pub async fn lock(&self, name: &FileName) -> NameGuard {
        // The map shard must not stay locked across the await.
        let mutex = self
            .locks
            .entry(name.as_str().to_string())
            .or_default()
            .clone();
        NameGuard {
            _guard: mutex.lock_owned().await,
        }
    }

    /// Drops entries that nobody holds or waits for
    pub fn prune(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

// ============================================================================
// RecentNames
// ============================================================================

/// Last time each name was touched
#[derive(Debug, Default)]
pub struct RecentNames {
    touched: DashMap<String, Instant>,
}

impl RecentNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `name` as touched now
    pub fn record(&self, name: &FileName) {
        self.touched.insert(name.as_str().to_string(), Instant::now());
    }

    /// True if `name` was touched at or after `instant`
    pub fn since(&self, name: &FileName, instant: Instant) -> bool {
        self.touched
            .get(name.as_str())
            .is_some_and(|at| *at >= instant)
    }

    /// Forgets names last touched longer than `window` ago
    pub fn expire(&self, window: Duration) {
        self.touched.retain(|_, at| at.elapsed() < window);
    }

    pub fn len(&self) -> usize {
        self.touched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
    }
}

// ============================================================================
// EngineWrites
// ============================================================================

/// A local change made by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineWrite {
    /// The engine left a file with this size and modification time
    Wrote { len: u64, modified: SystemTime },
    /// The engine removed the file
    Removed,
}

/// The engine's own local writes, used to recognise their watcher events
///
/// A file event is an echo only while the file still has the size and
/// mtime the engine left behind. A later edit by the user changes one of
/// them and is dispatched normally.
#[derive(Debug, Default)]
pub struct EngineWrites {
    writes: DashMap<String, (Instant, EngineWrite)>,
}

impl EngineWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the file the engine just wrote, as described by `metadata`
    ///
    /// Without a readable mtime nothing is recorded and later events for
    /// the name are dispatched.
    pub fn record_written(&self, name: &FileName, metadata: &Metadata) {
        match metadata.modified() {
            Ok(modified) => {
                let write = EngineWrite::Wrote {
                    len: metadata.len(),
                    modified,
                };
                self.writes
                    .insert(name.as_str().to_string(), (Instant::now(), write));
            }
            Err(_) => self.forget(name),
        }
    }

    /// Records that the engine removed `name`
    pub fn record_removed(&self, name: &FileName) {
        self.writes
            .insert(name.as_str().to_string(), (Instant::now(), EngineWrite::Removed));
    }

    /// The engine's last change to `name`, if made less than `window` ago
    pub fn recent(&self, name: &FileName, window: Duration) -> Option<EngineWrite> {
        self.writes
            .get(name.as_str())
            .filter(|entry| entry.0.elapsed() < window)
            .map(|entry| entry.1)
    }

    /// True if a file now described by `metadata` is still what the engine
    /// wrote less than `window` ago
    pub fn is_own_write(&self, name: &FileName, metadata: &Metadata, window: Duration) -> bool {
        match self.recent(name, window) {
            Some(EngineWrite::Wrote { len, modified }) => {
                len == metadata.len() && metadata.modified().is_ok_and(|m| m == modified)
            }
            _ => false,
        }
    }

    /// True if the engine removed `name` less than `window` ago
    pub fn is_own_removal(&self, name: &FileName, window: Duration) -> bool {
        self.recent(name, window) == Some(EngineWrite::Removed)
    }

    /// Drops whatever is recorded for `name`
    pub fn forget(&self, name: &FileName) {
        self.writes.remove(name.as_str());
    }

    /// Forgets writes made longer than `window` ago
    pub fn expire(&self, window: Duration) {
        self.writes.retain(|_, entry| entry.0.elapsed() < window);
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}
