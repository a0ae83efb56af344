//! Busy-file detection
//!
//! Before reconciliation deletes a local file it asks [`BusyFileGuard`]
//! whether any process holds that file open. The guard scans every process
//! through the [`IProcessTable`] port; on Linux [`ProcfsProcessTable`]
//! implements it by reading the `/proc/<pid>/fd` symlinks.
//!
//! The scan is blocking and can take a while on a busy host, so async
//! callers run it through `tokio::task::spawn_blocking`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use drivemirror_core::ports::{IProcessTable, Pid};
use tracing::{debug, trace, warn};

// ============================================================================
// BusyFileGuard
// ============================================================================

/// Answers "is this file open in some process right now?"
#[derive(Clone)]
pub struct BusyFileGuard {
    table: Arc<dyn IProcessTable>,
}

impl BusyFileGuard {
    pub fn new(table: Arc<dyn IProcessTable>) -> Self {
        Self { table }
    }

    /// Returns true if any process has `path` open
    ///
    /// The candidate is canonicalised before comparison, so symlinked
    /// directories in `path` still match the kernel's view. Processes whose
    /// handles cannot be read (permission denied, exited mid-scan) are
    /// skipped. If the process list itself cannot be read the file is
    /// reported busy, so nothing gets deleted on a guess.
    pub fn is_in_use(&self, path: &Path) -> bool {
        let target = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        let pids = match self.table.processes() {
            Ok(pids) => pids,
            Err(e) => {
                warn!(
                    path = %target.display(),
                    error = %e,
                    "Cannot enumerate processes, treating file as busy"
                );
                return true;
            }
        };

        for pid in pids {
            match self.table.open_files(pid) {
                Ok(files) => {
                    if files.iter().any(|open| open == &target) {
                        debug!(path = %target.display(), pid, "File is open in another process");
                        return true;
                    }
                }
                Err(e) => trace!(pid, error = %e, "Skipping process"),
            }
        }

        false
    }
}

// ============================================================================
// ProcfsProcessTable
// ============================================================================

/// [`IProcessTable`] over a procfs mount
#[derive(Debug, Clone)]
pub struct ProcfsProcessTable {
    root: PathBuf,
}

impl Default for ProcfsProcessTable {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcfsProcessTable {
    /// Creates a table reading from `root` instead of `/proc`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl IProcessTable for ProcfsProcessTable {
    fn processes(&self) -> Result<Vec<Pid>> {
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read {}", self.root.display()))?;

        let mut pids: Vec<Pid> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse::<Pid>().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn open_files(&self, pid: Pid) -> Result<Vec<PathBuf>> {
        let fd_dir = self.root.join(pid.to_string()).join("fd");
        let entries = std::fs::read_dir(&fd_dir)
            .with_context(|| format!("Failed to read {}", fd_dir.display()))?;

        // Sockets, pipes and anon inodes link to pseudo paths like
        // `socket:[1234]`; only absolute targets are files.
        let files = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| std::fs::read_link(entry.path()).ok())
            .filter(|target| target.is_absolute())
            .collect();
        Ok(files)
    }
}
