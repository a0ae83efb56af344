//! Reconciliation engine
//!
//! One [`ReconciliationEngine::reconcile`] call is a full cycle:
//!
//! 1. **List** the remote folder and the top level of the local root
//! 2. **Download** every remote name that is missing locally
//! 3. **Delete locally** every regular file whose name is missing remotely,
//!    unless it is excluded, open in another process, or was created or
//!    uploaded while the cycle was running
//!
//! Remote files are never deleted by a cycle, and directories are never
//! touched. Per-file failures are collected into the [`CycleReport`] and do
//! not stop the cycle.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use drivemirror_core::domain::{FileName, RemoteFile};
use tracing::{debug, info, warn};

use crate::context::SyncContext;
use crate::SyncError;

/// Suffix of the temp file a download is written to before the rename
const PARTIAL_SUFFIX: &str = ".drivemirror-partial";

/// Temp file used while downloading `name`
pub fn partial_path(root: &Path, name: &FileName) -> PathBuf {
    root.join(format!(".{}{}", name.as_str(), PARTIAL_SUFFIX))
}

/// True for names produced by [`partial_path`]
pub fn is_partial_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX)
}

// ============================================================================
// CycleReport
// ============================================================================

/// What one reconciliation cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Names downloaded from the remote folder
    pub downloaded: Vec<FileName>,
    /// Names deleted from the local root
    pub deleted: Vec<FileName>,
    /// Names left in place because another process had them open
    pub skipped_busy: Vec<FileName>,
    /// Names left in place because they changed while the cycle ran
    pub deferred: Vec<FileName>,
    /// Names whose operation failed, with the error
    pub failures: Vec<(FileName, String)>,
}

impl CycleReport {
    /// True if the cycle changed nothing and hit no problem
    pub fn is_noop(&self) -> bool {
        self.downloaded.is_empty()
            && self.deleted.is_empty()
            && self.skipped_busy.is_empty()
            && self.deferred.is_empty()
            && self.failures.is_empty()
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} deleted, {} busy, {} deferred, {} failed",
            self.downloaded.len(),
            self.deleted.len(),
            self.skipped_busy.len(),
            self.deferred.len(),
            self.failures.len()
        )
    }
}

/// Result of trying to delete one local file
#[derive(Debug, PartialEq, Eq)]
enum LocalDelete {
    Deleted,
    Busy,
    Deferred,
}

/// One top-level local entry
#[derive(Debug)]
struct LocalEntry {
    name: FileName,
    is_file: bool,
}

// ============================================================================
// ReconciliationEngine
// ============================================================================

/// Periodic full-listing diff between the local root and the remote folder
pub struct ReconciliationEngine {
    ctx: Arc<SyncContext>,
}

impl ReconciliationEngine {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    /// Runs one reconciliation cycle
    ///
    /// # Errors
    /// - [`SyncError::Auth`] / [`SyncError::RemoteList`] if the remote
    ///   folder cannot be listed
    /// - [`SyncError::LocalIo`] if the local root cannot be read
    ///
    /// Failures of individual downloads and deletes are reported in the
    /// returned [`CycleReport`] instead.
    #[tracing::instrument(skip(self), fields(root = %self.ctx.pair().local_root().display()))]
    pub async fn reconcile(&self) -> Result<CycleReport, SyncError> {
        let started = SystemTime::now();
        let cycle_start = tokio::time::Instant::now();
        let mut report = CycleReport::default();

        let remote_files = self
            .ctx
            .store()
            .list(self.ctx.pair().remote_folder_id())
            .await
            .map_err(SyncError::remote_list)?;
        let local_entries = self.list_local().await?;

        debug!(
            remote = remote_files.len(),
            local = local_entries.len(),
            "Listed both sides"
        );

        let local_names: HashSet<&str> = local_entries.iter().map(|e| e.name.as_str()).collect();
        let remote_names: HashSet<&str> = remote_files.iter().map(|f| f.name.as_str()).collect();

        // Remote -> local. Duplicated remote names: the first listed wins.
        let mut seen = HashSet::new();
        for file in &remote_files {
            if local_names.contains(file.name.as_str()) || !seen.insert(file.name.as_str()) {
                continue;
            }
            match self.download(file).await {
                Ok(true) => report.downloaded.push(file.name.clone()),
                Ok(false) => {}
                Err(e) => {
                    warn!(name = %file.name, error = %e, "Download failed");
                    if e.is_auth() {
                        return Err(e);
                    }
                    report.failures.push((file.name.clone(), e.to_string()));
                }
            }
        }

        // Local -> gone. Directories and excluded names are never deleted.
        for entry in &local_entries {
            let name = &entry.name;
            if remote_names.contains(name.as_str()) {
                continue;
            }
            if !entry.is_file {
                debug!(name = %name, "Not a regular file, leaving in place");
                continue;
            }
            if self.ctx.exclusions().contains(name.as_str()) {
                debug!(name = %name, "Excluded, leaving in place");
                continue;
            }
            match self.delete_local(name, started, cycle_start).await {
                Ok(LocalDelete::Deleted) => report.deleted.push(name.clone()),
                Ok(LocalDelete::Busy) => report.skipped_busy.push(name.clone()),
                Ok(LocalDelete::Deferred) => report.deferred.push(name.clone()),
                Err(e) => {
                    warn!(name = %name, error = %e, "Local delete failed");
                    report.failures.push((name.clone(), e.to_string()));
                }
            }
        }

        self.ctx.locks().prune();
        self.ctx.engine_writes().expire(self.ctx.echo_window());
        // Uploads older than this cycle cannot defer a later one
        self.ctx.uploads().expire(cycle_start.elapsed());

        info!(%report, "Reconciliation cycle finished");
        Ok(report)
    }

    /// Top-level entries of the local root, without partial downloads
    async fn list_local(&self) -> Result<Vec<LocalEntry>, SyncError> {
        let root = self.ctx.pair().local_root();
        let mut dir = tokio::fs::read_dir(root)
            .await
            .map_err(|e| SyncError::local_io(root, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| SyncError::local_io(root, e))?
        {
            let Some(raw) = entry.file_name().to_str().map(str::to_string) else {
                debug!(path = %entry.path().display(), "Skipping non UTF-8 name");
                continue;
            };
            if is_partial_name(&raw) {
                continue;
            }
            let name = match FileName::new(raw) {
                Ok(name) => name,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "Skipping unusable name");
                    continue;
                }
            };
            let is_file = match entry.file_type().await {
                Ok(file_type) => file_type.is_file(),
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "Cannot stat entry");
                    false
                }
            };
            entries.push(LocalEntry { name, is_file });
        }
        Ok(entries)
    }

    /// Downloads `file` into the local root through a temp file
    ///
    /// # Returns
    /// `false` if a local file with that name appeared before the lock was
    /// acquired, so nothing was downloaded
    async fn download(&self, file: &RemoteFile) -> Result<bool, SyncError> {
        let _guard = self.ctx.locks().lock(&file.name).await;

        let root = self.ctx.pair().local_root();
        let dest = self.ctx.pair().local_path(&file.name);
        if tokio::fs::symlink_metadata(&dest).await.is_ok() {
            debug!(name = %file.name, "Appeared locally meanwhile, not downloading");
            return Ok(false);
        }

        let partial = partial_path(root, &file.name);
        let bytes = match self.ctx.store().download(&file.id, &partial).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(SyncError::remote_transfer(file.name.as_str(), e));
            }
        };

        if let Err(e) = tokio::fs::rename(&partial, &dest).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(SyncError::local_io(dest, e));
        }
        match tokio::fs::metadata(&dest).await {
            Ok(metadata) => self.ctx.engine_writes().record_written(&file.name, &metadata),
            Err(e) => debug!(name = %file.name, error = %e, "Cannot stat download"),
        }

        info!(name = %file.name, bytes, "Downloaded");
        Ok(true)
    }

    /// Deletes one local file unless it is busy or changed during the cycle
    async fn delete_local(
        &self,
        name: &FileName,
        started: SystemTime,
        cycle_start: tokio::time::Instant,
    ) -> Result<LocalDelete, SyncError> {
        let _guard = self.ctx.locks().lock(name).await;
        let path = self.ctx.pair().local_path(name);

        if self.ctx.uploads().since(name, cycle_start) {
            debug!(name = %name, "Uploaded during this cycle, not deleting");
            return Ok(LocalDelete::Deferred);
        }

        let metadata = match tokio::fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(name = %name, "Already gone");
                return Ok(LocalDelete::Deferred);
            }
            Err(e) => return Err(SyncError::local_io(path, e)),
        };
        // Future mtimes (clock skew, extracted archives) do not count
        let changed_during_cycle = metadata
            .modified()
            .is_ok_and(|modified| modified >= started && modified <= SystemTime::now());
        if changed_during_cycle {
            debug!(name = %name, "Modified during this cycle, not deleting");
            return Ok(LocalDelete::Deferred);
        }

        let guard = self.ctx.busy_guard().clone();
        let candidate = path.clone();
        let busy = tokio::task::spawn_blocking(move || guard.is_in_use(&candidate))
            .await
            .unwrap_or_else(|e| {
                warn!(name = %name, error = %e, "Busy check did not complete, treating as busy");
                true
            });
        if busy {
            warn!(
                name = %name,
                error = %SyncError::FileBusy(path),
                "Skipping delete of a file open in another process"
            );
            return Ok(LocalDelete::Busy);
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                self.ctx.engine_writes().record_removed(name);
                info!(name = %name, "Deleted locally (no longer in remote folder)");
                Ok(LocalDelete::Deleted)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LocalDelete::Deferred),
            Err(e) => Err(SyncError::local_io(path, e)),
        }
    }
}
