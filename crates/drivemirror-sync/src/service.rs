//! Sync service lifecycle
//!
//! [`SyncService::start`] wires both control paths to one shared
//! [`SyncContext`]:
//!
//! - the [`FileWatcher`] feeding the [`LocalChangeDispatcher`]
//! - the [`ReconcileScheduler`] driving the [`ReconciliationEngine`]
//!
//! [`RunningService::stop`] halts the timer, unsubscribes the watcher and
//! waits, up to a deadline, for in-flight work to finish.

use std::sync::Arc;
use std::time::Duration;

use drivemirror_core::config::SyncConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::SyncContext;
use crate::dispatcher::LocalChangeDispatcher;
use crate::reconcile::ReconciliationEngine;
use crate::scheduler::ReconcileScheduler;
use crate::watcher::FileWatcher;
use crate::SyncError;

/// Default seconds between reconciliation cycles
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Default capacity of the change event channel
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 256;

/// Both control paths, not yet started
pub struct SyncService {
    ctx: Arc<SyncContext>,
    interval: Duration,
    queue_capacity: usize,
}

impl SyncService {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self {
            ctx,
            interval: DEFAULT_RECONCILE_INTERVAL,
            queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
        }
    }

    /// Creates a service with the interval and queue size from `config`
    pub fn from_config(ctx: Arc<SyncContext>, config: &SyncConfig) -> Self {
        Self::new(ctx)
            .with_interval(Duration::from_secs(config.reconcile_interval))
            .with_queue_capacity(config.event_queue_capacity)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Subscribes to filesystem notifications and spawns both tasks
    ///
    /// # Errors
    /// Returns [`SyncError::Watch`] if the local root cannot be watched
    pub fn start(self) -> Result<RunningService, SyncError> {
        let root = self.ctx.pair().local_root().to_path_buf();
        let (mut watcher, rx) = FileWatcher::new(self.queue_capacity)?;
        watcher.watch(&root)?;

        let cancel = CancellationToken::new();

        let dispatcher = LocalChangeDispatcher::new(self.ctx.clone());
        let dispatcher_task = tokio::spawn(dispatcher.run(rx, cancel.child_token()));

        let engine = Arc::new(ReconciliationEngine::new(self.ctx.clone()));
        let scheduler = ReconcileScheduler::new(engine, self.interval);
        let scheduler_task = tokio::spawn(scheduler.run(cancel.child_token()));

        info!(
            root = %root.display(),
            folder = %self.ctx.pair().remote_folder_id(),
            strategy = %self.ctx.upload_strategy(),
            "Sync service started"
        );

        Ok(RunningService {
            cancel,
            watcher: Some(watcher),
            tasks: vec![dispatcher_task, scheduler_task],
        })
    }
}

/// Handle to a started [`SyncService`]
pub struct RunningService {
    cancel: CancellationToken,
    watcher: Option<FileWatcher>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningService {
    /// Token that stops the service when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops both control paths
    ///
    /// # Returns
    /// `true` if both tasks finished within `timeout`; otherwise they are
    /// aborted and `false` is returned
    pub async fn stop(mut self, timeout: Duration) -> bool {
        info!("Stopping sync service");
        self.cancel.cancel();
        drop(self.watcher.take());

        let tasks = std::mem::take(&mut self.tasks);
        let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();
        let joined = tokio::time::timeout(timeout, async move {
            for task in tasks {
                if let Err(e) = task.await {
                    warn!(error = %e, "Sync task ended abnormally");
                }
            }
        })
        .await;

        match joined {
            Ok(()) => {
                info!("Sync service stopped");
                true
            }
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "In-flight work did not finish in time, aborting"
                );
                for abort in aborts {
                    abort.abort();
                }
                false
            }
        }
    }
}
