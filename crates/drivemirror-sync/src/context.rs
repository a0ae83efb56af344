//! Shared state for both control paths
//!
//! A [`SyncContext`] is built once at startup and handed, behind an `Arc`,
//! to the reconciliation engine and the change dispatcher. Nothing in this
//! crate reads global state.

use std::sync::Arc;
use std::time::Duration;

use drivemirror_core::config::{Config, UploadStrategy};
use drivemirror_core::domain::{ExclusionSet, SyncFolderPair};
use drivemirror_core::ports::{IProcessTable, IRemoteStore};

use crate::busy::BusyFileGuard;
use crate::coordination::{EngineWrites, NameLocks, RecentNames};
use crate::SyncError;

/// Default window during which events matching the engine's own writes are
/// ignored by the change dispatcher
pub const DEFAULT_ECHO_WINDOW: Duration = Duration::from_secs(5);

/// Everything the engine and the dispatcher share
pub struct SyncContext {
    store: Arc<dyn IRemoteStore>,
    pair: SyncFolderPair,
    exclusions: ExclusionSet,
    busy: BusyFileGuard,
    upload_strategy: UploadStrategy,
    echo_window: Duration,
    locks: NameLocks,
    /// Files the engine wrote or deleted locally
    engine_writes: EngineWrites,
    /// Names the dispatcher uploaded
    uploads: RecentNames,
}

impl SyncContext {
    pub fn new(
        store: Arc<dyn IRemoteStore>,
        pair: SyncFolderPair,
        process_table: Arc<dyn IProcessTable>,
    ) -> Self {
        Self {
            store,
            pair,
            exclusions: ExclusionSet::new(),
            busy: BusyFileGuard::new(process_table),
            upload_strategy: UploadStrategy::default(),
            echo_window: DEFAULT_ECHO_WINDOW,
            locks: NameLocks::new(),
            engine_writes: EngineWrites::new(),
            uploads: RecentNames::new(),
        }
    }

    /// Builds a context from the loaded configuration
    ///
    /// # Errors
    /// Returns [`SyncError::DomainError`] if the folder pair in the config
    /// is unusable
    pub fn from_config(
        config: &Config,
        store: Arc<dyn IRemoteStore>,
        process_table: Arc<dyn IProcessTable>,
    ) -> Result<Self, SyncError> {
        Ok(Self::new(store, config.folder_pair()?, process_table)
            .with_exclusions(config.exclusion_set())
            .with_upload_strategy(config.sync.upload_strategy)
            .with_echo_window(Duration::from_secs(config.sync.echo_suppression_secs)))
    }

    pub fn with_exclusions(mut self, exclusions: ExclusionSet) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn with_upload_strategy(mut self, strategy: UploadStrategy) -> Self {
        self.upload_strategy = strategy;
        self
    }

    pub fn with_echo_window(mut self, window: Duration) -> Self {
        self.echo_window = window;
        self
    }

    pub fn store(&self) -> &dyn IRemoteStore {
        self.store.as_ref()
    }

    pub fn pair(&self) -> &SyncFolderPair {
        &self.pair
    }

    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    pub fn busy_guard(&self) -> &BusyFileGuard {
        &self.busy
    }

    pub fn upload_strategy(&self) -> UploadStrategy {
        self.upload_strategy
    }

    pub fn echo_window(&self) -> Duration {
        self.echo_window
    }

    pub fn locks(&self) -> &NameLocks {
        &self.locks
    }

    pub fn engine_writes(&self) -> &EngineWrites {
        &self.engine_writes
    }

    pub fn uploads(&self) -> &RecentNames {
        &self.uploads
    }
}
