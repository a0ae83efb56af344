//! Configuration module for drivemirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, ExclusionSet, RemoteId, SyncFolderPair};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for drivemirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub transfer: TransferConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub service: ServiceConfig,
}

/// How a local create/modify event is pushed to the remote folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStrategy {
    /// Update the first remote file with the same name, or create one.
    #[default]
    Upsert,
    /// Always create a new remote entry, even if the name already exists.
    AlwaysCreate,
}

impl std::fmt::Display for UploadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upsert => write!(f, "upsert"),
            Self::AlwaysCreate => write!(f, "always_create"),
        }
    }
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local directory mirrored against the remote folder.
    pub root: PathBuf,
    /// Identifier of the remote folder. `None` until the user sets it.
    pub remote_folder_id: Option<String>,
    /// Seconds between reconciliation cycles.
    pub reconcile_interval: u64,
    /// Strategy for watcher-driven uploads.
    pub upload_strategy: UploadStrategy,
    /// Literal file names reconciliation never deletes locally.
    pub exclusions: Vec<String>,
    /// Seconds during which watcher events caused by the engine's own
    /// downloads and deletions are ignored.
    pub echo_suppression_secs: u64,
    /// Capacity of the watcher event channel.
    pub event_queue_capacity: usize,
}

/// Transfer settings passed to the remote store adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Resumable upload chunk size in KiB. Must be a multiple of 256.
    pub chunk_size_kib: u64,
    /// Retries per request for transient failures.
    pub num_retries: u32,
}

/// Authentication / OAuth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client secrets file downloaded from the cloud console.
    pub client_secrets: PathBuf,
    /// Where the authorized token is persisted.
    pub token_file: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Log file. `None` logs to stderr.
    pub file: Option<PathBuf>,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

/// Service host settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Seconds to wait for in-flight work after a stop signal.
    pub shutdown_timeout_secs: u64,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write the configuration as YAML to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/drivemirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        config_dir().join("config.yaml")
    }

    /// Build the folder pair from `sync.root` and `sync.remote_folder_id`.
    pub fn folder_pair(&self) -> Result<SyncFolderPair, DomainError> {
        let folder_id = self.sync.remote_folder_id.clone().ok_or_else(|| {
            DomainError::ValidationFailed("sync.remote_folder_id is not set".to_string())
        })?;
        SyncFolderPair::new(expand_tilde(&self.sync.root), RemoteId::new(folder_id)?)
    }

    /// The configured exclusions plus the base names of the program's own
    /// files (client secrets, token file, log file).
    pub fn exclusion_set(&self) -> ExclusionSet {
        let mut set: ExclusionSet = self.sync.exclusions.iter().cloned().collect();
        set.insert_file_of(&self.auth.client_secrets);
        set.insert_file_of(&self.auth.token_file);
        if let Some(file) = &self.logging.file {
            set.insert_file_of(file);
        }
        set
    }
}

/// `$XDG_CONFIG_HOME/drivemirror`
fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("drivemirror")
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

// Config derives Default because all its fields implement Default.
// (clippy::derivable_impls)

/// Names protected by default: the OAuth files and the log files a
/// previous install may have left in the synced directory.
const DEFAULT_EXCLUSIONS: &[&str] = &[
    "credentials.json",
    "token.json",
    "sync_log.log",
    "service_log.log",
];

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("DriveMirror"),
            remote_folder_id: None,
            reconcile_interval: 60,
            upload_strategy: UploadStrategy::default(),
            exclusions: DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
            echo_suppression_secs: 5,
            event_queue_capacity: 256,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size_kib: 8 * 1024,
            num_retries: 5,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        let dir = config_dir();
        Self {
            client_secrets: dir.join("credentials.json"),
            token_file: dir.join("token.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("drivemirror");
        Self {
            level: "info".to_string(),
            file: Some(data_dir.join("sync_log.log")),
            json: false,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.reconcile_interval"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Resumable upload chunks must be a multiple of this many KiB.
pub const CHUNK_GRANULARITY_KIB: u64 = 256;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.reconcile_interval == 0 {
            errors.push(ValidationError {
                field: "sync.reconcile_interval".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.event_queue_capacity == 0 {
            errors.push(ValidationError {
                field: "sync.event_queue_capacity".into(),
                message: "must be greater than 0".into(),
            });
        }

        match &self.sync.remote_folder_id {
            None => errors.push(ValidationError {
                field: "sync.remote_folder_id".into(),
                message: "is not set".into(),
            }),
            Some(id) => {
                if let Err(e) = RemoteId::new(id.clone()) {
                    errors.push(ValidationError {
                        field: "sync.remote_folder_id".into(),
                        message: e.to_string(),
                    });
                }
            }
        }

        // Check sync root only when it does not start with `~` (tilde is expanded at runtime).
        let root_str = self.sync.root.to_string_lossy();
        if !root_str.starts_with('~') {
            if !self.sync.root.is_absolute() {
                errors.push(ValidationError {
                    field: "sync.root".into(),
                    message: format!("must be an absolute path: {}", self.sync.root.display()),
                });
            } else if !self.sync.root.is_dir() {
                errors.push(ValidationError {
                    field: "sync.root".into(),
                    message: format!("directory does not exist: {}", self.sync.root.display()),
                });
            }
        }

        for name in &self.sync.exclusions {
            if name.is_empty() || name.contains('/') {
                errors.push(ValidationError {
                    field: "sync.exclusions".into(),
                    message: format!("'{name}' must be a bare file name"),
                });
            }
        }

        // --- transfer ---
        if self.transfer.chunk_size_kib == 0
            || self.transfer.chunk_size_kib % CHUNK_GRANULARITY_KIB != 0
        {
            errors.push(ValidationError {
                field: "transfer.chunk_size_kib".into(),
                message: format!(
                    "must be a positive multiple of {CHUNK_GRANULARITY_KIB} (got {})",
                    self.transfer.chunk_size_kib
                ),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        // --- service ---
        if self.service.shutdown_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "service.shutdown_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use drivemirror_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .sync_root(PathBuf::from("/home/user/DriveMirror"))
///     .sync_remote_folder_id("1AbCdEf")
///     .sync_reconcile_interval(120)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_root(mut self, root: PathBuf) -> Self {
        self.config.sync.root = root;
        self
    }

    pub fn sync_remote_folder_id(mut self, id: impl Into<String>) -> Self {
        self.config.sync.remote_folder_id = Some(id.into());
        self
    }

    pub fn sync_reconcile_interval(mut self, seconds: u64) -> Self {
        self.config.sync.reconcile_interval = seconds;
        self
    }

    pub fn sync_upload_strategy(mut self, strategy: UploadStrategy) -> Self {
        self.config.sync.upload_strategy = strategy;
        self
    }

    pub fn sync_exclusions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.sync.exclusions = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn sync_echo_suppression_secs(mut self, seconds: u64) -> Self {
        self.config.sync.echo_suppression_secs = seconds;
        self
    }

    // --- transfer ---

    pub fn transfer_chunk_size_kib(mut self, kib: u64) -> Self {
        self.config.transfer.chunk_size_kib = kib;
        self
    }

    pub fn transfer_num_retries(mut self, n: u32) -> Self {
        self.config.transfer.num_retries = n;
        self
    }

    // --- auth ---

    pub fn auth_client_secrets(mut self, path: PathBuf) -> Self {
        self.config.auth.client_secrets = path;
        self
    }

    pub fn auth_token_file(mut self, path: PathBuf) -> Self {
        self.config.auth.token_file = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_file(mut self, file: Option<PathBuf>) -> Self {
        self.config.logging.file = file;
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- service ---

    pub fn service_shutdown_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.service.shutdown_timeout_secs = seconds;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
