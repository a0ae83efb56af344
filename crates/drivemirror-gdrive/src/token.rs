//! OAuth token persistence and access-token sources
//!
//! ## Components
//!
//! - [`Tokens`] - Access/refresh token pair with expiry
//! - [`FileTokenStorage`] - JSON token file, readable only by the owner
//! - [`AccessTokenSource`] - What the Drive client asks for a bearer token
//! - [`StaticTokenSource`] - Fixed token, for tests and short-lived tools
//! - [`RefreshingTokenSource`] - Refreshes and persists tokens as they expire

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::auth::PKCEFlow;
use crate::DriveError;

/// Refresh when the access token expires within this window
const REFRESH_MARGIN_SECS: i64 = 60;

// ============================================================================
// Tokens
// ============================================================================

/// OAuth tokens received from Google
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    /// Bearer token for authenticating API requests
    pub access_token: String,
    /// Token for refreshing the access token without user interaction
    /// (requires `access_type=offline`)
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// Returns true if the access token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the access token will expire within the given duration
    pub fn expires_within(&self, duration: Duration) -> bool {
        Utc::now() + duration >= self.expires_at
    }
}

// ============================================================================
// FileTokenStorage
// ============================================================================

/// Stores OAuth tokens as JSON in a single file
///
/// On Unix the file is created with mode `0600`. Writes go through a
/// sibling temp file and a rename so a crash never leaves a truncated token.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads tokens from the file
    ///
    /// # Returns
    /// `Some(Tokens)` if the file exists and parses, `None` if it does not exist
    pub fn load(&self) -> Result<Option<Tokens>> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No token file");
                return Ok(None);
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read {}", self.path.display())))
            }
        };
        let tokens: Tokens = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse token file {}", self.path.display()))?;
        debug!(path = %self.path.display(), "Loaded tokens");
        Ok(Some(tokens))
    }

    /// Writes tokens to the file, replacing any previous content
    pub fn store(&self, tokens: &Tokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_vec_pretty(tokens).context("Failed to serialize tokens")?;
        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, &json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), "Stored tokens");
        Ok(())
    }

    /// Removes the token file; a missing file is not an error
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Removed token file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to remove {}", self.path.display()))),
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, data)
}

// ============================================================================
// AccessTokenSource
// ============================================================================

/// Supplies bearer tokens to the Drive client
///
/// Implementations must be safe to call concurrently from the reconcile loop
/// and the watcher dispatcher.
#[async_trait::async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Returns a token that is valid for at least a short while
    async fn access_token(&self) -> Result<String, DriveError>;

    /// Marks the current token as rejected so the next call obtains a new one
    async fn invalidate(&self);
}

/// Always returns the same token
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl AccessTokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String, DriveError> {
        Ok(self.token.clone())
    }

    async fn invalidate(&self) {}
}

/// Token source that refreshes through the OAuth token endpoint
///
/// The current tokens sit behind a `tokio::sync::Mutex`, so concurrent
/// callers that find the token expiring trigger a single refresh. Every
/// refreshed token is written back to the token file.
pub struct RefreshingTokenSource {
    flow: PKCEFlow,
    storage: FileTokenStorage,
    tokens: Mutex<Tokens>,
}

impl RefreshingTokenSource {
    pub fn new(flow: PKCEFlow, storage: FileTokenStorage, tokens: Tokens) -> Self {
        Self {
            flow,
            storage,
            tokens: Mutex::new(tokens),
        }
    }

    /// Loads persisted tokens and makes sure they are usable right now
    ///
    /// Refreshes immediately when the stored access token is about to
    /// expire. Fails when no token file exists or the refresh is rejected,
    /// which the caller should treat as "interactive login required".
    pub async fn load(flow: PKCEFlow, storage: FileTokenStorage) -> Result<Self> {
        let tokens = storage.load()?.with_context(|| {
            format!(
                "No saved credentials at {}; run `drivemirrord auth login`",
                storage.path().display()
            )
        })?;
        let source = Self::new(flow, storage, tokens);
        source
            .access_token()
            .await
            .context("Saved credentials could not be refreshed")?;
        Ok(source)
    }

    async fn refresh_locked(&self, tokens: &mut Tokens) -> Result<(), DriveError> {
        let refresh_token = tokens.refresh_token.clone().ok_or_else(|| {
            DriveError::Token("access token expired and no refresh token is stored".into())
        })?;
        let fresh = self
            .flow
            .refresh_token(&refresh_token)
            .await
            .map_err(|e| DriveError::Token(format!("{e:#}")))?;
        self.storage
            .store(&fresh)
            .map_err(|e| DriveError::Token(format!("{e:#}")))?;
        *tokens = fresh;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AccessTokenSource for RefreshingTokenSource {
    async fn access_token(&self) -> Result<String, DriveError> {
        let mut tokens = self.tokens.lock().await;
        if tokens.expires_within(Duration::seconds(REFRESH_MARGIN_SECS)) {
            debug!("Access token expiring, refreshing");
            self.refresh_locked(&mut tokens).await?;
        }
        Ok(tokens.access_token.clone())
    }

    async fn invalidate(&self) {
        let mut tokens = self.tokens.lock().await;
        tokens.expires_at = Utc::now();
    }
}
