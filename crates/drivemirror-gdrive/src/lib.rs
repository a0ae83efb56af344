//! drivemirror Google Drive adapter
//!
//! Provides an async client for:
//! - OAuth2 authentication (installed-app Authorization Code with PKCE)
//! - Folder-scoped file operations via the Drive v3 REST API
//! - Resumable chunked uploads and streamed downloads
//!
//! ## Modules
//!
//! - [`auth`] - OAuth2 PKCE authentication flow components
//! - [`token`] - Token persistence and access-token sources
//! - [`client`] - Drive v3 HTTP client
//! - [`retry`] - Exponential backoff for transient failures
//! - [`upload`] - Resumable upload sessions
//! - [`provider`] - [`IRemoteStore`](drivemirror_core::ports::IRemoteStore) implementation

pub mod auth;
pub mod client;
pub mod provider;
pub mod retry;
pub mod token;
pub mod upload;

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::retry::parse_retry_after;

/// Errors that can occur when communicating with the Google Drive API
#[derive(Debug, Error)]
pub enum DriveError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions, or the operation is not allowed on this file
    #[error("Forbidden ({reason}): {message}")]
    Forbidden {
        /// Google error reason, e.g. `fileNotDownloadable`
        reason: String,
        /// Human-readable message from the API
        message: String,
    },

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded (HTTP 429, or 403 with a rate-limit reason)
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Duration from the `Retry-After` header, if the server sent one
        retry_after: Option<Duration>,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error {status}: {message}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Message from the response body
        message: String,
    },

    /// Any other unexpected HTTP status
    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Message from the response body
        message: String,
    },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The OAuth2 token could not be obtained or refreshed
    #[error("Token error: {0}")]
    Token(String),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Local file I/O failed during a transfer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Google's JSON error envelope
#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<GoogleErrorItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorItem {
    reason: Option<String>,
}

/// 403 reasons that mean "slow down" rather than "not allowed"
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

impl DriveError {
    /// Returns true if the same request may succeed when retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::ServerError { .. } => true,
            Self::NetworkError(e) => !e.is_decode() && !e.is_builder(),
            _ => false,
        }
    }

    /// Server-requested delay before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Classifies a non-success response, consuming its body
    pub(crate) async fn from_response(response: Response) -> Self {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(|v| parse_retry_after(v, Duration::from_secs(1)));
        let body = response.text().await.unwrap_or_default();
        Self::classify(status, retry_after, &body)
    }

    fn classify(status: StatusCode, retry_after: Option<Duration>, body: &str) -> Self {
        let parsed = serde_json::from_str::<GoogleErrorBody>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|b| b.error.message.clone())
            .unwrap_or_else(|| body.trim().to_string());
        let reason = parsed
            .as_ref()
            .and_then(|b| b.error.errors.iter().find_map(|e| e.reason.clone()))
            .unwrap_or_default();

        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized(message),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited { retry_after },
            StatusCode::FORBIDDEN if RATE_LIMIT_REASONS.contains(&reason.as_str()) => {
                Self::RateLimited { retry_after }
            }
            StatusCode::FORBIDDEN => Self::Forbidden { reason, message },
            StatusCode::NOT_FOUND => Self::NotFound(message),
            s if s.is_server_error() => Self::ServerError {
                status: s.as_u16(),
                message,
            },
            s => Self::UnexpectedStatus {
                status: s.as_u16(),
                message,
            },
        }
    }
}
