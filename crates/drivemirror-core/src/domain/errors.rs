//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! mostly validation failures raised while constructing newtypes.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid file name (empty, contains a separator, or is `.`/`..`)
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    /// Invalid remote ID format
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
