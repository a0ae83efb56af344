//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the two identities the sync engine works
//! with: the opaque identifier the remote store assigns to an entry, and the
//! single-component file name that is the sync identity key on both sides.

use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// RemoteId
// ============================================================================

/// Opaque identifier of a remote entry (file or folder)
///
/// The engine never interprets the value; it only hands it back to the
/// remote store. The only constraints are that it is non-empty and free of
/// whitespace and quotes, since adapters embed it in query strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteId(String);

impl RemoteId {
    /// Create a new RemoteId
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains whitespace or quotes
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "Remote ID cannot be empty".to_string(),
            ));
        }

        if id
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '"' || c == '\\')
        {
            return Err(DomainError::InvalidRemoteId(format!(
                "Remote ID contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemoteId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemoteId> for String {
    fn from(id: RemoteId) -> Self {
        id.0
    }
}

// ============================================================================
// FileName
// ============================================================================

/// A single path component, compared case-sensitively
///
/// Name equality is the only identity key between the local directory and
/// the remote folder, so this type is what both sides are diffed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileName(String);

impl FileName {
    /// Create a new FileName
    ///
    /// # Errors
    /// Returns error if the name is empty, is `.` or `..`, or contains a
    /// path separator or NUL byte
    pub fn new(name: String) -> Result<Self, DomainError> {
        if name.is_empty() {
            return Err(DomainError::InvalidFileName(
                "File name cannot be empty".to_string(),
            ));
        }

        if name == "." || name == ".." {
            return Err(DomainError::InvalidFileName(format!(
                "File name cannot be a relative component: {name}"
            )));
        }

        if name.contains('/') || name.contains('\0') {
            return Err(DomainError::InvalidFileName(format!(
                "File name must be a single path component: {name}"
            )));
        }

        Ok(Self(name))
    }

    /// Extract the base name of `path`
    ///
    /// # Errors
    /// Returns error if the path has no final component or it is not UTF-8
    pub fn from_path(path: &Path) -> Result<Self, DomainError> {
        let name = path
            .file_name()
            .ok_or_else(|| DomainError::InvalidPath(path.display().to_string()))?;
        let name = name.to_str().ok_or_else(|| {
            DomainError::InvalidFileName(format!(
                "File name is not valid UTF-8: {}",
                path.display()
            ))
        })?;
        Self::new(name.to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FileName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for FileName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<FileName> for String {
    fn from(name: FileName) -> Self {
        name.0
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<Path> for FileName {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}
