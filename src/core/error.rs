//! Domain-specific error types and error handling utilities.
//!
//! This module defines [`SyncError`] which covers every failure the tracker can run
//! into, from a missing `sf` binary to a malformed JSON payload. It uses `thiserror`
//! for ergonomic error definitions and includes constructors for the common cases.
//!
//! # Public API
//! - [`SyncError`]: Main error enum covering all failure modes
//! - [`ErrorKind`]: Copyable classification of a failure, safe to store in caches
//! - [`SyncFailure`]: Cloneable kind + message pair carried by cached entries
//! - [`Result<T>`]: Type alias for `std::result::Result<T, SyncError>`
//!
//! # Error Categories
//! - **Connection**: CLI missing, no default org, expired credentials
//! - **Terminal states**: component absent remotely, unsupported local file
//! - **Transient**: timeouts, process failures, unparseable responses
//! - **Local**: I/O, JSON, configuration and snapshot errors

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Domain-specific error types for sf-sync-tracker
#[derive(Error, Debug)]
pub enum SyncError {
    // Connection errors
    #[error("Not connected to an org: {message}")]
    NotConnected { message: String },

    #[error("Salesforce CLI not found: {message}")]
    CliMissing { message: String },

    #[error("Org authorization expired: {message}")]
    AuthExpired { message: String },

    // Terminal remote/local states
    #[error("Component not found in org: {name}")]
    NotFound { name: String },

    #[error("Unsupported file type: {path}")]
    UnsupportedFileType { path: PathBuf },

    // Transient remote failures
    #[error("Command timed out after {}s: {command}", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("Remote command failed: {stderr}")]
    ProcessFailure { stderr: String },

    #[error("Failed to parse CLI response: {message}")]
    ParseFailure { message: String },

    // Local errors
    #[error("Not in a Salesforce project (no sfdx-project.json found)")]
    NotInProject,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not find configuration directory")]
    ConfigDirectoryNotFound,

    #[error("Failed to create directory '{path}': {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Snapshot file does not exist at '{path}'. Run 'sf-sync scan' first.")]
    SnapshotNotFound { path: PathBuf },

    #[error("Failed to parse snapshot file '{path}': {source}")]
    SnapshotParseFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Background task failed: {message}")]
    TaskFailed { message: String },
}

/// Convenience type alias for Results using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

/// Classification of a failure, independent of the error payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotConnected,
    CliMissing,
    AuthExpired,
    NotFound,
    UnsupportedFileType,
    Timeout,
    ProcessFailure,
    ParseFailure,
}

impl ErrorKind {
    /// Terminal kinds describe a stable fact rather than a failed attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ErrorKind::NotFound | ErrorKind::UnsupportedFileType)
    }

    /// Transient kinds must never be written to a cache so the next access retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::ProcessFailure | ErrorKind::ParseFailure
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::CliMissing => "cli_missing",
            ErrorKind::AuthExpired => "auth_expired",
            ErrorKind::NotFound => "not_found",
            ErrorKind::UnsupportedFileType => "unsupported_file_type",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ProcessFailure => "process_failure",
            ErrorKind::ParseFailure => "parse_failure",
        }
    }

    /// Actionable hint shown next to a connection indicator
    pub fn remediation_hint(&self) -> Option<&'static str> {
        match self {
            ErrorKind::CliMissing => {
                Some("Install the Salesforce CLI: npm install --global @salesforce/cli")
            }
            ErrorKind::NotConnected => {
                Some("Authorize an org: sf org login web --set-default")
            }
            ErrorKind::AuthExpired => {
                Some("Re-authorize the org: sf org login web --set-default")
            }
            ErrorKind::Timeout => Some("The org did not answer in time; try again shortly"),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failure as stored in caches and shared between single-flight waiters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Limit that expired, kept so a timeout converts back into [`SyncError::Timeout`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl SyncFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timeout: None,
        }
    }
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<&SyncError> for SyncFailure {
    fn from(err: &SyncError) -> Self {
        let mut failure = SyncFailure::new(err.kind(), err.to_string());
        if let SyncError::Timeout { timeout, .. } = err {
            failure.timeout = Some(*timeout);
        }
        failure
    }
}

impl From<SyncError> for SyncFailure {
    fn from(err: SyncError) -> Self {
        SyncFailure::from(&err)
    }
}

impl From<SyncFailure> for SyncError {
    fn from(failure: SyncFailure) -> Self {
        let SyncFailure {
            kind,
            message,
            timeout,
        } = failure;
        // The stored message is the original error's Display; drop its prefix.
        let message = match message.split_once(": ") {
            Some((_, detail)) => detail.to_string(),
            None => message,
        };
        match kind {
            ErrorKind::NotConnected => SyncError::NotConnected { message },
            ErrorKind::CliMissing => SyncError::CliMissing { message },
            ErrorKind::AuthExpired => SyncError::AuthExpired { message },
            ErrorKind::NotFound => SyncError::NotFound { name: message },
            ErrorKind::UnsupportedFileType => SyncError::UnsupportedFileType {
                path: PathBuf::from(message),
            },
            ErrorKind::ParseFailure => SyncError::ParseFailure { message },
            ErrorKind::Timeout => SyncError::Timeout {
                command: message,
                timeout: timeout.unwrap_or_default(),
            },
            ErrorKind::ProcessFailure => SyncError::ProcessFailure { stderr: message },
        }
    }
}

impl SyncError {
    /// Map this error onto the cacheable taxonomy.
    ///
    /// Local errors that have no remote counterpart (I/O, JSON, snapshot) are
    /// reported as process failures so they are never cached.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::NotConnected { .. } => ErrorKind::NotConnected,
            SyncError::CliMissing { .. } => ErrorKind::CliMissing,
            SyncError::AuthExpired { .. } => ErrorKind::AuthExpired,
            SyncError::NotFound { .. } => ErrorKind::NotFound,
            SyncError::UnsupportedFileType { .. } => ErrorKind::UnsupportedFileType,
            SyncError::Timeout { .. } => ErrorKind::Timeout,
            SyncError::ParseFailure { .. } | SyncError::Json(_) => ErrorKind::ParseFailure,
            _ => ErrorKind::ProcessFailure,
        }
    }

    pub fn remediation_hint(&self) -> Option<&'static str> {
        self.kind().remediation_hint()
    }

    /// Create a not connected error
    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::NotConnected {
            message: message.into(),
        }
    }

    /// Create a CLI missing error
    pub fn cli_missing(message: impl Into<String>) -> Self {
        Self::CliMissing {
            message: message.into(),
        }
    }

    /// Create an auth expired error
    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self::AuthExpired {
            message: message.into(),
        }
    }

    /// Create a not found error for a remote component
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create an unsupported file type error
    pub fn unsupported_file_type(path: impl Into<PathBuf>) -> Self {
        Self::UnsupportedFileType { path: path.into() }
    }

    /// Create a timeout error
    pub fn timeout(command: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            command: command.into(),
            timeout,
        }
    }

    /// Create a process failure error
    pub fn process_failure(stderr: impl Into<String>) -> Self {
        Self::ProcessFailure {
            stderr: stderr.into(),
        }
    }

    /// Create a parse failure error
    pub fn parse_failure(message: impl Into<String>) -> Self {
        Self::ParseFailure {
            message: message.into(),
        }
    }

    /// Create a directory creation failed error
    pub fn directory_creation_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreationFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a snapshot not found error
    pub fn snapshot_not_found(path: impl Into<PathBuf>) -> Self {
        Self::SnapshotNotFound { path: path.into() }
    }

    /// Create a snapshot parse failed error
    pub fn snapshot_parse_failed(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::SnapshotParseFailed {
            path: path.into(),
            source,
        }
    }
}
