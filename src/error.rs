//! Error types for repack-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error variants (transport, format, not-found, I/O, name collision)
//! - The pipeline [`Stage`] at which each error occurred
//! - Structured error reports with machine-readable error codes
//! - Context information (stage, URL, archive path, entry name)

use crate::types::Stage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for repack-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for repack-dl
///
/// Each variant includes enough context (stage, resource name or path) for a
/// caller to present a single, specific failure message.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration or job description is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "locate_marker")
        key: Option<String>,
    },

    /// Network failure while fetching the remote archive
    #[error("transport error fetching {url}: {reason}")]
    Transport {
        /// The URL being fetched
        url: String,
        /// The underlying transport failure
        reason: String,
    },

    /// Remote server answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL being fetched
        url: String,
        /// The HTTP status code returned by the server
        status: u16,
    },

    /// Container index is unreadable, corrupt or empty
    #[error("invalid archive {archive}: {reason}")]
    Format {
        /// Stage at which the archive was opened or read
        stage: Stage,
        /// The archive that could not be read
        archive: PathBuf,
        /// The reason the archive was rejected
        reason: String,
    },

    /// No entry name contains the locate marker
    #[error("no entry in {archive} contains {marker:?}")]
    NotFound {
        /// The archive that was scanned
        archive: PathBuf,
        /// The marker substring that matched nothing
        marker: String,
    },

    /// Local filesystem failure
    #[error("I/O error during {stage} on {path}: {source}")]
    Io {
        /// Stage at which the failure happened
        stage: Stage,
        /// The file or directory involved
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The same entry name was written twice to the output archive
    #[error("duplicate entry {name:?} in output archive (from {archive})")]
    NameCollision {
        /// The colliding entry name
        name: String,
        /// The nested archive that supplied the second copy
        archive: PathBuf,
    },

    /// A blocking stage task panicked or was cancelled
    #[error("{stage} task failed: {reason}")]
    TaskFailed {
        /// Stage whose task failed
        stage: Stage,
        /// The join error description
        reason: String,
    },
}

impl Error {
    /// Build an [`Error::Io`] for `path` at `stage`
    pub fn io(stage: Stage, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            stage,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build an [`Error::Format`] for `archive` at `stage`
    pub fn format(stage: Stage, archive: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Error::Format {
            stage,
            archive: archive.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Re-attribute a format or I/O error to `stage`
    ///
    /// Archive readers report errors at [`Stage::Open`]; callers streaming
    /// entries during a later stage use this to name the stage that failed.
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            Error::Format {
                archive, reason, ..
            } => Error::Format {
                stage,
                archive,
                reason,
            },
            Error::Io { path, source, .. } => Error::Io {
                stage,
                path,
                source,
            },
            other => other,
        }
    }

    /// The pipeline stage at which this error occurred
    ///
    /// Returns `None` for configuration errors, which are raised before any
    /// stage starts.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Config { .. } => None,
            Error::Transport { .. } | Error::HttpStatus { .. } => Some(Stage::Download),
            Error::Format { stage, .. } => Some(*stage),
            Error::NotFound { .. } => Some(Stage::Locate),
            Error::Io { stage, .. } => Some(*stage),
            Error::NameCollision { .. } => Some(Stage::Repackage),
            Error::TaskFailed { stage, .. } => Some(*stage),
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Transport { .. } => "transport_error",
            Error::HttpStatus { .. } => "http_status",
            Error::Format { .. } => "format_error",
            Error::NotFound { .. } => "not_found",
            Error::Io { .. } => "io_error",
            Error::NameCollision { .. } => "name_collision",
            Error::TaskFailed { .. } => "task_failed",
        }
    }

    /// Whether this error belongs to the transport class (network or HTTP)
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::HttpStatus { .. })
    }
}

/// Structured error report for the presentation layer
///
/// # Example JSON
///
/// ```json
/// {
///   "stage": "locate",
///   "code": "not_found",
///   "message": "no entry in /tmp/x/downloads/mcm.7z contains \".fomod\"",
///   "resource": "/tmp/x/downloads/mcm.7z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Stage that failed (absent for configuration errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,

    /// Machine-readable error code (e.g., "not_found", "format_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// The URL, path or entry name involved, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl From<&Error> for ErrorReport {
    fn from(error: &Error) -> Self {
        let resource = match error {
            Error::Config { key, .. } => key.clone(),
            Error::Transport { url, .. } | Error::HttpStatus { url, .. } => Some(url.clone()),
            Error::Format { archive, .. } | Error::NotFound { archive, .. } => {
                Some(archive.display().to_string())
            }
            Error::Io { path, .. } => Some(path.display().to_string()),
            Error::NameCollision { name, .. } => Some(name.clone()),
            Error::TaskFailed { .. } => None,
        };

        ErrorReport {
            stage: error.stage(),
            code: error.error_code().to_string(),
            message: error.to_string(),
            resource,
        }
    }
}

impl From<Error> for ErrorReport {
    fn from(error: Error) -> Self {
        ErrorReport::from(&error)
    }
}
