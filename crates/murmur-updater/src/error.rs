//! Error taxonomy for the update pipeline.

use reqwest::StatusCode;
use thiserror::Error;

use crate::version::VersionError;

/// Errors that can occur during update operations.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Connection or transport failure talking to a remote endpoint.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A remote document was not valid JSON.
    #[error("invalid JSON from remote: {0}")]
    Parse(#[from] serde_json::Error),

    /// Non-success HTTP status with no usable redirect.
    #[error("download failed with HTTP status {status}")]
    Download { status: StatusCode },

    /// The redirect chain exceeded the configured cap.
    #[error("redirect limit of {limit} exceeded")]
    RedirectLimit { limit: usize },

    /// The release archive does not contain exactly one top-level directory.
    #[error("unexpected archive layout: {0}")]
    ArchiveLayout(String),

    /// The archive could not be read or extracted.
    #[error("archive error: {0}")]
    Archive(String),

    /// Filesystem failure while staging or installing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A version string could not be parsed.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// A manifest has no `version` string field.
    #[error("manifest has no version field")]
    MissingVersion,

    /// Another pipeline already holds the single update slot.
    #[error("an update is already in progress")]
    InProgress,

    /// A blocking install stage panicked or was cancelled.
    #[error("install task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for update operations.
pub type Result<T> = std::result::Result<T, UpdateError>;
