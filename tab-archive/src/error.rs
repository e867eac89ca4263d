//! Error types for the tab archive

use thiserror::Error;

/// Errors surfaced by the archive service and its stores
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// No active record exists for the URL
    #[error("no archived tab for {0}")]
    NotFound(String),

    /// A backup bundle is missing its metadata entry or is not a bundle at all
    #[error("not a tab archive backup: {0}")]
    Format(String),

    /// The URL is empty or otherwise unusable as a record key
    #[error("invalid url: {0:?}")]
    InvalidUrl(String),

    /// Session state could not be interpreted
    #[error("session state error: {0}")]
    Session(String),

    /// Another process holds the archive lock
    #[error("archive at {0} is locked by another process")]
    Locked(String),

    /// A browser-host collaborator failed
    #[error("browser host error: {0}")]
    Host(#[source] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("bundle write error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ArchiveError {
    /// True for the `NotFound` kind
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArchiveError::NotFound(_))
    }
}

/// Result alias for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;
