// Archive configuration (shared between library users and the CLI)
pub mod config;

pub mod error;

// Tracing setup for binaries
pub mod logging;

// Tab archive (record store + asset store + service + transfer)
pub mod archive;

#[cfg(test)]
pub(crate) mod test_utils;

pub use archive::{ArchiveObserver, ArchiveService, ArchivedTab, TabCapture};
pub use config::Config;
pub use error::{ArchiveError, Result};
