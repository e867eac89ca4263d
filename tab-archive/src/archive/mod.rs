//! Tab archive
//!
//! Saves browser tabs (session state, screenshots, metadata) keyed by URL and
//! brings them back later. Records live in SQLite, screenshots on disk.

pub mod assets;
pub mod capture;
pub mod clock;
pub mod models;
pub mod query;
pub mod records;
pub mod service;
pub mod session;
pub mod transfer;

// Re-export key types
pub use capture::{BrowserHost, OpenDisposition, TabCapturer};
pub use models::{ArchiveRecord, ArchivedTab, AssetKind};
pub use query::ArchivedTabs;
pub use service::{ArchiveObserver, ArchiveService, TabCapture};
pub use session::{JsonSessionCodec, SessionCodec};
pub use transfer::{MergedRecord, TransferManager};
