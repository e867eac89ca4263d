//! Archive record models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One archived tab, keyed by URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    /// Canonical page URL (primary key, never empty)
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Digest of `url`; names the asset files
    pub content_hash: String,
    /// Favicon as a data URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    /// Opaque serialized navigation state
    pub session: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Set when soft-deleted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<DateTime<Utc>>,
}

impl ArchiveRecord {
    /// Create a fresh active record with `created == updated == now`
    pub fn new(url: String, content_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            url,
            title: String::new(),
            description: None,
            content_hash,
            favicon: None,
            session: String::new(),
            created: now,
            updated: now,
            deleted: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.is_some()
    }
}

/// Kind of image asset stored for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Full,
    Thumb,
}

impl AssetKind {
    pub const ALL: [AssetKind; 2] = [AssetKind::Full, AssetKind::Thumb];

    /// Deterministic file name for this kind of asset
    pub fn file_name(self, content_hash: &str) -> String {
        match self {
            AssetKind::Full => format!("{}.png", content_hash),
            AssetKind::Thumb => format!("{}-thumb.png", content_hash),
        }
    }
}

/// Fully resolved record: metadata joined with asset locators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedTab {
    #[serde(flatten)]
    pub record: ArchiveRecord,
    /// Locator of the full screenshot
    pub image_url: String,
    /// Locator of the thumbnail, or of the full image when no thumbnail exists
    pub thumb_url: String,
}

impl ArchivedTab {
    pub fn url(&self) -> &str {
        &self.record.url
    }

    pub fn title(&self) -> &str {
        &self.record.title
    }
}
