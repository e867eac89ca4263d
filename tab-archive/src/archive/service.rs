//! Archive service: save/update/delete/query over the record and asset stores
//!
//! The service is constructed once per process and passed by reference to
//! every caller. It owns the observer list; observers are notified
//! synchronously, and only after the storage mutation they describe has
//! completed.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};
use url::Url;

use super::assets::AssetStore;
use super::clock::{to_millis, Clock, SystemClock};
use super::models::{ArchiveRecord, ArchivedTab, AssetKind};
use super::query::ArchivedTabs;
use super::records::{RecordStore, UpsertKind};
use super::session::{normalize_line_endings, JsonSessionCodec, SessionCodec};
use super::transfer::TransferManager;
use crate::config::Config;
use crate::error::{ArchiveError, Result};

/// How long `open` waits for another process to release the archive
const LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// Receives archive change notifications
///
/// Every method has a no-op default so observers implement only what they need.
pub trait ArchiveObserver: Send + Sync {
    /// A tab was saved; `is_new` is false when an existing record was updated
    fn on_save(&self, _url: &str, _is_new: bool) {}
    fn on_delete(&self, _url: &str) {}
    fn on_undelete(&self, _url: &str) {}
    fn on_really_delete(&self, _url: &str) {}
}

/// Everything captured from a tab for one save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabCapture {
    pub url: String,
    /// Replaces the stored description when present
    pub description: Option<String>,
    /// Serialized navigation state
    pub session: String,
    pub full_image: Vec<u8>,
    pub thumb_image: Option<Vec<u8>>,
    /// Favicon data URI; absent leaves the stored favicon unchanged
    pub favicon: Option<String>,
}

impl TabCapture {
    pub fn new(url: impl Into<String>, session: impl Into<String>, full_image: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            description: None,
            session: session.into(),
            full_image,
            thumb_image: None,
            favicon: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_thumbnail(mut self, thumb_image: Vec<u8>) -> Self {
        self.thumb_image = Some(thumb_image);
        self
    }

    pub fn with_favicon(mut self, favicon: impl Into<String>) -> Self {
        self.favicon = Some(favicon.into());
        self
    }
}

/// Tab archive service
pub struct ArchiveService {
    records: RecordStore,
    assets: AssetStore,
    codec: Arc<dyn SessionCodec>,
    clock: Arc<dyn Clock>,
    observers: Mutex<Vec<Arc<dyn ArchiveObserver>>>,
    /// Held for the lifetime of the service (lock released on drop)
    _lock: Option<File>,
}

impl ArchiveService {
    /// Open the archive described by `config`
    ///
    /// Creates the directory tree, takes the single-writer lock, opens the
    /// metadata database and removes stale temp files left by crashed writes.
    pub fn open(config: &Config) -> Result<Self> {
        config.ensure_dirs()?;

        let lock_path = config.lock_path();
        let lock = acquire_archive_lock(&lock_path, LOCK_TIMEOUT).map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut {
                ArchiveError::Locked(config.data_dir().display().to_string())
            } else {
                ArchiveError::Io(e)
            }
        })?;

        let records = RecordStore::open(&config.db_path())?;
        let assets = AssetStore::new(&config.assets_dir())?;

        let (deleted, scanned, _) = assets.cleanup_stale_temps();
        if deleted > 0 {
            debug!("Removed {} stale temp files ({} scanned)", deleted, scanned);
        }

        info!("Opened tab archive at {}", config.data_dir().display());

        let mut service = Self::with_parts(
            records,
            assets,
            Arc::new(JsonSessionCodec),
            Arc::new(SystemClock),
        );
        service._lock = Some(lock);
        Ok(service)
    }

    /// Assemble a service from already-open stores and collaborators
    pub fn with_parts(
        records: RecordStore,
        assets: AssetStore,
        codec: Arc<dyn SessionCodec>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            records,
            assets,
            codec,
            clock,
            observers: Mutex::new(Vec::new()),
            _lock: None,
        }
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn codec(&self) -> &dyn SessionCodec {
        self.codec.as_ref()
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Register an observer; registering the same observer twice is a no-op
    pub fn add_observer(&self, observer: Arc<dyn ArchiveObserver>) {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        if !observers.iter().any(|o| same_observer(o, &observer)) {
            observers.push(observer);
        }
    }

    pub fn remove_observer(&self, observer: &Arc<dyn ArchiveObserver>) {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        observers.retain(|o| !same_observer(o, observer));
    }

    fn notify(&self, event: impl Fn(&dyn ArchiveObserver)) {
        // Snapshot so observers may (un)register from inside a callback
        let observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in &observers {
            event(observer.as_ref());
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Save a captured tab
    ///
    /// Returns true when a record for the URL already existed (an update),
    /// false for a fresh save. Images are staged before the record is written
    /// and moved into place only after it commits, so a failed save leaves
    /// both the record and its previous images untouched.
    pub fn save(&self, capture: &TabCapture) -> Result<bool> {
        let url = capture.url.as_str();
        if url.is_empty() {
            return Err(ArchiveError::InvalidUrl(url.to_string()));
        }

        let title = derive_title(self.codec.as_ref(), url, &capture.session);
        let content_hash = RecordStore::content_hash(url);

        let full = self
            .assets
            .stage(&content_hash, AssetKind::Full, &capture.full_image)?;
        let thumb = match &capture.thumb_image {
            Some(thumb) => Some(self.assets.stage(&content_hash, AssetKind::Thumb, thumb)?),
            None => None,
        };

        let now = self.clock.now_utc();
        let (record, was_new) = self.records.save_with(url, now, |record, kind| {
            // A user-edited title survives re-saving an active record
            if kind != UpsertKind::Refreshed || record.title.is_empty() {
                record.title = title;
            }
            if let Some(description) = &capture.description {
                record.description = Some(description.clone());
            }
            if let Some(favicon) = &capture.favicon {
                record.favicon = Some(favicon.clone());
            }
            record.session = capture.session.clone();
        })?;

        full.commit()?;
        match thumb {
            Some(thumb) => thumb.commit()?,
            None => self.assets.remove(&content_hash, AssetKind::Thumb),
        }

        debug!(
            "Saved {} ({}, hash {})",
            url,
            if was_new { "new" } else { "update" },
            record.content_hash
        );

        self.notify(|o| o.on_save(url, was_new));
        Ok(!was_new)
    }

    /// Change the title and/or description of an active record
    pub fn update(&self, url: &str, title: Option<&str>, description: Option<&str>) -> Result<()> {
        let now = self.clock.now_utc();
        if !self.records.update_fields(url, title, description, now)? {
            return Err(ArchiveError::NotFound(url.to_string()));
        }
        Ok(())
    }

    /// Soft-delete: hide the record from active queries, keep its assets
    pub fn delete(&self, url: &str) -> Result<()> {
        let now = self.clock.now_utc();
        if self.records.soft_delete(url, Some(now), now)? {
            self.notify(|o| o.on_delete(url));
        }
        Ok(())
    }

    /// Reverse a soft delete
    pub fn undelete(&self, url: &str) -> Result<()> {
        let now = self.clock.now_utc();
        if self.records.soft_delete(url, None, now)? {
            self.notify(|o| o.on_undelete(url));
        }
        Ok(())
    }

    /// Hard delete: remove the record and both image assets
    ///
    /// Asset removal is best-effort; the record removal is authoritative.
    pub fn really_delete(&self, url: &str) -> Result<()> {
        let existed = self.records.hard_delete(url)?;

        let content_hash = RecordStore::content_hash(url);
        for kind in AssetKind::ALL {
            self.assets.remove(&content_hash, kind);
        }

        if existed {
            self.notify(|o| o.on_really_delete(url));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// True iff an active (not soft-deleted) record exists
    pub fn is_saved(&self, url: &str) -> Result<bool> {
        Ok(self
            .records
            .find(url)?
            .is_some_and(|record| !record.is_deleted()))
    }

    /// Lazily resolved records matching `filter`
    ///
    /// `include_deleted` selects the deleted records (newest deletion first)
    /// instead of the active ones (most recently updated first).
    pub fn get(&self, filter: Option<&str>, include_deleted: bool) -> Result<ArchivedTabs<'_>> {
        let urls = self.records.query(filter, include_deleted, -1)?;
        Ok(ArchivedTabs::new(self, urls))
    }

    /// At most `max` active records, most recently updated first
    pub fn get_recent(&self, max: usize) -> Result<ArchivedTabs<'_>> {
        let limit = i64::try_from(max).unwrap_or(i64::MAX);
        let urls = self.records.query(None, false, limit)?;
        Ok(ArchivedTabs::new(self, urls))
    }

    /// The stored record for `url`, deleted or not
    pub fn get_for_url(&self, url: &str) -> Result<Option<ArchiveRecord>> {
        self.records.find(url)
    }

    /// The record for `url` joined with its image locators
    ///
    /// Missing asset files do not fail retrieval; a missing thumbnail falls
    /// back to the full-image locator.
    pub fn retrieve(&self, url: &str) -> Result<Option<ArchivedTab>> {
        match self.records.find(url)? {
            Some(record) => Ok(Some(self.resolve(record)?)),
            None => Ok(None),
        }
    }

    fn resolve(&self, mut record: ArchiveRecord) -> Result<ArchivedTab> {
        let cache_buster = to_millis(record.updated);
        let image_url = self
            .assets
            .url_for(&record.content_hash, AssetKind::Full, cache_buster)?;

        let thumb_url = if self.assets.exists(&record.content_hash, AssetKind::Thumb) {
            self.assets
                .url_for(&record.content_hash, AssetKind::Thumb, cache_buster)?
        } else {
            image_url.clone()
        };

        record.session = normalize_line_endings(&record.session);

        Ok(ArchivedTab {
            record,
            image_url,
            thumb_url,
        })
    }

    // ------------------------------------------------------------------
    // Import / export
    // ------------------------------------------------------------------

    pub fn transfer(&self) -> TransferManager<'_> {
        TransferManager::new(&self.records, &self.assets, self.codec.as_ref())
    }

    /// Write a backup bundle of all active records; returns the record count
    pub fn export(&self, destination: &Path) -> Result<usize> {
        self.transfer().export(destination)
    }

    /// Merge a backup bundle; returns how many records were merged
    ///
    /// Observers get `on_save` for every merged URL, but only when the whole
    /// import succeeds. If it fails partway, records merged before the
    /// failure stay merged and no observer hears about them.
    pub fn import(&self, source: &Path) -> Result<usize> {
        let merged = self.transfer().import(source)?;
        for entry in &merged {
            self.notify(|o| o.on_save(&entry.url, entry.is_new));
        }
        Ok(merged.len())
    }

    /// Write all active records as a bookmark file; returns the count
    pub fn export_as_html(&self, destination: &Path) -> Result<usize> {
        self.transfer().export_as_html(destination)
    }
}

fn same_observer(a: &Arc<dyn ArchiveObserver>, b: &Arc<dyn ArchiveObserver>) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Title for a save: the session's current entry, else the last non-empty
/// path segment of the URL, else its host
fn derive_title(codec: &dyn SessionCodec, url: &str, session: &str) -> String {
    if let Some(title) = codec.current_title(session) {
        return title;
    }

    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };

    if let Some(segment) = parsed
        .path_segments()
        .and_then(|segments| segments.rev().find(|s| !s.is_empty()))
    {
        return segment.to_string();
    }

    parsed
        .host_str()
        .map(str::to_string)
        .unwrap_or_else(|| url.to_string())
}

/// Acquire a flock on the archive lock file with timeout
///
/// Returns the file handle which holds the lock (lock is released on drop)
fn acquire_archive_lock(lock_path: &Path, timeout: Duration) -> io::Result<File> {
    use fs2::FileExt;
    use std::thread;

    let start = Instant::now();
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(file),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                if start.elapsed() >= timeout {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "Failed to acquire archive lock within timeout",
                    ));
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => return Err(e),
        }
    }
}
