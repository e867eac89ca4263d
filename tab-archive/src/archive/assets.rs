//! Asset store: image blobs on disk, addressed by content hash
//!
//! - Deterministic file names from `(content_hash, kind)`
//! - Atomic writes (temp file + fsync + rename), optionally staged so the
//!   rename can wait for a metadata commit
//! - Strict file permissions (0600 files)
//! - Best-effort removal
//! - Bounded startup cleanup of stale temp files

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};
use url::Url;

use super::models::AssetKind;
use crate::error::{ArchiveError, Result};

/// Maximum number of files to scan during cleanup
const CLEANUP_SCAN_LIMIT: usize = 1000;

/// Age threshold for temp file cleanup (1 hour)
const CLEANUP_AGE_THRESHOLD: Duration = Duration::from_secs(3600);

/// Content-addressed blob storage for screenshots
///
/// Files live at `<assets_dir>/<content_hash>.png` and
/// `<assets_dir>/<content_hash>-thumb.png`.
#[derive(Debug, Clone)]
pub struct AssetStore {
    dir: PathBuf,
}

impl AssetStore {
    /// Create an asset store rooted at `dir`, creating it if needed
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;

        // Locators must be absolute file URLs
        let dir = dir.canonicalize()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
        }

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the blob for `(content_hash, kind)`
    pub fn path_for(&self, content_hash: &str, kind: AssetKind) -> PathBuf {
        self.dir.join(kind.file_name(content_hash))
    }

    pub fn exists(&self, content_hash: &str, kind: AssetKind) -> bool {
        self.path_for(content_hash, kind).is_file()
    }

    /// Atomically replace the blob at `(content_hash, kind)`
    ///
    /// Readers see either the previous blob or the new one, never a partial write.
    pub fn write(&self, content_hash: &str, kind: AssetKind, bytes: &[u8]) -> Result<()> {
        self.stage(content_hash, kind, bytes)?.commit()
    }

    /// Write `bytes` to a temp file next to the blob without replacing it
    ///
    /// The blob changes only on `StagedAsset::commit`; dropping the staged
    /// asset instead removes the temp file.
    pub fn stage(&self, content_hash: &str, kind: AssetKind, bytes: &[u8]) -> Result<StagedAsset> {
        let temp_name = format!(
            ".{}.tmp.{}",
            kind.file_name(content_hash),
            std::process::id()
        );
        let staged = StagedAsset {
            temp_path: self.dir.join(&temp_name),
            final_path: self.path_for(content_hash, kind),
            committed: false,
        };

        write_synced(&staged.temp_path, bytes)?;
        Ok(staged)
    }

    /// Read a blob; `None` when it does not exist
    pub fn read(&self, content_hash: &str, kind: AssetKind) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(content_hash, kind)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a blob, best-effort: absence and failures are logged, never returned
    pub fn remove(&self, content_hash: &str, kind: AssetKind) {
        let path = self.path_for(content_hash, kind);
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed asset {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove asset {}: {}", path.display(), e),
        }
    }

    /// External locator for a blob, tagged with a cache-busting token
    ///
    /// The token (the record's `updated` millis) changes on every update so
    /// consumers revalidate instead of showing a stale image.
    pub fn url_for(&self, content_hash: &str, kind: AssetKind, cache_buster: i64) -> Result<String> {
        let path = self.path_for(content_hash, kind);
        let mut url = Url::from_file_path(&path)
            .map_err(|()| ArchiveError::InvalidUrl(path.display().to_string()))?;
        url.set_query(Some(&cache_buster.to_string()));
        Ok(url.to_string())
    }

    /// Cleanup stale temp files in the asset directory
    ///
    /// Deletes *.tmp.* files older than CLEANUP_AGE_THRESHOLD (1 hour).
    /// Scans at most CLEANUP_SCAN_LIMIT files to avoid blocking startup.
    ///
    /// Returns (deleted_count, scanned_count, hit_limit)
    pub fn cleanup_stale_temps(&self) -> (usize, usize, bool) {
        let mut scanned = 0;
        let mut deleted = 0;
        let now = SystemTime::now();

        for entry in walkdir::WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if scanned >= CLEANUP_SCAN_LIMIT {
                warn!(
                    "Hit cleanup scan limit ({}) for {}",
                    CLEANUP_SCAN_LIMIT,
                    self.dir.display()
                );
                return (deleted, scanned, true);
            }

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            scanned += 1;

            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.contains(".tmp."));
            if !is_temp {
                continue;
            }

            let age = fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());

            if age.is_some_and(|age| age > CLEANUP_AGE_THRESHOLD) {
                match fs::remove_file(path) {
                    Ok(()) => deleted += 1,
                    Err(e) => warn!("Failed to delete stale temp file {}: {}", path.display(), e),
                }
            }
        }

        (deleted, scanned, false)
    }
}

/// A blob written to its temp file, waiting to be renamed into place
#[derive(Debug)]
pub struct StagedAsset {
    temp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl StagedAsset {
    /// Rename the temp file over the blob
    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.temp_path, &self.final_path)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedAsset {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

/// Write `bytes` to a fresh file with 0600 permissions and fsync it
fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}
