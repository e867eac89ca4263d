//! Backup bundles and bookmark export
//!
//! A bundle is a zip file (stored, not deflated: screenshots are already
//! compressed) holding one SQLite snapshot of the active records plus the
//! image assets those records reference, under their asset file names.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::Path;

use rc_zip_sync::ReadZip;
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::assets::AssetStore;
use super::models::{ArchiveRecord, AssetKind};
use super::records::RecordStore;
use super::session::SessionCodec;
use crate::error::{ArchiveError, Result};

/// Name of the metadata snapshot inside a bundle
pub const EXPORT_DB_ENTRY: &str = "archive.sqlite.export";

/// A record taken over from a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRecord {
    pub url: String,
    /// No local record existed before the merge
    pub is_new: bool,
}

/// Moves records between the live archive and portable files
pub struct TransferManager<'a> {
    records: &'a RecordStore,
    assets: &'a AssetStore,
    codec: &'a dyn SessionCodec,
}

impl<'a> TransferManager<'a> {
    pub fn new(records: &'a RecordStore, assets: &'a AssetStore, codec: &'a dyn SessionCodec) -> Self {
        Self {
            records,
            assets,
            codec,
        }
    }

    /// Write a bundle of every active record to `destination`
    ///
    /// Session state is scrubbed of typed text and post data and cut down to
    /// the current entry. The bundle is staged next to `destination` and moved
    /// into place only once complete. Returns the number of records exported.
    pub fn export(&self, destination: &Path) -> Result<usize> {
        let out_dir = parent_dir(destination);
        let staging = tempfile::Builder::new()
            .prefix(".tab-archive-export")
            .tempdir_in(out_dir)?;
        let snapshot_path = staging.path().join(EXPORT_DB_ENTRY);

        let records = self.records.active_records()?;
        {
            let snapshot = RecordStore::open_snapshot(&snapshot_path)?;
            for record in &records {
                snapshot.put(&self.scrubbed(record))?;
            }
        }
        let snapshot_bytes = fs::read(&snapshot_path)?;

        let mut bundle = tempfile::NamedTempFile::new_in(out_dir)?;
        {
            let mut zip = ZipWriter::new(bundle.as_file_mut());
            let options = FileOptions::default().compression_method(CompressionMethod::Stored);

            zip.start_file(EXPORT_DB_ENTRY, options)?;
            zip.write_all(&snapshot_bytes)?;

            for record in &records {
                for kind in AssetKind::ALL {
                    let Some(bytes) = self.assets.read(&record.content_hash, kind)? else {
                        debug!("No {:?} asset for {}, not bundled", kind, record.url);
                        continue;
                    };
                    zip.start_file(kind.file_name(&record.content_hash), options)?;
                    zip.write_all(&bytes)?;
                }
            }

            zip.finish()?;
        }
        bundle.as_file().sync_all()?;
        bundle.persist(destination).map_err(|e| e.error)?;

        info!("Exported {} records to {}", records.len(), destination.display());
        Ok(records.len())
    }

    fn scrubbed(&self, record: &ArchiveRecord) -> ArchiveRecord {
        let mut exported = record.clone();
        exported.session = match self.codec.scrub_private_fields(&record.session) {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    "Could not scrub session state of {}, exporting a minimal one: {}",
                    record.url, e
                );
                self.codec.minimal(&record.url, &record.title)
            }
        };
        exported
    }

    /// Merge the bundle at `source` into the live archive
    ///
    /// A bundled record replaces the local one only when its `updated` is
    /// strictly newer; on a tie the local record wins. Assets are taken only
    /// for records that were merged. Merging is per record, so a failure
    /// partway keeps the records merged before it.
    pub fn import(&self, source: &Path) -> Result<Vec<MergedRecord>> {
        let file = File::open(source)?;
        let archive = file
            .read_zip()
            .map_err(|e| ArchiveError::Format(format!("{}: {}", source.display(), e)))?;

        let snapshot_bytes = archive
            .by_name(EXPORT_DB_ENTRY)
            .ok_or_else(|| {
                ArchiveError::Format(format!(
                    "{} has no {} entry",
                    source.display(),
                    EXPORT_DB_ENTRY
                ))
            })?
            .bytes()?;

        // Staged inside the data directory; removed on every exit path
        let staging_root = parent_dir(self.records.path());
        let staging = tempfile::Builder::new()
            .prefix(".tab-archive-import")
            .tempdir_in(staging_root)?;
        let snapshot_path = staging.path().join(EXPORT_DB_ENTRY);
        fs::write(&snapshot_path, &snapshot_bytes)?;
        let not_a_snapshot = |e: ArchiveError| match e {
            ArchiveError::Database(e) => ArchiveError::Format(format!(
                "{}: {} is not a record snapshot: {}",
                source.display(),
                EXPORT_DB_ENTRY,
                e
            )),
            other => other,
        };
        let bundled = RecordStore::open_snapshot(&snapshot_path)
            .and_then(|snapshot| snapshot.active_records())
            .map_err(not_a_snapshot)?;

        let mut merged = Vec::new();
        let mut bundled_hashes = Vec::new();

        for mut imported in bundled {
            if imported.url.is_empty() {
                warn!("Skipping bundled record with an empty url");
                continue;
            }

            let local = self.records.find(&imported.url)?;
            if let Some(local) = &local {
                if local.updated >= imported.updated {
                    debug!(
                        "Keeping local {} (local {} >= bundled {})",
                        imported.url, local.updated, imported.updated
                    );
                    continue;
                }
            }

            // The bundle may come from a build that hashed differently
            let bundled_hash = std::mem::replace(
                &mut imported.content_hash,
                RecordStore::content_hash(&imported.url),
            );
            self.records.put(&imported)?;

            bundled_hashes.push((bundled_hash, imported.content_hash.clone()));
            merged.push(MergedRecord {
                url: imported.url,
                is_new: local.is_none(),
            });
        }

        for (bundled_hash, local_hash) in &bundled_hashes {
            for kind in AssetKind::ALL {
                match archive.by_name(kind.file_name(bundled_hash)) {
                    Some(entry) => self.assets.write(local_hash, kind, &entry.bytes()?)?,
                    // Local images belong to the replaced record
                    None => self.assets.remove(local_hash, kind),
                }
            }
        }

        info!("Imported {} records from {}", merged.len(), source.display());
        Ok(merged)
    }

    /// Write every active record to `destination` as a bookmark file
    pub fn export_as_html(&self, destination: &Path) -> Result<usize> {
        let records = self.records.active_records()?;

        let mut html = String::from("<!DOCTYPE NETSCAPE-Bookmark-file-1>\n");
        html.push_str("<META HTTP-EQUIV=\"Content-Type\" CONTENT=\"text/html; charset=UTF-8\">\n");
        html.push_str("<TITLE>Bookmarks</TITLE>\n");
        html.push_str("<H1>Bookmarks</H1>\n");
        html.push_str("<DL><p>\n");

        for record in &records {
            html.push_str("    <DT><A HREF=\"");
            html.push_str(&escape_html(&record.url));
            html.push('"');
            if let Some(favicon) = record.favicon.as_deref().filter(|f| !f.is_empty()) {
                html.push_str(" ICON=\"");
                html.push_str(&escape_html(favicon));
                html.push('"');
            }
            html.push('>');
            html.push_str(&escape_html(&record.title));
            html.push_str("</A>\n");

            if let Some(description) = record.description.as_deref().filter(|d| !d.is_empty()) {
                html.push_str("    <DD>");
                html.push_str(&escape_html(description));
                html.push('\n');
            }
        }

        html.push_str("</DL><p>\n");

        let mut file = tempfile::NamedTempFile::new_in(parent_dir(destination))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(html.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(destination).map_err(|e| e.error)?;

        Ok(records.len())
    }
}

/// Directory that holds `path`; `.` for bare file names
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
