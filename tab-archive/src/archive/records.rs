//! Record store: the metadata table of archived tabs
//!
//! One row per URL in a SQLite table. Soft deletes set `deleted`; hard
//! deletes remove the row. Multi-column changes run in a single transaction
//! so readers never see a half-saved record.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use sha2::{Digest, Sha256};

use super::clock::{from_millis, next_stamp, to_millis, truncate_to_millis};
use super::models::ArchiveRecord;
use crate::error::{ArchiveError, Result};

const SCHEMA_VERSION: i32 = 1;

const COLUMNS: &str =
    "url, title, description, content_hash, favicon, session, created, updated, deleted";

/// Journaling mode for a store file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Journal {
    /// Live archive: write-ahead log
    Wal,
    /// Bundle snapshots: rollback journal, so the database is one file
    Rollback,
}

/// What an upsert found before applying changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    /// No row existed; a fresh record was built
    Created,
    /// A soft-deleted row was brought back
    Reactivated,
    /// An active row was refreshed
    Refreshed,
}

/// Keyed table of archive records
#[derive(Debug)]
pub struct RecordStore {
    conn: Connection,
    path: PathBuf,
}

impl RecordStore {
    /// Open (creating if needed) the live record store
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, Journal::Wal)
    }

    /// Open a standalone snapshot database, as packed into backup bundles
    pub fn open_snapshot(path: &Path) -> Result<Self> {
        Self::open_with(path, Journal::Rollback)
    }

    fn open_with(path: &Path, journal: Journal) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;

        let mode = match journal {
            Journal::Wal => "WAL",
            Journal::Rollback => "DELETE",
        };
        conn.pragma_update_and_check(None, "journal_mode", mode, |row| row.get::<_, String>(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        migrate(&conn)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Content hash of a URL: SHA-256 truncated to 32 hex characters
    pub fn content_hash(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let hash = hasher.finalize();

        hex::encode(&hash[..16])
    }

    /// Find a record by URL, deleted or not
    pub fn find(&self, url: &str) -> Result<Option<ArchiveRecord>> {
        let sql = format!("SELECT {} FROM archive_records WHERE url = ?1", COLUMNS);
        let record = self
            .conn
            .query_row(&sql, params![url], row_to_record)
            .optional()?;
        Ok(record)
    }

    /// Create or reactivate the record for `url`
    ///
    /// Returns the stored record and whether it was newly created.
    pub fn upsert(&self, url: &str, now: DateTime<Utc>) -> Result<(ArchiveRecord, bool)> {
        self.save_with(url, now, |_, _| {})
    }

    /// Upsert `url`, apply `mutate`, and persist, all in one transaction
    ///
    /// `mutate` is told whether the row was created, reactivated or refreshed.
    /// New records get `created = updated = now` and `content_hash = hash(url)`.
    /// Existing records keep `created` and `content_hash`, have `deleted`
    /// cleared, and get an `updated` strictly greater than before.
    pub fn save_with<F>(
        &self,
        url: &str,
        now: DateTime<Utc>,
        mutate: F,
    ) -> Result<(ArchiveRecord, bool)>
    where
        F: FnOnce(&mut ArchiveRecord, UpsertKind),
    {
        if url.is_empty() {
            return Err(ArchiveError::InvalidUrl(url.to_string()));
        }

        let tx = self.conn.unchecked_transaction()?;

        let (mut record, kind) = match self.find(url)? {
            Some(mut existing) => {
                let kind = if existing.is_deleted() {
                    UpsertKind::Reactivated
                } else {
                    UpsertKind::Refreshed
                };
                existing.updated = next_stamp(now, existing.updated);
                existing.deleted = None;
                (existing, kind)
            }
            None => {
                let now = truncate_to_millis(now);
                let record = ArchiveRecord::new(url.to_string(), Self::content_hash(url), now);
                (record, UpsertKind::Created)
            }
        };

        mutate(&mut record, kind);

        // Identity and lifecycle columns are owned by the store
        record.url = url.to_string();
        record.content_hash = Self::content_hash(url);

        write_row(&tx, &record)?;
        tx.commit()?;

        Ok((record, kind == UpsertKind::Created))
    }

    /// Write a record verbatim, replacing any row with the same URL
    ///
    /// Used when merging backups, where every column is copied as-is.
    pub fn put(&self, record: &ArchiveRecord) -> Result<()> {
        if record.url.is_empty() {
            return Err(ArchiveError::InvalidUrl(record.url.clone()));
        }
        write_row(&self.conn, record)
    }

    /// Ordered URLs matching a text filter
    ///
    /// With `include_deleted` the result holds only soft-deleted records,
    /// newest deletion first; otherwise only active records, most recently
    /// updated first. A negative `limit` means unbounded.
    pub fn query(
        &self,
        text_filter: Option<&str>,
        include_deleted: bool,
        limit: i64,
    ) -> Result<Vec<String>> {
        let sql = if include_deleted {
            "SELECT url, title, description FROM archive_records \
             WHERE deleted IS NOT NULL ORDER BY deleted DESC, url ASC"
        } else {
            "SELECT url, title, description FROM archive_records \
             WHERE deleted IS NULL ORDER BY updated DESC, url ASC"
        };

        let needle = text_filter
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_lowercase);

        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut urls = Vec::new();

        for row in rows {
            if urls.len() >= limit {
                break;
            }

            let (url, title, description) = row?;
            let matches = match needle.as_deref() {
                None => true,
                Some(needle) => {
                    url.to_lowercase().contains(needle)
                        || title.to_lowercase().contains(needle)
                        || description
                            .as_deref()
                            .is_some_and(|d| d.to_lowercase().contains(needle))
                }
            };

            if matches {
                urls.push(url);
            }
        }

        Ok(urls)
    }

    /// All active records, most recently updated first
    pub fn active_records(&self) -> Result<Vec<ArchiveRecord>> {
        let sql = format!(
            "SELECT {} FROM archive_records WHERE deleted IS NULL ORDER BY updated DESC, url ASC",
            COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Set (`Some`) or clear (`None`) the deletion mark
    ///
    /// Returns false, without error, when no record exists.
    pub fn soft_delete(
        &self,
        url: &str,
        deleted: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;

        let Some(mut record) = self.find(url)? else {
            return Ok(false);
        };

        record.deleted = deleted.map(truncate_to_millis);
        record.updated = next_stamp(now, record.updated);
        write_row(&tx, &record)?;
        tx.commit()?;

        Ok(true)
    }

    /// Remove the record permanently; false when it did not exist
    pub fn hard_delete(&self, url: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM archive_records WHERE url = ?1", params![url])?;
        Ok(removed > 0)
    }

    /// Apply the given fields to an active record
    ///
    /// Returns false when the record is absent or soft-deleted. `updated` is
    /// bumped only when at least one field is supplied.
    pub fn update_fields(
        &self,
        url: &str,
        title: Option<&str>,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;

        let mut record = match self.find(url)? {
            Some(record) if !record.is_deleted() => record,
            _ => return Ok(false),
        };

        if title.is_none() && description.is_none() {
            return Ok(true);
        }

        if let Some(title) = title {
            record.title = title.to_string();
        }
        if let Some(description) = description {
            record.description = Some(description.to_string());
        }
        record.updated = next_stamp(now, record.updated);

        write_row(&tx, &record)?;
        tx.commit()?;

        Ok(true)
    }

    /// Number of rows, deleted included
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM archive_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    let user_version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;

    match user_version {
        0 => {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS archive_records (
                  url TEXT PRIMARY KEY NOT NULL,
                  title TEXT NOT NULL,
                  description TEXT,
                  content_hash TEXT NOT NULL,
                  favicon TEXT,
                  session TEXT NOT NULL,
                  created INTEGER NOT NULL,
                  updated INTEGER NOT NULL,
                  deleted INTEGER
                );

                CREATE INDEX IF NOT EXISTS archive_records_updated_idx
                  ON archive_records(updated DESC);
                CREATE INDEX IF NOT EXISTS archive_records_deleted_idx
                  ON archive_records(deleted DESC);
                "#,
            )?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        other => Err(ArchiveError::Format(format!(
            "unsupported record schema version {} (expected {})",
            other, SCHEMA_VERSION
        ))),
    }
}

fn write_row(conn: &Connection, record: &ArchiveRecord) -> Result<()> {
    let sql = format!(
        "INSERT OR REPLACE INTO archive_records ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        COLUMNS
    );
    conn.execute(
        &sql,
        params![
            record.url,
            record.title,
            record.description,
            record.content_hash,
            record.favicon,
            record.session,
            to_millis(record.created),
            to_millis(record.updated),
            record.deleted.map(to_millis),
        ],
    )?;
    Ok(())
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    from_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ArchiveRecord> {
    let deleted = match row.get::<_, Option<i64>>(8)? {
        Some(millis) => {
            Some(from_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(8, millis))?)
        }
        None => None,
    };

    Ok(ArchiveRecord {
        url: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        content_hash: row.get(3)?,
        favicon: row.get(4)?,
        session: row.get(5)?,
        created: timestamp(row, 6)?,
        updated: timestamp(row, 7)?,
        deleted,
    })
}
