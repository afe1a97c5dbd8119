//! SQLite storage layer for the site catalog
//!
//! This module handles persistent storage of:
//! - Sites and their submitted sitemaps
//! - Pages discovered in sitemaps, with crawl metadata
//! - Append-only inspection snapshots
//! - The schema migration ledger

mod migrations;
mod models;

pub use migrations::{Migration, LEDGER_SCHEMA, MIGRATIONS};
pub use models::*;

use crate::sitemap::ChangeFrequency;
use chrono::{NaiveDateTime, Utc};
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Text format of every timestamp written by the store
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors raised by the catalog store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create database directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to open database at {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// A uniqueness invariant would be violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// A migration failed and was rolled back
    #[error("migration {version} ({description}) failed: {source}")]
    Migration {
        version: u32,
        description: &'static str,
        source: rusqlite::Error,
    },

    #[error("migration ledger out of order: {0}")]
    MigrationOrder(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid stored JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn constraint_code(err: &rusqlite::Error) -> Option<std::os::raw::c_int> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Some(e.extended_code)
        }
        _ => None,
    }
}

/// Map a failed write against a child table whose parent may be missing
fn child_write_error(err: rusqlite::Error, parent: &'static str, parent_id: i64) -> StoreError {
    match constraint_code(&err) {
        Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => StoreError::NotFound {
            entity: parent,
            id: parent_id,
        },
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => StoreError::Conflict(err.to_string()),
        _ => StoreError::Sqlite(err),
    }
}

fn timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

const SITE_COLUMNS: &str = "id, base_url, name, created_at";

const SITEMAP_COLUMNS: &str = "id, site_id, url, last_submitted, is_pending, discovered_at";

const PAGE_COLUMNS: &str = "u.id, u.site_id, u.url, u.first_seen, u.last_seen, u.in_sitemap, \
     u.http_status, u.last_crawled, u.last_modified, u.change_freq, u.priority";

const INSPECTION_COLUMNS: &str = "id, url_id, inspected_at, index_status, coverage_state, \
     robots_txt_state, canonical_url, page_fetch_state, last_crawl_time, \
     referring_urls_json, raw_json";

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        base_url: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn sitemap_from_row(row: &Row<'_>) -> rusqlite::Result<Sitemap> {
    Ok(Sitemap {
        id: row.get(0)?,
        site_id: row.get(1)?,
        url: row.get(2)?,
        last_submitted: row.get(3)?,
        is_pending: row.get(4)?,
        discovered_at: row.get(5)?,
    })
}

/// Reads the page columns starting at `offset`
fn page_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Page> {
    let http_status: Option<i64> = row.get(offset + 6)?;
    let change_freq: Option<String> = row.get(offset + 9)?;

    Ok(Page {
        id: row.get(offset)?,
        site_id: row.get(offset + 1)?,
        url: row.get(offset + 2)?,
        first_seen: row.get(offset + 3)?,
        last_seen: row.get(offset + 4)?,
        in_sitemap: row.get(offset + 5)?,
        http_status: http_status.and_then(|s| u16::try_from(s).ok()),
        last_crawled: row.get(offset + 7)?,
        last_modified: row.get(offset + 8)?,
        change_freq: change_freq.as_deref().and_then(ChangeFrequency::parse),
        priority: row.get(offset + 10)?,
    })
}

// Internal row type; JSON columns are decoded outside the rusqlite closure

struct InspectionRow {
    id: InspectionId,
    page_id: PageId,
    inspected_at: NaiveDateTime,
    index_status: Option<String>,
    coverage_state: Option<String>,
    robots_txt_state: Option<String>,
    canonical_url: Option<String>,
    page_fetch_state: Option<String>,
    last_crawl_time: Option<String>,
    referring_urls_json: Option<String>,
    raw_json: Option<String>,
}

impl InspectionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            page_id: row.get(1)?,
            inspected_at: row.get(2)?,
            index_status: row.get(3)?,
            coverage_state: row.get(4)?,
            robots_txt_state: row.get(5)?,
            canonical_url: row.get(6)?,
            page_fetch_state: row.get(7)?,
            last_crawl_time: row.get(8)?,
            referring_urls_json: row.get(9)?,
            raw_json: row.get(10)?,
        })
    }

    fn into_inspection(self) -> Result<Inspection, StoreError> {
        let referring_urls = match self.referring_urls_json.as_deref() {
            Some(json) => serde_json::from_str(json)?,
            None => Vec::new(),
        };
        let raw = match self.raw_json.as_deref() {
            Some(json) => serde_json::from_str(json)?,
            None => serde_json::Value::Null,
        };

        Ok(Inspection {
            id: self.id,
            page_id: self.page_id,
            inspected_at: self.inspected_at,
            index_status: self.index_status,
            coverage_state: self.coverage_state,
            robots_txt_state: self.robots_txt_state,
            canonical_url: self.canonical_url,
            page_fetch_state: self.page_fetch_state,
            last_crawl_time: self.last_crawl_time,
            referring_urls,
            raw,
        })
    }
}

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path and bring its schema up to date
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut db = Self { conn };
        db.configure()?;
        db.migrate()?;

        debug!(path = ?path, "opened catalog database");
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;

        let mut db = Self { conn };
        db.configure()?;
        db.migrate()?;

        Ok(db)
    }

    fn configure(&self) -> Result<(), StoreError> {
        self.conn.pragma_update(None, "foreign_keys", true)?;
        let mode: String =
            self.conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        debug!(journal_mode = %mode, "configured connection");
        Ok(())
    }

    /// Apply pending migrations; returns the versions applied by this call
    pub fn migrate(&mut self) -> Result<Vec<u32>, StoreError> {
        migrations::apply_pending(&mut self.conn, MIGRATIONS)
    }

    /// The migration ledger, oldest first
    pub fn applied_migrations(&self) -> Result<Vec<AppliedMigration>, StoreError> {
        migrations::applied_migrations(&self.conn)
    }

    // ==================== Sites ====================

    /// Return the id of the site with this base URL, creating it if needed.
    ///
    /// A supplied name is only stored when the site has none yet.
    pub fn ensure_site(&self, base_url: &str, name: Option<&str>) -> Result<SiteId, StoreError> {
        let id = self.conn.query_row(
            r#"
            INSERT INTO sites (base_url, name) VALUES (?1, ?2)
            ON CONFLICT(base_url) DO UPDATE SET
                name = COALESCE(sites.name, excluded.name)
            RETURNING id
            "#,
            params![base_url, name],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    /// Create a site; fails with [`StoreError::Conflict`] if the base URL is known
    pub fn insert_site(&self, base_url: &str, name: Option<&str>) -> Result<SiteId, StoreError> {
        self.conn
            .execute(
                "INSERT INTO sites (base_url, name) VALUES (?1, ?2)",
                params![base_url, name],
            )
            .map_err(|err| match constraint_code(&err) {
                Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => {
                    StoreError::Conflict(format!("site {} already exists", base_url))
                }
                _ => StoreError::Sqlite(err),
            })?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_site(&self, id: SiteId) -> Result<Option<Site>, StoreError> {
        let site = self
            .conn
            .query_row(
                &format!("SELECT {} FROM sites WHERE id = ?1", SITE_COLUMNS),
                params![id],
                site_from_row,
            )
            .optional()?;

        Ok(site)
    }

    pub fn get_site_by_url(&self, base_url: &str) -> Result<Option<Site>, StoreError> {
        let site = self
            .conn
            .query_row(
                &format!("SELECT {} FROM sites WHERE base_url = ?1", SITE_COLUMNS),
                params![base_url],
                site_from_row,
            )
            .optional()?;

        Ok(site)
    }

    pub fn list_sites(&self) -> Result<Vec<Site>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM sites ORDER BY id", SITE_COLUMNS))?;
        let rows = stmt.query_map([], site_from_row)?;

        let mut sites = Vec::new();
        for row in rows {
            sites.push(row?);
        }
        Ok(sites)
    }

    /// Remove a site together with its sitemaps, pages and inspections
    pub fn delete_site(&self, id: SiteId) -> Result<bool, StoreError> {
        let count = self
            .conn
            .execute("DELETE FROM sites WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    // ==================== Sitemaps ====================

    /// Insert a sitemap or overwrite its submission state.
    ///
    /// `last_submitted` and `is_pending` always take the supplied values,
    /// absent ones included.
    pub fn upsert_sitemap(
        &self,
        site_id: SiteId,
        url: &str,
        last_submitted: Option<&str>,
        is_pending: Option<bool>,
    ) -> Result<SitemapId, StoreError> {
        let id = self
            .conn
            .query_row(
                r#"
                INSERT INTO sitemaps (site_id, url, last_submitted, is_pending)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(site_id, url) DO UPDATE SET
                    last_submitted = excluded.last_submitted,
                    is_pending = excluded.is_pending
                RETURNING id
                "#,
                params![site_id, url, last_submitted, is_pending],
                |row| row.get(0),
            )
            .map_err(|err| child_write_error(err, "site", site_id))?;

        Ok(id)
    }

    /// Sitemaps of a site in the order they were first recorded
    pub fn list_sitemaps(&self, site_id: SiteId) -> Result<Vec<Sitemap>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM sitemaps WHERE site_id = ?1 ORDER BY id",
            SITEMAP_COLUMNS
        ))?;
        let rows = stmt.query_map(params![site_id], sitemap_from_row)?;

        let mut sitemaps = Vec::new();
        for row in rows {
            sitemaps.push(row?);
        }
        Ok(sitemaps)
    }

    // ==================== Pages ====================

    /// Insert a page or apply a partial update to it.
    ///
    /// On insert, `in_sitemap` defaults to false. On update, only fields
    /// present in the patch overwrite stored values.
    pub fn upsert_page(
        &self,
        site_id: SiteId,
        url: &str,
        patch: &PagePatch,
    ) -> Result<PageId, StoreError> {
        let id = self
            .conn
            .query_row(
                r#"
                INSERT INTO urls (
                    site_id, url, in_sitemap, http_status, last_seen,
                    last_modified, change_freq, priority
                ) VALUES (
                    ?1, ?2, COALESCE(?3, 0), ?4,
                    CASE WHEN ?5 THEN datetime('now') END,
                    ?6, ?7, ?8
                )
                ON CONFLICT(site_id, url) DO UPDATE SET
                    in_sitemap = COALESCE(?3, in_sitemap),
                    http_status = COALESCE(?4, http_status),
                    last_seen = CASE WHEN ?5 THEN datetime('now') ELSE last_seen END,
                    last_modified = COALESCE(?6, last_modified),
                    change_freq = COALESCE(?7, change_freq),
                    priority = COALESCE(?8, priority)
                RETURNING id
                "#,
                params![
                    site_id,
                    url,
                    patch.in_sitemap,
                    patch.http_status,
                    patch.seen_now,
                    patch.last_modified,
                    patch.change_freq.map(|c| c.as_str()),
                    patch.priority,
                ],
                |row| row.get(0),
            )
            .map_err(|err| child_write_error(err, "site", site_id))?;

        Ok(id)
    }

    pub fn get_page(&self, id: PageId) -> Result<Option<Page>, StoreError> {
        let page = self
            .conn
            .query_row(
                &format!("SELECT {} FROM urls u WHERE u.id = ?1", PAGE_COLUMNS),
                params![id],
                |row| page_from_row(row, 0),
            )
            .optional()?;

        Ok(page)
    }

    pub fn get_page_by_url(&self, site_id: SiteId, url: &str) -> Result<Option<Page>, StoreError> {
        let page = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM urls u WHERE u.site_id = ?1 AND u.url = ?2",
                    PAGE_COLUMNS
                ),
                params![site_id, url],
                |row| page_from_row(row, 0),
            )
            .optional()?;

        Ok(page)
    }

    /// Pages of a site ordered by id
    pub fn list_pages(&self, site_id: SiteId) -> Result<Vec<Page>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM urls u WHERE u.site_id = ?1 ORDER BY u.id",
            PAGE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![site_id], |row| page_from_row(row, 0))?;

        let mut pages = Vec::new();
        for row in rows {
            pages.push(row?);
        }
        Ok(pages)
    }

    // ==================== Inspections ====================

    /// Append an inspection snapshot for a page
    pub fn record_inspection(
        &self,
        page_id: PageId,
        inspection: &NewInspection,
    ) -> Result<InspectionId, StoreError> {
        let inspected_at = inspection
            .inspected_at
            .unwrap_or_else(|| Utc::now().naive_utc());
        let referring_urls_json = serde_json::to_string(&inspection.referring_urls)?;
        let raw_json = serde_json::to_string(&inspection.raw)?;

        self.conn
            .execute(
                r#"
                INSERT INTO inspections (
                    url_id, inspected_at, index_status, coverage_state, robots_txt_state,
                    canonical_url, page_fetch_state, last_crawl_time,
                    referring_urls_json, raw_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    page_id,
                    timestamp(inspected_at),
                    inspection.index_status,
                    inspection.coverage_state,
                    inspection.robots_txt_state,
                    inspection.canonical_url,
                    inspection.page_fetch_state,
                    inspection.last_crawl_time,
                    referring_urls_json,
                    raw_json,
                ],
            )
            .map_err(|err| child_write_error(err, "page", page_id))?;

        Ok(self.conn.last_insert_rowid())
    }

    /// The most recent inspection of a page; ties on time go to the newest row
    pub fn latest_inspection(&self, page_id: PageId) -> Result<Option<Inspection>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM inspections WHERE url_id = ?1 \
                     ORDER BY inspected_at DESC, id DESC LIMIT 1",
                    INSPECTION_COLUMNS
                ),
                params![page_id],
                InspectionRow::from_row,
            )
            .optional()?;

        row.map(InspectionRow::into_inspection).transpose()
    }

    /// All inspections of a page, oldest first
    pub fn list_inspections(&self, page_id: PageId) -> Result<Vec<Inspection>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM inspections WHERE url_id = ?1 ORDER BY inspected_at, id",
            INSPECTION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![page_id], InspectionRow::from_row)?;

        let mut inspections = Vec::new();
        for row in rows {
            inspections.push(row?.into_inspection()?);
        }
        Ok(inspections)
    }

    // ==================== Reports ====================

    /// Pages whose latest inspection is missing or not [`INDEXED_STATUS`]
    pub fn unindexed_pages(&self, site_id: SiteId) -> Result<Vec<UnindexedPage>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            WITH latest AS (
                SELECT url_id, index_status, coverage_state,
                       ROW_NUMBER() OVER (
                           PARTITION BY url_id ORDER BY inspected_at DESC, id DESC
                       ) AS rn
                FROM inspections
            )
            SELECT {}, l.index_status, l.coverage_state
            FROM urls u
            LEFT JOIN latest l ON l.url_id = u.id AND l.rn = 1
            WHERE u.site_id = ?1
              AND (l.index_status IS NULL OR l.index_status != ?2)
            ORDER BY u.id
            "#,
            PAGE_COLUMNS
        ))?;

        let rows = stmt.query_map(params![site_id, INDEXED_STATUS], |row| {
            Ok(UnindexedPage {
                page: page_from_row(row, 0)?,
                latest_status: row.get(11)?,
                coverage_state: row.get(12)?,
            })
        })?;

        let mut pages = Vec::new();
        for row in rows {
            pages.push(row?);
        }
        Ok(pages)
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn stats(&self) -> Result<CatalogStats, StoreError> {
        let count = |sql: &str| -> Result<usize, StoreError> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        let schema_version: Option<u32> =
            self.conn
                .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                    row.get(0)
                })?;

        Ok(CatalogStats {
            sites: count("SELECT COUNT(*) FROM sites")?,
            sitemaps: count("SELECT COUNT(*) FROM sitemaps")?,
            pages: count("SELECT COUNT(*) FROM urls")?,
            pages_in_sitemap: count("SELECT COUNT(*) FROM urls WHERE in_sitemap = 1")?,
            inspections: count("SELECT COUNT(*) FROM inspections")?,
            schema_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn inspection(status: &str, when: NaiveDateTime) -> NewInspection {
        NewInspection {
            inspected_at: Some(when),
            index_status: Some(status.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_database_creation() {
        let db = Database::open_in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.sites, 0);
        assert_eq!(stats.pages, 0);
        assert_eq!(stats.schema_version, Some(2));
    }

    #[test]
    fn test_ensure_site_is_idempotent() {
        let db = Database::open_in_memory().unwrap();

        let id = db.ensure_site("https://ex.com/", None).unwrap();
        assert_eq!(db.ensure_site("https://ex.com/", None).unwrap(), id);
        assert_eq!(db.get_site(id).unwrap().unwrap().name, None);

        assert_eq!(db.ensure_site("https://ex.com/", Some("Example")).unwrap(), id);
        assert_eq!(db.ensure_site("https://ex.com/", Some("Other")).unwrap(), id);

        let site = db.get_site_by_url("https://ex.com/").unwrap().unwrap();
        assert_eq!(site.id, id);
        assert_eq!(site.name.as_deref(), Some("Example"));
        assert_eq!(db.list_sites().unwrap().len(), 1);
    }

    #[test]
    fn test_insert_site_conflict() {
        let db = Database::open_in_memory().unwrap();
        db.insert_site("https://ex.com/", None).unwrap();

        let err = db.insert_site("https://ex.com/", Some("again")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_upsert_sitemap_last_write_wins() {
        let db = Database::open_in_memory().unwrap();
        let site = db.ensure_site("https://ex.com/", None).unwrap();

        let id = db
            .upsert_sitemap(site, "https://ex.com/sitemap.xml", Some("2024-01-01T00:00:00Z"), Some(true))
            .unwrap();
        let again = db
            .upsert_sitemap(site, "https://ex.com/sitemap.xml", None, Some(false))
            .unwrap();
        assert_eq!(id, again);

        let sitemaps = db.list_sitemaps(site).unwrap();
        assert_eq!(sitemaps.len(), 1);
        assert_eq!(sitemaps[0].url, "https://ex.com/sitemap.xml");
        assert_eq!(sitemaps[0].last_submitted, None);
        assert_eq!(sitemaps[0].is_pending, Some(false));
    }

    #[test]
    fn test_sitemap_requires_site() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .upsert_sitemap(42, "https://ex.com/sitemap.xml", None, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "site", id: 42 }));
    }

    #[test]
    fn test_upsert_page_create_defaults() {
        let db = Database::open_in_memory().unwrap();
        let site = db.ensure_site("https://ex.com/", None).unwrap();

        let id = db
            .upsert_page(site, "https://ex.com/a", &PagePatch::new().unseen())
            .unwrap();
        let page = db.get_page(id).unwrap().unwrap();

        assert!(!page.in_sitemap);
        assert_eq!(page.last_seen, None);
        assert_eq!(page.http_status, None);
    }

    #[test]
    fn test_upsert_page_partial_update() {
        let db = Database::open_in_memory().unwrap();
        let site = db.ensure_site("https://ex.com/", None).unwrap();

        let patch = PagePatch::new()
            .in_sitemap(true)
            .http_status(200)
            .last_modified("2024-05-01")
            .change_freq(ChangeFrequency::Daily)
            .priority(0.5);
        let id = db.upsert_page(site, "https://ex.com/a", &patch).unwrap();

        let again = db
            .upsert_page(site, "https://ex.com/a", &PagePatch::new().http_status(404))
            .unwrap();
        assert_eq!(id, again);

        let page = db.get_page_by_url(site, "https://ex.com/a").unwrap().unwrap();
        assert!(page.in_sitemap);
        assert_eq!(page.http_status, Some(404));
        assert_eq!(page.last_modified.as_deref(), Some("2024-05-01"));
        assert_eq!(page.change_freq, Some(ChangeFrequency::Daily));
        assert_eq!(page.priority, Some(0.5));
        assert!(page.last_seen.is_some());
        assert_eq!(db.list_pages(site).unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_page_seen_now_suppressed() {
        let db = Database::open_in_memory().unwrap();
        let site = db.ensure_site("https://ex.com/", None).unwrap();
        let id = db
            .upsert_page(site, "https://ex.com/a", &PagePatch::new())
            .unwrap();

        db.conn
            .execute(
                "UPDATE urls SET last_seen = '2000-01-01 00:00:00' WHERE id = ?1",
                params![id],
            )
            .unwrap();

        db.upsert_page(site, "https://ex.com/a", &PagePatch::new().unseen().in_sitemap(false))
            .unwrap();
        let page = db.get_page(id).unwrap().unwrap();
        assert_eq!(page.last_seen.map(timestamp).as_deref(), Some("2000-01-01 00:00:00"));

        db.upsert_page(site, "https://ex.com/a", &PagePatch::new()).unwrap();
        let page = db.get_page(id).unwrap().unwrap();
        assert_ne!(page.last_seen.map(timestamp).as_deref(), Some("2000-01-01 00:00:00"));
    }

    #[test]
    fn test_pages_are_scoped_by_site() {
        let db = Database::open_in_memory().unwrap();
        let a = db.ensure_site("https://a.com/", None).unwrap();
        let b = db.ensure_site("https://b.com/", None).unwrap();

        let pa = db.upsert_page(a, "https://shared/x", &PagePatch::new()).unwrap();
        let pb = db.upsert_page(b, "https://shared/x", &PagePatch::new()).unwrap();
        assert_ne!(pa, pb);
    }

    #[test]
    fn test_inspections_append_and_latest() {
        let db = Database::open_in_memory().unwrap();
        let site = db.ensure_site("https://ex.com/", None).unwrap();
        let page = db.upsert_page(site, "https://ex.com/a", &PagePatch::new()).unwrap();

        assert!(db.latest_inspection(page).unwrap().is_none());

        db.record_inspection(page, &inspection("NEUTRAL", at(10, 0))).unwrap();
        let newest = db.record_inspection(page, &inspection("INDEXED", at(12, 0))).unwrap();
        db.record_inspection(page, &inspection("FAIL", at(11, 0))).unwrap();

        assert_eq!(db.list_inspections(page).unwrap().len(), 3);
        let latest = db.latest_inspection(page).unwrap().unwrap();
        assert_eq!(latest.id, newest);
        assert!(latest.is_indexed());
    }

    #[test]
    fn test_latest_inspection_tie_breaks_on_id() {
        let db = Database::open_in_memory().unwrap();
        let site = db.ensure_site("https://ex.com/", None).unwrap();
        let page = db.upsert_page(site, "https://ex.com/a", &PagePatch::new()).unwrap();

        db.record_inspection(page, &inspection("INDEXED", at(9, 0))).unwrap();
        let second = db.record_inspection(page, &inspection("FAIL", at(9, 0))).unwrap();

        let latest = db.latest_inspection(page).unwrap().unwrap();
        assert_eq!(latest.id, second);
        assert_eq!(latest.index_status.as_deref(), Some("FAIL"));
    }

    #[test]
    fn test_inspection_payloads_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let site = db.ensure_site("https://ex.com/", None).unwrap();
        let page = db.upsert_page(site, "https://ex.com/a", &PagePatch::new()).unwrap();

        let new = NewInspection {
            index_status: Some("INDEXED".to_string()),
            canonical_url: Some("https://ex.com/a".to_string()),
            referring_urls: vec!["https://ex.com/".to_string()],
            raw: json!({"inspectionResult": {"indexStatusResult": {"verdict": "PASS"}}}),
            ..Default::default()
        };
        db.record_inspection(page, &new).unwrap();

        let stored = db.latest_inspection(page).unwrap().unwrap();
        assert_eq!(stored.referring_urls, vec!["https://ex.com/"]);
        assert_eq!(stored.raw["inspectionResult"]["indexStatusResult"]["verdict"], "PASS");
        assert_eq!(stored.canonical_url.as_deref(), Some("https://ex.com/a"));
    }

    #[test]
    fn test_inspection_requires_page() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .record_inspection(7, &NewInspection::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "page", id: 7 }));
    }

    #[test]
    fn test_unindexed_pages() {
        let db = Database::open_in_memory().unwrap();
        let site = db.ensure_site("https://ex.com/", None).unwrap();
        let a = db.upsert_page(site, "https://ex.com/a", &PagePatch::new()).unwrap();
        let b = db.upsert_page(site, "https://ex.com/b", &PagePatch::new()).unwrap();
        let c = db.upsert_page(site, "https://ex.com/c", &PagePatch::new()).unwrap();

        db.record_inspection(b, &inspection("INDEXED", at(8, 0))).unwrap();
        db.record_inspection(c, &inspection("INDEXED", at(8, 0))).unwrap();
        db.record_inspection(c, &inspection("NOT_INDEXED", at(9, 0))).unwrap();

        let unindexed = db.unindexed_pages(site).unwrap();
        let ids: Vec<_> = unindexed.iter().map(|u| u.page.id).collect();
        assert_eq!(ids, vec![a, c]);
        assert_eq!(unindexed[0].latest_status, None);
        assert_eq!(unindexed[1].latest_status.as_deref(), Some("NOT_INDEXED"));
    }

    #[test]
    fn test_unindexed_pages_ignores_other_sites() {
        let db = Database::open_in_memory().unwrap();
        let site = db.ensure_site("https://ex.com/", None).unwrap();
        let other = db.ensure_site("https://other.com/", None).unwrap();
        db.upsert_page(other, "https://other.com/a", &PagePatch::new()).unwrap();

        assert!(db.unindexed_pages(site).unwrap().is_empty());
        assert_eq!(db.unindexed_pages(other).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_site_cascades() {
        let db = Database::open_in_memory().unwrap();
        let site = db.ensure_site("https://ex.com/", None).unwrap();
        db.upsert_sitemap(site, "https://ex.com/sitemap.xml", None, None).unwrap();
        let page = db.upsert_page(site, "https://ex.com/a", &PagePatch::new()).unwrap();
        db.record_inspection(page, &NewInspection::default()).unwrap();

        assert!(db.delete_site(site).unwrap());
        let stats = db.stats().unwrap();
        assert_eq!(stats.sites, 0);
        assert_eq!(stats.sitemaps, 0);
        assert_eq!(stats.pages, 0);
        assert_eq!(stats.inspections, 0);
        assert!(!db.delete_site(site).unwrap());
    }

    #[test]
    fn test_reopen_does_not_reapply_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.db");

        let first = {
            let db = Database::open(&path).unwrap();
            db.ensure_site("https://ex.com/", None).unwrap();
            db.applied_migrations().unwrap()
        };
        assert_eq!(
            first.iter().map(|m| m.version).collect::<Vec<_>>(),
            vec![1, 2]
        );

        let mut db = Database::open(&path).unwrap();
        assert_eq!(db.applied_migrations().unwrap(), first);
        assert!(db.migrate().unwrap().is_empty());
        assert!(db.get_site_by_url("https://ex.com/").unwrap().is_some());
    }
}
