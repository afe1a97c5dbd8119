//! Versioned schema migrations
//!
//! Every migration runs in its own transaction together with the insert of its
//! ledger row, so a version is either fully applied and recorded or not at all.

use super::models::AppliedMigration;
use super::StoreError;
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// A schema change identified by its version
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// The ledger of applied versions, created before any migration runs
pub const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT    NOT NULL DEFAULT (datetime('now'))
);
"#;

/// All known migrations, in ascending version order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "initial catalog schema",
        sql: r#"
CREATE TABLE sites (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT,
    base_url    TEXT    NOT NULL UNIQUE,
    created_at  TEXT    NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE sitemaps (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id        INTEGER NOT NULL,
    url            TEXT    NOT NULL,
    last_submitted TEXT,
    is_pending     INTEGER,
    discovered_at  TEXT    NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (site_id) REFERENCES sites(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX sitemaps_site_url_uq ON sitemaps(site_id, url);

CREATE TABLE urls (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id       INTEGER NOT NULL,
    url           TEXT    NOT NULL,
    first_seen    TEXT    NOT NULL DEFAULT (datetime('now')),
    last_seen     TEXT,
    in_sitemap    INTEGER NOT NULL DEFAULT 0,
    http_status   INTEGER,
    last_crawled  TEXT,
    last_modified TEXT,
    change_freq   TEXT,
    priority      REAL,
    FOREIGN KEY (site_id) REFERENCES sites(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX urls_site_url_uq ON urls(site_id, url);

CREATE TABLE inspections (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id              INTEGER NOT NULL,
    inspected_at        TEXT    NOT NULL DEFAULT (datetime('now')),
    index_status        TEXT,
    coverage_state      TEXT,
    robots_txt_state    TEXT,
    canonical_url       TEXT,
    page_fetch_state    TEXT,
    last_crawl_time     TEXT,
    referring_urls_json TEXT,
    raw_json            TEXT,
    FOREIGN KEY (url_id) REFERENCES urls(id) ON DELETE CASCADE
);

CREATE INDEX inspections_url_idx ON inspections(url_id);
"#,
    },
    Migration {
        version: 2,
        description: "index inspections by recency",
        sql: r#"
CREATE INDEX inspections_url_recent_idx
    ON inspections(url_id, inspected_at DESC, id DESC);
"#,
    },
];

/// Read the ledger, oldest version first
pub(crate) fn applied_migrations(conn: &Connection) -> Result<Vec<AppliedMigration>, StoreError> {
    conn.execute_batch(LEDGER_SCHEMA)?;

    let mut stmt =
        conn.prepare("SELECT version, applied_at FROM schema_migrations ORDER BY version")?;
    let rows = stmt.query_map([], |row| {
        Ok(AppliedMigration {
            version: row.get(0)?,
            applied_at: row.get(1)?,
        })
    })?;

    let mut applied = Vec::new();
    for row in rows {
        applied.push(row?);
    }
    Ok(applied)
}

/// Apply every migration missing from the ledger, in ascending order.
///
/// Returns the versions applied by this call.
pub(crate) fn apply_pending(
    conn: &mut Connection,
    migrations: &[Migration],
) -> Result<Vec<u32>, StoreError> {
    if let Some(pair) = migrations.windows(2).find(|w| w[0].version >= w[1].version) {
        return Err(StoreError::MigrationOrder(format!(
            "migration {} is listed before migration {}",
            pair[0].version, pair[1].version
        )));
    }

    let applied: BTreeSet<u32> = applied_migrations(conn)?
        .into_iter()
        .map(|m| m.version)
        .collect();

    let known: BTreeSet<u32> = migrations.iter().map(|m| m.version).collect();
    for unknown in applied.difference(&known) {
        warn!(version = unknown, "database has a migration this build does not know");
    }

    let pending: Vec<&Migration> = migrations
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .collect();

    if let (Some(first), Some(newest)) = (pending.first(), applied.last()) {
        if first.version < *newest {
            return Err(StoreError::MigrationOrder(format!(
                "migration {} is pending but version {} is already applied",
                first.version, newest
            )));
        }
    }

    let mut newly_applied = Vec::with_capacity(pending.len());
    for migration in pending {
        let failed = |source| StoreError::Migration {
            version: migration.version,
            description: migration.description,
            source,
        };

        let tx = conn.transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            params![migration.version],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;

        info!(
            version = migration.version,
            description = migration.description,
            "applied migration"
        );
        newly_applied.push(migration.version);
    }

    if newly_applied.is_empty() {
        debug!("database schema is up to date");
    }

    Ok(newly_applied)
}
