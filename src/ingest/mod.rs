//! Sitemap ingestion
//!
//! Feeds the sitemaps recorded for a site through a [`SitemapReader`] and
//! upserts every discovered page into the catalog.

use crate::sitemap::{Fetcher, SitemapError, SitemapReader};
use crate::storage::{Database, PagePatch, SiteId, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by an ingestion run
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no site registered for {0}")]
    UnknownSite(String),

    #[error(transparent)]
    Sitemap(#[from] SitemapError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of ingesting one site
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Sitemap roots read for the site
    pub sitemaps: usize,
    /// Entries upserted, duplicates included
    pub pages_processed: usize,
}

/// Ingest every sitemap recorded for `site_id`.
///
/// All of the site's sitemaps share one `max_urls` cap. The first reader
/// error aborts the run; pages written before it are kept.
pub fn ingest_site<F: Fetcher>(
    db: &Database,
    reader: &SitemapReader<F>,
    site_id: SiteId,
    max_urls: Option<usize>,
) -> Result<IngestReport, IngestError> {
    let roots: Vec<String> = db
        .list_sitemaps(site_id)?
        .into_iter()
        .map(|sitemap| sitemap.url)
        .collect();

    let mut report = IngestReport {
        sitemaps: roots.len(),
        pages_processed: 0,
    };

    if roots.is_empty() {
        info!(site_id, "site has no sitemaps to ingest");
        return Ok(report);
    }

    info!(site_id, sitemaps = roots.len(), ?max_urls, "ingesting sitemaps");

    for entry in reader.discover_from_roots(roots, max_urls) {
        let entry = entry?;
        db.upsert_page(site_id, &entry.loc, &PagePatch::from_discovered(&entry))?;
        report.pages_processed += 1;

        if report.pages_processed % 500 == 0 {
            debug!(site_id, pages = report.pages_processed, "ingestion progress");
        }
    }

    info!(
        site_id,
        sitemaps = report.sitemaps,
        pages = report.pages_processed,
        "ingestion finished"
    );
    Ok(report)
}

/// Resolve a site by base URL and ingest it
pub fn ingest_site_by_url<F: Fetcher>(
    db: &Database,
    reader: &SitemapReader<F>,
    base_url: &str,
    max_urls: Option<usize>,
) -> Result<IngestReport, IngestError> {
    let site = db
        .get_site_by_url(base_url)?
        .ok_or_else(|| IngestError::UnknownSite(base_url.to_string()))?;

    ingest_site(db, reader, site.id, max_urls)
}
