//! Search Console integration
//!
//! This module reconciles remote index metadata into the catalog:
//! - Verified properties and their submitted sitemaps
//! - URL inspection results, recorded as inspection snapshots

mod client;

pub use client::{SearchConsoleClient, DEFAULT_ENDPOINT};

use crate::storage::{Database, NewInspection, SiteId, StoreError, INDEXED_STATUS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Verdict the inspection API reports for indexed pages
const PASS_VERDICT: &str = "PASS";

/// Errors raised by a remote index service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no Search Console access token configured")]
    MissingToken,

    #[error("invalid Search Console endpoint {0}")]
    InvalidEndpoint(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request to {url} failed with {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Errors raised while reconciling remote metadata into the catalog
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A property the account can access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteEntry {
    pub site_url: String,
    #[serde(default)]
    pub permission_level: Option<String>,
}

/// A sitemap submitted for a property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitemapEntry {
    pub path: String,
    #[serde(default)]
    pub last_submitted: Option<String>,
    #[serde(default)]
    pub last_downloaded: Option<String>,
    #[serde(default)]
    pub is_pending: Option<bool>,
    #[serde(default)]
    pub is_sitemaps_index: Option<bool>,
}

/// Result of inspecting one URL
#[derive(Debug, Clone, PartialEq)]
pub struct UrlInspection {
    /// `INDEXED` for a passing verdict, otherwise the verdict as reported
    pub index_status: Option<String>,
    pub coverage_state: Option<String>,
    pub robots_txt_state: Option<String>,
    pub canonical_url: Option<String>,
    pub page_fetch_state: Option<String>,
    pub last_crawl_time: Option<String>,
    pub referring_urls: Vec<String>,
    /// Full response body
    pub raw: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InspectResponse {
    #[serde(default)]
    inspection_result: InspectionResult,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InspectionResult {
    #[serde(default)]
    index_status_result: IndexStatusResult,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStatusResult {
    verdict: Option<String>,
    coverage_state: Option<String>,
    robots_txt_state: Option<String>,
    google_canonical: Option<String>,
    user_canonical: Option<String>,
    page_fetch_state: Option<String>,
    last_crawl_time: Option<String>,
    #[serde(default)]
    referring_urls: Vec<String>,
}

impl UrlInspection {
    /// Map an inspection response body
    pub fn from_response(raw: serde_json::Value) -> Result<Self, serde_json::Error> {
        let response: InspectResponse = serde_json::from_value(raw.clone())?;
        let status = response.inspection_result.index_status_result;

        let index_status = status.verdict.map(|verdict| {
            if verdict == PASS_VERDICT {
                INDEXED_STATUS.to_string()
            } else {
                verdict
            }
        });

        Ok(Self {
            index_status,
            coverage_state: status.coverage_state,
            robots_txt_state: status.robots_txt_state,
            canonical_url: status.google_canonical.or(status.user_canonical),
            page_fetch_state: status.page_fetch_state,
            last_crawl_time: status.last_crawl_time,
            referring_urls: status.referring_urls,
            raw,
        })
    }

    /// Snapshot to record, stamped with the current time
    pub fn into_new_inspection(self) -> NewInspection {
        NewInspection {
            inspected_at: None,
            index_status: self.index_status,
            coverage_state: self.coverage_state,
            robots_txt_state: self.robots_txt_state,
            canonical_url: self.canonical_url,
            page_fetch_state: self.page_fetch_state,
            last_crawl_time: self.last_crawl_time,
            referring_urls: self.referring_urls,
            raw: self.raw,
        }
    }
}

/// Remote search-index service
pub trait IndexService {
    /// Properties the account can access
    fn list_sites(&self) -> Result<Vec<SiteEntry>, ServiceError>;

    /// Sitemaps submitted for a property
    fn list_sitemaps(&self, site_url: &str) -> Result<Vec<SitemapEntry>, ServiceError>;

    /// A single submitted sitemap
    fn get_sitemap(&self, site_url: &str, path: &str) -> Result<SitemapEntry, ServiceError>;

    /// Inspect the index status of `url` within a property
    fn inspect_url(&self, site_url: &str, url: &str) -> Result<UrlInspection, ServiceError>;
}

/// Outcome of [`sync_sites`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub sites: usize,
    pub sitemaps: usize,
}

/// Outcome of [`inspect_site`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    pub inspected: usize,
    pub indexed: usize,
}

/// Record every remote property and its sitemaps in the catalog
pub fn sync_sites<S: IndexService + ?Sized>(
    db: &Database,
    service: &S,
) -> Result<SyncReport, SyncError> {
    let mut report = SyncReport::default();

    for entry in service.list_sites()? {
        let site_id = db.ensure_site(&entry.site_url, None)?;
        report.sites += 1;

        let sitemaps = service.list_sitemaps(&entry.site_url)?;
        debug!(site = %entry.site_url, sitemaps = sitemaps.len(), "syncing sitemaps");

        for sitemap in sitemaps {
            db.upsert_sitemap(
                site_id,
                &sitemap.path,
                sitemap.last_submitted.as_deref(),
                sitemap.is_pending,
            )?;
            report.sitemaps += 1;
        }
    }

    info!(sites = report.sites, sitemaps = report.sitemaps, "synced sites");
    Ok(report)
}

/// Inspect up to `limit` pages of a site and record each result.
///
/// Pages are inspected in id order. The first service error ends the run;
/// inspections already recorded are kept.
pub fn inspect_site<S: IndexService + ?Sized>(
    db: &Database,
    service: &S,
    site_id: SiteId,
    limit: Option<usize>,
) -> Result<InspectReport, SyncError> {
    let site = db.get_site(site_id)?.ok_or(StoreError::NotFound {
        entity: "site",
        id: site_id,
    })?;

    let pages = db.list_pages(site_id)?;
    let limit = limit.unwrap_or(pages.len());
    if pages.len() > limit {
        warn!(site = %site.base_url, total = pages.len(), limit, "inspecting a subset of pages");
    }

    let mut report = InspectReport::default();
    for page in pages.into_iter().take(limit) {
        let inspection = service.inspect_url(&site.base_url, &page.url)?;
        debug!(url = %page.url, status = ?inspection.index_status, "inspected page");

        let inspection = inspection.into_new_inspection();
        if inspection.index_status.as_deref() == Some(INDEXED_STATUS) {
            report.indexed += 1;
        }
        db.record_inspection(page.id, &inspection)?;
        report.inspected += 1;
    }

    info!(
        site = %site.base_url,
        inspected = report.inspected,
        indexed = report.indexed,
        "inspection finished"
    );
    Ok(report)
}
