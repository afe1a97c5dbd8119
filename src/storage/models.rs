//! Catalog records and write patches

use crate::sitemap::{ChangeFrequency, DiscoveredUrl};
use chrono::NaiveDateTime;
use serde::Serialize;

pub type SiteId = i64;
pub type SitemapId = i64;
pub type PageId = i64;
pub type InspectionId = i64;

/// Index status recorded for pages the search index reports as indexed
pub const INDEXED_STATUS: &str = "INDEXED";

/// A web property identified by its base URL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Site {
    pub id: SiteId,
    pub base_url: String,
    pub name: Option<String>,
    pub created_at: NaiveDateTime,
}

/// A sitemap submitted for a site
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sitemap {
    pub id: SitemapId,
    pub site_id: SiteId,
    pub url: String,
    pub last_submitted: Option<String>,
    pub is_pending: Option<bool>,
    pub discovered_at: NaiveDateTime,
}

/// A page URL known to belong to a site
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub id: PageId,
    pub site_id: SiteId,
    pub url: String,
    pub first_seen: NaiveDateTime,
    pub last_seen: Option<NaiveDateTime>,
    pub in_sitemap: bool,
    pub http_status: Option<u16>,
    pub last_crawled: Option<String>,
    pub last_modified: Option<String>,
    pub change_freq: Option<ChangeFrequency>,
    pub priority: Option<f64>,
}

/// Partial update for a page.
///
/// Every `None` leaves the stored value untouched; `seen_now` controls
/// whether `last_seen` is refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct PagePatch {
    pub in_sitemap: Option<bool>,
    pub http_status: Option<u16>,
    pub seen_now: bool,
    pub last_modified: Option<String>,
    pub change_freq: Option<ChangeFrequency>,
    pub priority: Option<f64>,
}

impl Default for PagePatch {
    fn default() -> Self {
        Self {
            in_sitemap: None,
            http_status: None,
            seen_now: true,
            last_modified: None,
            change_freq: None,
            priority: None,
        }
    }
}

impl PagePatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch for a page listed in a sitemap, carrying the entry's metadata
    pub fn from_discovered(entry: &DiscoveredUrl) -> Self {
        Self {
            in_sitemap: Some(true),
            last_modified: entry.last_modified.clone(),
            change_freq: entry.change_freq,
            priority: entry.priority,
            ..Self::default()
        }
    }

    pub fn in_sitemap(mut self, in_sitemap: bool) -> Self {
        self.in_sitemap = Some(in_sitemap);
        self
    }

    pub fn http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Leave `last_seen` as it is
    pub fn unseen(mut self) -> Self {
        self.seen_now = false;
        self
    }

    pub fn last_modified(mut self, value: impl Into<String>) -> Self {
        self.last_modified = Some(value.into());
        self
    }

    pub fn change_freq(mut self, value: ChangeFrequency) -> Self {
        self.change_freq = Some(value);
        self
    }

    pub fn priority(mut self, value: f64) -> Self {
        self.priority = Some(value);
        self
    }
}

/// Fields of an inspection snapshot to record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewInspection {
    /// Defaults to the current time when absent
    pub inspected_at: Option<NaiveDateTime>,
    pub index_status: Option<String>,
    pub coverage_state: Option<String>,
    pub robots_txt_state: Option<String>,
    pub canonical_url: Option<String>,
    pub page_fetch_state: Option<String>,
    pub last_crawl_time: Option<String>,
    pub referring_urls: Vec<String>,
    pub raw: serde_json::Value,
}

/// A recorded inspection snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inspection {
    pub id: InspectionId,
    pub page_id: PageId,
    pub inspected_at: NaiveDateTime,
    pub index_status: Option<String>,
    pub coverage_state: Option<String>,
    pub robots_txt_state: Option<String>,
    pub canonical_url: Option<String>,
    pub page_fetch_state: Option<String>,
    pub last_crawl_time: Option<String>,
    pub referring_urls: Vec<String>,
    pub raw: serde_json::Value,
}

impl Inspection {
    pub fn is_indexed(&self) -> bool {
        self.index_status.as_deref() == Some(INDEXED_STATUS)
    }
}

/// A page whose latest inspection does not report it as indexed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnindexedPage {
    pub page: Page,
    /// Index status of the latest inspection, absent if never inspected
    pub latest_status: Option<String>,
    pub coverage_state: Option<String>,
}

/// A row of the migration ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedMigration {
    pub version: u32,
    pub applied_at: NaiveDateTime,
}

/// Catalog statistics
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub sites: usize,
    pub sitemaps: usize,
    pub pages: usize,
    pub pages_in_sitemap: usize,
    pub inspections: usize,
    pub schema_version: Option<u32>,
}
