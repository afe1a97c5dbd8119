//! sitecatalog - Sitemap ingestion and index-status catalog
//!
//! This library discovers the pages a site's sitemaps list, records them in a
//! schema-versioned SQLite catalog, and reconciles them with Search Console
//! inspection results.

pub mod cli;
pub mod config;
pub mod ingest;
pub mod search_console;
pub mod sitemap;
pub mod storage;

/// Re-export commonly used types
pub use config::CatalogConfig;
pub use ingest::{ingest_site, ingest_site_by_url, IngestError, IngestReport};
pub use sitemap::{DiscoveredUrl, SitemapError, SitemapReader};
pub use storage::{Database, StoreError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "sitecatalog";
