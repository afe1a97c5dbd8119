//! Command implementations

use super::OutputFormat;
use crate::config::CatalogConfig;
use crate::ingest::ingest_site_by_url;
use crate::search_console::{self, SearchConsoleClient};
use crate::sitemap::{HttpFetcher, SitemapReader};
use crate::storage::{Database, Site};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;

/// Open the catalog, failing if it was never initialized
fn open_catalog(config: &CatalogConfig) -> Result<Database> {
    let path = &config.database.path;
    if !path.exists() {
        anyhow::bail!(
            "Catalog not initialized at {:?}. Run 'sitecatalog init' first.",
            path
        );
    }

    Database::open(path).with_context(|| format!("Failed to open catalog at {:?}", path))
}

fn require_site(db: &Database, base_url: &str) -> Result<Site> {
    db.get_site_by_url(base_url)?.ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown site: {}. Run 'sitecatalog add-site' first.",
            base_url
        )
    })
}

fn search_console_client(config: &CatalogConfig) -> Result<SearchConsoleClient> {
    SearchConsoleClient::new(
        &config.search_console.endpoint,
        config.search_console.access_token.as_deref(),
        &config.http.user_agent,
        config.http.timeout(),
    )
    .context("Failed to create Search Console client")
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Create the catalog database and apply migrations
pub fn init(config: &CatalogConfig, format: OutputFormat) -> Result<()> {
    let path = &config.database.path;
    let db = Database::open(path)
        .with_context(|| format!("Failed to initialize catalog at {:?}", path))?;
    let migrations = db.applied_migrations()?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "database": path,
            "migrations": migrations,
        }))?,
        OutputFormat::Text => {
            println!("✓ Initialized catalog at {:?}", path);
            if let Some(latest) = migrations.last() {
                println!("  Schema version: {}", latest.version);
            }
        }
    }

    Ok(())
}

/// Register a site
pub fn add_site(
    config: &CatalogConfig,
    base_url: &str,
    name: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let db = open_catalog(config)?;
    let id = db.ensure_site(base_url, name)?;
    let site = db
        .get_site(id)?
        .ok_or_else(|| anyhow::anyhow!("Site {} vanished after insert", id))?;

    match format {
        OutputFormat::Json => print_json(&site)?,
        OutputFormat::Text => {
            println!("✓ Site {} (id {})", site.base_url, site.id);
            if let Some(ref name) = site.name {
                println!("  Name: {}", name);
            }
        }
    }

    Ok(())
}

/// Register a sitemap for a known site
pub fn add_sitemap(
    config: &CatalogConfig,
    site_url: &str,
    sitemap_url: &str,
    format: OutputFormat,
) -> Result<()> {
    let parsed = url::Url::parse(sitemap_url)
        .with_context(|| format!("Invalid sitemap URL: {}", sitemap_url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("Sitemap URL must use http or https: {}", sitemap_url);
    }

    let db = open_catalog(config)?;
    let site = require_site(&db, site_url)?;

    // Keep submission state a previous sync may have recorded
    let existing = db
        .list_sitemaps(site.id)?
        .into_iter()
        .find(|s| s.url == sitemap_url);
    let (last_submitted, is_pending) = existing
        .map(|s| (s.last_submitted, s.is_pending))
        .unwrap_or_default();

    let id = db.upsert_sitemap(site.id, sitemap_url, last_submitted.as_deref(), is_pending)?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "id": id,
            "site_id": site.id,
            "url": sitemap_url,
        }))?,
        OutputFormat::Text => println!("✓ Sitemap {} (id {}) for {}", sitemap_url, id, site.base_url),
    }

    Ok(())
}

/// Import sites and sitemaps from Search Console
pub fn sync_sites(config: &CatalogConfig, format: OutputFormat) -> Result<()> {
    let client = search_console_client(config)?;
    let db = open_catalog(config)?;

    let report = search_console::sync_sites(&db, &client).context("Failed to sync sites")?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!("✓ Synced {} site(s)", report.sites);
            println!("  Sitemaps: {}", report.sitemaps);
        }
    }

    Ok(())
}

/// Read a site's sitemaps and record the pages they list
pub fn ingest_sitemaps(
    config: &CatalogConfig,
    site_url: &str,
    max_urls: Option<usize>,
    max_depth: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let db = open_catalog(config)?;

    let fetcher = HttpFetcher::new(&config.http.user_agent, config.http.timeout())
        .context("Failed to create HTTP client")?;
    let reader = SitemapReader::new(fetcher)
        .with_max_depth(max_depth.unwrap_or(config.sitemap.max_depth));

    let report = ingest_site_by_url(&db, &reader, site_url, max_urls.or(config.sitemap.max_urls))
        .with_context(|| format!("Failed to ingest sitemaps for {}", site_url))?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            if report.sitemaps == 0 {
                println!("No sitemaps registered for {}", site_url);
            } else {
                println!("✓ Ingested {} sitemap(s) for {}", report.sitemaps, site_url);
                println!("  Pages processed: {}", report.pages_processed);
            }
        }
    }

    Ok(())
}

/// Record Search Console inspections for a site's pages
pub fn inspect(
    config: &CatalogConfig,
    site_url: &str,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let client = search_console_client(config)?;
    let db = open_catalog(config)?;
    let site = require_site(&db, site_url)?;

    let report = search_console::inspect_site(&db, &client, site.id, limit)
        .with_context(|| format!("Failed to inspect pages of {}", site.base_url))?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!("✓ Inspected {} page(s) of {}", report.inspected, site.base_url);
            println!("  Indexed: {}", report.indexed);
        }
    }

    Ok(())
}

/// List pages whose latest inspection is not indexed
pub fn unindexed(config: &CatalogConfig, site_url: &str, format: OutputFormat) -> Result<()> {
    let db = open_catalog(config)?;
    let site = require_site(&db, site_url)?;
    let pages = db.unindexed_pages(site.id)?;

    match format {
        OutputFormat::Json => print_json(&pages)?,
        OutputFormat::Text => {
            if pages.is_empty() {
                println!("✓ Every page of {} is indexed", site.base_url);
                return Ok(());
            }

            println!("Unindexed pages of {} ({})", site.base_url, pages.len());
            println!("----------------------------------------\n");
            for entry in &pages {
                let status = entry.latest_status.as_deref().unwrap_or("never inspected");
                println!("{}", entry.page.url);
                println!("   Status: {}", status);
                if let Some(ref coverage) = entry.coverage_state {
                    println!("   Coverage: {}", coverage);
                }
            }
        }
    }

    Ok(())
}

/// Show catalog statistics
pub fn status(config: &CatalogConfig, show_migrations: bool, format: OutputFormat) -> Result<()> {
    let db = open_catalog(config)?;
    let stats = db.stats()?;
    let migrations = db.applied_migrations()?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "database": config.database.path,
            "stats": stats,
            "migrations": migrations,
        }))?,
        OutputFormat::Text => {
            println!("sitecatalog Status");
            println!("==================\n");

            println!("Database: {:?}", config.database.path);
            match stats.schema_version {
                Some(version) => println!("Schema version: {}", version),
                None => println!("Schema version: none"),
            }
            println!("Sites: {}", stats.sites);
            println!("Sitemaps: {}", stats.sitemaps);
            println!("Pages: {} ({} in sitemaps)", stats.pages, stats.pages_in_sitemap);
            println!("Inspections: {}", stats.inspections);

            if show_migrations {
                println!("\nMigrations:");
                for migration in &migrations {
                    println!("  {}  applied {}", migration.version, migration.applied_at);
                }
            }
        }
    }

    Ok(())
}
