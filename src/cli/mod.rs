//! CLI interface using clap
//!
//! Provides the command-line interface for sitecatalog

mod commands;

pub use commands::*;

use crate::config::CatalogConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sitecatalog - Sitemap and index-status catalog
#[derive(Parser, Debug)]
#[command(name = "sitecatalog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the catalog database (overrides the config file)
    #[arg(long, global = true, env = "SITECATALOG_DB")]
    pub db: Option<PathBuf>,

    /// Path to a config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Search Console access token (overrides the config file)
    #[arg(long, global = true, env = "SITECATALOG_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'o', long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the catalog database and apply migrations
    Init(InitArgs),

    /// Register a site by its base URL
    AddSite(AddSiteArgs),

    /// Register a sitemap for a site
    AddSitemap(AddSitemapArgs),

    /// Import sites and sitemaps from Search Console
    SyncSites(SyncSitesArgs),

    /// Read a site's sitemaps and record the pages they list
    IngestSitemaps(IngestArgs),

    /// Record Search Console inspections for a site's pages
    Inspect(InspectArgs),

    /// List pages whose latest inspection is not indexed
    Unindexed(UnindexedArgs),

    /// Show catalog statistics
    Status(StatusArgs),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Arguments for init command
#[derive(Parser, Debug)]
pub struct InitArgs {}

/// Arguments for add-site command
#[derive(Parser, Debug)]
pub struct AddSiteArgs {
    /// Base URL identifying the site (e.g. https://example.com/)
    pub base_url: String,

    /// Display name
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Arguments for add-sitemap command
#[derive(Parser, Debug)]
pub struct AddSitemapArgs {
    /// Base URL of the site
    #[arg(short, long)]
    pub site: String,

    /// Sitemap or sitemap index URL
    pub sitemap_url: String,
}

/// Arguments for sync-sites command
#[derive(Parser, Debug)]
pub struct SyncSitesArgs {}

/// Arguments for ingest-sitemaps command
#[derive(Parser, Debug)]
pub struct IngestArgs {
    /// Base URL of the site
    #[arg(short, long)]
    pub site: String,

    /// Stop after this many sitemap entries
    #[arg(long)]
    pub max_urls: Option<usize>,

    /// Deepest sitemap index nesting to expand
    #[arg(long)]
    pub max_depth: Option<usize>,
}

/// Arguments for inspect command
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Base URL of the site
    #[arg(short, long)]
    pub site: String,

    /// Inspect at most this many pages
    #[arg(short, long)]
    pub limit: Option<usize>,
}

/// Arguments for unindexed command
#[derive(Parser, Debug)]
pub struct UnindexedArgs {
    /// Base URL of the site
    #[arg(short, long)]
    pub site: String,
}

/// Arguments for status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Also list applied migrations
    #[arg(short, long)]
    pub migrations: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Load the config file and apply flag and environment overrides
    pub fn resolve_config(&self) -> Result<CatalogConfig> {
        let mut config = CatalogConfig::load(self.config.as_deref())?;

        if let Some(ref db) = self.db {
            config.database.path = db.clone();
        }
        if let Some(ref token) = self.access_token {
            config.search_console.access_token = Some(token.clone());
        }

        Ok(config)
    }
}
