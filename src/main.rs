//! sitecatalog - Sitemap and index-status catalog
//!
//! Records the pages a site's sitemaps list, together with Search Console
//! inspection history, in a local SQLite catalog.

use anyhow::Result;
use sitecatalog::cli::{
    add_site, add_sitemap, ingest_sitemaps, init, inspect, status, sync_sites, unindexed, Cli,
    Commands,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Setup logging; stdout is reserved for command output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = cli.resolve_config()?;
    let format = cli.format;

    // Execute command
    match cli.command {
        Commands::Init(_args) => {
            init(&config, format)?;
        }

        Commands::AddSite(args) => {
            add_site(&config, &args.base_url, args.name.as_deref(), format)?;
        }

        Commands::AddSitemap(args) => {
            add_sitemap(&config, &args.site, &args.sitemap_url, format)?;
        }

        Commands::SyncSites(_args) => {
            sync_sites(&config, format)?;
        }

        Commands::IngestSitemaps(args) => {
            ingest_sitemaps(&config, &args.site, args.max_urls, args.max_depth, format)?;
        }

        Commands::Inspect(args) => {
            inspect(&config, &args.site, args.limit, format)?;
        }

        Commands::Unindexed(args) => {
            unindexed(&config, &args.site, format)?;
        }

        Commands::Status(args) => {
            status(&config, args.migrations, format)?;
        }
    }

    Ok(())
}
