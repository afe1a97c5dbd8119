//! Sitemap discovery
//!
//! This module turns sitemap locations into a flat sequence of page entries:
//! - Plain and gzip-compressed documents
//! - Depth-first expansion of sitemap indexes in document order
//! - A single entry cap shared across every root and nested child

mod fetch;
mod parser;

pub use fetch::{decode_body, is_marked_compressed, FetchedDocument, Fetcher, HttpFetcher};
pub use parser::{parse_document, SitemapDocument};

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::iter::FusedIterator;
use thiserror::Error;
use tracing::{debug, warn};

/// Default nesting limit for sitemap indexes
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Errors raised while reading sitemap documents
#[derive(Debug, Error)]
pub enum SitemapError {
    /// The document could not be retrieved
    #[error("failed to fetch sitemap {url}: {message}")]
    Fetch { url: String, message: String },

    /// The document was retrieved but is not a usable sitemap
    #[error("failed to parse sitemap {url}: {message}")]
    Parse { url: String, message: String },
}

impl SitemapError {
    /// Location of the document that failed
    pub fn url(&self) -> &str {
        match self {
            SitemapError::Fetch { url, .. } | SitemapError::Parse { url, .. } => url,
        }
    }
}

/// Value of a `<changefreq>` element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFrequency {
    Always,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl ChangeFrequency {
    /// Parse a sitemap change frequency, ignoring case and surrounding whitespace
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "always" => Some(Self::Always),
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            "never" => Some(Self::Never),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Never => "never",
        }
    }
}

impl std::fmt::Display for ChangeFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page entry found in a `<urlset>` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    /// Page location
    pub loc: String,
    /// Raw `<lastmod>` value
    pub last_modified: Option<String>,
    /// Parsed `<changefreq>` value
    pub change_freq: Option<ChangeFrequency>,
    /// Parsed `<priority>` value (0.0 - 1.0)
    pub priority: Option<f64>,
}

impl DiscoveredUrl {
    pub fn new(loc: impl Into<String>) -> Self {
        Self {
            loc: loc.into(),
            last_modified: None,
            change_freq: None,
            priority: None,
        }
    }
}

/// Reads sitemap documents through a [`Fetcher`] and expands them
pub struct SitemapReader<F> {
    fetcher: F,
    max_depth: usize,
}

impl<F: Fetcher> SitemapReader<F> {
    /// Create a reader with the default nesting limit
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Limit how deep sitemap indexes may nest below a root location.
    ///
    /// Children beyond the limit are skipped, which also stops an index that
    /// lists itself from expanding forever.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetch, decompress and parse a single document without expanding it
    pub fn read_document(&self, url: &str) -> Result<SitemapDocument, SitemapError> {
        let document = self.fetcher.fetch(url)?;
        let body = decode_body(&document)?;
        parse_document(url, &body)
    }

    /// Lazily expand the given roots into page entries.
    ///
    /// Roots are processed in order. At most `max_urls` entries are produced
    /// across all of them; nothing is fetched once the cap is reached. The
    /// sequence ends after the first error.
    pub fn discover_from_roots<I, S>(&self, roots: I, max_urls: Option<usize>) -> Discover<'_, F>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pending: Vec<(String, usize)> =
            roots.into_iter().map(|root| (root.into(), 0)).collect();
        pending.reverse();

        Discover {
            reader: self,
            pending,
            entries: VecDeque::new(),
            max_urls,
            yielded: 0,
            finished: false,
        }
    }
}

/// Iterator returned by [`SitemapReader::discover_from_roots`]
pub struct Discover<'a, F> {
    reader: &'a SitemapReader<F>,
    // Stack of locations still to read, top is next
    pending: Vec<(String, usize)>,
    // Entries of the last page-list document not yet handed out
    entries: VecDeque<DiscoveredUrl>,
    max_urls: Option<usize>,
    yielded: usize,
    finished: bool,
}

impl<F> Discover<'_, F> {
    /// Number of entries produced so far
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    fn cap_reached(&self) -> bool {
        self.max_urls.is_some_and(|max| self.yielded >= max)
    }

    fn finish(&mut self) {
        self.finished = true;
        self.pending.clear();
        self.entries.clear();
    }
}

impl<F: Fetcher> Iterator for Discover<'_, F> {
    type Item = Result<DiscoveredUrl, SitemapError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if self.cap_reached() {
                debug!(yielded = self.yielded, "sitemap entry cap reached");
                self.finish();
                return None;
            }

            if let Some(entry) = self.entries.pop_front() {
                self.yielded += 1;
                return Some(Ok(entry));
            }

            let Some((url, depth)) = self.pending.pop() else {
                self.finish();
                return None;
            };

            match self.reader.read_document(&url) {
                Ok(SitemapDocument::Index(children)) => {
                    debug!(%url, depth, children = children.len(), "expanding sitemap index");
                    if depth >= self.reader.max_depth {
                        if !children.is_empty() {
                            warn!(
                                %url,
                                depth,
                                skipped = children.len(),
                                "sitemap index nested too deep, skipping children"
                            );
                        }
                        continue;
                    }
                    self.pending
                        .extend(children.into_iter().rev().map(|child| (child, depth + 1)));
                }
                Ok(SitemapDocument::UrlSet(entries)) => {
                    debug!(%url, entries = entries.len(), "read sitemap");
                    self.entries.extend(entries);
                }
                Err(err) => {
                    self.finish();
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<F: Fetcher> FusedIterator for Discover<'_, F> {}
