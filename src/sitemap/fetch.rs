//! Retrieval of sitemap documents

use super::SitemapError;
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use reqwest::header::{HeaderName, CONTENT_ENCODING, CONTENT_TYPE};
use std::borrow::Cow;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Largest sitemap body accepted, before and after decompression
pub const MAX_BODY_BYTES: u64 = 50 * 1024 * 1024;

/// A retrieved document with the transport metadata needed to decode it
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Final URL after redirects
    pub url: String,
    /// `Content-Type` header, if any
    pub content_type: Option<String>,
    /// `Content-Encoding` header, if any
    pub content_encoding: Option<String>,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl FetchedDocument {
    pub fn new(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            content_type: None,
            content_encoding: None,
            body,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_content_encoding(mut self, content_encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(content_encoding.into());
        self
    }
}

/// Source of sitemap documents
pub trait Fetcher {
    /// Retrieve the document at `url`. Non-success responses are errors.
    fn fetch(&self, url: &str) -> Result<FetchedDocument, SitemapError>;
}

impl<T: Fetcher + ?Sized> Fetcher for &T {
    fn fetch(&self, url: &str) -> Result<FetchedDocument, SitemapError> {
        (**self).fetch(url)
    }
}

/// Blocking HTTP fetcher with a fixed timeout and user agent
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher; the timeout applies to each request as a whole
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .build()?;

        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedDocument, SitemapError> {
        let fetch_error = |message: String| SitemapError::Fetch {
            url: url.to_string(),
            message,
        };

        debug!(%url, "fetching sitemap");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status)));
        }

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };
        let content_type = header(CONTENT_TYPE);
        let content_encoding = header(CONTENT_ENCODING);
        let final_url = response.url().to_string();

        let body = read_limited(response, MAX_BODY_BYTES)
            .map_err(|e| fetch_error(e.to_string()))?
            .ok_or_else(|| fetch_error(format!("response body exceeds {} bytes", MAX_BODY_BYTES)))?;

        Ok(FetchedDocument {
            url: final_url,
            content_type,
            content_encoding,
            body,
        })
    }
}

/// Read at most `limit` bytes; `None` when the source holds more than that
fn read_limited<R: Read>(reader: R, limit: u64) -> std::io::Result<Option<Vec<u8>>> {
    let mut data = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut data)?;
    if data.len() as u64 > limit {
        return Ok(None);
    }
    Ok(Some(data))
}

/// Whether the transport marks or names the document as gzip-compressed
pub fn is_marked_compressed(document: &FetchedDocument) -> bool {
    let named_gz = url::Url::parse(&document.url)
        .map(|parsed| parsed.path().to_ascii_lowercase().ends_with(".gz"))
        .unwrap_or_else(|_| document.url.to_ascii_lowercase().ends_with(".gz"));

    let encoded_gzip = document
        .content_encoding
        .as_deref()
        .is_some_and(|encoding| encoding.to_ascii_lowercase().contains("gzip"));

    let gzip_type = document.content_type.as_deref().is_some_and(|content_type| {
        let content_type = content_type.to_ascii_lowercase();
        content_type.starts_with("application/gzip") || content_type.starts_with("application/x-gzip")
    });

    named_gz || encoded_gzip || gzip_type
}

/// Return the XML body of a document, decompressing it when needed.
///
/// A body marked as compressed that does not start with the gzip magic bytes
/// was already decoded by the transport and is returned as is.
pub fn decode_body(document: &FetchedDocument) -> Result<Cow<'_, [u8]>, SitemapError> {
    decode_body_within(document, MAX_BODY_BYTES)
}

fn decode_body_within(document: &FetchedDocument, limit: u64) -> Result<Cow<'_, [u8]>, SitemapError> {
    if !is_marked_compressed(document) || !document.body.starts_with(&GZIP_MAGIC) {
        return Ok(Cow::Borrowed(document.body.as_slice()));
    }

    let parse_error = |message: String| SitemapError::Parse {
        url: document.url.clone(),
        message,
    };
    let xml = read_limited(GzDecoder::new(document.body.as_slice()), limit)
        .map_err(|e| parse_error(format!("invalid gzip body: {}", e)))?
        .ok_or_else(|| parse_error(format!("decompressed sitemap exceeds {} bytes", limit)))?;

    debug!(url = %document.url, compressed = document.body.len(), size = xml.len(), "decompressed sitemap");
    Ok(Cow::Owned(xml))
}
