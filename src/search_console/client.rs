//! Search Console HTTP client

use super::{IndexService, ServiceError, SiteEntry, SitemapEntry, UrlInspection};
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Public Search Console API root
pub const DEFAULT_ENDPOINT: &str = "https://searchconsole.googleapis.com";

/// Blocking client authenticated with a pre-issued bearer token
pub struct SearchConsoleClient {
    endpoint: Url,
    access_token: String,
    client: Client,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SitesListResponse {
    #[serde(default)]
    site_entry: Vec<SiteEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct SitemapsListResponse {
    #[serde(default)]
    sitemap: Vec<SitemapEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InspectRequest<'a> {
    inspection_url: &'a str,
    site_url: &'a str,
}

impl SearchConsoleClient {
    /// Create a client; fails with [`ServiceError::MissingToken`] without a token
    pub fn new(
        endpoint: &str,
        access_token: Option<&str>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let access_token = access_token
            .filter(|token| !token.trim().is_empty())
            .ok_or(ServiceError::MissingToken)?
            .trim()
            .to_string();

        let endpoint = Url::parse(endpoint)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ServiceError::InvalidEndpoint(endpoint.to_string()))?;

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            endpoint,
            access_token,
            client,
        })
    }

    /// Build an API URL from path segments, each percent-encoded on its own
    fn url(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn send<T: DeserializeOwned>(&self, url: Url, request: RequestBuilder) -> Result<T, ServiceError> {
        debug!(%url, "calling Search Console");
        let response = request.bearer_auth(&self.access_token).send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ServiceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| ServiceError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ServiceError> {
        let url = self.url(segments)?;
        let request = self.client.get(url.clone());
        self.send(url, request)
    }
}

impl IndexService for SearchConsoleClient {
    fn list_sites(&self) -> Result<Vec<SiteEntry>, ServiceError> {
        let response: SitesListResponse = self.get(&["webmasters", "v3", "sites"])?;
        Ok(response.site_entry)
    }

    fn list_sitemaps(&self, site_url: &str) -> Result<Vec<SitemapEntry>, ServiceError> {
        let response: SitemapsListResponse =
            self.get(&["webmasters", "v3", "sites", site_url, "sitemaps"])?;
        Ok(response.sitemap)
    }

    fn get_sitemap(&self, site_url: &str, path: &str) -> Result<SitemapEntry, ServiceError> {
        self.get(&["webmasters", "v3", "sites", site_url, "sitemaps", path])
    }

    fn inspect_url(&self, site_url: &str, url: &str) -> Result<UrlInspection, ServiceError> {
        let endpoint = self.url(&["v1", "urlInspection", "index:inspect"])?;
        let request = self.client.post(endpoint.clone()).json(&InspectRequest {
            inspection_url: url,
            site_url,
        });

        let raw: serde_json::Value = self.send(endpoint.clone(), request)?;
        UrlInspection::from_response(raw).map_err(|e| ServiceError::Decode {
            url: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sitemap::testing::serve_once;

    fn client(endpoint: &str) -> SearchConsoleClient {
        SearchConsoleClient::new(endpoint, Some("token"), "test-agent", Duration::from_secs(1))
            .unwrap()
    }

    #[test]
    fn test_requires_token() {
        for token in [None, Some(""), Some("   ")] {
            let result =
                SearchConsoleClient::new(DEFAULT_ENDPOINT, token, "ua", Duration::from_secs(1));
            assert!(matches!(result, Err(ServiceError::MissingToken)));
        }
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        let result = SearchConsoleClient::new("not a url", Some("t"), "ua", Duration::from_secs(1));
        assert!(matches!(result, Err(ServiceError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_site_url_is_one_path_segment() {
        let client = client(DEFAULT_ENDPOINT);
        let url = client
            .url(&["webmasters", "v3", "sites", "https://ex.com/", "sitemaps"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://searchconsole.googleapis.com/webmasters/v3/sites/https:%2F%2Fex.com%2F/sitemaps"
        );
    }

    #[test]
    fn test_endpoint_with_base_path() {
        let client = client("http://127.0.0.1:8080/proxy/");
        let url = client.url(&["v1", "urlInspection", "index:inspect"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/proxy/v1/urlInspection/index:inspect");
    }

    #[test]
    fn test_list_responses_tolerate_missing_fields() {
        let sites: SitesListResponse = serde_json::from_str("{}").unwrap();
        assert!(sites.site_entry.is_empty());

        let sitemaps: SitemapsListResponse = serde_json::from_str(
            r#"{"sitemap":[{"path":"https://ex.com/sitemap.xml","isPending":false,"warnings":"0"}]}"#,
        )
        .unwrap();
        assert_eq!(sitemaps.sitemap[0].path, "https://ex.com/sitemap.xml");
        assert_eq!(sitemaps.sitemap[0].is_pending, Some(false));
        assert_eq!(sitemaps.sitemap[0].last_submitted, None);
    }

    fn json_response(status: &str, body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
        .into_bytes()
    }

    #[test]
    fn test_get_sitemap_encodes_both_urls() {
        let (base, server) = serve_once(json_response(
            "200 OK",
            r#"{"path":"https://ex.com/sitemap.xml","isPending":true,"isSitemapsIndex":false}"#,
        ));
        let client = client(&base);

        let entry = client
            .get_sitemap("https://ex.com/", "https://ex.com/sitemap.xml")
            .unwrap();
        assert_eq!(entry.path, "https://ex.com/sitemap.xml");
        assert_eq!(entry.is_pending, Some(true));
        assert_eq!(entry.is_sitemaps_index, Some(false));

        let request = server.join().unwrap();
        assert!(request.starts_with(
            "GET /webmasters/v3/sites/https:%2F%2Fex.com%2F/sitemaps/https:%2F%2Fex.com%2Fsitemap.xml HTTP/1.1"
        ));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer token"));
    }

    #[test]
    fn test_error_status_keeps_body() {
        let (base, server) = serve_once(json_response("403 Forbidden", r#"{"error":"denied"}"#));
        let client = client(&base);

        match client.get_sitemap("https://ex.com/", "https://ex.com/sitemap.xml") {
            Err(ServiceError::Status { status, body, .. }) => {
                assert_eq!(status, 403);
                assert!(body.contains("denied"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
        server.join().unwrap();
    }
}
