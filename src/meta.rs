// Destination page metadata scraping for the first-hop interstitial

use async_trait::async_trait;
use std::time::Duration;

/// Tags served when the destination cannot be fetched or yields nothing.
pub const FALLBACK_META: &str = "<title>Redirecting...</title>";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Fetches the raw HTML of a destination page.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Option<String>;
}

/// reqwest-backed fetcher presenting a browser User-Agent, since many
/// destinations serve stripped pages to obvious bots.
pub struct HttpMetadataFetcher {
    http: reqwest::Client,
}

impl HttpMetadataFetcher {
    pub fn new(timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { http }
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch_html(&self, url: &str) -> Option<String> {
        let response = self.http.get(url).send().await.ok()?;
        if !response.status().is_success() {
            tracing::debug!(url, status = %response.status(), "metadata fetch refused");
            return None;
        }
        response.text().await.ok()
    }
}

/// Pull the `<meta>` and `<title>` lines out of a page's `<head>` so the
/// interstitial previews like the destination when scraped or shared.
///
/// Line-oriented on purpose: the interstitial only needs plausible tags,
/// not a DOM.
pub fn extract_meta_rows(html: &str) -> String {
    let head = match html.split("</head>").next() {
        Some(head) => head,
        None => html,
    };
    let mut rows = Vec::new();
    for line in head.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("<meta") || trimmed.starts_with("<title") {
            rows.push(trimmed.to_string());
        }
    }
    if rows.is_empty() {
        FALLBACK_META.to_string()
    } else {
        rows.join("\n")
    }
}

/// Prefix bare hosts with https so stored destinations are always absolute.
pub fn ensure_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_meta_rows_picks_head_tags() {
        let html = "<!DOCTYPE html>\n<html>\n<head>\n  <title>Acme</title>\n  \
            <meta charset=\"utf-8\">\n  <meta name=\"description\" content=\"widgets\">\n\
            </head>\n<body>\n  <meta name=\"decoy\">\n</body></html>";
        let rows = extract_meta_rows(html);
        assert!(rows.contains("<title>Acme</title>"));
        assert!(rows.contains("name=\"description\""));
        assert!(!rows.contains("decoy"));
    }

    #[test]
    fn test_extract_meta_rows_fallback() {
        assert_eq!(extract_meta_rows("<html><body>nothing</body></html>"), FALLBACK_META);
        assert_eq!(extract_meta_rows(""), FALLBACK_META);
    }

    #[test]
    fn test_ensure_scheme() {
        assert_eq!(ensure_scheme("example.com"), "https://example.com");
        assert_eq!(ensure_scheme("http://example.com"), "http://example.com");
        assert_eq!(ensure_scheme("https://example.com"), "https://example.com");
    }
}
