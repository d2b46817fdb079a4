//! Source made of explicit URLs.
//!
//! There is no listing call, so the source as a whole never fails: each URL
//! that cannot be parsed or downloaded is a per-document failure. Names are
//! the last path segment of the URL, or the host when the path is empty.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, warn};

use crate::config::UrlSourceConfig;
use crate::error::PipelineError;
use crate::extract::{content_type_for, MIME_UNKNOWN};
use crate::http;
use crate::models::{FetchFailure, SourceDocument, SourceListing};
use crate::traits::DocumentSource;

pub struct UrlSource {
    name: String,
    urls: Vec<String>,
    client: reqwest::Client,
}

impl UrlSource {
    pub fn new(name: &str, config: &UrlSourceConfig) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            urls: config.urls.clone(),
            client: http::build_client(Duration::from_secs(config.timeout_secs))?,
        })
    }

    async fn fetch(&self, url: &Url) -> Result<(Vec<u8>, Option<String>), String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }
        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        Ok((bytes.to_vec(), header_type))
    }
}

/// Document name for a URL.
pub fn name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.to_string())
        .or_else(|| url.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| url.to_string())
}

#[async_trait]
impl DocumentSource for UrlSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &str {
        "url"
    }

    async fn list_documents(&self) -> Result<SourceListing, PipelineError> {
        let label = self.source_label();
        let mut listing = SourceListing::default();

        for raw in &self.urls {
            let url = match Url::parse(raw) {
                Ok(url) => url,
                Err(e) => {
                    warn!(source = %label, url = %raw, error = %e, "invalid URL");
                    listing.failures.push(FetchFailure {
                        name: raw.clone(),
                        reason: format!("invalid URL: {}", e),
                    });
                    continue;
                }
            };
            let name = name_from_url(&url);

            match self.fetch(&url).await {
                Ok((bytes, header_type)) => {
                    debug!(source = %label, document = %name, bytes = bytes.len(), "downloaded");
                    let content_type = match content_type_for(&name) {
                        MIME_UNKNOWN => header_type.unwrap_or_else(|| MIME_UNKNOWN.to_string()),
                        known => known.to_string(),
                    };
                    listing.documents.push(SourceDocument {
                        name,
                        source: label.clone(),
                        content_type,
                        bytes,
                    });
                }
                Err(reason) => {
                    warn!(source = %label, document = %name, %reason, "download failed");
                    listing.failures.push(FetchFailure { name, reason });
                }
            }
        }

        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_url() {
        let name = |s: &str| name_from_url(&Url::parse(s).unwrap());
        assert_eq!(name("https://example.com/papers/attention.pdf"), "attention.pdf");
        assert_eq!(name("https://example.com/docs/guide/"), "guide");
        assert_eq!(name("https://example.com/"), "example.com");
        assert_eq!(name("https://example.com/a.txt?download=1"), "a.txt");
    }
}
