//! GitHub repository source, through the REST contents API.
//!
//! Lists `GET {api_base}/repos/{repo}/contents/{path}` (optionally at
//! `?ref={branch}`), keeps `file` entries with a supported extension and
//! downloads each through its `download_url`. With `recursive = true`,
//! `dir` entries are listed too. A token from `token_env` is sent when
//! present; public repositories work without one.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::GithubSourceConfig;
use crate::error::PipelineError;
use crate::extract::{content_type_for, is_supported};
use crate::http;
use crate::models::{FetchFailure, SourceDocument, SourceListing};
use crate::traits::DocumentSource;

/// Upper bound on directories visited in one recursive listing.
const MAX_DIRECTORIES: usize = 256;

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    download_url: Option<String>,
}

pub struct GithubSource {
    name: String,
    config: GithubSourceConfig,
    client: reqwest::Client,
}

impl GithubSource {
    pub fn new(name: &str, config: &GithubSourceConfig) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            config: config.clone(),
            client: http::build_client(Duration::from_secs(config.timeout_secs))?,
        })
    }

    fn token(&self) -> Option<String> {
        std::env::var(&self.config.token_env)
            .ok()
            .filter(|t| !t.is_empty())
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github.v3+json");
        match self.token() {
            Some(token) => request.header("Authorization", format!("token {}", token)),
            None => request,
        }
    }

    fn contents_url(&self, path: &str) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        let path = path.trim_matches('/');
        if path.is_empty() {
            format!("{}/repos/{}/contents", base, self.config.repo)
        } else {
            format!("{}/repos/{}/contents/{}", base, self.config.repo, path)
        }
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<ContentEntry>, String> {
        let mut request = self.get(&self.contents_url(path));
        if let Some(branch) = &self.config.branch {
            request = request.query(&[("ref", branch)]);
        }
        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("listing {:?} returned HTTP {}", path, status));
        }
        response
            .json::<Vec<ContentEntry>>()
            .await
            .map_err(|e| format!("listing {:?} is not a directory: {}", path, e))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self.get(url).send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("download returned HTTP {}", status));
        }
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl DocumentSource for GithubSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &str {
        "github"
    }

    async fn list_documents(&self) -> Result<SourceListing, PipelineError> {
        let label = self.source_label();
        let root = self
            .list_dir(&self.config.path)
            .await
            .map_err(|reason| PipelineError::source_unavailable(&label, reason))?;

        let mut listing = SourceListing::default();
        let mut pending = vec![root];
        let mut visited = 1usize;

        while let Some(entries) = pending.pop() {
            for entry in entries {
                match entry.kind.as_str() {
                    "file" if is_supported(&entry.name) => {
                        let Some(url) = entry.download_url.as_deref() else {
                            listing.failures.push(FetchFailure {
                                name: entry.path.clone(),
                                reason: "no download_url".to_string(),
                            });
                            continue;
                        };
                        match self.download(url).await {
                            Ok(bytes) => {
                                debug!(source = %label, document = %entry.path, bytes = bytes.len(), "downloaded");
                                listing.documents.push(SourceDocument {
                                    content_type: content_type_for(&entry.name).to_string(),
                                    name: entry.path,
                                    source: label.clone(),
                                    bytes,
                                });
                            }
                            Err(reason) => {
                                warn!(source = %label, document = %entry.path, %reason, "download failed");
                                listing.failures.push(FetchFailure {
                                    name: entry.path,
                                    reason,
                                });
                            }
                        }
                    }
                    "dir" if self.config.recursive => {
                        if visited >= MAX_DIRECTORIES {
                            warn!(source = %label, dir = %entry.path, "directory limit reached, skipping");
                            continue;
                        }
                        visited += 1;
                        match self.list_dir(&entry.path).await {
                            Ok(children) => pending.push(children),
                            Err(reason) => {
                                warn!(source = %label, dir = %entry.path, %reason, "listing failed");
                                listing.failures.push(FetchFailure {
                                    name: entry.path,
                                    reason,
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        listing.documents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }
}
