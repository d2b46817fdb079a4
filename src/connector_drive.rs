//! Google Drive folder source (Drive v3 REST).
//!
//! Consumes a ready OAuth access token from `token_env`; obtaining and
//! refreshing it is outside this crate. Only PDF, DOCX, plain text and
//! Markdown files directly inside the folder are listed.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::DriveSourceConfig;
use crate::error::PipelineError;
use crate::extract::{DocumentFormat, MIME_DOCX, MIME_MARKDOWN, MIME_PDF, MIME_TEXT};
use crate::http;
use crate::models::{FetchFailure, SourceDocument, SourceListing};
use crate::traits::DocumentSource;

/// Upper bound on listing pages followed in one sync.
const MAX_PAGES: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
}

/// Drive allows several files with one name in a folder. Repeated names get
/// the file id inserted before the extension so each stays its own document.
fn disambiguate_names(files: &mut [DriveFile]) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for f in files.iter() {
        *counts.entry(f.name.clone()).or_default() += 1;
    }
    for f in files.iter_mut() {
        if counts.get(&f.name).copied().unwrap_or(0) > 1 {
            f.name = match f.name.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, f.id, ext),
                _ => format!("{} ({})", f.name, f.id),
            };
        }
    }
}

pub struct DriveSource {
    name: String,
    config: DriveSourceConfig,
    client: reqwest::Client,
}

impl DriveSource {
    pub fn new(name: &str, config: &DriveSourceConfig) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            config: config.clone(),
            client: http::build_client(Duration::from_secs(config.timeout_secs))?,
        })
    }

    fn query(&self) -> String {
        let mimes = [MIME_PDF, MIME_DOCX, MIME_TEXT, MIME_MARKDOWN]
            .iter()
            .map(|m| format!("mimeType='{}'", m))
            .collect::<Vec<_>>()
            .join(" or ");
        format!(
            "'{}' in parents and trashed = false and ({})",
            self.config.folder_id.replace('\'', "\\'"),
            mimes
        )
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn list_files(&self, token: &str) -> Result<Vec<DriveFile>, String> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut params = vec![
                ("q", self.query()),
                ("fields", "nextPageToken, files(id, name, mimeType)".to_string()),
                ("pageSize", "1000".to_string()),
            ];
            if let Some(t) = &page_token {
                params.push(("pageToken", t.clone()));
            }

            let response = self
                .client
                .get(self.api("/drive/v3/files"))
                .bearer_auth(token)
                .query(&params)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            let status = response.status();
            if !status.is_success() {
                return Err(format!("file listing returned HTTP {}", status));
            }
            let page: FileList = response.json().await.map_err(|e| e.to_string())?;
            files.extend(page.files);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => return Ok(files),
            }
        }

        warn!(folder = %self.config.folder_id, "page limit reached, listing truncated");
        Ok(files)
    }

    async fn download(&self, token: &str, id: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(self.api(&format!("/drive/v3/files/{}", id)))
            .bearer_auth(token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("download returned HTTP {}", status));
        }
        Ok(response.bytes().await.map_err(|e| e.to_string())?.to_vec())
    }
}

#[async_trait]
impl DocumentSource for DriveSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &str {
        "drive"
    }

    async fn list_documents(&self) -> Result<SourceListing, PipelineError> {
        let label = self.source_label();
        let token = std::env::var(&self.config.token_env)
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                PipelineError::source_unavailable(
                    &label,
                    format!("{} environment variable not set", self.config.token_env),
                )
            })?;

        let mut files = self
            .list_files(&token)
            .await
            .map_err(|reason| PipelineError::source_unavailable(&label, reason))?;
        disambiguate_names(&mut files);

        let mut listing = SourceListing::default();
        for file in files {
            match self.download(&token, &file.id).await {
                Ok(bytes) => {
                    debug!(source = %label, document = %file.name, bytes = bytes.len(), "downloaded");
                    // Drive names need not carry an extension; keep the MIME
                    // type so extraction can still pick a format.
                    let content_type = DocumentFormat::from_mime(&file.mime_type)
                        .map(|f| f.mime().to_string())
                        .unwrap_or(file.mime_type);
                    listing.documents.push(SourceDocument {
                        name: file.name,
                        source: label.clone(),
                        content_type,
                        bytes,
                    });
                }
                Err(reason) => {
                    warn!(source = %label, document = %file.name, %reason, "download failed");
                    listing.failures.push(FetchFailure {
                        name: file.name,
                        reason,
                    });
                }
            }
        }

        listing.documents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }
}
