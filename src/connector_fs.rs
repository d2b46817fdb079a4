//! Local folder source.
//!
//! Walks `root`, keeps files matching the include globs and not matching
//! the exclude globs (plus `.git`, `target`, `node_modules`), and reads
//! them. Document names are paths relative to `root`, `/`-separated.

use anyhow::Result;
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::FilesystemSourceConfig;
use crate::error::PipelineError;
use crate::extract::content_type_for;
use crate::models::{FetchFailure, SourceDocument, SourceListing};
use crate::traits::DocumentSource;

pub struct FilesystemSource {
    name: String,
    config: FilesystemSourceConfig,
    include: GlobSet,
    exclude: GlobSet,
}

impl FilesystemSource {
    pub fn new(name: &str, config: &FilesystemSourceConfig) -> Result<Self> {
        let include = build_globset(&config.include_globs)?;

        let mut excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        excludes.extend(config.exclude_globs.iter().cloned());
        let exclude = build_globset(&excludes)?;

        Ok(Self {
            name: name.to_string(),
            config: config.clone(),
            include,
            exclude,
        })
    }
}

#[async_trait]
impl DocumentSource for FilesystemSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &str {
        "filesystem"
    }

    async fn list_documents(&self) -> Result<SourceListing, PipelineError> {
        let label = self.source_label();
        let config = self.config.clone();
        let include = self.include.clone();
        let exclude = self.exclude.clone();

        let walk_label = label.clone();
        tokio::task::spawn_blocking(move || scan_root(&walk_label, &config, &include, &exclude))
            .await
            .map_err(|e| PipelineError::source_unavailable(&label, e))?
    }
}

fn scan_root(
    label: &str,
    config: &FilesystemSourceConfig,
    include: &GlobSet,
    exclude: &GlobSet,
) -> Result<SourceListing, PipelineError> {
    let root = &config.root;
    if !root.is_dir() {
        return Err(PipelineError::source_unavailable(
            label,
            format!("root is not a directory: {}", root.display()),
        ));
    }

    let mut listing = SourceListing::default();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let name = e
                    .path()
                    .and_then(|p| p.strip_prefix(root).ok())
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .filter(|n| !n.is_empty());
                warn!(source = label, path = name.as_deref().unwrap_or("<walk>"), error = %e, "walk error");
                // Only entries that would have been documents count as failures.
                if let Some(name) = name {
                    if include.is_match(&name) && !exclude.is_match(&name) {
                        listing.failures.push(FetchFailure {
                            name,
                            reason: e.to_string(),
                        });
                    }
                }
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude.is_match(&rel_str) || !include.is_match(&rel_str) {
            continue;
        }

        match std::fs::read(path) {
            Ok(bytes) => listing.documents.push(SourceDocument {
                content_type: content_type_for(&rel_str).to_string(),
                name: rel_str,
                source: label.to_string(),
                bytes,
            }),
            Err(e) => {
                warn!(source = label, document = %rel_str, error = %e, "failed to read file");
                listing.failures.push(FetchFailure {
                    name: rel_str,
                    reason: e.to_string(),
                });
            }
        }
    }

    // Sort for deterministic ordering
    listing.documents.sort_by(|a, b| a.name.cmp(&b.name));
    listing.failures.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(listing)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config(root: PathBuf) -> FilesystemSourceConfig {
        FilesystemSourceConfig {
            root,
            include_globs: vec!["**/*.txt".into(), "**/*.md".into(), "**/*.pdf".into()],
            exclude_globs: vec!["drafts/**".into()],
            follow_symlinks: false,
        }
    }

    #[tokio::test]
    async fn test_lists_matching_files_sorted() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("guides")).unwrap();
        std::fs::create_dir_all(tmp.path().join("drafts")).unwrap();
        std::fs::create_dir_all(tmp.path().join(".git")).unwrap();
        std::fs::write(tmp.path().join("b.md"), "# B").unwrap();
        std::fs::write(tmp.path().join("guides/a.txt"), "A").unwrap();
        std::fs::write(tmp.path().join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(tmp.path().join("drafts/wip.txt"), "wip").unwrap();
        std::fs::write(tmp.path().join(".git/notes.txt"), "git").unwrap();

        let source = FilesystemSource::new("docs", &config(tmp.path().to_path_buf())).unwrap();
        assert_eq!(source.source_label(), "filesystem:docs");

        let listing = source.list_documents().await.unwrap();
        let names: Vec<&str> = listing.documents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["b.md", "guides/a.txt"]);
        assert_eq!(listing.documents[0].content_type, "text/markdown");
        assert_eq!(listing.documents[1].bytes, b"A");
        assert_eq!(listing.documents[1].source, "filesystem:docs");
        assert!(listing.failures.is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_is_source_unavailable() {
        let tmp = TempDir::new().unwrap();
        let source =
            FilesystemSource::new("docs", &config(tmp.path().join("does-not-exist"))).unwrap();
        let err = source.list_documents().await.unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_walk_errors_only_count_for_document_paths() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.md"), "# A").unwrap();
        std::fs::create_dir_all(tmp.path().join("sub")).unwrap();
        std::os::unix::fs::symlink(tmp.path(), tmp.path().join("sub/cycle")).unwrap();
        std::os::unix::fs::symlink(tmp.path(), tmp.path().join("sub/loop.md")).unwrap();

        let mut cfg = config(tmp.path().to_path_buf());
        cfg.follow_symlinks = true;
        let listing = FilesystemSource::new("docs", &cfg)
            .unwrap()
            .list_documents()
            .await
            .unwrap();

        let names: Vec<&str> = listing.documents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a.md"]);
        assert_eq!(listing.failures.len(), 1);
        assert_eq!(listing.failures[0].name, "sub/loop.md");
        assert_eq!(listing.discovered(), 2);
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let mut cfg = config(PathBuf::from("."));
        cfg.include_globs = vec!["[".into()];
        assert!(FilesystemSource::new("docs", &cfg).is_err());
    }
}
