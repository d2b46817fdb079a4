//! Index status and per-source breakdown.
//!
//! Gives a quick picture of what is indexed and with which models. Used by
//! `askdocs status` and `GET /status`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::IndexConfig;
use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::generation::Generator;
use crate::models::DocumentEntry;
use crate::store::VectorIndex;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceBreakdown {
    pub source: String,
    pub documents: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub backend: String,
    /// On-disk location, for file-backed indexes.
    pub path: Option<String>,
    pub size_bytes: Option<u64>,
    pub chunks: usize,
    pub documents: usize,
    pub embedding_model: String,
    pub embedding_dims: usize,
    pub generation_model: String,
    pub sync_running: bool,
    pub by_source: Vec<SourceBreakdown>,
}

pub async fn collect_status(
    config: &IndexConfig,
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    generator: &dyn Generator,
    sync_running: bool,
) -> Result<IndexStatus, PipelineError> {
    let documents = index.documents().await?;
    let chunks = index.count().await?;

    let (path, size_bytes) = if index.backend() == "sqlite" {
        let size = std::fs::metadata(&config.path).map(|m| m.len()).ok();
        (Some(config.path.display().to_string()), size)
    } else {
        (None, None)
    };

    Ok(IndexStatus {
        backend: index.backend().to_string(),
        path,
        size_bytes,
        chunks,
        documents: documents.len(),
        embedding_model: embedder.model_name().to_string(),
        embedding_dims: embedder.dims(),
        generation_model: generator.model_name().to_string(),
        sync_running,
        by_source: breakdown(&documents),
    })
}

/// Group documents by source, largest first.
pub fn breakdown(documents: &[DocumentEntry]) -> Vec<SourceBreakdown> {
    let mut groups: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for doc in documents {
        let entry = groups.entry(doc.source.as_str()).or_default();
        entry.0 += 1;
        entry.1 += doc.chunks;
    }
    let mut out: Vec<SourceBreakdown> = groups
        .into_iter()
        .map(|(source, (documents, chunks))| SourceBreakdown {
            source: source.to_string(),
            documents,
            chunks,
        })
        .collect();
    out.sort_by(|a, b| b.documents.cmp(&a.documents));
    out
}

pub fn print_status(status: &IndexStatus) {
    println!("askdocs index status");
    println!("====================");
    println!();
    println!("  Backend:     {}", status.backend);
    if let Some(path) = &status.path {
        println!("  Path:        {}", path);
    }
    if let Some(size) = status.size_bytes {
        println!("  Size:        {}", format_bytes(size));
    }
    println!();
    println!("  Documents:   {}", status.documents);
    println!("  Chunks:      {}", status.chunks);
    println!(
        "  Embedding:   {} ({} dims)",
        status.embedding_model, status.embedding_dims
    );
    println!("  Generation:  {}", status.generation_model);
    if status.sync_running {
        println!("  Sync:        running");
    }

    if !status.by_source.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<32} {:>6} {:>8}", "SOURCE", "DOCS", "CHUNKS");
        println!("  {}", "-".repeat(48));
        for s in &status.by_source {
            println!("  {:<32} {:>6} {:>8}", s.source, s.documents, s.chunks);
        }
    }
    println!();
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str, source: &str, chunks: usize) -> DocumentEntry {
        DocumentEntry {
            name: name.to_string(),
            source: source.to_string(),
            chunks,
        }
    }

    #[test]
    fn test_breakdown_groups_by_source() {
        let docs = vec![
            doc("a", "url:papers", 3),
            doc("b", "filesystem:notes", 2),
            doc("c", "filesystem:notes", 5),
        ];
        let groups = breakdown(&docs);
        assert_eq!(
            groups,
            vec![
                SourceBreakdown {
                    source: "filesystem:notes".into(),
                    documents: 2,
                    chunks: 7
                },
                SourceBreakdown {
                    source: "url:papers".into(),
                    documents: 1,
                    chunks: 3
                },
            ]
        );
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
