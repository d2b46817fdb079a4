//! SQLite-backed [`VectorIndex`].
//!
//! Vectors are stored as little-endian f32 BLOBs next to the chunk text.
//! Search loads every vector and ranks in process, which is fine for the
//! few thousand chunks a document collection produces.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::{rank, EmbeddingModelInfo, VectorIndex};
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{Chunk, DocumentEntry, IndexedChunk, ScoredChunk};

const META_MODEL: &str = "embedding_model";
const META_DIMS: &str = "embedding_dims";

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Open or create the index file and apply migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn upsert(conn: &mut SqliteConnection, entry: &IndexedChunk) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO chunks (document, source, chunk_index, char_offset, text, hash, embedding)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(document, chunk_index) DO UPDATE SET
            source = excluded.source,
            char_offset = excluded.char_offset,
            text = excluded.text,
            hash = excluded.hash,
            embedding = excluded.embedding
        "#,
    )
    .bind(&entry.chunk.document)
    .bind(&entry.source)
    .bind(entry.chunk.chunk_index as i64)
    .bind(entry.chunk.char_offset as i64)
    .bind(&entry.chunk.text)
    .bind(&entry.chunk.hash)
    .bind(vec_to_blob(&entry.embedding))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    Ok(Chunk {
        document: row.try_get("document")?,
        chunk_index: row.try_get::<i64, _>("chunk_index")? as usize,
        char_offset: row.try_get::<i64, _>("char_offset")? as usize,
        text: row.try_get("text")?,
        hash: row.try_get("hash")?,
    })
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn add(&self, chunks: Vec<IndexedChunk>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for entry in &chunks {
            upsert(&mut tx, entry).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            "SELECT seq, document, source, chunk_index, char_offset, text, hash, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            candidates.push(ScoredChunk {
                chunk: row_to_chunk(row)?,
                source: row.try_get("source")?,
                score: cosine_similarity(query, &blob_to_vec(&blob)),
                seq: row.try_get::<i64, _>("seq")? as u64,
            });
        }
        Ok(rank(candidates, k))
    }

    async fn delete(&self, document: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE document = ?")
            .bind(document)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn replace_document(&self, document: &str, chunks: Vec<IndexedChunk>) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM chunks WHERE document = ?")
            .bind(document)
            .execute(&mut *tx)
            .await?
            .rows_affected() as usize;
        for entry in &chunks {
            upsert(&mut tx, entry).await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn documents(&self) -> Result<Vec<DocumentEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT document, MIN(source) AS source, COUNT(*) AS chunks
            FROM chunks
            GROUP BY document
            ORDER BY document
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(DocumentEntry {
                    name: row.try_get("document")?,
                    source: row.try_get("source")?,
                    chunks: row.try_get::<i64, _>("chunks")? as usize,
                })
            })
            .collect()
    }

    async fn chunks_for(&self, document: &str) -> Result<Vec<IndexedChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT document, source, chunk_index, char_offset, text, hash, embedding
            FROM chunks
            WHERE document = ?
            ORDER BY chunk_index
            "#,
        )
        .bind(document)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let blob: Vec<u8> = row.try_get("embedding")?;
                Ok(IndexedChunk {
                    chunk: row_to_chunk(row)?,
                    source: row.try_get("source")?,
                    embedding: blob_to_vec(&blob),
                })
            })
            .collect()
    }

    async fn clear(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn embedding_model(&self) -> Result<Option<EmbeddingModelInfo>> {
        let rows = sqlx::query("SELECT key, value FROM index_meta WHERE key IN (?, ?)")
            .bind(META_MODEL)
            .bind(META_DIMS)
            .fetch_all(&self.pool)
            .await?;

        let mut model = None;
        let mut dims = None;
        for row in &rows {
            let key: String = row.try_get("key")?;
            let value: String = row.try_get("value")?;
            match key.as_str() {
                META_MODEL => model = Some(value),
                META_DIMS => dims = value.parse::<usize>().ok(),
                _ => {}
            }
        }
        Ok(match (model, dims) {
            (Some(model), Some(dims)) => Some(EmbeddingModelInfo { model, dims }),
            _ => None,
        })
    }

    async fn set_embedding_model(&self, info: &EmbeddingModelInfo) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in [(META_MODEL, info.model.clone()), (META_DIMS, info.dims.to_string())] {
            sqlx::query(
                "INSERT INTO index_meta (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::hash_text;
    use tempfile::TempDir;

    fn chunk(document: &str, index: usize, text: &str, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            chunk: Chunk {
                document: document.to_string(),
                chunk_index: index,
                char_offset: index * 10,
                text: text.to_string(),
                hash: hash_text(text),
            },
            source: "fs:docs".to_string(),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/index.sqlite");
        {
            let index = SqliteIndex::open(&path).await.unwrap();
            index
                .add(vec![
                    chunk("a.txt", 0, "alpha", vec![1.0, 0.0]),
                    chunk("a.txt", 1, "alpha two", vec![0.7, 0.7]),
                ])
                .await
                .unwrap();
            index
                .set_embedding_model(&EmbeddingModelInfo {
                    model: "hashed-2".into(),
                    dims: 2,
                })
                .await
                .unwrap();
            index.pool().close().await;
        }

        let index = SqliteIndex::open(&path).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 2);
        let stored = index.chunks_for("a.txt").await.unwrap();
        assert_eq!(stored[1].chunk.char_offset, 10);
        assert_eq!(stored[1].embedding, vec![0.7, 0.7]);
        assert_eq!(
            index.embedding_model().await.unwrap(),
            Some(EmbeddingModelInfo {
                model: "hashed-2".into(),
                dims: 2
            })
        );
    }

    #[tokio::test]
    async fn test_search_ranks_and_breaks_ties() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(&tmp.path().join("i.sqlite")).await.unwrap();
        index
            .add(vec![
                chunk("x", 0, "tie one", vec![0.0, 1.0]),
                chunk("y", 0, "exact", vec![1.0, 0.0]),
                chunk("z", 0, "tie two", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 3).await.unwrap();
        assert_eq!(hits[0].chunk.document, "y");
        assert_eq!(hits[1].chunk.document, "x");
        assert_eq!(hits[2].chunk.document, "z");
    }

    #[tokio::test]
    async fn test_replace_document_drops_old_generation() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(&tmp.path().join("i.sqlite")).await.unwrap();
        index
            .add(vec![
                chunk("a", 0, "v1 first", vec![1.0]),
                chunk("a", 1, "v1 second", vec![1.0]),
                chunk("a", 2, "v1 third", vec![1.0]),
                chunk("b", 0, "other", vec![1.0]),
            ])
            .await
            .unwrap();

        let removed = index
            .replace_document("a", vec![chunk("a", 0, "v2 only", vec![1.0])])
            .await
            .unwrap();
        assert_eq!(removed, 3);

        let docs = index.documents().await.unwrap();
        assert_eq!(
            docs,
            vec![
                DocumentEntry {
                    name: "a".into(),
                    source: "fs:docs".into(),
                    chunks: 1
                },
                DocumentEntry {
                    name: "b".into(),
                    source: "fs:docs".into(),
                    chunks: 1
                },
            ]
        );
        assert_eq!(index.delete("b").await.unwrap(), 1);
        assert_eq!(index.clear().await.unwrap(), 1);
    }
}
