//! SQLite-backed vector store for the RAG pipeline.
//!
//! Chunks and their embeddings live in two tables (see [`crate::migrate`]).
//! The store is rebuilt wholesale on every indexing run; similarity search
//! loads every vector and ranks by cosine similarity in Rust.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{Chunk, ScoredChunk};

pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    /// Opens (creating if needed) the store at `path`.
    pub async fn create(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::apply(&pool).await?;
        Ok(Self { pool })
    }

    /// Opens a store that a previous indexing run persisted.
    pub async fn open_existing(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("No vector store found at {}", path.display());
        }
        let store = Self::create(path).await?;
        if store.count().await? == 0 {
            bail!("Vector store at {} is empty", path.display());
        }
        Ok(store)
    }

    /// Drops every stored chunk and writes `chunks` with their `vectors`.
    pub async fn replace_all(&self, chunks: &[Chunk], vectors: &[Vec<f32>], model: &str) -> Result<()> {
        if chunks.len() != vectors.len() {
            bail!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            );
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunk_vectors").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                "INSERT INTO chunks (id, source, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO chunk_vectors (chunk_id, model, dims, embedding) VALUES (?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(model)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        let built_at = chrono::Utc::now().to_rfc3339();
        for (key, value) in [("model", model), ("built_at", built_at.as_str())] {
            sqlx::query(
                "INSERT INTO store_meta (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(chunks = chunks.len(), model, "vector store rebuilt");
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Embedding model the store was last built with.
    pub async fn model(&self) -> Result<Option<String>> {
        self.meta("model").await
    }

    /// RFC 3339 timestamp of the last rebuild.
    pub async fn built_at(&self) -> Result<Option<String>> {
        self.meta("built_at").await
    }

    async fn meta(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    /// The `k` chunks most similar to `query`, best first.
    pub async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.source, c.chunk_index, c.text, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            ORDER BY c.source, c.chunk_index
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ScoredChunk {
                    source: row.get("source"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    score: cosine_similarity(query, &blob_to_vec(&blob)),
                }
            })
            .collect();

        // Stable sort keeps (source, chunk_index) order among ties.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
