//! Postgres + pgvector index in the LlamaIndex table layout.
//!
//! Rows live in `data_<table_name>` with `text`, `metadata_` (JSON) and an
//! `embedding vector(N)` column indexed with HNSW (`m=16`,
//! `ef_construction=64`, `vector_cosine_ops`). Similarity is `1 - cosine distance`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use super::{RetrievalError, RetrievedChunk, VectorIndex};
use crate::config::VectorStoreConfig;

/// HNSW search breadth applied per query.
const HNSW_EF_SEARCH: u32 = 40;

pub struct PgVectorIndex {
    pool: PgPool,
    table: String,
    dimension: usize,
}

impl PgVectorIndex {
    /// Build the pool without opening a connection; the first query connects.
    pub fn connect_lazy(
        config: &VectorStoreConfig,
        dimension: usize,
    ) -> Result<Self, RetrievalError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(&config.connection_string)
            .map_err(|e| RetrievalError::Config(format!("invalid connection string: {e}")))?;

        Ok(Self {
            pool,
            table: table_for(&config.table_name),
            dimension,
        })
    }

    fn query_sql(&self) -> String {
        format!(
            "SELECT text, metadata_, 1 - (embedding <=> $1::vector) AS similarity \
             FROM {} ORDER BY embedding <=> $1::vector LIMIT $2",
            self.table
        )
    }
}

/// LlamaIndex prefixes user table names with `data_`.
fn table_for(name: &str) -> String {
    format!("data_{}", name.to_lowercase())
}

/// pgvector text literal: `[0.1,0.2,...]`.
fn vector_literal(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

fn metadata_str(metadata: &Value, key: &str) -> Option<String> {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn chunk_from_parts(text: String, metadata: Option<Value>, similarity: f64) -> RetrievedChunk {
    let metadata = metadata.unwrap_or(Value::Null);
    RetrievedChunk {
        content: text,
        score: similarity as f32,
        source: metadata_str(&metadata, "source"),
        title: metadata_str(&metadata, "title"),
        url: metadata_str(&metadata, "url"),
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let backend = |e: sqlx::Error| RetrievalError::Backend(e.to_string());

        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query(&format!("SET LOCAL hnsw.ef_search = {HNSW_EF_SEARCH}"))
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let rows = sqlx::query(&self.query_sql())
            .bind(vector_literal(embedding))
            .bind(top_k as i64)
            .fetch_all(&mut *tx)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                let text: String = row.try_get("text").map_err(backend)?;
                let metadata: Option<Value> = row.try_get("metadata_").map_err(backend)?;
                let similarity: f64 = row.try_get("similarity").map_err(backend)?;
                Ok(chunk_from_parts(text, metadata, similarity))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vector_literal_format() {
        assert_eq!(vector_literal(&[0.5, -1.0, 2.25]), "[0.5,-1,2.25]");
        assert_eq!(vector_literal(&[]), "[]");
    }

    #[test]
    fn table_name_gets_llamaindex_prefix() {
        assert_eq!(table_for("Rextro_Docs"), "data_rextro_docs");
    }

    #[test]
    fn metadata_fields_are_extracted() {
        let chunk = chunk_from_parts(
            "Zone A hosts robotics.".to_string(),
            Some(json!({"source": "website", "title": "Zones", "url": "https://rextro.lk/zones", "extra": 1})),
            0.87,
        );
        assert_eq!(chunk.source.as_deref(), Some("website"));
        assert_eq!(chunk.title.as_deref(), Some("Zones"));
        assert_eq!(chunk.url.as_deref(), Some("https://rextro.lk/zones"));
        assert!((chunk.score - 0.87).abs() < 1e-6);
    }

    #[test]
    fn missing_or_blank_metadata_is_none() {
        let chunk = chunk_from_parts("x".to_string(), Some(json!({"title": "  "})), 0.1);
        assert_eq!(chunk.title, None);
        assert_eq!(chunk.source, None);

        let chunk = chunk_from_parts("x".to_string(), None, 0.1);
        assert_eq!(chunk.url, None);
    }

    #[tokio::test]
    async fn lazy_pool_rejects_malformed_connection_string() {
        let config = VectorStoreConfig {
            connection_string: "not a url".to_string(),
            table_name: "chunks".to_string(),
            top_k: 5,
        };
        let err = PgVectorIndex::connect_lazy(&config, 1536).err().expect("error");
        assert!(err.is_config());
    }
}
