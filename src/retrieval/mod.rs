//! Vector retrieval: embed query text, fetch nearest chunks from the index.

mod embedder;
mod format;
mod pgvector;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use embedder::OpenAiEmbedder;
pub use format::{format_chunks, parse_citations, Citation};
pub use pgvector::PgVectorIndex;

/// One nearest-neighbor result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    /// Cosine similarity, higher is closer
    pub score: f32,
    pub source: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Misconfiguration: wrong dimensionality, invalid `top_k`.
    #[error("Retrieval misconfigured: {0}")]
    Config(String),

    /// The embedding service or vector store failed.
    #[error("Retrieval backend error: {0}")]
    Backend(String),
}

impl RetrievalError {
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Turns text into a query embedding.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

/// Similarity search over stored chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Expected embedding dimensionality.
    fn dimension(&self) -> usize;

    /// Nearest chunks for `embedding`; implementations return at most `top_k` rows.
    async fn query(&self, embedding: &[f32], top_k: usize)
        -> Result<Vec<RetrievedChunk>, RetrievalError>;
}

/// Validate arguments, then search `index`. Results are ordered by descending similarity.
pub async fn search(
    index: &dyn VectorIndex,
    embedding: &[f32],
    top_k: usize,
) -> Result<Vec<RetrievedChunk>, RetrievalError> {
    if top_k == 0 {
        return Err(RetrievalError::Config("top_k must be greater than zero".to_string()));
    }
    if embedding.len() != index.dimension() {
        return Err(RetrievalError::Config(format!(
            "query embedding has {} dimensions, index expects {}",
            embedding.len(),
            index.dimension()
        )));
    }

    let mut chunks = index.query(embedding, top_k).await?;
    chunks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    chunks.truncate(top_k);
    Ok(chunks)
}

/// Embeds query text and looks up its nearest chunks.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Nearest chunks for `query_text`.
    ///
    /// Blank text short-circuits to an empty result without calling the
    /// embedding service or the index.
    pub async fn retrieve(
        &self,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        if query_text.trim().is_empty() {
            tracing::warn!("Query text is empty, skipping retrieval");
            return Ok(Vec::new());
        }

        tracing::debug!("Embedding query for retrieval: {}", preview(query_text));
        let embedding = self.embedder.embed_query(query_text).await?;

        let chunks = search(self.index.as_ref(), &embedding, top_k).await?;
        tracing::info!("Found {} related chunks (top_k={})", chunks.len(), top_k);
        Ok(chunks)
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(50).collect();
    if text.chars().count() > 50 {
        out.push_str("...");
    }
    out
}
