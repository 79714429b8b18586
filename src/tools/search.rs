//! Knowledge-base search over the vector store.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, Tool, ToolError};
use crate::retrieval::{format_chunks, Retriever};

/// Semantic search over the exhibition knowledge base.
pub struct KnowledgeBaseTool {
    retriever: Retriever,
    top_k: usize,
}

impl KnowledgeBaseTool {
    pub fn new(retriever: Retriever, top_k: usize) -> Self {
        Self { retriever, top_k }
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    #[serde(default)]
    query_text: String,
}

#[async_trait]
impl Tool for KnowledgeBaseTool {
    fn name(&self) -> &str {
        "get_similar_text_chunks"
    }

    fn description(&self) -> &str {
        "Search the knowledge base for information to answer a user's query. Queries a vector database and returns the most relevant text chunks. Each chunk includes its title, source, URL and content, which you can use to formulate and cite your answer."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query_text": {
                    "type": "string",
                    "description": "Natural-language search text"
                }
            },
            "required": ["query_text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: SearchArgs = parse_args(args)?;
        let query = args.query_text.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments(
                "A query text must be provided.".to_string(),
            ));
        }

        let chunks = self
            .retriever
            .retrieve(query, self.top_k)
            .await
            .map_err(|e| ToolError::Retrieval(e.to_string()))?;

        Ok(format_chunks(query, &chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::parse_citations;
    use crate::retrieval::testing::{chunk, FixedEmbedder, StaticIndex};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn tool(index: Arc<StaticIndex>) -> KnowledgeBaseTool {
        let retriever = Retriever::new(Arc::new(FixedEmbedder::new(index.dimension)), index);
        KnowledgeBaseTool::new(retriever, 10)
    }

    #[tokio::test]
    async fn returns_formatted_chunks_with_citations() {
        let index = Arc::new(StaticIndex::new(4, vec![chunk("zones", 0.4), chunk("hours", 0.9)]));
        let output = tool(index).execute(json!({"query_text": "opening"})).await.unwrap();

        assert!(output.starts_with("Found 2 relevant chunks for 'opening':"));
        let citations = parse_citations(&output);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].title.as_deref(), Some("Title for hours"));
    }

    #[tokio::test]
    async fn blank_query_is_rejected_without_search() {
        let index = Arc::new(StaticIndex::new(4, vec![chunk("zones", 0.4)]));
        let err = tool(index.clone())
            .execute(json!({"query_text": "  "}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Error: A query text must be provided.");
        assert_eq!(index.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retrieval_failure_becomes_tool_error() {
        // Embedding dimension 4 against an index expecting 8.
        let index = Arc::new(StaticIndex::new(8, vec![]));
        let retriever = Retriever::new(Arc::new(FixedEmbedder::new(4)), index);
        let err = KnowledgeBaseTool::new(retriever, 10)
            .execute(json!({"query_text": "zones"}))
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("An error occurred while trying to retrieve text chunks:"));
    }
}
