use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolError};

/// Returns the whole exhibition overview document. Takes no real input.
pub struct DocumentTool {
    path: PathBuf,
}

impl DocumentTool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Tool for DocumentTool {
    fn name(&self) -> &str {
        "get_exhibition_overview"
    }

    fn description(&self) -> &str {
        "Return the official Rextro Exhibition overview document (general information, venue, registration, contacts). Use it for broad questions about the event."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "topic": {
                    "type": "string",
                    "description": "Optional topic of interest. The full document is always returned."
                }
            }
        })
    }

    async fn execute(&self, _args: Value) -> Result<String, ToolError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ToolError::Io(format!("{}: {}", self.path.display(), e)))?;
        if text.trim().is_empty() {
            return Ok("The knowledge document is empty.".to_string());
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn returns_document_regardless_of_input() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "# Rextro\n\nHeld at the University of Ruhuna.").unwrap();
        let tool = DocumentTool::new(file.path());

        let a = tool.execute(Value::Null).await.unwrap();
        let b = tool.execute(json!({"topic": "parking"})).await.unwrap();
        assert_eq!(a, b);
        assert!(a.contains("University of Ruhuna"));
    }

    #[tokio::test]
    async fn missing_file_is_reported_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let tool = DocumentTool::new(dir.path().join("missing.md"));
        let err = tool.execute(Value::Null).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Error: could not read the knowledge document:"));
    }
}
