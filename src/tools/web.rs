//! Exhibition REST API tools: paginated listings and session search.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, Tool, ToolError};

/// Largest page size the tools will request.
const MAX_LIMIT: u32 = 50;

/// How much of a non-JSON body is echoed back in errors.
const MAX_ERROR_BODY: usize = 500;

/// HTTP client bound to the exhibition API base URL.
#[derive(Clone)]
pub struct KnowledgeApi {
    client: reqwest::Client,
    base_url: String,
}

impl KnowledgeApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rextro-rag/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ToolError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// GET `path` with `params` and return the body as pretty-printed JSON.
    pub async fn get_json(
        &self,
        path: &str,
        params: &[(&'static str, String)],
    ) -> Result<String, ToolError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {} {:?}", url, params);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .query(params)
            .send()
            .await
            .map_err(|e| ToolError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(ToolError::Http {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|_| ToolError::InvalidJson(truncate(&body, MAX_ERROR_BODY)))?;
        serde_json::to_string_pretty(&value).map_err(|e| ToolError::InvalidJson(e.to_string()))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}... [truncated]", head)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Pagination and sorting sent to listing endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageParams {
    pub page: u32,
    pub limit: u32,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
}

impl PageParams {
    fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", self.page.to_string()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(sort_by) = &self.sort_by {
            params.push(("sortBy", sort_by.clone()));
        }
        params.push(("sortOrder", self.sort_order.as_str().to_string()));
        params
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageArgs {
    page: Option<u32>,
    limit: Option<u32>,
    sort_by: Option<String>,
    sort_order: Option<SortOrder>,
}

impl PageArgs {
    fn resolve(self, default_sort_by: &str) -> PageParams {
        PageParams {
            page: self.page.unwrap_or(1).max(1),
            limit: self.limit.unwrap_or(10).clamp(1, MAX_LIMIT),
            sort_by: Some(
                self.sort_by
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| default_sort_by.to_string()),
            ),
            sort_order: self.sort_order.unwrap_or_default(),
        }
    }
}

fn page_properties() -> serde_json::Map<String, Value> {
    let schema = json!({
        "page": {
            "type": "integer",
            "description": "Which page of results to return. Default is 1."
        },
        "limit": {
            "type": "integer",
            "description": "How many results to return per page. Default is 10."
        },
        "sortBy": {
            "type": "string",
            "description": "Field to sort by."
        },
        "sortOrder": {
            "type": "string",
            "enum": ["asc", "desc"],
            "description": "Sorting direction. Default is 'desc'."
        }
    });
    match schema {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

/// How a listing tool picks its page parameters.
enum Paging {
    /// From the model's arguments, sorting by this field when none is given
    FromArgs { default_sort_by: String },
    /// Always the same page; arguments are ignored
    Fixed(PageParams),
}

/// Fetches one page of a listing endpoint.
pub struct ListingTool {
    api: KnowledgeApi,
    name: String,
    description: String,
    path: String,
    paging: Paging,
}

impl ListingTool {
    pub fn new(
        api: KnowledgeApi,
        name: impl Into<String>,
        description: impl Into<String>,
        path: impl Into<String>,
        default_sort_by: impl Into<String>,
    ) -> Self {
        Self {
            api,
            name: name.into(),
            description: description.into(),
            path: path.into(),
            paging: Paging::FromArgs {
                default_sort_by: default_sort_by.into(),
            },
        }
    }

    /// A tool that takes no parameters and always fetches `params`.
    pub fn fixed(
        api: KnowledgeApi,
        name: impl Into<String>,
        description: impl Into<String>,
        path: impl Into<String>,
        params: PageParams,
    ) -> Self {
        Self {
            api,
            name: name.into(),
            description: description.into(),
            path: path.into(),
            paging: Paging::Fixed(params),
        }
    }

    /// Exhibition zones, newest first by default.
    pub fn zones(api: KnowledgeApi) -> Self {
        Self::new(
            api,
            "get_zones",
            "Retrieve a list of Rextro Exhibition zones. You can control pagination ('page', 'limit') and sorting ('sortBy', 'sortOrder').",
            "/zones",
            "createdAt",
        )
    }

    /// The three most recent sessions.
    pub fn latest_sessions(api: KnowledgeApi) -> Self {
        Self::fixed(
            api,
            "get_latest_sessions",
            "Retrieve the 3 latest sessions of the Rextro Exhibition. Takes no parameters and always returns the top 3.",
            "/sessions",
            PageParams {
                page: 1,
                limit: 3,
                sort_by: None,
                sort_order: SortOrder::Desc,
            },
        )
    }
}

#[async_trait]
impl Tool for ListingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        match self.paging {
            Paging::Fixed(_) => json!({"type": "object", "properties": {}}),
            Paging::FromArgs { .. } => json!({
                "type": "object",
                "properties": page_properties(),
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let params = match &self.paging {
            Paging::Fixed(params) => params.clone(),
            Paging::FromArgs { default_sort_by } => {
                parse_args::<PageArgs>(args)?.resolve(default_sort_by)
            }
        };
        self.api.get_json(&self.path, &params.to_query()).await
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: Option<String>,
    tags: Option<Vec<String>>,
    #[serde(flatten)]
    page: PageArgs,
}

/// Searches sessions by free text and tags.
pub struct SessionSearchTool {
    api: KnowledgeApi,
}

impl SessionSearchTool {
    pub fn new(api: KnowledgeApi) -> Self {
        Self { api }
    }

    /// Optional filters are left out entirely when absent or empty.
    fn build_query(args: SearchArgs) -> Vec<(&'static str, String)> {
        let mut params = args.page.resolve("time").to_query();

        if let Some(query) = args.query.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()) {
            params.push(("query", query));
        }

        let tags: Vec<String> = args
            .tags
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if !tags.is_empty() {
            params.push(("tags", tags.join(",")));
        }

        params
    }
}

#[async_trait]
impl Tool for SessionSearchTool {
    fn name(&self) -> &str {
        "search_rextro_sessions"
    }

    fn description(&self) -> &str {
        "Search the Rextro Exhibition sessions. Optionally give a free-text 'query' to match session titles or descriptions and/or a list of 'tags' to filter by topic. Supports pagination and sorting. Returns the JSON response as formatted text."
    }

    fn parameters_schema(&self) -> Value {
        let mut properties = page_properties();
        properties.insert(
            "query".to_string(),
            json!({
                "type": "string",
                "description": "Optional search term to match session titles/descriptions."
            }),
        );
        properties.insert(
            "tags".to_string(),
            json!({
                "type": "array",
                "items": {"type": "string"},
                "description": "Optional list of tag identifiers to filter sessions by topic."
            }),
        );
        json!({
            "type": "object",
            "properties": properties,
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: SearchArgs = parse_args(args)?;
        let params = Self::build_query(args);
        self.api.get_json("/sessions/search", &params).await
    }
}
