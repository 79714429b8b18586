//! Configuration management for the Rextro RAG service.
//!
//! Configuration is read once at startup from environment variables (a `.env`
//! file is loaded first when present):
//! - `GEMINI_API_KEY` - Required. API key for the chat LLM.
//! - `OPENAI_API_KEY` - Required. API key for the embedding provider.
//! - `DB_CONNECTION_STRING` - Required. Postgres (pgvector) connection string.
//! - `DB_TABLE_NAME` - Required. Vector table name (plain identifier).
//! - `HOST` / `PORT` - Optional. Bind address. Defaults to `0.0.0.0:8000`.
//! - `LLM_BASE_URL` / `LLM_MODEL` - Optional. OpenAI-compatible chat endpoint and model.
//! - `EMBEDDING_BASE_URL` / `EMBEDDING_MODEL` / `EMBEDDING_DIM` - Optional.
//! - `RETRIEVAL_TOP_K` - Optional. Chunks fetched per knowledge-base lookup. Defaults to `10`.
//! - `AGENT_TIMEOUT_SECS` / `AGENT_MAX_ATTEMPTS` / `AGENT_MAX_ITERATIONS` - Optional.
//! - `MEMORY_TOKEN_LIMIT` - Optional. Conversation memory cap. Defaults to `3900`.
//! - `KNOWLEDGE_API_URL` - Optional. Base URL of the exhibition REST API.
//! - `KNOWLEDGE_DOC_PATH` - Optional. Markdown overview document.
//! - `RATE_LIMIT_REQUESTS` / `RATE_LIMIT_WINDOW_SECS` - Optional. Defaults to 100 per 5s.
//! - `GOOGLE_CLIENT_ID` - Optional. Enables Google login; then `GOOGLE_CLIENT_SECRET`
//!   and `GOOGLE_REDIRECT_URI` become required.
//! - `FRONTEND_URL` - Optional. Where the OAuth callback redirects after login.
//! - `SESSION_TTL_HOURS` - Optional. Session lifetime. Defaults to `24`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Default OpenAI-compatible endpoint for Gemini models.
pub const DEFAULT_LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Chat model configuration.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Embedding provider configuration.
#[derive(Clone)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Must match the dimension of the stored vectors.
    pub dimension: usize,
}

/// pgvector connection settings.
#[derive(Clone)]
pub struct VectorStoreConfig {
    pub connection_string: String,
    pub table_name: String,
    pub top_k: usize,
}

/// Agent loop and retry settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Timeout for one whole agent invocation
    pub timeout: Duration,
    /// Total attempts for transient failures (first try included)
    pub max_attempts: u32,
    /// Upper bound on LLM round-trips inside one invocation
    pub max_iterations: usize,
    /// Conversation memory cap, in estimated tokens
    pub memory_token_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            max_attempts: 3,
            max_iterations: 12,
            memory_token_limit: 3900,
        }
    }
}

/// External exhibition data sources used by the tools.
#[derive(Debug, Clone)]
pub struct KnowledgeApiConfig {
    pub base_url: String,
    pub document_path: PathBuf,
}

impl Default for KnowledgeApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://rextro-api.internalbuildtools.online".to_string(),
            document_path: PathBuf::from("data/rextro.md"),
        }
    }
}

/// Google OAuth settings. Present only when login is enabled.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub frontend_url: Option<String>,
}

/// Per-client fixed-window rate limit.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(5),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    pub llm: LlmConfig,

    pub embedding: EmbeddingConfig,

    pub vector_store: VectorStoreConfig,

    pub agent: AgentConfig,

    pub knowledge: KnowledgeApiConfig,

    pub rate_limit: RateLimitConfig,

    /// Login configuration; `None` runs the open variant
    pub oauth: Option<OAuthConfig>,

    /// Lifetime of a login session
    pub session_ttl: chrono::Duration,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if a required variable is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("Failed to read .env file: {}", e);
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let llm = LlmConfig {
            api_key: env.required("GEMINI_API_KEY")?,
            base_url: env.or("LLM_BASE_URL", DEFAULT_LLM_BASE_URL),
            model: env.or("LLM_MODEL", "gemini-2.5-flash"),
        };

        let embedding = EmbeddingConfig {
            api_key: env.required("OPENAI_API_KEY")?,
            base_url: env.or("EMBEDDING_BASE_URL", "https://api.openai.com/v1"),
            model: env.or("EMBEDDING_MODEL", "text-embedding-3-small"),
            dimension: env.parsed("EMBEDDING_DIM", 1536)?,
        };
        if embedding.dimension == 0 {
            return Err(ConfigError::InvalidValue(
                "EMBEDDING_DIM".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let table_name = env.required("DB_TABLE_NAME")?;
        validate_identifier(&table_name)
            .map_err(|reason| ConfigError::InvalidValue("DB_TABLE_NAME".to_string(), reason))?;
        let vector_store = VectorStoreConfig {
            connection_string: env.required("DB_CONNECTION_STRING")?,
            table_name,
            top_k: env.parsed("RETRIEVAL_TOP_K", 10)?,
        };
        if vector_store.top_k == 0 {
            return Err(ConfigError::InvalidValue(
                "RETRIEVAL_TOP_K".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let defaults = AgentConfig::default();
        let agent = AgentConfig {
            timeout: Duration::from_secs(
                env.positive("AGENT_TIMEOUT_SECS", defaults.timeout.as_secs())?,
            ),
            max_attempts: env.parsed("AGENT_MAX_ATTEMPTS", defaults.max_attempts)?.max(1),
            max_iterations: env.parsed("AGENT_MAX_ITERATIONS", defaults.max_iterations)?,
            memory_token_limit: env.parsed("MEMORY_TOKEN_LIMIT", defaults.memory_token_limit)?,
        };

        let knowledge_defaults = KnowledgeApiConfig::default();
        let knowledge = KnowledgeApiConfig {
            base_url: env
                .or("KNOWLEDGE_API_URL", &knowledge_defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
            document_path: env
                .get("KNOWLEDGE_DOC_PATH")
                .map(PathBuf::from)
                .unwrap_or(knowledge_defaults.document_path),
        };

        let rate_defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            max_requests: env.parsed("RATE_LIMIT_REQUESTS", rate_defaults.max_requests)?,
            window: Duration::from_secs(
                env.positive("RATE_LIMIT_WINDOW_SECS", rate_defaults.window.as_secs())?,
            ),
        };

        // Login is all-or-nothing: a client id without its secret is a deployment mistake.
        let oauth = match env.get("GOOGLE_CLIENT_ID") {
            Some(client_id) => Some(OAuthConfig {
                client_id,
                client_secret: env.required("GOOGLE_CLIENT_SECRET")?,
                redirect_uri: env.required("GOOGLE_REDIRECT_URI")?,
                frontend_url: env.get("FRONTEND_URL"),
            }),
            None => None,
        };

        let ttl_hours = env.positive("SESSION_TTL_HOURS", 24)?;
        let session_ttl = i64::try_from(ttl_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| {
                ConfigError::InvalidValue("SESSION_TTL_HOURS".to_string(), "out of range".to_string())
            })?;

        Ok(Self {
            host: env.or("HOST", "0.0.0.0"),
            port: env.parsed("PORT", 8000)?,
            llm,
            embedding,
            vector_store,
            agent,
            knowledge,
            rate_limit,
            oauth,
            session_ttl,
        })
    }

    /// Socket address string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether `/ask` requires a login session.
    pub fn auth_required(&self) -> bool {
        self.oauth.is_some()
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Empty values count as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), e.to_string())),
            None => Ok(default),
        }
    }

    /// Like [`Env::parsed`], but zero is rejected.
    fn positive(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match self.parsed(key, default)? {
            0 => Err(ConfigError::InvalidValue(
                key.to_string(),
                "must be greater than zero".to_string(),
            )),
            value => Ok(value),
        }
    }
}

fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > 63 {
        return Err("expected 1-63 characters".to_string());
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("{} is not a plain SQL identifier", name));
    }
    Ok(())
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "**********"
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &redacted(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("api_key", &redacted(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl fmt::Debug for VectorStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorStoreConfig")
            .field("connection_string", &redacted(&self.connection_string))
            .field("table_name", &self.table_name)
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(&self.client_secret))
            .field("redirect_uri", &self.redirect_uri)
            .field("frontend_url", &self.frontend_url)
            .finish()
    }
}
