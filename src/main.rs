//! Rextro RAG - HTTP Server Entry Point
//!
//! Wires the agent, tools and sessions together and starts the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rextro_rag::agent::{Agent, AnswerPipeline, RetryPolicy};
use rextro_rag::api::{self, AppState, AuthState, RateLimiter};
use rextro_rag::config::Config;
use rextro_rag::llm::OpenAiCompatibleClient;
use rextro_rag::oauth::GoogleOAuth;
use rextro_rag::retrieval::{OpenAiEmbedder, PgVectorIndex, Retriever};
use rextro_rag::session::{spawn_sweeper, InMemorySessionStore, SessionManager};
use rextro_rag::tools::{
    DocumentTool, KnowledgeApi, KnowledgeBaseTool, ListingTool, SessionSearchTool, ToolRegistry,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rextro_rag=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Loaded configuration: model={}, table={}, auth={}",
        config.llm.model,
        config.vector_store.table_name,
        config.auth_required()
    );

    let state = build_state(&config)?;

    let addr = config.bind_addr();
    info!("Starting server on {}", addr);
    api::serve(Arc::new(state), &addr).await?;

    Ok(())
}

fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let embedder = Arc::new(OpenAiEmbedder::new(config.embedding.clone())?);
    let index = Arc::new(PgVectorIndex::connect_lazy(
        &config.vector_store,
        config.embedding.dimension,
    )?);
    let retriever = Retriever::new(embedder, index);

    let knowledge_api = KnowledgeApi::new(config.knowledge.base_url.clone())?;
    let tools = ToolRegistry::new()
        .with(Arc::new(KnowledgeBaseTool::new(
            retriever,
            config.vector_store.top_k,
        )))
        .with(Arc::new(DocumentTool::new(
            config.knowledge.document_path.clone(),
        )))
        .with(Arc::new(ListingTool::zones(knowledge_api.clone())))
        .with(Arc::new(ListingTool::latest_sessions(knowledge_api.clone())))
        .with(Arc::new(SessionSearchTool::new(knowledge_api)));
    info!("Registered {} tools", tools.len());

    let llm = Arc::new(OpenAiCompatibleClient::new(&config.llm)?);
    let agent = Agent::new(llm, tools, &config.agent);
    let pipeline = AnswerPipeline::new(Arc::new(agent), RetryPolicy::from(&config.agent));

    let auth = match &config.oauth {
        Some(oauth) => {
            let sessions = SessionManager::new(
                Arc::new(InMemorySessionStore::new()),
                config.session_ttl,
            );
            spawn_sweeper(sessions.clone(), SESSION_SWEEP_INTERVAL);
            Some(Arc::new(AuthState {
                provider: Arc::new(GoogleOAuth::new(oauth)?),
                sessions,
                frontend_url: oauth.frontend_url.clone(),
            }))
        }
        None => {
            info!("Google OAuth not configured; /ask is open and /auth routes are disabled");
            None
        }
    };

    Ok(AppState {
        pipeline,
        rate_limiter: RateLimiter::new(&config.rate_limit),
        auth,
    })
}
