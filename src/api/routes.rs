//! Router assembly and server entry.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::AnswerPipeline;

use super::auth::{self, AuthState};
use super::{ask, rate_limit::{self, RateLimiter}};

/// Shared state for all handlers.
pub struct AppState {
    pub pipeline: AnswerPipeline,
    pub rate_limiter: RateLimiter,
    /// Present when Google login is configured; `/ask` then requires a session.
    pub auth: Option<Arc<AuthState>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let ask_routes = Router::new()
        .route("/ask", post(ask::ask))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit,
        ));

    let mut app = Router::new()
        .route("/", get(ask::health))
        .merge(ask_routes)
        .with_state(state.clone());

    if let Some(auth_state) = &state.auth {
        app = app.merge(auth::routes(auth_state.clone()));
    }

    app.layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until Ctrl-C.
pub async fn serve(state: Arc<AppState>, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
