//! `POST /ask` and `GET /` handlers.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::Instrument;
use uuid::Uuid;

use super::routes::AppState;
use super::types::{AskRequest, AskResponse, ErrorDetail, HealthResponse};

/// Longest query prefix written to the logs.
const LOGGED_QUERY_CHARS: usize = 100;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// Answer a question. Pipeline failures still produce 200 with an apology;
/// only malformed bodies and, when login is enabled, missing sessions are
/// rejected.
pub async fn ask(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("ask", %request_id);

    async move {
        if let Some(auth) = &state.auth {
            if let Err(e) = auth.authenticate(&headers).await {
                tracing::info!("Rejected unauthenticated request: {}", e);
                return e.into_response();
            }
        }

        let Json(request) = match payload {
            Ok(payload) => payload,
            Err(rejection) => {
                tracing::info!("Rejected malformed request: {}", rejection.body_text());
                return (rejection.status(), Json(ErrorDetail::new(rejection.body_text())))
                    .into_response();
            }
        };

        tracing::info!("Received query: {}", preview(&request.query));
        let result = state.pipeline.run(&request.query).await;
        tracing::info!(outcome = ?result.outcome, attempts = result.attempts, "Answered query");

        Json(AskResponse {
            answer: result.answer.answer,
        })
        .into_response()
    }
    .instrument(span)
    .await
}

fn preview(query: &str) -> String {
    let mut chars = query.chars();
    let head: String = chars.by_ref().take(LOGGED_QUERY_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_queries_are_shortened_for_logs() {
        assert_eq!(preview("short"), "short");
        let long = "é".repeat(150);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), LOGGED_QUERY_CHARS + 3);
        assert!(shown.ends_with("..."));
    }
}
