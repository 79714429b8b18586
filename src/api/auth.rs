//! Google login, callback, logout and profile routes.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::oauth::{new_state_token, IdentityProvider};
use crate::session::{AuthError, Session, SessionManager};

use super::types::{CallbackParams, ErrorDetail, MessageResponse};

pub const SESSION_COOKIE: &str = "session_id";
pub const STATE_COOKIE: &str = "oauth_state";
const STATE_MAX_AGE_SECS: i64 = 600;

/// Everything the authenticated variant needs.
pub struct AuthState {
    pub provider: Arc<dyn IdentityProvider>,
    pub sessions: SessionManager,
    /// Where the browser goes after login; JSON profile when unset
    pub frontend_url: Option<String>,
}

impl AuthState {
    /// Resolve the caller's session from the `session_id` cookie.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Session, AuthError> {
        let id = cookie(headers, SESSION_COOKIE).ok_or(AuthError::MissingSession)?;
        self.sessions.validate(&id).await
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::StateMismatch | AuthError::MissingCode => StatusCode::BAD_REQUEST,
            AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::MissingSession
            | AuthError::InvalidSession
            | AuthError::SessionExpired
            | AuthError::Provider(_) => StatusCode::UNAUTHORIZED,
        };
        let detail = match &self {
            AuthError::Provider(_) => "Authentication failed".to_string(),
            AuthError::Store(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        (status, Json(ErrorDetail::new(detail))).into_response()
    }
}

pub fn routes(state: Arc<AuthState>) -> Router {
    Router::new()
        .route("/auth/google/login", get(login))
        .route("/auth/google/callback", get(callback))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .with_state(state)
}

async fn login(State(auth): State<Arc<AuthState>>) -> Result<Response, AuthError> {
    let state = new_state_token();
    let url = auth.provider.authorize_url(&state)?;
    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            set_cookie(STATE_COOKIE, &state, STATE_MAX_AGE_SECS),
        )]),
        Redirect::to(&url),
    )
        .into_response())
}

async fn callback(
    State(auth): State<Arc<AuthState>>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    // CSRF check comes before anything is sent to the provider.
    let expected = cookie(&headers, STATE_COOKIE);
    match (expected.as_deref(), params.state.as_deref()) {
        (Some(expected), Some(received)) if !expected.is_empty() && expected == received => {}
        _ => {
            tracing::warn!("OAuth callback rejected: state mismatch");
            return Err(AuthError::StateMismatch);
        }
    }

    if let Some(error) = &params.error {
        tracing::warn!("Identity provider returned error: {}", error);
    }
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(AuthError::MissingCode)?;

    let profile = auth.provider.exchange(&code).await.map_err(|e| {
        tracing::error!("OAuth code exchange failed: {}", e);
        AuthError::Provider(e)
    })?;
    let session = auth.sessions.create(profile).await?;

    let cookies = AppendHeaders([
        (
            header::SET_COOKIE,
            set_cookie(SESSION_COOKIE, &session.id, auth.sessions.ttl().num_seconds()),
        ),
        (header::SET_COOKIE, clear_cookie(STATE_COOKIE)),
    ]);

    Ok(match &auth.frontend_url {
        Some(url) => (cookies, Redirect::to(url)).into_response(),
        None => (cookies, Json(session.profile)).into_response(),
    })
}

async fn logout(State(auth): State<Arc<AuthState>>, headers: HeaderMap) -> Result<Response, AuthError> {
    if let Some(id) = cookie(&headers, SESSION_COOKIE) {
        auth.sessions.logout(&id).await?;
    }
    Ok((
        AppendHeaders([(header::SET_COOKIE, clear_cookie(SESSION_COOKIE))]),
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    )
        .into_response())
}

async fn me(State(auth): State<Arc<AuthState>>, headers: HeaderMap) -> Result<Response, AuthError> {
    let session = auth.authenticate(&headers).await?;
    Ok(Json(session.profile).into_response())
}

/// Value of the named cookie from the `Cookie` request headers.
pub fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

fn set_cookie(name: &str, value: &str, max_age: i64) -> String {
    format!("{name}={value}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age}")
}

fn clear_cookie(name: &str) -> String {
    set_cookie(name, "", 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session_id=abc-123; oauth_state=xyz"),
        );
        assert_eq!(cookie(&headers, "session_id").as_deref(), Some("abc-123"));
        assert_eq!(cookie(&headers, "oauth_state").as_deref(), Some("xyz"));
        assert_eq!(cookie(&headers, "missing"), None);
    }

    #[test]
    fn cookies_are_http_only() {
        let value = set_cookie(SESSION_COOKIE, "abc", 86_400);
        assert_eq!(
            value,
            "session_id=abc; HttpOnly; SameSite=Lax; Path=/; Max-Age=86400"
        );
        assert!(clear_cookie(STATE_COOKIE).ends_with("Max-Age=0"));
    }
}
