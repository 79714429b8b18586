//! Google OAuth 2.0 authorization-code flow.

use async_trait::async_trait;
use rand::RngCore;
use serde::Deserialize;
use thiserror::Error;

use crate::config::OAuthConfig;
use crate::session::UserProfile;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const SCOPES: &str = "openid email profile";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("identity provider request failed: {0}")]
    Request(String),

    #[error("identity provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected identity provider response: {0}")]
    Decode(String),

    #[error("invalid OAuth endpoint: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for OAuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// The login side of an identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the browser is sent to, carrying the CSRF `state`.
    fn authorize_url(&self, state: &str) -> Result<String, OAuthError>;

    /// Trade an authorization code for the user's profile claims.
    async fn exchange(&self, code: &str) -> Result<UserProfile, OAuthError>;
}

/// Random 32-byte state token, hex encoded.
pub fn new_state_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct GoogleOAuth {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    authorize_url: String,
    token_url: String,
    userinfo_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleOAuth {
    pub fn new(config: &OAuthConfig) -> Result<Self, OAuthError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            userinfo_url: USERINFO_URL.to_string(),
        })
    }

    /// Point the code exchange at other token/userinfo endpoints.
    pub fn with_endpoints(mut self, token_url: impl Into<String>, userinfo_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.userinfo_url = userinfo_url.into();
        self
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, OAuthError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(OAuthError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleOAuth {
    fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        let url = url::Url::parse_with_params(
            &self.authorize_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state),
                ("access_type", "online"),
                ("prompt", "select_account"),
            ],
        )
        .map_err(|e| OAuthError::InvalidUrl(e.to_string()))?;
        Ok(url.into())
    }

    async fn exchange(&self, code: &str) -> Result<UserProfile, OAuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;
        let token: TokenResponse = Self::check(response).await?.json().await?;

        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await?;
        let info: UserInfo = Self::check(response).await?.json().await?;

        Ok(UserProfile {
            sub: info.sub,
            email: info.email,
            name: info.name,
            picture: info.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Form;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn config() -> OAuthConfig {
        OAuthConfig {
            client_id: "client-123".to_string(),
            client_secret: "shh".to_string(),
            redirect_uri: "http://localhost:8000/auth/google/callback".to_string(),
            frontend_url: None,
        }
    }

    #[test]
    fn state_tokens_are_64_hex_chars() {
        let a = new_state_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, new_state_token());
    }

    #[test]
    fn authorize_url_carries_state_and_scopes() {
        let google = GoogleOAuth::new(&config()).unwrap();
        let url = url::Url::parse(&google.authorize_url("abc123").unwrap()).unwrap();
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(params["state"], "abc123");
        assert_eq!(params["scope"], "openid email profile");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "client-123");
    }

    async fn token(Form(form): Form<HashMap<String, String>>) -> Result<Json<Value>, axum::http::StatusCode> {
        if form.get("code").map(String::as_str) == Some("good-code")
            && form.get("grant_type").map(String::as_str) == Some("authorization_code")
        {
            Ok(Json(json!({"access_token": "tok", "token_type": "Bearer"})))
        } else {
            Err(axum::http::StatusCode::BAD_REQUEST)
        }
    }

    async fn userinfo(headers: HeaderMap) -> Result<Json<Value>, axum::http::StatusCode> {
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Bearer tok") => Ok(Json(json!({
                "sub": "42",
                "email": "visitor@example.com",
                "name": "Visitor",
                "picture": "https://example.com/p.png"
            }))),
            _ => Err(axum::http::StatusCode::UNAUTHORIZED),
        }
    }

    async fn provider() -> GoogleOAuth {
        let app = Router::new()
            .route("/token", post(token))
            .route("/userinfo", get(userinfo));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        GoogleOAuth::new(&config()).unwrap().with_endpoints(
            format!("http://{}/token", addr),
            format!("http://{}/userinfo", addr),
        )
    }

    #[tokio::test]
    async fn exchanges_code_for_profile() {
        let google = provider().await;
        let profile = google.exchange("good-code").await.unwrap();
        assert_eq!(profile.sub, "42");
        assert_eq!(profile.email.as_deref(), Some("visitor@example.com"));
    }

    #[tokio::test]
    async fn rejected_code_is_a_status_error() {
        let google = provider().await;
        let err = google.exchange("bad-code").await.unwrap_err();
        assert!(matches!(err, OAuthError::Status { status: 400, .. }));
    }
}
