//! HTTP API.
//!
//! - `GET /` health check
//! - `POST /ask` question answering (rate limited per client IP)
//! - `/auth/*` Google login, only when OAuth is configured

mod ask;
mod auth;
mod rate_limit;
mod routes;
pub mod types;

pub use auth::AuthState;
pub use rate_limit::RateLimiter;
pub use routes::{router, serve, AppState};
