//! Fixed-window request limiter keyed by client IP.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

use super::routes::AppState;

/// Map size above which stale windows are dropped on the next check.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: Arc<Mutex<HashMap<IpAddr, Window>>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count one request. On rejection returns the time left in the window.
    pub fn check(&self, client: IpAddr) -> Result<(), Duration> {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: IpAddr, now: Instant) -> Result<(), Duration> {
        let mut clients = match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if clients.len() > SWEEP_THRESHOLD {
            let window = self.window;
            clients.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = clients.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            return Err(self.window - now.duration_since(entry.started));
        }
        entry.count += 1;
        Ok(())
    }

    /// e.g. "100 per 5 second"
    pub fn describe(&self) -> String {
        format!("{} per {} second", self.max_requests, self.window.as_secs())
    }
}

/// Middleware rejecting clients over the limit with 429.
pub async fn limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let limiter = &state.rate_limiter;
    match limiter.check(addr.ip()) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::warn!("Rate limit exceeded for {}", addr.ip());
            let seconds = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, seconds.to_string())],
                Json(json!({
                    "error": format!("Rate limit exceeded: {}", limiter.describe())
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn limiter() -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_requests: 100,
            window: Duration::from_secs(5),
        })
    }

    #[test]
    fn hundred_and_first_request_in_window_is_rejected() {
        let limiter = limiter();
        let client = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let start = Instant::now();

        for i in 0..100 {
            assert!(limiter.check_at(client, start).is_ok(), "request {} rejected", i + 1);
        }
        let retry_after = limiter
            .check_at(client, start + Duration::from_secs(2))
            .unwrap_err();
        assert_eq!(retry_after, Duration::from_secs(3));
    }

    #[test]
    fn clients_are_counted_separately() {
        let limiter = limiter();
        let start = Instant::now();
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        for _ in 0..100 {
            limiter.check_at(a, start).unwrap();
        }
        assert!(limiter.check_at(a, start).is_err());
        assert!(limiter.check_at(b, start).is_ok());
    }

    #[test]
    fn new_window_resets_the_count() {
        let limiter = limiter();
        let start = Instant::now();
        let client = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

        for _ in 0..100 {
            limiter.check_at(client, start).unwrap();
        }
        assert!(limiter.check_at(client, start).is_err());
        assert!(limiter
            .check_at(client, start + Duration::from_secs(5))
            .is_ok());
    }

    #[test]
    fn describes_the_limit() {
        assert_eq!(limiter().describe(), "100 per 5 second");
    }
}
