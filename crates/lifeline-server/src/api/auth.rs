//! Authentication middleware for operator endpoints, plus the login
//! throttle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use subtle::ConstantTimeEq;

/// Operator bearer token from config. `None` disables operator routes.
#[derive(Clone)]
pub struct OperatorToken(pub Arc<Option<String>>);

/// Middleware that requires `Authorization: Bearer <operator_token>`.
pub async fn require_operator(
    State(operator_token): State<OperatorToken>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = operator_token.0.as_deref() else {
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "error": "Operator actions disabled",
                "hint": "Set LIFELINE_OPERATOR_TOKEN to enable them"
            })),
        )
            .into_response();
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match auth_header {
        Some(auth) if auth.starts_with("Bearer ") => {
            let token = auth.trim_start_matches("Bearer ").trim();
            if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) {
                next.run(request).await
            } else {
                (
                    StatusCode::FORBIDDEN,
                    Json(serde_json::json!({ "error": "Invalid operator token" })),
                )
                    .into_response()
            }
        }
        Some(_) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Invalid Authorization header format",
                "expected": "Bearer <token>"
            })),
        )
            .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "Authorization required",
                "hint": "Add header: Authorization: Bearer <operator_token>"
            })),
        )
            .into_response(),
    }
}

/// Failed sign-in attempts per client over a sliding window.
///
/// Only rejected credentials count. A client that reaches `max_failures`
/// inside the window is refused until its oldest failure ages out, and a
/// successful sign-in clears its record.
#[derive(Clone)]
pub struct LoginThrottle {
    failures: Arc<DashMap<String, Vec<Instant>>>,
    window: Duration,
    max_failures: u32,
    enabled: bool,
    trust_proxy: bool,
}

/// Tracked clients above which expired records are swept on insert.
const SWEEP_THRESHOLD: usize = 1024;

impl LoginThrottle {
    pub fn new(max_failures: u32, window: Duration, enabled: bool, trust_proxy: bool) -> Self {
        Self {
            failures: Arc::new(DashMap::new()),
            window,
            max_failures,
            enabled,
            trust_proxy,
        }
    }

    pub fn is_locked(&self, client: &str, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }
        self.failures.get(client).is_some_and(|stamps| {
            let recent = stamps
                .iter()
                .filter(|t| now.duration_since(**t) < self.window)
                .count();
            recent >= self.max_failures as usize
        })
    }

    pub fn record_failure(&self, client: &str, now: Instant) {
        if !self.enabled {
            return;
        }
        if self.failures.len() >= SWEEP_THRESHOLD {
            self.sweep(now);
        }
        let mut entry = self.failures.entry(client.to_string()).or_default();
        let stamps = entry.value_mut();
        stamps.retain(|t| now.duration_since(*t) < self.window);
        stamps.push(now);
    }

    pub fn clear(&self, client: &str) {
        self.failures.remove(client);
    }

    fn sweep(&self, now: Instant) {
        self.failures
            .retain(|_, stamps| stamps.iter().any(|t| now.duration_since(*t) < self.window));
    }

    fn client_key(&self, request: &Request) -> String {
        let forwarded = if self.trust_proxy {
            request
                .headers()
                .get("X-Forwarded-For")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split(',').next())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        } else {
            None
        };
        forwarded
            .or_else(|| {
                request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|info| info.0.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Login middleware: refuses locked-out clients, then books the outcome.
pub async fn throttle_login(
    State(throttle): State<LoginThrottle>,
    request: Request,
    next: Next,
) -> Response {
    let client = throttle.client_key(&request);
    if throttle.is_locked(&client, Instant::now()) {
        tracing::warn!("Sign-in refused for {}: too many failed attempts", client);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "Too many failed sign-in attempts",
                "retry_after_secs": throttle.window.as_secs()
            })),
        )
            .into_response();
    }

    let response = next.run(request).await;
    match response.status() {
        StatusCode::UNAUTHORIZED => throttle.record_failure(&client, Instant::now()),
        status if status.is_success() => throttle.clear(&client),
        _ => {}
    }
    response
}
