//! REST API routes.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lifeline_core::{AlertSeverity, FleetError};
use serde::Deserialize;
use serde_json::json;

use crate::api::auth::{self, LoginThrottle, OperatorToken};
use crate::config::{Config, SourceKind};
use crate::source::SnapshotUpdate;
use crate::state::AppState;

const DEFAULT_ACTIVITY_COUNT: usize = 10;
const MAX_ACTIVITY_COUNT: usize = 1000;

/// Create the API router.
pub fn create_router(config: &Config) -> Router<Arc<AppState>> {
    let login_throttle = LoginThrottle::new(
        config.login_max_failures,
        config.login_failure_window,
        config.rate_limit_enabled,
        config.trust_proxy,
    );
    let operator_token = OperatorToken(Arc::new(config.operator_token.clone()));

    // Public read-only routes
    let public_routes = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/v1/status", get(get_status))
        .route("/v1/fleet", get(list_drones))
        .route("/v1/fleet/overview", get(get_fleet_overview))
        .route("/v1/fleet/:drone_id", get(get_drone))
        .route("/v1/inventory", get(list_inventory))
        .route("/v1/inventory/overview", get(get_inventory_overview))
        .route("/v1/maintenance", get(list_maintenance))
        .route("/v1/maintenance/overview", get(get_maintenance_overview))
        .route("/v1/alerts", get(list_alerts))
        .route("/v1/activities", get(list_activities))
        .route("/v1/trends", get(get_trends))
        .route("/v1/missions", get(get_missions))
        .route("/v1/export", get(export));

    let login_routes = Router::new()
        .route("/v1/auth/login", post(login))
        .layer(middleware::from_fn_with_state(login_throttle, auth::throttle_login));

    // Operator routes (require operator token)
    let operator_routes = Router::new()
        .route("/v1/alerts/emergency", post(raise_emergency))
        .route("/v1/alerts/:alert_id/ack", post(acknowledge_alert))
        .route("/v1/alerts/:alert_id/resolve", post(resolve_alert))
        .route("/v1/telemetry", post(receive_telemetry))
        .layer(middleware::from_fn_with_state(operator_token, auth::require_operator));

    public_routes.merge(login_routes).merge(operator_routes)
}

// === Request types ===

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    pub severity: Option<AlertSeverity>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub n: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct EmergencyRequest {
    #[serde(default)]
    pub message: Option<String>,
}

// === Handlers ===

fn error_response(err: FleetError) -> Response {
    let status = match &err {
        FleetError::AlertNotFound(_) => StatusCode::NOT_FOUND,
        FleetError::InvalidTransition { .. } | FleetError::ScanConflict => StatusCode::CONFLICT,
        FleetError::AuthFailure => StatusCode::UNAUTHORIZED,
        FleetError::InvalidMetric { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        FleetError::InvalidHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.status())
}

async fn list_drones(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.drones())
}

async fn get_fleet_overview(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "overview": state.fleet_overview(),
        "battery_distribution": state.battery_distribution(),
    }))
}

async fn get_drone(
    State(state): State<Arc<AppState>>,
    Path(drone_id): Path<String>,
) -> Response {
    match state.drone(&drone_id) {
        Some(drone) => Json(drone).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("drone {drone_id} not found") })),
        )
            .into_response(),
    }
}

async fn list_inventory(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.inventory())
}

async fn get_inventory_overview(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "overview": state.inventory_overview(),
        "stock_status": state.stock_status_counts(),
    }))
}

async fn list_maintenance(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.maintenance())
}

async fn get_maintenance_overview(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "overview": state.maintenance_overview(),
        "health_status": state.health_status_counts(),
    }))
}

async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertQuery>,
) -> impl IntoResponse {
    let mut alerts = state.active_alerts();
    if let Some(severity) = query.severity {
        alerts.retain(|alert| alert.severity == severity);
    }
    Json(alerts)
}

async fn list_activities(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActivityQuery>,
) -> impl IntoResponse {
    let n = query
        .n
        .unwrap_or(DEFAULT_ACTIVITY_COUNT)
        .min(MAX_ACTIVITY_COUNT);
    Json(state.recent_activities(n))
}

async fn get_trends(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.trends())
}

async fn get_missions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.mission_stats())
}

async fn export(State(state): State<Arc<AppState>>) -> Response {
    let doc = state.export_document();
    let disposition = format!("attachment; filename=\"{}\"", doc.file_name());
    ([(header::CONTENT_DISPOSITION, disposition)], Json(doc)).into_response()
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    let username = request.username.clone();
    let checked = tokio::task::spawn_blocking(move || {
        state.authenticate(&request.username, &request.password)
    })
    .await;

    match checked {
        Ok(true) => {
            tracing::info!("Operator {} signed in", username);
            Json(json!({ "authenticated": true, "username": username })).into_response()
        }
        Ok(false) => {
            tracing::warn!("Failed sign-in attempt");
            error_response(FleetError::AuthFailure)
        }
        Err(err) => {
            tracing::error!("Credential check task failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn raise_emergency(
    State(state): State<Arc<AppState>>,
    body: Option<Json<EmergencyRequest>>,
) -> Response {
    let message = body
        .and_then(|Json(req)| req.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "Emergency protocol activated by operator".to_string());
    let alert = state.raise_emergency(&message);
    (StatusCode::CREATED, Json(alert)).into_response()
}

async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    Path(alert_id): Path<String>,
) -> Response {
    match state.acknowledge_alert(&alert_id) {
        Ok(alert) => Json(alert).into_response(),
        Err(err) => error_response(err),
    }
}

async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    Path(alert_id): Path<String>,
) -> Response {
    match state.resolve_manual_alert(&alert_id) {
        Ok(alert) => Json(alert).into_response(),
        Err(err) => error_response(err),
    }
}

/// Queue pushed telemetry for the next refresh cycle.
async fn receive_telemetry(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SnapshotUpdate>,
) -> Response {
    if state.config().source != SourceKind::Push {
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "Push ingestion disabled",
                "hint": "Set LIFELINE_SOURCE=push"
            })),
        )
            .into_response();
    }
    if update.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Update contains no collections" })),
        )
            .into_response();
    }

    let queued = json!({
        "drones": update.drones.as_ref().map(Vec::len),
        "inventory": update.inventory.as_ref().map(Vec::len),
        "maintenance": update.maintenance.as_ref().map(Vec::len),
    });
    state.push_inbox().submit(update);
    (StatusCode::ACCEPTED, Json(json!({ "queued": queued }))).into_response()
}
