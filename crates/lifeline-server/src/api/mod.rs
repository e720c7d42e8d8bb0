//! HTTP query surface.

pub mod auth;
mod routes;

use std::sync::Arc;

use axum::Router;

use crate::config::Config;
use crate::state::AppState;

pub fn routes(config: &Config) -> Router<Arc<AppState>> {
    routes::create_router(config)
}
