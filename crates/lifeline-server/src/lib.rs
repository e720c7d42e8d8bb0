//! Fleet status server: telemetry refresh, alerting and the query API.

pub mod api;
pub mod config;
pub mod export;
pub mod loops;
pub mod source;
pub mod state;
