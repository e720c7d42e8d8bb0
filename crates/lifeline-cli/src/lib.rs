//! Life-Line Air CLI - operator tools for the status server.
//!
//! Binaries:
//! - hash_password: produce a `LIFELINE_USERS` entry
//! - fleet_status: print the dashboard summary and open alerts
//! - push_telemetry: send a telemetry file to a push-mode server

pub mod client;
pub mod report;

pub use client::{StatusClient, TelemetryPush};
