//! Blocking HTTP client for the status server API.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use lifeline_core::{
    ActivityLogEntry, Alert, AlertSeverity, Drone, FleetOverview, InventoryItem,
    InventoryOverview, MaintenanceOverview, MaintenanceRecord, MissionStats,
};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::report::severity_name;

#[derive(Debug, Clone, Deserialize)]
pub struct FleetOverviewResponse {
    pub overview: FleetOverview,
    pub battery_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryOverviewResponse {
    pub overview: InventoryOverview,
    pub stock_status: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceOverviewResponse {
    pub overview: MaintenanceOverview,
    pub health_status: BTreeMap<String, usize>,
}

/// Body of `POST /v1/telemetry`. Collections left out keep the server's
/// stored copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryPush {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drones: Option<Vec<Drone>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<Vec<InventoryItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance: Option<Vec<MaintenanceRecord>>,
}

impl TelemetryPush {
    pub fn is_empty(&self) -> bool {
        self.drones.is_none() && self.inventory.is_none() && self.maintenance.is_none()
    }

    /// Mark every drone as reported at `now` so the server does not treat
    /// replayed files as stale.
    pub fn stamp(&mut self, now: DateTime<Utc>) {
        if let Some(drones) = self.drones.as_mut() {
            for drone in drones {
                drone.last_update = now;
            }
        }
    }
}

pub struct StatusClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl StatusClient {
    /// # Arguments
    /// * `base_url` - Server root, e.g. "http://localhost:3000"
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
            token: None,
        }
    }

    /// Operator bearer token for write endpoints.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        self.client
            .get(&url)
            .send()
            .with_context(|| format!("Failed to reach {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {path} was refused"))?
            .json()
            .with_context(|| format!("Unexpected response from {path}"))
    }

    pub fn fleet_overview(&self) -> Result<FleetOverviewResponse> {
        self.get("/v1/fleet/overview")
    }

    pub fn inventory_overview(&self) -> Result<InventoryOverviewResponse> {
        self.get("/v1/inventory/overview")
    }

    pub fn maintenance_overview(&self) -> Result<MaintenanceOverviewResponse> {
        self.get("/v1/maintenance/overview")
    }

    pub fn missions(&self) -> Result<MissionStats> {
        self.get("/v1/missions")
    }

    pub fn alerts(&self, severity: Option<AlertSeverity>) -> Result<Vec<Alert>> {
        match severity {
            Some(severity) => self.get(&format!("/v1/alerts?severity={}", severity_name(severity))),
            None => self.get("/v1/alerts"),
        }
    }

    pub fn recent_activities(&self, n: usize) -> Result<Vec<ActivityLogEntry>> {
        self.get(&format!("/v1/activities?n={n}"))
    }

    /// Queue telemetry on a push-mode server. Returns the per-collection
    /// counts the server accepted.
    pub fn push(&self, update: &TelemetryPush) -> Result<serde_json::Value> {
        let Some(token) = self.token.as_deref() else {
            bail!("An operator token is required to push telemetry");
        };
        if update.is_empty() {
            bail!("Nothing to push: the update has no collections");
        }

        let response = self
            .client
            .post(self.url("/v1/telemetry"))
            .header("Authorization", format!("Bearer {}", token))
            .json(update)
            .send()
            .context("Failed to send telemetry")?;

        let status = response.status();
        let body: serde_json::Value = response.json().unwrap_or(serde_json::Value::Null);
        if !status.is_success() {
            bail!("Server rejected telemetry ({}): {}", status, body);
        }
        Ok(body["queued"].clone())
    }
}
