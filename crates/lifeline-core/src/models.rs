//! Core data models for the fleet status system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operational state reported by a drone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DroneStatus {
    Active,
    Charging,
    Maintenance,
    Emergency,
}

/// Latest telemetry for one aircraft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drone {
    pub id: String,
    pub status: DroneStatus,
    /// Battery charge in percent, 0-100
    pub battery: f64,
    pub location: String,
    #[serde(default)]
    pub current_mission: Option<String>,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

/// One stocked medical supply line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub current_stock: i64,
    pub min_stock: i64,
    pub max_stock: i64,
    /// Cost per unit, used for inventory valuation
    #[serde(default)]
    pub unit_cost: f64,
    pub expiry_date: DateTime<Utc>,
    pub priority: Priority,
    #[serde(default)]
    pub location: String,
    /// Storage requirement such as "2-8°C"
    #[serde(default)]
    pub temperature_req: Option<String>,
}

/// Health record of a single drone component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub drone_id: String,
    pub component: String,
    /// Component health, 0-100
    pub health_score: f64,
    pub last_service: DateTime<Utc>,
    pub next_service: DateTime<Utc>,
    pub flight_hours: f64,
    #[serde(default)]
    pub cycles: u32,
    /// Estimated repair cost if the component needs work
    #[serde(default)]
    pub estimated_cost: f64,
}

impl MaintenanceRecord {
    /// Stable identifier: one record per (drone, component).
    pub fn record_id(&self) -> String {
        format!("{}/{}", self.drone_id, self.component)
    }

    /// Probability of failure derived from health, in [0, 1].
    pub fn failure_probability(&self) -> f64 {
        ((100.0 - self.health_score) / 100.0).clamp(0.0, 1.0)
    }
}

/// Kind of entity an alert or validation failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Drone,
    Inventory,
    Maintenance,
    System,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Drone => "drone",
            EntityKind::Inventory => "inventory",
            EntityKind::Maintenance => "maintenance",
            EntityKind::System => "system",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Anything held in a telemetry snapshot.
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn entity_id(&self) -> String;

    /// Source timestamp of the record, when the kind carries one.
    fn observed_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(Self::KIND, self.entity_id())
    }
}

impl Entity for Drone {
    const KIND: EntityKind = EntityKind::Drone;

    fn entity_id(&self) -> String {
        self.id.clone()
    }

    fn observed_at(&self) -> Option<DateTime<Utc>> {
        Some(self.last_update)
    }
}

impl Entity for InventoryItem {
    const KIND: EntityKind = EntityKind::Inventory;

    fn entity_id(&self) -> String {
        self.id.clone()
    }
}

impl Entity for MaintenanceRecord {
    const KIND: EntityKind = EntityKind::Maintenance;

    fn entity_id(&self) -> String {
        self.record_id()
    }
}

/// Severity levels for alerts, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertState {
    pub fn is_open(self) -> bool {
        matches!(self, AlertState::Active | AlertState::Acknowledged)
    }
}

/// Identifier of the rule that produced an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    EmergencyBattery,
    LowBattery,
    DroneEmergency,
    CriticalStock,
    Expired,
    ExpiringSoon,
    ComponentCritical,
    ServiceOverdue,
    InvalidMetric,
    ManualEmergency,
}

/// An alert raised against one entity by one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub source: EntityRef,
    pub rule: RuleId,
    pub created_at: DateTime<Utc>,
    pub state: AlertState,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    AlertCreated,
    AlertAcknowledged,
    AlertResolved,
    DroneDeployed,
    MissionCompleted,
    MaintenanceStarted,
    SupplyRestocked,
}

/// One line of the append-only activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub timestamp: DateTime<Utc>,
    pub category: ActivityCategory,
    pub description: String,
    #[serde(default)]
    pub alert_id: Option<String>,
    /// Entity the entry is about
    #[serde(default)]
    pub source: Option<EntityRef>,
}

/// Everything a telemetry source delivers in one refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    #[serde(default)]
    pub drones: Vec<Drone>,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    #[serde(default)]
    pub maintenance: Vec<MaintenanceRecord>,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

impl FleetSnapshot {
    pub fn is_empty(&self) -> bool {
        self.drones.is_empty() && self.inventory.is_empty() && self.maintenance.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_fields_default_when_missing() {
        let snapshot: FleetSnapshot = serde_json::from_str(
            r#"{"drones":[{"id":"LLA-001","status":"Active","battery":76.5,
                "location":"Zone Alpha","last_update":"2026-03-01T10:00:00Z"}]}"#,
        )
        .unwrap();
        assert_eq!(snapshot.drones.len(), 1);
        assert!(snapshot.drones[0].current_mission.is_none());
        assert!(snapshot.inventory.is_empty());
        assert!(snapshot.captured_at.is_none());
    }

    #[test]
    fn test_alert_wire_names() {
        let value = serde_json::to_value(RuleId::ServiceOverdue).unwrap();
        assert_eq!(value, "service_overdue");
        let value = serde_json::to_value(EntityRef::new(EntityKind::Maintenance, "LLA-002/Rotors")).unwrap();
        assert_eq!(value["kind"], "maintenance");
        assert_eq!(serde_json::to_value(AlertSeverity::Critical).unwrap(), "critical");
    }

    #[test]
    fn test_failure_probability_from_health() {
        let now = Utc::now();
        let record = MaintenanceRecord {
            drone_id: "LLA-002".to_string(),
            component: "Rotors".to_string(),
            health_score: 72.0,
            last_service: now,
            next_service: now,
            flight_hours: 0.0,
            cycles: 0,
            estimated_cost: 0.0,
        };
        assert!((record.failure_probability() - 0.28).abs() < 1e-9);
        assert_eq!(record.entity_id(), "LLA-002/Rotors");
    }
}
