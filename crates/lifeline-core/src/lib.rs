pub mod aggregate;
pub mod alerts;
pub mod auth;
pub mod classify;
pub mod error;
pub mod models;
pub mod operations;
pub mod rules;

pub use aggregate::{
    battery_distribution, fleet_overview, health_status_counts, inventory_overview,
    maintenance_overview, moving_average, percentile, stock_status_counts, trailing_mean, trend,
    FleetOverview, InventoryOverview, MaintenanceOverview, TrendSummary,
};
pub use alerts::{AlertManager, DedupKey, ScanReport};
pub use auth::{hash_password, AuthGate};
pub use classify::{
    battery_level, days_to_expiry, days_until, health_status, stock_status, BatteryLevel,
    HealthStatus, StockStatus,
};
pub use error::{FleetError, Result};
pub use models::{
    ActivityCategory, ActivityLogEntry, Alert, AlertSeverity, AlertState, Drone, DroneStatus,
    Entity, EntityKind, EntityRef, FleetSnapshot, InventoryItem, MaintenanceRecord, Priority,
    RuleId,
};
pub use operations::{FleetEvent, MissionStats, OperationsTracker};
pub use rules::{
    evaluate, partition_valid, AlertRules, Breach, Evaluation, FleetRefs, InvalidEntity,
    Thresholds,
};
