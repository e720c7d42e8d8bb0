//! Read models: stored entities with their derived status.

use chrono::{DateTime, Utc};
use lifeline_core::{
    battery_level, days_to_expiry, days_until, health_status, stock_status, AlertRules,
    BatteryLevel, Drone, HealthStatus, InventoryItem, MaintenanceRecord, StockStatus, Thresholds,
};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DroneView {
    #[serde(flatten)]
    pub drone: Drone,
    pub battery_level: BatteryLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryView {
    #[serde(flatten)]
    pub item: InventoryItem,
    pub stock_status: StockStatus,
    pub days_to_expiry: i64,
    pub total_value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceView {
    #[serde(flatten)]
    pub record: MaintenanceRecord,
    pub health_status: HealthStatus,
    pub failure_probability: f64,
    pub days_until_service: i64,
}

impl DroneView {
    pub fn derive(drone: Drone, rules: &AlertRules) -> Option<Self> {
        let battery_level = battery_level(drone.battery, rules).ok()?;
        Some(Self {
            drone,
            battery_level,
        })
    }
}

impl InventoryView {
    pub fn derive(item: InventoryItem, thresholds: &Thresholds, now: DateTime<Utc>) -> Option<Self> {
        let stock_status =
            stock_status(item.current_stock, item.min_stock, item.max_stock, thresholds).ok()?;
        Some(Self {
            stock_status,
            days_to_expiry: days_to_expiry(item.expiry_date, now),
            total_value: item.current_stock as f64 * item.unit_cost,
            item,
        })
    }
}

impl MaintenanceView {
    pub fn derive(
        record: MaintenanceRecord,
        thresholds: &Thresholds,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let health_status = health_status(record.health_score, thresholds).ok()?;
        Some(Self {
            health_status,
            failure_probability: record.failure_probability(),
            days_until_service: days_until(record.next_service, now),
            record,
        })
    }
}
