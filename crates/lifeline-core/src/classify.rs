//! Status classifier: pure threshold functions from raw metrics to
//! operational categories.
//!
//! All functions are deterministic and side-effect free. Malformed input is
//! reported as [`FleetError::InvalidMetric`]; nothing is silently clamped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};
use crate::models::{Drone, InventoryItem, MaintenanceRecord};
use crate::rules::{AlertRules, Thresholds};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockStatus {
    Critical,
    Low,
    Overstocked,
    Normal,
}

impl StockStatus {
    /// Shortage severity: grows as stock runs out.
    ///
    /// Overstocked sits below Normal because it only occurs at the top of the
    /// stock range.
    pub fn shortage_rank(self) -> u8 {
        match self {
            StockStatus::Overstocked => 0,
            StockStatus::Normal => 1,
            StockStatus::Low => 2,
            StockStatus::Critical => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Critical,
    Warning,
    Good,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatteryLevel {
    Emergency,
    Low,
    Normal,
}

/// Classify a stock level.
///
/// Checked in severity order, so an amount that satisfies several conditions
/// gets the most severe one.
pub fn stock_status(
    current_stock: i64,
    min_stock: i64,
    max_stock: i64,
    thresholds: &Thresholds,
) -> Result<StockStatus> {
    if current_stock < 0 {
        return Err(FleetError::invalid(
            "current_stock",
            format!("{current_stock} is negative"),
        ));
    }
    if min_stock < 0 {
        return Err(FleetError::invalid(
            "min_stock",
            format!("{min_stock} is negative"),
        ));
    }
    if min_stock >= max_stock {
        return Err(FleetError::invalid(
            "max_stock",
            format!("max_stock {max_stock} must exceed min_stock {min_stock}"),
        ));
    }

    let current = current_stock as f64;
    let status = if current_stock <= min_stock {
        StockStatus::Critical
    } else if current <= min_stock as f64 * thresholds.low_stock_factor {
        StockStatus::Low
    } else if current >= max_stock as f64 * thresholds.overstock_factor {
        StockStatus::Overstocked
    } else {
        StockStatus::Normal
    };
    Ok(status)
}

/// Classify a component health score.
pub fn health_status(health_score: f64, thresholds: &Thresholds) -> Result<HealthStatus> {
    check_percent("health_score", health_score)?;
    let status = if health_score < thresholds.health_critical_below {
        HealthStatus::Critical
    } else if health_score < thresholds.health_warning_below {
        HealthStatus::Warning
    } else {
        HealthStatus::Good
    };
    Ok(status)
}

/// Classify a battery charge against the alerting thresholds.
pub fn battery_level(battery: f64, rules: &AlertRules) -> Result<BatteryLevel> {
    check_percent("battery", battery)?;
    let level = if battery < rules.emergency_battery_pct {
        BatteryLevel::Emergency
    } else if battery < rules.low_battery_pct {
        BatteryLevel::Low
    } else {
        BatteryLevel::Normal
    };
    Ok(level)
}

/// Whole days from `now` until `expiry_date`, rounded toward negative
/// infinity. Already expired items yield negative values.
pub fn days_to_expiry(expiry_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    whole_days(expiry_date, now)
}

/// Whole days until a scheduled service, same convention as
/// [`days_to_expiry`].
pub fn days_until(next_service: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    whole_days(next_service, now)
}

fn whole_days(target: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (target - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

pub(crate) fn check_percent(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(FleetError::invalid(
            field,
            format!("{value} is outside 0-100"),
        ))
    }
}

pub fn validate_drone(drone: &Drone, rules: &AlertRules) -> Result<()> {
    if drone.id.trim().is_empty() {
        return Err(FleetError::invalid("id", "empty drone id"));
    }
    battery_level(drone.battery, rules).map(|_| ())
}

pub fn validate_item(item: &InventoryItem, thresholds: &Thresholds) -> Result<()> {
    if item.id.trim().is_empty() {
        return Err(FleetError::invalid("id", "empty item id"));
    }
    if !item.unit_cost.is_finite() || item.unit_cost < 0.0 {
        return Err(FleetError::invalid(
            "unit_cost",
            format!("{} is not a valid cost", item.unit_cost),
        ));
    }
    stock_status(item.current_stock, item.min_stock, item.max_stock, thresholds).map(|_| ())
}

pub fn validate_record(record: &MaintenanceRecord, thresholds: &Thresholds) -> Result<()> {
    if record.drone_id.trim().is_empty() || record.component.trim().is_empty() {
        return Err(FleetError::invalid("id", "empty drone id or component"));
    }
    if record.next_service <= record.last_service {
        return Err(FleetError::invalid(
            "next_service",
            "next service must be after last service",
        ));
    }
    if !record.flight_hours.is_finite() || record.flight_hours < 0.0 {
        return Err(FleetError::invalid(
            "flight_hours",
            format!("{} is not a valid flight time", record.flight_hours),
        ));
    }
    health_status(record.health_score, thresholds).map(|_| ())
}
