//! Aggregation engine: fleet-wide summaries computed from a snapshot.
//!
//! Everything here is stateless. Empty input produces zero-valued metrics,
//! and entities that fail classification are skipped and counted in
//! `excluded` instead of failing the whole summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classify::{
    battery_level, check_percent, days_to_expiry, health_status, stock_status, BatteryLevel,
    HealthStatus, StockStatus,
};
use crate::models::{Drone, DroneStatus, InventoryItem, MaintenanceRecord};
use crate::rules::{AlertRules, Thresholds};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetOverview {
    pub total: usize,
    pub active: usize,
    pub charging: usize,
    pub maintenance: usize,
    pub emergency: usize,
    pub avg_battery: f64,
    /// Drones below the low-battery alert threshold
    pub low_battery: usize,
    pub excluded: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryOverview {
    pub total_items: usize,
    pub critical_count: usize,
    pub low_count: usize,
    /// Items expiring within the warning window, already expired included
    pub expiring_soon_count: usize,
    pub expired_count: usize,
    /// Sum of current_stock * unit_cost
    pub total_value: f64,
    /// Mean of current_stock / max_stock, in percent
    pub avg_stock_level_pct: f64,
    pub excluded: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceOverview {
    pub total_components: usize,
    pub avg_health: f64,
    pub critical_components: usize,
    pub warning_components: usize,
    pub overdue_count: usize,
    pub total_flight_hours: f64,
    /// Estimated cost of components in Critical or Warning health
    pub estimated_repair_cost: f64,
    pub excluded: usize,
}

/// Summary of a numeric series over a trailing window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub latest: f64,
    /// Simple moving average of the most recent `window` samples
    pub sma: f64,
    pub p50: f64,
    pub p90: f64,
    pub samples: usize,
}

pub fn fleet_overview(drones: &[Drone], rules: &AlertRules) -> FleetOverview {
    let mut overview = FleetOverview::default();
    let mut battery_sum = 0.0;

    for drone in drones {
        let level = match battery_level(drone.battery, rules) {
            Ok(level) => level,
            Err(_) => {
                overview.excluded += 1;
                continue;
            }
        };

        overview.total += 1;
        match drone.status {
            DroneStatus::Active => overview.active += 1,
            DroneStatus::Charging => overview.charging += 1,
            DroneStatus::Maintenance => overview.maintenance += 1,
            DroneStatus::Emergency => overview.emergency += 1,
        }
        battery_sum += drone.battery;
        if level != BatteryLevel::Normal {
            overview.low_battery += 1;
        }
    }

    overview.avg_battery = mean_of(battery_sum, overview.total);
    overview
}

pub fn inventory_overview(
    items: &[InventoryItem],
    now: DateTime<Utc>,
    thresholds: &Thresholds,
    rules: &AlertRules,
) -> InventoryOverview {
    let mut overview = InventoryOverview::default();
    let mut level_sum = 0.0;

    for item in items {
        let status =
            match stock_status(item.current_stock, item.min_stock, item.max_stock, thresholds) {
                Ok(status) => status,
                Err(_) => {
                    overview.excluded += 1;
                    continue;
                }
            };

        overview.total_items += 1;
        match status {
            StockStatus::Critical => overview.critical_count += 1,
            StockStatus::Low => overview.low_count += 1,
            StockStatus::Overstocked | StockStatus::Normal => {}
        }

        let days = days_to_expiry(item.expiry_date, now);
        if days <= rules.expiry_warning_days {
            overview.expiring_soon_count += 1;
        }
        if days < 0 {
            overview.expired_count += 1;
        }

        overview.total_value += item.current_stock as f64 * item.unit_cost;
        level_sum += item.current_stock as f64 / item.max_stock as f64 * 100.0;
    }

    overview.avg_stock_level_pct = mean_of(level_sum, overview.total_items);
    overview
}

pub fn maintenance_overview(
    records: &[MaintenanceRecord],
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> MaintenanceOverview {
    let mut overview = MaintenanceOverview::default();
    let mut health_sum = 0.0;

    for record in records {
        let status = match health_status(record.health_score, thresholds) {
            Ok(status) => status,
            Err(_) => {
                overview.excluded += 1;
                continue;
            }
        };

        overview.total_components += 1;
        health_sum += record.health_score;
        overview.total_flight_hours += record.flight_hours;

        match status {
            HealthStatus::Critical => overview.critical_components += 1,
            HealthStatus::Warning => overview.warning_components += 1,
            HealthStatus::Good => {}
        }
        if status != HealthStatus::Good {
            overview.estimated_repair_cost += record.estimated_cost;
        }
        if record.next_service < now {
            overview.overdue_count += 1;
        }
    }

    overview.avg_health = mean_of(health_sum, overview.total_components);
    overview
}

/// Count of inventory items per stock status. Invalid items are skipped.
pub fn stock_status_counts(
    items: &[InventoryItem],
    thresholds: &Thresholds,
) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for item in items {
        if let Ok(status) =
            stock_status(item.current_stock, item.min_stock, item.max_stock, thresholds)
        {
            *counts.entry(format!("{status:?}")).or_insert(0) += 1;
        }
    }
    counts
}

/// Count of maintenance records per health status. Invalid records are skipped.
pub fn health_status_counts(
    records: &[MaintenanceRecord],
    thresholds: &Thresholds,
) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        if let Ok(status) = health_status(record.health_score, thresholds) {
            *counts.entry(format!("{status:?}")).or_insert(0) += 1;
        }
    }
    counts
}

/// Battery histogram in quartile buckets.
/// Drone counts per 25-point battery band. Out-of-range readings are left out.
pub fn battery_distribution(drones: &[Drone]) -> BTreeMap<&'static str, usize> {
    let mut buckets = BTreeMap::from([("0-25", 0), ("25-50", 0), ("50-75", 0), ("75-100", 0)]);
    for drone in drones {
        if check_percent("battery", drone.battery).is_err() {
            continue;
        }
        let bucket = match drone.battery {
            b if b < 25.0 => "0-25",
            b if b < 50.0 => "25-50",
            b if b < 75.0 => "50-75",
            _ => "75-100",
        };
        *buckets.entry(bucket).or_insert(0) += 1;
    }
    buckets
}

/// Simple moving average at every point of `series`.
///
/// Each output value averages the most recent `window` samples up to and
/// including that point, or fewer when the series is shorter.
pub fn moving_average(series: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut averages = Vec::with_capacity(series.len());
    let mut running = 0.0;
    for (idx, value) in series.iter().enumerate() {
        running += value;
        if idx >= window {
            running -= series[idx - window];
        }
        let count = (idx + 1).min(window);
        averages.push(running / count as f64);
    }
    averages
}

/// Mean of the most recent `window` samples (all of them if fewer exist).
pub fn trailing_mean(series: &[f64], window: usize) -> f64 {
    let tail = trailing(series, window);
    mean_of(tail.iter().sum(), tail.len())
}

/// Nearest-rank percentile, `p` in [0, 100]. Empty input yields 0.
pub fn percentile(series: &[f64], p: f64) -> f64 {
    let mut sorted: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let p = p.clamp(0.0, 100.0);
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

pub fn trend(series: &[f64], window: usize) -> TrendSummary {
    let tail = trailing(series, window);
    TrendSummary {
        latest: series.last().copied().unwrap_or(0.0),
        sma: trailing_mean(series, window),
        p50: percentile(tail, 50.0),
        p90: percentile(tail, 90.0),
        samples: tail.len(),
    }
}

fn trailing(series: &[f64], window: usize) -> &[f64] {
    let window = window.max(1);
    &series[series.len().saturating_sub(window)..]
}

pub(crate) fn mean_of(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
