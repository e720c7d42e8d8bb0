//! Classification thresholds, alert rules and the breach evaluator.
//!
//! Every threshold here is a configuration default rather than a fixed
//! invariant; the server overrides them from its environment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::classify::{
    battery_level, days_to_expiry, health_status, stock_status, validate_drone, validate_item,
    validate_record, BatteryLevel, HealthStatus, StockStatus,
};
use crate::error::FleetError;
use crate::models::{
    AlertSeverity, Drone, DroneStatus, Entity, EntityRef, FleetSnapshot, InventoryItem,
    MaintenanceRecord, RuleId,
};

/// Thresholds used by the status classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Stock at or below `min_stock * low_stock_factor` is Low
    pub low_stock_factor: f64,
    /// Stock at or above `max_stock * overstock_factor` is Overstocked
    pub overstock_factor: f64,
    /// Health scores strictly below this are Critical
    pub health_critical_below: f64,
    /// Health scores strictly below this (and not Critical) are Warning
    pub health_warning_below: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_stock_factor: 1.5,
            overstock_factor: 0.8,
            health_critical_below: 70.0,
            health_warning_below: 85.0,
        }
    }
}

/// Alerting rules evaluated on every scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRules {
    /// Battery below this raises a Critical alert (emergency landing level)
    pub emergency_battery_pct: f64,
    /// Battery below this raises a Warning
    pub low_battery_pct: f64,
    /// Items expiring within this many days raise a Warning
    pub expiry_warning_days: i64,
    /// Consecutive failed validations before an Info alert is raised
    pub invalid_metric_escalation_cycles: u32,
}

impl Default for AlertRules {
    fn default() -> Self {
        Self {
            emergency_battery_pct: 15.0,
            low_battery_pct: 20.0,
            expiry_warning_days: 30,
            invalid_metric_escalation_cycles: 3,
        }
    }
}

/// A rule's alert-worthy condition met by one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Breach {
    pub source: EntityRef,
    pub rule: RuleId,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
}

/// An entity that failed validation and was kept out of the cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidEntity {
    pub source: EntityRef,
    pub error: FleetError,
}

/// Borrowed view over the three entity collections.
#[derive(Debug, Clone, Copy, Default)]
pub struct FleetRefs<'a> {
    pub drones: &'a [Drone],
    pub inventory: &'a [InventoryItem],
    pub maintenance: &'a [MaintenanceRecord],
}

impl<'a> From<&'a FleetSnapshot> for FleetRefs<'a> {
    fn from(snapshot: &'a FleetSnapshot) -> Self {
        Self {
            drones: &snapshot.drones,
            inventory: &snapshot.inventory,
            maintenance: &snapshot.maintenance,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub breaches: Vec<Breach>,
    pub invalid: Vec<InvalidEntity>,
}

/// Evaluate the fixed rule set over every entity.
///
/// Entities that cannot be classified are reported in `invalid` and
/// contribute no breaches.
pub fn evaluate(
    fleet: FleetRefs<'_>,
    thresholds: &Thresholds,
    rules: &AlertRules,
    now: DateTime<Utc>,
) -> Evaluation {
    let mut evaluation = Evaluation::default();

    for drone in fleet.drones {
        match evaluate_drone(drone, rules) {
            Ok(breaches) => evaluation.breaches.extend(breaches),
            Err(error) => evaluation.invalid.push(InvalidEntity {
                source: drone.entity_ref(),
                error,
            }),
        }
    }

    for item in fleet.inventory {
        match evaluate_item(item, thresholds, rules, now) {
            Ok(breaches) => evaluation.breaches.extend(breaches),
            Err(error) => evaluation.invalid.push(InvalidEntity {
                source: item.entity_ref(),
                error,
            }),
        }
    }

    for record in fleet.maintenance {
        match evaluate_record(record, thresholds, now) {
            Ok(breaches) => evaluation.breaches.extend(breaches),
            Err(error) => evaluation.invalid.push(InvalidEntity {
                source: record.entity_ref(),
                error,
            }),
        }
    }

    evaluation
}

fn evaluate_drone(drone: &Drone, rules: &AlertRules) -> Result<Vec<Breach>, FleetError> {
    let mut breaches = Vec::new();
    let source = drone.entity_ref();

    match battery_level(drone.battery, rules)? {
        BatteryLevel::Emergency => breaches.push(Breach {
            source: source.clone(),
            rule: RuleId::EmergencyBattery,
            severity: AlertSeverity::Critical,
            title: "Emergency battery level".to_string(),
            message: format!(
                "Drone {} at {:.0}% battery (emergency landing below {:.0}%)",
                drone.id, drone.battery, rules.emergency_battery_pct
            ),
        }),
        BatteryLevel::Low => breaches.push(Breach {
            source: source.clone(),
            rule: RuleId::LowBattery,
            severity: AlertSeverity::Warning,
            title: "Low battery".to_string(),
            message: format!(
                "Drone {} at {:.0}% battery (alert below {:.0}%)",
                drone.id, drone.battery, rules.low_battery_pct
            ),
        }),
        BatteryLevel::Normal => {}
    }

    if drone.status == DroneStatus::Emergency {
        breaches.push(Breach {
            source,
            rule: RuleId::DroneEmergency,
            severity: AlertSeverity::Critical,
            title: "Drone in emergency".to_string(),
            message: format!("Drone {} reports emergency status at {}", drone.id, drone.location),
        });
    }

    Ok(breaches)
}

fn evaluate_item(
    item: &InventoryItem,
    thresholds: &Thresholds,
    rules: &AlertRules,
    now: DateTime<Utc>,
) -> Result<Vec<Breach>, FleetError> {
    let mut breaches = Vec::new();
    let source = item.entity_ref();

    let status = stock_status(item.current_stock, item.min_stock, item.max_stock, thresholds)?;
    if status == StockStatus::Critical {
        breaches.push(Breach {
            source: source.clone(),
            rule: RuleId::CriticalStock,
            severity: AlertSeverity::Critical,
            title: "Critical stock".to_string(),
            message: format!(
                "{} ({}) at {} units, minimum {}",
                item.name, item.id, item.current_stock, item.min_stock
            ),
        });
    }

    let days = days_to_expiry(item.expiry_date, now);
    if days < 0 {
        breaches.push(Breach {
            source,
            rule: RuleId::Expired,
            severity: AlertSeverity::Critical,
            title: "Supply expired".to_string(),
            message: format!("{} ({}) expired {} day(s) ago", item.name, item.id, -days),
        });
    } else if days <= rules.expiry_warning_days {
        breaches.push(Breach {
            source,
            rule: RuleId::ExpiringSoon,
            severity: AlertSeverity::Warning,
            title: "Supply expiring soon".to_string(),
            message: format!("{} ({}) expires in {} day(s)", item.name, item.id, days),
        });
    }

    Ok(breaches)
}

fn evaluate_record(
    record: &MaintenanceRecord,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Result<Vec<Breach>, FleetError> {
    validate_record(record, thresholds)?;
    let mut breaches = Vec::new();
    let source = record.entity_ref();

    if health_status(record.health_score, thresholds)? == HealthStatus::Critical {
        breaches.push(Breach {
            source: source.clone(),
            rule: RuleId::ComponentCritical,
            severity: AlertSeverity::Critical,
            title: "Component health critical".to_string(),
            message: format!(
                "{} {} health {:.1}% (failure probability {:.0}%)",
                record.drone_id,
                record.component,
                record.health_score,
                record.failure_probability() * 100.0
            ),
        });
    }

    if record.next_service < now {
        breaches.push(Breach {
            source,
            rule: RuleId::ServiceOverdue,
            severity: AlertSeverity::Warning,
            title: "Service overdue".to_string(),
            message: format!(
                "{} {} was due for service on {}",
                record.drone_id,
                record.component,
                record.next_service.format("%Y-%m-%d")
            ),
        });
    }

    Ok(breaches)
}

/// Split a raw snapshot into its valid part and the rejected entities.
///
/// Duplicate ids within one collection keep the first occurrence; later
/// copies are rejected so the store never holds two records for an id.
pub fn partition_valid(
    snapshot: FleetSnapshot,
    thresholds: &Thresholds,
    rules: &AlertRules,
) -> (FleetSnapshot, Vec<InvalidEntity>) {
    let mut invalid = Vec::new();

    let drones = keep_valid(snapshot.drones, &mut invalid, |drone| validate_drone(drone, rules));
    let inventory = keep_valid(snapshot.inventory, &mut invalid, |item| {
        validate_item(item, thresholds)
    });
    let maintenance = keep_valid(snapshot.maintenance, &mut invalid, |record| {
        validate_record(record, thresholds)
    });

    (
        FleetSnapshot {
            drones,
            inventory,
            maintenance,
            captured_at: snapshot.captured_at,
        },
        invalid,
    )
}

fn keep_valid<T, F>(entities: Vec<T>, invalid: &mut Vec<InvalidEntity>, check: F) -> Vec<T>
where
    T: Entity,
    F: Fn(&T) -> Result<(), FleetError>,
{
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(entities.len());
    for entity in entities {
        let source = entity.entity_ref();
        if !seen.insert(source.id.clone()) {
            invalid.push(InvalidEntity {
                source,
                error: FleetError::invalid("id", "duplicate id in snapshot"),
            });
            continue;
        }
        match check(&entity) {
            Ok(()) => kept.push(entity),
            Err(error) => invalid.push(InvalidEntity { source, error }),
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn drone(id: &str, battery: f64, status: DroneStatus) -> Drone {
        Drone {
            id: id.to_string(),
            status,
            battery,
            location: "Zone Alpha".to_string(),
            current_mission: None,
            last_update: Utc::now(),
        }
    }

    fn item(id: &str, stock: i64, expires_in_days: i64, now: DateTime<Utc>) -> InventoryItem {
        InventoryItem {
            id: id.to_string(),
            name: "Epinephrine".to_string(),
            category: "Emergency Medications".to_string(),
            current_stock: stock,
            min_stock: 10,
            max_stock: 100,
            unit_cost: 25.0,
            expiry_date: now + Duration::days(expires_in_days) + Duration::hours(1),
            priority: crate::models::Priority::Critical,
            location: "Base Station".to_string(),
            temperature_req: None,
        }
    }

    fn rules_of(evaluation: &Evaluation) -> Vec<RuleId> {
        evaluation.breaches.iter().map(|b| b.rule).collect()
    }

    #[test]
    fn test_battery_rules_are_exclusive() {
        let now = Utc::now();
        let drones = vec![
            drone("LLA-001", 10.0, DroneStatus::Active),
            drone("LLA-002", 18.0, DroneStatus::Active),
            drone("LLA-003", 20.0, DroneStatus::Active),
        ];
        let evaluation = evaluate(
            FleetRefs {
                drones: &drones,
                ..Default::default()
            },
            &Thresholds::default(),
            &AlertRules::default(),
            now,
        );
        assert_eq!(
            rules_of(&evaluation),
            vec![RuleId::EmergencyBattery, RuleId::LowBattery]
        );
        assert_eq!(evaluation.breaches[0].source.id, "LLA-001");
        assert_eq!(evaluation.breaches[1].source.id, "LLA-002");
    }

    #[test]
    fn test_emergency_status_breaches() {
        let drones = vec![drone("LLA-004", 80.0, DroneStatus::Emergency)];
        let evaluation = evaluate(
            FleetRefs {
                drones: &drones,
                ..Default::default()
            },
            &Thresholds::default(),
            &AlertRules::default(),
            Utc::now(),
        );
        assert_eq!(rules_of(&evaluation), vec![RuleId::DroneEmergency]);
        assert_eq!(evaluation.breaches[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_inventory_rules() {
        let now = Utc::now();
        let inventory = vec![
            item("MED-001", 5, 200, now),
            item("MED-002", 50, 10, now),
            item("MED-003", 50, -3, now),
            item("MED-004", 50, 200, now),
        ];
        let evaluation = evaluate(
            FleetRefs {
                inventory: &inventory,
                ..Default::default()
            },
            &Thresholds::default(),
            &AlertRules::default(),
            now,
        );
        assert_eq!(
            rules_of(&evaluation),
            vec![RuleId::CriticalStock, RuleId::ExpiringSoon, RuleId::Expired]
        );
    }

    #[test]
    fn test_invalid_entities_reported_not_breached() {
        let now = Utc::now();
        let inventory = vec![item("MED-005", -1, 200, now)];
        let drones = vec![drone("LLA-005", 140.0, DroneStatus::Active)];
        let evaluation = evaluate(
            FleetRefs {
                drones: &drones,
                inventory: &inventory,
                maintenance: &[],
            },
            &Thresholds::default(),
            &AlertRules::default(),
            now,
        );
        assert!(evaluation.breaches.is_empty());
        assert_eq!(evaluation.invalid.len(), 2);
    }

    #[test]
    fn test_partition_rejects_duplicates_and_bad_metrics() {
        let now = Utc::now();
        let snapshot = FleetSnapshot {
            drones: vec![
                drone("LLA-001", 50.0, DroneStatus::Active),
                drone("LLA-001", 60.0, DroneStatus::Active),
                drone("LLA-002", f64::NAN, DroneStatus::Active),
            ],
            inventory: vec![item("MED-001", 40, 100, now)],
            maintenance: Vec::new(),
            captured_at: Some(now),
        };
        let (valid, invalid) =
            partition_valid(snapshot, &Thresholds::default(), &AlertRules::default());
        assert_eq!(valid.drones.len(), 1);
        assert_eq!(valid.drones[0].battery, 50.0);
        assert_eq!(valid.inventory.len(), 1);
        assert_eq!(invalid.len(), 2);
    }
}
