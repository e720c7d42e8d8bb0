//! End-to-end scan cycles: snapshot -> partition -> evaluate -> alert manager.

use chrono::{DateTime, Duration, Utc};
use lifeline_core::{
    evaluate, partition_valid, AlertManager, AlertRules, AlertSeverity, AlertState, Drone,
    DroneStatus, FleetRefs, FleetSnapshot, InventoryItem, MaintenanceRecord, Priority, RuleId,
    Thresholds,
};

fn drone(id: &str, battery: f64, status: DroneStatus, at: DateTime<Utc>) -> Drone {
    Drone {
        id: id.to_string(),
        status,
        battery,
        location: "Zone Bravo".to_string(),
        current_mission: Some("Blood delivery".to_string()),
        last_update: at,
    }
}

fn item(id: &str, stock: i64, expiry: DateTime<Utc>) -> InventoryItem {
    InventoryItem {
        id: id.to_string(),
        name: "O-Negative Blood".to_string(),
        category: "Blood Products".to_string(),
        current_stock: stock,
        min_stock: 10,
        max_stock: 60,
        unit_cost: 220.0,
        expiry_date: expiry,
        priority: Priority::Critical,
        location: "Cold Storage A".to_string(),
        temperature_req: Some("2-6°C".to_string()),
    }
}

fn record(drone_id: &str, health: f64, now: DateTime<Utc>) -> MaintenanceRecord {
    MaintenanceRecord {
        drone_id: drone_id.to_string(),
        component: "GPS Module".to_string(),
        health_score: health,
        last_service: now - Duration::days(40),
        next_service: now + Duration::days(20),
        flight_hours: 310.5,
        cycles: 120,
        estimated_cost: 450.0,
    }
}

struct Cycle {
    manager: AlertManager,
    thresholds: Thresholds,
    rules: AlertRules,
}

impl Cycle {
    fn new() -> Self {
        let rules = AlertRules::default();
        Self {
            manager: AlertManager::new(rules.invalid_metric_escalation_cycles),
            thresholds: Thresholds::default(),
            rules,
        }
    }

    fn run(&mut self, snapshot: FleetSnapshot, now: DateTime<Utc>) -> lifeline_core::ScanReport {
        let (valid, invalid) = partition_valid(snapshot, &self.thresholds, &self.rules);
        let evaluation = evaluate(FleetRefs::from(&valid), &self.thresholds, &self.rules, now);
        let mut all_invalid = invalid;
        all_invalid.extend(evaluation.invalid);
        self.manager.scan(evaluation.breaches, &all_invalid, now)
    }
}

#[test]
fn test_full_fleet_cycle() {
    let now = Utc::now();
    let mut cycle = Cycle::new();

    let snapshot = FleetSnapshot {
        drones: vec![
            drone("LLA-001", 92.0, DroneStatus::Active, now),
            drone("LLA-002", 12.0, DroneStatus::Active, now),
            drone("LLA-003", 55.0, DroneStatus::Emergency, now),
        ],
        inventory: vec![
            item("BLD-001", 8, now + Duration::days(90)),
            item("BLD-002", 30, now + Duration::days(12)),
        ],
        maintenance: vec![record("LLA-001", 62.0, now), record("LLA-002", 95.0, now)],
        captured_at: Some(now),
    };

    let report = cycle.run(snapshot.clone(), now);
    assert_eq!(report.created.len(), 5);

    let mut rules: Vec<RuleId> = cycle
        .manager
        .active_alerts()
        .iter()
        .map(|a| a.rule)
        .collect();
    rules.sort();
    assert_eq!(
        rules,
        vec![
            RuleId::EmergencyBattery,
            RuleId::DroneEmergency,
            RuleId::CriticalStock,
            RuleId::ExpiringSoon,
            RuleId::ComponentCritical,
        ]
    );

    let severities: Vec<AlertSeverity> = cycle
        .manager
        .active_alerts()
        .iter()
        .map(|a| a.severity)
        .collect();
    assert_eq!(severities.last(), Some(&AlertSeverity::Warning));

    // Unchanged snapshot: idempotent
    let again = cycle.run(snapshot, now + Duration::seconds(30));
    assert!(again.created.is_empty());
    assert!(again.resolved.is_empty());
    assert_eq!(again.unchanged, 5);
}

#[test]
fn test_recovery_resolves_and_relapse_reopens() {
    let now = Utc::now();
    let mut cycle = Cycle::new();
    let low = FleetSnapshot {
        drones: vec![drone("LLA-004", 18.0, DroneStatus::Active, now)],
        ..Default::default()
    };
    let charged = FleetSnapshot {
        drones: vec![drone("LLA-004", 100.0, DroneStatus::Charging, now)],
        ..Default::default()
    };

    let first = cycle.run(low.clone(), now).created;
    assert_eq!(first.len(), 1);

    let resolved = cycle.run(charged, now + Duration::seconds(30)).resolved;
    assert_eq!(resolved, first);

    let relapse = cycle.run(low, now + Duration::seconds(60)).created;
    assert_eq!(relapse.len(), 1);
    assert_ne!(relapse, first);

    let history = cycle.manager.all_alerts();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].state, AlertState::Resolved);
    assert_eq!(history[1].state, AlertState::Active);
}

#[test]
fn test_persistently_invalid_entity_escalates() {
    let now = Utc::now();
    let mut cycle = Cycle::new();
    let broken = FleetSnapshot {
        inventory: vec![item("BLD-009", -4, now + Duration::days(90))],
        ..Default::default()
    };

    for step in 0..2 {
        let report = cycle.run(broken.clone(), now + Duration::seconds(step * 30));
        assert!(report.created.is_empty());
    }
    let third = cycle.run(broken, now + Duration::seconds(60));
    assert_eq!(third.created.len(), 1);

    let alert = cycle.manager.get(&third.created[0]).cloned().unwrap();
    assert_eq!(alert.rule, RuleId::InvalidMetric);
    assert_eq!(alert.severity, AlertSeverity::Info);
    assert_eq!(alert.source.id, "BLD-009");
}

#[test]
fn test_activity_log_tracks_eight_transitions() {
    let now = Utc::now();
    let mut cycle = Cycle::new();

    for step in 0..4i64 {
        let at = now + Duration::minutes(step);
        let battery = 10.0;
        let id = format!("LLA-10{step}");
        cycle.run(
            FleetSnapshot {
                drones: vec![drone(&id, battery, DroneStatus::Active, at)],
                ..Default::default()
            },
            at,
        );
        cycle.run(FleetSnapshot::default(), at + Duration::seconds(10));
    }

    assert_eq!(cycle.manager.activity_log().len(), 8);
    let recent = cycle.manager.recent_activities(5);
    assert_eq!(recent.len(), 5);
    assert_eq!(recent[0], cycle.manager.activity_log()[7]);
    assert_eq!(recent[4], cycle.manager.activity_log()[3]);
}
