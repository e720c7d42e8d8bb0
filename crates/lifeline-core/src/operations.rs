//! Operational events derived from consecutive fleet snapshots.
//!
//! The tracker remembers each drone's status and mission and each supply
//! line's stock level. The first snapshot of a collection only sets that
//! baseline. Later snapshots are compared against it, and the differences
//! become activity entries and mission statistics. Entities missing from a
//! snapshot keep their last known state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::aggregate::mean_of;
use crate::models::{ActivityCategory, Drone, DroneStatus, EntityKind, EntityRef, InventoryItem};

/// Deployments and completions remembered for statistics.
const HISTORY_CAP: usize = 10_000;

/// One operational change seen between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetEvent {
    pub category: ActivityCategory,
    pub source: EntityRef,
    pub description: String,
}

/// Mission figures over a trailing window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionStats {
    /// Drones currently assigned a mission
    pub active_missions: usize,
    pub completed: usize,
    pub deployed: usize,
    /// Mean duration of completed missions whose start was observed
    pub avg_mission_minutes: f64,
    pub window_hours: i64,
}

#[derive(Debug, Clone)]
struct DroneTrack {
    status: DroneStatus,
    mission: Option<String>,
    /// `None` when the mission was already running at baseline
    mission_started: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
struct Completion {
    at: DateTime<Utc>,
    minutes: Option<f64>,
}

#[derive(Debug, Default)]
pub struct OperationsTracker {
    drones: Option<HashMap<String, DroneTrack>>,
    stock: Option<HashMap<String, i64>>,
    deployments: VecDeque<DateTime<Utc>>,
    completions: VecDeque<Completion>,
}

impl OperationsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare a drone snapshot with the previous one.
    pub fn observe_drones(&mut self, drones: &[Drone], now: DateTime<Utc>) -> Vec<FleetEvent> {
        if self.drones.is_none() {
            let baseline = drones
                .iter()
                .map(|drone| {
                    let track = DroneTrack {
                        status: drone.status,
                        mission: drone.current_mission.clone(),
                        mission_started: None,
                    };
                    (drone.id.clone(), track)
                })
                .collect();
            self.drones = Some(baseline);
            return Vec::new();
        }
        let tracked = self.drones.get_or_insert_with(HashMap::new);

        let mut events = Vec::new();
        let mut deployed = Vec::new();
        let mut completed = Vec::new();

        for drone in drones {
            let source = EntityRef::new(EntityKind::Drone, drone.id.clone());
            let track = tracked.entry(drone.id.clone()).or_insert_with(|| DroneTrack {
                status: drone.status,
                mission: None,
                mission_started: None,
            });

            if track.mission != drone.current_mission {
                if let Some(finished) = track.mission.take() {
                    let minutes = track
                        .mission_started
                        .map(|started| (now - started).num_seconds() as f64 / 60.0);
                    completed.push(Completion { at: now, minutes });
                    events.push(FleetEvent {
                        category: ActivityCategory::MissionCompleted,
                        source: source.clone(),
                        description: format!("{} completed mission {}", drone.id, finished),
                    });
                }
                if let Some(mission) = &drone.current_mission {
                    deployed.push(now);
                    events.push(FleetEvent {
                        category: ActivityCategory::DroneDeployed,
                        source: source.clone(),
                        description: format!(
                            "{} deployed on mission {} from {}",
                            drone.id, mission, drone.location
                        ),
                    });
                }
                track.mission = drone.current_mission.clone();
                track.mission_started = track.mission.as_ref().map(|_| now);
            }

            if drone.status == DroneStatus::Maintenance && track.status != DroneStatus::Maintenance
            {
                events.push(FleetEvent {
                    category: ActivityCategory::MaintenanceStarted,
                    source,
                    description: format!("{} taken out of service for maintenance", drone.id),
                });
            }
            track.status = drone.status;
        }

        for at in deployed {
            push_bounded(&mut self.deployments, at);
        }
        for completion in completed {
            push_bounded(&mut self.completions, completion);
        }
        events
    }

    /// Compare an inventory snapshot with the previous one.
    pub fn observe_inventory(&mut self, items: &[InventoryItem]) -> Vec<FleetEvent> {
        if self.stock.is_none() {
            self.stock = Some(
                items
                    .iter()
                    .map(|item| (item.id.clone(), item.current_stock))
                    .collect(),
            );
            return Vec::new();
        }
        let stock = self.stock.get_or_insert_with(HashMap::new);

        let mut events = Vec::new();
        for item in items {
            let previous = stock.insert(item.id.clone(), item.current_stock);
            if let Some(previous) = previous.filter(|p| item.current_stock > *p) {
                events.push(FleetEvent {
                    category: ActivityCategory::SupplyRestocked,
                    source: EntityRef::new(EntityKind::Inventory, item.id.clone()),
                    description: format!(
                        "{} restocked at {}: {} -> {} units",
                        item.name, item.location, previous, item.current_stock
                    ),
                });
            }
        }
        events
    }

    /// Mission figures for the `window` ending at `now`.
    pub fn summary(&self, now: DateTime<Utc>, window: Duration) -> MissionStats {
        let since = now - window;
        let active_missions = self
            .drones
            .iter()
            .flat_map(|tracked| tracked.values())
            .filter(|track| track.mission.is_some())
            .count();

        let recent: Vec<&Completion> =
            self.completions.iter().filter(|c| c.at > since).collect();
        let timed: Vec<f64> = recent.iter().filter_map(|c| c.minutes).collect();

        MissionStats {
            active_missions,
            completed: recent.len(),
            deployed: self.deployments.iter().filter(|at| **at > since).count(),
            avg_mission_minutes: mean_of(timed.iter().sum(), timed.len()),
            window_hours: window.num_hours(),
        }
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T) {
    if queue.len() == HISTORY_CAP {
        queue.pop_front();
    }
    queue.push_back(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    fn drone(id: &str, status: DroneStatus, mission: Option<&str>) -> Drone {
        Drone {
            id: id.to_string(),
            status,
            battery: 70.0,
            location: "Zone Bravo".to_string(),
            current_mission: mission.map(str::to_string),
            last_update: Utc::now(),
        }
    }

    fn item(id: &str, stock: i64) -> InventoryItem {
        InventoryItem {
            id: id.to_string(),
            name: "Saline".to_string(),
            category: "IV Fluids".to_string(),
            current_stock: stock,
            min_stock: 10,
            max_stock: 100,
            unit_cost: 4.0,
            expiry_date: Utc::now() + Duration::days(300),
            priority: Priority::Medium,
            location: "Storage Unit C".to_string(),
            temperature_req: None,
        }
    }

    fn categories(events: &[FleetEvent]) -> Vec<ActivityCategory> {
        events.iter().map(|e| e.category).collect()
    }

    #[test]
    fn test_first_snapshot_is_baseline_only() {
        let mut tracker = OperationsTracker::new();
        let now = Utc::now();
        let events = tracker.observe_drones(
            &[
                drone("LLA-001", DroneStatus::Active, Some("MSN-1001")),
                drone("LLA-002", DroneStatus::Maintenance, None),
            ],
            now,
        );
        assert!(events.is_empty());
        assert!(tracker.observe_inventory(&[item("MED-0001", 20)]).is_empty());

        let stats = tracker.summary(now, Duration::hours(24));
        assert_eq!(stats.active_missions, 1);
        assert_eq!(stats.deployed, 0);
    }

    #[test]
    fn test_deploy_then_complete_records_duration() {
        let mut tracker = OperationsTracker::new();
        let t0 = Utc::now();
        tracker.observe_drones(&[drone("LLA-003", DroneStatus::Charging, None)], t0);

        let t1 = t0 + Duration::minutes(2);
        let events = tracker.observe_drones(
            &[drone("LLA-003", DroneStatus::Active, Some("MSN-2040"))],
            t1,
        );
        assert_eq!(categories(&events), vec![ActivityCategory::DroneDeployed]);
        assert!(events[0].description.contains("MSN-2040"));

        let t2 = t1 + Duration::minutes(18);
        let events = tracker.observe_drones(&[drone("LLA-003", DroneStatus::Charging, None)], t2);
        assert_eq!(categories(&events), vec![ActivityCategory::MissionCompleted]);
        assert_eq!(events[0].source, EntityRef::new(EntityKind::Drone, "LLA-003"));

        let stats = tracker.summary(t2, Duration::hours(24));
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.deployed, 1);
        assert_eq!(stats.active_missions, 0);
        assert!((stats.avg_mission_minutes - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_reassignment_completes_and_deploys() {
        let mut tracker = OperationsTracker::new();
        let t0 = Utc::now();
        tracker.observe_drones(&[drone("LLA-004", DroneStatus::Active, Some("MSN-1"))], t0);
        let events = tracker.observe_drones(
            &[drone("LLA-004", DroneStatus::Active, Some("MSN-2"))],
            t0 + Duration::minutes(5),
        );
        assert_eq!(
            categories(&events),
            vec![ActivityCategory::MissionCompleted, ActivityCategory::DroneDeployed]
        );

        // started before baseline, so it has no duration
        let stats = tracker.summary(t0 + Duration::minutes(5), Duration::hours(1));
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.avg_mission_minutes, 0.0);
    }

    #[test]
    fn test_maintenance_and_absent_drones() {
        let mut tracker = OperationsTracker::new();
        let t0 = Utc::now();
        tracker.observe_drones(
            &[
                drone("LLA-005", DroneStatus::Active, None),
                drone("LLA-006", DroneStatus::Active, Some("MSN-7")),
            ],
            t0,
        );

        // LLA-006 missing from this snapshot keeps its mission
        let events = tracker.observe_drones(&[drone("LLA-005", DroneStatus::Maintenance, None)], t0);
        assert_eq!(categories(&events), vec![ActivityCategory::MaintenanceStarted]);
        let events = tracker.observe_drones(&[drone("LLA-005", DroneStatus::Maintenance, None)], t0);
        assert!(events.is_empty());
        assert_eq!(tracker.summary(t0, Duration::hours(1)).active_missions, 1);
    }

    #[test]
    fn test_restock_is_reported_but_consumption_is_not() {
        let mut tracker = OperationsTracker::new();
        tracker.observe_inventory(&[item("MED-0001", 20), item("MED-0002", 50)]);
        let events = tracker.observe_inventory(&[item("MED-0001", 45), item("MED-0002", 30)]);
        assert_eq!(categories(&events), vec![ActivityCategory::SupplyRestocked]);
        assert!(events[0].description.contains("20 -> 45"));
    }

    #[test]
    fn test_summary_window_excludes_old_completions() {
        let mut tracker = OperationsTracker::new();
        let t0 = Utc::now() - Duration::hours(30);
        tracker.observe_drones(&[drone("LLA-007", DroneStatus::Active, None)], t0);
        tracker.observe_drones(&[drone("LLA-007", DroneStatus::Active, Some("MSN-9"))], t0);
        tracker.observe_drones(
            &[drone("LLA-007", DroneStatus::Active, None)],
            t0 + Duration::minutes(12),
        );

        let stats = tracker.summary(Utc::now(), Duration::hours(24));
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.deployed, 0);
        assert_eq!(stats.window_hours, 24);
    }
}
