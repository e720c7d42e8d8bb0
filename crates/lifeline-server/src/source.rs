//! Telemetry sources feeding the refresh loop.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lifeline_core::{Drone, DroneStatus, FleetSnapshot, InventoryItem, MaintenanceRecord, Priority};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::{Config, SourceKind};

/// New data for zero or more collections.
///
/// A collection left as `None` keeps its stored snapshot. An update with no
/// collections at all only re-evaluates what is stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotUpdate {
    #[serde(default)]
    pub drones: Option<Vec<Drone>>,
    #[serde(default)]
    pub inventory: Option<Vec<InventoryItem>>,
    #[serde(default)]
    pub maintenance: Option<Vec<MaintenanceRecord>>,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

impl SnapshotUpdate {
    pub fn is_empty(&self) -> bool {
        self.drones.is_none() && self.inventory.is_none() && self.maintenance.is_none()
    }

    /// Overlay `newer` on top of this update, collection by collection.
    pub fn merge(&mut self, newer: SnapshotUpdate) {
        if newer.drones.is_some() {
            self.drones = newer.drones;
        }
        if newer.inventory.is_some() {
            self.inventory = newer.inventory;
        }
        if newer.maintenance.is_some() {
            self.maintenance = newer.maintenance;
        }
        if newer.captured_at.is_some() {
            self.captured_at = newer.captured_at;
        }
    }
}

impl From<FleetSnapshot> for SnapshotUpdate {
    fn from(snapshot: FleetSnapshot) -> Self {
        Self {
            drones: Some(snapshot.drones),
            inventory: Some(snapshot.inventory),
            maintenance: Some(snapshot.maintenance),
            captured_at: snapshot.captured_at,
        }
    }
}

/// Producer of fleet snapshots, polled once per refresh cycle.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> anyhow::Result<SnapshotUpdate>;
}

/// Build the source selected in config.
pub fn from_config(config: &Config, inbox: PushInbox) -> Arc<dyn TelemetrySource> {
    match config.source {
        SourceKind::Simulated => Arc::new(SimulatedSource::new(config.sim_seed)),
        SourceKind::Push => Arc::new(PushSource::new(inbox)),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Pending pushed telemetry, shared between the HTTP handler and the
/// [`PushSource`].
#[derive(Clone, Default)]
pub struct PushInbox {
    pending: Arc<Mutex<SnapshotUpdate>>,
}

impl PushInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an update. Pushes between two cycles coalesce; the newest
    /// copy of each collection wins.
    pub fn submit(&self, update: SnapshotUpdate) {
        lock(&self.pending).merge(update);
    }

    pub fn take(&self) -> SnapshotUpdate {
        std::mem::take(&mut *lock(&self.pending))
    }

    pub fn has_pending(&self) -> bool {
        !lock(&self.pending).is_empty()
    }
}

/// Source fed by `POST /v1/telemetry`.
pub struct PushSource {
    inbox: PushInbox,
}

impl PushSource {
    pub fn new(inbox: PushInbox) -> Self {
        Self { inbox }
    }
}

#[async_trait]
impl TelemetrySource for PushSource {
    fn name(&self) -> &'static str {
        "push"
    }

    async fn fetch(&self) -> anyhow::Result<SnapshotUpdate> {
        Ok(self.inbox.take())
    }
}

const DRONE_COUNT: usize = 15;
const ZONES: [&str; 5] = ["Zone Alpha", "Zone Bravo", "Zone Charlie", "Zone Delta", "Base Station"];
const COMPONENTS: [&str; 8] = [
    "Rotors",
    "Battery",
    "GPS Module",
    "Camera",
    "Communication",
    "Landing Gear",
    "Cargo Bay",
    "Flight Controller",
];
const CATALOG: [(&str, &[&str]); 6] = [
    (
        "Blood Products",
        &["O+ Blood Pack", "O- Blood Pack", "A+ Blood Pack", "A- Blood Pack", "B+ Blood Pack", "AB+ Blood Pack"],
    ),
    (
        "Emergency Medications",
        &["Epinephrine", "Morphine", "Atropine", "Naloxone", "Adenosine", "Amiodarone"],
    ),
    ("IV Fluids", &["Normal Saline", "Lactated Ringers", "D5W", "Plasma Expander"]),
    (
        "Surgical Supplies",
        &["Trauma Kit", "Suture Kit", "Emergency Airway Kit", "Chest Tube Kit"],
    ),
    (
        "Vaccines",
        &["COVID-19 Vaccine", "Hepatitis B", "Tetanus Toxoid", "Rabies Vaccine"],
    ),
    (
        "Equipment",
        &["Portable Defibrillator", "Oxygen Tank", "Blood Glucose Monitor", "Thermometer"],
    ),
];
const TEMPERATURES: [&str; 3] = ["2-8°C", "Room Temp", "-20°C"];
const PRIORITIES: [Priority; 4] = [Priority::Critical, Priority::High, Priority::Medium, Priority::Low];

/// Random-walk simulation of the fleet, its medical stock and components.
pub struct SimulatedSource {
    sim: Mutex<Simulation>,
}

struct Simulation {
    rng: StdRng,
    fleet: FleetSnapshot,
    missions: u32,
}

impl SimulatedSource {
    pub fn new(seed: Option<u64>) -> Self {
        Self::starting_at(seed, Utc::now())
    }

    pub fn starting_at(seed: Option<u64>, now: DateTime<Utc>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut sim = Simulation {
            rng,
            fleet: FleetSnapshot::default(),
            missions: 0,
        };
        sim.populate(now);
        Self {
            sim: Mutex::new(sim),
        }
    }

    /// Advance one step and return the whole fleet.
    pub fn step(&self, now: DateTime<Utc>) -> FleetSnapshot {
        let mut sim = lock(&self.sim);
        sim.advance(now);
        sim.fleet.clone()
    }
}

#[async_trait]
impl TelemetrySource for SimulatedSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn fetch(&self) -> anyhow::Result<SnapshotUpdate> {
        Ok(self.step(Utc::now()).into())
    }
}

impl Simulation {
    fn populate(&mut self, now: DateTime<Utc>) {
        let mut drones = Vec::with_capacity(DRONE_COUNT);
        for n in 1..=DRONE_COUNT {
            let roll: f64 = self.rng.random();
            let status = if roll < 0.6 {
                DroneStatus::Active
            } else if roll < 0.8 {
                DroneStatus::Charging
            } else if roll < 0.95 {
                DroneStatus::Maintenance
            } else {
                DroneStatus::Emergency
            };
            let current_mission = (status == DroneStatus::Active).then(|| self.next_mission());
            drones.push(Drone {
                id: format!("LLA-{n:03}"),
                status,
                battery: self.rng.random_range(20.0..100.0),
                location: ZONES[self.rng.random_range(0..ZONES.len())].to_string(),
                current_mission,
                last_update: now,
            });
        }

        let mut inventory = Vec::new();
        for (category, names) in CATALOG {
            for name in names {
                inventory.push(InventoryItem {
                    id: format!("MED-{:04}", inventory.len() + 1),
                    name: name.to_string(),
                    category: category.to_string(),
                    current_stock: self.rng.random_range(5..100),
                    min_stock: self.rng.random_range(10..25),
                    max_stock: self.rng.random_range(80..150),
                    unit_cost: self.rng.random_range(10.0..500.0),
                    expiry_date: now + Duration::days(self.rng.random_range(30..730)),
                    priority: PRIORITIES[self.rng.random_range(0..PRIORITIES.len())],
                    location: format!("Storage Unit {}", ["A", "B", "C", "D"][self.rng.random_range(0..4)]),
                    temperature_req: Some(
                        TEMPERATURES[self.rng.random_range(0..TEMPERATURES.len())].to_string(),
                    ),
                });
            }
        }

        let mut maintenance = Vec::with_capacity(DRONE_COUNT * COMPONENTS.len());
        for drone in &drones {
            for component in COMPONENTS {
                let last_service = now - Duration::days(self.rng.random_range(1..180));
                maintenance.push(MaintenanceRecord {
                    drone_id: drone.id.clone(),
                    component: component.to_string(),
                    health_score: self.rng.random_range(60.0..100.0),
                    last_service,
                    next_service: last_service + Duration::days(self.rng.random_range(30..90)),
                    flight_hours: self.rng.random_range(0.0..500.0),
                    cycles: self.rng.random_range(0..1000),
                    estimated_cost: self.rng.random_range(100.0..2000.0),
                });
            }
        }

        self.fleet = FleetSnapshot {
            drones,
            inventory,
            maintenance,
            captured_at: Some(now),
        };
    }

    fn next_mission(&mut self) -> String {
        self.missions += 1;
        format!("Medical Delivery #{:04}", self.missions)
    }

    fn advance(&mut self, now: DateTime<Utc>) {
        let mut drones = std::mem::take(&mut self.fleet.drones);
        for drone in &mut drones {
            self.advance_drone(drone);
            drone.last_update = now;
        }
        self.fleet.drones = drones;

        for item in &mut self.fleet.inventory {
            let used = self.rng.random_range(0..3);
            item.current_stock = (item.current_stock - used).max(0);
            if item.current_stock <= item.min_stock && self.rng.random_bool(0.3) {
                item.current_stock = self.rng.random_range(item.min_stock * 2..item.max_stock);
            }
        }

        for record in &mut self.fleet.maintenance {
            record.health_score = (record.health_score - self.rng.random_range(0.0..0.3)).max(0.0);
            record.flight_hours += self.rng.random_range(0.0..0.5);
            if record.health_score < 65.0 && self.rng.random_bool(0.2) {
                record.health_score = self.rng.random_range(90.0..100.0);
                record.last_service = now;
                record.next_service = now + Duration::days(self.rng.random_range(30..90));
                record.cycles += 1;
            }
        }

        self.fleet.captured_at = Some(now);
    }

    fn advance_drone(&mut self, drone: &mut Drone) {
        match drone.status {
            DroneStatus::Active => {
                drone.battery -= self.rng.random_range(0.5..4.0);
                if drone.battery < 15.0 && self.rng.random_bool(0.1) {
                    drone.status = DroneStatus::Emergency;
                } else if drone.battery < 25.0 && self.rng.random_bool(0.5) {
                    drone.status = DroneStatus::Charging;
                    drone.current_mission = None;
                }
            }
            DroneStatus::Charging => {
                drone.battery += self.rng.random_range(3.0..8.0);
                if drone.battery >= 95.0 {
                    drone.status = DroneStatus::Active;
                    drone.current_mission = Some(self.next_mission());
                }
            }
            DroneStatus::Maintenance => {
                if self.rng.random_bool(0.05) {
                    drone.status = DroneStatus::Charging;
                }
            }
            DroneStatus::Emergency => {
                if self.rng.random_bool(0.3) {
                    drone.status = DroneStatus::Maintenance;
                    drone.current_mission = None;
                }
            }
        }
        drone.battery = drone.battery.clamp(0.0, 100.0);
    }
}
