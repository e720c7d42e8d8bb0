//! Application state shared by the refresh loop and the HTTP API.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use lifeline_core::{
    battery_distribution, evaluate, fleet_overview, health_status_counts, inventory_overview,
    maintenance_overview, partition_valid, stock_status_counts,
    ActivityLogEntry, Alert, AlertManager, AlertRules, AuthGate, Drone, EntityKind, FleetError,
    FleetOverview, FleetRefs, FleetSnapshot, InvalidEntity, InventoryItem, InventoryOverview,
    MaintenanceOverview, MaintenanceRecord, MissionStats, OperationsTracker, Thresholds,
};
use serde::Serialize;

use crate::config::Config;
use crate::source::{PushInbox, SnapshotUpdate};
use crate::state::history::{MetricHistory, MetricSample, TrendReport};
use crate::state::store::TelemetryStore;
use crate::state::views::{DroneView, InventoryView, MaintenanceView};

/// Activity entries published alongside the open alerts.
const BOARD_RECENT: usize = 100;

/// Lock-free copy of the alert manager's queryable state, republished after
/// every change.
#[derive(Debug, Clone, Default)]
pub struct AlertBoard {
    pub active: Vec<Alert>,
    /// Newest first
    pub recent: Vec<ActivityLogEntry>,
    pub log_len: usize,
    pub total_alerts: usize,
}

/// What one refresh cycle did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub created: Vec<String>,
    pub resolved: Vec<String>,
    pub rejected: usize,
    pub stale: usize,
    pub escalated: usize,
    /// Operational entries added to the activity log
    pub events: usize,
    pub open_alerts: usize,
}

/// Exclusive right to run one refresh cycle. Released on drop.
pub struct ScanPermit<'a> {
    _guard: tokio::sync::MutexGuard<'a, ()>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub source: &'static str,
    pub started_at: DateTime<Utc>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
    pub cycles_deferred: u64,
    pub scan_conflicts: u64,
    pub entities_rejected: u64,
    pub stale_records: u64,
    pub drones_version: u64,
    pub inventory_version: u64,
    pub maintenance_version: u64,
    pub open_alerts: usize,
    pub total_alerts: usize,
}

#[derive(Debug, Default)]
struct Counters {
    cycles_completed: AtomicU64,
    cycles_deferred: AtomicU64,
    scan_conflicts: AtomicU64,
    entities_rejected: AtomicU64,
    stale_records: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Application state. Built once in `main` and shared as `Arc<AppState>`.
pub struct AppState {
    config: Config,
    drones: TelemetryStore<Drone>,
    inventory: TelemetryStore<InventoryItem>,
    maintenance: TelemetryStore<MaintenanceRecord>,
    alerts: Mutex<AlertManager>,
    board: ArcSwap<AlertBoard>,
    /// Single-writer guard for refresh cycles
    scan_guard: tokio::sync::Mutex<()>,
    /// Entities rejected the last time their collection was refreshed
    rejected: Mutex<HashMap<EntityKind, Vec<InvalidEntity>>>,
    history: Mutex<MetricHistory>,
    operations: Mutex<OperationsTracker>,
    auth: AuthGate,
    inbox: PushInbox,
    counters: Counters,
    last_cycle_at: Mutex<Option<DateTime<Utc>>>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, FleetError> {
        let mut auth = AuthGate::new()?;
        for (username, phc) in &config.users {
            auth = auth.with_user(username.clone(), phc.clone())?;
        }
        Ok(Self {
            drones: TelemetryStore::new(),
            inventory: TelemetryStore::new(),
            maintenance: TelemetryStore::new(),
            alerts: Mutex::new(AlertManager::new(
                config.rules.invalid_metric_escalation_cycles,
            )),
            board: ArcSwap::from_pointee(AlertBoard::default()),
            scan_guard: tokio::sync::Mutex::new(()),
            rejected: Mutex::new(HashMap::new()),
            history: Mutex::new(MetricHistory::new(config.history_len)),
            operations: Mutex::new(OperationsTracker::new()),
            auth,
            inbox: PushInbox::new(),
            counters: Counters::default(),
            last_cycle_at: Mutex::new(None),
            started_at: Utc::now(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.config.thresholds
    }

    pub fn rules(&self) -> &AlertRules {
        &self.config.rules
    }

    pub fn push_inbox(&self) -> PushInbox {
        self.inbox.clone()
    }

    // === Refresh cycle ===

    /// Claim the scan guard for one cycle.
    ///
    /// Fails with [`FleetError::ScanConflict`] when another cycle holds it.
    pub fn try_begin_scan(&self) -> Result<ScanPermit<'_>, FleetError> {
        match self.scan_guard.try_lock() {
            Ok(guard) => Ok(ScanPermit { _guard: guard }),
            Err(_) => {
                self.counters.scan_conflicts.fetch_add(1, Ordering::Relaxed);
                Err(FleetError::ScanConflict)
            }
        }
    }

    /// Run one cycle: validate and store the update, then scan for alerts.
    ///
    /// Fails with [`FleetError::ScanConflict`] when another cycle holds the
    /// scan guard. Nothing is applied in that case.
    pub fn apply_update(
        &self,
        update: SnapshotUpdate,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, FleetError> {
        let permit = self.try_begin_scan()?;
        Ok(self.apply_with(permit, update, now))
    }

    /// Apply an update under an already claimed scan guard.
    pub fn apply_with(
        &self,
        _permit: ScanPermit<'_>,
        update: SnapshotUpdate,
        now: DateTime<Utc>,
    ) -> CycleReport {
        let SnapshotUpdate {
            drones,
            inventory,
            maintenance,
            captured_at,
        } = update;
        let present = [
            (EntityKind::Drone, drones.is_some()),
            (EntityKind::Inventory, inventory.is_some()),
            (EntityKind::Maintenance, maintenance.is_some()),
        ];
        let raw = FleetSnapshot {
            drones: drones.unwrap_or_default(),
            inventory: inventory.unwrap_or_default(),
            maintenance: maintenance.unwrap_or_default(),
            captured_at,
        };

        let (valid, invalid) = partition_valid(raw, self.thresholds(), self.rules());
        for bad in &invalid {
            tracing::warn!("Rejected {}: {}", bad.source, bad.error);
        }
        let mut report = CycleReport {
            rejected: invalid.len(),
            ..Default::default()
        };

        let held = |kind: EntityKind| -> HashSet<String> {
            invalid
                .iter()
                .filter(|e| e.source.kind == kind)
                .map(|e| e.source.id.clone())
                .collect()
        };
        let mut stale = 0;
        if present[0].1 {
            stale += self
                .drones
                .replace_snapshot_retaining(valid.drones, &held(EntityKind::Drone), now)
                .stale;
        }
        if present[1].1 {
            stale += self
                .inventory
                .replace_snapshot_retaining(valid.inventory, &held(EntityKind::Inventory), now)
                .stale;
        }
        if present[2].1 {
            stale += self
                .maintenance
                .replace_snapshot_retaining(valid.maintenance, &held(EntityKind::Maintenance), now)
                .stale;
        }
        if stale > 0 {
            tracing::debug!("Skipped {} record(s) older than stored telemetry", stale);
        }
        report.stale = stale;

        let excluded = {
            let mut rejected = lock(&self.rejected);
            for (kind, refreshed) in present {
                if refreshed {
                    rejected.insert(
                        kind,
                        invalid.iter().filter(|e| e.source.kind == kind).cloned().collect(),
                    );
                }
            }
            rejected.values().flatten().cloned().collect::<Vec<_>>()
        };

        let drones = self.drones.snapshot();
        let inventory = self.inventory.snapshot();
        let maintenance = self.maintenance.snapshot();
        let fleet = FleetRefs {
            drones: &drones.items,
            inventory: &inventory.items,
            maintenance: &maintenance.items,
        };
        let mut evaluation = evaluate(fleet, self.thresholds(), self.rules(), now);
        evaluation.invalid.extend(excluded);

        let events = {
            let mut operations = lock(&self.operations);
            let mut events = Vec::new();
            if present[0].1 {
                events.extend(operations.observe_drones(fleet.drones, now));
            }
            if present[1].1 {
                events.extend(operations.observe_inventory(fleet.inventory));
            }
            events
        };
        report.events = events.len();

        {
            let mut alerts = lock(&self.alerts);
            for event in events {
                alerts.record_activity(now, event.category, event.description, event.source);
            }
            let scan = alerts.scan(evaluation.breaches, &evaluation.invalid, now);
            self.publish_board(&alerts);
            report.created = scan.created;
            report.resolved = scan.resolved;
            report.escalated = scan.escalated;
            report.open_alerts = alerts.open_count();
        }

        lock(&self.history).record(MetricSample {
            at: now,
            avg_battery: fleet_overview(fleet.drones, self.rules()).avg_battery,
            avg_health: maintenance_overview(fleet.maintenance, now, self.thresholds()).avg_health,
            stock_value: inventory_overview(fleet.inventory, now, self.thresholds(), self.rules())
                .total_value,
            open_alerts: report.open_alerts,
        });

        self.counters.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.counters
            .entities_rejected
            .fetch_add(report.rejected as u64, Ordering::Relaxed);
        self.counters
            .stale_records
            .fetch_add(report.stale as u64, Ordering::Relaxed);
        *lock(&self.last_cycle_at) = Some(now);

        if !report.created.is_empty() || !report.resolved.is_empty() {
            tracing::info!(
                "Cycle raised {} and resolved {} alert(s), {} open",
                report.created.len(),
                report.resolved.len(),
                report.open_alerts
            );
        }
        report
    }

    /// Re-evaluate stored snapshots without new telemetry.
    pub fn rescan(&self, now: DateTime<Utc>) -> Result<CycleReport, FleetError> {
        self.apply_update(SnapshotUpdate::default(), now)
    }

    /// Count a cycle skipped because no telemetry arrived in time.
    pub fn record_deferred(&self) {
        self.counters.cycles_deferred.fetch_add(1, Ordering::Relaxed);
    }

    fn publish_board(&self, alerts: &AlertManager) {
        self.board.store(std::sync::Arc::new(AlertBoard {
            active: alerts.active_alerts(),
            recent: alerts.recent_activities(BOARD_RECENT),
            log_len: alerts.activity_log().len(),
            total_alerts: alerts.all_alerts().len(),
        }));
    }

    // === Fleet queries ===

    pub fn fleet_overview(&self) -> FleetOverview {
        fleet_overview(&self.drones.snapshot().items, self.rules())
    }

    pub fn inventory_overview(&self) -> InventoryOverview {
        inventory_overview(
            &self.inventory.snapshot().items,
            Utc::now(),
            self.thresholds(),
            self.rules(),
        )
    }

    pub fn maintenance_overview(&self) -> MaintenanceOverview {
        maintenance_overview(&self.maintenance.snapshot().items, Utc::now(), self.thresholds())
    }

    pub fn battery_distribution(&self) -> BTreeMap<&'static str, usize> {
        battery_distribution(&self.drones.snapshot().items)
    }

    pub fn stock_status_counts(&self) -> BTreeMap<String, usize> {
        stock_status_counts(&self.inventory.snapshot().items, self.thresholds())
    }

    pub fn health_status_counts(&self) -> BTreeMap<String, usize> {
        health_status_counts(&self.maintenance.snapshot().items, self.thresholds())
    }

    pub fn drones(&self) -> Vec<DroneView> {
        self.drones
            .list()
            .into_iter()
            .filter_map(|drone| DroneView::derive(drone, self.rules()))
            .collect()
    }

    pub fn drone(&self, id: &str) -> Option<DroneView> {
        self.drones
            .get(id)
            .and_then(|drone| DroneView::derive(drone, self.rules()))
    }

    pub fn inventory(&self) -> Vec<InventoryView> {
        let now = Utc::now();
        self.inventory
            .list()
            .into_iter()
            .filter_map(|item| InventoryView::derive(item, self.thresholds(), now))
            .collect()
    }

    pub fn maintenance(&self) -> Vec<MaintenanceView> {
        let now = Utc::now();
        self.maintenance
            .list()
            .into_iter()
            .filter_map(|record| MaintenanceView::derive(record, self.thresholds(), now))
            .collect()
    }

    pub fn fleet_snapshot(&self) -> FleetSnapshot {
        FleetSnapshot {
            drones: self.drones.list(),
            inventory: self.inventory.list(),
            maintenance: self.maintenance.list(),
            captured_at: *lock(&self.last_cycle_at),
        }
    }

    pub fn mission_stats(&self) -> MissionStats {
        let window = chrono::Duration::hours(i64::from(self.config.mission_window_hours));
        lock(&self.operations).summary(Utc::now(), window)
    }

    pub fn trends(&self) -> TrendReport {
        lock(&self.history).report(self.config.trend_window)
    }

    // === Alerts ===

    /// Open alerts, most severe first.
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.board.load().active.clone()
    }

    /// The last `n` activity entries, newest first.
    pub fn recent_activities(&self, n: usize) -> Vec<ActivityLogEntry> {
        let board = self.board.load();
        if n <= board.recent.len() || board.recent.len() == board.log_len {
            return board.recent.iter().take(n).cloned().collect();
        }
        lock(&self.alerts).recent_activities(n)
    }

    pub fn all_alerts(&self) -> Vec<Alert> {
        lock(&self.alerts).all_alerts().to_vec()
    }

    pub fn activity_log(&self) -> Vec<ActivityLogEntry> {
        lock(&self.alerts).activity_log().to_vec()
    }

    pub fn acknowledge_alert(&self, alert_id: &str) -> Result<Alert, FleetError> {
        let mut alerts = lock(&self.alerts);
        let alert = alerts.acknowledge(alert_id, Utc::now())?;
        self.publish_board(&alerts);
        tracing::info!("Alert {} acknowledged", alert.id);
        Ok(alert)
    }

    pub fn raise_emergency(&self, message: &str) -> Alert {
        let mut alerts = lock(&self.alerts);
        let alert = alerts.raise_emergency(message, Utc::now());
        self.publish_board(&alerts);
        tracing::warn!("Emergency protocol activated: {}", alert.message);
        alert
    }

    pub fn resolve_manual_alert(&self, alert_id: &str) -> Result<Alert, FleetError> {
        let mut alerts = lock(&self.alerts);
        let alert = alerts.resolve_manual(alert_id, Utc::now())?;
        self.publish_board(&alerts);
        tracing::info!("Alert {} resolved by operator", alert.id);
        Ok(alert)
    }

    // === Auth ===

    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.auth.authenticate(username, password)
    }

    // === Status ===

    pub fn status(&self) -> StatusReport {
        let board = self.board.load();
        StatusReport {
            source: self.config.source.as_str(),
            started_at: self.started_at,
            last_cycle_at: *lock(&self.last_cycle_at),
            cycles_completed: self.counters.cycles_completed.load(Ordering::Relaxed),
            cycles_deferred: self.counters.cycles_deferred.load(Ordering::Relaxed),
            scan_conflicts: self.counters.scan_conflicts.load(Ordering::Relaxed),
            entities_rejected: self.counters.entities_rejected.load(Ordering::Relaxed),
            stale_records: self.counters.stale_records.load(Ordering::Relaxed),
            drones_version: self.drones.version(),
            inventory_version: self.inventory.version(),
            maintenance_version: self.maintenance.version(),
            open_alerts: board.active.len(),
            total_alerts: board.total_alerts,
        }
    }
}
