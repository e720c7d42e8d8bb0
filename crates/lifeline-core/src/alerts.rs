//! Alert lifecycle and activity log.
//!
//! Alerts move `Active -> Acknowledged -> Resolved` (or straight from Active
//! to Resolved). A scan keeps at most one open alert per dedup key
//! `(entity kind, entity id, rule)`. Resolved alerts are kept for audit and a
//! recurring breach opens a fresh alert with a new id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{FleetError, Result};
use crate::models::{
    ActivityCategory, ActivityLogEntry, Alert, AlertSeverity, AlertState, EntityKind, EntityRef,
    RuleId,
};
use crate::rules::{Breach, InvalidEntity};

/// Identity of an open alert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    pub kind: EntityKind,
    pub entity_id: String,
    pub rule: RuleId,
}

impl DedupKey {
    pub fn new(source: &EntityRef, rule: RuleId) -> Self {
        Self {
            kind: source.kind,
            entity_id: source.id.clone(),
            rule,
        }
    }

    fn entity(&self) -> EntityRef {
        EntityRef::new(self.kind, self.entity_id.clone())
    }
}

/// What one scan changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub created: Vec<String>,
    pub resolved: Vec<String>,
    /// Breaches that already had an open alert
    pub unchanged: usize,
    /// Entities whose invalid metrics were escalated this scan
    pub escalated: usize,
}

/// Owner of every alert and of the activity log.
#[derive(Debug)]
pub struct AlertManager {
    alerts: Vec<Alert>,
    by_id: HashMap<String, usize>,
    open: HashMap<DedupKey, usize>,
    log: Vec<ActivityLogEntry>,
    invalid_strikes: HashMap<EntityRef, u32>,
    escalation_cycles: u32,
    next_seq: u64,
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(3)
    }
}

impl AlertManager {
    /// `escalation_cycles` is the number of consecutive scans an entity may
    /// fail validation before an Info alert is raised for it.
    pub fn new(escalation_cycles: u32) -> Self {
        Self {
            alerts: Vec::new(),
            by_id: HashMap::new(),
            open: HashMap::new(),
            log: Vec::new(),
            invalid_strikes: HashMap::new(),
            escalation_cycles: escalation_cycles.max(1),
            next_seq: 1,
        }
    }

    /// Apply one scan pass.
    ///
    /// `breaches` is every breach found in the current snapshot and `invalid`
    /// the entities excluded from it. Open alerts of excluded entities are
    /// left as they are since their rules could not be evaluated.
    pub fn scan(
        &mut self,
        mut breaches: Vec<Breach>,
        invalid: &[InvalidEntity],
        now: DateTime<Utc>,
    ) -> ScanReport {
        let mut report = ScanReport::default();

        let excluded: HashSet<EntityRef> = invalid.iter().map(|i| i.source.clone()).collect();
        self.invalid_strikes.retain(|source, _| excluded.contains(source));
        let mut counted = HashSet::new();
        for entity in invalid {
            if !counted.insert(entity.source.clone()) {
                continue;
            }
            let strikes = self.invalid_strikes.entry(entity.source.clone()).or_insert(0);
            *strikes = strikes.saturating_add(1);
            if *strikes >= self.escalation_cycles {
                report.escalated += 1;
                breaches.push(Breach {
                    source: entity.source.clone(),
                    rule: RuleId::InvalidMetric,
                    severity: AlertSeverity::Info,
                    title: "Invalid telemetry".to_string(),
                    message: format!(
                        "{} rejected for {} consecutive cycles: {}",
                        entity.source, strikes, entity.error
                    ),
                });
            }
        }

        let mut breaching = HashSet::new();
        for breach in breaches {
            let key = DedupKey::new(&breach.source, breach.rule);
            if !breaching.insert(key.clone()) {
                continue;
            }
            if self.open.contains_key(&key) {
                report.unchanged += 1;
                continue;
            }
            let id = self.open_alert(key, breach, now);
            report.created.push(id);
        }

        let mut cleared: Vec<(DedupKey, usize)> = self
            .open
            .iter()
            .filter(|(key, _)| !breaching.contains(*key))
            .filter(|(key, _)| key.rule != RuleId::ManualEmergency)
            .filter(|(key, _)| key.rule == RuleId::InvalidMetric || !excluded.contains(&key.entity()))
            .map(|(key, idx)| (key.clone(), *idx))
            .collect();
        cleared.sort_by_key(|(_, idx)| *idx);

        for (key, idx) in cleared {
            self.open.remove(&key);
            self.close_alert(idx, now, "condition cleared");
            report.resolved.push(self.alerts[idx].id.clone());
        }

        report
    }

    /// Operator acknowledgement of an Active alert.
    pub fn acknowledge(&mut self, alert_id: &str, now: DateTime<Utc>) -> Result<Alert> {
        let idx = self.index_of(alert_id)?;
        let alert = &mut self.alerts[idx];
        if alert.state != AlertState::Active {
            return Err(FleetError::InvalidTransition {
                id: alert.id.clone(),
                from: alert.state,
                to: AlertState::Acknowledged,
            });
        }
        alert.state = AlertState::Acknowledged;
        alert.acknowledged_at = Some(now);
        let description = format!("Acknowledged {}: {}", alert.id, alert.title);
        let alert = alert.clone();
        self.log_alert(now, ActivityCategory::AlertAcknowledged, description, idx);
        Ok(alert)
    }

    /// Raise an operator emergency. Returns the already open one if present.
    pub fn raise_emergency(&mut self, message: &str, now: DateTime<Utc>) -> Alert {
        let source = EntityRef::new(EntityKind::System, "operator");
        let key = DedupKey::new(&source, RuleId::ManualEmergency);
        if let Some(idx) = self.open.get(&key) {
            return self.alerts[*idx].clone();
        }
        let breach = Breach {
            source,
            rule: RuleId::ManualEmergency,
            severity: AlertSeverity::Critical,
            title: "Emergency protocol activated".to_string(),
            message: message.to_string(),
        };
        let id = self.open_alert(key, breach, now);
        self.alerts[self.by_id[&id]].clone()
    }

    /// Resolve an operator-raised alert. Scan-driven alerts only resolve
    /// when their condition clears.
    pub fn resolve_manual(&mut self, alert_id: &str, now: DateTime<Utc>) -> Result<Alert> {
        let idx = self.index_of(alert_id)?;
        let alert = &self.alerts[idx];
        if alert.rule != RuleId::ManualEmergency || !alert.state.is_open() {
            return Err(FleetError::InvalidTransition {
                id: alert.id.clone(),
                from: alert.state,
                to: AlertState::Resolved,
            });
        }
        let key = DedupKey::new(&alert.source, alert.rule);
        self.open.remove(&key);
        self.close_alert(idx, now, "resolved by operator");
        Ok(self.alerts[idx].clone())
    }

    pub fn get(&self, alert_id: &str) -> Option<&Alert> {
        self.by_id.get(alert_id).map(|idx| &self.alerts[*idx])
    }

    /// Open alerts, most severe first, newest first within a severity.
    pub fn active_alerts(&self) -> Vec<Alert> {
        let mut open: Vec<Alert> = self
            .open
            .values()
            .map(|idx| self.alerts[*idx].clone())
            .collect();
        sort_for_display(&mut open);
        open
    }

    /// Every alert ever raised, in creation order.
    pub fn all_alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// The last `n` log entries, newest first.
    pub fn recent_activities(&self, n: usize) -> Vec<ActivityLogEntry> {
        self.log.iter().rev().take(n).cloned().collect()
    }

    /// Append an operational entry that is not tied to an alert.
    pub fn record_activity(
        &mut self,
        timestamp: DateTime<Utc>,
        category: ActivityCategory,
        description: String,
        source: EntityRef,
    ) {
        self.log.push(ActivityLogEntry {
            timestamp,
            category,
            description,
            alert_id: None,
            source: Some(source),
        });
    }

    /// Full log, oldest first.
    pub fn activity_log(&self) -> &[ActivityLogEntry] {
        &self.log
    }

    fn index_of(&self, alert_id: &str) -> Result<usize> {
        self.by_id
            .get(alert_id)
            .copied()
            .ok_or_else(|| FleetError::AlertNotFound(alert_id.to_string()))
    }

    fn open_alert(&mut self, key: DedupKey, breach: Breach, now: DateTime<Utc>) -> String {
        let id = format!("ALT-{:06}", self.next_seq);
        self.next_seq += 1;

        let description = format!("{} on {}: {}", breach.title, breach.source, breach.message);
        let idx = self.alerts.len();
        self.alerts.push(Alert {
            id: id.clone(),
            severity: breach.severity,
            title: breach.title,
            message: breach.message,
            source: breach.source,
            rule: breach.rule,
            created_at: now,
            state: AlertState::Active,
            acknowledged_at: None,
            resolved_at: None,
        });
        self.by_id.insert(id.clone(), idx);
        self.open.insert(key, idx);
        self.log_alert(now, ActivityCategory::AlertCreated, description, idx);
        id
    }

    fn close_alert(&mut self, idx: usize, now: DateTime<Utc>, reason: &str) {
        let alert = &mut self.alerts[idx];
        alert.state = AlertState::Resolved;
        alert.resolved_at = Some(now);
        let description = format!("Resolved {} ({}): {}", alert.id, alert.title, reason);
        self.log_alert(now, ActivityCategory::AlertResolved, description, idx);
    }

    fn log_alert(
        &mut self,
        timestamp: DateTime<Utc>,
        category: ActivityCategory,
        description: String,
        idx: usize,
    ) {
        let alert = &self.alerts[idx];
        let entry = ActivityLogEntry {
            timestamp,
            category,
            description,
            alert_id: Some(alert.id.clone()),
            source: Some(alert.source.clone()),
        };
        self.log.push(entry);
    }
}

/// Most severe first, then newest, then highest id.
pub fn sort_for_display(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| b.id.cmp(&a.id))
    });
}
