//! Audit export of everything the server currently knows.

use chrono::{DateTime, Utc};
use lifeline_core::{ActivityLogEntry, Alert, Drone, InventoryItem, MaintenanceRecord};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub generated_at: DateTime<Utc>,
    pub drones: Vec<Drone>,
    pub inventory: Vec<InventoryItem>,
    pub maintenance: Vec<MaintenanceRecord>,
    /// Every alert, resolved ones included
    pub alerts: Vec<Alert>,
    /// Full activity log, oldest first
    pub activities: Vec<ActivityLogEntry>,
}

impl ExportDocument {
    pub fn collect(state: &AppState) -> Self {
        let fleet = state.fleet_snapshot();
        Self {
            generated_at: Utc::now(),
            drones: fleet.drones,
            inventory: fleet.inventory,
            maintenance: fleet.maintenance,
            alerts: state.all_alerts(),
            activities: state.activity_log(),
        }
    }

    /// Suggested download name, e.g. `lifeline-export-20260301-101500.json`.
    pub fn file_name(&self) -> String {
        format!("lifeline-export-{}.json", self.generated_at.format("%Y%m%d-%H%M%S"))
    }
}

impl AppState {
    pub fn export_document(&self) -> ExportDocument {
        ExportDocument::collect(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_export_includes_resolved_alerts() {
        let state = AppState::new(Config::default()).expect("state");
        let alert = state.raise_emergency("Hospital requested evacuation support");
        state.resolve_manual_alert(&alert.id).expect("resolve");

        let doc = state.export_document();
        assert_eq!(doc.alerts.len(), 1);
        assert_eq!(doc.activities.len(), 2);
        assert!(doc.drones.is_empty());
        assert!(doc.file_name().starts_with("lifeline-export-"));

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["alerts"][0]["state"], "resolved");
    }
}
