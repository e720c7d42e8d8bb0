//! Plain-text rendering of the dashboard summary.

use std::fmt::Write;

use lifeline_core::{ActivityLogEntry, Alert, AlertSeverity, AlertState, MissionStats};

use crate::client::{FleetOverviewResponse, InventoryOverviewResponse, MaintenanceOverviewResponse};

pub fn severity_name(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Info => "info",
        AlertSeverity::Warning => "warning",
        AlertSeverity::Critical => "critical",
    }
}

/// Parse a severity given on the command line.
pub fn parse_severity(value: &str) -> Result<AlertSeverity, String> {
    match value.to_ascii_lowercase().as_str() {
        "info" => Ok(AlertSeverity::Info),
        "warning" => Ok(AlertSeverity::Warning),
        "critical" => Ok(AlertSeverity::Critical),
        other => Err(format!("unknown severity '{other}' (info, warning, critical)")),
    }
}

pub fn render_overview(
    fleet: &FleetOverviewResponse,
    inventory: &InventoryOverviewResponse,
    maintenance: &MaintenanceOverviewResponse,
) -> String {
    let mut out = String::new();
    let f = &fleet.overview;
    let _ = writeln!(
        out,
        "Fleet        {} drones (active {}, charging {}, maintenance {}, emergency {})",
        f.total, f.active, f.charging, f.maintenance, f.emergency
    );
    let _ = writeln!(
        out,
        "             avg battery {:.1}%, {} low",
        f.avg_battery, f.low_battery
    );

    let i = &inventory.overview;
    let _ = writeln!(
        out,
        "Inventory    {} items (critical {}, low {}, expiring {}, expired {})",
        i.total_items, i.critical_count, i.low_count, i.expiring_soon_count, i.expired_count
    );
    let _ = writeln!(
        out,
        "             stock value ${:.2}, avg level {:.1}%",
        i.total_value, i.avg_stock_level_pct
    );

    let m = &maintenance.overview;
    let _ = writeln!(
        out,
        "Maintenance  {} components (critical {}, warning {}, overdue {})",
        m.total_components, m.critical_components, m.warning_components, m.overdue_count
    );
    let _ = writeln!(
        out,
        "             avg health {:.1}%, est. repairs ${:.2}",
        m.avg_health, m.estimated_repair_cost
    );
    out
}

pub fn render_missions(stats: &MissionStats) -> String {
    format!(
        "Missions     {} in flight, {} completed and {} dispatched in the last {}h (avg {:.1} min)\n",
        stats.active_missions,
        stats.completed,
        stats.deployed,
        stats.window_hours,
        stats.avg_mission_minutes
    )
}

pub fn render_alerts(alerts: &[Alert]) -> String {
    if alerts.is_empty() {
        return "No open alerts\n".to_string();
    }
    let mut out = String::new();
    for alert in alerts {
        let ack = if alert.state == AlertState::Acknowledged {
            " (ack)"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "[{:<8}] {} {}: {}{}",
            severity_name(alert.severity).to_uppercase(),
            alert.id,
            alert.title,
            alert.message,
            ack
        );
    }
    out
}

pub fn render_activities(entries: &[ActivityLogEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "{}  {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.description
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lifeline_core::{
        EntityKind, EntityRef, FleetOverview, InventoryOverview, MaintenanceOverview, RuleId,
    };

    #[test]
    fn test_parse_severity_is_case_insensitive() {
        assert_eq!(parse_severity("Critical"), Ok(AlertSeverity::Critical));
        assert!(parse_severity("urgent").is_err());
    }

    #[test]
    fn test_render_missions_line() {
        let stats = MissionStats {
            active_missions: 4,
            completed: 12,
            deployed: 15,
            avg_mission_minutes: 22.34,
            window_hours: 24,
        };
        assert_eq!(
            render_missions(&stats),
            "Missions     4 in flight, 12 completed and 15 dispatched in the last 24h (avg 22.3 min)\n"
        );
    }

    #[test]
    fn test_render_overview_lines() {
        let fleet = FleetOverviewResponse {
            overview: FleetOverview {
                total: 15,
                active: 9,
                charging: 3,
                maintenance: 2,
                emergency: 1,
                avg_battery: 61.44,
                low_battery: 2,
                excluded: 0,
            },
            battery_distribution: Default::default(),
        };
        let inventory = InventoryOverviewResponse {
            overview: InventoryOverview {
                total_items: 28,
                total_value: 1250.5,
                ..Default::default()
            },
            stock_status: Default::default(),
        };
        let maintenance = MaintenanceOverviewResponse {
            overview: MaintenanceOverview::default(),
            health_status: Default::default(),
        };

        let text = render_overview(&fleet, &inventory, &maintenance);
        assert!(text.contains("15 drones (active 9, charging 3, maintenance 2, emergency 1)"));
        assert!(text.contains("avg battery 61.4%, 2 low"));
        assert!(text.contains("stock value $1250.50"));
        assert_eq!(text.lines().count(), 6);
    }

    #[test]
    fn test_render_alerts_marks_acknowledged() {
        let alert = Alert {
            id: "ALT-000004".to_string(),
            severity: AlertSeverity::Critical,
            title: "Emergency battery level".to_string(),
            message: "Drone LLA-002 at 11% battery".to_string(),
            source: EntityRef::new(EntityKind::Drone, "LLA-002"),
            rule: RuleId::EmergencyBattery,
            created_at: Utc::now(),
            state: AlertState::Acknowledged,
            acknowledged_at: Some(Utc::now()),
            resolved_at: None,
        };
        let text = render_alerts(&[alert]);
        assert!(text.starts_with("[CRITICAL] ALT-000004 Emergency battery level"));
        assert!(text.trim_end().ends_with("(ack)"));
        assert_eq!(render_alerts(&[]), "No open alerts\n");
    }
}
