//! Periodic telemetry refresh.
//!
//! Each tick fetches one update from the configured source, bounded by the
//! tick budget, then applies it and scans for alerts. A tick that cannot
//! finish its fetch in time is skipped rather than queued.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::source::TelemetrySource;
use crate::state::{AppState, CycleReport};

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Completed(CycleReport),
    /// Fetch failed or ran past the budget; nothing was applied
    Deferred,
    /// Another cycle held the scan guard
    Conflict,
}

/// Start the refresh loop. Returns once `shutdown` fires; a cycle already
/// running is allowed to finish first.
pub async fn run_refresh_loop(
    state: Arc<AppState>,
    source: Arc<dyn TelemetrySource>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(state.config().refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let budget = state.config().tick_budget;

    tracing::info!(
        "Refresh loop started (source: {}, every {:?}, budget {:?})",
        source.name(),
        state.config().refresh_interval,
        budget
    );

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Refresh loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                run_tick(&state, source.as_ref(), budget).await;
            }
        }
    }
}

/// One refresh cycle.
///
/// The scan guard is claimed before fetching, so a conflicting tick leaves
/// the source (and any pushed telemetry waiting in it) untouched.
pub async fn run_tick(
    state: &AppState,
    source: &dyn TelemetrySource,
    budget: Duration,
) -> TickOutcome {
    let permit = match state.try_begin_scan() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!("Scan already in progress; retrying next tick");
            return TickOutcome::Conflict;
        }
    };

    let update = match timeout(budget, source.fetch()).await {
        Ok(Ok(update)) => update,
        Ok(Err(err)) => {
            tracing::warn!("Telemetry fetch from {} failed: {}", source.name(), err);
            state.record_deferred();
            return TickOutcome::Deferred;
        }
        Err(_) => {
            tracing::warn!(
                "Telemetry fetch from {} exceeded {:?}; deferring to next tick",
                source.name(),
                budget
            );
            state.record_deferred();
            return TickOutcome::Deferred;
        }
    };

    let report = state.apply_with(permit, update, Utc::now());
    tracing::debug!(
        "Refresh cycle done: {} rejected, {} open alert(s)",
        report.rejected,
        report.open_alerts
    );
    TickOutcome::Completed(report)
}
