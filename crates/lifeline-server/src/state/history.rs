//! Bounded per-cycle metric history used for trend reporting.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use lifeline_core::{moving_average, trend, TrendSummary};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSample {
    pub at: DateTime<Utc>,
    pub avg_battery: f64,
    pub avg_health: f64,
    pub stock_value: f64,
    pub open_alerts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub window: usize,
    pub samples: usize,
    pub battery: TrendSummary,
    pub health: TrendSummary,
    pub stock_value: TrendSummary,
    pub open_alerts: TrendSummary,
    /// Moving average of fleet battery, oldest first
    pub battery_sma: Vec<f64>,
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct MetricHistory {
    samples: VecDeque<MetricSample>,
    capacity: usize,
}

impl MetricHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, sample: MetricSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn report(&self, window: usize) -> TrendReport {
        let series = |pick: fn(&MetricSample) -> f64| -> Vec<f64> {
            self.samples.iter().map(pick).collect()
        };
        let battery = series(|s| s.avg_battery);
        TrendReport {
            window,
            samples: self.samples.len(),
            battery: trend(&battery, window),
            health: trend(&series(|s| s.avg_health), window),
            stock_value: trend(&series(|s| s.stock_value), window),
            open_alerts: trend(&series(|s| s.open_alerts as f64), window),
            battery_sma: moving_average(&battery, window),
            since: self.samples.front().map(|s| s.at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(at: DateTime<Utc>, battery: f64) -> MetricSample {
        MetricSample {
            at,
            avg_battery: battery,
            avg_health: 88.0,
            stock_value: 12_500.0,
            open_alerts: 2,
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let now = Utc::now();
        let mut history = MetricHistory::new(3);
        for n in 0..5 {
            history.record(sample(now + Duration::seconds(n), n as f64));
        }
        assert_eq!(history.len(), 3);
        let report = history.report(2);
        assert_eq!(report.since, Some(now + Duration::seconds(2)));
        assert_eq!(report.battery.latest, 4.0);
        assert_eq!(report.battery.sma, 3.5);
        assert_eq!(report.battery_sma, vec![2.0, 2.5, 3.5]);
    }

    #[test]
    fn test_empty_history_reports_zeros() {
        let report = MetricHistory::new(10).report(7);
        assert_eq!(report.samples, 0);
        assert_eq!(report.battery.latest, 0.0);
        assert!(report.battery_sma.is_empty());
        assert!(report.since.is_none());
    }
}
