//! Server configuration from environment.
//!
//! Every value has a documented default; the result is validated before the
//! server starts so bad thresholds never reach the classifier.

use std::env;
use std::time::Duration;

use lifeline_core::{AlertRules, Thresholds};

/// Configuration loading error.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// Where fleet telemetry comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Built-in simulator
    Simulated,
    /// Snapshots posted to `/v1/telemetry`
    Push,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Simulated => "simulated",
            SourceKind::Push => "push",
        }
    }
}

pub const MIN_REFRESH_SECS: u64 = 5;
pub const MAX_REFRESH_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// Interval between refresh cycles
    pub refresh_interval: Duration,
    /// Upper bound on one telemetry fetch
    pub tick_budget: Duration,
    pub source: SourceKind,
    pub sim_seed: Option<u64>,
    /// `(username, argon2 PHC hash)` pairs
    pub users: Vec<(String, String)>,
    /// Bearer token for operator actions. Operator routes are refused when unset.
    pub operator_token: Option<String>,
    /// Failed logins per client allowed within `login_failure_window`
    pub login_max_failures: u32,
    pub login_failure_window: Duration,
    pub rate_limit_enabled: bool,
    pub trust_proxy: bool,
    /// Samples used for moving averages
    pub trend_window: usize,
    /// Number of per-cycle samples kept for trends
    pub history_len: usize,
    /// Trailing window for mission statistics
    pub mission_window_hours: u32,
    pub thresholds: Thresholds,
    pub rules: AlertRules,
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        let refresh_interval = Duration::from_secs(30);
        Self {
            server_port: 3000,
            refresh_interval,
            tick_budget: default_budget(refresh_interval),
            source: SourceKind::Simulated,
            sim_seed: None,
            users: Vec::new(),
            operator_token: None,
            login_max_failures: 5,
            login_failure_window: Duration::from_secs(60),
            rate_limit_enabled: true,
            trust_proxy: false,
            trend_window: 7,
            history_len: 288,
            mission_window_hours: 24,
            thresholds: Thresholds::default(),
            rules: AlertRules::default(),
            log_json: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = Reader { lookup: &lookup };

        let refresh_secs = read.parse_or("LIFELINE_REFRESH_SECS", 30u64)?;
        let refresh_interval = Duration::from_secs(refresh_secs);
        let tick_budget = match read.parse::<u64>("LIFELINE_TICK_BUDGET_MS")? {
            Some(ms) => Duration::from_millis(ms),
            None => default_budget(refresh_interval),
        };

        let source = match read.string("LIFELINE_SOURCE").as_deref() {
            None | Some("simulated") => SourceKind::Simulated,
            Some("push") => SourceKind::Push,
            Some(other) => {
                return Err(ConfigError::Invalid(
                    "LIFELINE_SOURCE".to_string(),
                    other.to_string(),
                ))
            }
        };

        let users = match read.string("LIFELINE_USERS") {
            Some(raw) => parse_users(&raw)?,
            None => Vec::new(),
        };

        let thresholds = Thresholds {
            low_stock_factor: read
                .parse_or("LIFELINE_LOW_STOCK_FACTOR", defaults.thresholds.low_stock_factor)?,
            overstock_factor: read
                .parse_or("LIFELINE_OVERSTOCK_FACTOR", defaults.thresholds.overstock_factor)?,
            health_critical_below: read.parse_or(
                "LIFELINE_HEALTH_CRITICAL",
                defaults.thresholds.health_critical_below,
            )?,
            health_warning_below: read.parse_or(
                "LIFELINE_HEALTH_WARNING",
                defaults.thresholds.health_warning_below,
            )?,
        };

        let rules = AlertRules {
            emergency_battery_pct: read
                .parse_or("LIFELINE_EMERGENCY_BATTERY", defaults.rules.emergency_battery_pct)?,
            low_battery_pct: read.parse_or("LIFELINE_LOW_BATTERY", defaults.rules.low_battery_pct)?,
            expiry_warning_days: read
                .parse_or("LIFELINE_EXPIRY_WARNING_DAYS", defaults.rules.expiry_warning_days)?,
            invalid_metric_escalation_cycles: read.parse_or(
                "LIFELINE_INVALID_ESCALATION",
                defaults.rules.invalid_metric_escalation_cycles,
            )?,
        };

        let config = Self {
            server_port: read.parse_or("LIFELINE_PORT", defaults.server_port)?,
            refresh_interval,
            tick_budget,
            source,
            sim_seed: read.parse("LIFELINE_SIM_SEED")?,
            users,
            operator_token: read.string("LIFELINE_OPERATOR_TOKEN"),
            login_max_failures: read
                .parse_or("LIFELINE_LOGIN_MAX_FAILURES", defaults.login_max_failures)?,
            login_failure_window: Duration::from_secs(read.parse_or(
                "LIFELINE_LOGIN_FAILURE_WINDOW_SECS",
                defaults.login_failure_window.as_secs(),
            )?),
            rate_limit_enabled: read.flag("LIFELINE_RATE_LIMIT_ENABLED", true),
            trust_proxy: read.flag("LIFELINE_TRUST_PROXY", false),
            trend_window: read.parse_or("LIFELINE_TREND_WINDOW", defaults.trend_window)?,
            history_len: read.parse_or("LIFELINE_HISTORY_LEN", defaults.history_len)?,
            mission_window_hours: read
                .parse_or("LIFELINE_MISSION_WINDOW_HOURS", defaults.mission_window_hours)?,
            thresholds,
            rules,
            log_json: read.flag("LIFELINE_LOG_JSON", false),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let refresh = self.refresh_interval.as_secs();
        if !(MIN_REFRESH_SECS..=MAX_REFRESH_SECS).contains(&refresh) {
            return Err(invalid(
                "LIFELINE_REFRESH_SECS",
                format!("{refresh} (must be {MIN_REFRESH_SECS}-{MAX_REFRESH_SECS})"),
            ));
        }
        if self.tick_budget.is_zero() || self.tick_budget > self.refresh_interval {
            return Err(invalid(
                "LIFELINE_TICK_BUDGET_MS",
                format!("{} ms (must be within the refresh interval)", self.tick_budget.as_millis()),
            ));
        }

        let t = &self.thresholds;
        if !(t.low_stock_factor.is_finite() && t.low_stock_factor > 0.0) {
            return Err(invalid("LIFELINE_LOW_STOCK_FACTOR", t.low_stock_factor.to_string()));
        }
        if !(t.overstock_factor.is_finite() && t.overstock_factor > 0.0) {
            return Err(invalid("LIFELINE_OVERSTOCK_FACTOR", t.overstock_factor.to_string()));
        }
        if !(0.0..=100.0).contains(&t.health_critical_below)
            || !(0.0..=100.0).contains(&t.health_warning_below)
            || t.health_critical_below >= t.health_warning_below
        {
            return Err(invalid(
                "LIFELINE_HEALTH_CRITICAL",
                format!(
                    "{} must be below LIFELINE_HEALTH_WARNING {}",
                    t.health_critical_below, t.health_warning_below
                ),
            ));
        }

        let r = &self.rules;
        if !(0.0..=100.0).contains(&r.emergency_battery_pct)
            || !(0.0..=100.0).contains(&r.low_battery_pct)
            || r.emergency_battery_pct > r.low_battery_pct
        {
            return Err(invalid(
                "LIFELINE_EMERGENCY_BATTERY",
                format!(
                    "{} must not exceed LIFELINE_LOW_BATTERY {}",
                    r.emergency_battery_pct, r.low_battery_pct
                ),
            ));
        }
        if r.expiry_warning_days < 0 {
            return Err(invalid(
                "LIFELINE_EXPIRY_WARNING_DAYS",
                r.expiry_warning_days.to_string(),
            ));
        }
        if r.invalid_metric_escalation_cycles == 0 {
            return Err(invalid("LIFELINE_INVALID_ESCALATION", "0".to_string()));
        }

        if self.trend_window == 0 {
            return Err(invalid("LIFELINE_TREND_WINDOW", "0".to_string()));
        }
        if self.history_len < self.trend_window {
            return Err(invalid(
                "LIFELINE_HISTORY_LEN",
                format!("{} (must hold at least one trend window)", self.history_len),
            ));
        }
        if self.mission_window_hours == 0 {
            return Err(invalid("LIFELINE_MISSION_WINDOW_HOURS", "0".to_string()));
        }
        if self.login_max_failures == 0 {
            return Err(invalid("LIFELINE_LOGIN_MAX_FAILURES", "0".to_string()));
        }
        if self.login_failure_window.is_zero() {
            return Err(invalid("LIFELINE_LOGIN_FAILURE_WINDOW_SECS", "0".to_string()));
        }
        if matches!(self.operator_token.as_deref(), Some(token) if token.trim().is_empty()) {
            return Err(invalid("LIFELINE_OPERATOR_TOKEN", "empty".to_string()));
        }
        // push ingestion is an operator route
        if self.source == SourceKind::Push && self.operator_token.is_none() {
            return Err(ConfigError::Missing("LIFELINE_OPERATOR_TOKEN".to_string()));
        }
        for (user, phc) in &self.users {
            if !looks_like_phc(phc) {
                return Err(invalid("LIFELINE_USERS", format!("{user}: not an argon2 hash")));
            }
        }
        Ok(())
    }
}

fn default_budget(refresh: Duration) -> Duration {
    refresh * 4 / 5
}

fn invalid(key: &str, value: String) -> ConfigError {
    ConfigError::Invalid(key.to_string(), value)
}

/// Parse `user:phc;user:phc`.
pub fn parse_users(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let mut users = Vec::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (user, phc) = entry
            .split_once(':')
            .ok_or_else(|| invalid("LIFELINE_USERS", entry.to_string()))?;
        let user = user.trim();
        if user.is_empty() {
            return Err(invalid("LIFELINE_USERS", entry.to_string()));
        }
        users.push((user.to_string(), phc.trim().to_string()));
    }
    Ok(users)
}

struct Reader<'a, F> {
    lookup: &'a F,
}

impl<F> Reader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.string(key) {
            Some(value) => value
                .parse::<T>()
                .map(Some)
                .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
            None => Ok(None),
        }
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.parse(key)?.unwrap_or(default))
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.string(key).as_deref() {
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            _ => default,
        }
    }
}

/// Shape check only; the auth gate parses the hash fully.
fn looks_like_phc(value: &str) -> bool {
    value.starts_with("$argon2") && value.split('$').count() >= 5
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const PHC: &str = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHRzYWx0$aGFzaGhhc2hoYXNoaGFzaA";

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.refresh_interval, Duration::from_secs(30));
        assert_eq!(config.tick_budget, Duration::from_secs(24));
        assert_eq!(config.source, SourceKind::Simulated);
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.rules, AlertRules::default());
        assert!(config.operator_token.is_none());
        assert_eq!(config.login_max_failures, 5);
        assert_eq!(config.login_failure_window, Duration::from_secs(60));
        assert_eq!(config.mission_window_hours, 24);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("LIFELINE_PORT", "8088"),
            ("LIFELINE_REFRESH_SECS", "10"),
            ("LIFELINE_SOURCE", "push"),
            ("LIFELINE_SIM_SEED", "42"),
            ("LIFELINE_LOW_BATTERY", "25"),
            ("LIFELINE_OPERATOR_TOKEN", "ops"),
            ("LIFELINE_USERS", &format!("dispatch:{PHC}; medic:{PHC}")),
        ])
        .unwrap();
        assert_eq!(config.server_port, 8088);
        assert_eq!(config.tick_budget, Duration::from_secs(8));
        assert_eq!(config.source, SourceKind::Push);
        assert_eq!(config.sim_seed, Some(42));
        assert_eq!(config.rules.low_battery_pct, 25.0);
        assert_eq!(config.operator_token.as_deref(), Some("ops"));
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.users[1].0, "medic");
    }

    #[test]
    fn test_refresh_interval_bounds() {
        assert!(load(&[("LIFELINE_REFRESH_SECS", "5")]).is_ok());
        assert!(load(&[("LIFELINE_REFRESH_SECS", "60")]).is_ok());
        assert!(matches!(
            load(&[("LIFELINE_REFRESH_SECS", "4")]),
            Err(ConfigError::Invalid(key, _)) if key == "LIFELINE_REFRESH_SECS"
        ));
        assert!(load(&[("LIFELINE_REFRESH_SECS", "61")]).is_err());
        assert!(load(&[("LIFELINE_REFRESH_SECS", "soon")]).is_err());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        assert!(load(&[("LIFELINE_HEALTH_CRITICAL", "90")]).is_err());
        assert!(load(&[("LIFELINE_EMERGENCY_BATTERY", "30")]).is_err());
        assert!(load(&[("LIFELINE_LOW_STOCK_FACTOR", "-1")]).is_err());
        assert!(load(&[("LIFELINE_TICK_BUDGET_MS", "45000")]).is_err());
    }

    #[test]
    fn test_login_and_mission_windows() {
        let config = load(&[
            ("LIFELINE_LOGIN_MAX_FAILURES", "3"),
            ("LIFELINE_LOGIN_FAILURE_WINDOW_SECS", "300"),
            ("LIFELINE_MISSION_WINDOW_HOURS", "8"),
        ])
        .unwrap();
        assert_eq!(config.login_max_failures, 3);
        assert_eq!(config.login_failure_window, Duration::from_secs(300));
        assert_eq!(config.mission_window_hours, 8);

        assert!(load(&[("LIFELINE_LOGIN_MAX_FAILURES", "0")]).is_err());
        assert!(load(&[("LIFELINE_LOGIN_FAILURE_WINDOW_SECS", "0")]).is_err());
        assert!(load(&[("LIFELINE_MISSION_WINDOW_HOURS", "0")]).is_err());
    }

    #[test]
    fn test_rejects_bad_users() {
        assert!(load(&[("LIFELINE_USERS", "dispatch:plaintext")]).is_err());
        assert!(load(&[("LIFELINE_USERS", "no-separator")]).is_err());
        assert!(load(&[("LIFELINE_SOURCE", "kafka")]).is_err());
    }

    #[test]
    fn test_push_source_needs_operator_token() {
        assert_eq!(
            load(&[("LIFELINE_SOURCE", "push")]).unwrap_err(),
            ConfigError::Missing("LIFELINE_OPERATOR_TOKEN".to_string())
        );
    }
}
