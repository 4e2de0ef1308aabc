//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::MAX_INTERVAL_MINUTES;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Unset or unparsable variables fall back to the default. Intervals are capped
/// at one week.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Sync interval (minutes)
    /// Unchanged ReplicationConfigs are re-synced once per interval to heal drift
    pub sync_interval_minutes: u64,
    /// Controller namespace
    /// Value sources without an explicit `sourceNamespace` are read from here
    pub controller_namespace: String,
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// Global log level (error, warn, info, debug, trace)
    pub log_level: String,
    /// Forces the `debug` log level regardless of `log_level`
    pub debug: bool,
    /// Log format (json, text)
    pub log_format: String,
    /// Fibonacci backoff floor after a failed reconciliation (minutes)
    pub backoff_min_minutes: u64,
    /// Fibonacci backoff ceiling after a failed reconciliation (minutes)
    pub backoff_max_minutes: u64,
    /// Upper bound for a single reconciliation pass (seconds)
    pub reconcile_timeout_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            sync_interval_minutes: DEFAULT_SYNC_INTERVAL_MINUTES,
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "info".to_string(),
            debug: false,
            log_format: "json".to_string(),
            backoff_min_minutes: DEFAULT_BACKOFF_MIN_MINUTES,
            backoff_max_minutes: DEFAULT_BACKOFF_MAX_MINUTES,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup with defaults
    ///
    /// `from_env` is this with `std::env::var`; tests pass a map instead of
    /// mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let backoff_min_minutes = positive_or_default(
            var_or_default(&lookup, "BACKOFF_MIN_MINUTES", defaults.backoff_min_minutes),
            defaults.backoff_min_minutes,
        )
        .min(MAX_INTERVAL_MINUTES);
        let backoff_max_minutes =
            var_or_default(&lookup, "BACKOFF_MAX_MINUTES", defaults.backoff_max_minutes)
                .clamp(backoff_min_minutes, MAX_INTERVAL_MINUTES);

        Self {
            sync_interval_minutes: positive_or_default(
                var_or_default(
                    &lookup,
                    "SYNC_INTERVAL_MINUTES",
                    defaults.sync_interval_minutes,
                ),
                defaults.sync_interval_minutes,
            )
            .min(MAX_INTERVAL_MINUTES),
            controller_namespace: var_or_default_str(
                &lookup,
                "POD_NAMESPACE",
                &defaults.controller_namespace,
            ),
            metrics_port: var_or_default(&lookup, "METRICS_PORT", defaults.metrics_port),
            log_level: var_or_default_str(&lookup, "LOG_LEVEL", &defaults.log_level),
            debug: var_or_default_bool(&lookup, "DEBUG", defaults.debug),
            log_format: var_or_default_str(&lookup, "LOG_FORMAT", &defaults.log_format)
                .to_lowercase(),
            backoff_min_minutes,
            backoff_max_minutes,
            reconcile_timeout_secs: positive_or_default(
                var_or_default(
                    &lookup,
                    "RECONCILE_TIMEOUT_SECS",
                    defaults.reconcile_timeout_secs,
                ),
                defaults.reconcile_timeout_secs,
            ),
        }
    }

    /// Get sync interval duration
    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_minutes.saturating_mul(60))
    }

    /// Get reconcile timeout duration
    #[must_use]
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Log level after applying the `DEBUG` switch
    #[must_use]
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }

    /// Whether logs should be emitted as JSON lines
    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.log_format != "text"
    }
}

/// Read variable or return default value
fn var_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read variable as boolean or return default
fn var_or_default_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            let v_lower = v.trim().to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read variable as string or return default
fn var_or_default_str<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn positive_or_default(value: u64, default: u64) -> u64 {
    if value == 0 {
        default
    } else {
        value
    }
}
