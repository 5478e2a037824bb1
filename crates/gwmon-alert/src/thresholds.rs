use anyhow::Result;
use gwmon_storage::{keys, RetentionStore};
use serde::{Deserialize, Serialize};

/// Errors from the runtime threshold surface.
#[derive(Debug, thiserror::Error)]
pub enum ThresholdError {
    #[error("unknown threshold key '{0}'")]
    UnknownKey(String),

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Named threshold presets. Applying one atomically overwrites a fixed
/// subset of keys; everything else keeps its current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Relaxed,
    Balanced,
    Strict,
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relaxed" => Ok(Preset::Relaxed),
            "balanced" => Ok(Preset::Balanced),
            "strict" => Ok(Preset::Strict),
            _ => Err(format!("unknown preset: {s}")),
        }
    }
}

/// Runtime-configurable alerting thresholds.
///
/// Every key is independently readable and writable by name at runtime
/// ([`Thresholds::get`] / [`Thresholds::set`]); a failed parse leaves the
/// in-memory value untouched, so alerting keeps running on the
/// last-known-good configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Sustained-CPU threshold, percent.
    pub cpu_threshold: f64,
    /// Minutes of consecutive one-per-minute CPU samples required.
    pub cpu_duration_minutes: u32,
    /// Memory usage threshold, percent.
    pub memory_threshold: f64,
    /// Disk usage threshold, percent.
    pub disk_threshold: f64,
    /// Health probe response time threshold, milliseconds.
    pub response_time_ms: f64,
    /// Consecutive failed health probes before alerting.
    pub health_failures: u32,
    /// Block-sync lag threshold, blocks behind the network.
    pub block_sync_lag: i64,
    /// Minimum acceptable ArNS cache hit rate, percent.
    pub arns_cache_hit_rate_min: f64,
    /// Smoothed ArNS error-rate threshold, percent.
    pub error_rate_threshold: f64,
    /// Minimum aggregated requests before the error rate is meaningful.
    pub error_rate_min_requests: u64,
    /// Consecutive unselected epochs before the streak alert.
    pub not_selected_epochs: usize,
    /// Minimum acceptable observer weight.
    pub low_observer_weight: f64,
    /// Cooldown applied to duplicate alerts, minutes.
    pub cooldown_minutes: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_threshold: 80.0,
            cpu_duration_minutes: 5,
            memory_threshold: 85.0,
            disk_threshold: 90.0,
            response_time_ms: 2000.0,
            health_failures: 3,
            block_sync_lag: 50,
            arns_cache_hit_rate_min: 50.0,
            error_rate_threshold: 5.0,
            error_rate_min_requests: 50,
            not_selected_epochs: 5,
            low_observer_weight: 0.5,
            cooldown_minutes: 30,
        }
    }
}

const KEYS: &[&str] = &[
    "cpu_threshold",
    "cpu_duration_minutes",
    "memory_threshold",
    "disk_threshold",
    "response_time_ms",
    "health_failures",
    "block_sync_lag",
    "arns_cache_hit_rate_min",
    "error_rate_threshold",
    "error_rate_min_requests",
    "not_selected_epochs",
    "low_observer_weight",
    "cooldown_minutes",
];

impl Thresholds {
    /// All settable key names.
    pub fn key_names() -> &'static [&'static str] {
        KEYS
    }

    /// Reads one key by name, rendered as a string.
    pub fn get(&self, key: &str) -> Result<String, ThresholdError> {
        let value = match key {
            "cpu_threshold" => self.cpu_threshold.to_string(),
            "cpu_duration_minutes" => self.cpu_duration_minutes.to_string(),
            "memory_threshold" => self.memory_threshold.to_string(),
            "disk_threshold" => self.disk_threshold.to_string(),
            "response_time_ms" => self.response_time_ms.to_string(),
            "health_failures" => self.health_failures.to_string(),
            "block_sync_lag" => self.block_sync_lag.to_string(),
            "arns_cache_hit_rate_min" => self.arns_cache_hit_rate_min.to_string(),
            "error_rate_threshold" => self.error_rate_threshold.to_string(),
            "error_rate_min_requests" => self.error_rate_min_requests.to_string(),
            "not_selected_epochs" => self.not_selected_epochs.to_string(),
            "low_observer_weight" => self.low_observer_weight.to_string(),
            "cooldown_minutes" => self.cooldown_minutes.to_string(),
            _ => return Err(ThresholdError::UnknownKey(key.to_string())),
        };
        Ok(value)
    }

    /// Writes one key by name. On a parse failure the current value is
    /// kept (never replaced by a default that could silently disable
    /// alerting).
    pub fn set(&mut self, key: &str, raw: &str) -> Result<(), ThresholdError> {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ThresholdError>
        where
            T::Err: std::fmt::Display,
        {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ThresholdError::InvalidValue {
                    key: key.to_string(),
                    value: raw.to_string(),
                    reason: e.to_string(),
                })
        }

        match key {
            "cpu_threshold" => self.cpu_threshold = parse(key, raw)?,
            "cpu_duration_minutes" => self.cpu_duration_minutes = parse(key, raw)?,
            "memory_threshold" => self.memory_threshold = parse(key, raw)?,
            "disk_threshold" => self.disk_threshold = parse(key, raw)?,
            "response_time_ms" => self.response_time_ms = parse(key, raw)?,
            "health_failures" => self.health_failures = parse(key, raw)?,
            "block_sync_lag" => self.block_sync_lag = parse(key, raw)?,
            "arns_cache_hit_rate_min" => self.arns_cache_hit_rate_min = parse(key, raw)?,
            "error_rate_threshold" => self.error_rate_threshold = parse(key, raw)?,
            "error_rate_min_requests" => self.error_rate_min_requests = parse(key, raw)?,
            "not_selected_epochs" => self.not_selected_epochs = parse(key, raw)?,
            "low_observer_weight" => self.low_observer_weight = parse(key, raw)?,
            "cooldown_minutes" => self.cooldown_minutes = parse(key, raw)?,
            _ => return Err(ThresholdError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Atomically overwrites the sensitivity subset of keys. Cadence and
    /// cooldown keys are untouched.
    pub fn apply_preset(&mut self, preset: Preset) {
        let (cpu, memory, disk, response, lag, error_rate, cache_min) = match preset {
            Preset::Relaxed => (90.0, 92.0, 95.0, 5000.0, 200, 10.0, 30.0),
            Preset::Balanced => (80.0, 85.0, 90.0, 2000.0, 50, 5.0, 50.0),
            Preset::Strict => (70.0, 75.0, 80.0, 1000.0, 20, 2.0, 70.0),
        };
        self.cpu_threshold = cpu;
        self.memory_threshold = memory;
        self.disk_threshold = disk;
        self.response_time_ms = response;
        self.block_sync_lag = lag;
        self.error_rate_threshold = error_rate;
        self.arns_cache_hit_rate_min = cache_min;
    }

    /// Loads persisted thresholds, falling back to defaults when the blob
    /// is missing or unreadable.
    pub fn load(store: &dyn RetentionStore) -> Self {
        match store.kv_get(keys::THRESHOLDS) {
            Ok(Some(blob)) => match serde_json::from_str(&blob) {
                Ok(thresholds) => thresholds,
                Err(e) => {
                    tracing::warn!(error = %e, "Stored thresholds unreadable, using defaults");
                    Self::default()
                }
            },
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored thresholds, using defaults");
                Self::default()
            }
        }
    }

    /// Persists the current thresholds.
    pub fn persist(&self, store: &dyn RetentionStore) -> Result<()> {
        let blob = serde_json::to_string(self)?;
        store.kv_put(keys::THRESHOLDS, &blob)
    }
}
