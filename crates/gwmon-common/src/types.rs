use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use gwmon_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert_eq!(sev.to_string(), "warning");
/// assert!(Severity::Critical > Severity::Info);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Coarse alert family used for category-scoped mutes and cooldown keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Health,
    Resources,
    Performance,
    BlockSync,
    Observer,
    Epoch,
}

impl std::fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertCategory::Health => "health",
            AlertCategory::Resources => "resources",
            AlertCategory::Performance => "performance",
            AlertCategory::BlockSync => "block_sync",
            AlertCategory::Observer => "observer",
            AlertCategory::Epoch => "epoch",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AlertCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "health" => Ok(AlertCategory::Health),
            "resources" => Ok(AlertCategory::Resources),
            "performance" => Ok(AlertCategory::Performance),
            "block_sync" | "blocksync" => Ok(AlertCategory::BlockSync),
            "observer" => Ok(AlertCategory::Observer),
            "epoch" => Ok(AlertCategory::Epoch),
            _ => Err(format!("unknown alert category: {s}")),
        }
    }
}

/// Identifies which rule produced an alert candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    GatewayDown,
    GatewayRecovered,
    SustainedCpu,
    MemoryHigh,
    DiskHigh,
    ResponseTimeSlow,
    BlockSyncLag,
    ArnsCacheHitRateLow,
    ArnsResolutionFailed,
    ErrorRateHigh,
    ObserverReportDue,
    ObserverReportFailed,
    ObserverNotSelectedStreak,
    ObserverWeightLow,
    EpochEnded,
    EpochStarted,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertKind::GatewayDown => "gateway_down",
            AlertKind::GatewayRecovered => "gateway_recovered",
            AlertKind::SustainedCpu => "sustained_cpu",
            AlertKind::MemoryHigh => "memory_high",
            AlertKind::DiskHigh => "disk_high",
            AlertKind::ResponseTimeSlow => "response_time_slow",
            AlertKind::BlockSyncLag => "block_sync_lag",
            AlertKind::ArnsCacheHitRateLow => "arns_cache_hit_rate_low",
            AlertKind::ArnsResolutionFailed => "arns_resolution_failed",
            AlertKind::ErrorRateHigh => "error_rate_high",
            AlertKind::ObserverReportDue => "observer_report_due",
            AlertKind::ObserverReportFailed => "observer_report_failed",
            AlertKind::ObserverNotSelectedStreak => "observer_not_selected_streak",
            AlertKind::ObserverWeightLow => "observer_weight_low",
            AlertKind::EpochEnded => "epoch_ended",
            AlertKind::EpochStarted => "epoch_started",
        };
        write!(f, "{s}")
    }
}

/// One point-in-time reading of the gateway.
///
/// Every field except the timestamp is optional: absence means the value
/// was unavailable this cycle (provider failure, partial payload, or a
/// probe that does not produce that field). Counters are non-decreasing
/// unless the gateway restarted; consumers must treat a decrease as a
/// reset, never as a negative delta.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,

    // Health probe
    pub healthy: Option<bool>,
    pub response_time_ms: Option<f64>,

    // Resource gauges
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub uptime_seconds: Option<u64>,

    // Monotonic counters
    pub http_requests_total: Option<u64>,
    pub arns_resolutions: Option<u64>,
    pub arns_errors: Option<u64>,
    pub graphql_requests_total: Option<u64>,

    // Derived gauge
    pub arns_cache_hit_rate_percent: Option<f64>,

    // Block sync
    pub last_height_imported: Option<i64>,
    pub current_network_height: Option<i64>,
    pub height_difference: Option<i64>,

    // Observer
    pub observer_selected: Option<bool>,
    pub observer_report_submitted: Option<bool>,
    pub observer_weight: Option<f64>,
}

impl MetricSample {
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }
}

/// An alert produced by the evaluator, not yet deduplicated or persisted.
///
/// `threshold` is set on resource/performance candidates and drives the
/// cooldown key: two candidates crossing the same threshold share one
/// cooldown regardless of the fluctuating current value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertCandidate {
    pub kind: AlertKind,
    pub category: Option<AlertCategory>,
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub threshold: Option<f64>,
}

/// A persisted alert outcome. Written for every candidate that passes
/// cooldown, including those later suppressed by a mute, so history
/// reflects true event occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub category: Option<AlertCategory>,
}

/// Provider-boundary view of the current reward epoch as it concerns this
/// gateway. Any field may be unavailable; absence is signaled by `None`,
/// never by a default of zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObserverStatus {
    pub epoch_index: Option<u64>,
    pub selected: Option<bool>,
    pub report_submitted: Option<bool>,
    pub weight: Option<f64>,
    pub epoch_end: Option<DateTime<Utc>>,
}

/// Aggregate statistics for one epoch, fetched from the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpochStats {
    pub total_rewards: Option<f64>,
    pub eligible_gateways: Option<u64>,
    pub observed_gateways: Option<u64>,
    pub passed_percent: Option<f64>,
    pub prescribed_count: Option<u64>,
}

/// Per-calendar-day rollup computed by the retention store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub day: NaiveDate,
    pub avg_cpu: Option<f64>,
    pub avg_memory: Option<f64>,
    pub total_requests: u64,
}

/// Render an optional value, falling back to `"N/A"` when absent.
///
/// # Examples
///
/// ```
/// use gwmon_common::types::fmt_opt;
///
/// assert_eq!(fmt_opt(Some(42)), "42");
/// assert_eq!(fmt_opt(None::<u64>), "N/A");
/// ```
pub fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "N/A".to_string(),
    }
}

/// Render an optional float with one decimal place, `"N/A"` when absent.
pub fn fmt_opt_f1(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}"),
        None => "N/A".to_string(),
    }
}
