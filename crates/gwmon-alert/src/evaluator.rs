use crate::epoch::{EpochEvent, EpochTracker};
use crate::thresholds::Thresholds;
use crate::window::{
    resource_window, DeltaWindow, GaugeWindow, SelectionHistory, SELECTION_HISTORY_CAP,
};
use chrono::{DateTime, Duration, Utc};
use gwmon_common::types::{
    fmt_opt, fmt_opt_f1, AlertCandidate, AlertCategory, AlertKind, EpochStats, MetricSample,
    ObserverStatus, Severity,
};

/// Hours before the epoch deadline within which the report warning fires.
const REPORT_WARNING_HOURS: i64 = 12;

/// Severity escalation factor: a value this far past its threshold is
/// critical rather than warning.
const ESCALATION_FACTOR: f64 = 1.2;

/// Stateful rule evaluator.
///
/// Owns the sliding windows and epoch state; consumes one fresh sample
/// (plus the previous sample for counter deltas) per check cycle and
/// emits candidate alerts. Persists nothing itself. Windows and epoch
/// state are in-memory only and cold-start empty after a restart.
pub struct Evaluator {
    cpu: GaugeWindow,
    error_rate: DeltaWindow,
    selection: SelectionHistory,
    epoch: EpochTracker,
    consecutive_health_failures: u32,
    health_alerted: bool,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            cpu: GaugeWindow::new(resource_window()),
            error_rate: DeltaWindow::new(resource_window()),
            selection: SelectionHistory::new(SELECTION_HISTORY_CAP),
            epoch: EpochTracker::new(),
            consecutive_health_failures: 0,
            health_alerted: false,
        }
    }

    pub fn epoch_tracker(&self) -> &EpochTracker {
        &self.epoch
    }

    /// Evaluates a fresh sample against the configured thresholds.
    ///
    /// Rules whose inputs are absent from the sample are skipped for this
    /// cycle; absence never reads as zero.
    pub fn evaluate(
        &mut self,
        sample: &MetricSample,
        previous: Option<&MetricSample>,
        cfg: &Thresholds,
        now: DateTime<Utc>,
    ) -> Vec<AlertCandidate> {
        let mut out = Vec::new();

        self.check_health(sample, cfg, now, &mut out);
        self.check_sustained_cpu(sample, cfg, now, &mut out);
        self.check_instantaneous(sample, cfg, now, &mut out);
        self.check_block_sync(sample, cfg, now, &mut out);
        self.check_cache_hit_rate(sample, cfg, now, &mut out);
        self.check_error_rate(sample, previous, cfg, now, &mut out);

        out
    }

    /// Evaluates the observer/epoch view. `current_stats` describe the
    /// epoch in `status`; `previous_stats` describe the one before it
    /// (used for the "ended" summary on a transition). Either may be
    /// absent; summaries then fall back to placeholder text.
    pub fn evaluate_observer(
        &mut self,
        status: &ObserverStatus,
        current_stats: Option<&EpochStats>,
        previous_stats: Option<&EpochStats>,
        cfg: &Thresholds,
        now: DateTime<Utc>,
    ) -> Vec<AlertCandidate> {
        let mut out = Vec::new();

        let Some(epoch_index) = status.epoch_index else {
            return out;
        };

        let events = self.epoch.observe(
            epoch_index,
            status.selected,
            status.report_submitted,
            status.epoch_end,
            now,
        );

        for event in &events {
            match event {
                EpochEvent::Rolled { previous, current } => {
                    out.push(epoch_summary(
                        AlertKind::EpochEnded,
                        *previous,
                        previous_stats,
                        now,
                    ));
                    out.push(epoch_summary(
                        AlertKind::EpochStarted,
                        *current,
                        current_stats,
                        now,
                    ));
                }
                EpochEvent::ReportOverdue { epoch } => {
                    out.push(AlertCandidate {
                        kind: AlertKind::ObserverReportFailed,
                        category: Some(AlertCategory::Observer),
                        severity: Severity::Critical,
                        title: "Observer report missed".to_string(),
                        body: format!(
                            "Epoch {epoch}: the observation report was not submitted \
                             before the epoch deadline."
                        ),
                        timestamp: now,
                        threshold: None,
                    });
                }
            }
        }

        // Pre-deadline warning, once per epoch.
        if let Some(hours) = self.epoch.deadline_warning_due(
            status.epoch_end,
            REPORT_WARNING_HOURS,
            now,
        ) {
            out.push(AlertCandidate {
                kind: AlertKind::ObserverReportDue,
                category: Some(AlertCategory::Observer),
                severity: Severity::Warning,
                title: "Observer report not yet submitted".to_string(),
                body: format!(
                    "Epoch {epoch_index}: selected as observer with no report \
                     submitted and {hours:.1}h remaining before the deadline."
                ),
                timestamp: now,
                threshold: None,
            });
        }

        // Selection history grows only on epoch change; the streak check
        // runs only when an entry was actually appended.
        if let Some(selected) = status.selected {
            if self.selection.record(epoch_index, selected, now) {
                if let Some((first, last)) =
                    self.selection.trailing_unselected(cfg.not_selected_epochs)
                {
                    out.push(AlertCandidate {
                        kind: AlertKind::ObserverNotSelectedStreak,
                        category: Some(AlertCategory::Observer),
                        severity: Severity::Warning,
                        title: "Not selected as observer".to_string(),
                        body: format!(
                            "Not selected as observer for {} consecutive epochs \
                             ({first} through {last}).",
                            cfg.not_selected_epochs
                        ),
                        timestamp: now,
                        threshold: None,
                    });
                }
            }
        }

        if let Some(weight) = status.weight {
            if weight < cfg.low_observer_weight {
                out.push(AlertCandidate {
                    kind: AlertKind::ObserverWeightLow,
                    category: Some(AlertCategory::Observer),
                    severity: Severity::Warning,
                    title: "Observer weight is low".to_string(),
                    body: format!(
                        "Observer weight {weight:.3} is below the configured minimum of {:.3}.",
                        cfg.low_observer_weight
                    ),
                    timestamp: now,
                    threshold: Some(cfg.low_observer_weight),
                });
            }
        }

        out
    }

    fn check_health(
        &mut self,
        sample: &MetricSample,
        cfg: &Thresholds,
        now: DateTime<Utc>,
        out: &mut Vec<AlertCandidate>,
    ) {
        let Some(healthy) = sample.healthy else {
            return;
        };

        if healthy {
            if self.health_alerted {
                out.push(AlertCandidate {
                    kind: AlertKind::GatewayRecovered,
                    category: Some(AlertCategory::Health),
                    severity: Severity::Info,
                    title: "Gateway recovered".to_string(),
                    body: format!(
                        "Gateway is responding again after {} failed health checks.",
                        self.consecutive_health_failures
                    ),
                    timestamp: now,
                    threshold: None,
                });
            }
            self.consecutive_health_failures = 0;
            self.health_alerted = false;
            return;
        }

        self.consecutive_health_failures = self.consecutive_health_failures.saturating_add(1);
        if self.consecutive_health_failures >= cfg.health_failures && !self.health_alerted {
            self.health_alerted = true;
            out.push(AlertCandidate {
                kind: AlertKind::GatewayDown,
                category: Some(AlertCategory::Health),
                severity: Severity::Critical,
                title: "Gateway is down".to_string(),
                body: format!(
                    "Health check failed {} times in a row.",
                    self.consecutive_health_failures
                ),
                timestamp: now,
                threshold: Some(f64::from(cfg.health_failures)),
            });
        }
    }

    fn check_sustained_cpu(
        &mut self,
        sample: &MetricSample,
        cfg: &Thresholds,
        now: DateTime<Utc>,
        out: &mut Vec<AlertCandidate>,
    ) {
        let Some(cpu) = sample.cpu_percent else {
            return;
        };

        self.cpu.push(cpu, now);

        if cpu < cfg.cpu_threshold {
            return;
        }

        let span = Duration::minutes(i64::from(cfg.cpu_duration_minutes));
        let recent = self.cpu.window_since(span, now);

        // One sample per minute over the whole duration, every one of
        // them at or above the threshold. A single spike never fires.
        let need = cfg.cpu_duration_minutes as usize;
        if recent.len() < need {
            return;
        }
        if recent.iter().any(|p| p.value < cfg.cpu_threshold) {
            return;
        }

        out.push(AlertCandidate {
            kind: AlertKind::SustainedCpu,
            category: Some(AlertCategory::Resources),
            severity: escalate(cpu, cfg.cpu_threshold),
            title: "CPU usage sustained".to_string(),
            body: format!(
                "CPU usage has stayed at or above {:.1}% for {} minutes (currently {:.1}%).",
                cfg.cpu_threshold, cfg.cpu_duration_minutes, cpu
            ),
            timestamp: now,
            threshold: Some(cfg.cpu_threshold),
        });
    }

    fn check_instantaneous(
        &self,
        sample: &MetricSample,
        cfg: &Thresholds,
        now: DateTime<Utc>,
        out: &mut Vec<AlertCandidate>,
    ) {
        if let Some(memory) = sample.memory_percent {
            if memory > cfg.memory_threshold {
                out.push(AlertCandidate {
                    kind: AlertKind::MemoryHigh,
                    category: Some(AlertCategory::Resources),
                    severity: escalate(memory, cfg.memory_threshold),
                    title: "Memory usage high".to_string(),
                    body: format!(
                        "Memory usage {memory:.1}% is above the {:.1}% threshold.",
                        cfg.memory_threshold
                    ),
                    timestamp: now,
                    threshold: Some(cfg.memory_threshold),
                });
            }
        }

        if let Some(disk) = sample.disk_percent {
            if disk > cfg.disk_threshold {
                out.push(AlertCandidate {
                    kind: AlertKind::DiskHigh,
                    category: Some(AlertCategory::Resources),
                    severity: escalate(disk, cfg.disk_threshold),
                    title: "Disk usage high".to_string(),
                    body: format!(
                        "Disk usage {disk:.1}% is above the {:.1}% threshold.",
                        cfg.disk_threshold
                    ),
                    timestamp: now,
                    threshold: Some(cfg.disk_threshold),
                });
            }
        }

        if let Some(response) = sample.response_time_ms {
            if response > cfg.response_time_ms {
                out.push(AlertCandidate {
                    kind: AlertKind::ResponseTimeSlow,
                    category: Some(AlertCategory::Performance),
                    severity: escalate(response, cfg.response_time_ms),
                    title: "Slow response time".to_string(),
                    body: format!(
                        "Health probe took {response:.0}ms (threshold: {:.0}ms).",
                        cfg.response_time_ms
                    ),
                    timestamp: now,
                    threshold: Some(cfg.response_time_ms),
                });
            }
        }
    }

    fn check_block_sync(
        &self,
        sample: &MetricSample,
        cfg: &Thresholds,
        now: DateTime<Utc>,
        out: &mut Vec<AlertCandidate>,
    ) {
        let Some(lag) = sample.height_difference else {
            return;
        };
        if lag <= cfg.block_sync_lag {
            return;
        }

        out.push(AlertCandidate {
            kind: AlertKind::BlockSyncLag,
            category: Some(AlertCategory::BlockSync),
            severity: escalate(lag as f64, cfg.block_sync_lag as f64),
            title: "Block sync lagging".to_string(),
            body: format!(
                "Gateway is {lag} blocks behind the network (threshold: {}; imported: {}, network: {}).",
                cfg.block_sync_lag,
                fmt_opt(sample.last_height_imported),
                fmt_opt(sample.current_network_height),
            ),
            timestamp: now,
            threshold: Some(cfg.block_sync_lag as f64),
        });
    }

    fn check_cache_hit_rate(
        &self,
        sample: &MetricSample,
        cfg: &Thresholds,
        now: DateTime<Utc>,
        out: &mut Vec<AlertCandidate>,
    ) {
        let Some(rate) = sample.arns_cache_hit_rate_percent else {
            return;
        };
        // Inverted comparison: a low hit rate is the bad direction.
        if rate >= cfg.arns_cache_hit_rate_min {
            return;
        }

        out.push(AlertCandidate {
            kind: AlertKind::ArnsCacheHitRateLow,
            category: Some(AlertCategory::Performance),
            severity: Severity::Warning,
            title: "ArNS cache hit rate low".to_string(),
            body: format!(
                "ArNS cache hit rate {rate:.1}% is below the {:.1}% minimum.",
                cfg.arns_cache_hit_rate_min
            ),
            timestamp: now,
            threshold: Some(cfg.arns_cache_hit_rate_min),
        });
    }

    fn check_error_rate(
        &mut self,
        sample: &MetricSample,
        previous: Option<&MetricSample>,
        cfg: &Thresholds,
        now: DateTime<Utc>,
        out: &mut Vec<AlertCandidate>,
    ) {
        let (Some(prev), Some(errors), Some(requests)) =
            (previous, sample.arns_errors, sample.arns_resolutions)
        else {
            return;
        };
        let (Some(prev_errors), Some(prev_requests)) = (prev.arns_errors, prev.arns_resolutions)
        else {
            return;
        };

        let errors_delta = errors as i64 - prev_errors as i64;
        let requests_delta = requests as i64 - prev_requests as i64;

        // A decreasing counter means the provider restarted. Discard the
        // whole smoothing window so stale deltas are not averaged in, and
        // skip this interval entirely.
        if errors_delta < 0 || requests_delta < 0 {
            tracing::debug!(
                errors_delta,
                requests_delta,
                "Counter reset detected, clearing error-rate window"
            );
            self.error_rate.clear();
            return;
        }

        if requests_delta > 0 {
            self.error_rate
                .push(errors_delta as u64, requests_delta as u64, now);
        } else {
            self.error_rate.evict(now);
        }

        let (total_errors, total_requests) = self.error_rate.totals();
        if total_requests < cfg.error_rate_min_requests {
            return;
        }

        let rate = total_errors as f64 / total_requests as f64 * 100.0;
        if rate > cfg.error_rate_threshold {
            out.push(AlertCandidate {
                kind: AlertKind::ErrorRateHigh,
                category: Some(AlertCategory::Performance),
                severity: escalate(rate, cfg.error_rate_threshold),
                title: "ArNS error rate high".to_string(),
                body: format!(
                    "ArNS error rate {rate:.1}% over the last {} requests exceeds {:.1}%.",
                    total_requests, cfg.error_rate_threshold
                ),
                timestamp: now,
                threshold: Some(cfg.error_rate_threshold),
            });
        }
    }
}

/// Uniform hysteresis rule: past 1.2x the threshold the alert escalates
/// from warning to critical.
fn escalate(value: f64, threshold: f64) -> Severity {
    if value >= threshold * ESCALATION_FACTOR {
        Severity::Critical
    } else {
        Severity::Warning
    }
}

/// Builds an epoch ended/started informational summary. Missing stats
/// render as placeholders; partial external data never panics.
fn epoch_summary(
    kind: AlertKind,
    epoch_index: u64,
    stats: Option<&EpochStats>,
    now: DateTime<Utc>,
) -> AlertCandidate {
    let (title, lead) = match kind {
        AlertKind::EpochEnded => (
            format!("Epoch {epoch_index} ended"),
            format!("Epoch {epoch_index} has ended."),
        ),
        _ => (
            format!("Epoch {epoch_index} started"),
            format!("Epoch {epoch_index} has started."),
        ),
    };

    let body = match stats {
        Some(stats) => format!(
            "{lead}\nRewards distributed: {}\nEligible gateways: {}\nObserved gateways: {}\nPass rate: {}%\nPrescribed observers: {}",
            fmt_opt_f1(stats.total_rewards),
            fmt_opt(stats.eligible_gateways),
            fmt_opt(stats.observed_gateways),
            fmt_opt_f1(stats.passed_percent),
            fmt_opt(stats.prescribed_count),
        ),
        None => format!("{lead}\nData unavailable."),
    };

    AlertCandidate {
        kind,
        category: Some(AlertCategory::Epoch),
        severity: Severity::Info,
        title,
        body,
        timestamp: now,
        threshold: None,
    }
}
