use crate::config::DaemonConfig;
use crate::providers::{EpochProvider, MetricsProvider};
use crate::reports;
use chrono::{DateTime, Duration, Utc, Weekday};
use gwmon_alert::{AlertDispatcher, Evaluator, Thresholds};
use gwmon_common::types::{AlertCandidate, AlertCategory, AlertKind, EpochStats, Severity};
use gwmon_notify::NotificationChannel;
use gwmon_storage::RetentionStore;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::interval;

const EPOCH_STATS_SNAPSHOT_KIND: &str = "epoch_stats";

/// Mutable engine state shared by the check cycles. All mutations happen
/// behind one async lock and complete without yielding mid-mutation, so
/// no cycle ever observes a torn intermediate state.
struct Engine {
    evaluator: Evaluator,
    dispatcher: AlertDispatcher,
    thresholds: Thresholds,
    previous: Option<gwmon_common::types::MetricSample>,
}

/// One guard per periodic task: a cycle that outlives its interval is
/// skipped on the next tick instead of re-entered.
#[derive(Default)]
struct Guards {
    health: AtomicBool,
    metrics: AtomicBool,
    observer: AtomicBool,
    spot_check: AtomicBool,
}

pub struct Monitor {
    store: Arc<dyn RetentionStore>,
    metrics: Arc<dyn MetricsProvider>,
    epochs: Arc<dyn EpochProvider>,
    channel: Arc<dyn NotificationChannel>,
    engine: tokio::sync::Mutex<Engine>,
    guards: Guards,

    health_interval_secs: u64,
    metrics_interval_secs: u64,
    observer_interval_secs: u64,
    spot_check_interval_secs: u64,
    arns_names: Vec<String>,
    daily_report_hour: u32,
    weekly_report_weekday: Weekday,
    retention_days: u32,
}

impl Monitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &DaemonConfig,
        store: Arc<dyn RetentionStore>,
        metrics: Arc<dyn MetricsProvider>,
        epochs: Arc<dyn EpochProvider>,
        channel: Arc<dyn NotificationChannel>,
        evaluator: Evaluator,
        dispatcher: AlertDispatcher,
        thresholds: Thresholds,
    ) -> Self {
        let weekday = config
            .weekly_report_weekday
            .parse()
            .unwrap_or(Weekday::Sun);
        Self {
            store,
            metrics,
            epochs,
            channel,
            engine: tokio::sync::Mutex::new(Engine {
                evaluator,
                dispatcher,
                thresholds,
                previous: None,
            }),
            guards: Guards::default(),
            health_interval_secs: config.health_interval_secs,
            metrics_interval_secs: config.metrics_interval_secs,
            observer_interval_secs: config.observer_interval_secs,
            spot_check_interval_secs: config.spot_check_interval_secs,
            arns_names: config.arns_names.clone(),
            daily_report_hour: config.daily_report_hour,
            weekly_report_weekday: weekday,
            retention_days: config.retention_days,
        }
    }

    /// Spawns all periodic tasks and returns their handles.
    pub fn spawn_all(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        tracing::info!(
            health = self.health_interval_secs,
            metrics = self.metrics_interval_secs,
            observer = self.observer_interval_secs,
            "Monitor scheduler started"
        );

        let mut handles = Vec::new();

        let monitor = self.clone();
        handles.push(tokio::spawn(async move {
            let mut tick = interval(std::time::Duration::from_secs(monitor.health_interval_secs));
            loop {
                tick.tick().await;
                monitor.health_cycle().await;
            }
        }));

        let monitor = self.clone();
        handles.push(tokio::spawn(async move {
            let mut tick = interval(std::time::Duration::from_secs(monitor.metrics_interval_secs));
            loop {
                tick.tick().await;
                monitor.metrics_cycle().await;
            }
        }));

        let monitor = self.clone();
        handles.push(tokio::spawn(async move {
            let mut tick =
                interval(std::time::Duration::from_secs(monitor.observer_interval_secs));
            loop {
                tick.tick().await;
                monitor.observer_cycle().await;
            }
        }));

        if !self.arns_names.is_empty() {
            let monitor = self.clone();
            handles.push(tokio::spawn(async move {
                let mut tick = interval(std::time::Duration::from_secs(
                    monitor.spot_check_interval_secs,
                ));
                loop {
                    tick.tick().await;
                    monitor.spot_check_cycle().await;
                }
            }));
        }

        let monitor = self.clone();
        handles.push(tokio::spawn(async move {
            monitor.daily_report_loop().await;
        }));

        let monitor = self.clone();
        handles.push(tokio::spawn(async move {
            monitor.weekly_report_loop().await;
        }));

        handles
    }

    async fn health_cycle(&self) {
        if self.guards.health.swap(true, Ordering::SeqCst) {
            tracing::warn!("Previous health check still running, skipping tick");
            return;
        }

        let sample = self.metrics.probe_health().await;
        if let Err(e) = self.store.append_sample(&sample) {
            tracing::warn!(error = %e, "Failed to record health sample");
        }

        let now = Utc::now();
        let mut guard = self.engine.lock().await;
        let engine = &mut *guard;
        let cooldown = Duration::minutes(engine.thresholds.cooldown_minutes);
        let candidates = engine.evaluator.evaluate(&sample, None, &engine.thresholds, now);
        for candidate in &candidates {
            engine.dispatcher.dispatch(candidate, cooldown, now).await;
        }
        drop(guard);

        self.guards.health.store(false, Ordering::SeqCst);
    }

    async fn metrics_cycle(&self) {
        if self.guards.metrics.swap(true, Ordering::SeqCst) {
            tracing::warn!("Previous metrics check still running, skipping tick");
            return;
        }

        let sample = self.metrics.fetch_sample().await;
        if let Err(e) = self.store.append_sample(&sample) {
            tracing::warn!(error = %e, "Failed to record metric sample");
        }

        let now = Utc::now();
        let mut guard = self.engine.lock().await;
        let engine = &mut *guard;
        let cooldown = Duration::minutes(engine.thresholds.cooldown_minutes);
        let previous = engine.previous.clone();
        let candidates =
            engine
                .evaluator
                .evaluate(&sample, previous.as_ref(), &engine.thresholds, now);
        for candidate in &candidates {
            engine.dispatcher.dispatch(candidate, cooldown, now).await;
        }
        engine.previous = Some(sample);
        drop(guard);

        self.guards.metrics.store(false, Ordering::SeqCst);
    }

    async fn observer_cycle(&self) {
        if self.guards.observer.swap(true, Ordering::SeqCst) {
            tracing::warn!("Previous observer check still running, skipping tick");
            return;
        }

        let status = self.epochs.observer_status().await;

        let current_stats = match status.epoch_index {
            Some(index) => self.epochs.epoch_stats(index).await,
            None => None,
        };

        // Cache this epoch's stats so the "ended" summary has data once
        // the index rolls over.
        if let (Some(index), Some(stats)) = (status.epoch_index, current_stats.as_ref()) {
            match serde_json::to_string(stats) {
                Ok(blob) => {
                    if let Err(e) = self.store.snapshot_put(
                        EPOCH_STATS_SNAPSHOT_KIND,
                        &index.to_string(),
                        &blob,
                    ) {
                        tracing::warn!(error = %e, "Failed to snapshot epoch stats");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to serialize epoch stats"),
            }
        }

        let previous_stats: Option<EpochStats> = status
            .epoch_index
            .and_then(|index| index.checked_sub(1))
            .and_then(|prev| {
                self.store
                    .snapshot_get(EPOCH_STATS_SNAPSHOT_KIND, &prev.to_string())
                    .ok()
                    .flatten()
            })
            .and_then(|blob| serde_json::from_str(&blob).ok());

        let now = Utc::now();
        let mut guard = self.engine.lock().await;
        let engine = &mut *guard;
        let cooldown = Duration::minutes(engine.thresholds.cooldown_minutes);
        let candidates = engine.evaluator.evaluate_observer(
            &status,
            current_stats.as_ref(),
            previous_stats.as_ref(),
            &engine.thresholds,
            now,
        );
        for candidate in &candidates {
            engine.dispatcher.dispatch(candidate, cooldown, now).await;
        }
        drop(guard);

        self.guards.observer.store(false, Ordering::SeqCst);
    }

    /// Probes one randomly chosen ArNS name per tick.
    async fn spot_check_cycle(&self) {
        if self.guards.spot_check.swap(true, Ordering::SeqCst) {
            tracing::warn!("Previous ArNS spot check still running, skipping tick");
            return;
        }

        let index = rand::thread_rng().gen_range(0..self.arns_names.len());
        let name = &self.arns_names[index];

        match self.metrics.resolve_arns(name).await {
            Ok(elapsed_ms) => {
                tracing::debug!(name = %name, elapsed_ms, "ArNS spot check resolved");
                let now = Utc::now();
                let mut engine = self.engine.lock().await;
                if elapsed_ms > engine.thresholds.response_time_ms {
                    let cooldown = Duration::minutes(engine.thresholds.cooldown_minutes);
                    let candidate = AlertCandidate {
                        kind: AlertKind::ResponseTimeSlow,
                        category: Some(AlertCategory::Performance),
                        severity: Severity::Warning,
                        title: "Slow ArNS resolution".to_string(),
                        body: format!(
                            "Resolving '{name}' took {elapsed_ms:.0}ms (threshold: {:.0}ms).",
                            engine.thresholds.response_time_ms
                        ),
                        timestamp: now,
                        threshold: Some(engine.thresholds.response_time_ms),
                    };
                    engine.dispatcher.dispatch(&candidate, cooldown, now).await;
                }
            }
            Err(reason) => {
                let now = Utc::now();
                let mut engine = self.engine.lock().await;
                let cooldown = Duration::minutes(engine.thresholds.cooldown_minutes);
                let candidate = AlertCandidate {
                    kind: AlertKind::ArnsResolutionFailed,
                    category: Some(AlertCategory::Performance),
                    severity: Severity::Warning,
                    title: "ArNS resolution failed".to_string(),
                    body: format!("Failed to resolve '{name}': {reason}"),
                    timestamp: now,
                    threshold: None,
                };
                engine.dispatcher.dispatch(&candidate, cooldown, now).await;
            }
        }

        self.guards.spot_check.store(false, Ordering::SeqCst);
    }

    /// Fires the daily report at the configured UTC hour. The target is
    /// recomputed after every run; occurrences missed while the process
    /// was down are skipped, not queued.
    async fn daily_report_loop(&self) {
        loop {
            let target = next_daily(Utc::now(), self.daily_report_hour);
            sleep_until(target).await;

            if let Err(e) =
                reports::send_daily_report(self.store.as_ref(), self.channel.as_ref(), Utc::now())
                    .await
            {
                tracing::warn!(error = %e, "Daily report failed");
            }
        }
    }

    /// Weekly report plus the retention rollup: prune past the horizon,
    /// then the explicit compaction pass.
    async fn weekly_report_loop(&self) {
        loop {
            let target = next_weekly(
                Utc::now(),
                self.weekly_report_weekday,
                self.daily_report_hour,
            );
            sleep_until(target).await;

            if let Err(e) =
                reports::send_weekly_report(self.store.as_ref(), self.channel.as_ref(), Utc::now())
                    .await
            {
                tracing::warn!(error = %e, "Weekly report failed");
            }

            let horizon = Utc::now() - Duration::days(i64::from(self.retention_days));
            match self.store.prune_older_than(horizon) {
                Ok(removed) => {
                    tracing::info!(removed, retention_days = self.retention_days, "Pruned history");
                    if let Err(e) = self.store.compact() {
                        tracing::warn!(error = %e, "Compaction failed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Prune failed"),
            }
        }
    }
}

async fn sleep_until(target: DateTime<Utc>) {
    let wait = (target - Utc::now())
        .to_std()
        .unwrap_or(std::time::Duration::ZERO);
    tokio::time::sleep(wait).await;
}

/// Next wall-clock occurrence of `hour:00` UTC strictly after `now`.
fn next_daily(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let hour = hour.min(23);
    let today = now
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .map(|dt| dt.and_utc());
    match today {
        Some(today) if today > now => today,
        Some(today) => today + Duration::days(1),
        None => now + Duration::days(1),
    }
}

/// Next occurrence of `weekday` at `hour:00` UTC strictly after `now`.
fn next_weekly(now: DateTime<Utc>, weekday: Weekday, hour: u32) -> DateTime<Utc> {
    let mut day = now.date_naive();
    for _ in 0..8 {
        if day.weekday() == weekday {
            if let Some(candidate) = day.and_hms_opt(hour.min(23), 0, 0) {
                let candidate = candidate.and_utc();
                if candidate > now {
                    return candidate;
                }
            }
        }
        day += Duration::days(1);
    }
    now + Duration::days(7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn next_daily_picks_today_before_hour() {
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 6, 30, 0).unwrap();
        let target = next_daily(now, 8);
        assert_eq!(target.hour(), 8);
        assert_eq!(target.day(), 2);
    }

    #[test]
    fn next_daily_rolls_to_tomorrow_after_hour() {
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let target = next_daily(now, 8);
        assert_eq!(target.day(), 3);
        assert!(target > now);
    }

    #[test]
    fn next_weekly_lands_on_requested_weekday() {
        // 2025-06-02 is a Monday.
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        let target = next_weekly(now, Weekday::Sun, 8);
        assert_eq!(target.weekday(), Weekday::Sun);
        assert_eq!(target.day(), 8);
        assert!(target > now);
    }

    #[test]
    fn next_weekly_skips_past_occurrence_same_day() {
        // Monday after the report hour: next Monday, not today.
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        let target = next_weekly(now, Weekday::Mon, 8);
        assert_eq!(target.weekday(), Weekday::Mon);
        assert_eq!(target.day(), 9);
    }
}
