use crate::engine::SqliteRetentionStore;
use crate::RetentionStore;
use chrono::{DateTime, Duration, Utc};
use gwmon_common::types::{AlertCategory, AlertRecord, MetricSample, Severity};
use tempfile::TempDir;

fn setup() -> (TempDir, SqliteRetentionStore) {
    let dir = TempDir::new().unwrap();
    let store = SqliteRetentionStore::open(&dir.path().join("gwmon.db")).unwrap();
    (dir, store)
}

fn make_sample(ts: DateTime<Utc>, cpu: f64, memory: f64, requests: u64) -> MetricSample {
    MetricSample {
        cpu_percent: Some(cpu),
        memory_percent: Some(memory),
        http_requests_total: Some(requests),
        ..MetricSample::at(ts)
    }
}

fn make_alert(ts: DateTime<Utc>, severity: Severity, title: &str) -> AlertRecord {
    AlertRecord {
        timestamp: ts,
        title: title.to_string(),
        message: format!("{title} detail"),
        severity,
        category: Some(AlertCategory::Resources),
    }
}

#[test]
fn append_and_query_samples_ordered() {
    let (_dir, store) = setup();
    let now = Utc::now();

    store
        .append_sample(&make_sample(now - Duration::seconds(20), 90.0, 50.0, 100))
        .unwrap();
    store
        .append_sample(&make_sample(now - Duration::seconds(10), 85.0, 55.0, 110))
        .unwrap();
    store.append_sample(&make_sample(now, 80.0, 60.0, 120)).unwrap();

    let results = store.samples_since(now - Duration::minutes(1)).unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].timestamp <= results[1].timestamp);
    assert_eq!(results[2].cpu_percent, Some(80.0));
}

#[test]
fn samples_since_excludes_older() {
    let (_dir, store) = setup();
    let now = Utc::now();

    store
        .append_sample(&make_sample(now - Duration::hours(2), 10.0, 10.0, 1))
        .unwrap();
    store.append_sample(&make_sample(now, 20.0, 20.0, 2)).unwrap();

    let results = store.samples_since(now - Duration::hours(1)).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].cpu_percent, Some(20.0));
}

#[test]
fn latest_sample_returns_newest() {
    let (_dir, store) = setup();
    let now = Utc::now();

    assert!(store.latest_sample().unwrap().is_none());

    store
        .append_sample(&make_sample(now - Duration::seconds(30), 10.0, 10.0, 1))
        .unwrap();
    store.append_sample(&make_sample(now, 42.0, 43.0, 2)).unwrap();

    let latest = store.latest_sample().unwrap().unwrap();
    assert_eq!(latest.cpu_percent, Some(42.0));
}

#[test]
fn optional_fields_survive_roundtrip() {
    let (_dir, store) = setup();
    let now = Utc::now();

    let sample = MetricSample {
        healthy: Some(true),
        height_difference: Some(12),
        observer_selected: Some(false),
        ..MetricSample::at(now)
    };
    store.append_sample(&sample).unwrap();

    let latest = store.latest_sample().unwrap().unwrap();
    assert_eq!(latest.healthy, Some(true));
    assert_eq!(latest.height_difference, Some(12));
    assert_eq!(latest.observer_selected, Some(false));
    assert!(latest.cpu_percent.is_none());
    assert!(latest.arns_errors.is_none());
}

#[test]
fn daily_averages_group_by_calendar_day() {
    let (_dir, store) = setup();
    let now = Utc::now();
    let yesterday = now - Duration::days(1);

    // Yesterday: cpu 40/60, requests counter 100 -> 300
    store
        .append_sample(&make_sample(yesterday - Duration::minutes(5), 40.0, 30.0, 100))
        .unwrap();
    store
        .append_sample(&make_sample(yesterday, 60.0, 50.0, 300))
        .unwrap();
    // Today: cpu 80
    store.append_sample(&make_sample(now, 80.0, 70.0, 500)).unwrap();

    let aggregates = store.daily_averages(3).unwrap();
    assert_eq!(aggregates.len(), 2);

    let first = &aggregates[0];
    assert_eq!(first.day, yesterday.date_naive());
    assert_eq!(first.avg_cpu, Some(50.0));
    assert_eq!(first.avg_memory, Some(40.0));
    assert_eq!(first.total_requests, 200);

    let second = &aggregates[1];
    assert_eq!(second.day, now.date_naive());
    assert_eq!(second.avg_cpu, Some(80.0));
    assert_eq!(second.total_requests, 0);
}

#[test]
fn daily_averages_tolerate_missing_gauges() {
    let (_dir, store) = setup();
    let now = Utc::now();

    store
        .append_sample(&MetricSample {
            healthy: Some(true),
            ..MetricSample::at(now)
        })
        .unwrap();

    let aggregates = store.daily_averages(1).unwrap();
    assert_eq!(aggregates.len(), 1);
    assert!(aggregates[0].avg_cpu.is_none());
    assert_eq!(aggregates[0].total_requests, 0);
}

#[test]
fn alert_history_roundtrip() {
    let (_dir, store) = setup();
    let now = Utc::now();

    store
        .append_alert(&make_alert(now - Duration::minutes(2), Severity::Warning, "CPU high"))
        .unwrap();
    store
        .append_alert(&make_alert(now, Severity::Critical, "Disk full"))
        .unwrap();

    let history = store
        .alert_history(now - Duration::hours(1), now + Duration::seconds(1), 50)
        .unwrap();
    assert_eq!(history.len(), 2);
    // Newest first
    assert_eq!(history[0].title, "Disk full");
    assert_eq!(history[0].severity, Severity::Critical);
    assert_eq!(history[0].category, Some(AlertCategory::Resources));
}

#[test]
fn alert_history_respects_limit() {
    let (_dir, store) = setup();
    let now = Utc::now();

    for i in 0..5 {
        store
            .append_alert(&make_alert(
                now - Duration::seconds(i),
                Severity::Info,
                &format!("alert {i}"),
            ))
            .unwrap();
    }

    let history = store
        .alert_history(now - Duration::hours(1), now + Duration::seconds(1), 3)
        .unwrap();
    assert_eq!(history.len(), 3);
}

#[test]
fn alert_counts_grouped_by_severity() {
    let (_dir, store) = setup();
    let now = Utc::now();

    store
        .append_alert(&make_alert(now, Severity::Warning, "a"))
        .unwrap();
    store
        .append_alert(&make_alert(now, Severity::Warning, "b"))
        .unwrap();
    store
        .append_alert(&make_alert(now, Severity::Critical, "c"))
        .unwrap();

    let counts = store
        .alert_counts_by_severity(now - Duration::hours(1), now + Duration::seconds(1))
        .unwrap();
    assert_eq!(counts.get("warning"), Some(&2));
    assert_eq!(counts.get("critical"), Some(&1));
    assert_eq!(counts.get("info"), None);
}

#[test]
fn prune_removes_old_rows_and_compact_succeeds() {
    let (_dir, store) = setup();
    let now = Utc::now();

    store
        .append_sample(&make_sample(now - Duration::days(10), 10.0, 10.0, 1))
        .unwrap();
    store.append_sample(&make_sample(now, 20.0, 20.0, 2)).unwrap();
    store
        .append_alert(&make_alert(now - Duration::days(10), Severity::Info, "old"))
        .unwrap();
    store
        .append_alert(&make_alert(now, Severity::Info, "new"))
        .unwrap();

    let removed = store.prune_older_than(now - Duration::days(7)).unwrap();
    assert_eq!(removed, 2);

    let samples = store.samples_since(now - Duration::days(30)).unwrap();
    assert_eq!(samples.len(), 1);
    let history = store
        .alert_history(now - Duration::days(30), now + Duration::seconds(1), 50)
        .unwrap();
    assert_eq!(history.len(), 1);

    store.compact().unwrap();
}

#[test]
fn kv_roundtrip_and_delete() {
    let (_dir, store) = setup();

    assert!(store.kv_get("thresholds").unwrap().is_none());

    store.kv_put("thresholds", "{\"cpu\":80}").unwrap();
    assert_eq!(
        store.kv_get("thresholds").unwrap().as_deref(),
        Some("{\"cpu\":80}")
    );

    // Overwrite
    store.kv_put("thresholds", "{\"cpu\":85}").unwrap();
    assert_eq!(
        store.kv_get("thresholds").unwrap().as_deref(),
        Some("{\"cpu\":85}")
    );

    store.kv_delete("thresholds").unwrap();
    assert!(store.kv_get("thresholds").unwrap().is_none());
}

#[test]
fn snapshot_upsert_and_get() {
    let (_dir, store) = setup();

    assert!(store.snapshot_get("epoch_stats", "41").unwrap().is_none());

    store
        .snapshot_put("epoch_stats", "41", "{\"total_rewards\":10}")
        .unwrap();
    store
        .snapshot_put("epoch_stats", "41", "{\"total_rewards\":12}")
        .unwrap();

    assert_eq!(
        store.snapshot_get("epoch_stats", "41").unwrap().as_deref(),
        Some("{\"total_rewards\":12}")
    );
    // Distinct kind does not collide
    assert!(store.snapshot_get("gateway_info", "41").unwrap().is_none());
}
