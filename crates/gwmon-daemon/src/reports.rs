use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use gwmon_common::types::{fmt_opt_f1, DailyAggregate};
use gwmon_notify::NotificationChannel;
use gwmon_storage::RetentionStore;
use std::collections::HashMap;

fn severity_count(counts: &HashMap<String, u64>, severity: &str) -> u64 {
    counts.get(severity).copied().unwrap_or(0)
}

fn alert_summary_line(counts: &HashMap<String, u64>) -> String {
    format!(
        "Alerts: {} critical, {} warning, {} info",
        severity_count(counts, "critical"),
        severity_count(counts, "warning"),
        severity_count(counts, "info"),
    )
}

fn format_daily_report(aggregate: &DailyAggregate, counts: &HashMap<String, u64>) -> String {
    format!(
        "\u{1f4c5} <b>Daily report for {}</b>\n\
         Avg CPU: {}%\n\
         Avg memory: {}%\n\
         HTTP requests: {}\n\
         {}",
        aggregate.day,
        fmt_opt_f1(aggregate.avg_cpu),
        fmt_opt_f1(aggregate.avg_memory),
        aggregate.total_requests,
        alert_summary_line(counts),
    )
}

fn format_weekly_report(aggregates: &[DailyAggregate], counts: &HashMap<String, u64>) -> String {
    let mut lines = vec!["\u{1f4ca} <b>Weekly report</b>".to_string()];
    for aggregate in aggregates {
        lines.push(format!(
            "{}: cpu {}%, mem {}%, {} requests",
            aggregate.day,
            fmt_opt_f1(aggregate.avg_cpu),
            fmt_opt_f1(aggregate.avg_memory),
            aggregate.total_requests,
        ));
    }
    lines.push(alert_summary_line(counts));
    lines.join("\n")
}

/// Sends yesterday's rollup through the channel. Skips quietly when the
/// store holds no samples for that day.
pub async fn send_daily_report(
    store: &dyn RetentionStore,
    channel: &dyn NotificationChannel,
    now: DateTime<Utc>,
) -> Result<()> {
    let yesterday = (now - Duration::days(1)).date_naive();
    let aggregates = store.daily_averages(2)?;
    let Some(aggregate) = aggregates.iter().find(|a| a.day == yesterday) else {
        tracing::info!(day = %yesterday, "No samples for the daily report, skipping");
        return Ok(());
    };

    let day_start = yesterday
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now - Duration::days(1));
    let counts = store.alert_counts_by_severity(day_start, day_start + Duration::days(1))?;

    channel
        .send(&format_daily_report(aggregate, &counts), &[])
        .await?;
    tracing::info!(day = %yesterday, "Daily report sent");
    Ok(())
}

/// Sends the 7-day rollup through the channel. Skips quietly when the
/// store holds no samples for the week.
pub async fn send_weekly_report(
    store: &dyn RetentionStore,
    channel: &dyn NotificationChannel,
    now: DateTime<Utc>,
) -> Result<()> {
    let aggregates = store.daily_averages(7)?;
    if aggregates.is_empty() {
        tracing::info!("No samples for the weekly report, skipping");
        return Ok(());
    }

    let counts = store.alert_counts_by_severity(now - Duration::days(7), now)?;

    channel
        .send(&format_weekly_report(&aggregates, &counts), &[])
        .await?;
    tracing::info!(days = aggregates.len(), "Weekly report sent");
    Ok(())
}
