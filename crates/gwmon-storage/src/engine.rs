use crate::RetentionStore;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use gwmon_common::types::{AlertRecord, DailyAggregate, MetricSample};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS samples (
    timestamp_ms INTEGER NOT NULL,
    healthy INTEGER,
    response_time_ms REAL,
    cpu_percent REAL,
    memory_percent REAL,
    disk_percent REAL,
    uptime_seconds INTEGER,
    http_requests_total INTEGER,
    arns_resolutions INTEGER,
    arns_errors INTEGER,
    graphql_requests_total INTEGER,
    arns_cache_hit_rate_percent REAL,
    last_height_imported INTEGER,
    current_network_height INTEGER,
    height_difference INTEGER,
    observer_selected INTEGER,
    observer_report_submitted INTEGER,
    observer_weight REAL
);
CREATE INDEX IF NOT EXISTS idx_samples_time ON samples(timestamp_ms);

CREATE TABLE IF NOT EXISTS alert_events (
    timestamp_ms INTEGER NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    severity TEXT NOT NULL,
    category TEXT
);
CREATE INDEX IF NOT EXISTS idx_alerts_time ON alert_events(timestamp_ms);
CREATE INDEX IF NOT EXISTS idx_alerts_severity ON alert_events(severity);

CREATE TABLE IF NOT EXISTS kv_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshots (
    kind TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at_ms INTEGER NOT NULL,
    PRIMARY KEY (kind, key)
);
";

pub struct SqliteRetentionStore {
    conn: Mutex<Connection>,
}

impl SqliteRetentionStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn sample_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MetricSample> {
    let ts_ms: i64 = row.get(0)?;
    Ok(MetricSample {
        timestamp: DateTime::from_timestamp_millis(ts_ms).unwrap_or_default(),
        healthy: row.get(1)?,
        response_time_ms: row.get(2)?,
        cpu_percent: row.get(3)?,
        memory_percent: row.get(4)?,
        disk_percent: row.get(5)?,
        uptime_seconds: row.get::<_, Option<i64>>(6)?.map(|v| v.max(0) as u64),
        http_requests_total: row.get::<_, Option<i64>>(7)?.map(|v| v.max(0) as u64),
        arns_resolutions: row.get::<_, Option<i64>>(8)?.map(|v| v.max(0) as u64),
        arns_errors: row.get::<_, Option<i64>>(9)?.map(|v| v.max(0) as u64),
        graphql_requests_total: row.get::<_, Option<i64>>(10)?.map(|v| v.max(0) as u64),
        arns_cache_hit_rate_percent: row.get(11)?,
        last_height_imported: row.get(12)?,
        current_network_height: row.get(13)?,
        height_difference: row.get(14)?,
        observer_selected: row.get(15)?,
        observer_report_submitted: row.get(16)?,
        observer_weight: row.get(17)?,
    })
}

const SAMPLE_COLUMNS: &str = "timestamp_ms, healthy, response_time_ms, cpu_percent, \
     memory_percent, disk_percent, uptime_seconds, http_requests_total, arns_resolutions, \
     arns_errors, graphql_requests_total, arns_cache_hit_rate_percent, last_height_imported, \
     current_network_height, height_difference, observer_selected, observer_report_submitted, \
     observer_weight";

impl RetentionStore for SqliteRetentionStore {
    fn append_sample(&self, sample: &MetricSample) -> Result<()> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT INTO samples ({SAMPLE_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        ))?;
        stmt.execute(rusqlite::params![
            sample.timestamp.timestamp_millis(),
            sample.healthy,
            sample.response_time_ms,
            sample.cpu_percent,
            sample.memory_percent,
            sample.disk_percent,
            sample.uptime_seconds.map(|v| v as i64),
            sample.http_requests_total.map(|v| v as i64),
            sample.arns_resolutions.map(|v| v as i64),
            sample.arns_errors.map(|v| v as i64),
            sample.graphql_requests_total.map(|v| v as i64),
            sample.arns_cache_hit_rate_percent,
            sample.last_height_imported,
            sample.current_network_height,
            sample.height_difference,
            sample.observer_selected,
            sample.observer_report_submitted,
            sample.observer_weight,
        ])?;
        Ok(())
    }

    fn latest_sample(&self) -> Result<Option<MetricSample>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM samples ORDER BY timestamp_ms DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(sample_from_row(row)?)),
            None => Ok(None),
        }
    }

    fn samples_since(&self, from: DateTime<Utc>) -> Result<Vec<MetricSample>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM samples WHERE timestamp_ms >= ?1 ORDER BY timestamp_ms ASC"
        ))?;
        let rows = stmt.query_map([from.timestamp_millis()], sample_from_row)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn daily_averages(&self, days: u32) -> Result<Vec<DailyAggregate>> {
        let cutoff = (Utc::now() - chrono::Duration::days(i64::from(days.saturating_sub(1))))
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or(0);

        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT date(timestamp_ms / 1000, 'unixepoch') AS day,
                    AVG(cpu_percent),
                    AVG(memory_percent),
                    MAX(http_requests_total) - MIN(http_requests_total)
             FROM samples
             WHERE timestamp_ms >= ?1
             GROUP BY day
             ORDER BY day ASC",
        )?;
        let rows = stmt.query_map([cutoff], |row| {
            let day: String = row.get(0)?;
            let avg_cpu: Option<f64> = row.get(1)?;
            let avg_memory: Option<f64> = row.get(2)?;
            let total_requests: Option<i64> = row.get(3)?;
            Ok((day, avg_cpu, avg_memory, total_requests))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (day, avg_cpu, avg_memory, total_requests) = row?;
            let Ok(day) = NaiveDate::parse_from_str(&day, "%Y-%m-%d") else {
                tracing::warn!(day = %day, "Skipping aggregate row with unparsable day");
                continue;
            };
            results.push(DailyAggregate {
                day,
                avg_cpu,
                avg_memory,
                total_requests: total_requests.unwrap_or(0).max(0) as u64,
            });
        }
        Ok(results)
    }

    fn append_alert(&self, record: &AlertRecord) -> Result<()> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO alert_events (timestamp_ms, title, message, severity, category)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        stmt.execute(rusqlite::params![
            record.timestamp.timestamp_millis(),
            &record.title,
            &record.message,
            record.severity.to_string(),
            record.category.map(|c| c.to_string()),
        ])?;
        Ok(())
    }

    fn alert_history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AlertRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT timestamp_ms, title, message, severity, category FROM alert_events
             WHERE timestamp_ms >= ?1 AND timestamp_ms <= ?2
             ORDER BY timestamp_ms DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![from.timestamp_millis(), to.timestamp_millis(), limit as i64],
            |row| {
                let ts_ms: i64 = row.get(0)?;
                let title: String = row.get(1)?;
                let message: String = row.get(2)?;
                let severity: String = row.get(3)?;
                let category: Option<String> = row.get(4)?;
                Ok((ts_ms, title, message, severity, category))
            },
        )?;

        let mut results = Vec::new();
        for row in rows {
            let (ts_ms, title, message, severity, category) = row?;
            let Ok(severity) = severity.parse() else {
                tracing::warn!(severity = %severity, "Skipping alert row with unknown severity");
                continue;
            };
            results.push(AlertRecord {
                timestamp: DateTime::from_timestamp_millis(ts_ms).unwrap_or_default(),
                title,
                message,
                severity,
                category: category.and_then(|c| c.parse().ok()),
            });
        }
        Ok(results)
    }

    fn alert_counts_by_severity(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<String, u64>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT severity, COUNT(*) FROM alert_events
             WHERE timestamp_ms >= ?1 AND timestamp_ms <= ?2
             GROUP BY severity",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![from.timestamp_millis(), to.timestamp_millis()],
            |row| {
                let severity: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((severity, count))
            },
        )?;

        let mut counts = HashMap::new();
        for row in rows {
            let (severity, count) = row?;
            counts.insert(severity, count.max(0) as u64);
        }
        Ok(counts)
    }

    fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let cutoff_ms = cutoff.timestamp_millis();
        let conn = self.lock();
        let samples = conn.execute("DELETE FROM samples WHERE timestamp_ms < ?1", [cutoff_ms])?;
        let alerts = conn.execute(
            "DELETE FROM alert_events WHERE timestamp_ms < ?1",
            [cutoff_ms],
        )?;
        Ok((samples + alerts) as u64)
    }

    fn compact(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch("VACUUM")?;
        Ok(())
    }

    fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached("SELECT value FROM kv_state WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn kv_put(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO kv_state (key, value, updated_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at_ms = ?3",
        )?;
        stmt.execute(rusqlite::params![
            key,
            value,
            Utc::now().timestamp_millis()
        ])?;
        Ok(())
    }

    fn kv_delete(&self, key: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM kv_state WHERE key = ?1", [key])?;
        Ok(())
    }

    fn snapshot_get(&self, kind: &str, key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare_cached("SELECT value FROM snapshots WHERE kind = ?1 AND key = ?2")?;
        let mut rows = stmt.query([kind, key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn snapshot_put(&self, kind: &str, key: &str, value: &str) -> Result<()> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO snapshots (kind, key, value, updated_at_ms) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(kind, key) DO UPDATE SET value = ?3, updated_at_ms = ?4",
        )?;
        stmt.execute(rusqlite::params![
            kind,
            key,
            value,
            Utc::now().timestamp_millis()
        ])?;
        Ok(())
    }
}
