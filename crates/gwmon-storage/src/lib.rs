//! Retention store for gateway samples and alert history.
//!
//! The default implementation ([`engine::SqliteRetentionStore`]) keeps all
//! state in a single SQLite database with WAL mode: an append-only samples
//! table, an alert-events table, a key-value table for serialized runtime
//! state (thresholds, mute state), and a snapshot table for last-seen
//! external entities. Pruning and compaction are distinct, explicit
//! operations invoked by the weekly rollup job.

pub mod engine;

#[cfg(test)]
mod tests;

use anyhow::Result;
use chrono::{DateTime, Utc};
use gwmon_common::types::{AlertRecord, DailyAggregate, MetricSample};
use std::collections::HashMap;

/// Well-known keys in the key-value state table.
pub mod keys {
    /// Serialized runtime thresholds ([`gwmon-alert`]'s `Thresholds`).
    pub const THRESHOLDS: &str = "thresholds";
    /// Serialized global mute state.
    pub const MUTE_STATE: &str = "mute_state";
    /// Serialized category-mute map.
    pub const CATEGORY_MUTES: &str = "category_mutes";
}

/// Persistence backend for samples, alert history, and runtime state.
///
/// Implementations must be safe to share across tasks (`Send + Sync`):
/// the store is written from several independent check cycles and read by
/// the report jobs concurrently.
pub trait RetentionStore: Send + Sync {
    /// Appends one metric sample to the time series.
    fn append_sample(&self, sample: &MetricSample) -> Result<()>;

    /// Returns the most recent sample, if any.
    fn latest_sample(&self) -> Result<Option<MetricSample>>;

    /// Returns all samples at or after `from`, oldest first.
    fn samples_since(&self, from: DateTime<Utc>) -> Result<Vec<MetricSample>>;

    /// Returns per-calendar-day aggregates for the last `days` UTC days,
    /// oldest first. Day grouping happens in the query layer, not in
    /// callers.
    fn daily_averages(&self, days: u32) -> Result<Vec<DailyAggregate>>;

    /// Persists a fired (or muted) alert for historical queries.
    fn append_alert(&self, record: &AlertRecord) -> Result<()>;

    /// Returns alert records in `[from, to]`, newest first, capped at
    /// `limit`.
    fn alert_history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AlertRecord>>;

    /// Returns alert counts grouped by severity in `[from, to]`.
    fn alert_counts_by_severity(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<String, u64>>;

    /// Deletes samples and alerts older than `cutoff`. Returns the number
    /// of rows removed. Does not reclaim disk space; see [`Self::compact`].
    fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Reclaims disk space after pruning. Invoked only by the weekly
    /// rollup job, never automatically.
    fn compact(&self) -> Result<()>;

    /// Reads an opaque blob from the key-value state table.
    fn kv_get(&self, key: &str) -> Result<Option<String>>;

    /// Writes an opaque blob to the key-value state table.
    fn kv_put(&self, key: &str, value: &str) -> Result<()>;

    /// Removes a key from the key-value state table.
    fn kv_delete(&self, key: &str) -> Result<()>;

    /// Reads the last-seen snapshot stored under `(kind, key)`.
    fn snapshot_get(&self, kind: &str, key: &str) -> Result<Option<String>>;

    /// Upserts the last-seen snapshot stored under `(kind, key)`.
    fn snapshot_put(&self, kind: &str, key: &str, value: &str) -> Result<()>;
}
