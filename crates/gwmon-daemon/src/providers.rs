use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gwmon_common::types::{EpochStats, MetricSample, ObserverStatus};
use serde_json::Value;
use std::time::Instant;

/// Produces one metric sample per check cycle. Providers never fail:
/// anything unavailable comes back as `None` fields.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Full sample: health probe plus resource/counter metrics.
    async fn fetch_sample(&self) -> MetricSample;

    /// Lightweight health-only sample for the fast health cadence.
    async fn probe_health(&self) -> MetricSample;

    /// Resolves one ArNS base name, returning the elapsed milliseconds.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure when resolution fails.
    async fn resolve_arns(&self, name: &str) -> Result<f64, String>;
}

/// Observer/epoch view from the network registry. Absent fields signal
/// unavailability, never a default of zero.
#[async_trait]
pub trait EpochProvider: Send + Sync {
    async fn observer_status(&self) -> ObserverStatus;

    async fn epoch_stats(&self, epoch_index: u64) -> Option<EpochStats>;
}

pub struct HttpMetricsProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMetricsProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_json(&self, path: &str) -> Option<Value> {
        let url = format!("{}{path}", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp.json().await.ok(),
            Ok(resp) => {
                tracing::debug!(url = %url, status = %resp.status(), "Non-success response");
                None
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Request failed");
                None
            }
        }
    }

    async fn fetch_text(&self, path: &str) -> Option<String> {
        let url = format!("{}{path}", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            _ => None,
        }
    }
}

#[async_trait]
impl MetricsProvider for HttpMetricsProvider {
    async fn fetch_sample(&self) -> MetricSample {
        let mut sample = self.probe_health().await;

        if let Some(info) = self.fetch_json("/ar-io/info").await {
            sample.uptime_seconds = get_u64(&info, "uptime");
            sample.last_height_imported = get_i64(&info, "lastHeightImported");
            sample.current_network_height = get_i64(&info, "currentNetworkHeight");
        }
        if let (Some(imported), Some(network)) =
            (sample.last_height_imported, sample.current_network_height)
        {
            sample.height_difference = Some(network - imported);
        }

        if let Some(metrics) = self.fetch_text("/ar-io/__gateway_metrics").await {
            sample.cpu_percent = prometheus_value(&metrics, "system_cpu_usage_percent");
            sample.memory_percent = prometheus_value(&metrics, "system_memory_usage_percent");
            sample.disk_percent = prometheus_value(&metrics, "system_disk_usage_percent");
            sample.http_requests_total =
                prometheus_value(&metrics, "http_requests_total").map(|v| v as u64);
            sample.graphql_requests_total =
                prometheus_value(&metrics, "graphql_requests_total").map(|v| v as u64);
            sample.arns_resolutions =
                prometheus_value(&metrics, "arns_resolution_total").map(|v| v as u64);
            sample.arns_errors =
                prometheus_value(&metrics, "arns_resolution_error_total").map(|v| v as u64);

            let hits = prometheus_value(&metrics, "arns_cache_hit_total");
            let misses = prometheus_value(&metrics, "arns_cache_miss_total");
            if let (Some(hits), Some(misses)) = (hits, misses) {
                let total = hits + misses;
                if total > 0.0 {
                    sample.arns_cache_hit_rate_percent = Some(hits / total * 100.0);
                }
            }
        }

        sample
    }

    async fn probe_health(&self) -> MetricSample {
        let mut sample = MetricSample::at(Utc::now());
        let url = format!("{}/ar-io/healthcheck", self.base_url);
        let started = Instant::now();
        match self.client.get(&url).send().await {
            Ok(resp) => {
                sample.response_time_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
                sample.healthy = Some(resp.status().is_success());
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Health probe failed");
                sample.healthy = Some(false);
            }
        }
        sample
    }

    async fn resolve_arns(&self, name: &str) -> Result<f64, String> {
        let url = format!("{}/ar-io/resolver/records/{name}", self.base_url);
        let started = Instant::now();
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                Ok(started.elapsed().as_secs_f64() * 1000.0)
            }
            Ok(resp) => Err(format!("HTTP {}", resp.status())),
            Err(e) => Err(e.to_string()),
        }
    }
}

pub struct HttpEpochProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEpochProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_json(&self, path: &str) -> Option<Value> {
        let url = format!("{}{path}", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp.json().await.ok(),
            Ok(resp) => {
                tracing::debug!(url = %url, status = %resp.status(), "Non-success response");
                None
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Request failed");
                None
            }
        }
    }
}

#[async_trait]
impl EpochProvider for HttpEpochProvider {
    async fn observer_status(&self) -> ObserverStatus {
        let Some(body) = self.fetch_json("/ar-io/observer/info").await else {
            return ObserverStatus::default();
        };
        observer_status_from_json(&body)
    }

    async fn epoch_stats(&self, epoch_index: u64) -> Option<EpochStats> {
        let body = self
            .fetch_json(&format!("/ar-io/observer/epochs/{epoch_index}"))
            .await?;
        Some(epoch_stats_from_json(&body))
    }
}

fn observer_status_from_json(body: &Value) -> ObserverStatus {
    ObserverStatus {
        epoch_index: get_u64(body, "epochIndex"),
        selected: get_bool(body, "selectedAsObserver"),
        report_submitted: get_bool(body, "reportSubmitted"),
        weight: get_f64(body, "observerWeight"),
        epoch_end: get_i64(body, "epochEndTimestamp").and_then(DateTime::from_timestamp_millis),
    }
}

fn epoch_stats_from_json(body: &Value) -> EpochStats {
    EpochStats {
        total_rewards: get_f64(body, "totalRewards"),
        eligible_gateways: get_u64(body, "eligibleGatewayCount"),
        observed_gateways: get_u64(body, "observedGatewayCount"),
        passed_percent: get_f64(body, "passedPercent"),
        prescribed_count: get_u64(body, "prescribedObserverCount"),
    }
}

// Payloads vary across provider versions; each field is pulled out
// individually and missing or mistyped fields simply stay absent.

fn get_u64(v: &Value, key: &str) -> Option<u64> {
    v.get(key).and_then(Value::as_u64)
}

fn get_i64(v: &Value, key: &str) -> Option<i64> {
    v.get(key).and_then(Value::as_i64)
}

fn get_f64(v: &Value, key: &str) -> Option<f64> {
    v.get(key).and_then(Value::as_f64)
}

fn get_bool(v: &Value, key: &str) -> Option<bool> {
    v.get(key).and_then(Value::as_bool)
}

/// Sums all series of a metric in Prometheus text exposition format.
/// Returns `None` when the metric is absent.
fn prometheus_value(text: &str, name: &str) -> Option<f64> {
    let mut total = 0.0;
    let mut found = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(rest) = line.strip_prefix(name) else {
            continue;
        };
        // The metric name must end exactly here: a label set, or
        // whitespace before the value. Anything else is a longer name
        // sharing this prefix.
        let value_part = if let Some(labels) = rest.strip_prefix('{') {
            match labels.split_once('}') {
                Some((_, v)) => v.trim(),
                None => continue,
            }
        } else if rest.starts_with(' ') || rest.starts_with('\t') {
            rest.trim_start()
        } else {
            continue;
        };
        if let Ok(value) = value_part
            .split_whitespace()
            .next()
            .unwrap_or("")
            .parse::<f64>()
        {
            total += value;
            found = true;
        }
    }
    if found {
        Some(total)
    } else {
        None
    }
}
