use crate::mute::MuteRegistry;
use chrono::{DateTime, Duration, Utc};
use gwmon_common::types::{AlertCandidate, AlertCategory, AlertRecord, Severity};
use gwmon_notify::{InlineAction, NotificationChannel};
use gwmon_storage::RetentionStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Why a candidate did not reach the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    None,
    Cooldown,
    GlobalMute,
    CategoryMute,
}

/// Outcome of one dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub sent: bool,
    pub suppressed_by: Suppression,
}

/// Cooldown identity. Resource/performance alerts are keyed by the
/// threshold they crossed so a fluctuating current value shares one
/// cooldown; everything else dedups on exact content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupKey {
    Content(Severity, String),
    Threshold(AlertCategory, u64),
}

fn dedup_key(candidate: &AlertCandidate) -> DedupKey {
    match (candidate.category, candidate.threshold) {
        (Some(category), Some(threshold)) => DedupKey::Threshold(category, threshold.to_bits()),
        _ => DedupKey::Content(candidate.severity, candidate.body.clone()),
    }
}

/// Applies cooldown deduplication and mute suppression, then hands
/// surviving alerts to the notification channel.
///
/// Every candidate that passes cooldown is appended to alert history
/// before the mute state is consulted, so history reflects events that
/// would have fired. Cooldown duplicates never touch history.
pub struct AlertDispatcher {
    store: Arc<dyn RetentionStore>,
    channel: Arc<dyn NotificationChannel>,
    mutes: MuteRegistry,
    last_sent: HashMap<DedupKey, DateTime<Utc>>,
}

impl AlertDispatcher {
    pub fn new(
        store: Arc<dyn RetentionStore>,
        channel: Arc<dyn NotificationChannel>,
        mutes: MuteRegistry,
    ) -> Self {
        Self {
            store,
            channel,
            mutes,
            last_sent: HashMap::new(),
        }
    }

    pub fn mutes(&self) -> &MuteRegistry {
        &self.mutes
    }

    pub fn mutes_mut(&mut self) -> &mut MuteRegistry {
        &mut self.mutes
    }

    pub async fn dispatch(
        &mut self,
        candidate: &AlertCandidate,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        let key = dedup_key(candidate);

        if let Some(last) = self.last_sent.get(&key) {
            if now - *last < cooldown {
                tracing::debug!(
                    kind = %candidate.kind,
                    "Alert suppressed (cooldown not elapsed)"
                );
                return DispatchOutcome {
                    sent: false,
                    suppressed_by: Suppression::Cooldown,
                };
            }
        }
        self.last_sent.insert(key, now);

        // History reflects true event occurrence, muted or not.
        let record = AlertRecord {
            timestamp: candidate.timestamp,
            title: candidate.title.clone(),
            message: candidate.body.clone(),
            severity: candidate.severity,
            category: candidate.category,
        };
        if let Err(e) = self.store.append_alert(&record) {
            tracing::warn!(error = %e, "Failed to record alert history");
        }

        if let Err(e) = self.mutes.sweep_expired(now) {
            tracing::warn!(error = %e, "Failed to persist mute sweep");
        }

        if self.mutes.is_globally_muted(now) {
            tracing::info!(kind = %candidate.kind, "Alert suppressed (global mute)");
            return DispatchOutcome {
                sent: false,
                suppressed_by: Suppression::GlobalMute,
            };
        }

        let mute_key = MuteRegistry::mute_key(candidate);
        if self.mutes.is_category_muted(&mute_key, now) {
            tracing::info!(
                kind = %candidate.kind,
                category = %mute_key,
                "Alert suppressed (category mute)"
            );
            return DispatchOutcome {
                sent: false,
                suppressed_by: Suppression::CategoryMute,
            };
        }

        let text = format_alert(candidate);
        let actions = inline_actions(candidate);
        match self.channel.send(&text, &actions).await {
            Ok(()) => {
                tracing::info!(kind = %candidate.kind, severity = %candidate.severity, "Alert sent");
                DispatchOutcome {
                    sent: true,
                    suppressed_by: Suppression::None,
                }
            }
            Err(e) => {
                // Recorded as dispatched-attempted; never retried here.
                tracing::error!(kind = %candidate.kind, error = %e, "Alert delivery failed");
                DispatchOutcome {
                    sent: false,
                    suppressed_by: Suppression::None,
                }
            }
        }
    }
}

fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "\u{2139}\u{fe0f}",
        Severity::Warning => "\u{26a0}\u{fe0f}",
        Severity::Critical => "\u{1f534}",
    }
}

fn format_alert(candidate: &AlertCandidate) -> String {
    format!(
        "{} <b>{}</b>\n{}",
        severity_marker(candidate.severity),
        candidate.title,
        candidate.body
    )
}

/// Warning and critical alerts carry quick mute actions; informational
/// summaries are not worth muting from the message itself.
fn inline_actions(candidate: &AlertCandidate) -> Vec<InlineAction> {
    if candidate.severity == Severity::Info {
        return Vec::new();
    }
    let key = MuteRegistry::mute_key(candidate);
    vec![
        InlineAction::new("Mute 1h", &format!("mute:{key}:3600")),
        InlineAction::new("Mute all 1h", "mute:global:3600"),
    ]
}
