use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use gwmon_common::types::AlertCandidate;
use gwmon_storage::{keys, RetentionStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Span used to model an indefinite mute. A plain far-future timestamp
/// participates in ordinary comparisons; no sentinel branching.
const INDEFINITE_DAYS: i64 = 36_500;

/// Global mute state. `mute_until` is always set while muted; an
/// indefinite mute carries a far-future timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MuteState {
    pub is_muted: bool,
    pub mute_until: Option<DateTime<Utc>>,
}

/// Tracks the global mute and the per-category mute map.
///
/// Exclusively owns both; every mutation is persisted before returning so
/// mutes survive restarts. Expiry is evaluated lazily on read and swept
/// opportunistically on each dispatch cycle.
pub struct MuteRegistry {
    store: Arc<dyn RetentionStore>,
    state: MuteState,
    categories: HashMap<String, DateTime<Utc>>,
}

impl MuteRegistry {
    /// Rehydrates persisted mute state. Unreadable blobs log a warning
    /// and fall back to the unmuted default.
    pub fn load(store: Arc<dyn RetentionStore>) -> Self {
        let state = match store.kv_get(keys::MUTE_STATE) {
            Ok(Some(blob)) => serde_json::from_str(&blob).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Stored mute state unreadable, starting unmuted");
                MuteState::default()
            }),
            Ok(None) => MuteState::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read mute state, starting unmuted");
                MuteState::default()
            }
        };
        let categories = match store.kv_get(keys::CATEGORY_MUTES) {
            Ok(Some(blob)) => serde_json::from_str(&blob).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Stored category mutes unreadable, starting empty");
                HashMap::new()
            }),
            Ok(None) => HashMap::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read category mutes, starting empty");
                HashMap::new()
            }
        };
        Self {
            store,
            state,
            categories,
        }
    }

    /// The key a candidate is muted under: its category, or its own kind
    /// when it carries none.
    pub fn mute_key(candidate: &AlertCandidate) -> String {
        match candidate.category {
            Some(category) => category.to_string(),
            None => candidate.kind.to_string(),
        }
    }

    pub fn is_globally_muted(&self, now: DateTime<Utc>) -> bool {
        self.state.is_muted && self.state.mute_until.is_some_and(|until| now < until)
    }

    pub fn is_category_muted(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.categories.get(key).is_some_and(|until| now < *until)
    }

    pub fn global_state(&self) -> &MuteState {
        &self.state
    }

    pub fn category_mutes(&self) -> &HashMap<String, DateTime<Utc>> {
        &self.categories
    }

    /// Mutes everything. `duration` of `None` means indefinite.
    pub fn mute_global(&mut self, duration: Option<Duration>, now: DateTime<Utc>) -> Result<()> {
        self.state = MuteState {
            is_muted: true,
            mute_until: Some(now + duration.unwrap_or_else(|| Duration::days(INDEFINITE_DAYS))),
        };
        self.persist_state()
    }

    /// Mutes one category key. `duration` of `None` means indefinite.
    pub fn mute_category(
        &mut self,
        key: &str,
        duration: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let until = now + duration.unwrap_or_else(|| Duration::days(INDEFINITE_DAYS));
        self.categories.insert(key.to_string(), until);
        self.persist_categories()
    }

    pub fn unmute(&mut self) -> Result<()> {
        self.state = MuteState::default();
        self.persist_state()
    }

    pub fn unmute_category(&mut self, key: &str) -> Result<()> {
        if self.categories.remove(key).is_some() {
            self.persist_categories()?;
        }
        Ok(())
    }

    pub fn unmute_all(&mut self) -> Result<()> {
        self.state = MuteState::default();
        self.categories.clear();
        self.persist_state()?;
        self.persist_categories()
    }

    /// Drops expired entries, persisting each removal. Returns how many
    /// entries were removed.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;

        if self.state.is_muted && self.state.mute_until.is_some_and(|until| now >= until) {
            self.state = MuteState::default();
            self.persist_state()?;
            removed += 1;
        }

        let before = self.categories.len();
        self.categories.retain(|_, until| now < *until);
        if self.categories.len() < before {
            removed += before - self.categories.len();
            self.persist_categories()?;
        }

        Ok(removed)
    }

    fn persist_state(&self) -> Result<()> {
        let blob = serde_json::to_string(&self.state)?;
        self.store.kv_put(keys::MUTE_STATE, &blob)
    }

    fn persist_categories(&self) -> Result<()> {
        let blob = serde_json::to_string(&self.categories)?;
        self.store.kv_put(keys::CATEGORY_MUTES, &blob)
    }
}
