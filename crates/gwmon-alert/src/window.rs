use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Retention span for the resource and error-rate windows, in seconds.
pub const RESOURCE_WINDOW_SECS: i64 = 600;

/// Retention span for the resource and error-rate windows.
pub fn resource_window() -> Duration {
    Duration::seconds(RESOURCE_WINDOW_SECS)
}

/// Maximum retained observer-selection entries.
pub const SELECTION_HISTORY_CAP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaugePoint {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Time-bounded gauge buffer. Every push first evicts entries older than
/// the retention span, so the buffer never grows unbounded.
#[derive(Debug)]
pub struct GaugeWindow {
    retention: Duration,
    data: VecDeque<GaugePoint>,
}

impl GaugeWindow {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            data: VecDeque::new(),
        }
    }

    pub fn push(&mut self, value: f64, now: DateTime<Utc>) {
        self.evict(now);
        self.data.push_back(GaugePoint {
            value,
            timestamp: now,
        });
    }

    pub fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        while let Some(front) = self.data.front() {
            if front.timestamp < cutoff {
                self.data.pop_front();
            } else {
                break;
            }
        }
    }

    /// Entries within `duration` of `now`, oldest first.
    pub fn window_since(&self, duration: Duration, now: DateTime<Utc>) -> Vec<GaugePoint> {
        let cutoff = now - duration;
        self.data
            .iter()
            .filter(|p| p.timestamp >= cutoff)
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaPoint {
    pub errors: u64,
    pub requests: u64,
    pub timestamp: DateTime<Utc>,
}

/// Smoothing buffer for counter deltas. Cleared entirely when a provider
/// counter reset is detected so stale deltas are never averaged in.
#[derive(Debug)]
pub struct DeltaWindow {
    retention: Duration,
    data: VecDeque<DeltaPoint>,
}

impl DeltaWindow {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            data: VecDeque::new(),
        }
    }

    pub fn push(&mut self, errors: u64, requests: u64, now: DateTime<Utc>) {
        self.evict(now);
        self.data.push_back(DeltaPoint {
            errors,
            requests,
            timestamp: now,
        });
    }

    pub fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        while let Some(front) = self.data.front() {
            if front.timestamp < cutoff {
                self.data.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Aggregated (errors, requests) over the whole window.
    pub fn totals(&self) -> (u64, u64) {
        self.data
            .iter()
            .fold((0, 0), |(e, r), p| (e + p.errors, r + p.requests))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPoint {
    pub epoch_index: u64,
    pub selected: bool,
    pub timestamp: DateTime<Utc>,
}

/// Observer-selection history, one entry per epoch, capped by count.
#[derive(Debug)]
pub struct SelectionHistory {
    cap: usize,
    data: VecDeque<SelectionPoint>,
}

impl SelectionHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            data: VecDeque::new(),
        }
    }

    /// Appends an entry for `epoch_index` unless one is already present
    /// for that epoch. Returns whether an entry was appended.
    pub fn record(&mut self, epoch_index: u64, selected: bool, now: DateTime<Utc>) -> bool {
        if self.data.back().is_some_and(|p| p.epoch_index == epoch_index) {
            return false;
        }
        self.data.push_back(SelectionPoint {
            epoch_index,
            selected,
            timestamp: now,
        });
        while self.data.len() > self.cap {
            self.data.pop_front();
        }
        true
    }

    /// If the most recent `count` entries are all unselected, returns the
    /// (first, last) epoch indices of that run.
    pub fn trailing_unselected(&self, count: usize) -> Option<(u64, u64)> {
        if count == 0 || self.data.len() < count {
            return None;
        }
        let tail: Vec<&SelectionPoint> = self.data.iter().rev().take(count).collect();
        if tail.iter().any(|p| p.selected) {
            return None;
        }
        let last = tail.first()?.epoch_index;
        let first = tail.last()?.epoch_index;
        Some((first, last))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
