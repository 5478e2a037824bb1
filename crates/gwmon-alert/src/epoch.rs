use chrono::{DateTime, Utc};

/// Where this gateway stands within the current epoch's observer duty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EpochPhase {
    /// Selection results for this epoch have not been observed yet.
    #[default]
    AwaitingSelection,
    /// Selected as observer; the report has not been submitted.
    AwaitingReport,
    /// The report was submitted (or the gateway was not selected).
    Satisfied,
    /// The deadline passed without a report. Terminal for this epoch.
    Failed,
}

/// Last-observed observer status, mutated once per check cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochCheckState {
    pub epoch_index: u64,
    pub was_selected: bool,
    pub had_report: bool,
}

/// Transition events surfaced by [`EpochTracker::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochEvent {
    /// The epoch index advanced from `previous` to `current`.
    Rolled { previous: u64, current: u64 },
    /// The report deadline passed with no report. Emitted exactly once
    /// per epoch.
    ReportOverdue { epoch: u64 },
}

/// State machine over reward-epoch transitions and report deadlines.
///
/// Cold-started on restart: the first observation initializes state and
/// produces no events, so a crash never replays epoch-boundary alerts.
#[derive(Debug, Default)]
pub struct EpochTracker {
    state: Option<EpochCheckState>,
    phase: EpochPhase,
    deadline_warned: bool,
}

impl EpochTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> EpochPhase {
        self.phase
    }

    pub fn state(&self) -> Option<EpochCheckState> {
        self.state
    }

    /// Feeds one observation and returns the transitions it caused.
    pub fn observe(
        &mut self,
        epoch_index: u64,
        selected: Option<bool>,
        report_submitted: Option<bool>,
        epoch_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Vec<EpochEvent> {
        let mut events = Vec::new();

        match self.state {
            None => {
                self.phase = initial_phase(selected, report_submitted);
                self.deadline_warned = false;
            }
            Some(prev) if prev.epoch_index != epoch_index => {
                events.push(EpochEvent::Rolled {
                    previous: prev.epoch_index,
                    current: epoch_index,
                });
                self.phase = initial_phase(selected, report_submitted);
                self.deadline_warned = false;
            }
            Some(_) => {
                // Same epoch: advance the phase from fresh observations.
                match self.phase {
                    EpochPhase::AwaitingSelection => {
                        self.phase = initial_phase(selected, report_submitted);
                    }
                    EpochPhase::AwaitingReport => {
                        if report_submitted == Some(true) {
                            self.phase = EpochPhase::Satisfied;
                        }
                    }
                    EpochPhase::Satisfied | EpochPhase::Failed => {}
                }
            }
        }

        // Deadline check only applies while a report is still owed.
        if self.phase == EpochPhase::AwaitingReport {
            if let Some(end) = epoch_end {
                if now >= end {
                    self.phase = EpochPhase::Failed;
                    events.push(EpochEvent::ReportOverdue { epoch: epoch_index });
                }
            }
        }

        self.state = Some(EpochCheckState {
            epoch_index,
            was_selected: selected.unwrap_or(false),
            had_report: report_submitted.unwrap_or(false),
        });

        events
    }

    /// Whether the pre-deadline warning should fire now: selected, no
    /// report, strictly within `(0, max_hours]` hours of the deadline,
    /// and not warned before for this epoch.
    pub fn deadline_warning_due(
        &mut self,
        epoch_end: Option<DateTime<Utc>>,
        max_hours: i64,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        if self.phase != EpochPhase::AwaitingReport || self.deadline_warned {
            return None;
        }
        let end = epoch_end?;
        let remaining_ms = (end - now).num_milliseconds();
        if remaining_ms <= 0 {
            return None;
        }
        let remaining_hours = remaining_ms as f64 / 3_600_000.0;
        if remaining_hours < max_hours as f64 {
            self.deadline_warned = true;
            Some(remaining_hours)
        } else {
            None
        }
    }
}

fn initial_phase(selected: Option<bool>, report_submitted: Option<bool>) -> EpochPhase {
    match (selected, report_submitted) {
        (Some(true), Some(true)) => EpochPhase::Satisfied,
        (Some(true), _) => EpochPhase::AwaitingReport,
        (Some(false), _) => EpochPhase::Satisfied,
        (None, _) => EpochPhase::AwaitingSelection,
    }
}
