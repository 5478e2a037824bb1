//! Alert evaluation and notification core for the gateway watchdog.
//!
//! A scheduler feeds one fresh [`gwmon_common::types::MetricSample`] per
//! cycle into the [`evaluator::Evaluator`], which maintains the sliding
//! windows and epoch state and emits zero or more candidate alerts. The
//! [`dispatcher::AlertDispatcher`] then applies cooldown deduplication
//! and mute suppression before handing surviving alerts to the
//! notification channel, recording every non-duplicate attempt into
//! alert history.

pub mod dispatcher;
pub mod epoch;
pub mod evaluator;
pub mod mute;
pub mod thresholds;
pub mod window;


pub use dispatcher::{AlertDispatcher, DispatchOutcome, Suppression};
pub use evaluator::Evaluator;
pub use mute::MuteRegistry;
pub use thresholds::{Preset, Thresholds};
