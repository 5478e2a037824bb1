//! Shared domain types for the gwmon gateway watchdog.
//!
//! Everything that crosses a crate boundary lives here: metric samples,
//! alert candidates and records, observer/epoch views, and the severity
//! and category enums used for routing and muting.

pub mod types;
