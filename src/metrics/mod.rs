//! Per-stage latency measurement
//!
//! A [`RunTimer`] accumulates stage durations for one pipeline run; a
//! [`MetricsLog`] turns finished runs into CSV rows and a rolling average.

mod log;
mod timer;

pub use log::{CSV_HEADER, MetricsLog, RollingAverage, RunRecord, append_row};
pub use timer::{RunTimer, Stage, StageGuard};

/// Runs kept in the rolling average window
pub const DEFAULT_WINDOW: usize = 5;
