//! Append-only CSV log and rolling average of completed runs

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::timer::{RunTimer, Stage};
use crate::Result;
use crate::config::MetricsConfig;

/// Header row of the metrics CSV
pub const CSV_HEADER: &str = "timestamp,record_audio,transcribe,generate_response,speak,total";

/// Stages with their own CSV column
const CSV_STAGES: [Stage; 4] = [
    Stage::RecordAudio,
    Stage::Transcribe,
    Stage::GenerateResponse,
    Stage::Speak,
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timings of one completed run, in seconds
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub timestamp: DateTime<Local>,
    pub stages: BTreeMap<Stage, f64>,
    /// Sum of every recorded stage
    pub total: f64,
}

impl RunRecord {
    /// Seconds spent in `stage`, zero if it did not run
    #[must_use]
    pub fn get(&self, stage: Stage) -> f64 {
        self.stages.get(&stage).copied().unwrap_or(0.0)
    }

    /// Format as one CSV data row
    #[must_use]
    pub fn csv_row(&self) -> String {
        let mut row = self.timestamp.format(TIMESTAMP_FORMAT).to_string();
        for stage in CSV_STAGES {
            let _ = write!(row, ",{:.6}", self.get(stage));
        }
        let _ = write!(row, ",{:.6}", self.total);
        row
    }
}

/// Mean stage timings across the runs in the window
#[derive(Debug, Clone, PartialEq)]
pub struct RollingAverage {
    /// Runs averaged
    pub runs: usize,
    pub stages: BTreeMap<Stage, f64>,
    pub total: f64,
}

impl RollingAverage {
    /// Average seconds for `stage`
    #[must_use]
    pub fn get(&self, stage: Stage) -> f64 {
        self.stages.get(&stage).copied().unwrap_or(0.0)
    }
}

/// Aggregates completed runs into a CSV log and a bounded rolling window
#[derive(Debug)]
pub struct MetricsLog {
    path: Option<PathBuf>,
    window: VecDeque<RunRecord>,
    capacity: usize,
    runs_logged: u64,
}

impl MetricsLog {
    /// Create a log writing to `path` (when enabled) with a window of `capacity` runs
    ///
    /// The CSV header is written if the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns error if the log file cannot be created
    pub fn new(path: impl Into<PathBuf>, enabled: bool, capacity: usize) -> Result<Self> {
        let path = path.into();
        if enabled {
            ensure_header(&path)?;
        }

        Ok(Self {
            path: enabled.then_some(path),
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            runs_logged: 0,
        })
    }

    /// Create a log from the metrics configuration
    ///
    /// # Errors
    ///
    /// Returns error if the log file cannot be created
    pub fn from_config(config: &MetricsConfig) -> Result<Self> {
        Self::new(&config.path, config.enabled, config.window)
    }

    /// In-memory log that keeps the rolling window but writes no file
    #[must_use]
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            path: None,
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            runs_logged: 0,
        }
    }

    /// Finish the run recorded in `run`
    ///
    /// Computes the total, appends a CSV row, folds the record into the
    /// window, logs a summary and leaves `run` empty for the next run. A CSV
    /// write failure is logged and does not fail the run.
    pub fn log_run(&mut self, run: &mut RunTimer) -> RunRecord {
        let record = self.fold_run(run);
        if let Some(path) = &self.path {
            if let Err(e) = append_row(path, &record) {
                tracing::warn!(path = %path.display(), error = %e, "failed to append metrics row");
            }
        }
        record
    }

    /// Like [`MetricsLog::log_run`] but without touching the CSV file
    ///
    /// The caller is expected to pass the record to [`append_row`] once it no
    /// longer holds the log.
    pub fn fold_run(&mut self, run: &mut RunTimer) -> RunRecord {
        let stages: BTreeMap<Stage, f64> = run
            .take()
            .into_iter()
            .map(|(stage, d)| (stage, d.as_secs_f64()))
            .collect();
        let total = stages.values().sum();

        let record = RunRecord {
            timestamp: Local::now(),
            stages,
            total,
        };

        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(record.clone());
        self.runs_logged += 1;

        tracing::info!("{}", self.summary(&record));
        record
    }

    /// Average of every stage and the total over the window
    ///
    /// A stage missing from a record counts as zero for that record.
    #[must_use]
    pub fn rolling_average(&self) -> Option<RollingAverage> {
        if self.window.is_empty() {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let runs = self.window.len() as f64;
        let stages = Stage::ALL
            .iter()
            .map(|&stage| {
                let sum: f64 = self.window.iter().map(|r| r.get(stage)).sum();
                (stage, sum / runs)
            })
            .collect();
        let total = self.window.iter().map(|r| r.total).sum::<f64>() / runs;

        Some(RollingAverage {
            runs: self.window.len(),
            stages,
            total,
        })
    }

    /// Human-readable timing summary for `record` plus the rolling average
    #[must_use]
    pub fn summary(&self, record: &RunRecord) -> String {
        let mut out = String::from("--- Timing Summary ---");
        for (stage, secs) in &record.stages {
            let _ = write!(out, "\n{stage}: {secs:.2}s");
        }
        let _ = write!(out, "\ntotal: {:.2}s", record.total);

        if let Some(avg) = self.rolling_average() {
            let _ = write!(out, "\nRolling average (last {} runs):", avg.runs);
            for (stage, secs) in &avg.stages {
                let _ = write!(out, "\n{stage}: {secs:.2}s");
            }
            let _ = write!(out, "\ntotal: {:.2}s", avg.total);
        }

        out
    }

    /// Records currently in the window, oldest first
    pub fn recent(&self) -> impl Iterator<Item = &RunRecord> {
        self.window.iter()
    }

    /// Window capacity
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Runs logged since creation
    #[must_use]
    pub const fn runs_logged(&self) -> u64 {
        self.runs_logged
    }

    /// CSV path, when file logging is enabled
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn ensure_header(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{CSV_HEADER}\n"))?;
    tracing::debug!(path = %path.display(), "created metrics log");
    Ok(())
}

/// Append `record` as one CSV row
///
/// The row is issued as a single append write so concurrent writers do not
/// interleave within a line.
///
/// # Errors
///
/// Returns error if the file cannot be opened or written
pub fn append_row(path: &Path, record: &RunRecord) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(format!("{}\n", record.csv_row()).as_bytes())
}
