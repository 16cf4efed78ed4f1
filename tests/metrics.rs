//! Metrics log integration tests

use std::time::Duration;

use murmur::metrics::{CSV_HEADER, DEFAULT_WINDOW};
use murmur::{MetricsLog, RunTimer, Stage};

fn full_run(secs: f64) -> RunTimer {
    let mut run = RunTimer::new();
    for stage in Stage::ALL {
        run.record(stage, Duration::from_secs_f64(secs));
    }
    run
}

#[test]
fn test_csv_accumulates_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("metrics.csv");

    {
        let mut log = MetricsLog::new(&path, true, DEFAULT_WINDOW).unwrap();
        log.log_run(&mut full_run(0.25));
    }
    {
        let mut log = MetricsLog::new(&path, true, DEFAULT_WINDOW).unwrap();
        log.log_run(&mut full_run(0.5));
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], CSV_HEADER);
    assert_eq!(lines.iter().filter(|l| **l == CSV_HEADER).count(), 1);

    for line in &lines[1..] {
        let cells: Vec<&str> = line.split(',').collect();
        assert_eq!(cells.len(), 6);
        // %Y-%m-%d %H:%M:%S
        assert_eq!(cells[0].len(), 19);
        for cell in &cells[1..] {
            assert!(cell.parse::<f64>().is_ok(), "not a number: {cell}");
        }
    }
}

#[test]
fn test_total_includes_augment() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.csv");
    let mut log = MetricsLog::new(&path, true, DEFAULT_WINDOW).unwrap();

    let record = log.log_run(&mut full_run(1.0));

    // Four CSV stage columns plus augment
    assert!((record.total - 5.0).abs() < 1e-6);
    let row = std::fs::read_to_string(&path).unwrap();
    let last = row.lines().last().unwrap();
    assert!(last.ends_with(",5.000000"), "unexpected row: {last}");
}

#[test]
fn test_rolling_window_tracks_last_runs() {
    let mut log = MetricsLog::in_memory(DEFAULT_WINDOW);
    for i in 1..=7 {
        log.log_run(&mut full_run(f64::from(i)));
    }

    let avg = log.rolling_average().unwrap();
    assert_eq!(avg.runs, DEFAULT_WINDOW);
    // Runs 3..=7
    assert!((avg.get(Stage::Speak) - 5.0).abs() < 1e-6);
    assert_eq!(log.runs_logged(), 7);
}
