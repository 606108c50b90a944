//! Benchmark report types, terminal tables, and JSON / CSV export.
//!
//! Point order and sample order are exactly the sweep order. Consumers zip
//! `points` against `config.min_supports` by position.

use crate::config::SweepConfig;
use crate::stats::SampleStats;
use crate::{BenchError, BenchResult, SystemInfo};
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Version of the emitted report layout.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

pub const REPORT_JSON: &str = "fpgrowth_report.json";
pub const SAMPLES_CSV: &str = "fpgrowth_samples.csv";
pub const SUMMARY_CSV: &str = "fpgrowth_summary.csv";

// ────────────────────────────────────────────────────────────────────────────────
// Report types
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MiningFailure,
    Timeout,
}

/// One repetition that produced no sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepetitionFailure {
    /// Zero-based repetition index within the point.
    pub run: usize,
    pub kind: FailureKind,
    pub message: String,
}

/// Results for one `min_support` value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointResult {
    pub min_support: f64,
    /// Mean over successful samples; `null` when none succeeded.
    pub mean_time_seconds: Option<f64>,
    /// Successful samples in repetition order.
    pub raw_times_seconds: Vec<f64>,
    /// Repetition index of each sample in `raw_times_seconds`.
    #[serde(default)]
    pub sample_runs: Vec<usize>,
    /// Materialization times, recorded only when they are not part of the sample.
    #[serde(default)]
    pub collect_times_seconds: Vec<f64>,
    pub failed_runs: usize,
    #[serde(default)]
    pub failures: Vec<RepetitionFailure>,
    #[serde(default)]
    pub stats: Option<SampleStats>,
    /// Frequent itemsets found by the last successful repetition.
    #[serde(default)]
    pub itemsets: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub path: PathBuf,
    pub transactions: usize,
    pub distinct_items: usize,
}

/// Write-once output of a completed sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub schema_version: u32,
    pub backend: String,
    pub config: SweepConfig,
    pub dataset: DatasetInfo,
    pub system_info: SystemInfo,
    pub points: Vec<PointResult>,
    /// False when any repetition failed.
    pub complete: bool,
}

impl BenchmarkReport {
    pub fn failed_repetitions(&self) -> usize {
        self.points.iter().map(|p| p.failed_runs).sum()
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Terminal output
// ────────────────────────────────────────────────────────────────────────────────

/// Print the sweep table for one report.
pub fn print_report(report: &BenchmarkReport) {
    println!(
        "\n{}",
        "╔══════════════════════════════════════════════════════════════╗"
            .bold()
            .blue()
    );
    println!(
        "{}",
        "║              FP-Growth Sweep Benchmark Report                ║"
            .bold()
            .blue()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════════════════════════╝"
            .bold()
            .blue()
    );
    println!(
        "  Backend: {}  Dataset: {} ({} transactions, {} items)",
        report.backend.bold(),
        report.dataset.path.display(),
        report.dataset.transactions,
        report.dataset.distinct_items
    );
    println!(
        "  OS: {}  Arch: {}  CPUs: {}  Time: {}",
        report.system_info.os,
        report.system_info.arch,
        report.system_info.cpus,
        report.system_info.timestamp
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);

    table.set_header(vec![
        "min_support",
        "Runs",
        "Mean",
        "Median",
        "Min",
        "Max",
        "Stddev",
        "Collect",
        "Itemsets",
    ]);

    let best_mean = report
        .points
        .iter()
        .filter_map(|p| p.mean_time_seconds)
        .fold(f64::INFINITY, f64::min);

    for p in &report.points {
        let runs = p.raw_times_seconds.len() + p.failed_runs;
        let runs_cell = if p.failed_runs > 0 {
            Cell::new(format!("{}/{}", p.raw_times_seconds.len(), runs)).fg(Color::Red)
        } else {
            Cell::new(format!("{}/{}", runs, runs))
        };

        let mean_cell = match p.mean_time_seconds {
            Some(m) if m == best_mean => Cell::new(format!("★ {}", format_secs(m))).fg(Color::Green),
            Some(m) => Cell::new(format_secs(m)),
            None => Cell::new("-").fg(Color::Red),
        };

        let stat = |f: fn(&SampleStats) -> f64| {
            p.stats
                .as_ref()
                .map(|s| format_secs(f(s)))
                .unwrap_or_else(|| "-".to_string())
        };

        let collect = crate::stats::summarize(&p.collect_times_seconds)
            .map(format_secs)
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(format!("{}", p.min_support)),
            runs_cell,
            mean_cell,
            Cell::new(stat(|s| s.median)),
            Cell::new(stat(|s| s.min)),
            Cell::new(stat(|s| s.max)),
            Cell::new(stat(|s| s.stddev)),
            Cell::new(collect),
            Cell::new(
                p.itemsets
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    println!("{table}");

    for p in report.points.iter().filter(|p| !p.failures.is_empty()) {
        for f in &p.failures {
            println!(
                "  {} min_support={} run={} {:?}: {}",
                "FAIL".red(),
                p.min_support,
                f.run,
                f.kind,
                f.message.dimmed()
            );
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Emission
// ────────────────────────────────────────────────────────────────────────────────

/// Destination for a finished report.
pub trait ReportSink {
    fn emit(&self, report: &BenchmarkReport) -> BenchResult<()>;
}

/// Writes the JSON report plus the samples and summary CSVs into a directory.
pub struct DirectoryReporter {
    dir: PathBuf,
}

impl DirectoryReporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

type Export = fn(&BenchmarkReport, &Path) -> BenchResult<()>;

impl ReportSink for DirectoryReporter {
    /// All three files appear or none do: each is written to a temporary file
    /// in the output directory first, then renamed into place.
    fn emit(&self, report: &BenchmarkReport) -> BenchResult<()> {
        fs::create_dir_all(&self.dir)?;
        let exports: [(&str, Export); 3] = [
            (REPORT_JSON, export_json),
            (SAMPLES_CSV, export_samples_csv),
            (SUMMARY_CSV, export_summary_csv),
        ];

        let mut staged = Vec::with_capacity(exports.len());
        for (name, export) in exports {
            let tmp = tempfile::Builder::new()
                .prefix(".fpgrowth-")
                .suffix(".tmp")
                .tempfile_in(&self.dir)?;
            export(report, tmp.path())?;
            staged.push((tmp, self.dir.join(name)));
        }

        let mut published: Vec<PathBuf> = Vec::with_capacity(staged.len());
        for (tmp, dest) in staged {
            if let Err(e) = tmp.persist(&dest) {
                for path in &published {
                    let _ = fs::remove_file(path);
                }
                return Err(BenchError::Io(e.error));
            }
            published.push(dest);
        }

        tracing::info!(dir = %self.dir.display(), "report exported");
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// JSON
// ────────────────────────────────────────────────────────────────────────────────

pub fn export_json(report: &BenchmarkReport, path: &Path) -> BenchResult<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| BenchError::Serialize(e.to_string()))?;
    fs::write(path, json)?;
    tracing::debug!(path = %path.display(), "JSON report written");
    Ok(())
}

pub fn load_json(path: &Path) -> BenchResult<BenchmarkReport> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| BenchError::Serialize(e.to_string()))
}

// ────────────────────────────────────────────────────────────────────────────────
// CSV
// ────────────────────────────────────────────────────────────────────────────────

fn csv_error(e: csv::Error) -> BenchError {
    BenchError::Serialize(format!("CSV: {}", e))
}

/// Long form, one row per successful sample: `min_support,run,time_seconds`.
/// `run` is the zero-based repetition index, the same one `failures` uses.
pub fn export_samples_csv(report: &BenchmarkReport, path: &Path) -> BenchResult<()> {
    let mut wtr = csv::Writer::from_path(path).map_err(csv_error)?;
    wtr.write_record(["min_support", "run", "time_seconds"])
        .map_err(csv_error)?;

    for p in &report.points {
        for (i, t) in p.raw_times_seconds.iter().enumerate() {
            let run = p.sample_runs.get(i).copied().unwrap_or(i);
            wtr.write_record([
                &p.min_support.to_string(),
                &run.to_string(),
                &t.to_string(),
            ])
            .map_err(csv_error)?;
        }
    }

    wtr.flush()?;
    tracing::debug!(path = %path.display(), "samples CSV written");
    Ok(())
}

/// One row per point; empty cells where a statistic is undefined.
pub fn export_summary_csv(report: &BenchmarkReport, path: &Path) -> BenchResult<()> {
    let mut wtr = csv::Writer::from_path(path).map_err(csv_error)?;
    wtr.write_record([
        "min_support",
        "successful_runs",
        "failed_runs",
        "mean_time_seconds",
        "median_time_seconds",
        "min_time_seconds",
        "max_time_seconds",
        "stddev_seconds",
        "itemsets",
    ])
    .map_err(csv_error)?;

    let opt = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
    for p in &report.points {
        let s = p.stats.as_ref();
        wtr.write_record([
            p.min_support.to_string(),
            p.raw_times_seconds.len().to_string(),
            p.failed_runs.to_string(),
            opt(p.mean_time_seconds),
            opt(s.map(|s| s.median)),
            opt(s.map(|s| s.min)),
            opt(s.map(|s| s.max)),
            opt(s.map(|s| s.stddev)),
            p.itemsets.map(|n| n.to_string()).unwrap_or_default(),
        ])
        .map_err(csv_error)?;
    }

    wtr.flush()?;
    tracing::debug!(path = %path.display(), "summary CSV written");
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────────
// Formatting helpers
// ────────────────────────────────────────────────────────────────────────────────

fn format_secs(s: f64) -> String {
    if s >= 1.0 {
        format!("{:.3} s", s)
    } else if s >= 1e-3 {
        format!("{:.2} ms", s * 1e3)
    } else {
        format!("{:.1} μs", s * 1e6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(min_support: f64, samples: Vec<f64>, failures: Vec<RepetitionFailure>) -> PointResult {
        let sample_runs = (0..samples.len() + failures.len())
            .filter(|run| !failures.iter().any(|f| f.run == *run))
            .collect();
        PointResult {
            sample_runs,
            min_support,
            mean_time_seconds: crate::stats::summarize(&samples),
            stats: SampleStats::from_samples(&samples),
            raw_times_seconds: samples,
            collect_times_seconds: Vec::new(),
            failed_runs: failures.len(),
            failures,
            itemsets: Some(3),
        }
    }

    fn report() -> BenchmarkReport {
        BenchmarkReport {
            schema_version: REPORT_SCHEMA_VERSION,
            backend: "local".into(),
            config: SweepConfig::new("sample.txt", vec![0.5, 0.3, 0.1], 3),
            dataset: DatasetInfo {
                path: "sample.txt".into(),
                transactions: 3,
                distinct_items: 3,
            },
            system_info: SystemInfo::collect(),
            points: vec![
                point(0.5, vec![0.1, 0.2, 0.30000000000000004], vec![]),
                point(
                    0.3,
                    vec![1.5e-4, 2.0],
                    vec![RepetitionFailure {
                        run: 1,
                        kind: FailureKind::MiningFailure,
                        message: "engine error".into(),
                    }],
                ),
                point(
                    0.1,
                    vec![],
                    (0..3)
                        .map(|run| RepetitionFailure {
                            run,
                            kind: FailureKind::Timeout,
                            message: "slow".into(),
                        })
                        .collect(),
                ),
            ],
            complete: false,
        }
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(REPORT_JSON);
        let written = report();
        export_json(&written, &path).unwrap();
        let loaded = load_json(&path).unwrap();
        assert_eq!(loaded, written);
        assert_eq!(loaded.points[2].mean_time_seconds, None);
    }

    #[test]
    fn test_absent_mean_serializes_as_null() {
        let json = serde_json::to_value(report()).unwrap();
        assert!(json["points"][2]["mean_time_seconds"].is_null());
        assert_eq!(json["points"][0]["raw_times_seconds"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_samples_csv_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SAMPLES_CSV);
        let r = report();
        export_samples_csv(&r, &path).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<(f64, usize, f64)> = rdr
            .records()
            .map(|rec| {
                let rec = rec.unwrap();
                (
                    rec[0].parse().unwrap(),
                    rec[1].parse().unwrap(),
                    rec[2].parse().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            rows,
            vec![
                (0.5, 0, 0.1),
                (0.5, 1, 0.2),
                (0.5, 2, 0.30000000000000004),
                (0.3, 0, 1.5e-4),
                (0.3, 2, 2.0),
            ]
        );
    }

    #[test]
    fn test_summary_csv_blank_when_undefined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SUMMARY_CSV);
        export_summary_csv(&report(), &path).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[1][2], "1");
        assert_eq!(&rows[2][1], "0");
        assert_eq!(&rows[2][3], "");
    }

    #[test]
    fn test_directory_reporter_writes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/results");
        DirectoryReporter::new(&out).emit(&report()).unwrap();
        for name in [REPORT_JSON, SAMPLES_CSV, SUMMARY_CSV] {
            assert!(out.join(name).exists(), "{} missing", name);
        }
    }

    #[test]
    fn test_failed_export_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("results");
        // a directory squatting on the summary name makes the final rename fail
        fs::create_dir_all(out.join(SUMMARY_CSV)).unwrap();

        assert!(DirectoryReporter::new(&out).emit(&report()).is_err());
        assert!(!out.join(REPORT_JSON).exists());
        assert!(!out.join(SAMPLES_CSV).exists());
        let left: Vec<_> = fs::read_dir(&out).unwrap().collect();
        assert_eq!(left.len(), 1, "temporary files left behind");
    }

    #[test]
    fn test_failed_repetitions_total() {
        assert_eq!(report().failed_repetitions(), 4);
    }

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(2.5), "2.500 s");
        assert_eq!(format_secs(0.0125), "12.50 ms");
        assert_eq!(format_secs(0.000_004), "4.0 μs");
    }
}
