//! Sweep driver: loads the dataset once, then times `num_runs` repetitions of
//! the backend's mining call for every configured `min_support`, in order.
//!
//! State machine:
//!
//! ```text
//! Init -> Loading -> RunningRepetitions(p) -> PointFinalized(p) -> ... -> ReportAssembled -> Reported -> Done
//!            \______________\___________________________________________________\_______________> Failed
//! ```
//!
//! Repetition-local errors (`MiningFailure`, `RepetitionTimeout`) become a
//! missing sample plus a failure record. Anything else moves the driver to
//! `Failed` and no report is produced.

use crate::config::SweepConfig;
use crate::dataset::{self, TransactionDataset};
use crate::report::{
    BenchmarkReport, DatasetInfo, FailureKind, PointResult, ReportSink, RepetitionFailure,
    REPORT_SCHEMA_VERSION,
};
use crate::stats::{self, SampleStats};
use crate::{BenchError, BenchResult, Deadline, MiningBackend, SystemInfo};
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Init,
    Loading,
    RunningRepetitions { point: usize },
    PointFinalized { point: usize },
    ReportAssembled,
    Reported,
    Done,
    Failed,
}

/// What one repetition produced.
#[derive(Debug)]
enum Repetition {
    Sample {
        seconds: f64,
        collect_seconds: Option<f64>,
        itemsets: usize,
    },
    Failed(FailureKind, String),
}

/// Point result under construction. Samples are appended in repetition order.
struct PointAccumulator {
    min_support: f64,
    samples: Vec<f64>,
    sample_runs: Vec<usize>,
    collect: Vec<f64>,
    failures: Vec<RepetitionFailure>,
    itemsets: Option<usize>,
}

impl PointAccumulator {
    fn new(min_support: f64) -> Self {
        Self {
            min_support,
            samples: Vec::new(),
            sample_runs: Vec::new(),
            collect: Vec::new(),
            failures: Vec::new(),
            itemsets: None,
        }
    }

    fn record(&mut self, run: usize, repetition: Repetition) {
        match repetition {
            Repetition::Sample {
                seconds,
                collect_seconds,
                itemsets,
            } => {
                self.samples.push(seconds);
                self.sample_runs.push(run);
                self.collect.extend(collect_seconds);
                self.itemsets = Some(itemsets);
            }
            Repetition::Failed(kind, message) => {
                self.failures.push(RepetitionFailure { run, kind, message });
            }
        }
    }

    fn finalize(self) -> PointResult {
        PointResult {
            min_support: self.min_support,
            mean_time_seconds: stats::summarize(&self.samples),
            stats: SampleStats::from_samples(&self.samples),
            raw_times_seconds: self.samples,
            sample_runs: self.sample_runs,
            collect_times_seconds: self.collect,
            failed_runs: self.failures.len(),
            failures: self.failures,
            itemsets: self.itemsets,
        }
    }
}

type Progress<'a> = Box<dyn FnMut(usize, &PointResult) + 'a>;

pub struct SweepDriver<'a> {
    config: SweepConfig,
    state: SweepState,
    progress: Option<Progress<'a>>,
}

impl<'a> SweepDriver<'a> {
    /// Validate `config` and create a driver in the `Init` state.
    pub fn new(config: SweepConfig) -> BenchResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: SweepState::Init,
            progress: None,
        })
    }

    /// Called with each point right after it is finalized.
    pub fn on_point(mut self, f: impl FnMut(usize, &PointResult) + 'a) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Load `config.data_file` with the default loader and run the sweep.
    pub fn run(&mut self, backend: &mut dyn MiningBackend) -> BenchResult<BenchmarkReport> {
        self.run_with_loader(dataset::load, backend)
    }

    pub fn run_with_loader<L>(
        &mut self,
        loader: L,
        backend: &mut dyn MiningBackend,
    ) -> BenchResult<BenchmarkReport>
    where
        L: FnOnce(&Path) -> BenchResult<TransactionDataset>,
    {
        self.transition(SweepState::Loading);
        let dataset = match loader(&self.config.data_file) {
            Ok(ds) => ds,
            Err(e) => return Err(self.fail(e)),
        };
        tracing::info!(
            path = %dataset.path().display(),
            transactions = dataset.len(),
            "dataset loaded"
        );
        self.run_with_dataset(&dataset, backend)
    }

    /// Run the sweep over an already loaded dataset.
    pub fn run_with_dataset(
        &mut self,
        dataset: &TransactionDataset,
        backend: &mut dyn MiningBackend,
    ) -> BenchResult<BenchmarkReport> {
        if self.state == SweepState::Init {
            self.transition(SweepState::Loading);
        }

        let swept = self.sweep_points(dataset, backend);
        let torn_down = backend.teardown();
        let points = match swept {
            Ok(points) => points,
            Err(e) => return Err(self.fail(e)),
        };
        if let Err(e) = torn_down {
            tracing::warn!(backend = backend.name(), error = %e, "backend teardown failed");
        }

        let complete = points.iter().all(|p| p.failed_runs == 0);
        let report = BenchmarkReport {
            schema_version: REPORT_SCHEMA_VERSION,
            backend: backend.name().to_string(),
            config: self.config.clone(),
            dataset: DatasetInfo {
                path: dataset.path().to_path_buf(),
                transactions: dataset.len(),
                distinct_items: dataset.distinct_items(),
            },
            system_info: SystemInfo::collect(),
            points,
            complete,
        };
        self.transition(SweepState::ReportAssembled);
        Ok(report)
    }

    /// Hand the assembled report to `sink`, finishing the sweep.
    pub fn publish(&mut self, report: &BenchmarkReport, sink: &dyn ReportSink) -> BenchResult<()> {
        if self.state != SweepState::ReportAssembled {
            return Err(BenchError::Config(format!(
                "cannot publish a report from state {:?}",
                self.state
            )));
        }
        if let Err(e) = sink.emit(report) {
            return Err(self.fail(e));
        }
        self.transition(SweepState::Reported);
        self.transition(SweepState::Done);
        Ok(())
    }

    fn sweep_points(
        &mut self,
        dataset: &TransactionDataset,
        backend: &mut dyn MiningBackend,
    ) -> BenchResult<Vec<PointResult>> {
        backend.prepare(dataset)?;
        // a lazy backend defers the mining itself to materialization
        let timed = match (backend.is_lazy(), self.config.backend.count_materialization) {
            (_, true) => "mine+materialize",
            (true, false) => "plan only",
            (false, false) => "mine",
        };
        tracing::info!(
            backend = backend.name(),
            lazy = backend.is_lazy(),
            timed,
            "backend prepared"
        );

        let min_supports = self.config.min_supports.clone();
        let mut points = Vec::with_capacity(min_supports.len());
        for (idx, &min_support) in min_supports.iter().enumerate() {
            self.transition(SweepState::RunningRepetitions { point: idx });

            for warmup in 0..self.config.warmup_runs {
                if let Repetition::Failed(kind, message) = self.repetition(backend, min_support)? {
                    tracing::warn!(min_support, warmup, ?kind, %message, "warmup repetition failed");
                }
            }

            let mut acc = PointAccumulator::new(min_support);
            for run in 0..self.config.num_runs {
                let repetition = self.repetition(backend, min_support)?;
                match &repetition {
                    Repetition::Sample { seconds, itemsets, .. } => {
                        tracing::debug!(min_support, run, seconds, itemsets, "repetition finished");
                    }
                    Repetition::Failed(kind, message) => {
                        tracing::warn!(min_support, run, ?kind, %message, "repetition failed");
                    }
                }
                acc.record(run, repetition);
            }

            let point = acc.finalize();
            tracing::info!(
                min_support,
                mean_seconds = ?point.mean_time_seconds,
                samples = point.raw_times_seconds.len(),
                failed = point.failed_runs,
                "point finalized"
            );
            self.transition(SweepState::PointFinalized { point: idx });
            if let Some(progress) = self.progress.as_mut() {
                progress(idx, &point);
            }
            points.push(point);
        }
        Ok(points)
    }

    /// Stage, then time one mining call. Returns `Err` only for fatal errors.
    fn repetition(
        &self,
        backend: &mut dyn MiningBackend,
        min_support: f64,
    ) -> BenchResult<Repetition> {
        let backend_cfg = &self.config.backend;
        if let Err(e) = backend.stage(min_support) {
            return failed(e);
        }

        let started = Instant::now();
        let deadline = backend_cfg
            .repetition_timeout()
            .map(|limit| Deadline::new(started, limit));

        let handle = match backend.mine(min_support, deadline) {
            Ok(h) => h,
            Err(e) => return failed(e),
        };

        let (seconds, collect_seconds, itemsets) = if backend_cfg.count_materialization {
            let itemsets = handle.materialize(deadline);
            (started.elapsed().as_secs_f64(), None, itemsets)
        } else {
            let seconds = started.elapsed().as_secs_f64();
            let collect_started = Instant::now();
            let itemsets = handle.materialize(deadline);
            (
                seconds,
                Some(collect_started.elapsed().as_secs_f64()),
                itemsets,
            )
        };

        let itemsets = match itemsets {
            Ok(found) => found.len(),
            Err(e) => return failed(e),
        };

        // Eager backends cannot be interrupted; the limit is checked afterwards.
        if let Some(d) = deadline {
            if d.is_exceeded_by(started.elapsed()) {
                return failed(d.error());
            }
        }

        Ok(Repetition::Sample {
            seconds,
            collect_seconds,
            itemsets,
        })
    }

    fn transition(&mut self, next: SweepState) {
        tracing::debug!(from = ?self.state, to = ?next, "sweep state");
        self.state = next;
    }

    fn fail(&mut self, err: BenchError) -> BenchError {
        tracing::error!(error = %err, state = ?self.state, "sweep aborted");
        self.state = SweepState::Failed;
        err
    }
}

fn failed(err: BenchError) -> BenchResult<Repetition> {
    let kind = match &err {
        BenchError::RepetitionTimeout { .. } => FailureKind::Timeout,
        BenchError::MiningFailure(_) => FailureKind::MiningFailure,
        _ => return Err(err),
    };
    Ok(Repetition::Failed(kind, err.to_string()))
}
