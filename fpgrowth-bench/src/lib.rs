//! Shared types, traits and the error taxonomy for fpgrowth-bench.
//!
//! The harness loads a transaction file once, sweeps a list of minimum-support
//! values with a fixed number of repetitions each, times every call into a
//! pluggable mining backend, and reduces the raw timings into a report that
//! other tooling can read without this crate.

pub mod adapters;
pub mod config;
pub mod datagen;
pub mod dataset;
pub mod report;
pub mod session;
pub mod stats;
pub mod sweep;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};

// ────────────────────────────────────────────────────────────────────────────────
// Error type
// ────────────────────────────────────────────────────────────────────────────────

pub type BenchResult<T> = std::result::Result<T, BenchError>;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// Dataset file missing or unreadable. Fatal, raised before any timing.
    #[error("failed to load dataset {}: {source}", path.display())]
    DataLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed or missing sweep configuration. Fatal, raised before loading.
    #[error("config error: {0}")]
    Config(String),

    /// Engine or session not initialized. Fatal for the whole sweep.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Engine-reported failure during one repetition.
    #[error("mining failed: {0}")]
    MiningFailure(String),

    /// One repetition exceeded the configured time limit.
    #[error("repetition exceeded {limit_secs:.3}s time limit")]
    RepetitionTimeout { limit_secs: f64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(String),
}

impl BenchError {
    /// Errors that only invalidate the current repetition. The sweep records
    /// them as a missing sample and moves on; every other error aborts it.
    pub fn is_repetition_local(&self) -> bool {
        matches!(
            self,
            BenchError::MiningFailure(_) | BenchError::RepetitionTimeout { .. }
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// MiningBackend trait, implemented by every adapter
// ────────────────────────────────────────────────────────────────────────────────

/// One frequent itemset in the common result shape of all backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequentItemset {
    /// Item names, or encoded column ids when names are disabled.
    pub items: Vec<String>,
    /// Number of transactions containing every item.
    pub count: usize,
    /// `count / num_transactions`.
    pub support: f64,
}

/// Result of a `mine` call. Eager backends hold a finished result; lazy ones
/// hold a job plan that only runs on `materialize`.
pub trait MiningHandle: Send {
    /// Force the result into a concrete collection.
    ///
    /// `deadline` bounds how long a lazy backend may wait for its workers;
    /// exceeding it yields `BenchError::RepetitionTimeout`.
    fn materialize(self: Box<Self>, deadline: Option<Deadline>)
        -> BenchResult<Vec<FrequentItemset>>;
}

/// Time limit of one repetition, anchored at the moment its timer started.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn new(started: Instant, limit: Duration) -> Self {
        Self { started, limit }
    }

    /// The instant the limit runs out, or `None` when it lies beyond what
    /// `Instant` can represent.
    pub fn at(&self) -> Option<Instant> {
        self.started.checked_add(self.limit)
    }

    pub fn is_exceeded_by(&self, elapsed: Duration) -> bool {
        elapsed > self.limit
    }

    pub fn error(&self) -> BenchError {
        BenchError::RepetitionTimeout {
            limit_secs: self.limit.as_secs_f64(),
        }
    }
}

/// Unified mining backend trait.
///
/// The sweep calls `prepare` once with the loaded dataset, outside every timed
/// region, then `stage` (untimed) and `mine` (timed) for each repetition.
pub trait MiningBackend: Send {
    fn name(&self) -> &str;

    /// Whether `mine` returns before the itemsets are computed.
    fn is_lazy(&self) -> bool;

    /// Bind the dataset: encode it and lay it out the way the engine wants.
    fn prepare(&mut self, dataset: &dataset::TransactionDataset) -> BenchResult<()>;

    /// Per-repetition setup that must stay out of the timed window.
    fn stage(&mut self, _min_support: f64) -> BenchResult<()> {
        Ok(())
    }

    /// Run the mining step against the prepared dataset.
    ///
    /// `deadline` is the limit of the whole repetition; backends that wait on
    /// workers stop waiting when it runs out.
    fn mine(
        &mut self,
        min_support: f64,
        deadline: Option<Deadline>,
    ) -> BenchResult<Box<dyn MiningHandle>>;

    fn teardown(&mut self) -> BenchResult<()> {
        Ok(())
    }
}

/// Absolute occurrence threshold for a fractional minimum support.
///
/// The epsilon keeps products like `0.3 * 10` from rounding up to 4.
pub fn min_count(min_support: f64, num_transactions: usize) -> usize {
    let raw = (min_support * num_transactions as f64 - 1e-9).ceil();
    if raw < 1.0 {
        1
    } else {
        raw as usize
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Host description
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub cpus: usize,
    pub timestamp: String,
    pub harness_version: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(1),
            timestamp: epoch_timestamp(),
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn epoch_timestamp() -> String {
    // seconds since epoch; no chrono for a single field
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{}s-since-epoch", secs)
}
