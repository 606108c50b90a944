//! Reduction of raw timing samples into summary statistics.
//!
//! Samples are never reordered or dropped here; callers keep the raw sequence
//! next to the summary for distribution plots.

use serde::{Deserialize, Serialize};

/// Arithmetic mean of `samples`, or `None` when there are none.
pub fn summarize(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Extended summary over the successful samples of one sweep point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation (n - 1); zero for a single sample.
    pub stddev: f64,
}

impl SampleStats {
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let mean = summarize(samples)?;

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };

        let stddev = if n > 1 {
            let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        } else {
            0.0
        };

        Some(Self {
            mean,
            median,
            min: sorted[0],
            max: sorted[n - 1],
            stddev,
        })
    }
}
