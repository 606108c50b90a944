//! Sweep configuration parsing and validation.
//!
//! The configuration file is shared with tooling outside this crate, so the
//! format is versioned and strict: unknown keys are rejected and every field
//! is checked before the dataset is touched.
//!
//! ```toml
//! version = 1
//! data_file = "sample.txt"
//! min_supports = [0.5, 0.3, 0.2]
//! num_runs = 5
//!
//! [backend]
//! kind = "cluster"
//! num_partitions = 12
//! ```

use crate::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Only format version understood by this harness.
pub const CONFIG_VERSION: u32 = 1;

/// Which mining engine a sweep drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process, eager, single machine.
    #[default]
    Local,
    /// Partitioned across an executor session, lazy until collected.
    Cluster,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Cluster => write!(f, "cluster"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "cluster" => Ok(Self::Cluster),
            other => Err(BenchError::Config(format!("unknown backend '{}'", other))),
        }
    }
}

/// Backend-specific options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    /// Cluster only. Defaults to the number of available cores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_partitions: Option<usize>,
    /// Report item names instead of encoded column ids.
    #[serde(default = "default_true")]
    pub use_colnames: bool,
    /// Include materialization (`collect`) in the timed window.
    #[serde(default)]
    pub count_materialization: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_timeout_secs: Option<f64>,
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Local,
            num_partitions: None,
            use_colnames: true,
            count_materialization: false,
            repetition_timeout_secs: None,
        }
    }
}

impl BackendConfig {
    pub fn partitions(&self) -> usize {
        self.num_partitions.unwrap_or_else(num_cpus::get)
    }

    pub fn repetition_timeout(&self) -> Option<Duration> {
        self.repetition_timeout_secs
            .and_then(|t| Duration::try_from_secs_f64(t).ok())
    }
}

/// Complete sweep configuration. Immutable once validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    pub data_file: PathBuf,
    pub min_supports: Vec<f64>,
    pub num_runs: usize,
    /// Untimed repetitions run before the measured ones at each point.
    #[serde(default)]
    pub warmup_runs: usize,
    #[serde(default)]
    pub backend: BackendConfig,
}

impl SweepConfig {
    pub fn new(data_file: impl Into<PathBuf>, min_supports: Vec<f64>, num_runs: usize) -> Self {
        Self {
            version: CONFIG_VERSION,
            data_file: data_file.into(),
            min_supports,
            num_runs,
            warmup_runs: 0,
            backend: BackendConfig::default(),
        }
    }

    /// Load and validate a configuration file. The encoding is picked from the
    /// extension (`.toml`, `.yaml`/`.yml`, `.json`). A relative `data_file`
    /// resolves against the directory holding the configuration file.
    pub fn load(path: &Path) -> BenchResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            BenchError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let mut config = Self::parse(&content, &ext)?;

        if config.data_file.is_relative() {
            if let Some(dir) = path.parent() {
                config.data_file = dir.join(&config.data_file);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse without validating or resolving paths.
    pub fn parse(content: &str, format: &str) -> BenchResult<Self> {
        match format {
            "toml" => toml::from_str(content)
                .map_err(|e| BenchError::Config(format!("invalid TOML: {}", e))),
            "yaml" | "yml" => serde_yaml::from_str(content)
                .map_err(|e| BenchError::Config(format!("invalid YAML: {}", e))),
            "json" => serde_json::from_str(content)
                .map_err(|e| BenchError::Config(format!("invalid JSON: {}", e))),
            other => Err(BenchError::Config(format!(
                "unsupported config format '{}' (expected toml, yaml or json)",
                other
            ))),
        }
    }

    pub fn validate(&self) -> BenchResult<()> {
        if self.version != CONFIG_VERSION {
            return Err(BenchError::Config(format!(
                "unsupported config version {} (expected {})",
                self.version, CONFIG_VERSION
            )));
        }
        if self.num_runs == 0 {
            return Err(BenchError::Config("num_runs must be at least 1".into()));
        }
        if self.min_supports.is_empty() {
            return Err(BenchError::Config("min_supports must not be empty".into()));
        }
        if let Some(bad) = self
            .min_supports
            .iter()
            .find(|s| !s.is_finite() || **s <= 0.0 || **s > 1.0)
        {
            return Err(BenchError::Config(format!(
                "min_support {} is outside (0, 1]",
                bad
            )));
        }
        if self.backend.num_partitions == Some(0) {
            return Err(BenchError::Config("num_partitions must be at least 1".into()));
        }
        if let Some(t) = self.backend.repetition_timeout_secs {
            if !t.is_finite() || t <= 0.0 {
                return Err(BenchError::Config(format!(
                    "repetition_timeout_secs must be positive, got {}",
                    t
                )));
            }
            if Duration::try_from_secs_f64(t).is_err() {
                return Err(BenchError::Config(format!(
                    "repetition_timeout_secs {} is too large",
                    t
                )));
            }
        }
        Ok(())
    }
}
