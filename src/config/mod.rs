//! Runner configuration
//!
//! Defaults match a checkout with the corpus at `testdata/test262` and the
//! baseline at `breaking_test_errors.json`. A JSON file named by
//! `TEST262_CONFIG` can override any field, and a handful of environment
//! variables override the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::CompatibilityMode;
use crate::error::{HarnessError, Result};
use crate::test262::selector::SelectionPolicy;

pub const ENV_CONFIG: &str = "TEST262_CONFIG";
pub const ENV_ROOT: &str = "TEST262_ROOT";
pub const ENV_BASELINE: &str = "TEST262_BASELINE";
pub const ENV_JOBS: &str = "TEST262_JOBS";
pub const ENV_BENCH: &str = "TEST262_BENCH";
pub const ENV_SHORT: &str = "TEST262_SHORT";

/// Configuration for a conformance run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Corpus root containing `harness/` and `test/`
    pub corpus_root: PathBuf,
    /// JSON baseline of known failures
    pub baseline_path: PathBuf,
    /// Corpus-relative directories to walk
    pub subtrees: Vec<String>,
    pub selection: SelectionPolicy,
    pub compatibility: CompatibilityMode,
    /// Record per-file wall-clock time
    pub bench: bool,
    /// How many of the slowest files to print
    pub bench_top: usize,
    /// Worker threads (0 = one per core)
    pub jobs: usize,
    /// Skip the whole suite
    pub short: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            corpus_root: PathBuf::from("testdata/test262"),
            baseline_path: PathBuf::from("breaking_test_errors.json"),
            subtrees: vec!["test".to_string()],
            selection: SelectionPolicy::default(),
            compatibility: CompatibilityMode::default(),
            bench: false,
            bench_top: 50,
            jobs: 0,
            short: false,
        }
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(HarnessError::Config(format!(
            "{} must be a boolean, got {:?}",
            var, other
        ))),
    }
}

impl RunnerConfig {
    /// Load a JSON config file; missing fields keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        serde_json::from_str(&json)
            .map_err(|e| HarnessError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Defaults, then `TEST262_CONFIG`, then the individual variables
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var_os(ENV_CONFIG) {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(root) = lookup(ENV_ROOT) {
            self.corpus_root = PathBuf::from(root);
        }
        if let Some(baseline) = lookup(ENV_BASELINE) {
            self.baseline_path = PathBuf::from(baseline);
        }
        if let Some(jobs) = lookup(ENV_JOBS) {
            self.jobs = jobs.trim().parse().map_err(|_| {
                HarnessError::Config(format!("{} must be a number, got {:?}", ENV_JOBS, jobs))
            })?;
        }
        if let Some(bench) = lookup(ENV_BENCH) {
            self.bench = parse_bool(ENV_BENCH, &bench)?;
        }
        if let Some(short) = lookup(ENV_SHORT) {
            self.short = parse_bool(ENV_SHORT, &short)?;
        }
        Ok(())
    }
}
