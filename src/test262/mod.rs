//! Test262 Conformance Harness
//!
//! Runs the ECMAScript Test262 corpus through an [`Engine`] and a
//! [`Compiler`], and compares every outcome with a baseline of known
//! failures.
//!
//! The flow for one run:
//!
//! 1. [`selector::walk`] discovers test files under a corpus subtree.
//! 2. [`metadata::parse_file`] reads each file's descriptor block and
//!    [`SelectionPolicy::check`](selector::SelectionPolicy::check) decides
//!    whether it applies.
//! 3. [`Executor`] runs one or two strictness variants per file, each in a
//!    fresh VM, and classifies the outcome.
//! 4. The [`Baseline`] turns each outcome into a divergence or nothing, and
//!    the [`Aggregator`] collects divergences from all workers.
//! 5. The resulting [`RunReport`] prints the candidate baseline.
//!
//! ```no_run
//! use quicksilver_test262::test262::{Suite, SuiteStatus};
//! # fn run<E, C>(engine: E, compiler: C) -> quicksilver_test262::Result<()>
//! # where
//! #     E: quicksilver_test262::engine::Engine,
//! #     C: quicksilver_test262::engine::Compiler<Program = E::Program>,
//! # {
//! match quicksilver_test262::test262::run_from_env(engine, compiler)? {
//!     SuiteStatus::Skipped(reason) => eprintln!("skipped: {}", reason),
//!     SuiteStatus::Completed(report) => assert!(report.errored().is_empty()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod baseline;
pub mod executor;
pub mod metadata;
pub mod report;
pub mod selector;

use std::io::{self, Write};
use std::time::Instant;

use rayon::prelude::*;

pub use baseline::{Baseline, Divergence};
pub use executor::{Executor, ProgramCache};
pub use metadata::{Flag, Phase, TestMetadata};
pub use report::{Aggregator, RunReport, UnitResult, UnitStatus, VariantOutcome, VariantResult};
pub use selector::{SelectionPolicy, Skip};

use crate::config::RunnerConfig;
use crate::engine::{CompileOptions, Compiler, Engine};
use crate::error::Result;

const IGNORABLE_SKIP: &str = "Test threw IgnorableTestError";

/// Run context: everything one conformance run shares between workers
pub struct Suite<E, C>
where
    E: Engine,
    C: Compiler<Program = E::Program>,
{
    executor: Executor<E, C>,
    config: RunnerConfig,
    baseline: Baseline,
    aggregator: Aggregator,
}

impl<E, C> Suite<E, C>
where
    E: Engine,
    C: Compiler<Program = E::Program>,
{
    /// Create a suite, loading the baseline named in `config`
    pub fn new(engine: E, compiler: C, config: RunnerConfig) -> Result<Self> {
        let baseline = Baseline::load(&config.baseline_path)?;
        Ok(Self::with_baseline(engine, compiler, config, baseline))
    }

    pub fn with_baseline(engine: E, compiler: C, config: RunnerConfig, baseline: Baseline) -> Self {
        let options = CompileOptions {
            compatibility: config.compatibility,
        };
        let executor = Executor::new(engine, compiler, config.corpus_root.clone(), options);
        Self {
            executor,
            config,
            baseline,
            aggregator: Aggregator::new(),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn executor(&self) -> &Executor<E, C> {
        &self.executor
    }

    /// Test names under `subtree`, in execution order
    pub fn schedule(&self, subtree: &str) -> Result<Vec<String>> {
        selector::walk(&self.config.corpus_root, subtree)
    }

    /// Run every test under `subtree` and drain the results
    pub fn run(&self, subtree: &str) -> Result<RunReport> {
        let names = self.schedule(subtree)?;
        tracing::info!(subtree, tests = names.len(), "running test262 subtree");

        let units: Vec<UnitResult> = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .build()
        {
            Ok(pool) => pool.install(|| names.par_iter().map(|name| self.run_unit(name)).collect()),
            Err(e) => {
                tracing::warn!("failed to create thread pool ({e}), running sequentially");
                names.iter().map(|name| self.run_unit(name)).collect()
            }
        };

        let (divergences, benchmark) = self.aggregator.drain();
        let report = RunReport::new(units, divergences, benchmark);
        tracing::info!(
            subtree,
            divergences = report.divergences.len(),
            errored = report.errored().len(),
            "finished test262 subtree"
        );
        Ok(report)
    }

    /// Run every configured subtree into one report
    pub fn run_configured(&self) -> Result<RunReport> {
        let mut report = RunReport::default();
        for subtree in &self.config.subtrees {
            report.merge(self.run(subtree)?);
        }
        Ok(report)
    }

    /// Parse, select, execute and compare one test file
    pub fn run_unit(&self, name: &str) -> UnitResult {
        let path = self.config.corpus_root.join(name);
        let test = match metadata::parse_file(&path) {
            Ok(test) => test,
            Err(e) => {
                tracing::warn!(test = name, "could not parse: {}", e);
                return UnitResult::errored(name, format!("Could not parse {}: {}", name, e));
            }
        };

        if let Err(skip) = self.config.selection.check(name, &test.metadata) {
            tracing::debug!(test = name, "skipped: {}", skip);
            return UnitResult::skipped(name, skip.to_string());
        }

        let start = self.config.bench.then(Instant::now);
        let mut variants = Vec::with_capacity(2);
        let mut errors = Vec::new();

        for strict in executor::plan_variants(&test.metadata) {
            let outcome = match self.executor.execute(name, &test, strict) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(test = name, strict, "infrastructure error: {}", e);
                    errors.push(e.to_string());
                    continue;
                }
            };

            let divergence = match outcome {
                VariantOutcome::Skipped => None,
                _ => self
                    .baseline
                    .compare(&baseline::key(name, strict), outcome.message()),
            };
            if let Some(divergence) = &divergence {
                tracing::info!(
                    key = %divergence.key,
                    expected = %divergence.expected,
                    actual = %divergence.actual,
                    "divergence from baseline"
                );
                self.aggregator.record_divergence(divergence);
            }
            variants.push(VariantResult {
                strict,
                outcome,
                divergence,
            });
        }

        let duration = start.map(|start| {
            let elapsed = start.elapsed();
            self.aggregator.record_timing(name, elapsed);
            elapsed
        });

        let status = if !errors.is_empty() {
            UnitStatus::Errored(errors.join("; "))
        } else if variants.iter().any(|v| v.divergence.is_some()) {
            UnitStatus::Diverged
        } else if !variants.is_empty()
            && variants.iter().all(|v| v.outcome == VariantOutcome::Skipped)
        {
            UnitStatus::Skipped(IGNORABLE_SKIP.to_string())
        } else {
            UnitStatus::Ok
        };

        UnitResult {
            name: name.to_string(),
            status,
            variants,
            duration,
        }
    }
}

/// What a top-level run did
#[derive(Debug)]
pub enum SuiteStatus {
    /// Nothing ran (short mode, or no corpus checked out)
    Skipped(String),
    Completed(RunReport),
}

/// Run the configured suite with configuration from the environment.
///
/// The candidate baseline goes to stdout; the slowest tests (when timing
/// is on) and the summary go to stderr.
pub fn run_from_env<E, C>(engine: E, compiler: C) -> Result<SuiteStatus>
where
    E: Engine,
    C: Compiler<Program = E::Program>,
{
    let config = RunnerConfig::from_env()?;
    run_with_config(engine, compiler, config, io::stdout().lock(), io::stderr().lock())
}

/// Like [`run_from_env`] with explicit configuration and output streams
pub fn run_with_config<E, C, O, D>(
    engine: E,
    compiler: C,
    config: RunnerConfig,
    mut out: O,
    mut diag: D,
) -> Result<SuiteStatus>
where
    E: Engine,
    C: Compiler<Program = E::Program>,
    O: Write,
    D: Write,
{
    if config.short {
        return Ok(SuiteStatus::Skipped("short mode".to_string()));
    }
    if let Err(e) = std::fs::metadata(&config.corpus_root) {
        return Ok(SuiteStatus::Skipped(format!(
            "If you want to run tc39 tests, download them from https://github.com/tc39/test262 and put into {}. ({})",
            config.corpus_root.display(),
            e
        )));
    }

    let bench_top = config.bench.then_some(config.bench_top);
    let suite = Suite::new(engine, compiler, config)?;
    let report = suite.run_configured()?;

    if let Some(n) = bench_top {
        write!(diag, "{}", report.format_benchmark(n))?;
    }
    write!(diag, "{}", report.format_summary())?;
    report.write_baseline(&mut out)?;
    out.flush()?;

    Ok(SuiteStatus::Completed(report))
}
