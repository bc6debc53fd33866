//! Result aggregation and reporting
//!
//! Workers push divergences and timings into a shared [`Aggregator`]; when
//! the run is over it is drained into a [`RunReport`], which can emit the
//! candidate baseline, the slowest tests and a human-readable summary.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

use super::baseline::Divergence;
use crate::error::Result;

/// Outcome of one (test, strictness) variant after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantOutcome {
    Pass,
    Fail(String),
    /// The test needs an optional capability the harness does not provide
    Skipped,
}

impl VariantOutcome {
    /// Failure message as stored in the baseline (`""` when passing)
    pub fn message(&self) -> &str {
        match self {
            VariantOutcome::Fail(msg) => msg,
            VariantOutcome::Pass | VariantOutcome::Skipped => "",
        }
    }
}

/// One executed variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantResult {
    pub strict: bool,
    pub outcome: VariantOutcome,
    pub divergence: Option<Divergence>,
}

/// Framework-level status of one test file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    /// Every executed variant agreed with the baseline
    Ok,
    /// At least one variant disagreed with the baseline
    Diverged,
    /// Not run, or every variant was skipped
    Skipped(String),
    /// Infrastructure failure; no classification happened
    Errored(String),
}

/// Everything known about one test file after the run
#[derive(Debug, Clone)]
pub struct UnitResult {
    pub name: String,
    pub status: UnitStatus,
    pub variants: Vec<VariantResult>,
    pub duration: Option<Duration>,
}

impl UnitResult {
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: UnitStatus::Skipped(reason.into()),
            variants: Vec::new(),
            duration: None,
        }
    }

    pub fn errored(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: UnitStatus::Errored(message.into()),
            variants: Vec::new(),
            duration: None,
        }
    }
}

/// Wall-clock time spent on one test file, all variants included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkItem {
    pub name: String,
    pub duration: Duration,
}

/// Run-scoped collector shared by all workers
#[derive(Debug, Default)]
pub struct Aggregator {
    divergences: Mutex<BTreeMap<String, String>>,
    benchmark: Mutex<Vec<BenchmarkItem>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the observed message for a diverging variant (last write wins)
    pub fn record_divergence(&self, divergence: &Divergence) {
        self.divergences
            .lock()
            .insert(divergence.key.clone(), divergence.actual.clone());
    }

    pub fn record_timing(&self, name: &str, duration: Duration) {
        self.benchmark.lock().push(BenchmarkItem {
            name: name.to_string(),
            duration,
        });
    }

    pub fn divergence_count(&self) -> usize {
        self.divergences.lock().len()
    }

    /// Take everything collected so far, leaving the aggregator empty
    pub fn drain(&self) -> (BTreeMap<String, String>, Vec<BenchmarkItem>) {
        let divergences = std::mem::take(&mut *self.divergences.lock());
        let benchmark = std::mem::take(&mut *self.benchmark.lock());
        (divergences, benchmark)
    }
}

/// Per-chapter variant counts
#[derive(Debug, Clone, Default)]
pub struct ChapterResult {
    pub name: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub diverged: usize,
}

impl ChapterResult {
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64 * 100.0
        }
    }
}

/// Chapter of a test name: the first component below `test/`
fn chapter_of(name: &str) -> &str {
    let rest = name.strip_prefix("test/").unwrap_or(name);
    rest.split('/').next().unwrap_or("unknown")
}

/// Everything a finished run produced
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub units: Vec<UnitResult>,
    /// Candidate baseline: key → observed message, diverging variants only
    pub divergences: BTreeMap<String, String>,
    pub benchmark: Vec<BenchmarkItem>,
}

impl RunReport {
    pub fn new(
        units: Vec<UnitResult>,
        divergences: BTreeMap<String, String>,
        mut benchmark: Vec<BenchmarkItem>,
    ) -> Self {
        benchmark.sort_by(|a, b| b.duration.cmp(&a.duration));
        Self {
            units,
            divergences,
            benchmark,
        }
    }

    /// Fold another report (e.g. another subtree) into this one
    pub fn merge(&mut self, other: RunReport) {
        self.units.extend(other.units);
        self.divergences.extend(other.divergences);
        self.benchmark.extend(other.benchmark);
        self.benchmark.sort_by(|a, b| b.duration.cmp(&a.duration));
    }

    fn variants(&self) -> impl Iterator<Item = &VariantResult> {
        self.units.iter().flat_map(|u| u.variants.iter())
    }

    pub fn variants_passed(&self) -> usize {
        self.variants()
            .filter(|v| v.outcome == VariantOutcome::Pass)
            .count()
    }

    pub fn variants_failed(&self) -> usize {
        self.variants()
            .filter(|v| matches!(v.outcome, VariantOutcome::Fail(_)))
            .count()
    }

    pub fn variants_skipped(&self) -> usize {
        self.variants()
            .filter(|v| v.outcome == VariantOutcome::Skipped)
            .count()
    }

    pub fn units_with(&self, pred: impl Fn(&UnitStatus) -> bool) -> usize {
        self.units.iter().filter(|u| pred(&u.status)).count()
    }

    /// Units that hit an infrastructure error
    pub fn errored(&self) -> Vec<&UnitResult> {
        self.units
            .iter()
            .filter(|u| matches!(u.status, UnitStatus::Errored(_)))
            .collect()
    }

    pub fn has_divergences(&self) -> bool {
        !self.divergences.is_empty()
    }

    /// Write the candidate baseline as indented JSON.
    ///
    /// Nothing is written when there are no divergences; the return value
    /// says whether anything was.
    pub fn write_baseline<W: Write>(&self, mut writer: W) -> Result<bool> {
        if self.divergences.is_empty() {
            return Ok(false);
        }
        serde_json::to_writer_pretty(&mut writer, &self.divergences)?;
        writeln!(writer)?;
        Ok(true)
    }

    /// The `n` slowest test files, slowest first
    pub fn slowest(&self, n: usize) -> &[BenchmarkItem] {
        &self.benchmark[..n.min(self.benchmark.len())]
    }

    /// `<name>\t<milliseconds>` per line for the slowest `n` files
    pub fn format_benchmark(&self, n: usize) -> String {
        self.slowest(n)
            .iter()
            .map(|item| format!("{}\t{}\n", item.name, item.duration.as_millis()))
            .collect()
    }

    pub fn chapters(&self) -> BTreeMap<String, ChapterResult> {
        let mut chapters: BTreeMap<String, ChapterResult> = BTreeMap::new();
        for unit in &self.units {
            let chapter = chapter_of(&unit.name);
            for variant in &unit.variants {
                if variant.outcome == VariantOutcome::Skipped {
                    continue;
                }
                let entry = chapters
                    .entry(chapter.to_string())
                    .or_insert_with(|| ChapterResult {
                        name: chapter.to_string(),
                        ..Default::default()
                    });
                entry.total += 1;
                match variant.outcome {
                    VariantOutcome::Pass => entry.passed += 1,
                    VariantOutcome::Fail(_) => entry.failed += 1,
                    VariantOutcome::Skipped => {}
                }
                if variant.divergence.is_some() {
                    entry.diverged += 1;
                }
            }
        }
        chapters
    }

    /// Format as a summary string
    pub fn format_summary(&self) -> String {
        let mut s = String::new();
        s.push_str("\n=== Test262 Conformance Report ===\n\n");
        s.push_str(&format!(
            "Files: {} | Skipped: {} | Errored: {}\n",
            self.units.len(),
            self.units_with(|s| matches!(s, UnitStatus::Skipped(_))),
            self.units_with(|s| matches!(s, UnitStatus::Errored(_))),
        ));
        s.push_str(&format!(
            "Variants: Pass: {} | Fail: {} | Skip: {}\n",
            self.variants_passed(),
            self.variants_failed(),
            self.variants_skipped(),
        ));
        s.push_str(&format!("Divergences from baseline: {}\n\n", self.divergences.len()));

        s.push_str("Per-Chapter Results:\n");
        s.push_str(&format!(
            "{:<30} {:>6} {:>6} {:>6} {:>6} {:>7}\n",
            "Chapter", "Total", "Pass", "Fail", "Diff", "Rate"
        ));
        s.push_str(&"-".repeat(68));
        s.push('\n');

        for chapter in self.chapters().values() {
            s.push_str(&format!(
                "{:<30} {:>6} {:>6} {:>6} {:>6} {:>6.1}%\n",
                chapter.name,
                chapter.total,
                chapter.passed,
                chapter.failed,
                chapter.diverged,
                chapter.pass_rate()
            ));
        }

        let errored = self.errored();
        if !errored.is_empty() {
            s.push_str("\nErrors:\n");
            for unit in errored {
                if let UnitStatus::Errored(msg) = &unit.status {
                    s.push_str(&format!("  {}: {}\n", unit.name, msg));
                }
            }
        }

        s
    }
}
