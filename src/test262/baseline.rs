//! Baseline of known failures
//!
//! The baseline is a flat JSON object mapping `<test>-strict:<bool>` to the
//! exact failure message that variant is known to produce. It is a two-way
//! contract: a listed variant must keep failing with exactly that message,
//! and every unlisted variant must pass.

use rustc_hash::FxHashMap as HashMap;
use std::path::Path;

use crate::error::{HarnessError, Result};

/// Baseline key for one variant of a test
pub fn key(name: &str, strict: bool) -> String {
    format!("{}-strict:{}", name, strict)
}

/// An outcome that disagrees with the baseline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    pub key: String,
    /// Recorded message; empty when the variant was expected to pass
    pub expected: String,
    /// Observed message; empty when the variant passed
    pub actual: String,
}

/// Expected failures, loaded once per run and read-only afterwards
#[derive(Debug, Clone, Default)]
pub struct Baseline {
    expected: HashMap<String, String>,
}

impl Baseline {
    /// A baseline in which every variant is expected to pass
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let expected: HashMap<String, String> = serde_json::from_str(json)?;
        Ok(Self { expected })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        let baseline = Self::from_json(&json)?;
        tracing::debug!(path = %path.display(), entries = baseline.len(), "loaded baseline");
        Ok(baseline)
    }

    pub fn len(&self) -> usize {
        self.expected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }

    pub fn expected(&self, key: &str) -> Option<&str> {
        self.expected.get(key).map(String::as_str)
    }

    /// Compare an observed outcome (`""` = passed) with the recorded one
    pub fn compare(&self, key: &str, actual: &str) -> Option<Divergence> {
        let expected = self.expected(key).unwrap_or("");
        if expected == actual {
            return None;
        }
        Some(Divergence {
            key: key.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}
