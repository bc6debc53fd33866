//! Test discovery and selection
//!
//! [`walk`] finds runnable test files under a corpus subtree;
//! [`SelectionPolicy`] decides, once a file's metadata is known, whether it
//! applies at all.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use super::metadata::TestMetadata;
use crate::error::{HarnessError, Result};

const TEST_SUFFIX: &str = ".js";
const FIXTURE_SUFFIX: &str = "_FIXTURE.js";

/// Spec-section prefixes accepted for tests that only carry an `esid`
pub const DEFAULT_ESID_PREFIXES: &[&str] = &[
    "sec-array",
    "sec-%typedarray%",
    "sec-string",
    "sec-date",
    "sec-number",
    "sec-math",
    "sec-arraybuffer-length",
    "sec-arraybuffer",
    "sec-regexp",
];

/// Why a test was not run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    /// No recognized spec-section identifier
    NotApplicable { esid: Option<String> },
    /// Declares a feature on the blocklist
    BlockedFeature(String),
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Skip::NotApplicable { esid } => {
                write!(f, "Not ES6 or ES5 esid: {}", esid.as_deref().unwrap_or(""))
            }
            Skip::BlockedFeature(feature) => write!(f, "Blacklisted feature: {}", feature),
        }
    }
}

/// Inclusion/exclusion rules applied before a test runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SelectionPolicy {
    /// Prefixes matched against `esid`
    pub esid_prefixes: Vec<String>,
    /// Prefixes matched against `es6id`
    pub es6id_prefixes: Vec<String>,
    /// Corpus-relative test names run regardless of their ids
    pub path_allowlist: Vec<String>,
    /// Features that exclude a test outright
    pub feature_blocklist: Vec<String>,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            esid_prefixes: DEFAULT_ESID_PREFIXES.iter().map(|s| s.to_string()).collect(),
            es6id_prefixes: Vec::new(),
            path_allowlist: Vec::new(),
            feature_blocklist: Vec::new(),
        }
    }
}

/// `prefix` matches `id` when it is the whole id or is followed by `.`
fn id_has_prefix(id: &str, prefix: &str) -> bool {
    id.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

impl SelectionPolicy {
    /// Decide whether `name` with `meta` should run
    pub fn check(&self, name: &str, meta: &TestMetadata) -> std::result::Result<(), Skip> {
        if let Some(feature) = meta
            .features
            .iter()
            .find(|f| self.feature_blocklist.contains(f))
        {
            return Err(Skip::BlockedFeature(feature.clone()));
        }
        if self.is_applicable(name, meta) {
            Ok(())
        } else {
            Err(Skip::NotApplicable {
                esid: meta.esid.clone(),
            })
        }
    }

    fn is_applicable(&self, name: &str, meta: &TestMetadata) -> bool {
        let present = |id: &Option<String>| id.as_deref().is_some_and(|s| !s.is_empty());
        if present(&meta.es5id) || present(&meta.es6id) {
            return true;
        }
        if self.path_allowlist.iter().any(|p| p == name) {
            return true;
        }
        let matches = |id: &Option<String>, prefixes: &[String]| {
            id.as_deref()
                .is_some_and(|id| prefixes.iter().any(|p| id_has_prefix(id, p)))
        };
        matches(&meta.es6id, &self.es6id_prefixes) || matches(&meta.esid, &self.esid_prefixes)
    }
}

/// Whether a file name is a runnable test (not a fixture)
pub fn is_test_file(file_name: &str) -> bool {
    file_name.ends_with(TEST_SUFFIX) && !file_name.ends_with(FIXTURE_SUFFIX)
}

/// Collect every runnable test under `base/subtree`.
///
/// Names are `/`-joined and relative to `base`. Hidden entries are skipped
/// entirely; directory entries are visited in file-name order.
pub fn walk(base: &Path, subtree: &str) -> Result<Vec<String>> {
    let mut tests = Vec::new();
    walk_dir(base, subtree, &mut tests)?;
    Ok(tests)
}

fn walk_dir(base: &Path, name: &str, tests: &mut Vec<String>) -> Result<()> {
    let dir = base.join(name);
    let entries = std::fs::read_dir(&dir).map_err(|e| {
        HarnessError::Corpus(format!("cannot read directory {}: {}", dir.display(), e))
    })?;

    let mut entries = entries
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| HarnessError::io(&dir, e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if file_name.starts_with('.') {
            continue;
        }
        let child = format!("{}/{}", name.trim_end_matches('/'), file_name);
        let file_type = entry.file_type().map_err(|e| HarnessError::io(entry.path(), e))?;
        if file_type.is_dir() {
            walk_dir(base, &child, tests)?;
        } else if is_test_file(&file_name) {
            tests.push(child);
        }
    }
    Ok(())
}
