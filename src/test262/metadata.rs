//! Test262 descriptor block parsing
//!
//! Every Test262 file carries a YAML block between `/*---` and `---*/`
//! declaring what the test expects (a negative outcome), what it needs
//! (harness includes, features) and how it must be run (flags).

use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::error::{HarnessError, MalformedReason, Result};

const META_START: &str = "/*---";
const META_END: &str = "---*/";

/// When a negative test's error must surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Parse,
    Early,
    Resolution,
    Runtime,
}

impl Phase {
    /// Whether the error must be raised before the body starts executing
    pub fn is_before_execution(self) -> bool {
        !matches!(self, Phase::Runtime)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Parse => write!(f, "parse"),
            Phase::Early => write!(f, "early"),
            Phase::Resolution => write!(f, "resolution"),
            Phase::Runtime => write!(f, "runtime"),
        }
    }
}

/// The `negative:` entry of a descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Negative {
    #[serde(default)]
    pub phase: Option<Phase>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Behavioral markers from the `flags:` list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Flag {
    #[serde(rename = "onlyStrict")]
    OnlyStrict,
    #[serde(rename = "noStrict")]
    NoStrict,
    #[serde(rename = "raw")]
    Raw,
    #[serde(rename = "module")]
    Module,
    #[serde(rename = "async")]
    Async,
    #[serde(rename = "generated")]
    Generated,
    #[serde(rename = "CanBlockIsFalse")]
    CanBlockIsFalse,
    #[serde(rename = "CanBlockIsTrue")]
    CanBlockIsTrue,
    #[serde(rename = "non-deterministic")]
    NonDeterministic,
    #[serde(other)]
    Other,
}

/// Test262 metadata parsed from the descriptor block
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TestMetadata {
    pub description: String,
    pub negative: Option<Negative>,
    pub includes: Vec<String>,
    pub flags: Vec<Flag>,
    pub features: Vec<String>,
    pub es5id: Option<String>,
    pub es6id: Option<String>,
    pub esid: Option<String>,
    pub locale: Vec<String>,
}

impl TestMetadata {
    pub fn has_flag(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }

    /// The declared negative expectation, if the test is negative.
    ///
    /// A `negative:` entry with a phase but no type does not make the test
    /// negative.
    pub fn expected_error(&self) -> Option<(Phase, &str)> {
        let negative = self.negative.as_ref()?;
        match (negative.phase, negative.kind.as_deref()) {
            (Some(phase), Some(kind)) if !kind.is_empty() => Some((phase, kind)),
            _ => None,
        }
    }

    /// Every spec-section identifier present, legacy schemes first
    pub fn spec_ids(&self) -> impl Iterator<Item = &str> {
        [&self.es5id, &self.es6id, &self.esid]
            .into_iter()
            .filter_map(|id| id.as_deref())
            .filter(|id| !id.is_empty())
    }

    fn validate(&self) -> Result<()> {
        if let Some(negative) = &self.negative {
            let has_kind = negative.kind.as_deref().is_some_and(|k| !k.is_empty());
            if has_kind && negative.phase.is_none() {
                return Err(HarnessError::InvalidMetadata(
                    "negative type is set, but phase isn't".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// A test file split into its metadata and its full source text
#[derive(Debug, Clone)]
pub struct ParsedTest {
    pub metadata: TestMetadata,
    pub source: String,
}

/// Locate the descriptor region (without delimiters) inside `contents`
fn descriptor_region(contents: &str) -> Result<&str> {
    let start = contents
        .find(META_START)
        .ok_or(HarnessError::MalformedFile(MalformedReason::MissingStart))?
        + META_START.len();
    let end = contents
        .find(META_END)
        .ok_or(HarnessError::MalformedFile(MalformedReason::MissingEnd))?;
    if end <= start {
        return Err(HarnessError::MalformedFile(MalformedReason::EndBeforeStart));
    }
    Ok(&contents[start..end])
}

/// Parse the descriptor block of a test file.
///
/// The contents are handed back untouched as [`ParsedTest::source`].
pub fn parse(contents: String) -> Result<ParsedTest> {
    let region = descriptor_region(&contents)?;
    let metadata: TestMetadata = if region.trim().is_empty() {
        TestMetadata::default()
    } else {
        serde_yaml::from_str(region)?
    };
    metadata.validate()?;
    Ok(ParsedTest {
        metadata,
        source: contents,
    })
}

/// Read and parse a test file
pub fn parse_file(path: &Path) -> Result<ParsedTest> {
    let contents = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
    parse(contents)
}
