//! Error types for the Test262 runner
//!
//! Everything in here is an *infrastructure* error: a corpus that cannot be
//! read, a descriptor block that cannot be decoded, a harness script that
//! fails to load. Test outcomes that disagree with the baseline are not
//! errors; they are [`Divergence`](crate::test262::baseline::Divergence)s.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::engine::EngineError;

/// Why a descriptor block could not be located
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// No `/*---` in the file
    MissingStart,
    /// No `---*/` in the file
    MissingEnd,
    /// `---*/` appears before the end of `/*---`
    EndBeforeStart,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReason::MissingStart => write!(f, "missing /*--- delimiter"),
            MalformedReason::MissingEnd => write!(f, "missing ---*/ delimiter"),
            MalformedReason::EndBeforeStart => write!(f, "---*/ appears before /*---"),
        }
    }
}

/// Main error type for the runner
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The test file has no usable descriptor block
    #[error("Invalid file format: {0}")]
    MalformedFile(MalformedReason),

    /// The descriptor decoded but violates a cross-field rule
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// YAML decode error inside the descriptor block
    #[error("YAMLError: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON decode/encode error (baseline, config)
    #[error("JSONError: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error with the path that caused it
    #[error("IOError: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error writing an artifact
    #[error("IOError: {0}")]
    Output(#[from] std::io::Error),

    /// The corpus layout is not what the runner expects
    #[error("CorpusError: {0}")]
    Corpus(String),

    /// A harness script (stub, bootstrap or include) failed to compile or run
    #[error("BootstrapError: {script}: {error}")]
    Bootstrap { script: String, error: EngineError },

    /// Invalid runner configuration
    #[error("ConfigError: {0}")]
    Config(String),
}

impl HarnessError {
    /// Create an IO error bound to a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarnessError::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a bootstrap error for a harness script
    pub fn bootstrap(script: impl Into<String>, error: EngineError) -> Self {
        HarnessError::Bootstrap {
            script: script.into(),
            error,
        }
    }
}

/// Result type alias for the runner
pub type Result<T> = std::result::Result<T, HarnessError>;
