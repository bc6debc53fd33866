//! Engine and compiler seams
//!
//! The runner never parses or executes JavaScript itself. It talks to two
//! collaborators through the traits in this module:
//!
//! - a [`Compiler`] that turns source text into a program (this is where a
//!   source-to-source transpiler sits), and
//! - an [`Engine`] that hands out fresh, fully isolated [`Vm`]s which can run
//!   those programs.
//!
//! Errors coming back across the seam are a tagged union ([`EngineError`])
//! rather than an opaque value, so the classifier can ask for an error's
//! kind and get an explicit answer when there is none.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Name of the host object installed in every VM
pub const HOST_OBJECT_NAME: &str = "$262";

/// Name of the global bound to the ignorable sentinel
pub const SENTINEL_NAME: &str = "IgnorableTestError";

/// TypeError message for `$262.detachArrayBuffer` on a non-ArrayBuffer
pub const DETACH_INCOMPATIBLE: &str = "detachArrayBuffer() is called with incompatible argument";

/// Script run in every VM before anything else. Any access to
/// `SharedArrayBuffer` throws the sentinel, so shared-memory tests are
/// skipped uniformly instead of failing.
pub const SAB_STUB_SOURCE: &str = r#"Object.defineProperty(this, "SharedArrayBuffer", {
    get: function() {
        throw IgnorableTestError;
    }
});"#;

/// File name the stub is compiled under
pub const SAB_STUB_NAME: &str = "sabStub.js";

/// Language level requested from the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityMode {
    /// Plain ES5.1 plus whatever the engine supports natively
    Base,
    /// Run everything through the transpiler first
    #[default]
    Extended,
}

impl fmt::Display for CompatibilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompatibilityMode::Base => write!(f, "base"),
            CompatibilityMode::Extended => write!(f, "extended"),
        }
    }
}

/// Options passed to [`Compiler::compile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompileOptions {
    pub compatibility: CompatibilityMode,
}

/// Why the nominal kind of a thrown value could not be determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructorProblem {
    /// The object has no `constructor` property
    Missing,
    /// `constructor` exists but is not an object
    NotAnObject,
}

/// A value thrown by a running program
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThrownValue {
    /// An object whose constructor name could be read
    Structured { kind: String, message: String },
    /// An object whose constructor could not be resolved
    Object {
        display: String,
        problem: ConstructorProblem,
    },
    /// A primitive (string, number, ...) thrown directly
    Opaque { display: String },
    /// The `IgnorableTestError` sentinel, compared by identity in the VM
    Ignorable,
}

impl ThrownValue {
    /// Convenience constructor for a structured error
    pub fn structured(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ThrownValue::Structured {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThrownValue::Structured { kind, message } if message.is_empty() => write!(f, "{}", kind),
            ThrownValue::Structured { kind, message } => write!(f, "{}: {}", kind, message),
            ThrownValue::Object { display, .. } => write!(f, "{}", display),
            ThrownValue::Opaque { display } => write!(f, "{}", display),
            ThrownValue::Ignorable => write!(f, "{}", SENTINEL_NAME),
        }
    }
}

/// Error returned by a [`Compiler`] or a [`Vm`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Structural error detected while compiling
    Syntax(String),
    /// Invalid reference detected while compiling (e.g. bad assignment target)
    Reference(String),
    /// A value was thrown while running
    Exception(ThrownValue),
    /// Anything that is not a JavaScript error at all
    Internal(String),
}

/// Failure to extract a nominal kind from an [`EngineError`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindError {
    NotAnObject(String),
    NoConstructor(String),
    ConstructorNotObject(String),
    NotJsError(String),
}

impl fmt::Display for KindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KindError::NotAnObject(v) => write!(f, "error is not an object ({})", v),
            KindError::NoConstructor(v) => write!(f, "error does not have a constructor ({})", v),
            KindError::ConstructorNotObject(v) => {
                write!(f, "error constructor is not an object ({})", v)
            }
            KindError::NotJsError(v) => write!(f, "error is not a JS error: {}", v),
        }
    }
}

impl EngineError {
    /// Nominal kind of the error, e.g. `TypeError`.
    ///
    /// Compile-time errors map to fixed literals; runtime exceptions use
    /// the constructor name the VM resolved. Anything else is an explicit
    /// [`KindError`].
    pub fn error_kind(&self) -> std::result::Result<&str, KindError> {
        match self {
            EngineError::Syntax(_) => Ok("SyntaxError"),
            EngineError::Reference(_) => Ok("ReferenceError"),
            EngineError::Exception(value) => match value {
                ThrownValue::Structured { kind, .. } => Ok(kind),
                ThrownValue::Object {
                    display,
                    problem: ConstructorProblem::Missing,
                } => Err(KindError::NoConstructor(display.clone())),
                ThrownValue::Object {
                    display,
                    problem: ConstructorProblem::NotAnObject,
                } => Err(KindError::ConstructorNotObject(display.clone())),
                ThrownValue::Opaque { display } => Err(KindError::NotAnObject(display.clone())),
                ThrownValue::Ignorable => Err(KindError::NotJsError(SENTINEL_NAME.to_string())),
            },
            EngineError::Internal(msg) => Err(KindError::NotJsError(msg.clone())),
        }
    }

    /// Whether this is the ignorable sentinel thrown at runtime
    pub fn is_ignorable(&self) -> bool {
        matches!(self, EngineError::Exception(ThrownValue::Ignorable))
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Syntax(msg) => write!(f, "SyntaxError: {}", msg),
            EngineError::Reference(msg) => write!(f, "ReferenceError: {}", msg),
            EngineError::Exception(value) => write!(f, "{}", value),
            EngineError::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// Callback backing the global `print` function
pub type PrintFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Host bindings a [`Vm`] must expose before any script runs.
///
/// - `$262.detachArrayBuffer(buf)` detaches an ArrayBuffer-like argument,
///   or throws a `TypeError` with [`DETACH_INCOMPATIBLE`].
/// - `$262.createRealm()` always throws the sentinel; multi-realm tests are
///   skipped rather than failed.
/// - the global named [`SENTINEL_NAME`] is bound to a unique sentinel
///   value, reported back as [`ThrownValue::Ignorable`] when thrown.
/// - the global `print` forwards its first argument to [`HostSurface::print`].
#[derive(Clone)]
pub struct HostSurface {
    pub object_name: &'static str,
    pub sentinel_name: &'static str,
    pub print: PrintFn,
}

impl HostSurface {
    pub fn new(print: PrintFn) -> Self {
        Self {
            object_name: HOST_OBJECT_NAME,
            sentinel_name: SENTINEL_NAME,
            print,
        }
    }
}

impl fmt::Debug for HostSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostSurface")
            .field("object_name", &self.object_name)
            .field("sentinel_name", &self.sentinel_name)
            .finish_non_exhaustive()
    }
}

/// Source-to-program compiler (the transpiler pipeline)
pub trait Compiler: Send + Sync {
    /// Compiled program. Cached and shared across worker threads.
    type Program: Clone + Send + Sync;

    fn compile(
        &self,
        source: &str,
        name: &str,
        options: &CompileOptions,
    ) -> std::result::Result<Self::Program, EngineError>;
}

/// Factory for isolated VM instances
pub trait Engine: Send + Sync {
    /// Same program type the paired [`Compiler`] produces
    type Program: Clone + Send + Sync;
    type Vm: Vm<Program = Self::Program>;

    /// A fresh VM sharing no state with any other VM
    fn new_vm(&self) -> Self::Vm;
}

/// One isolated VM instance
pub trait Vm {
    type Program;

    /// Bind the host surface described on [`HostSurface`]
    fn install_host(&mut self, surface: &HostSurface) -> std::result::Result<(), EngineError>;

    /// Run a compiled program to completion
    fn run(&mut self, program: &Self::Program) -> std::result::Result<(), EngineError>;
}
