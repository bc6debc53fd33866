//! Quicksilver Test262: an ECMAScript conformance harness
//!
//! Drives the official Test262 corpus through a pluggable JavaScript engine
//! and checks every result against a baseline of known failures. Any change
//! in the engine's conformance shows up as a divergence: a test that starts
//! failing differently, a new failure, or a known failure that now passes.
//!
//! # Module Overview
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Traits the engine under test implements, plus the error model |
//! | [`test262`] | Metadata parsing, selection, execution, baseline and reporting |
//! | [`config`] | [`RunnerConfig`] with JSON file and environment overrides |
//! | [`logging`] | `tracing` subscriber setup |
//!
//! # Quick Start
//!
//! ```no_run
//! # fn run<E, C>(engine: E, compiler: C) -> quicksilver_test262::Result<()>
//! # where
//! #     E: quicksilver_test262::engine::Engine,
//! #     C: quicksilver_test262::engine::Compiler<Program = E::Program>,
//! # {
//! quicksilver_test262::logging::init();
//! if let quicksilver_test262::SuiteStatus::Completed(report) =
//!     quicksilver_test262::run_from_env(engine, compiler)?
//! {
//!     assert!(!report.has_divergences(), "conformance changed");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod logging;
pub mod test262;

mod error;

pub use config::RunnerConfig;
pub use error::{HarnessError, MalformedReason, Result};
pub use test262::{run_from_env, run_with_config, Suite, SuiteStatus};

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
