//! Per-variant execution and classification
//!
//! A variant is one (test, strictness) pair. Each variant gets a brand new
//! VM: host surface, shared-memory stub, bootstrap scripts, includes, then
//! the test body. The outcome is classified against the test's negative
//! expectation; comparing with the baseline happens one level up.

use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;
use std::any::Any;
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::metadata::{Flag, ParsedTest, TestMetadata};
use super::report::VariantOutcome;
use crate::engine::{
    CompileOptions, Compiler, Engine, EngineError, HostSurface, Vm, SAB_STUB_NAME,
    SAB_STUB_SOURCE,
};
use crate::error::{HarnessError, Result};

/// Prologue prepended to the body of strict variants
pub const STRICT_PROLOGUE: &str = "'use strict';\n";

/// Bootstrap scripts loaded before every non-raw test, in this order
pub const BOOTSTRAP_SCRIPTS: &[&str] = &["assert.js", "sta.js"];

const HARNESS_DIR: &str = "harness";

/// Strictness of every variant a test must be run in, non-strict first
pub fn plan_variants(meta: &TestMetadata) -> Vec<bool> {
    if meta.has_flag(Flag::Raw) {
        return vec![false];
    }
    let mut variants = Vec::with_capacity(2);
    if !meta.has_flag(Flag::OnlyStrict) {
        variants.push(false);
    }
    if !meta.has_flag(Flag::NoStrict) {
        variants.push(true);
    }
    variants
}

/// Where a failing variant failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecPhase {
    /// Compiling the test body
    Compile,
    /// Running the already compiled body
    Execute,
}

/// Raw result of running a variant's body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed { phase: ExecPhase, error: EngineError },
}

/// Turn a raw run outcome into pass / fail / skip for `name`
pub fn classify(name: &str, meta: &TestMetadata, run: &RunOutcome) -> VariantOutcome {
    let expected = meta.expected_error();
    let (phase, error) = match run {
        RunOutcome::Completed => {
            return match expected {
                None => VariantOutcome::Pass,
                Some((phase, kind)) => VariantOutcome::Fail(format!(
                    "{}: Expected error {} ({} phase), none occurred",
                    name, kind, phase
                )),
            };
        }
        RunOutcome::Failed { phase, error } => (*phase, error),
    };

    if error.is_ignorable() {
        return VariantOutcome::Skipped;
    }

    let Some((expected_phase, expected_kind)) = expected else {
        return VariantOutcome::Fail(format!("{}: {}", name, error));
    };

    if expected_phase.is_before_execution() != (phase == ExecPhase::Compile) {
        return VariantOutcome::Fail(format!(
            "{}: error {} happened at the wrong phase (expected {})",
            name, error, expected_phase
        ));
    }

    match error.error_kind() {
        Err(problem) => VariantOutcome::Fail(format!("{}: {}", name, problem)),
        Ok(kind) if kind != expected_kind => VariantOutcome::Fail(format!(
            "{}: unexpected error type ({}), expected ({})",
            name, kind, expected_kind
        )),
        Ok(_) => VariantOutcome::Pass,
    }
}

/// Render a panic payload the way `panic!` formatted it
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Compiled harness scripts, shared by every worker for the whole run
pub struct ProgramCache<P> {
    programs: Mutex<HashMap<String, P>>,
}

impl<P: Clone> ProgramCache<P> {
    pub fn new() -> Self {
        Self {
            programs: Mutex::new(HashMap::default()),
        }
    }

    /// Return the cached program for `key`, compiling it on first use.
    ///
    /// The lock is held across the lookup and the insert, so concurrent
    /// first uses compile at most once.
    pub fn get_or_compile(&self, key: &str, compile: impl FnOnce() -> Result<P>) -> Result<P> {
        let mut programs = self.programs.lock();
        if let Some(program) = programs.get(key) {
            return Ok(program.clone());
        }
        let program = compile()?;
        programs.insert(key.to_string(), program.clone());
        Ok(program)
    }

    pub fn len(&self) -> usize {
        self.programs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<P: Clone> Default for ProgramCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs variants against an engine/compiler pair
pub struct Executor<E, C>
where
    E: Engine,
    C: Compiler<Program = E::Program>,
{
    engine: E,
    compiler: C,
    base: PathBuf,
    options: CompileOptions,
    cache: ProgramCache<C::Program>,
}

impl<E, C> Executor<E, C>
where
    E: Engine,
    C: Compiler<Program = E::Program>,
{
    pub fn new(engine: E, compiler: C, base: impl Into<PathBuf>, options: CompileOptions) -> Self {
        Self {
            engine,
            compiler,
            base: base.into(),
            options,
            cache: ProgramCache::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn cache(&self) -> &ProgramCache<C::Program> {
        &self.cache
    }

    /// Run and classify one variant.
    ///
    /// A panic anywhere in the variant becomes a failure; only
    /// infrastructure errors come back as `Err`.
    pub fn execute(&self, name: &str, test: &ParsedTest, strict: bool) -> Result<VariantOutcome> {
        let run = panic::catch_unwind(AssertUnwindSafe(|| self.run_variant(name, test, strict)));
        match run {
            Ok(Ok(outcome)) => {
                let classified = classify(name, &test.metadata, &outcome);
                tracing::debug!(test = name, strict, outcome = ?classified, "variant finished");
                Ok(classified)
            }
            Ok(Err(e)) => Err(e),
            Err(payload) => {
                let message = format!("panic while running {}: {}", name, panic_message(&*payload));
                tracing::warn!(test = name, strict, "{}", message);
                Ok(VariantOutcome::Fail(message))
            }
        }
    }

    /// Assemble a fresh VM and run the body, reporting where it failed
    pub fn run_variant(&self, name: &str, test: &ParsedTest, strict: bool) -> Result<RunOutcome> {
        let mut vm = self.engine.new_vm();

        let test_name = name.to_string();
        let surface = HostSurface::new(Arc::new(move |msg: &str| {
            tracing::debug!(test = %test_name, "print: {}", msg);
        }));
        vm.install_host(&surface)
            .map_err(|e| HarnessError::bootstrap(surface.object_name, e))?;

        let stub = self.cache.get_or_compile(SAB_STUB_NAME, || {
            self.compiler
                .compile(SAB_STUB_SOURCE, SAB_STUB_NAME, &self.options)
                .map_err(|e| HarnessError::bootstrap(SAB_STUB_NAME, e))
        })?;
        vm.run(&stub)
            .map_err(|e| HarnessError::bootstrap(SAB_STUB_NAME, e))?;

        if !test.metadata.has_flag(Flag::Raw) {
            let scripts = BOOTSTRAP_SCRIPTS
                .iter()
                .copied()
                .chain(test.metadata.includes.iter().map(String::as_str));
            for script in scripts {
                self.run_harness_file(&mut vm, script)?;
            }
        }

        let source: Cow<'_, str> = if strict {
            Cow::Owned(format!("{}{}", STRICT_PROLOGUE, test.source))
        } else {
            Cow::Borrowed(&test.source)
        };

        let program = match self.compiler.compile(&source, name, &self.options) {
            Ok(program) => program,
            Err(error) => {
                return Ok(RunOutcome::Failed {
                    phase: ExecPhase::Compile,
                    error,
                })
            }
        };

        Ok(match vm.run(&program) {
            Ok(()) => RunOutcome::Completed,
            Err(error) => RunOutcome::Failed {
                phase: ExecPhase::Execute,
                error,
            },
        })
    }

    /// Compile (cached) and run `harness/<script>` in `vm`
    fn run_harness_file(&self, vm: &mut E::Vm, script: &str) -> Result<()> {
        let key = format!("{}/{}", HARNESS_DIR, script);
        let program = self.cache.get_or_compile(&key, || {
            let path = self.base.join(HARNESS_DIR).join(script);
            let source =
                std::fs::read_to_string(&path).map_err(|e| HarnessError::io(&path, e))?;
            self.compiler
                .compile(&source, &key, &self.options)
                .map_err(|e| HarnessError::bootstrap(key.as_str(), e))
        })?;
        vm.run(&program)
            .map_err(|e| HarnessError::bootstrap(key.as_str(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ConstructorProblem, ThrownValue};
    use crate::test262::metadata::{Negative, Phase};

    fn meta(flags: &[Flag]) -> TestMetadata {
        TestMetadata {
            flags: flags.to_vec(),
            ..Default::default()
        }
    }

    fn negative(phase: Phase, kind: &str) -> TestMetadata {
        TestMetadata {
            negative: Some(Negative {
                phase: Some(phase),
                kind: Some(kind.to_string()),
            }),
            ..Default::default()
        }
    }

    fn failed(phase: ExecPhase, error: EngineError) -> RunOutcome {
        RunOutcome::Failed { phase, error }
    }

    fn thrown(kind: &str, message: &str) -> EngineError {
        EngineError::Exception(ThrownValue::structured(kind, message))
    }

    #[test]
    fn test_plan_variants() {
        assert_eq!(plan_variants(&meta(&[])), vec![false, true]);
        assert_eq!(plan_variants(&meta(&[Flag::Raw])), vec![false]);
        assert_eq!(plan_variants(&meta(&[Flag::Raw, Flag::OnlyStrict])), vec![false]);
        assert_eq!(plan_variants(&meta(&[Flag::OnlyStrict])), vec![true]);
        assert_eq!(plan_variants(&meta(&[Flag::NoStrict])), vec![false]);
    }

    #[test]
    fn test_classify_positive() {
        let m = meta(&[]);
        assert_eq!(classify("t.js", &m, &RunOutcome::Completed), VariantOutcome::Pass);
        assert_eq!(
            classify("t.js", &m, &failed(ExecPhase::Execute, thrown("Test262Error", "boom"))),
            VariantOutcome::Fail("t.js: Test262Error: boom".into())
        );
        assert_eq!(
            classify("t.js", &m, &failed(ExecPhase::Compile, EngineError::Syntax("bad".into()))),
            VariantOutcome::Fail("t.js: SyntaxError: bad".into())
        );
    }

    #[test]
    fn test_classify_ignorable_is_skipped() {
        let err = EngineError::Exception(ThrownValue::Ignorable);
        assert_eq!(
            classify("t.js", &meta(&[]), &failed(ExecPhase::Execute, err.clone())),
            VariantOutcome::Skipped
        );
        assert_eq!(
            classify("t.js", &negative(Phase::Runtime, "TypeError"), &failed(ExecPhase::Execute, err)),
            VariantOutcome::Skipped
        );
    }

    #[test]
    fn test_classify_negative_without_error() {
        let outcome = classify("t.js", &negative(Phase::Early, "SyntaxError"), &RunOutcome::Completed);
        assert_eq!(
            outcome,
            VariantOutcome::Fail("t.js: Expected error SyntaxError (early phase), none occurred".into())
        );
    }

    #[test]
    fn test_classify_early_syntax_error() {
        let m = negative(Phase::Early, "SyntaxError");
        let compile = failed(ExecPhase::Compile, EngineError::Syntax("Unexpected token".into()));
        assert_eq!(classify("t.js", &m, &compile), VariantOutcome::Pass);

        let late = failed(ExecPhase::Execute, thrown("SyntaxError", "from eval"));
        assert_eq!(
            classify("t.js", &m, &late),
            VariantOutcome::Fail(
                "t.js: error SyntaxError: from eval happened at the wrong phase (expected early)".into()
            )
        );

        let reference = failed(ExecPhase::Compile, EngineError::Reference("bad target".into()));
        assert_eq!(
            classify("t.js", &m, &reference),
            VariantOutcome::Fail("t.js: unexpected error type (ReferenceError), expected (SyntaxError)".into())
        );
    }

    #[test]
    fn test_classify_runtime_negative() {
        let m = negative(Phase::Runtime, "TypeError");
        assert_eq!(
            classify("t.js", &m, &failed(ExecPhase::Execute, thrown("TypeError", ""))),
            VariantOutcome::Pass
        );
        assert!(matches!(
            classify("t.js", &m, &failed(ExecPhase::Compile, EngineError::Syntax("x".into()))),
            VariantOutcome::Fail(msg) if msg.contains("wrong phase (expected runtime)")
        ));
        assert_eq!(
            classify("t.js", &m, &failed(ExecPhase::Execute, thrown("RangeError", "x"))),
            VariantOutcome::Fail("t.js: unexpected error type (RangeError), expected (TypeError)".into())
        );
    }

    #[test]
    fn test_classify_unresolvable_kind() {
        let m = negative(Phase::Runtime, "TypeError");
        let opaque = EngineError::Exception(ThrownValue::Opaque { display: "42".into() });
        assert_eq!(
            classify("t.js", &m, &failed(ExecPhase::Execute, opaque)),
            VariantOutcome::Fail("t.js: error is not an object (42)".into())
        );
        let bad_ctor = EngineError::Exception(ThrownValue::Object {
            display: "[object Object]".into(),
            problem: ConstructorProblem::NotAnObject,
        });
        assert_eq!(
            classify("t.js", &m, &failed(ExecPhase::Execute, bad_ctor)),
            VariantOutcome::Fail("t.js: error constructor is not an object ([object Object])".into())
        );
        let internal = EngineError::Internal("stack exhausted".into());
        assert_eq!(
            classify("t.js", &m, &failed(ExecPhase::Execute, internal)),
            VariantOutcome::Fail("t.js: error is not a JS error: stack exhausted".into())
        );
    }

    #[test]
    fn test_program_cache_compiles_once() {
        let cache: ProgramCache<u32> = ProgramCache::new();
        let mut compiled = 0;
        for _ in 0..3 {
            let p = cache
                .get_or_compile("harness/assert.js", || {
                    compiled += 1;
                    Ok(7)
                })
                .unwrap();
            assert_eq!(p, 7);
        }
        assert_eq!(compiled, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_program_cache_does_not_store_failures() {
        let cache: ProgramCache<u32> = ProgramCache::new();
        let err = cache
            .get_or_compile("harness/broken.js", || {
                Err(HarnessError::bootstrap("harness/broken.js", EngineError::Syntax("x".into())))
            })
            .unwrap_err();
        assert!(matches!(err, HarnessError::Bootstrap { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("index out of bounds");
        assert_eq!(panic_message(&*payload), "index out of bounds");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
    }

    /// Records the name of every program a VM runs, in order
    #[derive(Default)]
    struct RecordingEngine {
        ran: Arc<Mutex<Vec<String>>>,
    }

    struct RecordingVm {
        ran: Arc<Mutex<Vec<String>>>,
    }

    struct NameCompiler;

    impl Compiler for NameCompiler {
        type Program = Arc<str>;

        fn compile(
            &self,
            _source: &str,
            name: &str,
            _options: &CompileOptions,
        ) -> std::result::Result<Arc<str>, EngineError> {
            Ok(Arc::from(name))
        }
    }

    impl Engine for RecordingEngine {
        type Program = Arc<str>;
        type Vm = RecordingVm;

        fn new_vm(&self) -> RecordingVm {
            RecordingVm {
                ran: Arc::clone(&self.ran),
            }
        }
    }

    impl Vm for RecordingVm {
        type Program = Arc<str>;

        fn install_host(&mut self, _surface: &HostSurface) -> std::result::Result<(), EngineError> {
            Ok(())
        }

        fn run(&mut self, program: &Arc<str>) -> std::result::Result<(), EngineError> {
            self.ran.lock().push(program.to_string());
            Ok(())
        }
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_executor_is_shareable_across_workers() {
        assert_send_sync::<Executor<RecordingEngine, NameCompiler>>();
    }

    #[test]
    fn test_executor_runs_bootstrap_then_body() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("harness")).unwrap();
        for script in ["assert.js", "sta.js", "propertyHelper.js"] {
            std::fs::write(dir.path().join("harness").join(script), "").unwrap();
        }

        let engine = RecordingEngine::default();
        let ran = Arc::clone(&engine.ran);
        let executor = Executor::new(engine, NameCompiler, dir.path(), CompileOptions::default());
        let test = ParsedTest {
            metadata: TestMetadata {
                includes: vec!["propertyHelper.js".to_string()],
                ..Default::default()
            },
            source: String::new(),
        };

        for strict in [false, true] {
            assert_eq!(
                executor.execute("test/x.js", &test, strict).unwrap(),
                VariantOutcome::Pass
            );
        }
        let expected: Vec<String> = [
            SAB_STUB_NAME,
            "harness/assert.js",
            "harness/sta.js",
            "harness/propertyHelper.js",
            "test/x.js",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let ran = ran.lock();
        assert_eq!(ran[..5], expected[..]);
        assert_eq!(ran[5..], expected[..]);
        assert_eq!(executor.cache().len(), 4);
    }
}
