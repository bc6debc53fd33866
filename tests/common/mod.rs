//! Shared test helpers for integration tests
//!
//! `ScriptEngine` and `ScriptCompiler` stand in for a real JavaScript
//! engine. They ignore the JavaScript itself and only obey `//@` directive
//! lines, which is enough to drive every path through the harness:
//!
//! | Directive | Effect when run |
//! |-----------|-----------------|
//! | `//@syntax-error` | compile fails with a SyntaxError |
//! | `//@reference-error` | compile fails with a ReferenceError |
//! | `//@throw <Kind> <msg>` | throws a structured error |
//! | `//@throw-primitive <v>` | throws a primitive |
//! | `//@throw-object` | throws an object without a constructor |
//! | `//@throw-sentinel` | throws `IgnorableTestError` |
//! | `//@shared-memory` | touches `SharedArrayBuffer` |
//! | `//@create-realm` | calls `$262.createRealm()` |
//! | `//@needs <file>` | throws unless `harness/<file>` ran first |
//! | `//@strict-fails <msg>` | throws a Test262Error in strict variants |
//! | `//@print <msg>` | calls `print` |
//! | `//@panic <msg>` | panics inside the VM |

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quicksilver_test262::engine::{
    CompileOptions, Compiler, ConstructorProblem, Engine, EngineError, HostSurface, ThrownValue,
    Vm, SAB_STUB_NAME,
};
use quicksilver_test262::RunnerConfig;
use tempfile::TempDir;

/// A "compiled" script: the source text and the name it was compiled under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub name: String,
    pub source: String,
}

pub type Program = Arc<Script>;

/// How often the harness asked for VMs and compilations
#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub vms: Arc<AtomicUsize>,
    pub compiles: Arc<AtomicUsize>,
}

impl Counters {
    pub fn vms(&self) -> usize {
        self.vms.load(Ordering::SeqCst)
    }

    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

fn directives(source: &str) -> impl Iterator<Item = (&str, &str)> {
    source.lines().filter_map(|line| {
        let directive = line.trim().strip_prefix("//@")?.trim();
        Some(directive.split_once(' ').unwrap_or((directive, "")))
    })
}

#[derive(Debug, Clone, Default)]
pub struct ScriptCompiler {
    pub counters: Counters,
}

impl Compiler for ScriptCompiler {
    type Program = Program;

    fn compile(
        &self,
        source: &str,
        name: &str,
        _options: &CompileOptions,
    ) -> Result<Program, EngineError> {
        self.counters.compiles.fetch_add(1, Ordering::SeqCst);
        for (directive, _) in directives(source) {
            match directive {
                "syntax-error" => return Err(EngineError::Syntax("Unexpected token".into())),
                "reference-error" => {
                    return Err(EngineError::Reference("Invalid left-hand side".into()))
                }
                _ => {}
            }
        }
        Ok(Arc::new(Script {
            name: name.to_string(),
            source: source.to_string(),
        }))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptEngine {
    pub counters: Counters,
}

impl Engine for ScriptEngine {
    type Program = Program;
    type Vm = ScriptVm;

    fn new_vm(&self) -> ScriptVm {
        self.counters.vms.fetch_add(1, Ordering::SeqCst);
        ScriptVm::default()
    }
}

#[derive(Default)]
pub struct ScriptVm {
    host: Option<HostSurface>,
    shared_memory_stubbed: bool,
    loaded: Vec<String>,
}

fn thrown(kind: &str, message: &str) -> EngineError {
    EngineError::Exception(ThrownValue::structured(kind, message))
}

impl Vm for ScriptVm {
    type Program = Program;

    fn install_host(&mut self, surface: &HostSurface) -> Result<(), EngineError> {
        self.host = Some(surface.clone());
        Ok(())
    }

    fn run(&mut self, program: &Program) -> Result<(), EngineError> {
        self.loaded.push(program.name.clone());
        if program.name == SAB_STUB_NAME {
            self.shared_memory_stubbed = true;
            return Ok(());
        }

        let strict = program.source.starts_with("'use strict';");
        for (directive, arg) in directives(&program.source) {
            match directive {
                "syntax-error" | "reference-error" => {}
                "throw" => {
                    let (kind, message) = arg.split_once(' ').unwrap_or((arg, ""));
                    return Err(thrown(kind, message));
                }
                "throw-primitive" => {
                    return Err(EngineError::Exception(ThrownValue::Opaque {
                        display: arg.to_string(),
                    }))
                }
                "throw-object" => {
                    return Err(EngineError::Exception(ThrownValue::Object {
                        display: "[object Object]".into(),
                        problem: ConstructorProblem::Missing,
                    }))
                }
                "throw-sentinel" => return Err(EngineError::Exception(ThrownValue::Ignorable)),
                "shared-memory" if self.shared_memory_stubbed => {
                    return Err(EngineError::Exception(ThrownValue::Ignorable))
                }
                "shared-memory" => {}
                "create-realm" => match &self.host {
                    Some(_) => return Err(EngineError::Exception(ThrownValue::Ignorable)),
                    None => return Err(thrown("ReferenceError", "$262 is not defined")),
                },
                "needs" => {
                    let wanted = format!("harness/{}", arg);
                    if !self.loaded.contains(&wanted) {
                        return Err(thrown("ReferenceError", &format!("{} was not loaded", arg)));
                    }
                }
                "strict-fails" if strict => return Err(thrown("Test262Error", arg)),
                "strict-fails" => {}
                "print" => {
                    if let Some(host) = &self.host {
                        (*host.print)(arg);
                    }
                }
                "panic" => panic!("{}", arg),
                other => {
                    return Err(EngineError::Internal(format!("unknown directive {}", other)))
                }
            }
        }
        Ok(())
    }
}

/// Engine and compiler sharing one set of counters
pub fn scripted() -> (ScriptEngine, ScriptCompiler, Counters) {
    let counters = Counters::default();
    (
        ScriptEngine {
            counters: counters.clone(),
        },
        ScriptCompiler {
            counters: counters.clone(),
        },
        counters,
    )
}

/// Contents of a test file with the given descriptor and body
pub fn test_file(yaml: &str, body: &str) -> String {
    format!(
        "// Copyright (C) 2024 the test262 authors.\n/*---\n{}\n---*/\n\n{}\n",
        yaml, body
    )
}

/// A scratch corpus with `harness/assert.js`, `harness/sta.js` and `test/`
pub struct Corpus {
    dir: TempDir,
}

impl Corpus {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("corpus/harness")).unwrap();
        fs::create_dir_all(dir.path().join("corpus/test")).unwrap();
        let corpus = Self { dir };
        corpus.add_harness("assert.js", "function assert(value) {}");
        corpus.add_harness("sta.js", "function Test262Error(message) {}");
        corpus.write_baseline("{}");
        corpus
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("corpus")
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.dir.path().join("baseline.json")
    }

    pub fn add_harness(&self, name: &str, source: &str) {
        fs::write(self.root().join("harness").join(name), source).unwrap();
    }

    /// Add a test under the corpus root, e.g. `test/built-ins/x.js`
    pub fn add_test(&self, name: &str, yaml: &str, body: &str) {
        self.add_file(name, &test_file(yaml, body));
    }

    pub fn add_file(&self, name: &str, contents: &str) {
        let path = self.root().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    pub fn write_baseline(&self, json: &str) {
        fs::write(self.baseline_path(), json).unwrap();
    }

    /// Configuration pointing at this corpus and baseline
    pub fn config(&self) -> RunnerConfig {
        RunnerConfig {
            corpus_root: self.root(),
            baseline_path: self.baseline_path(),
            jobs: 2,
            ..RunnerConfig::default()
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
