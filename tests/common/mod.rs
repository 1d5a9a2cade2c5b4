#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use mutant_sieve::Config;
use mutant_sieve::isolation::{BuildOutcome, IsolationError, MutantBuilder};
use mutant_sieve::ports::{PortError, TestFinder, TestRunner, TestRunnerResult};
use mutant_sieve::runner::CancellationToken;
use tempfile::TempDir;

pub const CALC_LIB: &str = r#"pub fn is_positive(n: i32) -> bool {
    n > 0
}

pub fn add(a: i32, b: i32) -> i32 {
    a + b
}

pub fn clamp_zero(n: i32) -> i32 {
    if n < 0 {
        return 0;
    }
    n
}
"#;

/// Checks `is_positive` and `add` but never exercises `clamp_zero`.
pub const CHECK_SCRIPT: &str = r#"#!/bin/sh
grep -q 'n > 0' ../src/lib.rs || exit 1
grep -q 'a + b' ../src/lib.rs || exit 1
exit 0
"#;

/// Five points, seven mutants in total.
pub const CALC_MUTANTS: usize = 7;
pub const CALC_POINTS: usize = 5;

pub struct Fixture {
    pub dir: TempDir,
    pub solution: PathBuf,
    pub temp_root: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let solution = dir.path().join("app");
        let calc = solution.join("calc");
        std::fs::create_dir_all(calc.join("src")).unwrap();
        std::fs::create_dir_all(calc.join("tests")).unwrap();
        std::fs::write(calc.join("Cargo.toml"), "[package]\nname = \"calc\"\n").unwrap();
        std::fs::write(calc.join("src/lib.rs"), CALC_LIB).unwrap();
        std::fs::write(calc.join("tests/check.sh"), CHECK_SCRIPT).unwrap();
        let temp_root = dir.path().join("sandboxes");
        std::fs::create_dir_all(&temp_root).unwrap();
        Self {
            dir,
            solution,
            temp_root,
        }
    }

    pub fn assembly(&self) -> PathBuf {
        self.solution.join("calc/tests/check.sh")
    }

    pub fn lib_path(&self) -> PathBuf {
        self.solution.join("calc/src/lib.rs")
    }

    pub fn config(&self) -> Config {
        Config::new(&self.solution)
            .with_test_assembly_paths([self.assembly()])
            .with_temp_root(&self.temp_root)
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.solution.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn sandbox_entries(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.temp_root)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub assemblies: Vec<PathBuf>,
    pub test_names: Vec<String>,
}

/// Answers from a script, then a fixed verdict once the script runs out.
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Result<TestRunnerResult, PortError>>>,
    fallback: TestRunnerResult,
    calls: Mutex<Vec<Call>>,
    cancel_on_first_call: Option<CancellationToken>,
}

impl ScriptedRunner {
    pub fn always(verdict: TestRunnerResult) -> Self {
        Self::scripted(vec![], verdict)
    }

    pub fn scripted(script: Vec<Result<TestRunnerResult, PortError>>, fallback: TestRunnerResult) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(vec![]),
            cancel_on_first_call: None,
        }
    }

    pub fn cancelling(token: CancellationToken, verdict: TestRunnerResult) -> Self {
        let mut runner = Self::always(verdict);
        runner.cancel_on_first_call = Some(token);
        runner
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl TestRunner for ScriptedRunner {
    fn run_tests(
        &self,
        test_assembly_paths: &[PathBuf],
        test_names: &[String],
    ) -> Result<TestRunnerResult, PortError> {
        self.calls.lock().unwrap().push(Call {
            assemblies: test_assembly_paths.to_vec(),
            test_names: test_names.to_vec(),
        });
        if let Some(token) = &self.cancel_on_first_call {
            token.cancel();
        }
        match self.script.lock().unwrap().pop_front() {
            Some(answer) => answer,
            None => Ok(self.fallback),
        }
    }
}

/// Kills every mutant, sleeping longer for earlier calls so that concurrent
/// workers finish in reverse of the order they started.
pub struct SlowFirstRunner {
    started: Mutex<usize>,
    finished: Mutex<Vec<usize>>,
}

impl SlowFirstRunner {
    pub fn new() -> Self {
        Self {
            started: Mutex::new(0),
            finished: Mutex::new(vec![]),
        }
    }

    /// Call indices in the order the calls returned.
    pub fn finished(&self) -> Vec<usize> {
        self.finished.lock().unwrap().clone()
    }
}

impl TestRunner for SlowFirstRunner {
    fn run_tests(
        &self,
        _test_assembly_paths: &[PathBuf],
        _test_names: &[String],
    ) -> Result<TestRunnerResult, PortError> {
        let index = {
            let mut started = self.started.lock().unwrap();
            *started += 1;
            *started - 1
        };
        let delay = 300u64.saturating_sub(60 * index as u64);
        std::thread::sleep(Duration::from_millis(delay));
        self.finished.lock().unwrap().push(index);
        Ok(TestRunnerResult::SomeTestsFailed)
    }
}

pub struct FixedFinder(pub Vec<String>);

impl TestFinder for FixedFinder {
    fn find_tests(&self, _source_files: &[PathBuf]) -> Result<Vec<String>, PortError> {
        Ok(self.0.clone())
    }
}

/// Fails the build whenever the mutated library contains `needle`.
pub struct ContentBuilder {
    pub needle: &'static str,
}

impl MutantBuilder for ContentBuilder {
    fn build(&self, project_dir: &Path) -> Result<BuildOutcome, IsolationError> {
        let lib = std::fs::read_to_string(project_dir.join("src/lib.rs")).unwrap_or_default();
        if lib.contains(self.needle) {
            Ok(BuildOutcome::Failed {
                output: format!("error: refusing `{}`", self.needle),
            })
        } else {
            Ok(BuildOutcome::Built)
        }
    }
}
