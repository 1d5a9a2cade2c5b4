//! Boundaries to the outside test tooling.
//!
//! The runner only ever talks to [`TestFinder`] and [`TestRunner`]. The
//! command-backed implementations here drive arbitrary test harnesses through
//! argv templates; tests substitute their own structs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::process::{self, ProcessOutcome};

/// Suite-level verdict for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestRunnerResult {
    AllTestsPassed,
    SomeTestsFailed,
}

/// The harness itself broke, as opposed to a test failing.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` was terminated without an exit code")]
    Crashed { command: String },
    #[error("{0}")]
    Other(String),
}

pub trait TestFinder: Send + Sync {
    /// Test identifiers relevant to `source_files`. An empty answer means the
    /// finder has no opinion and the whole suite should run.
    fn find_tests(&self, source_files: &[PathBuf]) -> Result<Vec<String>, PortError>;
}

pub trait TestRunner: Send + Sync {
    /// Run `test_names` (all tests when empty) from `test_assembly_paths`.
    fn run_tests(
        &self,
        test_assembly_paths: &[PathBuf],
        test_names: &[String],
    ) -> Result<TestRunnerResult, PortError>;
}

/// Finder for setups that always run the whole suite.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTestFinder;

impl TestFinder for NoTestFinder {
    fn find_tests(&self, _source_files: &[PathBuf]) -> Result<Vec<String>, PortError> {
        Ok(vec![])
    }
}

pub const ASSEMBLY_PLACEHOLDER: &str = "{assembly}";
pub const FILES_PLACEHOLDER: &str = "{files}";

fn display_command(argv: &[String]) -> String {
    argv.join(" ")
}

/// Runs `command` once per test assembly. `{assembly}` is replaced by the
/// assembly path, test names are appended, and the assembly's directory is
/// the working directory.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandTestRunner {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    fn argv_for(&self, assembly: &Path, test_names: &[String]) -> Vec<String> {
        let assembly = assembly.to_string_lossy();
        let mut argv: Vec<String> = self
            .command
            .iter()
            .map(|arg| arg.replace(ASSEMBLY_PLACEHOLDER, &assembly))
            .collect();
        if !self.command.iter().any(|arg| arg.contains(ASSEMBLY_PLACEHOLDER)) {
            argv.push(assembly.into_owned());
        }
        argv.extend(test_names.iter().cloned());
        argv
    }
}

impl TestRunner for CommandTestRunner {
    fn run_tests(
        &self,
        test_assembly_paths: &[PathBuf],
        test_names: &[String],
    ) -> Result<TestRunnerResult, PortError> {
        let assemblies: Vec<&PathBuf> = test_assembly_paths.iter().filter(|p| p.exists()).collect();
        if assemblies.is_empty() {
            return Err(PortError::Other(format!(
                "none of the test assemblies exist: {}",
                test_assembly_paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        for assembly in assemblies {
            let argv = self.argv_for(assembly, test_names);
            let command = display_command(&argv);
            let cwd = assembly.parent().unwrap_or_else(|| Path::new("."));

            let outcome = process::run_with_timeout(&argv, cwd, self.timeout)
                .map_err(|source| PortError::Spawn {
                    command: command.clone(),
                    source,
                })?;
            match outcome {
                ProcessOutcome::Exited { status, .. } if status.success() => {}
                ProcessOutcome::Exited { status, output } => {
                    if status.code().is_none() {
                        return Err(PortError::Crashed { command });
                    }
                    tracing::trace!(%command, "tests failed:\n{output}");
                    return Ok(TestRunnerResult::SomeTestsFailed);
                }
                ProcessOutcome::TimedOut { .. } => {
                    tracing::warn!(%command, timeout = ?self.timeout, "test run timed out; counting as failed");
                    return Ok(TestRunnerResult::SomeTestsFailed);
                }
            }
        }
        Ok(TestRunnerResult::AllTestsPassed)
    }
}

/// Runs a listing command and reads `<name>: test` lines from its output.
/// `{files}` expands to the source paths; without it they are appended.
#[derive(Debug, Clone)]
pub struct CommandTestFinder {
    command: Vec<String>,
    cwd: PathBuf,
    timeout: Duration,
}

impl CommandTestFinder {
    pub fn new(command: Vec<String>, cwd: PathBuf, timeout: Duration) -> Self {
        Self {
            command,
            cwd,
            timeout,
        }
    }
}

pub fn parse_test_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_suffix(": test"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

impl TestFinder for CommandTestFinder {
    fn find_tests(&self, source_files: &[PathBuf]) -> Result<Vec<String>, PortError> {
        let files: Vec<String> = source_files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let mut argv = Vec::with_capacity(self.command.len() + files.len());
        let mut expanded = false;
        for arg in &self.command {
            if arg == FILES_PLACEHOLDER {
                argv.extend(files.iter().cloned());
                expanded = true;
            } else {
                argv.push(arg.clone());
            }
        }
        if !expanded {
            argv.extend(files);
        }

        let command = display_command(&argv);
        let outcome = process::run_with_timeout(&argv, &self.cwd, self.timeout).map_err(
            |source| PortError::Spawn {
                command: command.clone(),
                source,
            },
        )?;
        match outcome {
            ProcessOutcome::Exited { status, output } if status.success() => {
                Ok(parse_test_list(&output))
            }
            ProcessOutcome::Exited { output, .. } => Err(PortError::Other(format!(
                "`{command}` failed to list tests:\n{output}"
            ))),
            ProcessOutcome::TimedOut { .. } => {
                Err(PortError::Other(format!("`{command}` timed out listing tests")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_libtest_style_listing() {
        let output = "calc::tests::adds: test\ncalc::tests::bench: benchmark\n\n2 tests, 0 benchmarks\nsigned: test\n";
        assert_eq!(parse_test_list(output), vec!["calc::tests::adds", "signed"]);
    }

    #[test]
    fn assembly_is_substituted_or_appended() {
        let runner = CommandTestRunner::new(
            vec!["sh".into(), "{assembly}".into(), "--quiet".into()],
            Duration::from_secs(1),
        );
        assert_eq!(
            runner.argv_for(Path::new("/s/check.sh"), &["adds".to_string()]),
            vec!["sh", "/s/check.sh", "--quiet", "adds"]
        );

        let runner = CommandTestRunner::new(vec!["python".into(), "-m".into(), "pytest".into()], Duration::from_secs(1));
        assert_eq!(
            runner.argv_for(Path::new("tests"), &[]),
            vec!["python", "-m", "pytest", "tests"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_maps_to_verdict() {
        let dir = tempfile::TempDir::new().unwrap();
        let pass = dir.path().join("pass.sh");
        let fail = dir.path().join("fail.sh");
        std::fs::write(&pass, "exit 0\n").unwrap();
        std::fs::write(&fail, "exit 1\n").unwrap();
        let runner = CommandTestRunner::new(vec!["sh".into(), "{assembly}".into()], Duration::from_secs(10));

        assert_eq!(runner.run_tests(&[pass.clone()], &[]).unwrap(), TestRunnerResult::AllTestsPassed);
        assert_eq!(
            runner.run_tests(&[pass, fail], &[]).unwrap(),
            TestRunnerResult::SomeTestsFailed
        );
    }

    #[test]
    fn missing_program_is_an_infrastructure_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let assembly = dir.path().join("suite");
        std::fs::write(&assembly, "").unwrap();
        let runner = CommandTestRunner::new(
            vec!["definitely-not-a-real-test-host".into()],
            Duration::from_secs(1),
        );
        assert!(matches!(
            runner.run_tests(&[assembly], &[]),
            Err(PortError::Spawn { .. })
        ));
    }
}
