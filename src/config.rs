//! Run configuration.
//!
//! A run is described by a TOML file (`mutant-sieve.toml` by default) or built
//! in code with the `with_*` setters. Relative paths in a file are resolved
//! against the file's directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coverage::CoverageError;
use crate::state::ScorePolicy;

pub const DEFAULT_CONFIG_FILE: &str = "mutant-sieve.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("solution path {0} does not exist")]
    MissingSolution(PathBuf),
    #[error("no test assembly paths configured")]
    NoTestAssemblies,
    #[error("none of the test assemblies exist: {}", display_paths(.0))]
    TestAssembliesNotFound(Vec<PathBuf>),
    #[error("worker count must be at least 1")]
    ZeroWorkers,
    #[error("coverage report {0} does not exist")]
    CoverageReportNotFound(PathBuf),
    #[error("coverage report is unusable: {0}")]
    Coverage(#[from] CoverageError),
    #[error("no projects found under {0}")]
    NoProjects(PathBuf),
    #[error("project filters [{}] matched no project", .0.join(", "))]
    ProjectFiltersMatchedNothing(Vec<String>),
    #[error("source file filters matched no files")]
    NoSourceFiles,
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Configuration for a mutation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Solution directory, or a manifest file inside it.
    pub solution_path: PathBuf,
    /// Glob patterns over solution-relative source paths. Empty means all.
    #[serde(default)]
    pub source_file_filters: Vec<String>,
    /// Glob patterns over project names. Empty means all.
    #[serde(default)]
    pub project_filters: Vec<String>,
    #[serde(default)]
    pub test_assembly_paths: Vec<PathBuf>,
    #[serde(default)]
    pub coverage_report_path: Option<PathBuf>,
    /// Command run in the mutated project's directory before testing.
    #[serde(default)]
    pub build_command: Option<Vec<String>>,
    /// Command run per test assembly; `{assembly}` is substituted and test
    /// names are appended.
    #[serde(default)]
    pub test_command: Vec<String>,
    /// Command printing `<name>: test` lines, used when no coverage report is set.
    #[serde(default)]
    pub test_list_command: Option<Vec<String>>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Extra attempts after a test-infrastructure failure before the run aborts.
    #[serde(default)]
    pub test_retries: u32,
    #[serde(default)]
    pub score_policy: ScorePolicy,
    /// Where sandboxes are created. Defaults to the platform temp directory.
    #[serde(default)]
    pub temp_root: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_workers() -> usize {
    1
}

impl Config {
    pub fn new(solution_path: impl Into<PathBuf>) -> Self {
        Self {
            solution_path: solution_path.into(),
            source_file_filters: vec![],
            project_filters: vec![],
            test_assembly_paths: vec![],
            coverage_report_path: None,
            build_command: None,
            test_command: vec![],
            test_list_command: None,
            timeout_secs: default_timeout_secs(),
            workers: default_workers(),
            test_retries: 0,
            score_policy: ScorePolicy::default(),
            temp_root: None,
        }
    }

    /// Load a TOML config, resolving its relative paths against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.with_paths_relative_to(base))
    }

    pub fn with_paths_relative_to(mut self, base: &Path) -> Self {
        let absolute = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };
        self.solution_path = absolute(self.solution_path);
        self.test_assembly_paths = self.test_assembly_paths.into_iter().map(absolute).collect();
        self.coverage_report_path = self.coverage_report_path.map(absolute);
        self.temp_root = self.temp_root.map(absolute);
        self
    }

    pub fn with_source_file_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_file_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_project_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.project_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_test_assembly_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.test_assembly_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_coverage_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.coverage_report_path = Some(path.into());
        self
    }

    pub fn with_build_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build_command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_test_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.test_command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_test_retries(mut self, retries: u32) -> Self {
        self.test_retries = retries;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_score_policy(mut self, policy: ScorePolicy) -> Self {
        self.score_policy = policy;
        self
    }

    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(temp_root.into());
        self
    }

    /// Directory that holds the solution's projects.
    pub fn solution_root(&self) -> PathBuf {
        if self.solution_path.is_file() {
            self.solution_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        } else {
            self.solution_path.clone()
        }
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }

    /// Checks that need nothing but the filesystem. Filter resolution is
    /// checked separately by project discovery.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.solution_path.exists() {
            return Err(ConfigError::MissingSolution(self.solution_path.clone()));
        }
        if self.test_assembly_paths.is_empty() {
            return Err(ConfigError::NoTestAssemblies);
        }
        if !self.test_assembly_paths.iter().any(|p| p.exists()) {
            return Err(ConfigError::TestAssembliesNotFound(self.test_assembly_paths.clone()));
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if let Some(report) = &self.coverage_report_path {
            if !report.is_file() {
                return Err(ConfigError::CoverageReportNotFound(report.clone()));
            }
        }
        Ok(())
    }
}
