//! Per-point test selection.
//!
//! With a coverage report the tests for a point are looked up by line. Without
//! one the [`TestFinder`] port is asked per file and its answer cached.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mutants::MutationPoint;
use crate::ports::{PortError, TestFinder};

#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("failed to read coverage report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed coverage report {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk shape: solution-relative file, then 1-based line, then test names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub files: BTreeMap<String, BTreeMap<usize, BTreeSet<String>>>,
}

#[derive(Debug, Clone, Default)]
pub struct CoverageIndex {
    files: HashMap<String, BTreeMap<usize, BTreeSet<String>>>,
}

impl CoverageIndex {
    pub fn load(path: &Path) -> Result<Self, CoverageError> {
        let data = std::fs::read_to_string(path).map_err(|source| CoverageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let report: CoverageReport =
            serde_json::from_str(&data).map_err(|source| CoverageError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_report(report))
    }

    pub fn from_report(report: CoverageReport) -> Self {
        let files = report
            .files
            .into_iter()
            .map(|(file, lines)| (file.replace('\\', "/"), lines))
            .collect();
        Self { files }
    }

    /// Tests that executed any line the point spans. Unknown files and lines
    /// give the empty set.
    pub fn tests_covering_point(&self, point: &MutationPoint) -> BTreeSet<String> {
        let Some(lines) = self.files.get(point.file.as_str()) else {
            return BTreeSet::new();
        };
        lines
            .range(point.line..=point.end_line.max(point.line))
            .flat_map(|(_, tests)| tests.iter().cloned())
            .collect()
    }
}

/// Tests chosen for one point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestSelection {
    Tests(Vec<String>),
    /// Run the whole suite; the port receives an empty name list.
    AllTests,
    /// Coverage data says nothing exercises the point.
    Uncovered,
}

pub enum TestSelector {
    Coverage(CoverageIndex),
    Discovery {
        finder: Arc<dyn TestFinder>,
        solution_root: PathBuf,
        cache: Mutex<HashMap<String, Vec<String>>>,
    },
}

impl TestSelector {
    pub fn discovery(finder: Arc<dyn TestFinder>, solution_root: PathBuf) -> Self {
        TestSelector::Discovery {
            finder,
            solution_root,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_coverage(&self) -> bool {
        matches!(self, TestSelector::Coverage(_))
    }

    pub fn select(&self, point: &MutationPoint) -> Result<TestSelection, PortError> {
        match self {
            TestSelector::Coverage(index) => {
                let tests = index.tests_covering_point(point);
                if tests.is_empty() {
                    Ok(TestSelection::Uncovered)
                } else {
                    Ok(TestSelection::Tests(tests.into_iter().collect()))
                }
            }
            TestSelector::Discovery {
                finder,
                solution_root,
                cache,
            } => {
                let key = point.file.to_string();
                if let Some(hit) = lock(cache).get(&key) {
                    return Ok(selection_from(hit.clone()));
                }
                // Finder runs outside the lock so workers don't serialise on it.
                let path = solution_root.join(point.file.as_std_path());
                let tests = finder.find_tests(&[path])?;
                tracing::debug!(file = %key, tests = tests.len(), "discovered tests");
                lock(cache).insert(key, tests.clone());
                Ok(selection_from(tests))
            }
        }
    }
}

fn selection_from(tests: Vec<String>) -> TestSelection {
    if tests.is_empty() {
        TestSelection::AllTests
    } else {
        TestSelection::Tests(tests)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
