//! Result model of a run and its persisted form.

use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::mutants::{Mutant, MutationPoint};
use crate::operators::MutationOperator;
use crate::parser::ParseFailure;

pub const STATE_FILE: &str = ".mutant-sieve-state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutantOutcome {
    Survived,
    Killed,
    BuildFailed,
    Skipped,
}

impl MutantOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutantOutcome::Survived => "survived",
            MutantOutcome::Killed => "killed",
            MutantOutcome::BuildFailed => "build_failed",
            MutantOutcome::Skipped => "skipped",
        }
    }
}

/// Which outcomes count towards the mutation score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorePolicy {
    /// `killed / (killed + survived)`; build failures and skips are left out.
    #[default]
    ExcludeUnviable,
    /// Build failures count as killed.
    BuildFailuresKilled,
}

/// The parts of a [`MutationPoint`] a record keeps once the run is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRef {
    pub file: Utf8PathBuf,
    pub project: String,
    pub node_kind: String,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub original: String,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
}

impl From<&MutationPoint> for PointRef {
    fn from(point: &MutationPoint) -> Self {
        Self {
            file: point.file.clone(),
            project: point.project.clone(),
            node_kind: point.node_kind.clone(),
            line: point.line,
            column: point.column,
            end_line: point.end_line,
            original: point.original.clone(),
            context_before: point.context_before.clone(),
            context_after: point.context_after.clone(),
        }
    }
}

impl PointRef {
    pub fn location(&self) -> String {
        format!("{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutantRecord {
    pub point: PointRef,
    pub operator: MutationOperator,
    pub replacement: String,
    pub outcome: MutantOutcome,
    /// Wall time spent building and testing this mutant.
    pub duration_ms: u64,
    /// Line diff against the original file, kept for survivors only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl MutantRecord {
    pub fn new(mutant: &Mutant<'_>, outcome: MutantOutcome, duration_ms: u64) -> Self {
        Self {
            point: PointRef::from(mutant.point),
            operator: mutant.operator,
            replacement: mutant.replacement.to_string(),
            outcome,
            duration_ms,
            diff: None,
        }
    }

    pub fn with_diff(mut self, diff: String) -> Self {
        self.diff = Some(diff);
        self
    }
}

/// Aggregate of one run. Records are in mutation-point discovery order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub records: Vec<MutantRecord>,
    #[serde(default)]
    pub parse_failures: Vec<ParseFailure>,
    #[serde(default)]
    pub score_policy: ScorePolicy,
    pub duration_ms: u64,
}

impl RunResult {
    fn count(&self, outcome: MutantOutcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn killed(&self) -> usize {
        self.count(MutantOutcome::Killed)
    }

    pub fn survived(&self) -> usize {
        self.count(MutantOutcome::Survived)
    }

    pub fn build_failed(&self) -> usize {
        self.count(MutantOutcome::BuildFailed)
    }

    pub fn skipped(&self) -> usize {
        self.count(MutantOutcome::Skipped)
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    /// Mutation score under the run's policy, `None` when nothing was scored.
    pub fn score(&self) -> Option<f64> {
        let killed = match self.score_policy {
            ScorePolicy::ExcludeUnviable => self.killed(),
            ScorePolicy::BuildFailuresKilled => self.killed() + self.build_failed(),
        };
        let denominator = killed + self.survived();
        if denominator == 0 {
            return None;
        }
        Some(killed as f64 / denominator as f64)
    }

    /// Survivors paired with their `m<N>` reference, numbered from 1.
    pub fn survivors(&self) -> impl Iterator<Item = (String, &MutantRecord)> {
        self.records
            .iter()
            .filter(|r| r.outcome == MutantOutcome::Survived)
            .enumerate()
            .map(|(i, r)| (format!("m{}", i + 1), r))
    }

    /// Look up a survivor by `m3` or `@m3`.
    pub fn find_survivor(&self, reference: &str) -> Option<&MutantRecord> {
        let reference = reference.trim_start_matches('@');
        self.survivors()
            .find(|(id, _)| id == reference)
            .map(|(_, record)| record)
    }
}

fn state_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(STATE_FILE)
}

pub fn save_last_run(result: &RunResult) -> std::io::Result<()> {
    save_to_path(result, &state_path())
}

pub fn load_last_run() -> Option<RunResult> {
    load_from_path(&state_path())
}

pub fn save_to_path(result: &RunResult, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json)
}

pub fn load_from_path(path: &Path) -> Option<RunResult> {
    let data = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&data) {
        Ok(result) => Some(result),
        Err(err) => {
            tracing::warn!("ignoring unreadable state file {}: {err}", path.display());
            None
        }
    }
}
