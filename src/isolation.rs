//! Mutant build isolation.
//!
//! Each worker owns one [`Sandbox`]: a filtered copy of the solution in a
//! uniquely named temp directory. Mutants are staged into it one at a time and
//! the original text is put back when the stage guard drops, so the real
//! solution on disk is never touched. Sandboxes are tracked in a
//! [`SandboxRegistry`] and removed when dropped.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::Utf8Path;
use tempfile::TempDir;
use thiserror::Error;

use crate::copy_tree;
use crate::discovery;
use crate::mutants::Mutant;
use crate::process::{self, ProcessOutcome};

/// Name fragment carried by every sandbox directory.
pub const SANDBOX_MARKER: &str = "mutant-sieve";

#[derive(Debug, Error)]
pub enum IsolationError {
    #[error("failed to create sandbox under {root}: {source}")]
    Create {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to copy solution into {sandbox}: {source}")]
    Copy {
        sandbox: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write mutant to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to run build command `{command}`: {source}")]
    Build {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Sandboxes currently alive in this process.
#[derive(Debug, Clone, Default)]
pub struct SandboxRegistry {
    live: Arc<Mutex<BTreeSet<PathBuf>>>,
}

impl SandboxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, path: &Path) {
        self.lock().insert(path.to_path_buf());
    }

    fn release(&self, path: &Path) {
        self.lock().remove(path);
    }

    pub fn live(&self) -> Vec<PathBuf> {
        self.lock().iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<PathBuf>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn generate_run_id() -> String {
    format!("{:08x}", fastrand::u32(..))
}

pub struct Sandbox {
    dir: Option<TempDir>,
    root: PathBuf,
    solution_root: PathBuf,
    registry: SandboxRegistry,
}

impl Sandbox {
    /// Copy `solution_root` into `<temp_root>/mutant-sieve-<run_id>-XXXXXX`.
    pub fn create(
        solution_root: &Path,
        temp_root: &Path,
        run_id: &str,
        registry: &SandboxRegistry,
    ) -> Result<Self, IsolationError> {
        std::fs::create_dir_all(temp_root).map_err(|source| IsolationError::Create {
            root: temp_root.to_path_buf(),
            source,
        })?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{SANDBOX_MARKER}-{run_id}-"))
            .tempdir_in(temp_root)
            .map_err(|source| IsolationError::Create {
                root: temp_root.to_path_buf(),
                source,
            })?;

        // On failure `dir` drops here and takes the partial copy with it.
        let copied = copy_tree::copy_dir_filtered(solution_root, dir.path()).map_err(|source| {
            IsolationError::Copy {
                sandbox: dir.path().to_path_buf(),
                source,
            }
        })?;

        let root = dir.path().to_path_buf();
        registry.register(&root);
        tracing::debug!(sandbox = %root.display(), files = copied, "sandbox created");
        Ok(Self {
            dir: Some(dir),
            root,
            solution_root: solution_root.to_path_buf(),
            registry: registry.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `path` from the real solution lives inside this sandbox.
    pub fn map_path(&self, path: &Path) -> PathBuf {
        copy_tree::remap(path, &self.solution_root, &self.root)
    }

    /// Write `mutated` over the sandbox copy of `relative`. The returned guard
    /// writes `original` back when dropped.
    pub fn stage(
        &self,
        relative: &Utf8Path,
        original: Arc<str>,
        mutated: &str,
    ) -> Result<StagedMutant<'_>, IsolationError> {
        let path = self.root.join(relative.as_std_path());
        std::fs::write(&path, mutated).map_err(|source| IsolationError::Write {
            path: path.clone(),
            source,
        })?;
        clear_pycache(&path);
        Ok(StagedMutant {
            sandbox: self,
            path,
            original,
        })
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(err) = dir.close() {
                tracing::warn!(sandbox = %self.root.display(), "failed to remove sandbox: {err}");
            }
        }
        self.registry.release(&self.root);
    }
}

/// A mutant written into a sandbox.
pub struct StagedMutant<'a> {
    sandbox: &'a Sandbox,
    path: PathBuf,
    original: Arc<str>,
}

impl StagedMutant<'_> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sandbox(&self) -> &Sandbox {
        self.sandbox
    }
}

impl Drop for StagedMutant<'_> {
    fn drop(&mut self) {
        if let Err(err) = std::fs::write(&self.path, self.original.as_bytes()) {
            tracing::warn!(path = %self.path.display(), "failed to restore original source: {err}");
        }
        clear_pycache(&self.path);
    }
}

/// Remove cached bytecode for `source_file`.
///
/// CPython trusts a `.pyc` whose recorded mtime (whole seconds) and size match
/// the source, and a same-length mutant staged within the same second as the
/// previous one matches both.
fn clear_pycache(source_file: &Path) {
    let (Some(parent), Some(stem)) = (source_file.parent(), source_file.file_stem()) else {
        return;
    };
    let Ok(entries) = std::fs::read_dir(parent.join("__pycache__")) else {
        return;
    };
    let prefix = format!("{}.", stem.to_string_lossy());
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && name.ends_with(".pyc") {
            if let Err(err) = std::fs::remove_file(entry.path()) {
                tracing::debug!(path = %entry.path().display(), "failed to remove cached bytecode: {err}");
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Built,
    Failed { output: String },
}

/// Compiles the project a mutant lives in.
pub trait MutantBuilder: Send + Sync {
    fn build(&self, project_dir: &Path) -> Result<BuildOutcome, IsolationError>;
}

/// Runs a configured command in the project directory. Without a command
/// every mutant counts as built, which suits interpreted languages.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    command: Option<Vec<String>>,
    timeout: Duration,
}

impl CommandBuilder {
    pub fn new(command: Option<Vec<String>>, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

impl MutantBuilder for CommandBuilder {
    fn build(&self, project_dir: &Path) -> Result<BuildOutcome, IsolationError> {
        let Some(command) = self.command.as_deref().filter(|c| !c.is_empty()) else {
            return Ok(BuildOutcome::Built);
        };
        let outcome = process::run_with_timeout(command, project_dir, self.timeout).map_err(
            |source| IsolationError::Build {
                command: command.join(" "),
                source,
            },
        )?;
        Ok(match outcome {
            ProcessOutcome::Exited { status, .. } if status.success() => BuildOutcome::Built,
            ProcessOutcome::Exited { output, .. } => BuildOutcome::Failed { output },
            ProcessOutcome::TimedOut { output } => BuildOutcome::Failed {
                output: format!("build timed out after {:?}\n{output}", self.timeout),
            },
        })
    }
}

/// What the test port runs against for one mutant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub root: PathBuf,
    pub project_dir: PathBuf,
    pub test_assembly_paths: Vec<PathBuf>,
}

pub enum Prepared<'a> {
    Ready {
        staged: StagedMutant<'a>,
        artifacts: ArtifactSet,
    },
    BuildFailed {
        staged: StagedMutant<'a>,
        output: String,
    },
}

/// Per-worker isolator. The sandbox is created on first use and removed when
/// the isolator drops.
pub struct BuildIsolator {
    solution_root: PathBuf,
    temp_root: PathBuf,
    run_id: String,
    test_assembly_paths: Vec<PathBuf>,
    builder: Arc<dyn MutantBuilder>,
    registry: SandboxRegistry,
    sandbox: Option<Sandbox>,
}

impl BuildIsolator {
    pub fn new(
        solution_root: PathBuf,
        temp_root: PathBuf,
        run_id: String,
        test_assembly_paths: Vec<PathBuf>,
        builder: Arc<dyn MutantBuilder>,
        registry: SandboxRegistry,
    ) -> Self {
        Self {
            solution_root,
            temp_root,
            run_id,
            test_assembly_paths,
            builder,
            registry,
            sandbox: None,
        }
    }

    pub fn acquire(&mut self) -> Result<&Sandbox, IsolationError> {
        let sandbox = match self.sandbox.take() {
            Some(sandbox) => sandbox,
            None => Sandbox::create(
                &self.solution_root,
                &self.temp_root,
                &self.run_id,
                &self.registry,
            )?,
        };
        Ok(self.sandbox.insert(sandbox))
    }

    /// Stage `mutant` and build its project.
    pub fn prepare(
        &mut self,
        mutant: &Mutant<'_>,
        source: &Arc<str>,
    ) -> Result<Prepared<'_>, IsolationError> {
        let builder = Arc::clone(&self.builder);
        let test_assembly_paths = self.test_assembly_paths.clone();
        let sandbox = self.acquire()?;

        let mutated = mutant.apply(source);
        let staged = sandbox.stage(&mutant.point.file, Arc::clone(source), &mutated)?;
        let project_dir = discovery::project_dir_of(sandbox.root(), mutant.point.file.as_std_path());

        match builder.build(&project_dir)? {
            BuildOutcome::Built => {
                let artifacts = ArtifactSet {
                    root: sandbox.root().to_path_buf(),
                    project_dir,
                    test_assembly_paths: test_assembly_paths
                        .iter()
                        .map(|p| sandbox.map_path(p))
                        .collect(),
                };
                Ok(Prepared::Ready { staged, artifacts })
            }
            BuildOutcome::Failed { output } => Ok(Prepared::BuildFailed { staged, output }),
        }
    }
}

/// Remove sandbox directories left in `temp_root` by crashed runs. Failures
/// are logged and skipped.
pub fn sweep_stale_sandboxes(temp_root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let prefix = format!("{SANDBOX_MARKER}-");
    let mut removed = Vec::new();
    for entry in std::fs::read_dir(temp_root)? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path();
        match std::fs::remove_dir_all(&path) {
            Ok(()) => removed.push(path),
            Err(err) => tracing::warn!(path = %path.display(), "failed to remove stale sandbox: {err}"),
        }
    }
    Ok(removed)
}
