//! The mutation test pipeline.
//!
//! A run moves through `Validating -> Discovering -> Mutating` and ends in
//! `Completed`, `Cancelled` or `Failed`. Mutation points are pulled from the
//! generator by a pool of workers, each with its own sandbox. Within a point,
//! mutants are tried in operator order until the first survivor. Workers
//! report back over a channel and the calling thread restores discovery order
//! before emitting events and appending records.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::coverage::{CoverageIndex, TestSelection, TestSelector};
use crate::discovery;
use crate::events::EventListener;
use crate::generator::{GeneratorItem, GeneratorItems, MutationGenerator};
use crate::isolation::{self, BuildIsolator, CommandBuilder, IsolationError, MutantBuilder, Prepared, SandboxRegistry};
use crate::mutants::{self, Mutant, MutationPoint};
use crate::parser::ParseFailure;
use crate::ports::{PortError, TestFinder, TestRunner, TestRunnerResult};
use crate::state::{MutantOutcome, MutantRecord, RunResult};

/// Cooperative stop signal, checked between points and between mutants.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("test infrastructure failed while testing {mutant}: {source}")]
    Infrastructure {
        mutant: String,
        #[source]
        source: PortError,
    },
    #[error(transparent)]
    Isolation(#[from] IsolationError),
    #[error("a mutation worker panicked")]
    WorkerPanicked,
}

impl RunError {
    pub fn is_config(&self) -> bool {
        matches!(self, RunError::Config(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunResult),
    /// Stopped early; holds every mutant finished before the stop.
    Cancelled(RunResult),
}

impl RunOutcome {
    pub fn result(&self) -> &RunResult {
        match self {
            RunOutcome::Completed(result) | RunOutcome::Cancelled(result) => result,
        }
    }

    pub fn into_result(self) -> RunResult {
        match self {
            RunOutcome::Completed(result) | RunOutcome::Cancelled(result) => result,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Validating,
    Discovering,
    Mutating,
    Completed,
    Cancelled,
    Failed,
}

fn enter(phase: RunPhase) {
    tracing::debug!(?phase, "run phase");
}

/// What happened to one mutant, before it is turned into a record.
#[derive(Debug)]
struct Evaluated {
    candidate: usize,
    outcome: MutantOutcome,
    built: bool,
    build_output: Option<String>,
    diff: Option<String>,
    duration_ms: u64,
}

impl Evaluated {
    fn new(candidate: usize, outcome: MutantOutcome, duration_ms: u64) -> Self {
        Self {
            candidate,
            outcome,
            built: false,
            build_output: None,
            diff: None,
            duration_ms,
        }
    }
}

#[derive(Debug)]
enum Report {
    Point {
        point: MutationPoint,
        mutants: Vec<Evaluated>,
    },
    FileSkipped(ParseFailure),
}

type Message = (usize, Result<Report, RunError>);

/// State shared by the workers of one run.
struct Shared {
    queue: Mutex<(usize, GeneratorItems)>,
    selector: TestSelector,
    retries: u32,
    abort: AtomicBool,
    interrupted: AtomicBool,
}

impl Shared {
    fn next_item(&self) -> Option<(usize, GeneratorItem)> {
        let mut queue = self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let item = queue.1.next()?;
        let index = queue.0;
        queue.0 += 1;
        Some((index, item))
    }
}

/// Drives one run. Consumed by [`MutationTestRunner::run`]; a new run needs a
/// new runner.
pub struct MutationTestRunner {
    test_runner: Arc<dyn TestRunner>,
    test_finder: Arc<dyn TestFinder>,
    listener: Arc<dyn EventListener>,
    builder: Option<Arc<dyn MutantBuilder>>,
    cancellation: CancellationToken,
    registry: SandboxRegistry,
}

impl MutationTestRunner {
    pub fn new(
        test_runner: Arc<dyn TestRunner>,
        test_finder: Arc<dyn TestFinder>,
        listener: Arc<dyn EventListener>,
    ) -> Self {
        Self {
            test_runner,
            test_finder,
            listener,
            builder: None,
            cancellation: CancellationToken::new(),
            registry: SandboxRegistry::new(),
        }
    }

    /// Replace the command builder derived from the config.
    pub fn with_builder(mut self, builder: Arc<dyn MutantBuilder>) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Registry of the sandboxes this runner creates. Empty once `run` returns.
    pub fn sandbox_registry(&self) -> SandboxRegistry {
        self.registry.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn run(self, config: &Config) -> Result<RunOutcome, RunError> {
        let outcome = self.execute(config);
        if let Err(err) = &outcome {
            enter(RunPhase::Failed);
            tracing::error!("mutation run failed: {err}");
        }
        outcome
    }

    fn execute(&self, config: &Config) -> Result<RunOutcome, RunError> {
        let started = Instant::now();

        enter(RunPhase::Validating);
        config.validate()?;

        enter(RunPhase::Discovering);
        let found = discovery::discover(config)?;
        let selector = match &config.coverage_report_path {
            Some(path) => {
                let index = CoverageIndex::load(path).map_err(ConfigError::from)?;
                TestSelector::Coverage(index)
            }
            None => TestSelector::discovery(Arc::clone(&self.test_finder), found.solution_root.clone()),
        };
        tracing::info!(
            files = found.source_files.len(),
            projects = found.projects.len(),
            coverage = selector.is_coverage(),
            workers = config.workers,
            "starting mutation run"
        );

        let generator = MutationGenerator::new(found.source_files);
        self.listener.run_started(generator.files().len());

        enter(RunPhase::Mutating);
        let builder: Arc<dyn MutantBuilder> = match &self.builder {
            Some(builder) => Arc::clone(builder),
            None => Arc::new(CommandBuilder::new(config.build_command.clone(), config.timeout())),
        };
        let shared = Shared {
            queue: Mutex::new((0, generator.items())),
            selector,
            retries: config.test_retries,
            abort: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
        };
        let run_id = isolation::generate_run_id();
        let make_isolator = || {
            BuildIsolator::new(
                found.solution_root.clone(),
                config.temp_root(),
                run_id.clone(),
                config.test_assembly_paths.clone(),
                Arc::clone(&builder),
                self.registry.clone(),
            )
        };

        let (records, parse_failures) = self.mutate(&shared, config.workers.max(1), make_isolator)?;

        let result = RunResult {
            records,
            parse_failures,
            score_policy: config.score_policy,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        if shared.interrupted.load(Ordering::SeqCst) {
            enter(RunPhase::Cancelled);
            tracing::info!(mutants = result.total(), "mutation run cancelled");
            self.listener.run_cancelled(&result);
            return Ok(RunOutcome::Cancelled(result));
        }

        enter(RunPhase::Completed);
        tracing::info!(
            killed = result.killed(),
            survived = result.survived(),
            build_failed = result.build_failed(),
            skipped = result.skipped(),
            "mutation run completed"
        );
        self.listener.run_completed(&result);
        Ok(RunOutcome::Completed(result))
    }

    fn mutate(
        &self,
        shared: &Shared,
        workers: usize,
        make_isolator: impl Fn() -> BuildIsolator,
    ) -> Result<(Vec<MutantRecord>, Vec<ParseFailure>), RunError> {
        let mut records = Vec::new();
        let mut parse_failures = Vec::new();
        let mut first_error = None;
        let mut panicked = false;

        std::thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<Message>();
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let tx = tx.clone();
                    let isolator = make_isolator();
                    scope.spawn(move || self.worker(shared, isolator, tx))
                })
                .collect();
            drop(tx);

            // Reports arrive in completion order and are released in
            // discovery order.
            let mut pending = BTreeMap::new();
            let mut next = 0;
            for (index, report) in rx {
                match report {
                    Ok(report) => {
                        pending.insert(index, report);
                    }
                    Err(err) => {
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
                if first_error.is_some() {
                    continue;
                }
                while let Some(report) = pending.remove(&next) {
                    self.release(report, &mut records, &mut parse_failures);
                    next += 1;
                }
            }

            for handle in handles {
                if handle.join().is_err() {
                    panicked = true;
                }
            }
        });

        if panicked {
            return Err(RunError::WorkerPanicked);
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        Ok((records, parse_failures))
    }

    fn worker(&self, shared: &Shared, mut isolator: BuildIsolator, tx: mpsc::Sender<Message>) {
        loop {
            if shared.abort.load(Ordering::SeqCst) {
                break;
            }
            if self.cancellation.is_cancelled() {
                shared.interrupted.store(true, Ordering::SeqCst);
                break;
            }
            let Some((index, item)) = shared.next_item() else {
                break;
            };
            let report = match item {
                GeneratorItem::FileSkipped(failure) => Ok(Report::FileSkipped(failure)),
                GeneratorItem::Point { source, point } => {
                    self.evaluate_point(shared, &mut isolator, &source, point)
                }
            };
            if report.is_err() {
                shared.abort.store(true, Ordering::SeqCst);
            }
            if tx.send((index, report)).is_err() {
                break;
            }
        }
        // The isolator drops here and removes this worker's sandbox.
    }

    /// Try the point's mutants in order, stopping at the first survivor.
    fn evaluate_point(
        &self,
        shared: &Shared,
        isolator: &mut BuildIsolator,
        source: &Arc<str>,
        point: MutationPoint,
    ) -> Result<Report, RunError> {
        let selection = shared
            .selector
            .select(&point)
            .map_err(|source| RunError::Infrastructure {
                mutant: point.location(),
                source,
            })?;

        let mut evaluated = Vec::with_capacity(point.candidates.len());
        let mut survivor_found = false;
        for (candidate, mutant) in point.mutants().enumerate() {
            if survivor_found {
                break;
            }
            if self.cancellation.is_cancelled() {
                shared.interrupted.store(true, Ordering::SeqCst);
                break;
            }
            let result = self.evaluate_mutant(shared, isolator, source, candidate, &mutant, &selection)?;
            tracing::debug!(mutant = %mutant.describe(), outcome = result.outcome.as_str(), "mutant evaluated");
            survivor_found = result.outcome == MutantOutcome::Survived;
            evaluated.push(result);
        }

        Ok(Report::Point {
            point,
            mutants: evaluated,
        })
    }

    fn evaluate_mutant(
        &self,
        shared: &Shared,
        isolator: &mut BuildIsolator,
        source: &Arc<str>,
        candidate: usize,
        mutant: &Mutant<'_>,
        selection: &TestSelection,
    ) -> Result<Evaluated, RunError> {
        let started = Instant::now();
        let test_names: &[String] = match selection {
            TestSelection::Uncovered => {
                return Ok(Evaluated::new(candidate, MutantOutcome::Skipped, 0));
            }
            TestSelection::AllTests => &[],
            TestSelection::Tests(names) => names.as_slice(),
        };

        let mut evaluated = match isolator.prepare(mutant, source)? {
            Prepared::BuildFailed { staged, output } => {
                drop(staged);
                let mut evaluated = Evaluated::new(candidate, MutantOutcome::BuildFailed, 0);
                evaluated.build_output = Some(output);
                evaluated
            }
            Prepared::Ready { staged, artifacts } => {
                let verdict = self.run_tests(shared, &artifacts.test_assembly_paths, test_names, mutant);
                drop(staged);
                match verdict? {
                    TestRunnerResult::SomeTestsFailed => {
                        Evaluated::new(candidate, MutantOutcome::Killed, 0)
                    }
                    TestRunnerResult::AllTestsPassed => {
                        let mut evaluated = Evaluated::new(candidate, MutantOutcome::Survived, 0);
                        evaluated.diff = Some(mutants::generate_diff(source, &mutant.apply(source)));
                        evaluated
                    }
                }
            }
        };
        evaluated.built = true;
        evaluated.duration_ms = started.elapsed().as_millis() as u64;
        Ok(evaluated)
    }

    fn run_tests(
        &self,
        shared: &Shared,
        test_assembly_paths: &[std::path::PathBuf],
        test_names: &[String],
        mutant: &Mutant<'_>,
    ) -> Result<TestRunnerResult, RunError> {
        let mut attempt = 0;
        loop {
            match self.test_runner.run_tests(test_assembly_paths, test_names) {
                Ok(verdict) => return Ok(verdict),
                Err(err) if attempt < shared.retries => {
                    attempt += 1;
                    tracing::warn!(attempt, mutant = %mutant.describe(), "test infrastructure failed, retrying: {err}");
                }
                Err(source) => {
                    return Err(RunError::Infrastructure {
                        mutant: mutant.describe(),
                        source,
                    });
                }
            }
        }
    }

    /// Emit events for one report and append its records.
    fn release(&self, report: Report, records: &mut Vec<MutantRecord>, parse_failures: &mut Vec<ParseFailure>) {
        match report {
            Report::FileSkipped(failure) => {
                self.listener.file_skipped(&failure);
                parse_failures.push(failure);
            }
            Report::Point { point, mutants } => {
                self.listener.point_discovered(&point);
                for evaluated in mutants {
                    let Some(mutant) = point.mutants().nth(evaluated.candidate) else {
                        continue;
                    };
                    if evaluated.built {
                        self.listener.mutant_build_started(&mutant);
                    }
                    match evaluated.outcome {
                        MutantOutcome::BuildFailed => self
                            .listener
                            .mutant_build_failed(&mutant, evaluated.build_output.as_deref().unwrap_or_default()),
                        MutantOutcome::Killed => self.listener.mutant_killed(&mutant),
                        MutantOutcome::Survived => self.listener.mutant_survived(&mutant),
                        MutantOutcome::Skipped => self.listener.mutant_skipped(&mutant),
                    }
                    let mut record = MutantRecord::new(&mutant, evaluated.outcome, evaluated.duration_ms);
                    if let Some(diff) = evaluated.diff {
                        record = record.with_diff(diff);
                    }
                    records.push(record);
                }
            }
        }
    }
}
