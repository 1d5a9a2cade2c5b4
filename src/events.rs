//! Progress notifications.
//!
//! Listeners observe a run and cannot influence it. Every method has a no-op
//! default so an implementation overrides only what it cares about.

use std::io::Write;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::mutants::{Mutant, MutationPoint};
use crate::operators::MutationOperator;
use crate::parser::ParseFailure;
use crate::state::RunResult;

pub trait EventListener: Send + Sync {
    fn run_started(&self, _files: usize) {}
    fn point_discovered(&self, _point: &MutationPoint) {}
    fn file_skipped(&self, _failure: &ParseFailure) {}
    fn mutant_build_started(&self, _mutant: &Mutant<'_>) {}
    fn mutant_build_failed(&self, _mutant: &Mutant<'_>, _output: &str) {}
    fn mutant_killed(&self, _mutant: &Mutant<'_>) {}
    fn mutant_survived(&self, _mutant: &Mutant<'_>) {}
    fn mutant_skipped(&self, _mutant: &Mutant<'_>) {}
    fn run_completed(&self, _result: &RunResult) {}
    fn run_cancelled(&self, _result: &RunResult) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl EventListener for NullListener {}

/// Owned snapshot of a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MutationEvent {
    RunStarted {
        files: usize,
    },
    PointDiscovered {
        location: String,
        node_kind: String,
    },
    FileSkipped {
        file: String,
        message: String,
    },
    BuildStarted {
        location: String,
        operator: MutationOperator,
    },
    BuildFailed {
        location: String,
        operator: MutationOperator,
    },
    Killed {
        location: String,
        operator: MutationOperator,
    },
    Survived {
        location: String,
        operator: MutationOperator,
        replacement: String,
    },
    Skipped {
        location: String,
        operator: MutationOperator,
    },
    RunCompleted {
        killed: usize,
        survived: usize,
        total: usize,
    },
    RunCancelled {
        total: usize,
    },
}

/// Records every event in arrival order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<MutationEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MutationEvent> {
        self.lock().clone()
    }

    fn push(&self, event: MutationEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MutationEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventListener for EventLog {
    fn run_started(&self, files: usize) {
        self.push(MutationEvent::RunStarted { files });
    }

    fn point_discovered(&self, point: &MutationPoint) {
        self.push(MutationEvent::PointDiscovered {
            location: point.location(),
            node_kind: point.node_kind.clone(),
        });
    }

    fn file_skipped(&self, failure: &ParseFailure) {
        self.push(MutationEvent::FileSkipped {
            file: failure.file.clone(),
            message: failure.message.clone(),
        });
    }

    fn mutant_build_started(&self, mutant: &Mutant<'_>) {
        self.push(MutationEvent::BuildStarted {
            location: mutant.point.location(),
            operator: mutant.operator,
        });
    }

    fn mutant_build_failed(&self, mutant: &Mutant<'_>, _output: &str) {
        self.push(MutationEvent::BuildFailed {
            location: mutant.point.location(),
            operator: mutant.operator,
        });
    }

    fn mutant_killed(&self, mutant: &Mutant<'_>) {
        self.push(MutationEvent::Killed {
            location: mutant.point.location(),
            operator: mutant.operator,
        });
    }

    fn mutant_survived(&self, mutant: &Mutant<'_>) {
        self.push(MutationEvent::Survived {
            location: mutant.point.location(),
            operator: mutant.operator,
            replacement: mutant.replacement.to_string(),
        });
    }

    fn mutant_skipped(&self, mutant: &Mutant<'_>) {
        self.push(MutationEvent::Skipped {
            location: mutant.point.location(),
            operator: mutant.operator,
        });
    }

    fn run_completed(&self, result: &RunResult) {
        self.push(MutationEvent::RunCompleted {
            killed: result.killed(),
            survived: result.survived(),
            total: result.total(),
        });
    }

    fn run_cancelled(&self, result: &RunResult) {
        self.push(MutationEvent::RunCancelled {
            total: result.total(),
        });
    }
}

/// Writes one JSON object per event, for machine consumers of `--json`.
pub struct JsonLinesListener<W: Write + Send> {
    out: Mutex<W>,
    log: EventLog,
}

impl<W: Write + Send> JsonLinesListener<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            log: EventLog::new(),
        }
    }

    fn emit(&self) {
        let events = std::mem::take(&mut *self.log.lock());
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for event in events {
            match serde_json::to_string(&event) {
                Ok(line) => {
                    if let Err(err) = writeln!(out, "{line}") {
                        tracing::debug!("dropping event line: {err}");
                    }
                }
                Err(err) => tracing::debug!("unserialisable event: {err}"),
            }
        }
    }
}

macro_rules! forward_and_emit {
    ($($name:ident($($arg:ident: $ty:ty),*);)*) => {
        $(
            fn $name(&self, $($arg: $ty),*) {
                self.log.$name($($arg),*);
                self.emit();
            }
        )*
    };
}

impl<W: Write + Send> EventListener for JsonLinesListener<W> {
    forward_and_emit! {
        run_started(files: usize);
        point_discovered(point: &MutationPoint);
        file_skipped(failure: &ParseFailure);
        mutant_build_started(mutant: &Mutant<'_>);
        mutant_build_failed(mutant: &Mutant<'_>, output: &str);
        mutant_killed(mutant: &Mutant<'_>);
        mutant_survived(mutant: &Mutant<'_>);
        mutant_skipped(mutant: &Mutant<'_>);
        run_completed(result: &RunResult);
        run_cancelled(result: &RunResult);
    }
}

/// Broadcasts to several listeners in registration order.
#[derive(Default)]
pub struct FanOut {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }
}

impl EventListener for FanOut {
    fn run_started(&self, files: usize) {
        self.listeners.iter().for_each(|l| l.run_started(files));
    }
    fn point_discovered(&self, point: &MutationPoint) {
        self.listeners.iter().for_each(|l| l.point_discovered(point));
    }
    fn file_skipped(&self, failure: &ParseFailure) {
        self.listeners.iter().for_each(|l| l.file_skipped(failure));
    }
    fn mutant_build_started(&self, mutant: &Mutant<'_>) {
        self.listeners.iter().for_each(|l| l.mutant_build_started(mutant));
    }
    fn mutant_build_failed(&self, mutant: &Mutant<'_>, output: &str) {
        self.listeners.iter().for_each(|l| l.mutant_build_failed(mutant, output));
    }
    fn mutant_killed(&self, mutant: &Mutant<'_>) {
        self.listeners.iter().for_each(|l| l.mutant_killed(mutant));
    }
    fn mutant_survived(&self, mutant: &Mutant<'_>) {
        self.listeners.iter().for_each(|l| l.mutant_survived(mutant));
    }
    fn mutant_skipped(&self, mutant: &Mutant<'_>) {
        self.listeners.iter().for_each(|l| l.mutant_skipped(mutant));
    }
    fn run_completed(&self, result: &RunResult) {
        self.listeners.iter().for_each(|l| l.run_completed(result));
    }
    fn run_cancelled(&self, result: &RunResult) {
        self.listeners.iter().for_each(|l| l.run_cancelled(result));
    }
}
