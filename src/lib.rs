//! Mutation testing engine: discovers mutation points with tree-sitter,
//! selects the tests that cover each one, builds every mutant in an isolated
//! copy of the solution and classifies it as killed or survived.

pub mod config;
pub mod copy_tree;
pub mod coverage;
pub mod discovery;
pub mod events;
pub mod generator;
pub mod isolation;
pub mod mutants;
pub mod operators;
pub mod output;
pub mod parser;
pub mod parser_js;
pub mod parser_python;
pub mod parser_rust;
pub mod ports;
pub mod process;
pub mod runner;
pub mod state;

use std::sync::Arc;

pub use config::{Config, ConfigError};
pub use events::{EventListener, MutationEvent};
pub use mutants::{Mutant, MutationPoint};
pub use ports::{PortError, TestFinder, TestRunner, TestRunnerResult};
pub use runner::{CancellationToken, MutationTestRunner, RunError, RunOutcome};
pub use state::{MutantOutcome, MutantRecord, RunResult, ScorePolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Rust,
    JavaScript,
    TypeScript,
    Tsx,
}

pub fn detect_language(path: &std::path::Path) -> Option<Language> {
    match path.extension()?.to_str()? {
        "py" => Some(Language::Python),
        "rs" => Some(Language::Rust),
        "js" | "mjs" | "cjs" => Some(Language::JavaScript),
        "ts" | "mts" | "cts" => Some(Language::TypeScript),
        "tsx" | "jsx" => Some(Language::Tsx),
        _ => None,
    }
}

/// Run a full mutation test over `config` with the given collaborators.
///
/// Fails instead of returning a partial result when the configuration is
/// invalid or the test infrastructure breaks down.
pub fn run(
    config: &Config,
    test_runner: Arc<dyn TestRunner>,
    test_finder: Arc<dyn TestFinder>,
    listener: Arc<dyn EventListener>,
) -> Result<RunOutcome, RunError> {
    MutationTestRunner::new(test_runner, test_finder, listener).run(config)
}
