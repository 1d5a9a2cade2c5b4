use mutant_sieve::config::{self, Config};
use mutant_sieve::events::{EventListener, JsonLinesListener, NullListener};
use mutant_sieve::isolation;
use mutant_sieve::output;
use mutant_sieve::ports::{CommandTestFinder, CommandTestRunner, NoTestFinder, TestFinder};
use mutant_sieve::state;
use mutant_sieve::{CancellationToken, MutationTestRunner};

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const EXIT_CLEAN: i32 = 0;
const EXIT_SURVIVORS: i32 = 1;
const EXIT_CONFIG: i32 = 2;
const EXIT_FAILURE: i32 = 3;

#[derive(Parser)]
#[command(name = "mutant-sieve", version, about = "Coverage-guided mutation testing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run mutation testing over a solution
    Run {
        /// Run configuration
        #[arg(short, long, default_value = config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Override the worker count from the config
        #[arg(short, long, env = "MUTANT_SIEVE_WORKERS")]
        workers: Option<usize>,
        /// Only mutate files matching this glob (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,
        /// Only mutate projects matching this glob (repeatable)
        #[arg(long = "project")]
        projects: Vec<String>,
        /// Stream events and the final result as JSON lines
        #[arg(long)]
        json: bool,
        /// Exit code only, no output
        #[arg(short, long)]
        quiet: bool,
        /// Report every mutant, not only survivors
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show details for a survived mutant by ref
    Show {
        /// Mutant ref (e.g. @m1 or m1)
        #[arg(name = "ref")]
        mutant_ref: String,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Summary of last run
    Status {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove sandboxes left behind by interrupted runs
    Clean {
        /// Directory to sweep (default: the platform temp directory)
        #[arg(long)]
        temp_root: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Run {
            config,
            workers,
            files,
            projects,
            json,
            quiet,
            verbose,
        } => cmd_run(&config, workers, files, projects, json, quiet, verbose),
        Commands::Show { mutant_ref, json } => cmd_show(&mutant_ref, json),
        Commands::Status { json } => cmd_status(json),
        Commands::Clean { temp_root } => cmd_clean(temp_root),
    };

    process::exit(exit_code);
}

fn load_config(
    path: &Path,
    workers: Option<usize>,
    files: Vec<String>,
    projects: Vec<String>,
) -> anyhow::Result<Config> {
    let mut config = Config::load(path).with_context(|| {
        format!("could not load {}; pass --config <file>", path.display())
    })?;
    if let Some(workers) = workers {
        config = config.with_workers(workers);
    }
    if !files.is_empty() {
        config = config.with_source_file_filters(files);
    }
    if !projects.is_empty() {
        config = config.with_project_filters(projects);
    }
    if config.test_command.is_empty() {
        bail!("test_command is not set in {}", path.display());
    }
    Ok(config)
}

fn cmd_run(
    config_path: &Path,
    workers: Option<usize>,
    files: Vec<String>,
    projects: Vec<String>,
    json_mode: bool,
    quiet: bool,
    verbose: bool,
) -> i32 {
    let config = match load_config(config_path, workers, files, projects) {
        Ok(c) => c,
        Err(e) => {
            output::print_error(&format!("{e:#}"));
            return EXIT_CONFIG;
        }
    };

    let test_runner = Arc::new(CommandTestRunner::new(config.test_command.clone(), config.timeout()));
    let test_finder: Arc<dyn TestFinder> = match &config.test_list_command {
        Some(command) => Arc::new(CommandTestFinder::new(
            command.clone(),
            config.solution_root(),
            config.timeout(),
        )),
        None => Arc::new(NoTestFinder),
    };
    let listener: Arc<dyn EventListener> = if quiet {
        Arc::new(NullListener)
    } else if json_mode {
        Arc::new(JsonLinesListener::new(std::io::stdout()))
    } else {
        Arc::new(output::ConsoleListener::new(verbose))
    };

    let token = CancellationToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nCancelling: waiting for running mutants to finish...");
        handler_token.cancel();
    }) {
        tracing::warn!("could not install Ctrl-C handler: {e}");
    }

    let runner = MutationTestRunner::new(test_runner, test_finder, listener).with_cancellation(token);
    let outcome = match runner.run(&config) {
        Ok(outcome) => outcome,
        Err(e) => {
            output::print_error(&e.to_string());
            return if e.is_config() { EXIT_CONFIG } else { EXIT_FAILURE };
        }
    };

    let cancelled = outcome.is_cancelled();
    let result = outcome.into_result();
    if let Err(e) = state::save_last_run(&result) {
        tracing::warn!("failed to save run state: {e}");
    }

    if !quiet {
        if json_mode {
            match serde_json::to_string(&result) {
                Ok(json) => println!("{json}"),
                Err(e) => output::print_error(&format!("failed to serialise result: {e}")),
            }
        } else {
            output::print_run_result(&result, cancelled);
        }
    }

    if cancelled {
        EXIT_FAILURE
    } else if result.survived() > 0 {
        EXIT_SURVIVORS
    } else {
        EXIT_CLEAN
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string(value) {
        Ok(json) => {
            println!("{json}");
            EXIT_CLEAN
        }
        Err(e) => {
            output::print_error(&format!("failed to serialise: {e}"));
            EXIT_FAILURE
        }
    }
}

fn cmd_show(mutant_ref: &str, json_mode: bool) -> i32 {
    let Some(last_run) = state::load_last_run() else {
        output::print_error("No previous run found. Run `mutant-sieve run` first.");
        return EXIT_CONFIG;
    };

    match last_run.find_survivor(mutant_ref) {
        Some(record) => {
            if json_mode {
                return print_json(record);
            }
            output::print_mutant_detail(mutant_ref, record);
            EXIT_CLEAN
        }
        None => {
            let valid: Vec<_> = last_run.survivors().map(|(id, _)| format!("@{id}")).collect();
            output::print_error(&format!(
                "Mutant @{} not found. Valid refs: {}",
                mutant_ref.trim_start_matches('@'),
                valid.join(", ")
            ));
            EXIT_CONFIG
        }
    }
}

fn cmd_status(json_mode: bool) -> i32 {
    match state::load_last_run() {
        Some(result) => {
            if json_mode {
                return print_json(&result);
            }
            output::print_status(&result);
            EXIT_CLEAN
        }
        None => {
            output::print_error("No previous run found. Run `mutant-sieve run` first.");
            EXIT_CONFIG
        }
    }
}

fn cmd_clean(temp_root: Option<PathBuf>) -> i32 {
    let root = temp_root.unwrap_or_else(std::env::temp_dir);
    match isolation::sweep_stale_sandboxes(&root) {
        Ok(removed) => {
            output::print_success(&format!(
                "Removed {} stale sandbox{} from {}",
                removed.len(),
                if removed.len() == 1 { "" } else { "es" },
                root.display()
            ));
            EXIT_CLEAN
        }
        Err(e) => {
            output::print_error(&format!("Failed to scan {}: {e}", root.display()));
            EXIT_FAILURE
        }
    }
}
