use console::Style;

use crate::events::EventListener;
use crate::mutants::{Mutant, MutationPoint};
use crate::parser::ParseFailure;
use crate::state::{MutantRecord, RunResult};

pub fn print_error(msg: &str) {
    let style = Style::new().red().bold();
    eprintln!("{} {}", style.apply_to("✗"), msg);
}

pub fn print_success(msg: &str) {
    let style = Style::new().green().bold();
    println!("{} {}", style.apply_to("✓"), msg);
}

pub fn format_score(result: &RunResult) -> String {
    match result.score() {
        Some(score) => format!("{:.1}%", score * 100.0),
        None => "n/a".to_string(),
    }
}

pub fn print_run_result(result: &RunResult, cancelled: bool) {
    let seconds = result.duration_ms as f64 / 1000.0;
    let scored = result.killed() + result.survived();

    if cancelled {
        let style = Style::new().yellow().bold();
        println!(
            "{} cancelled after {} mutants ({} killed, {} survived) in {:.1}s",
            style.apply_to("!"),
            result.total(),
            result.killed(),
            result.survived(),
            seconds,
        );
    } else if result.survived() == 0 {
        let style = Style::new().green().bold();
        println!(
            "{} {} mutants, all killed ({}) in {:.1}s",
            style.apply_to("✓"),
            scored,
            format_score(result),
            seconds,
        );
    } else {
        let style = Style::new().yellow().bold();
        println!(
            "{} {} survived / {} tested ({} killed) in {:.1}s",
            style.apply_to("!"),
            result.survived(),
            scored,
            format_score(result),
            seconds,
        );
    }

    let dim = Style::new().dim();
    if result.build_failed() > 0 {
        println!("  {} {} mutants failed to build", dim.apply_to("·"), result.build_failed());
    }
    if result.skipped() > 0 {
        println!("  {} {} mutants skipped, no covering tests", dim.apply_to("·"), result.skipped());
    }
    for failure in &result.parse_failures {
        println!("  {} skipped {}", dim.apply_to("·"), failure);
    }

    if result.survived() > 0 {
        println!();
        print_survivors(result);
    }
}

fn print_survivors(result: &RunResult) {
    let ref_style = Style::new().cyan().bold();
    let loc_style = Style::new().dim();
    let op_style = Style::new().magenta();
    for (id, record) in result.survivors() {
        println!(
            "  {} {} {} {} → {}",
            ref_style.apply_to(format!("@{id}")),
            record.point.location(),
            loc_style.apply_to(format!("[{}]", record.operator)),
            op_style.apply_to(record.point.original.trim()),
            op_style.apply_to(record.replacement.trim()),
        );
    }
}

pub fn print_mutant_detail(id: &str, record: &MutantRecord) {
    let ref_style = Style::new().cyan().bold();
    let dim = Style::new().dim();

    println!(
        "{} {} [{}] in {}",
        ref_style.apply_to(format!("@{}", id.trim_start_matches('@'))),
        record.point.location(),
        record.operator,
        record.point.project,
    );
    println!();

    for line in &record.point.context_before {
        println!("  {}", dim.apply_to(line));
    }
    match &record.diff {
        Some(diff) => {
            for line in diff.lines() {
                if line.starts_with('-') {
                    println!("  {}", Style::new().red().apply_to(line));
                } else if line.starts_with('+') {
                    println!("  {}", Style::new().green().apply_to(line));
                }
            }
        }
        None => {
            println!("  {}", Style::new().red().apply_to(format!("- {}", record.point.original)));
            println!("  {}", Style::new().green().apply_to(format!("+ {}", record.replacement)));
        }
    }
    for line in &record.point.context_after {
        println!("  {}", dim.apply_to(line));
    }
}

pub fn print_status(result: &RunResult) {
    println!(
        "Last run: {} mutants, {} killed, {} survived, {} build failures, {} skipped ({} score)",
        result.total(),
        result.killed(),
        result.survived(),
        result.build_failed(),
        result.skipped(),
        format_score(result),
    );

    if result.survived() > 0 {
        println!();
        print_survivors(result);
        println!();
        println!("Use `mutant-sieve show @m1` for details on a specific mutant.");
    }
}

/// Live progress on stderr, one line per classified mutant.
pub struct ConsoleListener {
    verbose: bool,
}

impl ConsoleListener {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn mutant_line(&self, label: console::StyledObject<&str>, mutant: &Mutant<'_>) {
        eprintln!("  {} {}", label, mutant.describe());
    }
}

impl EventListener for ConsoleListener {
    fn run_started(&self, files: usize) {
        let dim = Style::new().dim();
        eprintln!("{}", dim.apply_to(format!("mutating {files} source files")));
    }

    fn point_discovered(&self, point: &MutationPoint) {
        if self.verbose {
            let dim = Style::new().dim();
            eprintln!("{}", dim.apply_to(format!("{} {}", point.location(), point.node_kind)));
        }
    }

    fn file_skipped(&self, failure: &ParseFailure) {
        let style = Style::new().yellow();
        eprintln!("  {} {}", style.apply_to("skip"), failure);
    }

    fn mutant_build_failed(&self, mutant: &Mutant<'_>, _output: &str) {
        if self.verbose {
            self.mutant_line(Style::new().dim().apply_to("unviable"), mutant);
        }
    }

    fn mutant_killed(&self, mutant: &Mutant<'_>) {
        if self.verbose {
            self.mutant_line(Style::new().green().apply_to("killed"), mutant);
        }
    }

    fn mutant_survived(&self, mutant: &Mutant<'_>) {
        self.mutant_line(Style::new().yellow().bold().apply_to("survived"), mutant);
    }

    fn mutant_skipped(&self, mutant: &Mutant<'_>) {
        if self.verbose {
            self.mutant_line(Style::new().dim().apply_to("skipped"), mutant);
        }
    }
}
