use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::operators::{MutationOp, MutationOperator};

/// A syntax location eligible for mutation, with every operator that applies
/// to it in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationPoint {
    /// Path relative to the solution root, `/`-separated.
    pub file: Utf8PathBuf,
    pub project: String,
    pub node_kind: String,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub original: String,
    pub candidates: Vec<MutationOp>,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
}

impl MutationPoint {
    /// Mutants for this point in operator-declaration order.
    pub fn mutants(&self) -> impl Iterator<Item = Mutant<'_>> {
        self.candidates.iter().map(move |op| Mutant {
            point: self,
            operator: op.operator,
            replacement: &op.replacement,
        })
    }

    pub fn location(&self) -> String {
        format!("{}:{}:{}", self.file, self.line, self.column)
    }
}

/// One operator applied at one point. Borrowed from its point and dropped once
/// it has been built and tested.
#[derive(Debug, Clone, Copy)]
pub struct Mutant<'a> {
    pub point: &'a MutationPoint,
    pub operator: MutationOperator,
    pub replacement: &'a str,
}

impl Mutant<'_> {
    /// Splice the replacement into a copy of the original file text.
    pub fn apply(&self, source: &str) -> String {
        apply_replacement(source, self.point.start_byte, self.point.end_byte, self.replacement)
    }

    pub fn describe(&self) -> String {
        format!(
            "{} [{}] {} -> {}",
            self.point.location(),
            self.operator,
            self.point.original.trim(),
            self.replacement.trim()
        )
    }
}

pub fn apply_replacement(source: &str, start_byte: usize, end_byte: usize, replacement: &str) -> String {
    let mut result = String::with_capacity(source.len() + replacement.len());
    result.push_str(&source[..start_byte]);
    result.push_str(replacement);
    result.push_str(&source[end_byte..]);
    result
}

pub fn generate_diff(original: &str, mutated: &str) -> String {
    use similar::{ChangeTag, TextDiff};
    let diff = TextDiff::from_lines(original, mutated);
    let mut output = String::new();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Delete => output.push_str(&format!("- {}", change)),
            ChangeTag::Insert => output.push_str(&format!("+ {}", change)),
            ChangeTag::Equal => {}
        }
    }
    output
}
