//! Language-neutral tree walk that turns a parsed source file into
//! [`MutationPoint`]s. Each grammar module decides which nodes are mutable and
//! what their candidate replacements are.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tree_sitter::{Node, Parser};

use crate::Language;
use crate::mutants::MutationPoint;
use crate::operators::MutationOp;
use crate::parser_js::{JsDialect, JsGrammar};
use crate::parser_python::PythonGrammar;
use crate::parser_rust::RustGrammar;

/// Lines of context captured on each side of a point.
const CONTEXT_LINES: usize = 2;

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{file}: {message}")]
pub struct ParseFailure {
    pub file: String,
    pub message: String,
}

/// A mutable syntax site found by a grammar, before it is tied to a file.
#[derive(Debug, Clone)]
pub struct Site {
    pub node_kind: &'static str,
    pub start_byte: usize,
    pub end_byte: usize,
    pub row: usize,
    pub column: usize,
    pub end_row: usize,
    pub original: String,
    pub ops: Vec<MutationOp>,
}

impl Site {
    /// `owner` names the node kind the point is grouped under; `anchor` is the
    /// span that gets replaced.
    pub fn new(owner: Node, anchor: Node, source: &str, ops: Vec<MutationOp>) -> Self {
        Self {
            node_kind: owner.kind(),
            start_byte: anchor.start_byte(),
            end_byte: anchor.end_byte(),
            row: anchor.start_position().row,
            column: anchor.start_position().column,
            end_row: anchor.end_position().row,
            original: node_text(anchor, source).to_string(),
            ops,
        }
    }
}

pub trait Grammar {
    fn language(&self) -> tree_sitter::Language;

    /// Nodes whose bodies are mutated. Code outside them is left alone.
    fn is_function_root(&self, node: Node, source: &str) -> bool;

    /// Subtrees that are noise for business logic (logging, docstrings).
    fn should_skip(&self, node: Node, source: &str) -> bool;

    fn classify(&self, node: Node, source: &str, sites: &mut Vec<Site>);
}

pub fn grammar_for(language: Language) -> Box<dyn Grammar> {
    match language {
        Language::Rust => Box::new(RustGrammar),
        Language::Python => Box::new(PythonGrammar),
        Language::JavaScript => Box::new(JsGrammar::new(JsDialect::JavaScript)),
        Language::TypeScript => Box::new(JsGrammar::new(JsDialect::TypeScript)),
        Language::Tsx => Box::new(JsGrammar::new(JsDialect::Tsx)),
    }
}

/// Parse `source` and return its mutation points in traversal order.
///
/// A file whose tree contains syntax errors is rejected as a whole: mutating
/// around an error node produces offsets nobody can trust.
pub fn discover_points(
    language: Language,
    source: &str,
    file: &Utf8Path,
    project: &str,
) -> Result<Vec<MutationPoint>, ParseFailure> {
    let grammar = grammar_for(language);
    let failure = |message: String| ParseFailure {
        file: file.to_string(),
        message,
    };

    let mut parser = Parser::new();
    parser
        .set_language(&grammar.language())
        .map_err(|e| failure(format!("failed to load grammar: {e}")))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| failure("parser produced no tree".to_string()))?;
    let root = tree.root_node();

    if root.has_error() {
        let message = match first_error(root) {
            Some(node) => format!(
                "syntax error at line {}, column {}",
                node.start_position().row + 1,
                node.start_position().column + 1
            ),
            None => "syntax error".to_string(),
        };
        return Err(failure(message));
    }

    let mut sites = Vec::new();
    collect_roots(grammar.as_ref(), root, source, &mut sites);

    let lines: Vec<&str> = source.lines().collect();
    Ok(sites
        .into_iter()
        .map(|site| {
            let (context_before, context_after) = get_context(&lines, site.row, CONTEXT_LINES);
            MutationPoint {
                file: file.to_path_buf(),
                project: project.to_string(),
                node_kind: site.node_kind.to_string(),
                line: site.row + 1,
                column: site.column + 1,
                end_line: site.end_row + 1,
                start_byte: site.start_byte,
                end_byte: site.end_byte,
                original: site.original,
                candidates: site.ops,
                context_before,
                context_after,
            }
        })
        .collect())
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let count = node.child_count();
    for i in 0..count {
        if let Some(child) = node.child(i) {
            if child.has_error() {
                if let Some(found) = first_error(child) {
                    return Some(found);
                }
            }
        }
    }
    None
}

fn collect_roots(grammar: &dyn Grammar, node: Node, source: &str, sites: &mut Vec<Site>) {
    if grammar.is_function_root(node, source) {
        walk_node(grammar, node, source, sites);
        return;
    }
    let count = node.child_count();
    for i in 0..count {
        if let Some(child) = node.child(i) {
            collect_roots(grammar, child, source, sites);
        }
    }
}

fn walk_node(grammar: &dyn Grammar, node: Node, source: &str, sites: &mut Vec<Site>) {
    if grammar.should_skip(node, source) {
        return;
    }

    grammar.classify(node, source, sites);

    let count = node.child_count();
    for i in 0..count {
        if let Some(child) = node.child(i) {
            walk_node(grammar, child, source, sites);
        }
    }
}

fn get_context(lines: &[&str], line_idx: usize, range: usize) -> (Vec<String>, Vec<String>) {
    let line_idx = line_idx.min(lines.len());
    let start = line_idx.saturating_sub(range);
    let end = (line_idx + range + 1).min(lines.len());
    let before: Vec<String> = lines[start..line_idx].iter().map(|s| s.to_string()).collect();
    let after: Vec<String> = if line_idx + 1 < end {
        lines[line_idx + 1..end].iter().map(|s| s.to_string()).collect()
    } else {
        vec![]
    };
    (before, after)
}

pub fn node_text<'a>(node: Node<'a>, source: &'a str) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}
