use tree_sitter::Node;

use crate::operators::{self, MutationOp, MutationOperator};
use crate::parser::{Grammar, Site, node_text};

/// Macros whose arguments are logging or formatting, never logic.
const SKIPPED_MACROS: &[&str] = &[
    "println", "eprintln", "print", "eprint", "format", "write", "writeln", "log", "debug",
    "info", "warn", "error", "trace",
];

pub struct RustGrammar;

impl Grammar for RustGrammar {
    fn language(&self) -> tree_sitter::Language {
        tree_sitter_rust::LANGUAGE.into()
    }

    fn is_function_root(&self, node: Node, _source: &str) -> bool {
        node.kind() == "function_item"
    }

    fn should_skip(&self, node: Node, source: &str) -> bool {
        if node.kind() != "macro_invocation" {
            return false;
        }
        let Some(mac) = node.child_by_field_name("macro").or_else(|| node.child(0)) else {
            return false;
        };
        let name = node_text(mac, source);
        let name = name.rsplit("::").next().unwrap_or(name);
        SKIPPED_MACROS.contains(&name)
    }

    fn classify(&self, node: Node, source: &str, sites: &mut Vec<Site>) {
        match node.kind() {
            "binary_expression" => collect_binary(node, source, sites),
            "unary_expression" => collect_unary(node, source, sites),
            "return_expression" => collect_return(node, source, sites),
            "boolean_literal" => collect_boolean(node, source, sites),
            "if_expression" => collect_if_body(node, source, sites),
            _ => {}
        }
    }
}

fn collect_binary(node: Node, source: &str, sites: &mut Vec<Site>) {
    // binary_expression: left operator right
    let count = node.child_count();
    for i in 0..count {
        let Some(child) = node.child(i) else { continue };
        let op_text = node_text(child, source);
        let ops: Vec<MutationOp> = match child.kind() {
            ">" | ">=" | "<" | "<=" | "==" | "!=" => operators::comparison_mutations(op_text),
            "&&" | "||" => operators::logical_mutations(op_text),
            "+" | "-" | "*" | "/" | "%" => operators::arithmetic_mutations(op_text),
            _ => continue,
        };
        if !ops.is_empty() {
            sites.push(Site::new(node, child, source, ops));
        }
    }
}

fn collect_unary(node: Node, source: &str, sites: &mut Vec<Site>) {
    let Some(op_node) = node.child(0) else { return };
    if op_node.kind() != "!" {
        return;
    }
    if let Some(operand) = node.child(1) {
        let ops = vec![MutationOp::new(
            MutationOperator::NegateRemove,
            node_text(operand, source),
        )];
        sites.push(Site::new(node, node, source, ops));
    }
}

fn collect_return(node: Node, source: &str, sites: &mut Vec<Site>) {
    // return_expression: "return" expr?
    if node.child_count() < 2 {
        return;
    }
    if let Some(expr) = node.child(1) {
        let ops = operators::rust_return_mutations(node_text(expr, source));
        if !ops.is_empty() {
            sites.push(Site::new(node, node, source, ops));
        }
    }
}

fn collect_boolean(node: Node, source: &str, sites: &mut Vec<Site>) {
    // Returned literals are mutated as a whole return.
    if node
        .parent()
        .is_some_and(|parent| parent.kind() == "return_expression")
    {
        return;
    }
    let ops = operators::boolean_mutations(node_text(node, source));
    if !ops.is_empty() {
        sites.push(Site::new(node, node, source, ops));
    }
}

fn collect_if_body(node: Node, source: &str, sites: &mut Vec<Site>) {
    let Some(consequence) = node.child_by_field_name("consequence") else {
        return;
    };
    if consequence.kind() != "block" || node_text(consequence, source).trim() == "{}" {
        return;
    }
    sites.push(Site::new(
        node,
        consequence,
        source,
        operators::brace_block_removal(MutationOperator::BlockRemove),
    ));
}
