use tree_sitter::Node;

use crate::operators::{self, MutationOp, MutationOperator};
use crate::parser::{Grammar, Site, node_text};

pub struct PythonGrammar;

impl Grammar for PythonGrammar {
    fn language(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn is_function_root(&self, node: Node, _source: &str) -> bool {
        node.kind() == "function_definition"
    }

    /// Print/logging calls and bare string statements (docstrings).
    fn should_skip(&self, node: Node, source: &str) -> bool {
        match node.kind() {
            "call" => node.child(0).is_some_and(|func| {
                let text = node_text(func, source);
                text == "print" || text.starts_with("logging.") || text.starts_with("log.")
            }),
            "expression_statement" => {
                node.child_count() == 1 && node.child(0).is_some_and(|c| c.kind() == "string")
            }
            _ => false,
        }
    }

    fn classify(&self, node: Node, source: &str, sites: &mut Vec<Site>) {
        match node.kind() {
            "comparison_operator" => collect_comparison(node, source, sites),
            "boolean_operator" => collect_boolean_operator(node, source, sites),
            "not_operator" => collect_not(node, source, sites),
            "binary_operator" => collect_arithmetic(node, source, sites),
            "return_statement" => collect_return(node, source, sites),
            "true" | "false" => collect_boolean_literal(node, source, sites),
            "if_statement" => collect_if_body(node, source, sites),
            _ => {}
        }
    }
}

fn collect_comparison(node: Node, source: &str, sites: &mut Vec<Site>) {
    // a < b < c carries one operator token per comparison
    let count = node.child_count();
    for i in 0..count {
        let Some(child) = node.child(i) else { continue };
        if !matches!(
            child.kind(),
            "<" | ">" | "<=" | ">=" | "==" | "!=" | "is" | "in" | "is not" | "not in"
        ) {
            continue;
        }
        let ops = operators::comparison_mutations(node_text(child, source));
        if !ops.is_empty() {
            sites.push(Site::new(node, child, source, ops));
        }
    }
}

fn collect_boolean_operator(node: Node, source: &str, sites: &mut Vec<Site>) {
    let count = node.child_count();
    for i in 0..count {
        let Some(child) = node.child(i) else { continue };
        if child.kind() == "and" || child.kind() == "or" {
            let ops = operators::logical_mutations(node_text(child, source));
            sites.push(Site::new(node, child, source, ops));
        }
    }
}

fn collect_not(node: Node, source: &str, sites: &mut Vec<Site>) {
    let Some(keyword) = node.child(0) else { return };
    if keyword.kind() != "not" {
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

fn collect_arithmetic(node: Node, source: &str, sites: &mut Vec<Site>) {
    let count = node.child_count();
    for i in 0..count {
        let Some(child) = node.child(i) else { continue };
        let kind = child.kind();
        if !matches!(kind, "+" | "-" | "*" | "/" | "//" | "%" | "**") {
            continue;
        }
        // String concatenation is formatting, not arithmetic.
        if kind == "+"
            && node
                .child(0)
                .is_some_and(|left| left.kind() == "string" || left.kind() == "concatenated_string")
        {
            continue;
        }
        let ops = operators::arithmetic_mutations(node_text(child, source));
        if !ops.is_empty() {
            sites.push(Site::new(node, child, source, ops));
        }
    }
}

fn collect_return(node: Node, source: &str, sites: &mut Vec<Site>) {
    let value = if node.child_count() < 2 {
        None
    } else {
        node.child(1).map(|expr| node_text(expr, source))
    };
    sites.push(Site::new(node, node, source, operators::python_return_mutations(value)));
}

fn collect_boolean_literal(node: Node, source: &str, sites: &mut Vec<Site>) {
    if node
        .parent()
        .is_some_and(|parent| parent.kind() == "return_statement")
    {
        return;
    }
    let ops = operators::boolean_mutations(node_text(node, source));
    if !ops.is_empty() {
        sites.push(Site::new(node, node, source, ops));
    }
}

fn collect_if_body(node: Node, source: &str, sites: &mut Vec<Site>) {
    let count = node.child_count();
    for i in 0..count {
        let Some(child) = node.child(i) else { continue };
        if child.kind() != "block" {
            continue;
        }
        if node_text(child, source).trim() != "pass" {
            let ops = operators::python_block_removal(child.start_position().column);
            sites.push(Site::new(node, child, source, ops));
        }
        break;
    }
}
