use tree_sitter::Node;

use crate::operators::{self, MutationOp, MutationOperator};
use crate::parser::{Grammar, Site, node_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsDialect {
    JavaScript,
    TypeScript,
    Tsx,
}

pub struct JsGrammar {
    dialect: JsDialect,
}

impl JsGrammar {
    pub fn new(dialect: JsDialect) -> Self {
        Self { dialect }
    }
}

const CONSOLE_CALLS: &[&str] = &[
    "console.log",
    "console.warn",
    "console.error",
    "console.info",
    "console.debug",
];

impl Grammar for JsGrammar {
    fn language(&self) -> tree_sitter::Language {
        match self.dialect {
            JsDialect::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            JsDialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            JsDialect::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }

    fn is_function_root(&self, node: Node, _source: &str) -> bool {
        matches!(
            node.kind(),
            "function_declaration"
                | "generator_function_declaration"
                | "method_definition"
                | "arrow_function"
                | "function_expression"
                | "function"
                | "generator_function"
        )
    }

    fn should_skip(&self, node: Node, source: &str) -> bool {
        match node.kind() {
            "call_expression" => node
                .child_by_field_name("function")
                .is_some_and(|func| CONSOLE_CALLS.contains(&node_text(func, source))),
            // 'use strict' and friends
            "expression_statement" => {
                node.child_count() == 1 && node.child(0).is_some_and(|c| c.kind() == "string")
            }
            _ => false,
        }
    }

    fn classify(&self, node: Node, source: &str, sites: &mut Vec<Site>) {
        match node.kind() {
            "binary_expression" => collect_binary(node, source, sites),
            "unary_expression" => collect_unary(node, source, sites),
            "return_statement" => collect_return(node, source, sites),
            "true" | "false" => collect_boolean(node, source, sites),
            "if_statement" => collect_if_bodies(node, source, sites),
            "for_statement" | "for_in_statement" | "while_statement" => {
                if let Some(body) = node.child_by_field_name("body") {
                    push_block_removal(node, body, source, MutationOperator::LoopRemove, sites);
                }
            }
            _ => {}
        }
    }
}

fn collect_binary(node: Node, source: &str, sites: &mut Vec<Site>) {
    let Some(op_node) = node.child_by_field_name("operator") else {
        return;
    };
    let op_text = node_text(op_node, source);
    let ops: Vec<MutationOp> = match op_text {
        ">" | ">=" | "<" | "<=" | "==" | "!=" | "===" | "!==" => {
            operators::comparison_mutations(op_text)
        }
        "&&" | "||" | "??" => operators::logical_mutations(op_text),
        "+" if node
            .child_by_field_name("left")
            .is_some_and(|left| left.kind() == "string" || left.kind() == "template_string") =>
        {
            return;
        }
        "+" | "-" | "*" | "/" | "%" | "**" => operators::arithmetic_mutations(op_text),
        _ => return,
    };
    if !ops.is_empty() {
        sites.push(Site::new(node, op_node, source, ops));
    }
}

fn collect_unary(node: Node, source: &str, sites: &mut Vec<Site>) {
    let Some(op_node) = node.child_by_field_name("operator") else {
        return;
    };
    if op_node.kind() != "!" {
        return;
    }
    if let Some(operand) = node.child_by_field_name("argument") {
        let ops = vec![MutationOp::new(
            MutationOperator::NegateRemove,
            node_text(operand, source),
        )];
        sites.push(Site::new(node, node, source, ops));
    }
}

fn collect_return(node: Node, source: &str, sites: &mut Vec<Site>) {
    // return_statement: "return" [expression] [";"]
    let mut value = None;
    let count = node.child_count();
    for i in 0..count {
        if let Some(child) = node.child(i) {
            if child.kind() != "return" && child.kind() != ";" {
                value = Some(node_text(child, source));
                break;
            }
        }
    }
    sites.push(Site::new(node, node, source, operators::js_return_mutations(value)));
}

fn collect_boolean(node: Node, source: &str, sites: &mut Vec<Site>) {
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

fn collect_if_bodies(node: Node, source: &str, sites: &mut Vec<Site>) {
    if let Some(consequence) = node.child_by_field_name("consequence") {
        push_block_removal(node, consequence, source, MutationOperator::BlockRemove, sites);
    }

    // `else if` is a nested if_statement and is reached by the walk itself.
    let Some(alternative) = node.child_by_field_name("alternative") else {
        return;
    };
    if alternative.kind() != "else_clause" {
        return;
    }
    let count = alternative.child_count();
    for i in 0..count {
        if let Some(child) = alternative.child(i) {
            push_block_removal(node, child, source, MutationOperator::BlockRemove, sites);
        }
    }
}

fn push_block_removal(
    owner: Node,
    block: Node,
    source: &str,
    operator: MutationOperator,
    sites: &mut Vec<Site>,
) {
    if block.kind() != "statement_block" || node_text(block, source).trim() == "{}" {
        return;
    }
    sites.push(Site::new(owner, block, source, operators::brace_block_removal(operator)));
}
