//! Mutation operator catalog.
//!
//! Each function maps the text of a syntax token to the ordered list of
//! candidate replacements for it. The order is the order in which the runner
//! tries candidates at a node, so the cheapest-to-survive variant comes first.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOperator {
    /// `>` to `>=` and friends.
    Boundary,
    /// `>` to `<=` and friends.
    NegateCmp,
    /// `==` to `!=` and back.
    NegateEq,
    /// `&&` to `||`, `and` to `or`.
    LogicFlip,
    Arith,
    BoolFlip,
    /// Drop a `!` / `not` prefix.
    NegateRemove,
    ReturnVal,
    BlockRemove,
    LoopRemove,
}

impl MutationOperator {
    pub const ALL: [MutationOperator; 10] = [
        MutationOperator::Boundary,
        MutationOperator::NegateCmp,
        MutationOperator::NegateEq,
        MutationOperator::LogicFlip,
        MutationOperator::Arith,
        MutationOperator::BoolFlip,
        MutationOperator::NegateRemove,
        MutationOperator::ReturnVal,
        MutationOperator::BlockRemove,
        MutationOperator::LoopRemove,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MutationOperator::Boundary => "boundary",
            MutationOperator::NegateCmp => "negate_cmp",
            MutationOperator::NegateEq => "negate_eq",
            MutationOperator::LogicFlip => "logic_flip",
            MutationOperator::Arith => "arith",
            MutationOperator::BoolFlip => "bool_flip",
            MutationOperator::NegateRemove => "negate_remove",
            MutationOperator::ReturnVal => "return_val",
            MutationOperator::BlockRemove => "block_remove",
            MutationOperator::LoopRemove => "loop_remove",
        }
    }

    pub fn parse(name: &str) -> Option<MutationOperator> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }
}

impl std::fmt::Display for MutationOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One replacement an operator proposes for a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOp {
    pub operator: MutationOperator,
    pub replacement: String,
}

impl MutationOp {
    pub fn new(operator: MutationOperator, replacement: impl Into<String>) -> Self {
        Self {
            operator,
            replacement: replacement.into(),
        }
    }
}

/// Relational operators, shared by every supported language.
pub fn comparison_mutations(op_text: &str) -> Vec<MutationOp> {
    use MutationOperator::{Boundary, NegateCmp, NegateEq};
    match op_text {
        ">" => vec![MutationOp::new(Boundary, ">="), MutationOp::new(NegateCmp, "<=")],
        ">=" => vec![MutationOp::new(Boundary, ">"), MutationOp::new(NegateCmp, "<")],
        "<" => vec![MutationOp::new(Boundary, "<="), MutationOp::new(NegateCmp, ">=")],
        "<=" => vec![MutationOp::new(Boundary, "<"), MutationOp::new(NegateCmp, ">")],
        "==" => vec![MutationOp::new(NegateEq, "!=")],
        "!=" => vec![MutationOp::new(NegateEq, "==")],
        "===" => vec![MutationOp::new(NegateEq, "!==")],
        "!==" => vec![MutationOp::new(NegateEq, "===")],
        "is" => vec![MutationOp::new(NegateEq, "is not")],
        "is not" => vec![MutationOp::new(NegateEq, "is")],
        "in" => vec![MutationOp::new(NegateEq, "not in")],
        "not in" => vec![MutationOp::new(NegateEq, "in")],
        _ => vec![],
    }
}

pub fn logical_mutations(op_text: &str) -> Vec<MutationOp> {
    use MutationOperator::LogicFlip;
    match op_text {
        "&&" => vec![MutationOp::new(LogicFlip, "||")],
        "||" => vec![MutationOp::new(LogicFlip, "&&")],
        "??" => vec![MutationOp::new(LogicFlip, "||")],
        "and" => vec![MutationOp::new(LogicFlip, "or")],
        "or" => vec![MutationOp::new(LogicFlip, "and")],
        _ => vec![],
    }
}

pub fn arithmetic_mutations(op_text: &str) -> Vec<MutationOp> {
    use MutationOperator::Arith;
    match op_text {
        "+" => vec![MutationOp::new(Arith, "-")],
        "-" => vec![MutationOp::new(Arith, "+")],
        "*" => vec![MutationOp::new(Arith, "/")],
        "/" => vec![MutationOp::new(Arith, "*")],
        "//" => vec![MutationOp::new(Arith, "/")],
        "%" => vec![MutationOp::new(Arith, "/")],
        "**" => vec![MutationOp::new(Arith, "*")],
        _ => vec![],
    }
}

/// Boolean literals in every spelling the grammars produce.
pub fn boolean_mutations(text: &str) -> Vec<MutationOp> {
    use MutationOperator::BoolFlip;
    match text {
        "true" => vec![MutationOp::new(BoolFlip, "false")],
        "false" => vec![MutationOp::new(BoolFlip, "true")],
        "True" => vec![MutationOp::new(BoolFlip, "False")],
        "False" => vec![MutationOp::new(BoolFlip, "True")],
        _ => vec![],
    }
}

/// Replacement for a Python `return <expr>` statement.
pub fn python_return_mutations(return_value: Option<&str>) -> Vec<MutationOp> {
    use MutationOperator::ReturnVal;
    let Some(value) = return_value.map(str::trim) else {
        return vec![MutationOp::new(ReturnVal, "return None")];
    };

    let replacement = if value == "None" {
        "return \"\""
    } else if value == "True" {
        "return False"
    } else if value == "False" {
        "return True"
    } else if value.starts_with('"')
        || value.starts_with('\'')
        || value.starts_with("f\"")
        || value.starts_with("f'")
    {
        "return \"\""
    } else if value.starts_with('[') {
        "return []"
    } else if value.starts_with('{') {
        "return {}"
    } else if value == "0" {
        "return 1"
    } else if value.parse::<f64>().is_ok() {
        "return 0"
    } else {
        "return None"
    };
    vec![MutationOp::new(ReturnVal, replacement)]
}

/// Replacement for a Rust `return <expr>` expression. Unit-like returns have
/// no useful mutant.
pub fn rust_return_mutations(return_value: &str) -> Vec<MutationOp> {
    use MutationOperator::ReturnVal;
    let value = return_value.trim();
    let replacement = match value {
        "true" => "return false",
        "false" => "return true",
        "None" | "()" | "Ok(())" => return vec![],
        "0" => "return 1",
        _ if value.starts_with('"') => "return \"\".to_string()",
        _ if value.starts_with("vec!") || value.starts_with("Vec::") => "return vec![]",
        _ => "return Default::default()",
    };
    vec![MutationOp::new(ReturnVal, replacement)]
}

/// Replacement for a JavaScript/TypeScript `return` statement.
pub fn js_return_mutations(return_value: Option<&str>) -> Vec<MutationOp> {
    use MutationOperator::ReturnVal;
    let Some(value) = return_value.map(str::trim) else {
        return vec![MutationOp::new(ReturnVal, "return undefined;")];
    };

    let replacement = if value == "true" {
        "return false;"
    } else if value == "false" {
        "return true;"
    } else if value == "null" || value == "undefined" {
        "return \"\";"
    } else if value == "0" {
        "return 1;"
    } else if value.starts_with('"') || value.starts_with('\'') || value.starts_with('`') {
        "return \"\";"
    } else if value.starts_with('[') {
        "return [];"
    } else if value == "{}" {
        "return null;"
    } else if value.starts_with('{') {
        "return {};"
    } else if value.parse::<f64>().is_ok() {
        "return 0;"
    } else {
        "return null;"
    };
    vec![MutationOp::new(ReturnVal, replacement)]
}

/// Body removal for brace-delimited languages.
pub fn brace_block_removal(operator: MutationOperator) -> Vec<MutationOp> {
    vec![MutationOp::new(operator, "{}")]
}

/// Body removal for an indented Python block starting at `column`.
pub fn python_block_removal(column: usize) -> Vec<MutationOp> {
    vec![MutationOp::new(
        MutationOperator::BlockRemove,
        format!("\n{}pass", " ".repeat(column)),
    )]
}
