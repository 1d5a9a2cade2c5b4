use camino::Utf8Path;
use mutant_sieve::Language;
use mutant_sieve::mutants::MutationPoint;
use mutant_sieve::operators::MutationOperator;
use mutant_sieve::parser;

fn points(source: &str) -> Vec<MutationPoint> {
    parser::discover_points(Language::Python, source, Utf8Path::new("pkg/app.py"), "pkg").unwrap()
}

/// `(line, column, original, replacement)` for every candidate of `operator`.
fn candidates(points: &[MutationPoint], operator: MutationOperator) -> Vec<(usize, usize, String, String)> {
    points
        .iter()
        .flat_map(|p| p.mutants())
        .filter(|m| m.operator == operator)
        .map(|m| {
            (
                m.point.line,
                m.point.column,
                m.point.original.clone(),
                m.replacement.to_string(),
            )
        })
        .collect()
}

#[test]
fn comparison_point_carries_both_candidates_in_order() {
    let source = r#"
def check(x):
    if x > 0:
        return True
    return False
"#;
    let found = points(source);
    let cmp = found.iter().find(|p| p.original == ">").unwrap();
    assert_eq!((cmp.line, cmp.column), (3, 10));
    assert_eq!(cmp.node_kind, "comparison_operator");
    assert_eq!(cmp.file, "pkg/app.py");
    assert_eq!(cmp.project, "pkg");
    let ops: Vec<_> = cmp.mutants().map(|m| (m.operator, m.replacement)).collect();
    assert_eq!(
        ops,
        vec![(MutationOperator::Boundary, ">="), (MutationOperator::NegateCmp, "<=")]
    );
}

#[test]
fn boolean_operators_flip() {
    let source = r#"
def check(a, b, c):
    if a and b or c:
        return 1
    return 0
"#;
    let logic = candidates(&points(source), MutationOperator::LogicFlip);
    let pairs: Vec<_> = logic.iter().map(|(_, _, o, r)| (o.as_str(), r.as_str())).collect();
    assert_eq!(pairs.len(), 2);
    assert!(pairs.contains(&("and", "or")));
    assert!(pairs.contains(&("or", "and")));
    assert!(logic.iter().all(|(line, ..)| *line == 3));
}

#[test]
fn identity_and_membership_are_negated() {
    let source = r#"
def check(x, xs):
    if x is not None and x in xs:
        return 1
    return 0
"#;
    let negations = candidates(&points(source), MutationOperator::NegateEq);
    let pairs: Vec<_> = negations.iter().map(|(_, _, o, r)| (o.as_str(), r.as_str())).collect();
    assert_eq!(pairs, vec![("is not", "is"), ("in", "not in")]);
}

#[test]
fn chained_comparison_yields_one_point_per_operator() {
    let source = "def between(lo, x, hi):\n    return lo < x <= hi\n";
    let boundaries = candidates(&points(source), MutationOperator::Boundary);
    let originals: Vec<_> = boundaries.iter().map(|(_, _, o, _)| o.as_str()).collect();
    assert_eq!(originals, vec!["<", "<="]);
}

#[test]
fn not_operator_is_removed() {
    let source = r#"
def check(ready):
    if not ready:
        return 1
    return 0
"#;
    let nots = candidates(&points(source), MutationOperator::NegateRemove);
    assert_eq!(nots, vec![(3, 8, "not ready".to_string(), "ready".to_string())]);
}

#[test]
fn arithmetic_operators_are_found() {
    let source = r#"
def calc(a, b):
    return a + b - a * b / a // b % a ** b
"#;
    let arith = candidates(&points(source), MutationOperator::Arith);
    let mut originals: Vec<_> = arith.iter().map(|(_, _, o, _)| o.as_str()).collect();
    originals.sort();
    assert_eq!(originals, vec!["%", "*", "**", "+", "-", "/", "//"]);
}

#[test]
fn string_concatenation_is_not_arithmetic() {
    let source = r#"
def greet(name):
    message = "hello " + name
    return message
"#;
    assert!(candidates(&points(source), MutationOperator::Arith).is_empty());
}

#[test]
fn return_values_are_replaced() {
    let source = r#"
def name():
    return "x"

def nothing():
    return

def items():
    return [1]
"#;
    let returns = candidates(&points(source), MutationOperator::ReturnVal);
    let replacements: Vec<_> = returns.iter().map(|(line, col, _, r)| (*line, *col, r.as_str())).collect();
    assert_eq!(
        replacements,
        vec![(3, 5, "return \"\""), (6, 5, "return None"), (9, 5, "return []")]
    );
}

#[test]
fn returned_boolean_is_mutated_once() {
    let source = "def yes():\n    return True\n";
    let found = points(source);
    assert!(candidates(&found, MutationOperator::BoolFlip).is_empty());
    assert_eq!(candidates(&found, MutationOperator::ReturnVal).len(), 1);
}

#[test]
fn standalone_boolean_literal_flips() {
    let source = "def setup():\n    flag = True\n    return flag\n";
    let bools = candidates(&points(source), MutationOperator::BoolFlip);
    assert_eq!(bools, vec![(2, 12, "True".to_string(), "False".to_string())]);
}

#[test]
fn if_body_is_replaced_with_pass() {
    let source = r#"
def check(x):
    if x:
        do_work()
        more_work()
    return 0
"#;
    let found = points(source);
    let block = found
        .iter()
        .find(|p| p.candidates[0].operator == MutationOperator::BlockRemove)
        .unwrap();
    assert_eq!((block.line, block.column), (4, 9));

    let mutant = block.mutants().next().unwrap();
    let mutated = mutant.apply(source);
    assert!(mutated.contains("pass"));
    assert!(!mutated.contains("do_work()"));
    assert!(!mutated.contains("more_work()"));
    assert!(mutated.contains("return 0"));
}

#[test]
fn pass_body_is_left_alone() {
    let source = "def check(x):\n    if x:\n        pass\n    return 0\n";
    assert!(candidates(&points(source), MutationOperator::BlockRemove).is_empty());
}

#[test]
fn docstrings_are_skipped() {
    let source = r#"
def foo(x):
    """Returns True if x > 0 and x < 10"""
    return x > 0
"#;
    let found = points(source);
    assert!(found.iter().all(|p| p.line != 3));
    assert!(found.iter().any(|p| p.line == 4 && p.original == ">"));
}

#[test]
fn print_and_logging_calls_are_skipped() {
    let source = r#"
import logging

def process(x):
    print(x > 0, True)
    logging.info("value %s", x + 1)
    logging.debug("flag %s", x == 2)
    return x >= 3
"#;
    let found = points(source);
    assert!(found.iter().all(|p| p.line == 8), "{found:#?}");
    assert_eq!(candidates(&found, MutationOperator::Boundary).len(), 1);
}

#[test]
fn module_level_code_is_not_mutated() {
    let source = "LIMIT = 1 + 2\nDEBUG = True\n\ndef f(x):\n    return x > LIMIT\n";
    let found = points(source);
    assert!(found.iter().all(|p| p.line == 5));
}

#[test]
fn methods_inside_classes_are_mutated() {
    let source = r#"
class Account:
    def withdraw(self, amount):
        if amount > self.balance:
            raise ValueError("insufficient")
        self.balance -= amount
"#;
    let found = points(source);
    assert!(found.iter().any(|p| p.original == ">"));
}

#[test]
fn byte_offsets_match_original_text() {
    let source = r#"
def f(a, b):
    if a > b and not a == 0:
        return a - b
    return None
"#;
    for point in points(source) {
        assert!(point.start_byte <= point.end_byte);
        assert!(point.end_byte <= source.len());
        assert_eq!(&source[point.start_byte..point.end_byte], point.original);
    }
}

#[test]
fn context_lines_surround_the_point() {
    let source = "def f(x, y):\n    a = x\n    b = x > y\n    c = y\n    return c\n";
    let found = points(source);
    let cmp = found.iter().find(|p| p.original == ">").unwrap();
    assert_eq!(cmp.line, 3);
    assert_eq!(cmp.context_before, vec!["def f(x, y):", "    a = x"]);
    assert_eq!(cmp.context_after, vec!["    c = y", "    return c"]);
}

#[test]
fn context_is_clamped_at_file_start() {
    let source = "def f():\n    x = 1 > 0\n";
    let found = points(source);
    let cmp = found.iter().find(|p| p.original == ">").unwrap();
    assert_eq!(cmp.context_before, vec!["def f():"]);
    assert!(cmp.context_after.is_empty());
}

#[test]
fn empty_source_has_no_points() {
    assert!(points("").is_empty());
    assert!(points("# just a comment\n").is_empty());
}

#[test]
fn syntax_errors_reject_the_file() {
    let err = parser::discover_points(
        Language::Python,
        "def broken(:\n    return 1\n",
        Utf8Path::new("broken.py"),
        "pkg",
    )
    .unwrap_err();
    assert_eq!(err.file, "broken.py");
    assert!(err.message.starts_with("syntax error"), "{}", err.message);
}
