//! Reassociation (spec §4.E): `(X + 1) + 2` style chains of the same
//! associative, commutative operator with a literal on one side are
//! regrouped so the literals combine, e.g. `X + 1 + 2` → `X + 3`.

use super::util::{canonical_expr_text, walk};
use crate::ast::{BinOp, Expr, NumberLit, Program, Stmt};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Reassociation {
    pub line: u32,
    pub original_text: String,
    pub reassociated_text: String,
    pub combined_constant: f64,
}

fn is_assoc_commutative(op: BinOp) -> bool {
    matches!(op, BinOp::Add | BinOp::Mul | BinOp::And | BinOp::Or | BinOp::Xor)
}

fn identity_for(op: BinOp) -> f64 {
    match op {
        BinOp::Add => 0.0,
        BinOp::Mul => 1.0,
        BinOp::And => -1.0,
        BinOp::Or | BinOp::Xor => 0.0,
        _ => 0.0,
    }
}

fn combine(op: BinOp, a: f64, b: f64) -> f64 {
    match op {
        BinOp::Add => a + b,
        BinOp::Mul => a * b,
        BinOp::And => ((a as i64) & (b as i64)) as f64,
        BinOp::Or => ((a as i64) | (b as i64)) as f64,
        BinOp::Xor => ((a as i64) ^ (b as i64)) as f64,
        _ => b,
    }
}

fn literal_f64(expr: &Expr) -> Option<f64> {
    match expr {
        Expr::Number { value, .. } => Some(match value {
            NumberLit::Integer(n) => *n as f64,
            NumberLit::Single(f) => *f as f64,
            NumberLit::Double(f) => *f,
        }),
        _ => None,
    }
}

/// Walks a chain of same-operator binary nodes and splits it into the
/// non-literal operand and the combined constant, if the whole chain uses
/// one associative, commutative operator and carries at least two literals.
fn try_reassociate(expr: &Expr) -> Option<(BinOp, String, f64, usize)> {
    let Expr::Binary { op, lhs, rhs, .. } = expr else { return None };
    if !is_assoc_commutative(*op) {
        return None;
    }
    let mut literal_count = 0;
    let mut acc = identity_for(*op);
    let mut non_literal: Option<String> = None;

    let mut stack = vec![lhs.as_ref(), rhs.as_ref()];
    while let Some(node) = stack.pop() {
        match node {
            Expr::Binary { op: inner_op, lhs, rhs, .. } if *inner_op == *op => {
                stack.push(lhs.as_ref());
                stack.push(rhs.as_ref());
            }
            other => {
                if let Some(v) = literal_f64(other) {
                    acc = combine(*op, acc, v);
                    literal_count += 1;
                } else {
                    let text = canonical_expr_text(other);
                    non_literal = Some(match non_literal {
                        None => text,
                        Some(prev) => format!("({} {} {})", prev, super_binop_str(*op), text),
                    });
                }
            }
        }
    }
    if literal_count < 2 {
        return None;
    }
    non_literal.map(|nl| (*op, nl, acc, literal_count))
}

fn super_binop_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Mul => "*",
        BinOp::And => "AND",
        BinOp::Or => "OR",
        BinOp::Xor => "XOR",
        _ => "?",
    }
}

fn stmt_exprs(stmt: &Stmt) -> Vec<&Expr> {
    match stmt {
        Stmt::Let { value, .. } => vec![value],
        Stmt::If { cond, .. } => vec![cond],
        Stmt::While { cond, .. } => vec![cond],
        Stmt::Print { items, .. } => items.iter().map(|i| &i.expr).collect(),
        Stmt::OnGotoGosub { selector, .. } => vec![selector],
        _ => Vec::new(),
    }
}

fn walk_expr_for_reassoc(expr: &Expr, line: u32, out: &mut Vec<Reassociation>) {
    if let Some((op, non_literal, constant, _)) = try_reassociate(expr) {
        let reassociated = format!("({} {} {})", non_literal, super_binop_str(op), format_const(constant));
        out.push(Reassociation {
            line,
            original_text: canonical_expr_text(expr),
            reassociated_text: reassociated,
            combined_constant: constant,
        });
        return; // the whole chain was consumed; don't also descend into it
    }
    match expr {
        Expr::Binary { lhs, rhs, .. } => {
            walk_expr_for_reassoc(lhs, line, out);
            walk_expr_for_reassoc(rhs, line, out);
        }
        Expr::Unary { expr, .. } => walk_expr_for_reassoc(expr, line, out),
        Expr::Call { args, .. } => {
            for a in args {
                walk_expr_for_reassoc(a, line, out);
            }
        }
        Expr::ArrayRef { indices, .. } => {
            for i in indices {
                walk_expr_for_reassoc(i, line, out);
            }
        }
        _ => {}
    }
}

fn format_const(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Runs reassociation across the whole program (spec §4.E).
pub fn run(program: &Program) -> Vec<Reassociation> {
    let mut out = Vec::new();
    for (line_num, stmt) in walk(program) {
        for expr in stmt_exprs(stmt) {
            walk_expr_for_reassoc(expr, line_num, &mut out);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use crate::token::KeywordCase;

    #[test]
    fn combines_literal_chain_with_variable() {
        let program = parse_program("10 Y = X + 1 + 2\n", KeywordCase::Preserve).unwrap();
        let out = run(&program);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].combined_constant, 3.0);
    }

    #[test]
    fn single_literal_is_not_reported() {
        let program = parse_program("10 Y = X + 1\n", KeywordCase::Preserve).unwrap();
        let out = run(&program);
        assert!(out.is_empty());
    }

    #[test]
    fn non_commutative_operator_is_ignored() {
        let program = parse_program("10 Y = (X - 1) - 2\n", KeywordCase::Preserve).unwrap();
        let out = run(&program);
        assert!(out.is_empty());
    }
}
