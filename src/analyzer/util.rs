//! Shared helpers for the analyzer passes: expression text canonicalization,
//! free-variable collection, and a flat statement walk in source order
//! (spec §4.E: every pass is "a pure function of the AST").

use crate::ast::{AssignTarget, BinOp, Expr, Program, Stmt, UnOp};
use std::collections::HashSet;

/// Flattens a program into `(line, stmt)` pairs in source order, descending
/// into `IF ... THEN <stmts> ELSE <stmts>` bodies (same line, conditional).
pub fn walk(program: &Program) -> Vec<(u32, &Stmt)> {
    let mut out = Vec::new();
    for (&line_num, line) in program.lines.iter() {
        for stmt in &line.statements {
            walk_stmt(line_num, stmt, &mut out);
        }
    }
    out
}

fn walk_stmt<'a>(line_num: u32, stmt: &'a Stmt, out: &mut Vec<(u32, &'a Stmt)>) {
    out.push((line_num, stmt));
    if let Stmt::If { then_branch, else_branch, .. } = stmt {
        for s in then_branch {
            walk_stmt(line_num, s, out);
        }
        for s in else_branch {
            walk_stmt(line_num, s, out);
        }
    }
}

/// Canonical text of an expression: upper-cased identifiers, normalized
/// operator spelling — used to test syntactic equality for CSE/reassociation
/// (spec §4.E "syntactically equal after normalization").
pub fn canonical_expr_text(expr: &Expr) -> String {
    match expr {
        Expr::Number { value, .. } => format!("{:?}", value),
        Expr::Str { value, .. } => format!("{:?}", value),
        Expr::Var { name, .. } => name.canonical(),
        Expr::ArrayRef { name, indices, .. } => {
            let idx: Vec<String> = indices.iter().map(canonical_expr_text).collect();
            format!("{}({})", name.canonical(), idx.join(","))
        }
        Expr::Call { name, args, .. } => {
            let a: Vec<String> = args.iter().map(canonical_expr_text).collect();
            format!("{}({})", name.to_uppercase(), a.join(","))
        }
        Expr::Unary { op, expr, .. } => format!("{}{}", unop_str(*op), canonical_expr_text(expr)),
        Expr::Binary { op, lhs, rhs, .. } => format!(
            "({} {} {})",
            canonical_expr_text(lhs),
            binop_str(*op),
            canonical_expr_text(rhs)
        ),
    }
}

fn unop_str(op: UnOp) -> &'static str {
    match op {
        UnOp::Neg => "-",
        UnOp::Pos => "+",
        UnOp::Not => "NOT ",
    }
}

fn binop_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::IntDiv => "\\",
        BinOp::Mod => "MOD",
        BinOp::Pow => "^",
        BinOp::Eq => "=",
        BinOp::Ne => "<>",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::And => "AND",
        BinOp::Or => "OR",
        BinOp::Xor => "XOR",
        BinOp::Eqv => "EQV",
        BinOp::Imp => "IMP",
    }
}

/// Every variable name (scalar or array base) read within `expr`.
pub fn expr_free_vars(expr: &Expr, out: &mut HashSet<String>) {
    match expr {
        Expr::Number { .. } | Expr::Str { .. } => {}
        Expr::Var { name, .. } => {
            out.insert(name.canonical());
        }
        Expr::ArrayRef { name, indices, .. } => {
            out.insert(name.canonical());
            for i in indices {
                expr_free_vars(i, out);
            }
        }
        Expr::Call { args, .. } => {
            for a in args {
                expr_free_vars(a, out);
            }
        }
        Expr::Unary { expr, .. } => expr_free_vars(expr, out),
        Expr::Binary { lhs, rhs, .. } => {
            expr_free_vars(lhs, out);
            expr_free_vars(rhs, out);
        }
    }
}

pub fn free_vars(expr: &Expr) -> HashSet<String> {
    let mut out = HashSet::new();
    expr_free_vars(expr, &mut out);
    out
}

/// Every variable directly read by `stmt` (condition/value/index
/// expressions) — shared by dead-write detection and copy propagation,
/// both of which need to know whether a later statement "uses" a variable.
pub fn stmt_reads(stmt: &Stmt) -> Vec<String> {
    let mut vars = HashSet::new();
    match stmt {
        Stmt::Let { target, value, .. } => {
            expr_free_vars(value, &mut vars);
            if let AssignTarget::ArrayElem(_, idx) = target {
                for i in idx {
                    expr_free_vars(i, &mut vars);
                }
            }
        }
        Stmt::If { cond, .. } => expr_free_vars(cond, &mut vars),
        Stmt::While { cond, .. } => expr_free_vars(cond, &mut vars),
        Stmt::Print { items, .. } => {
            for i in items {
                expr_free_vars(&i.expr, &mut vars);
            }
        }
        Stmt::OnGotoGosub { selector, .. } => expr_free_vars(selector, &mut vars),
        Stmt::Swap { a, b, .. } => {
            vars.insert(a.canonical());
            vars.insert(b.canonical());
        }
        _ => {}
    }
    vars.into_iter().collect()
}

/// Names directly written by `stmt` (not counting subroutine side effects —
/// that's the subroutine summary's job).
pub fn stmt_writes(stmt: &Stmt) -> Vec<String> {
    match stmt {
        Stmt::Let { target, .. } => vec![assign_target_name(target)],
        Stmt::Input { targets, .. } | Stmt::Read { targets, .. } => {
            targets.iter().map(assign_target_name).collect()
        }
        Stmt::ForStmt { var, .. } => vec![var.canonical()],
        Stmt::Swap { a, b, .. } => vec![a.canonical(), b.canonical()],
        Stmt::Next { vars, .. } if !vars.is_empty() => {
            vars.iter().map(|v| v.canonical()).collect()
        }
        _ => Vec::new(),
    }
}

fn assign_target_name(t: &AssignTarget) -> String {
    match t {
        AssignTarget::Scalar(n) => n.canonical(),
        AssignTarget::ArrayElem(n, _) => n.canonical(),
        AssignTarget::MidAssign { name, .. } => name.canonical(),
    }
}

/// Every `GOSUB` target line named anywhere in the program.
pub fn gosub_targets(program: &Program) -> HashSet<u32> {
    let mut out = HashSet::new();
    for (_, stmt) in walk(program) {
        match stmt {
            Stmt::Gosub { target, .. } => {
                out.insert(*target);
            }
            Stmt::OnGotoGosub { kind, targets, .. } if *kind == crate::ast::OnTarget::Gosub => {
                out.extend(targets.iter().copied());
            }
            _ => {}
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
    fn canonical_text_normalizes_case_and_operators() {
        let program = parse_program("10 X = a + 1\n", KeywordCase::Preserve).unwrap();
        let line = &program.lines[&10];
        if let Stmt::Let { value, .. } = &line.statements[0] {
            assert_eq!(canonical_expr_text(value), "(A + Integer(1))");
        } else {
            panic!("expected Let");
        }
    }

    #[test]
    fn free_vars_collects_array_and_indices() {
        let program = parse_program("10 X = A(I + 1)\n", KeywordCase::Preserve).unwrap();
        let line = &program.lines[&10];
        if let Stmt::Let { value, .. } = &line.statements[0] {
            let vars = free_vars(value);
            assert!(vars.contains("A"));
            assert!(vars.contains("I"));
        } else {
            panic!("expected Let");
        }
    }
}
