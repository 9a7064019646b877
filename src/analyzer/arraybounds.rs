//! Array bounds analysis (spec §4.E): when `DIM A(n)` is declared with
//! constant dimensions and a later access uses a constant subscript outside
//! `[lower_bound, n]`, record the violation at analysis time. This is
//! independent of (and does not replace) the runtime's own bounds check in
//! [`crate::value::ArrayValue::flat_index`], which still fires for every
//! subscript, constant or not.

use super::util::walk;
use crate::ast::{AssignTarget, Expr, NumberLit, Program, Stmt, UnOp};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ArrayBoundsViolation {
    pub line: u32,
    pub array: String,
    pub subscript: i32,
    pub lower_bound: i32,
    pub upper_bound: i32,
}

/// The subscript's value when it is a compile-time constant (a literal
/// integer, optionally negated).
fn const_subscript(expr: &Expr) -> Option<i32> {
    match expr {
        Expr::Number { value: NumberLit::Integer(n), .. } => Some(*n as i32),
        Expr::Unary { op: UnOp::Neg, expr, .. } => const_subscript(expr).map(|v| -v),
        _ => None,
    }
}

/// `OPTION BASE` is required to appear before any array use, so one static
/// scan for the first occurrence is sufficient (spec §4.H `OPTION BASE`).
fn static_option_base(program: &Program) -> i32 {
    for (_, stmt) in walk(program) {
        if let Stmt::OptionBase { base, .. } = stmt {
            return *base as i32;
        }
    }
    0
}

fn collect_array_refs<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a [Expr])>) {
    match expr {
        Expr::Number { .. } | Expr::Str { .. } | Expr::Var { .. } => {}
        Expr::ArrayRef { name, indices, .. } => {
            out.push((name.canonical(), indices.as_slice()));
            for i in indices {
                collect_array_refs(i, out);
            }
        }
        Expr::Call { args, .. } => {
            for a in args {
                collect_array_refs(a, out);
            }
        }
        Expr::Unary { expr, .. } => collect_array_refs(expr, out),
        Expr::Binary { lhs, rhs, .. } => {
            collect_array_refs(lhs, out);
            collect_array_refs(rhs, out);
        }
    }
}

/// Every array access a statement directly carries: reads nested in its
/// expressions plus array-element assignment/read targets.
fn statement_array_accesses(stmt: &Stmt) -> Vec<(String, &[Expr])> {
    let mut out = Vec::new();
    match stmt {
        Stmt::Let { target, value, .. } => {
            collect_array_refs(value, &mut out);
            if let AssignTarget::ArrayElem(name, idx) = target {
                out.push((name.canonical(), idx.as_slice()));
            }
        }
        Stmt::If { cond, .. } => collect_array_refs(cond, &mut out),
        Stmt::While { cond, .. } => collect_array_refs(cond, &mut out),
        Stmt::Print { items, .. } => {
            for i in items {
                collect_array_refs(&i.expr, &mut out);
            }
        }
        Stmt::OnGotoGosub { selector, .. } => collect_array_refs(selector, &mut out),
        Stmt::Read { targets, .. } | Stmt::Input { targets, .. } => {
            for t in targets {
                if let AssignTarget::ArrayElem(name, idx) = t {
                    out.push((name.canonical(), idx.as_slice()));
                }
            }
        }
        _ => {}
    }
    out
}

/// Runs array-bounds analysis over every statically-dimensioned array with
/// a constant subscript access (spec §4.E).
pub fn run(program: &Program) -> Vec<ArrayBoundsViolation> {
    let base = static_option_base(program);
    let mut decls: HashMap<String, Vec<i32>> = HashMap::new();
    for (_, stmt) in walk(program) {
        if let Stmt::Dim { arrays, .. } = stmt {
            for (name, dims) in arrays {
                if let Some(consts) = dims.iter().map(const_subscript).collect::<Option<Vec<i32>>>() {
                    decls.insert(name.canonical(), consts);
                }
            }
        }
    }

    let mut out = Vec::new();
    for (line_num, stmt) in walk(program) {
        for (name, idx_exprs) in statement_array_accesses(stmt) {
            let Some(bounds) = decls.get(&name) else { continue };
            for (dim_i, idx_expr) in idx_exprs.iter().enumerate() {
                let Some(sub) = const_subscript(idx_expr) else { continue };
                let Some(&upper) = bounds.get(dim_i) else { continue };
                if sub < base || sub > upper {
                    out.push(ArrayBoundsViolation {
                        line: line_num,
                        array: name.clone(),
                        subscript: sub,
                        lower_bound: base,
                        upper_bound: upper,
                    });
                }
            }
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
    fn constant_subscript_past_upper_bound_is_flagged() {
        let program = parse_program(
            "10 OPTION BASE 0\n20 DIM A(10)\n30 A(11) = 1\n40 END\n",
            KeywordCase::Preserve,
        )
        .unwrap();
        let findings = run(&program);
        assert!(findings.iter().any(|f| f.line == 30 && f.array == "A" && f.subscript == 11));
    }

    #[test]
    fn constant_subscript_below_lower_bound_is_flagged() {
        let program = parse_program(
            "10 OPTION BASE 0\n20 DIM A(10)\n30 A(-1) = 1\n40 END\n",
            KeywordCase::Preserve,
        )
        .unwrap();
        let findings = run(&program);
        assert!(findings.iter().any(|f| f.line == 30 && f.subscript == -1));
    }

    #[test]
    fn in_bounds_constant_subscript_is_not_flagged() {
        let program = parse_program(
            "10 OPTION BASE 0\n20 DIM A(10)\n30 A(10) = 1\n40 END\n",
            KeywordCase::Preserve,
        )
        .unwrap();
        let findings = run(&program);
        assert!(findings.is_empty());
    }

    #[test]
    fn variable_subscript_is_not_statically_checked() {
        let program = parse_program(
            "10 OPTION BASE 0\n20 DIM A(10)\n30 I = 99\n40 A(I) = 1\n50 END\n",
            KeywordCase::Preserve,
        )
        .unwrap();
        let findings = run(&program);
        assert!(findings.is_empty());
    }
}
