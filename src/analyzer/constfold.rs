//! Constant folding (spec §4.E): a compile-time evaluator over expressions
//! whose leaves are literals, single-static-assignment runtime constants, or
//! pure built-in calls.

use super::util::{canonical_expr_text, walk};
use crate::ast::{BinOp, Expr, NumberLit, Program, Stmt, UnOp};
use crate::builtins::Purity;
use crate::value::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ConstantFold {
    pub line: u32,
    pub expr_text: String,
    pub value: FoldedValue,
}

/// A const-folded value, kept separate from [`crate::value::Value`] so the
/// analyzer never needs a live `Runtime` to report a finding.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum FoldedValue {
    Number(f64),
    Str(String),
}

/// Variables assigned exactly once across the whole program with a literal
/// value, never reassigned, and never the target of `INPUT`/`READ`/`FOR`
/// (spec §4.E: "A variable stops being a runtime constant after any
/// subsequent assignment, after INPUT/READ, or after a... loop that may
/// reach an assignment to it" — the single-assignment restriction
/// conservatively satisfies that contract without path-sensitivity).
pub(crate) fn runtime_constants(program: &Program) -> HashMap<String, Value> {
    let mut assign_counts: HashMap<String, u32> = HashMap::new();
    let mut literal_values: HashMap<String, Value> = HashMap::new();
    let mut disqualified: HashSet<String> = HashSet::new();

    for (_, stmt) in walk(program) {
        match stmt {
            Stmt::Let {
                target: crate::ast::AssignTarget::Scalar(name),
                value,
                ..
            } => {
                let key = name.canonical();
                *assign_counts.entry(key.clone()).or_insert(0) += 1;
                if let Some(v) = literal_value(value) {
                    literal_values.insert(key, v);
                } else {
                    disqualified.insert(key);
                }
            }
            Stmt::Input { targets, .. } | Stmt::Read { targets, .. } => {
                for t in targets {
                    if let crate::ast::AssignTarget::Scalar(n) = t {
                        disqualified.insert(n.canonical());
                    }
                }
            }
            Stmt::ForStmt { var, .. } => {
                disqualified.insert(var.canonical());
            }
            _ => {}
        }
    }

    literal_values
        .into_iter()
        .filter(|(k, _)| assign_counts.get(k) == Some(&1) && !disqualified.contains(k))
        .collect()
}

fn literal_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Number { value, .. } => Some(number_lit_value(*value)),
        Expr::Str { value, .. } => Some(Value::Str(value.clone())),
        _ => None,
    }
}

fn number_lit_value(lit: NumberLit) -> Value {
    match lit {
        NumberLit::Integer(n) => Value::Double(n as f64),
        NumberLit::Single(f) => Value::Single(f),
        NumberLit::Double(f) => Value::Double(f),
    }
}

pub(crate) fn fold_expr(
    expr: &Expr,
    consts: &HashMap<String, Value>,
    purity_of: fn(&str) -> Purity,
) -> Option<Value> {
    match expr {
        Expr::Number { value, .. } => Some(number_lit_value(*value)),
        Expr::Str { value, .. } => Some(Value::Str(value.clone())),
        Expr::Var { name, .. } => consts.get(&name.canonical()).cloned(),
        Expr::ArrayRef { .. } => None,
        Expr::Unary { op, expr, .. } => {
            let v = fold_expr(expr, consts, purity_of)?;
            let f = v.as_f64().ok()?;
            Some(match op {
                UnOp::Neg => Value::Double(-f),
                UnOp::Pos => Value::Double(f),
                UnOp::Not => Value::Double(if f == 0.0 { -1.0 } else { 0.0 }),
            })
        }
        Expr::Call { name, args, .. } => {
            if purity_of(&name.to_uppercase()) != Purity::Pure {
                return None;
            }
            let mut vals = Vec::with_capacity(args.len());
            for a in args {
                vals.push(fold_expr(a, consts, purity_of)?);
            }
            crate::builtins::call(&name.to_uppercase(), &vals, &mut scratch_runtime()).ok()
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            let l = fold_expr(lhs, consts, purity_of)?;
            let r = fold_expr(rhs, consts, purity_of)?;
            fold_binop(*op, l, r)
        }
    }
}

/// A throwaway runtime for folding pure calls at analysis time — pure
/// built-ins never touch it.
fn scratch_runtime() -> crate::runtime::Runtime {
    crate::runtime::Runtime::new(
        &Program::new(),
        crate::limits::ResourceLimiter::new(crate::config::ResourceLimits::default()),
    )
}

fn fold_binop(op: BinOp, l: Value, r: Value) -> Option<Value> {
    if let (Value::Str(a), Value::Str(b)) = (&l, &r) {
        return match op {
            BinOp::Add => Some(Value::Str(format!("{a}{b}"))),
            BinOp::Eq => Some(bool_val(a == b)),
            BinOp::Ne => Some(bool_val(a != b)),
            BinOp::Lt => Some(bool_val(a < b)),
            BinOp::Le => Some(bool_val(a <= b)),
            BinOp::Gt => Some(bool_val(a > b)),
            BinOp::Ge => Some(bool_val(a >= b)),
            _ => None,
        };
    }
    let a = l.as_f64().ok()?;
    let b = r.as_f64().ok()?;
    Some(match op {
        BinOp::Add => Value::Double(a + b),
        BinOp::Sub => Value::Double(a - b),
        BinOp::Mul => Value::Double(a * b),
        BinOp::Div => {
            if b == 0.0 {
                return None;
            }
            Value::Double(a / b)
        }
        BinOp::IntDiv => {
            if b == 0.0 {
                return None;
            }
            Value::Double((a / b).trunc())
        }
        BinOp::Mod => {
            if b == 0.0 {
                return None;
            }
            Value::Double(a % b)
        }
        BinOp::Pow => Value::Double(a.powf(b)),
        BinOp::Eq => bool_val(a == b),
        BinOp::Ne => bool_val(a != b),
        BinOp::Lt => bool_val(a < b),
        BinOp::Le => bool_val(a <= b),
        BinOp::Gt => bool_val(a > b),
        BinOp::Ge => bool_val(a >= b),
        BinOp::And => bool_val((a as i64 & b as i64) != 0),
        BinOp::Or => bool_val((a as i64 | b as i64) != 0),
        BinOp::Xor => bool_val((a as i64 ^ b as i64) != 0),
        BinOp::Eqv => bool_val(!((a as i64) ^ (b as i64) != 0)),
        BinOp::Imp => bool_val((a as i64 == 0) || (b as i64 != 0)),
    })
}

fn bool_val(b: bool) -> Value {
    Value::Double(if b { -1.0 } else { 0.0 })
}

fn value_to_folded(v: Value) -> FoldedValue {
    match v {
        Value::Str(s) => FoldedValue::Str(s),
        other => FoldedValue::Number(other.as_f64().unwrap_or(0.0)),
    }
}

/// Collects one finding per expression that fully folds to a constant,
/// across every statement that carries an expression (spec §4.E).
pub fn run(program: &Program, purity_of: fn(&str) -> Purity) -> Vec<ConstantFold> {
    let consts = runtime_constants(program);
    let mut out = Vec::new();
    for (line_num, stmt) in walk(program) {
        for expr in stmt_exprs(stmt) {
            if matches!(expr, Expr::Number { .. } | Expr::Str { .. }) {
                continue; // already a literal; not a "fold"
            }
            if let Some(v) = fold_expr(expr, &consts, purity_of) {
                out.push(ConstantFold {
                    line: line_num,
                    expr_text: canonical_expr_text(expr),
                    value: value_to_folded(v),
                });
            }
        }
    }
    out
}

/// Every top-level expression carried directly by a statement (not
/// recursing into sub-expressions — callers fold whole expressions, and
/// `fold_expr` itself recurses).
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::purity;
    use crate::parser::parse_program;
    use crate::token::KeywordCase;

    #[test]
    fn folds_literal_arithmetic() {
        let program = parse_program("10 PRINT 1 + 2\n", KeywordCase::Preserve).unwrap();
        let folds = run(&program, purity);
        assert_eq!(folds.len(), 1);
        assert_eq!(folds[0].value, FoldedValue::Number(3.0));
    }

    #[test]
    fn single_assignment_constant_propagates_into_condition() {
        let program = parse_program(
            "10 DEBUG = 0\n20 IF DEBUG THEN PRINT \"d\"\n30 PRINT \"ok\"\n",
            KeywordCase::Preserve,
        )
        .unwrap();
        let folds = run(&program, purity);
        assert!(folds.iter().any(|f| f.line == 20 && f.value == FoldedValue::Number(0.0)));
    }

    #[test]
    fn reassigned_variable_is_not_folded() {
        let program = parse_program("10 X = 1\n20 X = 2\n30 PRINT X + 1\n", KeywordCase::Preserve).unwrap();
        let folds = run(&program, purity);
        assert!(!folds.iter().any(|f| f.line == 30));
    }
}
