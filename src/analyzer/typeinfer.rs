//! Type rebinding, type promotion, and integer-range inference (spec §4.E).
//!
//! A *rebinding* is a variable whose assigned expressions disagree with the
//! type its name (suffix or DEF-type letter range) implies, forcing a
//! runtime coercion on every store. A *promotion* is a variable that is
//! always assigned from integer-range-safe expressions and so could be
//! narrowed to `%` when `enable_integer_size_inference` is on.

use super::util::walk;
use crate::ast::{AssignTarget, BinOp, Expr, NumberLit, Program, Stmt, TypeTag};
use crate::config::AnalyzerConfig;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TypeRebinding {
    pub line: u32,
    pub variable: String,
    pub declared_type: TypeTag,
    pub assigned_type: TypeTag,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TypePromotion {
    pub variable: String,
    pub from: TypeTag,
    pub to: TypeTag,
    pub min_value: i64,
    pub max_value: i64,
}

/// Coarse static type of an expression: `None` when it depends on something
/// not locally decidable (an array element, a call whose return type isn't
/// fixed, etc.) — conservative, never guesses.
fn static_type(expr: &Expr, program: &Program) -> Option<TypeTag> {
    match expr {
        Expr::Number { value, .. } => Some(match value {
            NumberLit::Integer(_) => TypeTag::Integer,
            NumberLit::Single(_) => TypeTag::Single,
            NumberLit::Double(_) => TypeTag::Double,
        }),
        Expr::Str { .. } => Some(TypeTag::Str),
        Expr::Var { name, .. } => Some(program.def_type_map.effective_type(name)),
        Expr::ArrayRef { name, .. } => Some(program.def_type_map.effective_type(name)),
        Expr::Unary { expr, .. } => static_type(expr, program),
        Expr::Call { name, .. } if name.ends_with('$') => Some(TypeTag::Str),
        Expr::Call { .. } => None,
        Expr::Binary { op, lhs, rhs, .. } => {
            if matches!(op, BinOp::Add) {
                let l = static_type(lhs, program)?;
                let r = static_type(rhs, program)?;
                if l == TypeTag::Str || r == TypeTag::Str {
                    return if l == r { Some(TypeTag::Str) } else { None };
                }
            }
            if matches!(
                op,
                BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
                    | BinOp::And | BinOp::Or | BinOp::Xor | BinOp::Eqv | BinOp::Imp
            ) {
                return Some(TypeTag::Integer);
            }
            let l = static_type(lhs, program)?;
            let r = static_type(rhs, program)?;
            widen(l, r)
        }
    }
}

fn widen(a: TypeTag, b: TypeTag) -> Option<TypeTag> {
    use TypeTag::*;
    if a == Str || b == Str {
        return None;
    }
    Some(match (a, b) {
        (Double, _) | (_, Double) => Double,
        (Single, _) | (_, Single) => Single,
        (Integer, Integer) => Integer,
    })
}

/// Detects variables whose declared (suffix/DEF-type) type disagrees with
/// the static type of at least one expression assigned to them.
fn rebindings(program: &Program) -> Vec<TypeRebinding> {
    let mut out = Vec::new();
    for (line_num, stmt) in walk(program) {
        if let Stmt::Let { target: AssignTarget::Scalar(name), value, .. } = stmt {
            let declared = program.def_type_map.effective_type(name);
            if let Some(assigned) = static_type(value, program) {
                if assigned != declared {
                    out.push(TypeRebinding {
                        line: line_num,
                        variable: name.canonical(),
                        declared_type: declared,
                        assigned_type: assigned,
                    });
                }
            }
        }
    }
    out
}

/// Bounds a numeric literal expression, if every leaf is a literal and every
/// operator is range-computable (spec §4.E "integer-range inference").
fn literal_range(expr: &Expr) -> Option<(i64, i64)> {
    match expr {
        Expr::Number { value, .. } => {
            let n = match value {
                NumberLit::Integer(n) => *n,
                NumberLit::Single(f) if f.fract() == 0.0 => *f as i64,
                NumberLit::Double(f) if f.fract() == 0.0 => *f as i64,
                _ => return None,
            };
            Some((n, n))
        }
        Expr::Unary { op: crate::ast::UnOp::Neg, expr, .. } => {
            let (lo, hi) = literal_range(expr)?;
            Some((-hi, -lo))
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            let (al, ah) = literal_range(lhs)?;
            let (bl, bh) = literal_range(rhs)?;
            match op {
                BinOp::Add => Some((al + bl, ah + bh)),
                BinOp::Sub => Some((al - bh, ah - bl)),
                BinOp::Mul => {
                    let candidates = [al * bl, al * bh, ah * bl, ah * bh];
                    Some((*candidates.iter().min()?, *candidates.iter().max()?))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Tracks, per `Single`/`Double`-declared scalar variable, the running
/// integer range across every assignment, disqualifying any variable that
/// ever receives a non-literal-range expression, a `READ`/`INPUT`, or a
/// value outside 16-bit integer range.
fn promotions(program: &Program, config: &AnalyzerConfig) -> Vec<TypePromotion> {
    if !config.enable_integer_size_inference {
        return Vec::new();
    }
    let mut ranges: HashMap<String, (i64, i64)> = HashMap::new();
    let mut disqualified: HashSet<String> = HashSet::new();
    let mut declared: HashMap<String, TypeTag> = HashMap::new();

    for (_, stmt) in walk(program) {
        match stmt {
            Stmt::Let { target: AssignTarget::Scalar(name), value, .. } => {
                let decl = program.def_type_map.effective_type(name);
                if decl == TypeTag::Str || decl == TypeTag::Integer {
                    continue;
                }
                let key = name.canonical();
                declared.insert(key.clone(), decl);
                match literal_range(value) {
                    Some((lo, hi)) if lo >= i16::MIN as i64 && hi <= i16::MAX as i64 => {
                        let entry = ranges.entry(key).or_insert((lo, hi));
                        entry.0 = entry.0.min(lo);
                        entry.1 = entry.1.max(hi);
                    }
                    _ => {
                        disqualified.insert(key);
                    }
                }
            }
            Stmt::Input { targets, .. } | Stmt::Read { targets, .. } => {
                for t in targets {
                    if let AssignTarget::Scalar(n) = t {
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

    ranges
        .into_iter()
        .filter(|(k, _)| !disqualified.contains(k))
        .map(|(k, (lo, hi))| TypePromotion {
            from: declared.get(&k).copied().unwrap_or(TypeTag::Single),
            variable: k,
            to: TypeTag::Integer,
            min_value: lo,
            max_value: hi,
        })
        .collect()
}

/// Runs type rebinding and promotion analysis (spec §4.E).
pub fn run(program: &Program, config: &AnalyzerConfig) -> (Vec<TypeRebinding>, Vec<TypePromotion>) {
    (rebindings(program), promotions(program, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use crate::token::KeywordCase;

    #[test]
    fn distinct_suffixed_names_are_not_confused() {
        let program = parse_program("10 A$ = \"hi\"\n20 A = 1\n", KeywordCase::Preserve).unwrap();
        let (rebinds, _) = run(&program, &AnalyzerConfig::default());
        assert!(rebinds.is_empty());
    }

    #[test]
    fn string_literal_assigned_to_def_int_name_is_rebinding() {
        let program = parse_program("10 DEFINT A-Z\n20 A = \"hi\"\n", KeywordCase::Preserve).unwrap();
        let (rebinds, _) = run(&program, &AnalyzerConfig::default());
        assert!(rebinds.iter().any(|r| r.line == 20 && r.variable == "A"));
    }

    #[test]
    fn integer_literals_assigned_to_single_promote() {
        let program = parse_program("10 A = 1\n20 A = 2\n", KeywordCase::Preserve).unwrap();
        let (_, promos) = run(&program, &AnalyzerConfig::default());
        assert!(promos.iter().any(|p| p.variable == "A"));
    }

    #[test]
    fn disabled_inference_yields_no_promotions() {
        let program = parse_program("10 A = 1\n", KeywordCase::Preserve).unwrap();
        let mut config = AnalyzerConfig::default();
        config.enable_integer_size_inference = false;
        let (_, promos) = run(&program, &config);
        assert!(promos.is_empty());
    }

    #[test]
    fn read_target_is_not_promoted() {
        let program = parse_program("10 READ A\n20 A = 1\n30 DATA 5\n", KeywordCase::Preserve).unwrap();
        let (_, promos) = run(&program, &AnalyzerConfig::default());
        assert!(!promos.iter().any(|p| p.variable == "A"));
    }
}
