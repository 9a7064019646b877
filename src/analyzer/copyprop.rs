//! Forward substitution / copy propagation (spec §4.E): `Y = X` followed by
//! uses of `Y` on paths where neither `X` nor `Y` is rewritten. Shares
//! dead-write detection's conservative forward-scan style: a branch target
//! is treated as "might rebind before the use", so only a straight-line run
//! to end-of-program (or the next rewrite) is ever reported.

use super::util::{stmt_reads, stmt_writes, walk};
use crate::ast::{AssignTarget, Expr, Program, Stmt};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CopyPropagation {
    pub line: u32,
    pub variable: String,
    pub replacement: String,
}

/// `Y = X` where `X` is a bare scalar reference — general expressions are
/// constant-folding/CSE's job, not copy propagation's.
fn as_copy(stmt: &Stmt) -> Option<(String, String)> {
    if let Stmt::Let {
        target: AssignTarget::Scalar(y),
        value: Expr::Var { name: x, .. },
        ..
    } = stmt
    {
        let y = y.canonical();
        let x = x.canonical();
        if y != x {
            return Some((y, x));
        }
    }
    None
}

fn has_control_transfer(stmt: &Stmt) -> bool {
    matches!(
        stmt,
        Stmt::Goto { .. }
            | Stmt::Gosub { .. }
            | Stmt::OnGotoGosub { .. }
            | Stmt::ReturnStmt { .. }
            | Stmt::ResumeStmt { .. }
    )
}

/// Runs copy-propagation detection across the whole program in source order
/// (spec §4.E). Every later read of `Y` is reported as replaceable by `X`
/// until `X`, `Y` is rewritten, or control may transfer elsewhere.
pub fn run(program: &Program) -> Vec<CopyPropagation> {
    let flat = walk(program);
    let mut out = Vec::new();

    for (i, (_, stmt)) in flat.iter().enumerate() {
        let Some((y, x)) = as_copy(stmt) else { continue };
        for (line_num, later) in flat.iter().skip(i + 1) {
            if stmt_writes(later).iter().any(|w| *w == x || *w == y) {
                break; // either side rewritten: the propagation window closes
            }
            if has_control_transfer(later) {
                break; // conservative: don't chase branches
            }
            if stmt_reads(later).contains(&y) {
                out.push(CopyPropagation {
                    line: *line_num,
                    variable: y.clone(),
                    replacement: x.clone(),
                });
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
    fn copy_then_use_is_reported() {
        let program = parse_program("10 Y = X\n20 PRINT Y\n", KeywordCase::Preserve).unwrap();
        let findings = run(&program);
        assert!(findings.iter().any(|f| f.line == 20 && f.variable == "Y" && f.replacement == "X"));
    }

    #[test]
    fn rewrite_of_source_closes_the_window() {
        let program = parse_program("10 Y = X\n20 X = 5\n30 PRINT Y\n", KeywordCase::Preserve).unwrap();
        let findings = run(&program);
        assert!(!findings.iter().any(|f| f.line == 30));
    }

    #[test]
    fn rewrite_of_copy_closes_the_window() {
        let program = parse_program("10 Y = X\n20 Y = 7\n30 PRINT Y\n", KeywordCase::Preserve).unwrap();
        let findings = run(&program);
        assert!(!findings.iter().any(|f| f.line == 30));
    }

    #[test]
    fn branch_between_copy_and_use_suppresses_the_finding() {
        let program = parse_program(
            "10 Y = X\n20 GOSUB 100\n30 PRINT Y\n40 END\n100 RETURN\n",
            KeywordCase::Preserve,
        )
        .unwrap();
        let findings = run(&program);
        assert!(!findings.iter().any(|f| f.line == 30));
    }
}
