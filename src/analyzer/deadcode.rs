//! Dead write detection (spec §4.E): a write is dead if no reachable use of
//! the variable precedes the next write or program end. Conservative: the
//! scan follows source order only, not the full control-flow graph.

use super::util::{stmt_reads, stmt_writes, walk};
use crate::ast::{Program, Stmt};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DeadWrite {
    pub line: u32,
    pub variable: String,
}

/// Runs dead-write detection across the whole program in source order
/// (spec §4.E). A write is flagged dead only when every statement that
/// follows it, up to program end, neither reads nor rewrites the variable
/// in a way that could be a use (a branch target is treated conservatively
/// as "might read", so only an unconditional run to end-of-program with no
/// intervening read is ever flagged).
pub fn run(program: &Program) -> Vec<DeadWrite> {
    let flat = walk(program);
    let mut out = Vec::new();

    for (i, (line_num, stmt)) in flat.iter().enumerate() {
        for var in stmt_writes(stmt) {
            let mut used = false;
            for (_, later) in flat.iter().skip(i + 1) {
                if stmt_reads(later).contains(&var) {
                    used = true;
                    break;
                }
                if stmt_writes(later).contains(&var) {
                    break; // rewritten before any use: the earlier write is dead
                }
                if has_control_transfer(later) {
                    used = true; // conservative: control may come back around
                    break;
                }
            }
            if !used {
                out.push(DeadWrite { line: *line_num, variable: var });
            }
        }
    }
    out
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use crate::token::KeywordCase;

    #[test]
    fn write_with_no_later_read_is_dead() {
        let program = parse_program("10 X = 1\n20 Y = 2\n30 PRINT Y\n", KeywordCase::Preserve).unwrap();
        let dead = run(&program);
        assert!(dead.iter().any(|d| d.line == 10 && d.variable == "X"));
        assert!(!dead.iter().any(|d| d.line == 20));
    }

    #[test]
    fn write_immediately_used_is_not_dead() {
        let program = parse_program("10 X = 1\n20 PRINT X\n", KeywordCase::Preserve).unwrap();
        let dead = run(&program);
        assert!(!dead.iter().any(|d| d.line == 10));
    }
}
