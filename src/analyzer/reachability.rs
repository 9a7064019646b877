//! Reachability analysis (spec §4.E): forward graph from the lowest line,
//! following sequential flow, `GOTO`, `ON ... GOTO/GOSUB`, `IF ... THEN
//! <line>`, and `RESUME`. `END`/`STOP` terminate a path. Branch optimization
//! (spec §4.E) is wired in here: a constant-folded `IF` condition prunes the
//! untaken branch from the graph instead of following both unconditionally.

use super::constfold::{fold_expr, runtime_constants};
use super::util::{gosub_targets, walk};
use super::SemanticError;
use crate::ast::{OnTarget, Program, Stmt};
use crate::builtins::Purity;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reachability {
    pub reachable: HashSet<u32>,
    pub unreachable: Vec<u32>,
}

/// One `IF` whose condition const-folds to a known truth value (spec §4.E
/// "Branch optimization").
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BranchFold {
    pub line: u32,
    /// `true` when the condition is provably always true (the `ELSE`
    /// branch is unreachable); `false` when always false (`THEN` is).
    pub always_then: bool,
}

fn line_has_executable(stmt: &Stmt) -> bool {
    !matches!(stmt, Stmt::Rem { .. })
}

/// Const-folds every `IF` condition in the program, keyed by line number
/// (spec §4.E "Branch optimization": "constant-folded condition
/// predicates"). Nested `IF`s sharing a line (inline `THEN`/`ELSE` bodies)
/// collapse onto the same key — a deliberately conservative approximation
/// matching the rest of this analyzer's per-line granularity.
pub fn fold_if_conditions(program: &Program, purity_of: fn(&str) -> Purity) -> HashMap<u32, BranchFold> {
    let consts = runtime_constants(program);
    let mut out = HashMap::new();
    for (line_num, stmt) in walk(program) {
        if let Stmt::If { cond, .. } = stmt {
            if let Some(v) = fold_expr(cond, &consts, purity_of) {
                if let Ok(f) = v.as_f64() {
                    out.insert(line_num, BranchFold { line: line_num, always_then: f != 0.0 });
                }
            }
        }
    }
    out
}

/// Jump targets reachable from `stmt`, honoring a known-constant `IF`
/// condition by skipping the untaken branch (both its explicit `GOTO`
/// target and any control transfer nested in its inline statement list).
fn targets_of(stmt: &Stmt, line_num: u32, folds: &HashMap<u32, BranchFold>) -> Vec<u32> {
    match stmt {
        Stmt::Goto { target, .. } | Stmt::Gosub { target, .. } => vec![*target],
        Stmt::OnErrorGoto { target, .. } if *target != 0 => vec![*target],
        Stmt::OnGotoGosub { targets, .. } => targets.clone(),
        Stmt::If { then_branch, then_goto, else_branch, else_goto, .. } => {
            let fold = folds.get(&line_num).map(|f| f.always_then);
            let mut out = Vec::new();
            if fold != Some(false) {
                out.extend(then_goto.iter().copied());
                for s in then_branch {
                    out.extend(targets_of(s, line_num, folds));
                }
            }
            if fold != Some(true) {
                out.extend(else_goto.iter().copied());
                for s in else_branch {
                    out.extend(targets_of(s, line_num, folds));
                }
            }
            out
        }
        Stmt::ResumeStmt { target, .. } => match target {
            crate::ast::ResumeTarget::Line(n) => vec![*n],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn is_terminator(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::End { .. } | Stmt::Stop { .. })
}

/// Runs forward reachability from the program's first line (spec §4.E).
pub fn run(program: &Program, purity_of: fn(&str) -> Purity) -> Reachability {
    let mut reachable: HashSet<u32> = HashSet::new();
    let Some(first) = program.first_line() else {
        return Reachability::default();
    };
    let folds = fold_if_conditions(program, purity_of);

    let mut queue = VecDeque::new();
    queue.push_back(first);
    // Subroutines are reachable if any GOSUB targets them, directly or
    // transitively — seed the queue with every named GOSUB target too.
    for t in gosub_targets(program) {
        queue.push_back(t);
    }

    while let Some(line_num) = queue.pop_front() {
        if reachable.contains(&line_num) || !program.lines.contains_key(&line_num) {
            continue;
        }
        reachable.insert(line_num);

        let line = &program.lines[&line_num];
        let mut fell_through = true;
        for stmt in &line.statements {
            for t in targets_of(stmt, line_num, &folds) {
                queue.push_back(t);
            }
            if is_terminator(stmt) {
                fell_through = false;
            }
        }
        if fell_through {
            if let Some(next) = program.next_line_after(line_num) {
                queue.push_back(next);
            }
        }
    }

    let mut unreachable = Vec::new();
    for (&line_num, line) in program.lines.iter() {
        if reachable.contains(&line_num) {
            continue;
        }
        if line.statements.iter().any(line_has_executable) {
            unreachable.push(line_num);
        }
    }
    Reachability { reachable, unreachable }
}

/// Semantic *errors* (as opposed to advisory findings) derivable from the
/// reachability graph (spec §4.E "Failure semantics"). Conservative: a
/// `RETURN` is only flagged when the program contains no `GOSUB` anywhere
/// (a precise "on all paths" proof is beyond this pass's scope).
pub fn semantic_errors(program: &Program, reach: &Reachability) -> Vec<SemanticError> {
    let mut errors = Vec::new();
    let any_gosub = !gosub_targets(program).is_empty();
    if !any_gosub {
        for (line_num, stmt) in walk(program) {
            if matches!(stmt, Stmt::ReturnStmt { .. }) && reach.reachable.contains(&line_num) {
                errors.push(SemanticError {
                    line: line_num,
                    message: "RETURN with no GOSUB anywhere in the program".to_string(),
                });
            }
        }
    }
    for (line_num, stmt) in walk(program) {
        if let Stmt::OnGotoGosub { targets, kind, .. } = stmt {
            for t in targets {
                if !program.lines.contains_key(t) {
                    errors.push(SemanticError {
                        line: line_num,
                        message: format!(
                            "ON ... {} target {} does not exist",
                            if *kind == OnTarget::Goto { "GOTO" } else { "GOSUB" },
                            t
                        ),
                    });
                }
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use crate::token::KeywordCase;

    #[test]
    fn rem_only_line_never_flagged_unreachable() {
        let program = parse_program("10 GOTO 30\n20 REM skipped\n30 END\n", KeywordCase::Preserve).unwrap();
        let r = run(&program, crate::builtins::purity);
        assert!(!r.unreachable.contains(&20));
    }

    #[test]
    fn subroutine_reachable_via_gosub_target() {
        let program = parse_program("10 GOSUB 100\n20 END\n100 PRINT 1 : RETURN\n", KeywordCase::Preserve).unwrap();
        let r = run(&program, crate::builtins::purity);
        assert!(r.reachable.contains(&100));
    }

    #[test]
    fn line_after_unconditional_goto_is_unreachable() {
        let program = parse_program("10 GOTO 30\n20 PRINT 1\n30 END\n", KeywordCase::Preserve).unwrap();
        let r = run(&program, crate::builtins::purity);
        assert!(r.unreachable.contains(&20));
    }

    #[test]
    fn always_false_condition_marks_then_target_unreachable() {
        let program = parse_program(
            "10 DEBUG = 0\n20 IF DEBUG THEN GOTO 100\n30 END\n100 PRINT \"dead\"\n110 END\n",
            KeywordCase::Preserve,
        )
        .unwrap();
        let r = run(&program, crate::builtins::purity);
        assert!(!r.reachable.contains(&100));
        assert!(r.unreachable.contains(&100));
    }

    #[test]
    fn always_true_condition_marks_else_target_unreachable() {
        let program = parse_program(
            "10 DEBUG = 1\n20 IF DEBUG THEN 100 ELSE 200\n100 END\n200 PRINT \"dead\"\n210 END\n",
            KeywordCase::Preserve,
        )
        .unwrap();
        let r = run(&program, crate::builtins::purity);
        assert!(!r.reachable.contains(&200));
        assert!(r.unreachable.contains(&200));
    }
}
