//! Common subexpression elimination (spec §4.E): pairs of syntactically
//! equal, pure expressions are grouped unless something between their
//! occurrences could change a variable either one reads.

use super::constfold::ConstantFold;
use super::util::{canonical_expr_text, free_vars, stmt_writes, walk};
use crate::ast::{Expr, Program, Stmt};
use crate::builtins::Purity;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CseGroup {
    pub expr_text: String,
    pub lines: Vec<u32>,
}

fn expr_is_pure(expr: &Expr, purity_of: fn(&str) -> Purity) -> bool {
    match expr {
        Expr::Number { .. } | Expr::Str { .. } | Expr::Var { .. } => true,
        Expr::ArrayRef { indices, .. } => indices.iter().all(|i| expr_is_pure(i, purity_of)),
        Expr::Call { name, args, .. } => {
            purity_of(&name.to_uppercase()) == Purity::Pure
                && args.iter().all(|a| expr_is_pure(a, purity_of))
        }
        Expr::Unary { expr, .. } => expr_is_pure(expr, purity_of),
        Expr::Binary { lhs, rhs, .. } => expr_is_pure(lhs, purity_of) && expr_is_pure(rhs, purity_of),
    }
}

/// Expressions worth tracking as CSE candidates: anything with at least one
/// operator or call (a bare literal or variable reference is not a "common
/// subexpression" worth reporting).
fn is_compound(expr: &Expr) -> bool {
    matches!(expr, Expr::Binary { .. } | Expr::Call { .. } | Expr::Unary { .. })
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

/// Variables a `GOSUB` to `target` may mutate, transitively (spec §4.E
/// "Subroutine summary"): the closure of every write reachable by walking
/// forward from `target` until a `RETURN`, including through nested GOSUBs.
fn subroutine_summary(program: &Program, target: u32, cache: &mut HashMap<u32, HashSet<String>>) -> HashSet<String> {
    if let Some(cached) = cache.get(&target) {
        return cached.clone();
    }
    cache.insert(target, HashSet::new()); // break cycles
    let mut modified = HashSet::new();
    let mut line_opt = Some(target);
    'lines: while let Some(line_num) = line_opt {
        let Some(line) = program.lines.get(&line_num) else { break };
        for stmt in &line.statements {
            modified.extend(stmt_writes(stmt));
            if let Stmt::Gosub { target: nested, .. } = stmt {
                modified.extend(subroutine_summary(program, *nested, cache));
            }
            if matches!(stmt, Stmt::ReturnStmt { .. }) {
                break 'lines;
            }
        }
        line_opt = program.next_line_after(line_num);
    }
    cache.insert(target, modified.clone());
    modified
}

/// Runs CSE across the whole program in source order (spec §4.E). Folded
/// constants are excluded: an expression that already const-folds isn't
/// worth reporting as a CSE opportunity.
pub fn run(program: &Program, folds: &[ConstantFold], purity_of: fn(&str) -> Purity) -> Vec<CseGroup> {
    let folded_texts: HashSet<&str> = folds.iter().map(|f| f.expr_text.as_str()).collect();
    let mut pending: HashMap<String, Vec<u32>> = HashMap::new();
    let mut groups: Vec<CseGroup> = Vec::new();
    let mut summary_cache = HashMap::new();

    for (line_num, stmt) in walk(program) {
        let writes = stmt_writes(stmt);
        if let Stmt::Gosub { target, .. } = stmt {
            let mutated = subroutine_summary(program, *target, &mut summary_cache);
            invalidate(&mut pending, &mut groups, &mutated);
        }
        invalidate(&mut pending, &mut groups, &writes.into_iter().collect());

        for expr in stmt_exprs(stmt) {
            record_candidates(expr, line_num, &mut pending, purity_of, &folded_texts);
        }
    }
    flush_all(&mut pending, &mut groups);
    groups.retain(|g| g.lines.len() > 1);
    groups
}

fn record_candidates<'a>(
    expr: &'a Expr,
    line_num: u32,
    pending: &mut HashMap<String, Vec<u32>>,
    purity_of: fn(&str) -> Purity,
    folded_texts: &HashSet<&str>,
) {
    if is_compound(expr) && expr_is_pure(expr, purity_of) {
        let text = canonical_expr_text(expr);
        if !folded_texts.contains(text.as_str()) {
            pending.entry(text).or_default().push(line_num);
        }
    }
    match expr {
        Expr::Binary { lhs, rhs, .. } => {
            record_candidates(lhs, line_num, pending, purity_of, folded_texts);
            record_candidates(rhs, line_num, pending, purity_of, folded_texts);
        }
        Expr::Unary { expr, .. } => record_candidates(expr, line_num, pending, purity_of, folded_texts),
        Expr::Call { args, .. } => {
            for a in args {
                record_candidates(a, line_num, pending, purity_of, folded_texts);
            }
        }
        Expr::ArrayRef { indices, .. } => {
            for i in indices {
                record_candidates(i, line_num, pending, purity_of, folded_texts);
            }
        }
        _ => {}
    }
}

/// Drops (and, if it had ≥2 occurrences, finalizes into `groups`) every
/// pending candidate whose free variables intersect `written`.
fn invalidate(pending: &mut HashMap<String, Vec<u32>>, groups: &mut Vec<CseGroup>, written: &HashSet<String>) {
    if written.is_empty() {
        return;
    }
    let keys: Vec<String> = pending.keys().cloned().collect();
    for key in keys {
        if expr_text_mentions_any(&key, written) {
            if let Some(lines) = pending.remove(&key) {
                groups.push(CseGroup { expr_text: key, lines });
            }
        }
    }
}

/// `canonical_expr_text` embeds canonical variable names verbatim, so a
/// substring test identifies whether any written name appears in the text.
fn expr_text_mentions_any(text: &str, written: &HashSet<String>) -> bool {
    written.iter().any(|v| text_contains_name(text, v))
}

fn text_contains_name(text: &str, name: &str) -> bool {
    text.match_indices(name).any(|(i, _)| {
        let before_ok = i == 0 || !text.as_bytes()[i - 1].is_ascii_alphanumeric();
        let after = i + name.len();
        let after_ok = after >= text.len() || !text.as_bytes()[after].is_ascii_alphanumeric();
        before_ok && after_ok
    })
}

fn flush_all(pending: &mut HashMap<String, Vec<u32>>, groups: &mut Vec<CseGroup>) {
    for (expr_text, lines) in pending.drain() {
        groups.push(CseGroup { expr_text, lines });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::purity;
    use crate::parser::parse_program;
    use crate::token::KeywordCase;

    #[test]
    fn gosub_mutation_invalidates_cse_across_the_call() {
        let src = "10 A = 1 : B = 2\n20 X = A + B\n30 GOSUB 100\n40 Y = A + B\n50 END\n100 B = B + 10 : RETURN\n";
        let program = parse_program(src, KeywordCase::Preserve).unwrap();
        let folds = super::super::constfold::run(&program, purity);
        let groups = run(&program, &folds, purity);
        assert!(!groups.iter().any(|g| g.lines.contains(&20) && g.lines.contains(&40)));
    }

    #[test]
    fn unrelated_repeated_expression_is_grouped() {
        let src = "10 X = A + B\n20 PRINT A + B\n";
        let program = parse_program(src, KeywordCase::Preserve).unwrap();
        let folds = super::super::constfold::run(&program, purity);
        let groups = run(&program, &folds, purity);
        assert!(groups.iter().any(|g| g.lines == vec![10, 20]));
    }
}
