//! Array alias analysis (spec §4.E): classifies pairs of subscript
//! expressions into the same array as either provably-distinct,
//! provably-same, or unknown, so later passes know when two array-element
//! references can or cannot overlap.

use super::util::{canonical_expr_text, walk};
use crate::ast::{AssignTarget, Expr, NumberLit, Program, Stmt};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum AliasRelation {
    Same,
    Distinct,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AliasClass {
    pub array: String,
    pub site_a: u32,
    pub site_b: u32,
    pub subscript_a: String,
    pub subscript_b: String,
    pub relation: AliasRelation,
}

/// A reference site: the line it occurs on and the raw subscript list.
struct Site<'a> {
    line: u32,
    indices: &'a [Expr],
}

fn literal_ints(indices: &[Expr]) -> Option<Vec<i64>> {
    indices
        .iter()
        .map(|e| match e {
            Expr::Number { value: NumberLit::Integer(n), .. } => Some(*n),
            Expr::Number { value: NumberLit::Single(f), .. } if f.fract() == 0.0 => Some(*f as i64),
            Expr::Number { value: NumberLit::Double(f), .. } if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        })
        .collect()
}

fn collect_sites(program: &Program) -> HashMap<String, Vec<Site<'_>>> {
    let mut sites: HashMap<String, Vec<Site>> = HashMap::new();
    for (line_num, stmt) in walk(program) {
        if let Stmt::Let { target: AssignTarget::ArrayElem(name, indices), .. } = stmt {
            sites.entry(name.canonical()).or_default().push(Site { line: line_num, indices });
        }
        visit_expr_for_refs(stmt_exprs(stmt), line_num, &mut sites);
    }
    sites
}

fn visit_expr_for_refs<'a>(exprs: Vec<&'a Expr>, line_num: u32, sites: &mut HashMap<String, Vec<Site<'a>>>) {
    for e in exprs {
        walk_expr_for_refs(e, line_num, sites);
    }
}

fn walk_expr_for_refs<'a>(expr: &'a Expr, line_num: u32, sites: &mut HashMap<String, Vec<Site<'a>>>) {
    match expr {
        Expr::ArrayRef { name, indices, .. } => {
            sites.entry(name.canonical()).or_default().push(Site { line: line_num, indices });
            for i in indices {
                walk_expr_for_refs(i, line_num, sites);
            }
        }
        Expr::Unary { expr, .. } => walk_expr_for_refs(expr, line_num, sites),
        Expr::Binary { lhs, rhs, .. } => {
            walk_expr_for_refs(lhs, line_num, sites);
            walk_expr_for_refs(rhs, line_num, sites);
        }
        Expr::Call { args, .. } => {
            for a in args {
                walk_expr_for_refs(a, line_num, sites);
            }
        }
        _ => {}
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

fn classify(a: &Site, b: &Site) -> AliasRelation {
    if a.indices.len() != b.indices.len() {
        return AliasRelation::Unknown;
    }
    if let (Some(ia), Some(ib)) = (literal_ints(a.indices), literal_ints(b.indices)) {
        return if ia == ib { AliasRelation::Same } else { AliasRelation::Distinct };
    }
    let texts_a: Vec<String> = a.indices.iter().map(canonical_expr_text).collect();
    let texts_b: Vec<String> = b.indices.iter().map(canonical_expr_text).collect();
    if texts_a == texts_b {
        return AliasRelation::Same;
    }
    AliasRelation::Unknown
}

/// Runs alias analysis across every array with more than one reference site
/// (spec §4.E). Reports each distinct pair once, `site_a.line <= site_b.line`.
pub fn run(program: &Program) -> Vec<AliasClass> {
    let sites = collect_sites(program);
    let mut out = Vec::new();
    for (array, refs) in sites {
        if refs.len() < 2 {
            continue;
        }
        for i in 0..refs.len() {
            for j in (i + 1)..refs.len() {
                let relation = classify(&refs[i], &refs[j]);
                out.push(AliasClass {
                    array: array.clone(),
                    site_a: refs[i].line,
                    site_b: refs[j].line,
                    subscript_a: refs[i].indices.iter().map(canonical_expr_text).collect::<Vec<_>>().join(","),
                    subscript_b: refs[j].indices.iter().map(canonical_expr_text).collect::<Vec<_>>().join(","),
                    relation,
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
    fn distinct_literal_subscripts_are_provably_distinct() {
        let program = parse_program("10 A(1) = 5\n20 A(2) = 6\n", KeywordCase::Preserve).unwrap();
        let classes = run(&program);
        assert!(classes.iter().any(|c| c.relation == AliasRelation::Distinct));
    }

    #[test]
    fn identical_subscript_expression_is_provably_same() {
        let program = parse_program("10 A(I) = 5\n20 PRINT A(I)\n", KeywordCase::Preserve).unwrap();
        let classes = run(&program);
        assert!(classes.iter().any(|c| c.relation == AliasRelation::Same));
    }

    #[test]
    fn differing_variable_subscripts_are_unknown() {
        let program = parse_program("10 A(I) = 5\n20 A(J) = 6\n", KeywordCase::Preserve).unwrap();
        let classes = run(&program);
        assert!(classes.iter().any(|c| c.relation == AliasRelation::Unknown));
    }
}
