//! Semantic analyzer / optimizer (spec §4.E): a multi-pass, fixed-point
//! analysis engine over a parsed [`Program`](crate::ast::Program). Pure
//! function of the AST — never mutates it. The interpreter may consult
//! the report but is not required to.

mod alias;
mod arraybounds;
mod constfold;
mod copyprop;
mod cse;
mod deadcode;
mod loops;
mod purity;
mod reachability;
mod reassoc;
mod typeinfer;
pub(crate) mod util;

pub use alias::AliasClass;
pub use arraybounds::ArrayBoundsViolation;
pub use constfold::ConstantFold;
pub use copyprop::CopyPropagation;
pub use cse::CseGroup;
pub use deadcode::DeadWrite;
pub use loops::LoopInfo;
pub use reachability::{BranchFold, Reachability};
pub use reassoc::Reassociation;
pub use typeinfer::{TypePromotion, TypeRebinding};

use crate::ast::Program;
use crate::config::AnalyzerConfig;

/// One finding from a semantic error check (spec §4.E "Failure semantics").
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SemanticError {
    pub line: u32,
    pub message: String,
}

/// The complete set of findings from one analyzer run.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct AnalysisReport {
    pub constant_folds: Vec<ConstantFold>,
    pub cse_groups: Vec<CseGroup>,
    pub unreachable_lines: Vec<u32>,
    pub dead_writes: Vec<DeadWrite>,
    pub copy_propagations: Vec<CopyPropagation>,
    pub loops: Vec<LoopInfo>,
    pub type_rebindings: Vec<TypeRebinding>,
    pub type_promotions: Vec<TypePromotion>,
    pub reassociations: Vec<Reassociation>,
    pub alias_classes: Vec<AliasClass>,
    pub array_bounds_violations: Vec<ArrayBoundsViolation>,
    pub branch_folds: Vec<BranchFold>,
    pub errors: Vec<SemanticError>,
    /// Number of fixed-point iterations performed before convergence (or
    /// the iteration cap, whichever came first).
    pub iterations: u32,
    pub converged: bool,
}

/// A cheap signature of a report, used to detect fixed-point convergence
/// without comparing the full structures each iteration.
#[allow(clippy::type_complexity)]
fn signature(
    report: &AnalysisReport,
) -> (usize, usize, usize, usize, usize, usize, usize, usize, usize, usize, usize, usize) {
    (
        report.constant_folds.len(),
        report.cse_groups.len(),
        report.unreachable_lines.len(),
        report.dead_writes.len(),
        report.copy_propagations.len(),
        report.loops.len(),
        report.type_rebindings.len(),
        report.type_promotions.len(),
        report.reassociations.len(),
        report.alias_classes.len(),
        report.array_bounds_violations.len(),
        report.branch_folds.len(),
    )
}

/// Run every analysis in a fixed order, repeating until two consecutive
/// passes produce the same signature or `config.max_iterations` is hit
/// (spec §4.E "Outer loop: iterative fixed-point").
pub fn analyze(program: &Program, config: &AnalyzerConfig) -> AnalysisReport {
    let purity_of = purity::classify;
    let reach = reachability::run(program, purity_of);
    let branch_folds: Vec<BranchFold> = reachability::fold_if_conditions(program, purity_of)
        .into_values()
        .collect();

    let mut report = AnalysisReport::default();
    let mut prev_sig = None;

    for iteration in 1..=config.max_iterations {
        let mut next = AnalysisReport::default();
        next.unreachable_lines = reach.unreachable.clone();
        next.branch_folds = branch_folds.clone();

        let folds = constfold::run(program, purity_of);
        let cse = cse::run(program, &folds, purity_of);
        let dead = deadcode::run(program);
        let copies = copyprop::run(program);
        let loop_info = loops::run(program, purity_of);
        let (rebindings, promotions) = typeinfer::run(program, config);
        let reassoc = reassoc::run(program);
        let aliases = alias::run(program);
        let bounds = arraybounds::run(program);

        next.constant_folds = folds;
        next.cse_groups = cse;
        next.dead_writes = dead;
        next.copy_propagations = copies;
        next.loops = loop_info;
        next.type_rebindings = rebindings;
        next.type_promotions = promotions;
        next.reassociations = reassoc;
        next.alias_classes = aliases;
        next.array_bounds_violations = bounds;
        next.errors = reachability::semantic_errors(program, &reach);
        next.iterations = iteration;

        let sig = signature(&next);
        report = next;
        if Some(sig) == prev_sig {
            report.converged = true;
            break;
        }
        prev_sig = Some(sig);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::parser::parse_program;
    use crate::token::KeywordCase;

    #[test]
    fn converges_on_simple_program() {
        let program = parse_program("10 LET A = 1 + 2\n20 PRINT A\n", KeywordCase::Preserve).unwrap();
        let report = analyze(&program, &AnalyzerConfig::default());
        assert!(report.converged);
        assert!(report.iterations <= AnalyzerConfig::default().max_iterations);
    }

    #[test]
    fn flags_unreachable_line_after_unconditional_goto() {
        let program = parse_program("10 GOTO 30\n20 PRINT 1\n30 END\n", KeywordCase::Preserve).unwrap();
        let report = analyze(&program, &AnalyzerConfig::default());
        assert!(report.unreachable_lines.contains(&20));
    }
}
