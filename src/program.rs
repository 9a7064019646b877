//! Program manager (spec §4.K): the line map plus operations that mutate
//! it one line at a time, independent of any running interpreter.

use crate::ast::{Line, Program, ResumeTarget, Stmt};
use crate::error::CompileError;
use crate::token::KeywordCase;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgramEditError {
    Compile(CompileError),
    MissingLineNumber,
    RenumberCollision(u32),
}

impl std::fmt::Display for ProgramEditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgramEditError::Compile(e) => write!(f, "{e}"),
            ProgramEditError::MissingLineNumber => write!(f, "line has no leading number"),
            ProgramEditError::RenumberCollision(n) => write!(f, "renumber would collide at line {n}"),
        }
    }
}

impl std::error::Error for ProgramEditError {}

/// Owns the resident program (spec §4.K). Re-lexes/re-parses only the
/// affected line on edit; a bad edit leaves the map untouched.
pub struct ProgramManager {
    program: Program,
    keyword_case: KeywordCase,
}

impl ProgramManager {
    pub fn new(keyword_case: KeywordCase) -> Self {
        ProgramManager {
            program: Program::new(),
            keyword_case,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Parses and stores one line of source text beginning with a line
    /// number. A bare line number with no statements deletes that line.
    pub fn add_or_replace_line(&mut self, text: &str) -> Result<(), ProgramEditError> {
        let trimmed = text.trim_end();
        let number = leading_line_number(trimmed).ok_or(ProgramEditError::MissingLineNumber)?;
        let rest = trimmed[number.to_string().len()..].trim_start();
        if rest.is_empty() {
            self.program.lines.remove(&number);
            return Ok(());
        }

        let full = format!("{number} {rest}\n");
        let parsed = crate::parser::parse_program(&full, self.keyword_case)
            .map_err(ProgramEditError::Compile)?;
        let line = parsed.lines.into_values().next().expect("single line parses to one Line");
        self.program.def_type_map = merge_def_type(&self.program.def_type_map, &parsed.def_type_map);
        self.program.lines.insert(number, line);
        Ok(())
    }

    pub fn delete_line(&mut self, n: u32) {
        self.program.lines.remove(&n);
    }

    pub fn delete_range(&mut self, a: u32, b: u32) {
        self.program.lines.retain(|&n, _| n < a || n > b);
    }

    /// Reassigns line numbers `start, start+increment, ...` in ascending
    /// order and rewrites every intra-program line-number reference (spec
    /// §4.K). `ERL` comparisons are expressions, not references, and are
    /// untouched (spec §9 open question).
    pub fn renumber(&mut self, start: u32, increment: u32) -> Result<(), ProgramEditError> {
        let old_numbers: Vec<u32> = self.program.lines.keys().copied().collect();
        let mut mapping = std::collections::HashMap::new();
        let mut next = start;
        for &old in &old_numbers {
            mapping.insert(old, next);
            next += increment;
        }
        let mut seen = std::collections::HashSet::new();
        for &n in mapping.values() {
            if !seen.insert(n) {
                return Err(ProgramEditError::RenumberCollision(n));
            }
        }

        let mut new_lines = std::collections::BTreeMap::new();
        for (&old, line) in self.program.lines.iter() {
            let new_number = mapping[&old];
            let mut statements = line.statements.clone();
            for stmt in &mut statements {
                rewrite_targets(stmt, &mapping);
            }
            new_lines.insert(new_number, Line { number: new_number, statements });
        }
        self.program.lines = new_lines;
        Ok(())
    }

    pub fn save_to_file(&self, fio: &mut dyn crate::io::FileIoHandler, name: &str) -> Result<(), crate::error::BasicError> {
        fio.save_file(name, &self.to_source_text())
    }

    pub fn load_from_file(&mut self, fio: &dyn crate::io::FileIoHandler, name: &str) -> Result<(), ProgramEditError> {
        let text = fio.load_file(name).map_err(|_| ProgramEditError::MissingLineNumber)?;
        self.load_from_text(&text)
    }

    pub fn merge_from_file(&mut self, fio: &dyn crate::io::FileIoHandler, name: &str) -> Result<(), ProgramEditError> {
        let text = fio.load_file(name).map_err(|_| ProgramEditError::MissingLineNumber)?;
        let parsed = crate::parser::parse_program(&text, self.keyword_case).map_err(ProgramEditError::Compile)?;
        self.program.def_type_map = merge_def_type(&self.program.def_type_map, &parsed.def_type_map);
        for (n, line) in parsed.lines {
            self.program.lines.insert(n, line);
        }
        Ok(())
    }

    pub fn load_from_text(&mut self, text: &str) -> Result<(), ProgramEditError> {
        let parsed = crate::parser::parse_program(text, self.keyword_case).map_err(ProgramEditError::Compile)?;
        self.program = parsed;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.program = Program::new();
    }

    /// Canonical textual form, one stored line per source line, used by
    /// `SAVE`/`LIST` (spec §6 "each stored line begins with its line
    /// number and a space").
    pub fn to_source_text(&self) -> String {
        let mut out = String::new();
        for (n, line) in self.program.lines.iter() {
            out.push_str(&n.to_string());
            out.push(' ');
            out.push_str(&format_line_statements(line));
            out.push('\n');
        }
        out
    }

    pub fn list_range(&self, range: Option<(Option<u32>, Option<u32>)>) -> String {
        let mut out = String::new();
        for (n, line) in self.program.lines.iter() {
            if let Some((lo, hi)) = range {
                if lo.map(|l| *n < l).unwrap_or(false) || hi.map(|h| *n > h).unwrap_or(false) {
                    continue;
                }
            }
            out.push_str(&n.to_string());
            out.push(' ');
            out.push_str(&format_line_statements(line));
            out.push('\n');
        }
        out
    }
}

fn merge_def_type(a: &crate::ast::DefTypeMap, b: &crate::ast::DefTypeMap) -> crate::ast::DefTypeMap {
    // A single-line reparse always carries the whole accumulated map up to
    // and including that line; a later edit's map is authoritative for the
    // letters it actually sets, the earlier map for everything else.
    let mut merged = a.clone();
    for c in b'A'..=b'Z' {
        let ch = c as char;
        merged.set_range(ch, ch, b.type_for(ch));
    }
    merged
}

fn leading_line_number(text: &str) -> Option<u32> {
    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

fn rewrite_targets(stmt: &mut Stmt, mapping: &std::collections::HashMap<u32, u32>) {
    let rewrite = |n: &mut u32| {
        if let Some(&new) = mapping.get(n) {
            *n = new;
        }
    };
    match stmt {
        Stmt::Goto { target, .. } | Stmt::Gosub { target, .. } => rewrite(target),
        Stmt::OnErrorGoto { target, .. } if *target != 0 => rewrite(target),
        Stmt::OnGotoGosub { targets, .. } => {
            for t in targets {
                rewrite(t);
            }
        }
        Stmt::If { then_goto, else_goto, then_branch, else_branch, .. } => {
            if let Some(t) = then_goto {
                rewrite(t);
            }
            if let Some(t) = else_goto {
                rewrite(t);
            }
            for s in then_branch {
                rewrite_targets(s, mapping);
            }
            for s in else_branch {
                rewrite_targets(s, mapping);
            }
        }
        Stmt::ResumeStmt { target: ResumeTarget::Line(n), .. } => rewrite(n),
        Stmt::Restore { target: Some(n), .. } => rewrite(n),
        Stmt::Run { line: Some(n), .. } => rewrite(n),
        Stmt::Chain { line: Some(n), .. } => rewrite(n),
        _ => {}
    }
}

/// Renders one line's statements back to BASIC source text, colon-joined.
/// Not a byte-for-byte echo of the original source — a canonical form
/// sufficient for the `SAVE; NEW; LOAD` round-trip invariant (spec §8).
fn format_line_statements(line: &Line) -> String {
    line.statements
        .iter()
        .map(format_stmt)
        .collect::<Vec<_>>()
        .join(" : ")
}

fn format_stmt(stmt: &Stmt) -> String {
    use crate::analyzer::util::canonical_expr_text as expr_text;
    match stmt {
        Stmt::Let { target, value, .. } => format!("{} = {}", target_text(target), expr_text(value)),
        Stmt::Print { items, .. } => {
            let parts: Vec<String> = items.iter().map(|i| expr_text(&i.expr)).collect();
            format!("PRINT {}", parts.join("; "))
        }
        Stmt::Goto { target, .. } => format!("GOTO {target}"),
        Stmt::Gosub { target, .. } => format!("GOSUB {target}"),
        Stmt::ReturnStmt { .. } => "RETURN".to_string(),
        Stmt::End { .. } => "END".to_string(),
        Stmt::Stop { .. } => "STOP".to_string(),
        Stmt::Rem { .. } => "REM".to_string(),
        other => format!("{other:?}"),
    }
}

fn target_text(target: &crate::ast::AssignTarget) -> String {
    use crate::analyzer::util::canonical_expr_text as expr_text;
    match target {
        crate::ast::AssignTarget::Scalar(n) => n.canonical(),
        crate::ast::AssignTarget::ArrayElem(n, idx) => {
            let parts: Vec<String> = idx.iter().map(expr_text).collect();
            format!("{}({})", n.canonical(), parts.join(","))
        }
        crate::ast::AssignTarget::MidAssign { name, start, len } => match len {
            Some(l) => format!("MID$({}, {}, {})", name.canonical(), expr_text(start), expr_text(l)),
            None => format!("MID$({}, {})", name.canonical(), expr_text(start)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_replace_then_delete_line() {
        let mut pm = ProgramManager::new(KeywordCase::Preserve);
        pm.add_or_replace_line("10 PRINT \"A\"").unwrap();
        assert_eq!(pm.program().lines.len(), 1);
        pm.add_or_replace_line("10 PRINT \"B\"").unwrap();
        assert_eq!(pm.program().lines.len(), 1);
        pm.add_or_replace_line("10").unwrap();
        assert_eq!(pm.program().lines.len(), 0);
    }

    #[test]
    fn bad_edit_leaves_map_untouched() {
        let mut pm = ProgramManager::new(KeywordCase::Preserve);
        pm.add_or_replace_line("10 PRINT \"A\"").unwrap();
        assert!(pm.add_or_replace_line("10 PRINT \"A").is_err());
        assert_eq!(pm.program().lines.len(), 1);
    }

    #[test]
    fn renumber_rewrites_goto_targets() {
        let mut pm = ProgramManager::new(KeywordCase::Preserve);
        pm.add_or_replace_line("10 GOTO 20").unwrap();
        pm.add_or_replace_line("20 END").unwrap();
        pm.renumber(100, 10).unwrap();
        let lines = &pm.program().lines;
        assert!(lines.contains_key(&100));
        assert!(lines.contains_key(&110));
        if let Stmt::Goto { target, .. } = &lines[&100].statements[0] {
            assert_eq!(*target, 110);
        } else {
            panic!("expected GOTO");
        }
    }
}
