//! Immediate executor (spec §4.J): the REPL's line router. A line that
//! opens with a decimal integer goes to the [`ProgramManager`]; everything
//! else either names a REPL-only command (`LIST`, `RUN`, `NEW`, `LOAD`,
//! `SAVE`, `MERGE`, `DELETE`, `RENUM`, `CONT`, `FILES`, `KILL`, `NAME`) or
//! is parsed as a single-line statement list and executed against the
//! shared runtime with no PC motion.

use crate::ast::{Expr, FileOpKind, Stmt};
use crate::config::InterpreterConfig;
use crate::interp::{HaltReason, ImmediateOutcome, Interpreter, TickStatus};
use crate::io::{FileIoHandler, IoHandler};
use crate::limits::ResourceLimiter;
use crate::program::ProgramManager;

/// Outcome of handling one REPL input line, reported back to the host loop.
pub enum LineOutcome {
    Ok,
    /// `SYSTEM`/`QUIT` — the host loop should stop reading input.
    Quit,
}

pub struct ImmediateExecutor {
    pub program_mgr: ProgramManager,
    pub interp: Interpreter,
    config: InterpreterConfig,
}

impl ImmediateExecutor {
    pub fn new(config: InterpreterConfig) -> Self {
        let interp = Interpreter::new(
            crate::ast::Program::new(),
            ResourceLimiter::new(config.limits),
        );
        ImmediateExecutor {
            program_mgr: ProgramManager::new(config.keyword_case),
            interp,
            config,
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Handles one line of REPL input (spec §4.J).
    pub fn handle_line(
        &mut self,
        text: &str,
        io: &mut dyn IoHandler,
        file_io: &mut dyn FileIoHandler,
    ) -> LineOutcome {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return LineOutcome::Ok;
        }

        if trimmed.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            if let Err(e) = self.program_mgr.add_or_replace_line(trimmed) {
                io.error(&e.to_string());
            } else {
                self.interp.reload_program(self.program_mgr.program().clone());
                self.interp.runtime.stopped_at = None;
            }
            return LineOutcome::Ok;
        }

        if let Some(outcome) = self.try_text_command(trimmed, io) {
            return outcome;
        }

        self.run_immediate_statements(trimmed, io, file_io);
        LineOutcome::Ok
    }

    /// Commands whose syntax (a line-number range, an optional increment
    /// pair) isn't a BASIC expression/statement the parser recognizes
    /// (spec §4.J, §4.K `renumber`).
    fn try_text_command(&mut self, line: &str, io: &mut dyn IoHandler) -> Option<LineOutcome> {
        let mut words = line.splitn(2, char::is_whitespace);
        let head = words.next().unwrap_or("").to_uppercase();
        let rest = words.next().unwrap_or("").trim();

        match head.as_str() {
            "HELP" | "?HELP" => {
                io.output(crate::config::HELP_TEXT, "\n");
                Some(LineOutcome::Ok)
            }
            "SYSTEM" | "QUIT" | "EXIT" => Some(LineOutcome::Quit),
            "DELETE" => {
                if let Some((a, b)) = parse_range(rest) {
                    self.program_mgr.delete_range(a, b);
                } else if let Ok(n) = rest.parse::<u32>() {
                    self.program_mgr.delete_line(n);
                } else {
                    io.error("Illegal line range");
                }
                self.interp.reload_program(self.program_mgr.program().clone());
                Some(LineOutcome::Ok)
            }
            "RENUM" | "RENUMBER" => {
                let (start, incr) = parse_renum_args(rest);
                if let Err(e) = self.program_mgr.renumber(start, incr) {
                    io.error(&e.to_string());
                } else {
                    self.interp.reload_program(self.program_mgr.program().clone());
                }
                Some(LineOutcome::Ok)
            }
            // Line-number auto-increment during entry is a terminal-echo
            // concern the driver provides; the core has nothing to do.
            "AUTO" => Some(LineOutcome::Ok),
            "EDIT" => Some(LineOutcome::Ok),
            _ => None,
        }
    }

    fn run_immediate_statements(&mut self, line: &str, io: &mut dyn IoHandler, file_io: &mut dyn FileIoHandler) {
        let synthetic = format!("0 {line}\n");
        let parsed = match crate::parser::parse_program(&synthetic, self.config.keyword_case) {
            Ok(p) => p,
            Err(e) => {
                io.error(&e.to_string());
                return;
            }
        };
        let Some(stmts) = parsed.lines.get(&0).map(|l| l.statements.clone()) else {
            return;
        };

        let mut i = 0;
        while i < stmts.len() {
            if self.try_repl_only_stmt(&stmts[i], io, file_io) {
                i += 1;
                continue;
            }
            match self.interp.exec_immediate(&stmts[i..i + 1], io, file_io) {
                Ok(ImmediateOutcome::Done) => {}
                Ok(ImmediateOutcome::EnteredProgram) => {
                    self.drive_to_suspension(io, file_io);
                }
                Ok(ImmediateOutcome::Halted(reason)) => self.report_halt(reason, io),
                Err(e) => io.error(&format!("?{e} Error")),
            }
            i += 1;
        }
    }

    /// Recognizes the statement forms that name REPL-only behavior (spec
    /// §4.J) even though the parser accepts them as ordinary statements.
    /// Returns `true` if handled (consuming exactly that one statement).
    fn try_repl_only_stmt(&mut self, stmt: &Stmt, io: &mut dyn IoHandler, file_io: &mut dyn FileIoHandler) -> bool {
        match stmt {
            Stmt::Run { line, .. } => {
                self.do_run(*line, io, file_io);
                true
            }
            Stmt::New { .. } => {
                self.program_mgr.clear();
                self.interp.reload_program(self.program_mgr.program().clone());
                self.interp.runtime.clear_for_clear_stmt();
                self.interp.runtime.stopped_at = None;
                true
            }
            Stmt::List { range, .. } => {
                io.output(&self.program_mgr.list_range(*range), "");
                true
            }
            Stmt::ContStmt { .. } => {
                if self.interp.cont() {
                    self.drive_to_suspension(io, file_io);
                } else {
                    io.error("Can't continue");
                }
                true
            }
            Stmt::FileOp { op, args, .. } => {
                self.do_file_op(*op, args, io, file_io);
                true
            }
            Stmt::Chain { path, line, merge, delete, .. } => {
                self.do_chain(path, *line, *merge, *delete, io, file_io);
                true
            }
            _ => false,
        }
    }

    fn do_run(&mut self, line: Option<u32>, io: &mut dyn IoHandler, file_io: &mut dyn FileIoHandler) {
        self.interp.reload_program(self.program_mgr.program().clone());
        self.interp.start();
        if let Some(n) = line {
            self.interp.force_pc(crate::runtime::Pc::new(n, 0));
        }
        self.drive_to_suspension(io, file_io);
    }

    /// `CHAIN "name"[, line][, ALL][, DELETE a-b]` (spec §4.J): loads a new
    /// program. Plain `CHAIN` clears variables like `RUN`; `MERGE`
    /// additively loads the new text into the existing line map instead of
    /// replacing it wholesale (spec §9 open question, resolved following
    /// the common MBASIC convention).
    fn do_chain(
        &mut self,
        path: &Expr,
        line: Option<u32>,
        merge: bool,
        delete: Option<(u32, u32)>,
        io: &mut dyn IoHandler,
        file_io: &mut dyn FileIoHandler,
    ) {
        let name = match eval_string_literal(path) {
            Some(s) => s,
            None => {
                io.error("Illegal function call");
                return;
            }
        };
        if let Some((a, b)) = delete {
            self.program_mgr.delete_range(a, b);
        }
        let result = if merge {
            self.program_mgr.merge_from_file(file_io, &name)
        } else {
            self.program_mgr.load_from_file(file_io, &name)
        };
        if let Err(e) = result {
            io.error(&e.to_string());
            return;
        }
        self.interp.reload_program(self.program_mgr.program().clone());
        self.interp.start();
        if let Some(n) = line {
            self.interp.force_pc(crate::runtime::Pc::new(n, 0));
        }
        self.drive_to_suspension(io, file_io);
    }

    fn do_file_op(&mut self, op: FileOpKind, args: &[Expr], io: &mut dyn IoHandler, file_io: &mut dyn FileIoHandler) {
        let name = args.first().and_then(eval_string_literal);
        match op {
            FileOpKind::Load => match name {
                Some(n) => match self.program_mgr.load_from_file(file_io, &n) {
                    Ok(()) => self.interp.reload_program(self.program_mgr.program().clone()),
                    Err(e) => io.error(&e.to_string()),
                },
                None => io.error("File name required"),
            },
            FileOpKind::Save => match name {
                Some(n) => {
                    if let Err(e) = self.program_mgr.save_to_file(file_io, &n) {
                        io.error(&e.to_string());
                    }
                }
                None => io.error("File name required"),
            },
            FileOpKind::Merge => match name {
                Some(n) => match self.program_mgr.merge_from_file(file_io, &n) {
                    Ok(()) => self.interp.reload_program(self.program_mgr.program().clone()),
                    Err(e) => io.error(&e.to_string()),
                },
                None => io.error("File name required"),
            },
            FileOpKind::Kill => {
                if let Some(n) = name {
                    if file_io.delete_file(&n).is_err() {
                        io.error("File not found");
                    }
                }
            }
            FileOpKind::Name => {
                if let (Some(old), Some(new)) = (
                    args.first().and_then(eval_string_literal),
                    args.get(1).and_then(eval_string_literal),
                ) {
                    if let Ok(text) = file_io.load_file(&old) {
                        let _ = file_io.save_file(&new, &text);
                        let _ = file_io.delete_file(&old);
                    }
                }
            }
            FileOpKind::Files => {
                let pattern = name.unwrap_or_default();
                match file_io.list_files(&pattern) {
                    Ok(entries) => {
                        for (n, _, _) in entries {
                            io.output(&n, "\n");
                        }
                    }
                    Err(_) => io.error("File not found"),
                }
            }
        }
    }

    /// Ticks the interpreter until it halts. Console I/O currently resolves
    /// synchronously inside each statement (spec §9: input/output
    /// collaborators are called directly, never suspending through
    /// `TickStatus::AwaitingInput`/`Output` — see `DESIGN.md`), so in
    /// practice this only ever returns on `Halted`.
    fn drive_to_suspension(&mut self, io: &mut dyn IoHandler, file_io: &mut dyn FileIoHandler) {
        loop {
            match self.interp.tick(io, file_io) {
                TickStatus::Running | TickStatus::Output(_) | TickStatus::AwaitingInput { .. } => continue,
                TickStatus::Halted(reason) => {
                    self.report_halt(reason, io);
                    return;
                }
            }
        }
    }

    fn report_halt(&mut self, reason: HaltReason, io: &mut dyn IoHandler) {
        match reason {
            HaltReason::EndOfProgram => {}
            HaltReason::Stop | HaltReason::Break => io.output("Break", "\n"),
            HaltReason::UnhandledError(e) => {
                let line = self
                    .interp
                    .pc()
                    .map(|pc| pc.line.to_string())
                    .unwrap_or_else(|| "?".to_string());
                io.error(&format!("?{e} Error in {line}"));
            }
        }
    }
}

fn parse_range(rest: &str) -> Option<(u32, u32)> {
    let (a, b) = rest.split_once('-')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

fn parse_renum_args(rest: &str) -> (u32, u32) {
    if rest.is_empty() {
        return (10, 10);
    }
    let mut parts = rest.split(',');
    let start = parts.next().and_then(|s| s.trim().parse().ok()).unwrap_or(10);
    let incr = parts.next().and_then(|s| s.trim().parse().ok()).unwrap_or(10);
    (start, incr)
}

fn eval_string_literal(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Str { value, .. } => Some(value.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::native::NativeFileIo;

    struct BufferIo {
        out: String,
    }

    impl IoHandler for BufferIo {
        fn output(&mut self, text: &str, end: &str) {
            self.out.push_str(text);
            self.out.push_str(end);
        }
        fn input(&mut self, _prompt: &str) -> String {
            String::new()
        }
        fn input_char(&mut self) -> String {
            String::new()
        }
        fn error(&mut self, text: &str) {
            self.out.push_str(text);
        }
        fn debug(&mut self, _text: &str) {}
        fn clear_screen(&mut self) {}
    }

    fn executor() -> ImmediateExecutor {
        ImmediateExecutor::new(InterpreterConfig::default())
    }

    #[test]
    fn numbered_line_enters_program_manager() {
        let mut exec = executor();
        let mut io = BufferIo { out: String::new() };
        let mut fio = NativeFileIo::new(std::env::temp_dir());
        exec.handle_line("10 PRINT \"HI\"", &mut io, &mut fio);
        assert_eq!(exec.program_mgr.program().lines.len(), 1);
    }

    #[test]
    fn run_executes_resident_program() {
        let mut exec = executor();
        let mut io = BufferIo { out: String::new() };
        let mut fio = NativeFileIo::new(std::env::temp_dir());
        exec.handle_line("10 PRINT \"HI\"", &mut io, &mut fio);
        exec.handle_line("20 END", &mut io, &mut fio);
        exec.handle_line("RUN", &mut io, &mut fio);
        assert!(io.out.contains("HI"));
    }

    #[test]
    fn immediate_print_executes_without_touching_program() {
        let mut exec = executor();
        let mut io = BufferIo { out: String::new() };
        let mut fio = NativeFileIo::new(std::env::temp_dir());
        exec.handle_line("PRINT 1 + 1", &mut io, &mut fio);
        assert!(io.out.contains('2'));
        assert_eq!(exec.program_mgr.program().lines.len(), 0);
    }

    #[test]
    fn new_clears_program_and_variables() {
        let mut exec = executor();
        let mut io = BufferIo { out: String::new() };
        let mut fio = NativeFileIo::new(std::env::temp_dir());
        exec.handle_line("10 PRINT \"HI\"", &mut io, &mut fio);
        exec.handle_line("NEW", &mut io, &mut fio);
        assert_eq!(exec.program_mgr.program().lines.len(), 0);
    }
}
