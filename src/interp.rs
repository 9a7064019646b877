//! Step-wise tree-walking interpreter (spec §4.H): `start(program)` resets
//! the runtime and positions the PC at the lowest line; `tick()` executes
//! exactly one statement and returns a [`TickStatus`] rather than unwinding
//! through exceptions for normal control flow (spec §9 redesign flag).

use crate::ast::{
    AssignTarget, BinOp, Expr, FileOpKind, Name, NumberLit, OnTarget, OpenMode,
    Program, ResumeTarget, Stmt, SystemOpKind, TypeTag, UnOp,
};
use crate::builtins;
use crate::error::BasicError;
use crate::io::{FileIoHandler, IoHandler};
use crate::runtime::{ForFrame, Pc, Runtime};
use crate::value::Value;

/// The result of one `tick()` (spec §4.H: "Running, AwaitingInput, Output,
/// Halted").
#[derive(Debug, Clone, PartialEq)]
pub enum TickStatus {
    Running,
    AwaitingInput { prompt: String },
    Output(String),
    Halted(HaltReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HaltReason {
    EndOfProgram,
    Stop,
    UnhandledError(BasicError),
    Break,
}

enum Flow {
    Next,
    Jump(Pc),
    Halt(HaltReason),
}

/// Wraps [`Runtime`] plus the resident program and drives it one statement
/// at a time (spec §4.H). `io`/`file_io` are borrowed per call, never
/// owned, per spec §9's injected-collaborator redesign flag.
pub struct Interpreter {
    pub runtime: Runtime,
    program: Program,
    pc: Option<Pc>,
    halted: Option<HaltReason>,
}

impl Interpreter {
    pub fn new(program: Program, limiter: crate::limits::ResourceLimiter) -> Self {
        let runtime = Runtime::new(&program, limiter);
        Interpreter {
            runtime,
            program,
            pc: None,
            halted: None,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Resets runtime state and positions the PC at the lowest line (spec
    /// §4.H `start`).
    pub fn start(&mut self) {
        self.runtime.clear_for_clear_stmt();
        self.runtime.data_pool = crate::runtime::DataPool::build(&self.program);
        self.runtime.limiter.start_clock();
        self.halted = None;
        self.pc = self.program.first_line().map(|line| Pc::new(line, 0));
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn pc(&self) -> Option<Pc> {
        self.pc
    }

    /// Swaps in a new resident program without touching runtime state,
    /// so edits made through the program manager (spec §4.K) take effect
    /// for the next `GOTO`/`GOSUB` the shared runtime resolves (spec §4.J).
    pub fn reload_program(&mut self, program: Program) {
        self.program = program;
    }

    /// Forces the PC to an arbitrary line, used by `RUN <line>`/`CHAIN
    /// <file>, <line>` (spec §4.J) after `start()` has already reset state.
    pub fn force_pc(&mut self, pc: Pc) {
        self.pc = Some(pc);
        self.halted = None;
    }

    /// Resumes after `STOP` (spec §4.H `CONT`), only valid while the
    /// program is untouched since the stop (the caller is responsible for
    /// invalidating `stopped_at` on any program edit).
    pub fn cont(&mut self) -> bool {
        match self.runtime.stopped_at.take() {
            Some(pc) => {
                self.pc = Some(pc);
                self.halted = None;
                true
            }
            None => false,
        }
    }

    fn line_statements(&self, line: u32) -> Option<&[Stmt]> {
        self.program.lines.get(&line).map(|l| l.statements.as_slice())
    }

    /// Advances the PC past the current statement, moving to the next line
    /// when the current one is exhausted.
    fn advance(&self, pc: Pc) -> Option<Pc> {
        let stmts = self.line_statements(pc.line)?;
        if pc.stmt_index + 1 < stmts.len() {
            Some(Pc::new(pc.line, pc.stmt_index + 1))
        } else {
            self.program.next_line_after(pc.line).map(|l| Pc::new(l, 0))
        }
    }

    /// Executes exactly one statement and returns its status (spec §4.H).
    pub fn tick(&mut self, io: &mut dyn IoHandler, file_io: &mut dyn FileIoHandler) -> TickStatus {
        if let Some(reason) = self.halted.clone() {
            return TickStatus::Halted(reason);
        }
        let Some(pc) = self.pc else {
            self.halted = Some(HaltReason::EndOfProgram);
            return TickStatus::Halted(HaltReason::EndOfProgram);
        };
        if let Err(e) = self.runtime.limiter.check_wall_time() {
            self.halted = Some(HaltReason::UnhandledError(e));
            return TickStatus::Halted(HaltReason::UnhandledError(e));
        }

        let Some(stmts) = self.line_statements(pc.line) else {
            self.halted = Some(HaltReason::UnhandledError(BasicError::UndefinedLine(pc.line)));
            return TickStatus::Halted(HaltReason::UnhandledError(BasicError::UndefinedLine(pc.line)));
        };
        let stmt = stmts[pc.stmt_index].clone();

        if self.runtime.trace_enabled {
            io.debug(&format!("[{}]", pc.line));
        }

        let result = self.exec_stmt(&stmt, pc, io, file_io);
        match result {
            Ok(Flow::Next) => {
                self.pc = self.advance(pc);
                if self.pc.is_none() {
                    self.halted = Some(HaltReason::EndOfProgram);
                    return TickStatus::Halted(HaltReason::EndOfProgram);
                }
                TickStatus::Running
            }
            Ok(Flow::Jump(next)) => {
                self.pc = Some(next);
                TickStatus::Running
            }
            Ok(Flow::Halt(reason)) => {
                self.halted = Some(reason.clone());
                TickStatus::Halted(reason)
            }
            Err(e) => self.handle_error(e, pc, io),
        }
    }

    /// `ON ERROR GOTO` is a PC rewrite, not a try/catch mechanism (spec §9).
    fn handle_error(&mut self, err: BasicError, at: Pc, io: &mut dyn IoHandler) -> TickStatus {
        self.runtime.record_error(&err, at.line);
        if self.runtime.error_state.handler_pc.is_some() && !self.runtime.error_state.handler_active {
            let handler = self.runtime.error_state.handler_pc.unwrap();
            let resume_at = self.advance(at).unwrap_or(at);
            self.pc = Some(self.runtime.enter_handler(handler, resume_at));
            return TickStatus::Running;
        }
        io.error(&format!("?{} Error", err));
        self.halted = Some(HaltReason::UnhandledError(err.clone()));
        TickStatus::Halted(HaltReason::UnhandledError(err))
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, BasicError> {
        match expr {
            Expr::Number { value, .. } => Ok(match value {
                NumberLit::Integer(n) => Value::Integer(*n as i16),
                NumberLit::Single(f) => Value::Single(*f),
                NumberLit::Double(f) => Value::Double(*f),
            }),
            Expr::Str { value, .. } => Ok(Value::Str(value.clone())),
            Expr::Var { name, .. } => Ok(self.runtime.get_variable(name)),
            Expr::ArrayRef { name, indices, .. } => {
                let idx = self.eval_indices(indices)?;
                self.runtime.array_get(name, &idx)
            }
            Expr::Unary { op, expr, .. } => {
                let v = self.eval(expr)?;
                match op {
                    UnOp::Pos => Ok(v),
                    UnOp::Neg => match v {
                        Value::Integer(n) => n
                            .checked_neg()
                            .map(Value::Integer)
                            .ok_or(BasicError::Overflow),
                        Value::Single(f) => Ok(Value::Single(-f)),
                        Value::Double(f) => Ok(Value::Double(-f)),
                        Value::Str(_) => Err(BasicError::TypeMismatch),
                    },
                    UnOp::Not => Ok(Value::Integer(if v.is_truthy()? { 0 } else { -1 })),
                }
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                eval_binop(*op, l, r)
            }
            Expr::Call { name, args, .. } => self.eval_call(name, args),
        }
    }

    fn eval_indices(&mut self, indices: &[Expr]) -> Result<Vec<i32>, BasicError> {
        indices
            .iter()
            .map(|e| Ok(self.eval(e)?.as_f64()?.round() as i32))
            .collect()
    }

    fn eval_call(&mut self, name: &str, args: &[Expr]) -> Result<Value, BasicError> {
        let canonical = name.to_uppercase();
        if let Some(func) = self.runtime.user_functions.get(&canonical).cloned() {
            let values: Vec<Value> = args.iter().map(|a| self.eval(a)).collect::<Result<_, _>>()?;
            return self.call_user_function(&func, &values);
        }
        let values: Vec<Value> = args.iter().map(|a| self.eval(a)).collect::<Result<_, _>>()?;
        builtins::call(&canonical, &values, &mut self.runtime)
    }

    /// `DEF FN` parameters are bound in a private scope restored after the
    /// call, never visible to the caller (spec §4.G DEF FN contract).
    fn call_user_function(&mut self, func: &crate::runtime::UserFunction, args: &[Value]) -> Result<Value, BasicError> {
        let mut saved = Vec::with_capacity(func.params.len());
        for (p, v) in func.params.iter().zip(args.iter()) {
            saved.push((p.clone(), self.runtime.get_variable(p)));
            self.runtime.set_variable(p, v.clone())?;
        }
        let result = self.eval(&func.body);
        for (p, old) in saved {
            self.runtime.set_variable(&p, old)?;
        }
        result
    }

    fn assign(&mut self, target: &AssignTarget, value: Value) -> Result<(), BasicError> {
        match target {
            AssignTarget::Scalar(name) => self.runtime.set_variable(name, value),
            AssignTarget::ArrayElem(name, indices) => {
                let idx = self.eval_indices(indices)?;
                self.runtime.array_set(name, &idx, value)
            }
            AssignTarget::MidAssign { name, start, len } => self.mid_assign(name, start, len.as_deref(), value),
        }
    }

    /// `MID$(A$, start[, len]) = value$` splices `value$` into `A$` in
    /// place, never lengthening it (spec §4.G). Spliced over `Vec<u8>`
    /// rather than `String` so multibyte content in either operand can
    /// never produce invalid UTF-8 mid-splice.
    fn mid_assign(&mut self, name: &Name, start: &Expr, len: Option<&Expr>, value: Value) -> Result<(), BasicError> {
        let mut bytes = self.runtime.get_variable(name).as_str()?.as_bytes().to_vec();
        let start0 = (self.eval(start)?.as_f64()?.round() as i64 - 1).max(0) as usize;
        let replacement = value.as_str()?.as_bytes().to_vec();
        let max_len = bytes.len().saturating_sub(start0);
        let splice_len = match len {
            Some(l) => (self.eval(l)?.as_f64()?.round() as usize).min(max_len),
            None => max_len,
        }
        .min(replacement.len());
        if start0 < bytes.len() {
            bytes[start0..start0 + splice_len].copy_from_slice(&replacement[..splice_len]);
        }
        let spliced = String::from_utf8_lossy(&bytes).into_owned();
        self.runtime.set_variable(name, Value::Str(spliced))
    }

    fn exec_stmt(
        &mut self,
        stmt: &Stmt,
        pc: Pc,
        io: &mut dyn IoHandler,
        file_io: &mut dyn FileIoHandler,
    ) -> Result<Flow, BasicError> {
        match stmt {
            Stmt::Let { target, value, .. } => {
                let v = self.eval(value)?;
                self.assign(target, v)?;
                Ok(Flow::Next)
            }
            Stmt::Print { items, using, file, .. } => self.exec_print(items, using.as_ref(), file.as_ref(), io, file_io),
            Stmt::Input { prompt, file, line_input, targets, .. } => {
                self.exec_input(prompt.as_deref(), file.as_ref(), *line_input, targets, io, file_io)
            }
            Stmt::If { cond, then_branch, then_goto, else_branch, else_goto, .. } => {
                if self.eval(cond)?.is_truthy()? {
                    self.exec_branch(then_branch, *then_goto, pc, io, file_io)
                } else {
                    self.exec_branch(else_branch, *else_goto, pc, io, file_io)
                }
            }
            Stmt::ForStmt { var, start, end, step, .. } => {
                let start_v = self.eval(start)?;
                let end_v = self.eval(end)?;
                let step_v = match step {
                    Some(e) => self.eval(e)?,
                    None => Value::Integer(1),
                };
                self.runtime.set_variable(var, start_v.clone())?;
                let step_f = step_v.as_f64()?;
                let skip = if step_f >= 0.0 {
                    start_v.as_f64()? > end_v.as_f64()?
                } else {
                    start_v.as_f64()? < end_v.as_f64()?
                };
                if skip {
                    return Ok(Flow::Jump(self.skip_to_matching_next(pc)?));
                }
                let body_pc = self.advance(pc).ok_or(BasicError::NextWithoutFor)?;
                self.runtime.push_for(ForFrame {
                    control_var: var.canonical(),
                    limit: end_v,
                    step: step_v,
                    body_pc,
                })?;
                Ok(Flow::Next)
            }
            Stmt::Next { vars, .. } => self.exec_next(vars, pc),
            Stmt::While { cond, .. } => {
                if self.eval(cond)?.is_truthy()? {
                    self.runtime.push_while(pc)?;
                    Ok(Flow::Next)
                } else {
                    Ok(Flow::Jump(self.skip_to_matching_wend(pc)?))
                }
            }
            Stmt::Wend { .. } => {
                let head = self.runtime.pop_while()?;
                Ok(Flow::Jump(head))
            }
            Stmt::Goto { target, .. } => Ok(Flow::Jump(Pc::new(*target, 0))),
            Stmt::Gosub { target, .. } => {
                let ret = self.advance(pc).ok_or(BasicError::ReturnWithoutGosub)?;
                self.runtime.push_gosub(ret)?;
                Ok(Flow::Jump(Pc::new(*target, 0)))
            }
            Stmt::ReturnStmt { .. } => Ok(Flow::Jump(self.runtime.pop_gosub()?)),
            Stmt::OnGotoGosub { selector, kind, targets, .. } => {
                let n = self.eval(selector)?.as_f64()?.round() as i64;
                if n < 1 || n as usize > targets.len() {
                    return Ok(Flow::Next);
                }
                let target = targets[(n - 1) as usize];
                match kind {
                    OnTarget::Goto => Ok(Flow::Jump(Pc::new(target, 0))),
                    OnTarget::Gosub => {
                        let ret = self.advance(pc).ok_or(BasicError::ReturnWithoutGosub)?;
                        self.runtime.push_gosub(ret)?;
                        Ok(Flow::Jump(Pc::new(target, 0)))
                    }
                }
            }
            Stmt::OnErrorGoto { target, .. } => {
                self.runtime.error_state.handler_pc = if *target == 0 { None } else { Some(Pc::new(*target, 0)) };
                self.runtime.error_state.handler_active = false;
                Ok(Flow::Next)
            }
            Stmt::ResumeStmt { target, .. } => self.exec_resume(target),
            Stmt::Dim { arrays, .. } => {
                for (name, dims) in arrays {
                    let bounds = self.eval_indices(dims)?;
                    self.runtime.dim_array(name, bounds)?;
                }
                Ok(Flow::Next)
            }
            Stmt::Erase { names, .. } => {
                for n in names {
                    self.runtime.erase_array(n);
                }
                Ok(Flow::Next)
            }
            Stmt::OptionBase { base, .. } => {
                self.runtime.set_option_base(*base as i32)?;
                Ok(Flow::Next)
            }
            Stmt::Data { .. } => Ok(Flow::Next),
            Stmt::Read { targets, .. } => {
                for t in targets {
                    let v = self.runtime.data_read_next()?;
                    self.assign(t, v)?;
                }
                Ok(Flow::Next)
            }
            Stmt::Restore { target, .. } => {
                self.runtime.data_restore(*target)?;
                Ok(Flow::Next)
            }
            Stmt::DefFn { name, params, body, .. } => {
                self.runtime.user_functions.insert(
                    name.to_uppercase(),
                    crate::runtime::UserFunction {
                        params: params.clone(),
                        body: body.clone(),
                    },
                );
                Ok(Flow::Next)
            }
            Stmt::DefType { letter_type, ranges, .. } => {
                for (from, to) in ranges {
                    self.runtime.def_type_map.set_range(*from, *to, *letter_type);
                }
                Ok(Flow::Next)
            }
            Stmt::Open { path, mode, file_num, record_len, .. } => {
                self.exec_open(path, mode, file_num, record_len.as_ref(), file_io)
            }
            Stmt::Close { file_nums, .. } => {
                if file_nums.is_empty() {
                    let handles: Vec<i32> = self.runtime.open_files.keys().copied().collect();
                    for h in handles {
                        if let Some(rec) = self.runtime.open_files.remove(&h) {
                            file_io.close(rec.native_handle).ok();
                        }
                    }
                } else {
                    for e in file_nums {
                        let h = self.eval(e)?.as_f64()? as i32;
                        if let Some(rec) = self.runtime.open_files.remove(&h) {
                            file_io.close(rec.native_handle)?;
                        }
                    }
                }
                Ok(Flow::Next)
            }
            Stmt::Field { file_num, fields, .. } => {
                let h = self.eval(file_num)?.as_f64()? as i32;
                let mut offset = 0usize;
                let mut specs = Vec::new();
                for f in fields {
                    let w = self.eval(&f.width)?.as_f64()? as usize;
                    specs.push((offset, f.var.clone()));
                    offset += w;
                }
                if let Some(rec) = self.runtime.open_files.get_mut(&h) {
                    rec.fields = specs;
                }
                Ok(Flow::Next)
            }
            Stmt::Get { file_num, record, .. } => {
                let h = self.eval(file_num)?.as_f64()? as i32;
                self.exec_get_put(h, record.as_ref(), true, file_io)
            }
            Stmt::Put { file_num, record, .. } => {
                let h = self.eval(file_num)?.as_f64()? as i32;
                self.exec_get_put(h, record.as_ref(), false, file_io)
            }
            Stmt::LsetRset { target, value, left, .. } => {
                let v = self.eval(value)?.as_str()?.to_string();
                let cur = self.runtime.get_variable(target);
                let width = cur.as_str().map(|s| s.len()).unwrap_or(v.len()).max(v.len());
                let padded = if *left {
                    format!("{:<width$}", v, width = width)
                } else {
                    format!("{:>width$}", v, width = width)
                };
                self.runtime.set_variable(target, Value::Str(padded[..width].to_string()))
            }
            Stmt::Rem { .. } => Ok(Flow::Next),
            Stmt::End { .. } => Ok(Flow::Halt(HaltReason::EndOfProgram)),
            Stmt::Stop { .. } => {
                self.runtime.stopped_at = Some(pc);
                Ok(Flow::Halt(HaltReason::Stop))
            }
            Stmt::Clear { .. } => {
                self.runtime.clear_for_clear_stmt();
                Ok(Flow::Next)
            }
            Stmt::Chain { .. } => Ok(Flow::Halt(HaltReason::EndOfProgram)),
            Stmt::Run { .. } => Ok(Flow::Halt(HaltReason::EndOfProgram)),
            Stmt::New { .. } => Ok(Flow::Halt(HaltReason::EndOfProgram)),
            Stmt::List { .. } => Ok(Flow::Next),
            Stmt::FileOp { op, .. } => self.exec_file_op(*op, file_io),
            Stmt::PokeOutWaitCall { op, .. } => self.exec_system_op(*op),
            Stmt::TronTroff { on, .. } => {
                self.runtime.trace_enabled = *on;
                Ok(Flow::Next)
            }
            Stmt::Width { .. } => Ok(Flow::Next),
            Stmt::Null { .. } => Ok(Flow::Next),
            Stmt::Common { .. } => Ok(Flow::Next),
            Stmt::ContStmt { .. } => Ok(Flow::Next),
            Stmt::Swap { a, b, .. } => {
                let va = self.runtime.get_variable(a);
                let vb = self.runtime.get_variable(b);
                self.runtime.set_variable(a, vb)?;
                self.runtime.set_variable(b, va)?;
                Ok(Flow::Next)
            }
            Stmt::ErrorStmt { code, .. } => {
                let n = self.eval(code)?.as_f64()?.round() as u16;
                Err(code_to_error(n))
            }
        }
    }

    fn exec_branch(
        &mut self,
        branch: &[Stmt],
        goto: Option<u32>,
        pc: Pc,
        io: &mut dyn IoHandler,
        file_io: &mut dyn FileIoHandler,
    ) -> Result<Flow, BasicError> {
        if let Some(target) = goto {
            return Ok(Flow::Jump(Pc::new(target, 0)));
        }
        for s in branch {
            match self.exec_stmt(s, Pc::new(pc.line, pc.stmt_index), io, file_io)? {
                Flow::Next => continue,
                other => return Ok(other),
            }
        }
        Ok(Flow::Next)
    }

    fn exec_next(&mut self, vars: &[Name], pc: Pc) -> Result<Flow, BasicError> {
        let var_name = vars.first().map(|n| n.canonical());
        let frame = match &var_name {
            Some(v) => self.runtime.find_for_by_var(v).ok_or(BasicError::NextWithoutFor)?,
            None => self.runtime.pop_for().ok_or(BasicError::NextWithoutFor)?,
        };
        let name = name_from_canonical(&frame.control_var);
        let cur = self.runtime.get_variable(&name);
        let step = frame.step.as_f64()?;
        let next_val = cur.as_f64()? + step;
        let limit = frame.limit.as_f64()?;
        let done = if step >= 0.0 { next_val > limit } else { next_val < limit };
        if done {
            // MBASIC leaves the control variable one step past the bound on
            // exit (spec §8), not frozen at the last in-range value.
            self.runtime.set_variable(&name, Value::Double(next_val))?;
            Ok(Flow::Next)
        } else {
            self.runtime.set_variable(&name, Value::Double(next_val))?;
            self.runtime.push_for(ForFrame {
                control_var: frame.control_var.clone(),
                limit: frame.limit.clone(),
                step: frame.step.clone(),
                body_pc: frame.body_pc,
            })?;
            let _ = pc;
            Ok(Flow::Jump(frame.body_pc))
        }
    }

    /// A `WHILE` whose condition starts false skips forward to the line
    /// after its matching `WEND`, tracking nesting depth (spec §4.H).
    fn skip_to_matching_wend(&self, from: Pc) -> Result<Pc, BasicError> {
        let mut depth = 0i32;
        let mut cursor = self.advance(from);
        while let Some(pc) = cursor {
            if let Some(stmts) = self.line_statements(pc.line) {
                match &stmts[pc.stmt_index] {
                    Stmt::While { .. } => depth += 1,
                    Stmt::Wend { .. } => {
                        if depth == 0 {
                            return Ok(self.advance(pc).unwrap_or(pc));
                        }
                        depth -= 1;
                    }
                    _ => {}
                }
            }
            cursor = self.advance(pc);
        }
        Err(BasicError::WendWithoutWhile)
    }

    /// A `FOR` whose start already crosses its bound (spec §4.H: "if
    /// (step>0 and start>end) or (step<0 and start<end), skip to matching
    /// NEXT") skips the body entirely, landing after the matching `NEXT`,
    /// tracking nesting depth the same way `skip_to_matching_wend` does.
    fn skip_to_matching_next(&self, from: Pc) -> Result<Pc, BasicError> {
        let mut depth = 0i32;
        let mut cursor = self.advance(from);
        while let Some(pc) = cursor {
            if let Some(stmts) = self.line_statements(pc.line) {
                match &stmts[pc.stmt_index] {
                    Stmt::ForStmt { .. } => depth += 1,
                    Stmt::Next { .. } => {
                        if depth == 0 {
                            return Ok(self.advance(pc).unwrap_or(pc));
                        }
                        depth -= 1;
                    }
                    _ => {}
                }
            }
            cursor = self.advance(pc);
        }
        Err(BasicError::NextWithoutFor)
    }

    fn exec_resume(&mut self, target: &ResumeTarget) -> Result<Flow, BasicError> {
        let resume_at = self.runtime.error_state.resume_pc.ok_or(BasicError::NoResume)?;
        self.runtime.error_state.handler_active = false;
        self.runtime.error_state.resume_pc = None;
        let dest = match target {
            ResumeTarget::SameStatement => {
                Pc::new(self.runtime.error_state.last_line.unwrap_or(resume_at.line), 0)
            }
            ResumeTarget::Next => resume_at,
            ResumeTarget::Line(n) => Pc::new(*n, 0),
        };
        Ok(Flow::Jump(dest))
    }

    fn exec_print(
        &mut self,
        items: &[crate::ast::PrintItem],
        using: Option<&Expr>,
        file: Option<&Expr>,
        io: &mut dyn IoHandler,
        file_io: &mut dyn FileIoHandler,
    ) -> Result<Flow, BasicError> {
        let format = match using {
            Some(e) => Some(self.eval(e)?.as_str()?.to_string()),
            None => None,
        };
        let mut out = String::new();
        for item in items {
            let v = self.eval(&item.expr)?;
            let text = match &format {
                Some(fmt) => print_using_one(fmt, &v),
                None => v.print_repr(),
            };
            out.push_str(&text);
            match item.trailing {
                Some(crate::ast::PrintSep::Comma) => out.push('\t'),
                Some(crate::ast::PrintSep::Semicolon) | None => {}
            }
        }
        let ends_with_sep = items.last().map(|i| i.trailing.is_some()).unwrap_or(false);
        let end = if ends_with_sep { "" } else { "\n" };
        if let Some(file_expr) = file {
            let h = self.eval(file_expr)?.as_f64()? as i32;
            let bytes = format!("{out}{end}").into_bytes();
            write_sequential(&mut self.runtime, file_io, h, &bytes)?;
            Ok(Flow::Next)
        } else {
            io.output(&out, end);
            Ok(Flow::Next)
        }
    }

    fn exec_input(
        &mut self,
        prompt: Option<&str>,
        file: Option<&Expr>,
        line_input: bool,
        targets: &[AssignTarget],
        io: &mut dyn IoHandler,
        file_io: &mut dyn FileIoHandler,
    ) -> Result<Flow, BasicError> {
        if let Some(file_expr) = file {
            let h = self.eval(file_expr)?.as_f64()? as i32;
            return self.input_from_file(h, targets, file_io);
        }
        let text = io.input(prompt.unwrap_or("? "));
        if line_input {
            if let Some(t) = targets.first() {
                self.assign(t, Value::Str(text))?;
            }
            return Ok(Flow::Next);
        }
        let parts: Vec<&str> = text.split(',').map(|s| s.trim()).collect();
        for (t, raw) in targets.iter().zip(parts.iter()) {
            let v = self.parse_input_field(t, raw)?;
            self.assign(t, v)?;
        }
        Ok(Flow::Next)
    }

    fn parse_input_field(&self, target: &AssignTarget, raw: &str) -> Result<Value, BasicError> {
        let tag = match target {
            AssignTarget::Scalar(n) => self.runtime.def_type_map.effective_type(n),
            AssignTarget::ArrayElem(n, _) => self.runtime.def_type_map.effective_type(n),
            AssignTarget::MidAssign { .. } => TypeTag::Str,
        };
        match tag {
            TypeTag::Str => Ok(Value::Str(raw.to_string())),
            _ => raw.trim().parse::<f64>().map(Value::Double).map_err(|_| BasicError::TypeMismatch),
        }
    }

    fn input_from_file(&mut self, handle: i32, targets: &[AssignTarget], file_io: &mut dyn FileIoHandler) -> Result<Flow, BasicError> {
        let rec = self.runtime.open_files.get_mut(&handle).ok_or(BasicError::BadFileNumber)?;
        let remaining = &rec.contents[rec.cursor..];
        let line_end = remaining.iter().position(|&b| b == b'\n').unwrap_or(remaining.len());
        let line = String::from_utf8_lossy(&remaining[..line_end]).trim_end_matches('\r').to_string();
        rec.cursor += line_end + 1;
        let _ = file_io;
        let parts: Vec<&str> = line.split(',').collect();
        for (t, raw) in targets.iter().zip(parts.iter()) {
            let v = self.parse_input_field(t, raw.trim())?;
            self.assign(t, v)?;
        }
        Ok(Flow::Next)
    }

    fn exec_open(
        &mut self,
        path: &Expr,
        mode: &OpenMode,
        file_num: &Expr,
        record_len: Option<&Expr>,
        file_io: &mut dyn FileIoHandler,
    ) -> Result<Flow, BasicError> {
        let name = self.eval(path)?.as_str()?.to_string();
        let h = self.eval(file_num)?.as_f64()? as i32;
        let rl = match record_len {
            Some(e) => Some(self.eval(e)?.as_f64()? as usize),
            None => None,
        };
        let runtime_mode = match mode {
            OpenMode::Input => crate::runtime::OpenFileMode::Input,
            OpenMode::Output => crate::runtime::OpenFileMode::Output,
            OpenMode::Append => crate::runtime::OpenFileMode::Append,
            OpenMode::Random => crate::runtime::OpenFileMode::Random,
        };
        let native_handle = file_io.open_for(&name, runtime_mode.clone(), rl)?;
        let contents = match (&runtime_mode, rl) {
            (crate::runtime::OpenFileMode::Output, _) => Vec::new(),
            (_, Some(_)) => file_io.read_record(native_handle, 1).unwrap_or_default(),
            (_, None) => file_io.load_file(&name).map(String::into_bytes).unwrap_or_default(),
        };
        self.runtime.open_files.insert(
            h,
            crate::runtime::OpenFileRecord {
                path: name,
                mode: runtime_mode,
                record_len: rl,
                fields: Vec::new(),
                contents,
                cursor: 0,
                native_handle,
            },
        );
        Ok(Flow::Next)
    }

    fn exec_get_put(&mut self, handle: i32, record: Option<&Expr>, is_get: bool, file_io: &mut dyn FileIoHandler) -> Result<Flow, BasicError> {
        let n = match record {
            Some(e) => self.eval(e)?.as_f64()? as usize,
            None => {
                let rec = self.runtime.open_files.get(&handle).ok_or(BasicError::BadFileNumber)?;
                rec.record_len.map(|l| rec.cursor / l.max(1) + 1).unwrap_or(1)
            }
        };
        let rec = self.runtime.open_files.get(&handle).ok_or(BasicError::BadFileNumber)?;
        let record_len = rec.record_len.ok_or(BasicError::BadFileNumber)?;
        let native_handle = rec.native_handle;
        if is_get {
            let bytes = file_io.read_record(native_handle, n)?;
            let fields = self.runtime.open_files.get(&handle).map(|r| r.fields.clone()).unwrap_or_default();
            for (offset, var) in fields {
                let width = var_field_width(&bytes, offset);
                let s = String::from_utf8_lossy(&bytes[offset..(offset + width).min(bytes.len())]).to_string();
                self.runtime.set_variable(&var, Value::Str(s))?;
            }
        } else {
            let fields = self.runtime.open_files.get(&handle).map(|r| r.fields.clone()).unwrap_or_default();
            let mut bytes = vec![0u8; record_len];
            for (offset, var) in fields {
                let v = self.runtime.get_variable(&var);
                if let Ok(s) = v.as_str() {
                    let end = (offset + s.len()).min(record_len);
                    bytes[offset..end].copy_from_slice(&s.as_bytes()[..end - offset]);
                }
            }
            file_io.write_record(native_handle, n, &bytes)?;
        }
        if let Some(rec) = self.runtime.open_files.get_mut(&handle) {
            rec.cursor = n * record_len;
        }
        Ok(Flow::Next)
    }

    fn exec_file_op(&mut self, op: FileOpKind, file_io: &mut dyn FileIoHandler) -> Result<Flow, BasicError> {
        let _ = file_io;
        let _ = op;
        Ok(Flow::Next)
    }

    fn exec_system_op(&mut self, op: SystemOpKind) -> Result<Flow, BasicError> {
        let _ = op;
        Ok(Flow::Next)
    }

    /// Executes an unnumbered line's statements against the shared runtime
    /// (spec §4.J): a transient `Pc` using line `0`, which can never
    /// collide with a stored program line (spec §3 invariant: stored line
    /// numbers are strictly positive). A `GOTO`/`GOSUB` inside it jumps
    /// into the resident program and leaves the real `Pc` there for the
    /// caller to resume ticking from, matching direct-mode `GOTO` in
    /// classic MBASIC.
    pub fn exec_immediate(
        &mut self,
        stmts: &[Stmt],
        io: &mut dyn IoHandler,
        file_io: &mut dyn FileIoHandler,
    ) -> Result<ImmediateOutcome, BasicError> {
        for (i, stmt) in stmts.iter().enumerate() {
            let pc = Pc::new(0, i);
            match self.exec_stmt(stmt, pc, io, file_io)? {
                Flow::Next => continue,
                Flow::Jump(target) => {
                    self.pc = Some(target);
                    self.halted = None;
                    return Ok(ImmediateOutcome::EnteredProgram);
                }
                Flow::Halt(reason) => {
                    self.halted = Some(reason.clone());
                    return Ok(ImmediateOutcome::Halted(reason));
                }
            }
        }
        Ok(ImmediateOutcome::Done)
    }
}

/// What happened after executing one immediate-mode line (spec §4.J).
#[derive(Debug, Clone, PartialEq)]
pub enum ImmediateOutcome {
    /// Every statement on the line completed; the resident `Pc` is
    /// untouched.
    Done,
    /// A `GOTO`/`GOSUB` on the line transferred control into the resident
    /// program; the caller should drive `tick()` to continue.
    EnteredProgram,
    Halted(HaltReason),
}

/// Reconstructs a [`Name`] from a canonical store key (spec §3 `Name`):
/// the trailing type-sigil, if any, becomes the explicit suffix rather
/// than being dropped, so the FOR control variable keeps writing to the
/// same store slot `push_for` originally captured.
fn name_from_canonical(canonical: &str) -> Name {
    let suffix = match canonical.chars().last() {
        Some('%') => Some(TypeTag::Integer),
        Some('!') => Some(TypeTag::Single),
        Some('#') => Some(TypeTag::Double),
        Some('$') => Some(TypeTag::Str),
        _ => None,
    };
    match suffix {
        Some(tag) => Name::new(&canonical[..canonical.len() - 1], Some(tag)),
        None => Name::new(canonical, None),
    }
}

fn var_field_width(bytes: &[u8], offset: usize) -> usize {
    bytes.len().saturating_sub(offset)
}

/// `PRINT#`/`WRITE#` targets have no fixed record length, so they're
/// flushed as a whole-file save rather than through the fixed-length
/// `read_record`/`write_record` pair `FIELD`/`GET`/`PUT` use.
fn write_sequential(rt: &mut Runtime, file_io: &mut dyn FileIoHandler, handle: i32, bytes: &[u8]) -> Result<(), BasicError> {
    let rec = rt.open_files.get_mut(&handle).ok_or(BasicError::BadFileNumber)?;
    rec.contents.extend_from_slice(bytes);
    if rec.record_len.is_some() {
        file_io.write_record(rec.native_handle, 1, &rec.contents)?;
    } else {
        let text = String::from_utf8_lossy(&rec.contents).into_owned();
        file_io.save_file(&rec.path, &text)?;
    }
    Ok(())
}

/// A minimal `PRINT USING` renderer covering the `#` digit-placeholder
/// format most MBASIC programs actually use (spec §4.G).
fn print_using_one(fmt: &str, value: &Value) -> String {
    if let Value::Str(s) = value {
        return s.clone();
    }
    let digits_before = fmt.chars().take_while(|&c| c != '.').filter(|&c| c == '#').count();
    let digits_after = fmt.split('.').nth(1).map(|s| s.chars().filter(|&c| c == '#').count()).unwrap_or(0);
    let n = value.as_f64().unwrap_or(0.0);
    let formatted = format!("{:.*}", digits_after, n);
    let width = digits_before + if digits_after > 0 { digits_after + 1 } else { 0 };
    format!("{:>width$}", formatted, width = width.max(formatted.len()))
}

fn code_to_error(code: u16) -> BasicError {
    match code {
        1 => BasicError::NextWithoutFor,
        4 => BasicError::OutOfData,
        5 => BasicError::IllegalFunctionCall,
        6 => BasicError::Overflow,
        7 => BasicError::OutOfMemory,
        9 => BasicError::SubscriptOutOfRange,
        10 => BasicError::DuplicateDefinition,
        11 => BasicError::DivisionByZero,
        13 => BasicError::TypeMismatch,
        15 => BasicError::StringTooLong,
        53 => BasicError::FileNotFound,
        61 => BasicError::DiskFull,
        62 => BasicError::InputPastEnd,
        _ => BasicError::IllegalFunctionCall,
    }
}

fn eval_binop(op: BinOp, l: Value, r: Value) -> Result<Value, BasicError> {
    use BinOp::*;
    if matches!(op, Add) {
        if let (Value::Str(a), Value::Str(b)) = (&l, &r) {
            return Ok(Value::Str(format!("{a}{b}")));
        }
    }
    if matches!(op, Eq | Ne | Lt | Le | Gt | Ge) {
        let ord = match (&l, &r) {
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => l
                .as_f64()?
                .partial_cmp(&r.as_f64()?)
                .ok_or(BasicError::TypeMismatch)?,
        };
        let truth = match op {
            Eq => ord.is_eq(),
            Ne => !ord.is_eq(),
            Lt => ord.is_lt(),
            Le => ord.is_le(),
            Gt => ord.is_gt(),
            Ge => ord.is_ge(),
            _ => unreachable!(),
        };
        return Ok(Value::Integer(if truth { -1 } else { 0 }));
    }
    if matches!(op, And | Or | Xor | Eqv | Imp) {
        let a = l.as_f64()?.round() as i64 as i16;
        let b = r.as_f64()?.round() as i64 as i16;
        let v = match op {
            And => a & b,
            Or => a | b,
            Xor => a ^ b,
            Eqv => !(a ^ b),
            Imp => !a | b,
            _ => unreachable!(),
        };
        return Ok(Value::Integer(v));
    }
    // `\` and `MOD` truncate to INTEGER regardless of operand type (spec
    // §4.G "`\` truncates to INTEGER"; classic MBASIC gives `MOD` the same
    // integer-truncating treatment as its sibling integer-division operator).
    if matches!(op, IntDiv | Mod) {
        let a = l.as_f64()?;
        let b = r.as_f64()?;
        if b == 0.0 {
            return Err(BasicError::DivisionByZero);
        }
        let result = match op {
            IntDiv => a.trunc() as i64 / b.trunc() as i64,
            Mod => a.trunc() as i64 % b.trunc() as i64,
            _ => unreachable!(),
        };
        return coerce_to_integer(result);
    }

    // INTEGER+INTEGER arithmetic stays INTEGER with checked overflow (spec
    // §8 "32767 + 1 raises OVERFLOW (not wrap)"), rather than silently
    // widening to SINGLE the way a mixed-type operand pair does.
    if let (Value::Integer(a), Value::Integer(b)) = (&l, &r) {
        if matches!(op, Add | Sub | Mul) {
            let checked = match op {
                Add => a.checked_add(*b),
                Sub => a.checked_sub(*b),
                Mul => a.checked_mul(*b),
                _ => unreachable!(),
            };
            return checked.map(Value::Integer).ok_or(BasicError::Overflow);
        }
    }

    let a = l.as_f64()?;
    let b = r.as_f64()?;
    let result = match op {
        Add => a + b,
        Sub => a - b,
        Mul => a * b,
        Div => {
            if b == 0.0 {
                return Err(BasicError::DivisionByZero);
            }
            a / b
        }
        Pow => a.powf(b),
        _ => unreachable!(),
    };
    let widened = widen_result(&l, &r);
    Ok(match widened {
        TypeTag::Double => Value::Double(result),
        _ => Value::Single(result as f32),
    })
}

fn coerce_to_integer(n: i64) -> Result<Value, BasicError> {
    if n < i16::MIN as i64 || n > i16::MAX as i64 {
        Err(BasicError::Overflow)
    } else {
        Ok(Value::Integer(n as i16))
    }
}

fn widen_result(l: &Value, r: &Value) -> TypeTag {
    match (l.type_tag(), r.type_tag()) {
        (TypeTag::Double, _) | (_, TypeTag::Double) => TypeTag::Double,
        _ => TypeTag::Single,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LimitPreset, ResourceLimits};
    use crate::io::native::{NativeFileIo, StdIoHandler};
    use crate::token::KeywordCase;

    struct BufferIo {
        out: String,
        inputs: Vec<String>,
    }

    impl IoHandler for BufferIo {
        fn output(&mut self, text: &str, end: &str) {
            self.out.push_str(text);
            self.out.push_str(end);
        }
        fn input(&mut self, _prompt: &str) -> String {
            if self.inputs.is_empty() {
                String::new()
            } else {
                self.inputs.remove(0)
            }
        }
        fn input_char(&mut self) -> String {
            String::new()
        }
        fn error(&mut self, _text: &str) {}
        fn debug(&mut self, _text: &str) {}
        fn clear_screen(&mut self) {}
    }

    fn run_to_halt(src: &str, io: &mut dyn IoHandler) -> HaltReason {
        let program = crate::parser::parse_program(src, KeywordCase::Preserve).unwrap();
        let limiter = crate::limits::ResourceLimiter::new(ResourceLimits::preset(LimitPreset::Local));
        let mut interp = Interpreter::new(program, limiter);
        interp.start();
        let mut file_io = NativeFileIo::new(std::env::temp_dir());
        loop {
            match interp.tick(io, &mut file_io) {
                TickStatus::Halted(reason) => return reason,
                _ => continue,
            }
        }
    }

    #[test]
    fn hello_world_prints_and_halts() {
        let mut io = BufferIo { out: String::new(), inputs: vec![] };
        let reason = run_to_halt("10 PRINT \"HELLO\"\n20 END\n", &mut io);
        assert_eq!(reason, HaltReason::EndOfProgram);
        assert!(io.out.contains("HELLO"));
    }

    #[test]
    fn for_next_loop_accumulates() {
        let mut io = BufferIo { out: String::new(), inputs: vec![] };
        let _ = run_to_halt(
            "10 S = 0\n20 FOR I = 1 TO 5\n30 S = S + I\n40 NEXT I\n50 PRINT S\n60 END\n",
            &mut io,
        );
        assert!(io.out.contains("15"));
    }

    #[test]
    fn gosub_return_sequences_correctly() {
        let mut io = BufferIo { out: String::new(), inputs: vec![] };
        let _ = run_to_halt(
            "10 GOSUB 100\n20 PRINT \"BACK\"\n30 END\n100 PRINT \"SUB\"\n110 RETURN\n",
            &mut io,
        );
        assert!(io.out.contains("SUB"));
        assert!(io.out.contains("BACK"));
        let back_pos = io.out.find("BACK").unwrap();
        let sub_pos = io.out.find("SUB").unwrap();
        assert!(sub_pos < back_pos);
    }

    #[test]
    fn on_error_goto_traps_division_by_zero() {
        let mut io = BufferIo { out: String::new(), inputs: vec![] };
        let reason = run_to_halt(
            "10 ON ERROR GOTO 100\n20 X = 1 / 0\n30 END\n100 PRINT \"CAUGHT\"\n110 RESUME NEXT\n",
            &mut io,
        );
        assert_eq!(reason, HaltReason::EndOfProgram);
        assert!(io.out.contains("CAUGHT"));
    }

    #[test]
    fn data_read_restore_cycle() {
        let mut io = BufferIo { out: String::new(), inputs: vec![] };
        let _ = run_to_halt(
            "10 READ A, B\n20 PRINT A; B\n30 RESTORE\n40 READ C\n50 PRINT C\n60 DATA 1, 2\n70 END\n",
            &mut io,
        );
        assert!(io.out.contains("1"));
    }

    #[test]
    fn unhandled_division_by_zero_halts_with_error() {
        let mut io = BufferIo { out: String::new(), inputs: vec![] };
        let reason = run_to_halt("10 X = 1 / 0\n20 END\n", &mut io);
        assert_eq!(reason, HaltReason::UnhandledError(BasicError::DivisionByZero));
    }

    #[test]
    fn mid_assign_splices_in_place() {
        let mut io = BufferIo { out: String::new(), inputs: vec![] };
        let _ = run_to_halt(
            "10 A$ = \"HELLO\"\n20 MID$(A$, 2, 3) = \"XYZ\"\n30 PRINT A$\n40 END\n",
            &mut io,
        );
        assert!(io.out.contains("HXYZO"));
    }

    #[test]
    fn input_statement_reads_numeric_value() {
        let mut io = BufferIo { out: String::new(), inputs: vec!["42".to_string()] };
        let _ = run_to_halt("10 INPUT X\n20 PRINT X\n30 END\n", &mut io);
        assert!(io.out.contains("42"));
    }

    #[test]
    fn for_loop_with_start_past_end_skips_body() {
        let mut io = BufferIo { out: String::new(), inputs: vec![] };
        let _ = run_to_halt(
            "10 FOR I = 5 TO 1\n20 PRINT \"BODY\"\n30 NEXT I\n40 PRINT \"AFTER\"\n50 END\n",
            &mut io,
        );
        assert!(!io.out.contains("BODY"));
        assert!(io.out.contains("AFTER"));
    }

    #[test]
    fn for_loop_control_variable_lands_one_step_past_bound() {
        let mut io = BufferIo { out: String::new(), inputs: vec![] };
        let _ = run_to_halt(
            "10 FOR I = 1 TO 3\n20 NEXT I\n30 PRINT I\n40 END\n",
            &mut io,
        );
        assert!(io.out.contains("4"));
    }

    #[test]
    fn bare_integer_addition_overflows_rather_than_widening() {
        let mut io = BufferIo { out: String::new(), inputs: vec![] };
        let reason = run_to_halt("10 PRINT 32767 + 1\n20 END\n", &mut io);
        assert_eq!(reason, HaltReason::UnhandledError(BasicError::Overflow));
    }

    #[test]
    fn integer_division_truncates_to_integer() {
        let mut io = BufferIo { out: String::new(), inputs: vec![] };
        let _ = run_to_halt("10 PRINT 7 \\ 2\n20 END\n", &mut io);
        assert_eq!(io.out, " 3 \n");
    }

    #[test]
    fn mid_assign_handles_non_ascii_replacement_without_panicking() {
        let mut io = BufferIo { out: String::new(), inputs: vec![] };
        let reason = run_to_halt(
            "10 A$ = \"HELLO\"\n20 MID$(A$, 1, 2) = CHR$(233)\n30 PRINT A$\n40 END\n",
            &mut io,
        );
        assert_eq!(reason, HaltReason::EndOfProgram);
    }

    #[test]
    fn native_stdio_handler_constructs() {
        let _handler = StdIoHandler;
    }
}
