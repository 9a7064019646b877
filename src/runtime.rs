// ABOUTME: Runtime state — variables, arrays, stacks, PC, error state, DATA pool (spec §3, §4.F)

use crate::ast::{DataItem, Name, NumberLit, Program, TypeTag};
use crate::error::BasicError;
use crate::limits::ResourceLimiter;
use crate::value::{ArrayValue, Value};
use std::collections::HashMap;

/// `(line_number, stmt_index)` — spec §3 PC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pc {
    pub line: u32,
    pub stmt_index: usize,
}

impl Pc {
    pub fn new(line: u32, stmt_index: usize) -> Self {
        Pc { line, stmt_index }
    }
}

#[derive(Debug, Clone)]
pub struct ForFrame {
    pub control_var: String,
    pub limit: Value,
    pub step: Value,
    pub body_pc: Pc,
}

#[derive(Debug, Clone, Copy)]
pub struct ErrorState {
    pub last_code: Option<u16>,
    pub last_line: Option<u32>,
    pub handler_pc: Option<Pc>,
    pub handler_active: bool,
    pub resume_pc: Option<Pc>,
}

impl Default for ErrorState {
    fn default() -> Self {
        ErrorState {
            last_code: None,
            last_line: None,
            handler_pc: None,
            handler_active: false,
            resume_pc: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserFunction {
    pub params: Vec<Name>,
    pub body: crate::ast::Expr,
}

#[derive(Debug, Clone)]
pub struct DataPool {
    items: Vec<Value>,
    /// Start index of each DATA statement's first item, keyed by line, used
    /// by `RESTORE <line>` (spec §4.H).
    line_offsets: HashMap<u32, usize>,
    cursor: usize,
}

impl DataPool {
    pub fn build(program: &Program) -> Self {
        let mut items = Vec::new();
        let mut line_offsets = HashMap::new();
        for (&line_num, line) in program.lines.iter() {
            let mut recorded_for_line = false;
            for stmt in &line.statements {
                if let crate::ast::Stmt::Data { values, .. } = stmt {
                    if !recorded_for_line {
                        line_offsets.insert(line_num, items.len());
                        recorded_for_line = true;
                    }
                    for v in values {
                        items.push(match v {
                            DataItem::Number(NumberLit::Integer(n)) => Value::Integer(*n as i16),
                            DataItem::Number(NumberLit::Single(f)) => Value::Single(*f),
                            DataItem::Number(NumberLit::Double(f)) => Value::Double(*f),
                            DataItem::Str(s) => Value::Str(s.clone()),
                        });
                    }
                }
            }
        }
        DataPool {
            items,
            line_offsets,
            cursor: 0,
        }
    }

    pub fn read_next(&mut self) -> Result<Value, BasicError> {
        let v = self.items.get(self.cursor).cloned().ok_or(BasicError::OutOfData)?;
        self.cursor += 1;
        Ok(v)
    }

    pub fn restore(&mut self, line: Option<u32>) -> Result<(), BasicError> {
        match line {
            None => {
                self.cursor = 0;
                Ok(())
            }
            Some(n) => {
                self.cursor = *self.line_offsets.get(&n).ok_or(BasicError::UndefinedLine(n))?;
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpenFileMode {
    Input,
    Output,
    Append,
    Random,
}

#[derive(Debug, Clone)]
pub struct OpenFileRecord {
    pub path: String,
    pub mode: OpenFileMode,
    pub record_len: Option<usize>,
    pub fields: Vec<(usize, Name)>,
    /// Buffered file contents for sequential/random access (spec §4.L).
    pub contents: Vec<u8>,
    /// Byte offset of the next read/write (LOC advances it, EOF/LOF read it).
    pub cursor: usize,
    /// The file-IO collaborator's own handle for this file, distinct from
    /// the BASIC-program file number this record is keyed by.
    pub native_handle: i32,
}

/// Exposed operations used by the interpreter (spec §4.F).
pub struct Runtime {
    variables: HashMap<String, Value>,
    arrays: HashMap<String, ArrayValue>,
    pub def_type_map: crate::ast::DefTypeMap,
    pub option_base: i32,
    option_base_set: bool,
    any_array_declared: bool,

    pub gosub_stack: Vec<Pc>,
    pub for_stack: Vec<ForFrame>,
    pub while_stack: Vec<Pc>,

    pub error_state: ErrorState,
    pub data_pool: DataPool,
    pub open_files: HashMap<i32, OpenFileRecord>,
    pub user_functions: HashMap<String, UserFunction>,

    pub rng_seed: u64,
    pub last_rnd: f64,

    pub limiter: ResourceLimiter,
    pub stopped_at: Option<Pc>,
    pub trace_enabled: bool,

    /// Current console output column, for `TAB`/`POS` (spec §4.G).
    pub print_column: usize,
    /// Pending keystrokes for `INKEY$`, pushed by the host before each tick.
    pub keyboard_buffer: std::collections::VecDeque<char>,
}

impl Runtime {
    pub fn new(program: &Program, limiter: ResourceLimiter) -> Self {
        Runtime {
            variables: HashMap::new(),
            arrays: HashMap::new(),
            def_type_map: program.def_type_map.clone(),
            option_base: 0,
            option_base_set: false,
            any_array_declared: false,
            gosub_stack: Vec::new(),
            for_stack: Vec::new(),
            while_stack: Vec::new(),
            error_state: ErrorState::default(),
            data_pool: DataPool::build(program),
            open_files: HashMap::new(),
            user_functions: HashMap::new(),
            rng_seed: 0x2545F4914F6CDD1D,
            last_rnd: 0.0,
            limiter,
            stopped_at: None,
            trace_enabled: false,
            print_column: 0,
            keyboard_buffer: std::collections::VecDeque::new(),
        }
    }

    fn effective_type(&self, name: &Name) -> TypeTag {
        self.def_type_map.effective_type(name)
    }

    pub fn set_variable(&mut self, name: &Name, value: Value) -> Result<(), BasicError> {
        let tag = self.effective_type(name);
        let coerced = value.coerce(tag)?;
        if let Value::Str(s) = &coerced {
            self.limiter.check_string_len(s.len())?;
        }
        self.variables.insert(name.canonical(), coerced);
        Ok(())
    }

    pub fn get_variable(&self, name: &Name) -> Value {
        let tag = self.effective_type(name);
        self.variables
            .get(&name.canonical())
            .cloned()
            .unwrap_or_else(|| Value::zero_for(tag))
    }

    pub fn set_option_base(&mut self, base: i32) -> Result<(), BasicError> {
        if self.any_array_declared {
            return Err(BasicError::IllegalFunctionCall);
        }
        self.option_base = base;
        self.option_base_set = true;
        Ok(())
    }

    pub fn dim_array(&mut self, name: &Name, bounds: Vec<i32>) -> Result<(), BasicError> {
        self.any_array_declared = true;
        let key = name.canonical();
        if self.arrays.contains_key(&key) {
            return Err(BasicError::DuplicateDefinition);
        }
        let tag = self.effective_type(name);
        let arr = ArrayValue::new(tag, self.option_base, bounds);
        let bytes = arr.elements.len() * std::mem::size_of::<Value>();
        self.limiter.check_array_bytes(bytes)?;
        self.limiter.add_bytes(bytes)?;
        self.arrays.insert(key, arr);
        Ok(())
    }

    /// Implicitly dimension a 10-element array on first reference without a
    /// prior `DIM`, per classic MBASIC behavior.
    fn ensure_array(&mut self, name: &Name, dims: usize) -> Result<(), BasicError> {
        let key = name.canonical();
        if !self.arrays.contains_key(&key) {
            let tag = self.effective_type(name);
            let arr = ArrayValue::new(tag, self.option_base, vec![10; dims]);
            self.arrays.insert(key, arr);
        }
        Ok(())
    }

    pub fn array_get(&mut self, name: &Name, indices: &[i32]) -> Result<Value, BasicError> {
        self.ensure_array(name, indices.len())?;
        let arr = self.arrays.get(&name.canonical()).unwrap();
        let idx = arr.flat_index(indices)?;
        Ok(arr.elements[idx].clone())
    }

    pub fn array_set(&mut self, name: &Name, indices: &[i32], value: Value) -> Result<(), BasicError> {
        self.ensure_array(name, indices.len())?;
        let tag = self.effective_type(name);
        let coerced = value.coerce(tag)?;
        let arr = self.arrays.get_mut(&name.canonical()).unwrap();
        let idx = arr.flat_index(indices)?;
        arr.elements[idx] = coerced;
        Ok(())
    }

    pub fn erase_array(&mut self, name: &Name) {
        if let Some(arr) = self.arrays.remove(&name.canonical()) {
            let bytes = arr.elements.len() * std::mem::size_of::<Value>();
            self.limiter.remove_bytes(bytes);
        }
    }

    pub fn push_gosub(&mut self, return_pc: Pc) -> Result<(), BasicError> {
        self.limiter.push_gosub()?;
        self.gosub_stack.push(return_pc);
        Ok(())
    }

    pub fn pop_gosub(&mut self) -> Result<Pc, BasicError> {
        self.limiter.pop_gosub();
        self.gosub_stack.pop().ok_or(BasicError::ReturnWithoutGosub)
    }

    pub fn push_for(&mut self, frame: ForFrame) -> Result<(), BasicError> {
        self.limiter.push_for()?;
        self.for_stack.push(frame);
        Ok(())
    }

    pub fn pop_for(&mut self) -> Option<ForFrame> {
        self.limiter.pop_for();
        self.for_stack.pop()
    }

    pub fn top_for(&self) -> Option<&ForFrame> {
        self.for_stack.last()
    }

    /// `NEXT I` matches the innermost FOR with a matching control variable,
    /// popping everything nested inside it (spec §4.H).
    pub fn find_for_by_var(&mut self, var: &str) -> Option<ForFrame> {
        let pos = self
            .for_stack
            .iter()
            .rposition(|f| f.control_var.eq_ignore_ascii_case(var))?;
        for _ in pos..self.for_stack.len() {
            self.limiter.pop_for();
        }
        let frame = self.for_stack[pos].clone();
        self.for_stack.truncate(pos + 1);
        self.for_stack.pop();
        Some(frame)
    }

    pub fn push_while(&mut self, head_pc: Pc) -> Result<(), BasicError> {
        self.limiter.push_while()?;
        self.while_stack.push(head_pc);
        Ok(())
    }

    pub fn pop_while(&mut self) -> Result<Pc, BasicError> {
        self.limiter.pop_while();
        self.while_stack.pop().ok_or(BasicError::WendWithoutWhile)
    }

    pub fn record_error(&mut self, err: &BasicError, line: u32) {
        self.error_state.last_code = Some(err.code());
        self.error_state.last_line = Some(line);
    }

    /// Install the handler PC into the error state for the next
    /// `ON ERROR GOTO` dispatch (spec §4.H / §7).
    pub fn enter_handler(&mut self, handler: Pc, resume_at: Pc) -> Pc {
        self.error_state.handler_active = true;
        self.error_state.resume_pc = Some(resume_at);
        handler
    }

    pub fn clear_for_clear_stmt(&mut self) {
        self.variables.clear();
        self.arrays.clear();
        self.gosub_stack.clear();
        self.for_stack.clear();
        self.while_stack.clear();
        self.open_files.clear();
        self.error_state = ErrorState::default();
        self.limiter.reset_allocations();
        self.option_base_set = false;
        self.any_array_declared = false;
    }

    pub fn data_read_next(&mut self) -> Result<Value, BasicError> {
        self.data_pool.read_next()
    }

    pub fn data_restore(&mut self, line: Option<u32>) -> Result<(), BasicError> {
        self.data_pool.restore(line)
    }

    pub fn dump_variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LimitPreset, ResourceLimits};

    fn runtime() -> Runtime {
        let program = Program::new();
        Runtime::new(&program, ResourceLimiter::new(ResourceLimits::preset(LimitPreset::Local)))
    }

    #[test]
    fn get_variable_defaults_to_zero() {
        let rt = runtime();
        let n = Name::new("X", Some(TypeTag::Integer));
        assert_eq!(rt.get_variable(&n), Value::Integer(0));
    }

    #[test]
    fn set_then_get_roundtrips() {
        let mut rt = runtime();
        let n = Name::new("X", Some(TypeTag::Integer));
        rt.set_variable(&n, Value::Double(5.0)).unwrap();
        assert_eq!(rt.get_variable(&n), Value::Integer(5));
    }

    #[test]
    fn redim_without_erase_is_duplicate_definition() {
        let mut rt = runtime();
        let n = Name::new("A", None);
        rt.dim_array(&n, vec![10]).unwrap();
        assert_eq!(rt.dim_array(&n, vec![10]), Err(BasicError::DuplicateDefinition));
    }

    #[test]
    fn next_without_for_on_empty_stack() {
        let mut rt = runtime();
        assert!(rt.find_for_by_var("I").is_none());
    }

    #[test]
    fn gosub_return_without_gosub_errors() {
        let mut rt = runtime();
        assert_eq!(rt.pop_gosub(), Err(BasicError::ReturnWithoutGosub));
    }

    #[test]
    fn data_pool_builds_from_program_source_order() {
        use crate::token::KeywordCase;
        let program = crate::parser::parse_program("10 DATA 1, \"hi\", 3\n", KeywordCase::Preserve).unwrap();
        let mut pool = DataPool::build(&program);
        assert_eq!(pool.read_next().unwrap(), Value::Integer(1));
        assert_eq!(pool.read_next().unwrap(), Value::Str("hi".to_string()));
        assert_eq!(pool.read_next().unwrap(), Value::Integer(3));
        assert_eq!(pool.read_next(), Err(BasicError::OutOfData));
    }
}
