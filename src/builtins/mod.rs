//! Built-in function catalogue (spec §4.G): math, string, type/binary
//! conversion, I/O-status, and system categories, each classified
//! pure or impure for the analyzer (spec §4.E "Built-in function purity").

pub mod convert;
pub mod iostat;
pub mod math;
pub mod strings;
pub mod sysfn;

use crate::error::BasicError;
use crate::runtime::Runtime;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purity {
    Pure,
    Impure,
}

/// Classify a built-in by name (spec §4.E): deterministic functions of
/// their arguments are pure; anything touching I/O, the clock, or mutable
/// host state is impure. Grounded on `tests/semantic/test_function_purity.py`
/// (`SIN/COS/TAN/ABS/SQR/INT/SGN/ATN/EXP/LOG` are confirmed pure there).
pub fn purity(name: &str) -> Purity {
    match name {
        "RND" | "EOF" | "LOC" | "LOF" | "INKEY$" | "POS" | "INP" | "TIME" | "INPUT$" | "LPOS"
        | "PEEK" | "USR" | "FRE" => Purity::Impure,
        _ => Purity::Pure,
    }
}

/// Dispatch a built-in call by canonical (upper-cased) name.
pub fn call(name: &str, args: &[Value], rt: &mut Runtime) -> Result<Value, BasicError> {
    if let Some(v) = math::call(name, args)? {
        return Ok(v);
    }
    if let Some(v) = strings::call(name, args, rt)? {
        return Ok(v);
    }
    if let Some(v) = convert::call(name, args)? {
        return Ok(v);
    }
    if let Some(v) = iostat::call(name, args, rt)? {
        return Ok(v);
    }
    if let Some(v) = sysfn::call(name, args, rt)? {
        return Ok(v);
    }
    Err(BasicError::IllegalFunctionCall)
}

pub(crate) fn arg_f64(args: &[Value], i: usize) -> Result<f64, BasicError> {
    args.get(i).ok_or(BasicError::IllegalFunctionCall)?.as_f64()
}

pub(crate) fn arg_str<'a>(args: &'a [Value], i: usize) -> Result<&'a str, BasicError> {
    args.get(i).ok_or(BasicError::IllegalFunctionCall)?.as_str()
}
