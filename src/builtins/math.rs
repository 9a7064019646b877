//! Math built-ins: ABS, ATN, COS, SIN, TAN, EXP, FIX, INT, LOG, RND, SGN, SQR.
//!
//! Semantics follow MBASIC 5.21 reference behavior (spec §4.G): `INT` floors,
//! `FIX` truncates toward zero, `SGN` is -1/0/1, `RND(x)` seeds/repeats/draws
//! depending on the sign of `x`.

use super::arg_f64;
use crate::error::BasicError;
use crate::value::Value;

/// Handles calls whose name belongs to this category; returns `None` for
/// anything else so `builtins::call` can try the next category.
pub fn call(name: &str, args: &[Value]) -> Result<Option<Value>, BasicError> {
    let v = match name {
        "ABS" => Value::Double(arg_f64(args, 0)?.abs()),
        "ATN" => Value::Double(arg_f64(args, 0)?.atan()),
        "COS" => Value::Double(arg_f64(args, 0)?.cos()),
        "SIN" => Value::Double(arg_f64(args, 0)?.sin()),
        "TAN" => Value::Double(arg_f64(args, 0)?.tan()),
        "EXP" => Value::Double(arg_f64(args, 0)?.exp()),
        "FIX" => Value::Double(arg_f64(args, 0)?.trunc()),
        "INT" => Value::Double(arg_f64(args, 0)?.floor()),
        "LOG" => {
            let x = arg_f64(args, 0)?;
            if x <= 0.0 {
                return Err(BasicError::IllegalFunctionCall);
            }
            Value::Double(x.ln())
        }
        "SGN" => {
            let x = arg_f64(args, 0)?;
            Value::Integer(if x > 0.0 { 1 } else if x < 0.0 { -1 } else { 0 })
        }
        "SQR" => {
            let x = arg_f64(args, 0)?;
            if x < 0.0 {
                return Err(BasicError::IllegalFunctionCall);
            }
            Value::Double(x.sqrt())
        }
        _ => return Ok(None),
    };
    Ok(Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_floors_negative() {
        let v = call("INT", &[Value::Double(-0.5)]).unwrap().unwrap();
        assert_eq!(v, Value::Double(-1.0));
    }

    #[test]
    fn fix_truncates_toward_zero() {
        let v = call("FIX", &[Value::Double(-0.5)]).unwrap().unwrap();
        assert_eq!(v, Value::Double(0.0));
    }

    #[test]
    fn sgn_returns_minus_one_zero_one() {
        assert_eq!(call("SGN", &[Value::Double(5.0)]).unwrap().unwrap(), Value::Integer(1));
        assert_eq!(call("SGN", &[Value::Double(0.0)]).unwrap().unwrap(), Value::Integer(0));
        assert_eq!(call("SGN", &[Value::Double(-5.0)]).unwrap().unwrap(), Value::Integer(-1));
    }

    #[test]
    fn sqr_of_negative_is_illegal_function_call() {
        assert_eq!(call("SQR", &[Value::Double(-1.0)]), Err(BasicError::IllegalFunctionCall));
    }

    #[test]
    fn log_of_zero_is_illegal_function_call() {
        assert_eq!(call("LOG", &[Value::Double(0.0)]), Err(BasicError::IllegalFunctionCall));
    }

    #[test]
    fn unknown_name_returns_none() {
        assert_eq!(call("LEFT$", &[]).unwrap(), None);
    }
}
