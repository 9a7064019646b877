//! I/O-status built-ins: EOF, LOC, LOF, LPOS, POS, INPUT$, INKEY$ (spec §4.G).
//! All are impure — they read mutable runtime/host state rather than being
//! pure functions of their arguments (spec §4.E).

use super::arg_f64;
use crate::error::BasicError;
use crate::runtime::Runtime;
use crate::value::Value;

pub fn call(name: &str, args: &[Value], rt: &mut Runtime) -> Result<Option<Value>, BasicError> {
    let v = match name {
        "EOF" => {
            let n = arg_f64(args, 0)? as i32;
            let rec = rt.open_files.get(&n).ok_or(BasicError::BadFileNumber)?;
            Value::Integer(if rec.cursor >= rec.contents.len() { -1 } else { 0 })
        }
        "LOC" => {
            let n = arg_f64(args, 0)? as i32;
            let rec = rt.open_files.get(&n).ok_or(BasicError::BadFileNumber)?;
            let unit = rec.record_len.unwrap_or(128).max(1);
            Value::Integer((rec.cursor / unit) as i16)
        }
        "LOF" => {
            let n = arg_f64(args, 0)? as i32;
            let rec = rt.open_files.get(&n).ok_or(BasicError::BadFileNumber)?;
            Value::Integer(rec.contents.len() as i16)
        }
        "POS" => {
            let _ = arg_f64(args, 0)?;
            Value::Integer(rt.print_column as i16)
        }
        "LPOS" => {
            let _ = arg_f64(args, 0)?;
            Value::Integer(0)
        }
        "INKEY$" => match rt.keyboard_buffer.pop_front() {
            Some(ch) => Value::Str(ch.to_string()),
            None => Value::Str(String::new()),
        },
        "INPUT$" => {
            let n = arg_f64(args, 0)? as usize;
            let mut s = String::with_capacity(n);
            for _ in 0..n {
                match rt.keyboard_buffer.pop_front() {
                    Some(ch) => s.push(ch),
                    None => return Err(BasicError::InputPastEnd),
                }
            }
            Value::Str(s)
        }
        _ => return Ok(None),
    };
    Ok(Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Program;
    use crate::config::{LimitPreset, ResourceLimits};
    use crate::limits::ResourceLimiter;
    use crate::runtime::{OpenFileMode, OpenFileRecord};

    fn rt() -> Runtime {
        Runtime::new(&Program::new(), ResourceLimiter::new(ResourceLimits::preset(LimitPreset::Local)))
    }

    #[test]
    fn eof_on_unopened_file_is_bad_file_number() {
        let mut r = rt();
        assert_eq!(call("EOF", &[Value::Integer(1)], &mut r), Err(BasicError::BadFileNumber));
    }

    #[test]
    fn eof_false_until_cursor_reaches_end() {
        let mut r = rt();
        r.open_files.insert(
            1,
            OpenFileRecord {
                path: "x".into(),
                mode: OpenFileMode::Input,
                record_len: None,
                fields: Vec::new(),
                contents: vec![1, 2, 3],
                cursor: 0,
            },
        );
        assert_eq!(call("EOF", &[Value::Integer(1)], &mut r).unwrap().unwrap(), Value::Integer(0));
        r.open_files.get_mut(&1).unwrap().cursor = 3;
        assert_eq!(call("EOF", &[Value::Integer(1)], &mut r).unwrap().unwrap(), Value::Integer(-1));
    }

    #[test]
    fn inkey_dollar_drains_keyboard_buffer() {
        let mut r = rt();
        r.keyboard_buffer.push_back('A');
        assert_eq!(call("INKEY$", &[], &mut r).unwrap().unwrap(), Value::Str("A".into()));
        assert_eq!(call("INKEY$", &[], &mut r).unwrap().unwrap(), Value::Str(String::new()));
    }

    #[test]
    fn input_dollar_errors_past_end() {
        let mut r = rt();
        assert_eq!(call("INPUT$", &[Value::Integer(3)], &mut r), Err(BasicError::InputPastEnd));
    }
}
