//! String built-ins: ASC, CHR$, HEX$, OCT$, INSTR, LEFT$, LEN, MID$, RIGHT$,
//! SPACE$, SPC, STR$, STRING$, TAB, VAL (spec §4.G).
//!
//! `MID$` on the left of `=` is a statement form (`AssignTarget::MidAssign`
//! in the AST) and is handled by the interpreter, not here.

use super::{arg_f64, arg_str};
use crate::error::BasicError;
use crate::runtime::Runtime;
use crate::value::Value;

pub fn call(name: &str, args: &[Value], rt: &mut Runtime) -> Result<Option<Value>, BasicError> {
    let v = match name {
        "ASC" => {
            let s = arg_str(args, 0)?;
            let b = s.bytes().next().ok_or(BasicError::IllegalFunctionCall)?;
            Value::Integer(b as i16)
        }
        "CHR$" => {
            let n = arg_f64(args, 0)? as i64;
            if !(0..=255).contains(&n) {
                return Err(BasicError::IllegalFunctionCall);
            }
            Value::Str((n as u8 as char).to_string())
        }
        "HEX$" => Value::Str(format!("{:X}", arg_f64(args, 0)? as i64)),
        "OCT$" => Value::Str(format!("{:o}", arg_f64(args, 0)? as i64)),
        "INSTR" => {
            let (hay_idx, needle_idx, start) = if args.len() >= 3 {
                (1, 2, arg_f64(args, 0)? as usize)
            } else {
                (0, 1, 1usize)
            };
            let hay = arg_str(args, hay_idx)?;
            let needle = arg_str(args, needle_idx)?;
            let start0 = start.saturating_sub(1);
            if start0 > hay.len() {
                Value::Integer(0)
            } else {
                match hay[start0..].find(needle) {
                    Some(off) => Value::Integer((start0 + off + 1) as i16),
                    None => Value::Integer(0),
                }
            }
        }
        "LEFT$" => {
            let s = arg_str(args, 0)?;
            let n = (arg_f64(args, 1)? as usize).min(s.len());
            Value::Str(s[..n].to_string())
        }
        "LEN" => Value::Integer(arg_str(args, 0)?.len() as i16),
        "MID$" => {
            let s = arg_str(args, 0)?;
            let start = (arg_f64(args, 1)? as usize).saturating_sub(1).min(s.len());
            let len = if args.len() >= 3 {
                (arg_f64(args, 2)? as usize).min(s.len() - start)
            } else {
                s.len() - start
            };
            Value::Str(s[start..start + len].to_string())
        }
        "RIGHT$" => {
            let s = arg_str(args, 0)?;
            let n = (arg_f64(args, 1)? as usize).min(s.len());
            Value::Str(s[s.len() - n..].to_string())
        }
        "SPACE$" => {
            let n = arg_f64(args, 0)? as usize;
            rt.limiter.check_string_len(n)?;
            Value::Str(" ".repeat(n))
        }
        "SPC" => Value::Str(" ".repeat(arg_f64(args, 0)? as usize)),
        "STR$" => {
            let n = arg_f64(args, 0)?;
            Value::Str(if n >= 0.0 {
                format!(" {}", trim_num(n))
            } else {
                trim_num(n)
            })
        }
        "STRING$" => {
            let n = arg_f64(args, 0)? as usize;
            let ch = match &args[1] {
                Value::Str(s) => s.chars().next().unwrap_or(' '),
                other => (other.as_f64()? as u8) as char,
            };
            rt.limiter.check_string_len(n)?;
            Value::Str(ch.to_string().repeat(n))
        }
        "TAB" => Value::Str(" ".repeat(arg_f64(args, 0)? as usize)),
        "VAL" => {
            let s = arg_str(args, 0)?.trim();
            let parsed: String = s
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+' || *c == 'E' || *c == 'e')
                .collect();
            Value::Double(parsed.parse().unwrap_or(0.0))
        }
        _ => return Ok(None),
    };
    Ok(Some(v))
}

fn trim_num(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Program;
    use crate::config::{LimitPreset, ResourceLimits};
    use crate::limits::ResourceLimiter;

    fn rt() -> Runtime {
        Runtime::new(&Program::new(), ResourceLimiter::new(ResourceLimits::preset(LimitPreset::Local)))
    }

    #[test]
    fn left_dollar_clamps_to_string_length() {
        let mut r = rt();
        let v = call("LEFT$", &[Value::Str("abc".into()), Value::Double(5.0)], &mut r)
            .unwrap()
            .unwrap();
        assert_eq!(v, Value::Str("abc".to_string()));
    }

    #[test]
    fn mid_dollar_extracts_substring() {
        let mut r = rt();
        let v = call(
            "MID$",
            &[Value::Str("HELLO".into()), Value::Double(2.0), Value::Double(3.0)],
            &mut r,
        )
        .unwrap()
        .unwrap();
        assert_eq!(v, Value::Str("ELL".to_string()));
    }

    #[test]
    fn len_of_empty_string_is_zero() {
        let mut r = rt();
        let v = call("LEN", &[Value::Str(String::new())], &mut r).unwrap().unwrap();
        assert_eq!(v, Value::Integer(0));
    }

    #[test]
    fn chr_zero_is_one_byte() {
        let mut r = rt();
        let v = call("CHR$", &[Value::Double(0.0)], &mut r).unwrap().unwrap();
        assert_eq!(v, Value::Str("\u{0}".to_string()));
    }

    #[test]
    fn chr_out_of_range_is_illegal_function_call() {
        let mut r = rt();
        assert_eq!(
            call("CHR$", &[Value::Double(300.0)], &mut r),
            Err(BasicError::IllegalFunctionCall)
        );
    }

    #[test]
    fn instr_finds_substring_position() {
        let mut r = rt();
        let v = call(
            "INSTR",
            &[Value::Str("HELLO WORLD".into()), Value::Str("WORLD".into())],
            &mut r,
        )
        .unwrap()
        .unwrap();
        assert_eq!(v, Value::Integer(7));
    }
}
