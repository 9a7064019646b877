//! Type and binary conversion built-ins: CDBL, CINT, CSNG, CVD, CVI, CVS,
//! MKD$, MKI$, MKS$ (spec §4.G).
//!
//! `CVt`/`MKt$` round-trip through little-endian byte packing of the
//! matching Rust numeric type (`i16`/`f32`/`f64`) rather than the original
//! 8080 floating-point storage format — `CVt(MKt$(v)) == v` still holds,
//! which is the property the spec requires (spec §8).

use super::{arg_f64, arg_str};
use crate::ast::TypeTag;
use crate::error::BasicError;
use crate::value::Value;

pub fn call(name: &str, args: &[Value]) -> Result<Option<Value>, BasicError> {
    let v = match name {
        "CDBL" => args.first().ok_or(BasicError::IllegalFunctionCall)?.coerce(TypeTag::Double)?,
        "CINT" => args.first().ok_or(BasicError::IllegalFunctionCall)?.coerce(TypeTag::Integer)?,
        "CSNG" => args.first().ok_or(BasicError::IllegalFunctionCall)?.coerce(TypeTag::Single)?,
        "MKI$" => {
            let n = arg_f64(args, 0)? as i16;
            Value::Str(bytes_to_string(&n.to_le_bytes()))
        }
        "MKS$" => {
            let n = arg_f64(args, 0)? as f32;
            Value::Str(bytes_to_string(&n.to_le_bytes()))
        }
        "MKD$" => {
            let n = arg_f64(args, 0)?;
            Value::Str(bytes_to_string(&n.to_le_bytes()))
        }
        "CVI" => {
            let bytes = string_to_bytes(arg_str(args, 0)?, 2)?;
            Value::Integer(i16::from_le_bytes([bytes[0], bytes[1]]))
        }
        "CVS" => {
            let bytes = string_to_bytes(arg_str(args, 0)?, 4)?;
            Value::Single(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        "CVD" => {
            let bytes = string_to_bytes(arg_str(args, 0)?, 8)?;
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&bytes[..8]);
            Value::Double(f64::from_le_bytes(arr))
        }
        _ => return Ok(None),
    };
    Ok(Some(v))
}

fn bytes_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn string_to_bytes(s: &str, want: usize) -> Result<Vec<u8>, BasicError> {
    let bytes: Vec<u8> = s.chars().map(|c| c as u8).collect();
    if bytes.len() < want {
        return Err(BasicError::IllegalFunctionCall);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mki_cvi_round_trips() {
        let packed = call("MKI$", &[Value::Integer(-1234)]).unwrap().unwrap();
        let back = call("CVI", &[packed]).unwrap().unwrap();
        assert_eq!(back, Value::Integer(-1234));
    }

    #[test]
    fn mks_cvs_round_trips() {
        let packed = call("MKS$", &[Value::Single(3.5)]).unwrap().unwrap();
        let back = call("CVS", &[packed]).unwrap().unwrap();
        assert_eq!(back, Value::Single(3.5));
    }

    #[test]
    fn mkd_cvd_round_trips() {
        let packed = call("MKD$", &[Value::Double(2.0_f64.sqrt())]).unwrap().unwrap();
        let back = call("CVD", &[packed]).unwrap().unwrap();
        assert_eq!(back, Value::Double(2.0_f64.sqrt()));
    }

    #[test]
    fn cint_rounds_and_checks_overflow() {
        assert_eq!(call("CINT", &[Value::Double(4.6)]).unwrap().unwrap(), Value::Integer(5));
        assert_eq!(call("CINT", &[Value::Double(1e9)]), Err(BasicError::Overflow));
    }

    #[test]
    fn cvi_on_short_string_is_illegal_function_call() {
        assert_eq!(call("CVI", &[Value::Str("a".into())]), Err(BasicError::IllegalFunctionCall));
    }

    #[test]
    fn unknown_name_returns_none() {
        assert_eq!(call("ABS", &[]).unwrap(), None);
    }
}
