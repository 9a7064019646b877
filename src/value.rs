// ABOUTME: The BASIC value domain — INTEGER/SINGLE/DOUBLE/STRING scalars and arrays

use crate::ast::TypeTag;
use crate::error::BasicError;
use std::fmt;

/// A runtime value (spec §3: "A tagged sum of: 16-bit signed integer, 32-bit
/// IEEE float (SINGLE), 64-bit IEEE float (DOUBLE), string of bytes").
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i16),
    Single(f32),
    Double(f64),
    Str(String),
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Integer(_) => TypeTag::Integer,
            Value::Single(_) => TypeTag::Single,
            Value::Double(_) => TypeTag::Double,
            Value::Str(_) => TypeTag::Str,
        }
    }

    pub fn zero_for(tag: TypeTag) -> Value {
        match tag {
            TypeTag::Integer => Value::Integer(0),
            TypeTag::Single => Value::Single(0.0),
            TypeTag::Double => Value::Double(0.0),
            TypeTag::Str => Value::Str(String::new()),
        }
    }

    pub fn as_f64(&self) -> Result<f64, BasicError> {
        match self {
            Value::Integer(n) => Ok(*n as f64),
            Value::Single(n) => Ok(*n as f64),
            Value::Double(n) => Ok(*n),
            Value::Str(_) => Err(BasicError::TypeMismatch),
        }
    }

    pub fn as_str(&self) -> Result<&str, BasicError> {
        match self {
            Value::Str(s) => Ok(s.as_str()),
            _ => Err(BasicError::TypeMismatch),
        }
    }

    /// Truthiness for `IF`/`WHILE` conditions: "evaluate condition as
    /// numeric; non-zero is true" (spec §4.H).
    pub fn is_truthy(&self) -> Result<bool, BasicError> {
        Ok(self.as_f64()? != 0.0)
    }

    /// Coerce this value to `tag`, per spec §4.F `set_variable` contract:
    /// INTEGER truncates with range check, SINGLE/DOUBLE widen, STRING
    /// requires a string operand.
    pub fn coerce(&self, tag: TypeTag) -> Result<Value, BasicError> {
        match tag {
            TypeTag::Str => match self {
                Value::Str(s) => Ok(Value::Str(s.clone())),
                _ => Err(BasicError::TypeMismatch),
            },
            TypeTag::Integer => {
                let f = self.as_f64()?;
                let rounded = f.round();
                if rounded < i16::MIN as f64 || rounded > i16::MAX as f64 {
                    Err(BasicError::Overflow)
                } else {
                    Ok(Value::Integer(rounded as i16))
                }
            }
            TypeTag::Single => Ok(Value::Single(self.as_f64()? as f32)),
            TypeTag::Double => Ok(Value::Double(self.as_f64()?)),
        }
    }

    /// MBASIC `PRINT` numeric formatting: a leading space for non-negative
    /// numbers (sign position) and a trailing space after every numeric
    /// (spec §4.H PRINT contract; scenario 6 in spec §8).
    pub fn print_repr(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Integer(n) => format!(
                "{}{} ",
                if *n >= 0 { " " } else { "" },
                n
            ),
            Value::Single(n) => format!(
                "{}{} ",
                if *n >= 0.0 { " " } else { "" },
                format_single(*n)
            ),
            Value::Double(n) => format!(
                "{}{} ",
                if *n >= 0.0 { " " } else { "" },
                format_double(*n)
            ),
        }
    }
}

/// SINGLE values print with up to 7 significant digits, `E` exponent when
/// out of plain range (spec §9 open question, resolved in favor of classic
/// MBASIC 5.21 behavior).
fn format_single(n: f32) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let mag = n.abs();
    if (0.01..1e7).contains(&mag) || mag == 0.0 {
        trim_trailing_zeros(format!("{:.7}", n), 7)
    } else {
        let s = format!("{:E}", n);
        normalize_exponent(&s, 'E')
    }
}

/// DOUBLE values print with up to 16 significant digits, `D` exponent.
fn format_double(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let mag = n.abs();
    if (0.01..1e16).contains(&mag) || mag == 0.0 {
        trim_trailing_zeros(format!("{:.16}", n), 16)
    } else {
        let s = format!("{:E}", n);
        normalize_exponent(&s, 'D')
    }
}

fn trim_trailing_zeros(s: String, _max_sig: usize) -> String {
    if !s.contains('.') {
        return s;
    }
    let trimmed = s.trim_end_matches('0');
    let trimmed = trimmed.trim_end_matches('.');
    trimmed.to_string()
}

fn normalize_exponent(s: &str, marker: char) -> String {
    s.replacen('E', &marker.to_string(), 1)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.print_repr().trim())
    }
}

/// An array's shape and storage (spec §3: "name → descriptor `{type,
/// lower_bound, upper_bound_per_dim, elements}`").
#[derive(Debug, Clone)]
pub struct ArrayValue {
    pub elem_type: TypeTag,
    pub lower_bound: i32,
    pub dims: Vec<i32>, // upper bound per dimension
    pub elements: Vec<Value>,
}

impl ArrayValue {
    pub fn new(elem_type: TypeTag, lower_bound: i32, dims: Vec<i32>) -> Self {
        let len: usize = dims
            .iter()
            .map(|&upper| (upper - lower_bound + 1).max(0) as usize)
            .product();
        ArrayValue {
            elements: vec![Value::zero_for(elem_type); len],
            elem_type,
            lower_bound,
            dims,
        }
    }

    pub fn flat_index(&self, indices: &[i32]) -> Result<usize, BasicError> {
        if indices.len() != self.dims.len() {
            return Err(BasicError::SubscriptOutOfRange);
        }
        let mut idx = 0usize;
        for (i, &ix) in indices.iter().enumerate() {
            let upper = self.dims[i];
            if ix < self.lower_bound || ix > upper {
                return Err(BasicError::SubscriptOutOfRange);
            }
            let span = (upper - self.lower_bound + 1) as usize;
            idx = idx * span + (ix - self.lower_bound) as usize;
        }
        Ok(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_overflow_on_coerce() {
        let v = Value::Double(100000.0);
        assert_eq!(v.coerce(TypeTag::Integer), Err(BasicError::Overflow));
    }

    #[test]
    fn string_to_numeric_is_type_mismatch() {
        let v = Value::Str("x".to_string());
        assert_eq!(v.coerce(TypeTag::Integer), Err(BasicError::TypeMismatch));
    }

    #[test]
    fn print_repr_adds_leading_and_trailing_space_for_nonneg() {
        let v = Value::Integer(3);
        assert_eq!(v.print_repr(), " 3 ");
    }

    #[test]
    fn print_repr_negative_has_no_leading_space() {
        let v = Value::Integer(-3);
        assert_eq!(v.print_repr(), "-3 ");
    }

    #[test]
    fn string_print_repr_has_no_padding() {
        let v = Value::Str("hi".to_string());
        assert_eq!(v.print_repr(), "hi");
    }

    #[test]
    fn array_flat_index_respects_option_base() {
        let arr = ArrayValue::new(TypeTag::Integer, 0, vec![10]);
        assert_eq!(arr.elements.len(), 11);
        assert!(arr.flat_index(&[11]).is_err());
        assert!(arr.flat_index(&[10]).is_ok());
    }

    #[test]
    fn chr_zero_round_trips_through_string() {
        let s = Value::Str("\u{0}".to_string());
        assert_eq!(s.as_str().unwrap().len(), 1);
    }
}
