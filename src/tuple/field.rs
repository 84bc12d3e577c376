use std::fmt;

use bytes::{Buf, BufMut};

use crate::common::{DbError, Result};

use super::DataType;

/// Comparison operators understood by [`Field::compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEq,
    GreaterThan,
    GreaterThanOrEq,
    /// Substring match for strings, equality for integers
    Like,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Equals => "=",
            CompareOp::NotEquals => "<>",
            CompareOp::LessThan => "<",
            CompareOp::LessThanOrEq => "<=",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterThanOrEq => ">=",
            CompareOp::Like => "LIKE",
        };
        f.write_str(s)
    }
}

/// A typed value stored in a tuple.
///
/// Fields are totally ordered and hashable so they can serve as group-by keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    /// Returns true if this field can be stored in a column of the given type.
    pub fn matches(&self, data_type: &DataType) -> bool {
        matches!(
            (self, data_type),
            (Field::Int(_), DataType::Int) | (Field::Str(_), DataType::Str(_))
        )
    }

    /// Name of the field's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Field::Int(_) => "INT",
            Field::Str(_) => "STRING",
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Field::Int(v) => Some(*v),
            Field::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::Str(s) => Some(s),
            Field::Int(_) => None,
        }
    }

    /// Coerces the field into the given column type, truncating strings that
    /// exceed the column width on a char boundary.
    pub(crate) fn fit(self, data_type: &DataType) -> Result<Field> {
        match (self, data_type) {
            (Field::Int(v), DataType::Int) => Ok(Field::Int(v)),
            (Field::Str(s), DataType::Str(max_len)) => Ok(Field::Str(truncate(s, *max_len))),
            (field, dt) => Err(DbError::TypeMismatch {
                expected: dt.to_string(),
                found: field.type_name().to_string(),
            }),
        }
    }

    /// Evaluates `self op other`. Fields of different types never match.
    pub fn compare(&self, op: CompareOp, other: &Field) -> bool {
        match (self, other) {
            (Field::Int(a), Field::Int(b)) => match op {
                CompareOp::Equals | CompareOp::Like => a == b,
                CompareOp::NotEquals => a != b,
                CompareOp::LessThan => a < b,
                CompareOp::LessThanOrEq => a <= b,
                CompareOp::GreaterThan => a > b,
                CompareOp::GreaterThanOrEq => a >= b,
            },
            (Field::Str(a), Field::Str(b)) => match op {
                CompareOp::Equals => a == b,
                CompareOp::NotEquals => a != b,
                CompareOp::LessThan => a < b,
                CompareOp::LessThanOrEq => a <= b,
                CompareOp::GreaterThan => a > b,
                CompareOp::GreaterThanOrEq => a >= b,
                CompareOp::Like => a.contains(b.as_str()),
            },
            _ => false,
        }
    }

    /// Writes the fixed-width encoding of this field.
    pub fn encode<B: BufMut>(&self, data_type: &DataType, buf: &mut B) -> Result<()> {
        match (self, data_type) {
            (Field::Int(v), DataType::Int) => buf.put_i32_le(*v),
            (Field::Str(s), DataType::Str(max_len)) => {
                let bytes = truncated_bytes(s, *max_len);
                buf.put_u32_le(bytes.len() as u32);
                buf.put_slice(bytes);
                buf.put_bytes(0, max_len - bytes.len());
            }
            (field, dt) => {
                return Err(DbError::TypeMismatch {
                    expected: dt.to_string(),
                    found: field.type_name().to_string(),
                })
            }
        }
        Ok(())
    }

    /// Reads a field of the given type, consuming exactly `data_type.byte_len()` bytes.
    /// Returns None if the input is short or the stored length is out of range.
    pub fn decode<B: Buf>(data_type: &DataType, buf: &mut B) -> Option<Field> {
        if buf.remaining() < data_type.byte_len() {
            return None;
        }
        match data_type {
            DataType::Int => Some(Field::Int(buf.get_i32_le())),
            DataType::Str(max_len) => {
                let len = buf.get_u32_le() as usize;
                if len > *max_len {
                    return None;
                }
                let mut raw = vec![0u8; *max_len];
                buf.copy_to_slice(&mut raw);
                raw.truncate(len);
                String::from_utf8(raw).ok().map(Field::Str)
            }
        }
    }
}

fn truncated_bytes(s: &str, max_len: usize) -> &[u8] {
    if s.len() <= max_len {
        return s.as_bytes();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s.as_bytes()[..end]
}

fn truncate(mut s: String, max_len: usize) -> String {
    let keep = truncated_bytes(&s, max_len).len();
    s.truncate(keep);
    s
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Int(v)
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Field::Str(s.to_string())
    }
}

impl From<String> for Field {
    fn from(s: String) -> Self {
        Field::Str(s)
    }
}
