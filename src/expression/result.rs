use std::fmt;
use serde::Serialize;
use crate::core::types::EnumHandle;

/// Value produced by evaluating an expression node for one document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ResultValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Raw(Vec<u8>),
    Enum(EnumHandle),
    Array(Vec<ResultValue>),
}

impl ResultValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ResultValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ResultValue::Bool(b) => Some(*b as i64),
            ResultValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ResultValue::Float(v) => Some(*v),
            ResultValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResultValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ResultValue]> {
        match self {
            ResultValue::Array(values) => Some(values),
            _ => None,
        }
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResultValue::Null => f.write_str("null"),
            ResultValue::Bool(b) => write!(f, "{}", b),
            ResultValue::Int(v) => write!(f, "{}", v),
            ResultValue::Float(v) => write!(f, "{}", v),
            ResultValue::String(s) => f.write_str(s),
            ResultValue::Raw(b) => write!(f, "<{} bytes>", b.len()),
            ResultValue::Enum(e) => write!(f, "enum({})", e),
            ResultValue::Array(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
        }
    }
}
