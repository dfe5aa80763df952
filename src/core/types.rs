use serde::{Serialize, Deserialize};
use std::fmt;
use crate::core::error::{Error, Result};

/// Local document id. Attribute storage is dense, so ids index vectors directly.
pub type DocId = u32;

/// Opaque external form of an enum index
pub type EnumHandle = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BasicType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    String,
    Raw,
    Tensor,
}

impl BasicType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BasicType::Bool => "bool",
            BasicType::Int8 => "int8",
            BasicType::Int16 => "int16",
            BasicType::Int32 => "int32",
            BasicType::Int64 => "int64",
            BasicType::Float => "float",
            BasicType::Double => "double",
            BasicType::String => "string",
            BasicType::Raw => "raw",
            BasicType::Tensor => "tensor",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "bool" => BasicType::Bool,
            "int8" | "byte" => BasicType::Int8,
            "int16" | "short" => BasicType::Int16,
            "int32" | "int" => BasicType::Int32,
            "int64" | "long" => BasicType::Int64,
            "float" => BasicType::Float,
            "double" => BasicType::Double,
            "string" => BasicType::String,
            "raw" => BasicType::Raw,
            "tensor" => BasicType::Tensor,
            other => return Err(Error::config(format!("unknown basic type '{}'", other))),
        })
    }

    /// Bool counts as an integer type: it sorts, searches and converts like a 0/1 integer.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            BasicType::Bool | BasicType::Int8 | BasicType::Int16 | BasicType::Int32 | BasicType::Int64
        )
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self, BasicType::Float | BasicType::Double)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_floating_point()
    }

    pub fn fixed_size(&self) -> usize {
        match self {
            BasicType::Bool | BasicType::Int8 => 1,
            BasicType::Int16 => 2,
            BasicType::Int32 | BasicType::Float => 4,
            BasicType::Int64 | BasicType::Double => 8,
            BasicType::String | BasicType::Raw | BasicType::Tensor => 0,
        }
    }
}

impl fmt::Display for BasicType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    #[default]
    Single,
    Array,
    WeightedSet,
    Map,
}

impl CollectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionType::Single => "single",
            CollectionType::Array => "array",
            CollectionType::WeightedSet => "weightedset",
            CollectionType::Map => "map",
        }
    }

    pub fn is_multi_value(&self) -> bool {
        !matches!(self, CollectionType::Single)
    }
}

/// Typed scalar as seen by writers and generic readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Raw(Vec<u8>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Raw(_) => "raw",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(v) => Some(*v),
            Value::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Raw(b) => Some(b),
            Value::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
            Value::Raw(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Raw(v)
    }
}

/// Element of a weighted set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(C)]
pub struct WeightedValue<T> {
    pub value: T,
    pub weight: i32,
}

impl<T> WeightedValue<T> {
    pub fn new(value: T, weight: i32) -> Self {
        WeightedValue { value, weight }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn weight(&self) -> i32 {
        self.weight
    }
}

/// Arithmetic update applied to single-value numeric attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    pub fn apply_f64(&self, current: f64, operand: f64) -> f64 {
        match self {
            ArithmeticOp::Add => current + operand,
            ArithmeticOp::Sub => current - operand,
            ArithmeticOp::Mul => current * operand,
            ArithmeticOp::Div => current / operand,
        }
    }

    /// Integer semantics; division by zero leaves the value unchanged.
    pub fn apply_i64(&self, current: i64, operand: f64) -> i64 {
        match self {
            ArithmeticOp::Add => current.wrapping_add(operand as i64),
            ArithmeticOp::Sub => current.wrapping_sub(operand as i64),
            ArithmeticOp::Mul => (current as f64 * operand) as i64,
            ArithmeticOp::Div => {
                if operand == 0.0 {
                    current
                } else {
                    (current as f64 / operand) as i64
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_type_names_round_trip() {
        for t in [BasicType::Bool, BasicType::Int8, BasicType::Int64, BasicType::Double, BasicType::String] {
            assert_eq!(BasicType::parse(t.as_str()).unwrap(), t);
        }
        assert!(BasicType::parse("uint7").is_err());
    }

    #[test]
    fn value_conversions() {
        assert_eq!(Value::from(7).as_i64(), Some(7));
        assert_eq!(Value::from(2.5).as_i64(), Some(2));
        assert_eq!(Value::from(true).as_f64(), Some(1.0));
        assert_eq!(Value::from("x").as_i64(), None);
        assert_eq!(Value::from("x").as_str(), Some("x"));
    }

    #[test]
    fn integer_division_by_zero_is_ignored() {
        assert_eq!(ArithmeticOp::Div.apply_i64(10, 0.0), 10);
        assert_eq!(ArithmeticOp::Div.apply_i64(10, 4.0), 2);
        assert_eq!(ArithmeticOp::Mul.apply_i64(3, 2.5), 7);
    }
}
