use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use serde::Serialize;
use serde::de::DeserializeOwned;
use crate::core::types::{ArithmeticOp, BasicType, Value};
use crate::datastore::rcu::AtomicValue;

/// Scalar attribute element: bool, integers and floats
pub trait NumericType:
    AtomicValue + PartialEq + PartialOrd + Default + fmt::Debug + fmt::Display + Serialize + DeserializeOwned
{
    const BASIC_TYPE: BasicType;
    const IS_FLOAT: bool;
    /// Bytes written by `write_sort_key`
    const SORT_KEY_LEN: usize;

    fn undefined() -> Self;
    fn is_undefined(self) -> bool;
    /// Smallest and largest defined value, as integers (floats report the i64 extremes)
    fn defined_range_i64() -> (i64, i64);
    fn total_cmp(&self, other: &Self) -> Ordering;
    fn key_bits(self) -> u64;

    fn from_i64(v: i64) -> Self;
    fn from_f64(v: f64) -> Self;
    fn to_i64(self) -> i64;
    fn to_f64(self) -> f64;
    fn to_value(self) -> Value;
    fn parse(s: &str) -> Option<Self>;

    /// Big-endian encoding whose byte order matches the numeric order
    fn write_sort_key(self, out: &mut [u8]);

    fn apply(self, op: ArithmeticOp, operand: f64) -> Self;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(Self::from_i64(*v)),
            Value::Bool(b) => Some(Self::from_i64(*b as i64)),
            Value::Float(v) => Some(Self::from_f64(*v)),
            Value::String(s) => Self::parse(s),
            Value::Raw(_) => None,
        }
    }
}

macro_rules! impl_integer {
    ($($t:ty => $unsigned:ty, $basic:expr);* $(;)?) => {
        $(
            impl NumericType for $t {
                const BASIC_TYPE: BasicType = $basic;
                const IS_FLOAT: bool = false;
                const SORT_KEY_LEN: usize = std::mem::size_of::<$t>();

                fn undefined() -> Self {
                    <$t>::MIN
                }

                fn is_undefined(self) -> bool {
                    self == <$t>::MIN
                }

                fn defined_range_i64() -> (i64, i64) {
                    (<$t>::MIN as i64 + 1, <$t>::MAX as i64)
                }

                fn total_cmp(&self, other: &Self) -> Ordering {
                    self.cmp(other)
                }

                fn key_bits(self) -> u64 {
                    self as i64 as u64
                }

                fn from_i64(v: i64) -> Self {
                    v as $t
                }

                fn from_f64(v: f64) -> Self {
                    v as $t
                }

                fn to_i64(self) -> i64 {
                    self as i64
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn to_value(self) -> Value {
                    Value::Int(self as i64)
                }

                fn parse(s: &str) -> Option<Self> {
                    s.trim().parse::<i64>().ok().and_then(|v| <$t>::try_from(v).ok())
                }

                fn write_sort_key(self, out: &mut [u8]) {
                    let flipped = (self as $unsigned) ^ (1 << (<$unsigned>::BITS - 1));
                    out[..Self::SORT_KEY_LEN].copy_from_slice(&flipped.to_be_bytes());
                }

                fn apply(self, op: ArithmeticOp, operand: f64) -> Self {
                    op.apply_i64(self as i64, operand) as $t
                }
            }
        )*
    };
}

impl_integer!(
    i8 => u8, BasicType::Int8;
    i16 => u16, BasicType::Int16;
    i32 => u32, BasicType::Int32;
    i64 => u64, BasicType::Int64;
);

macro_rules! impl_float {
    ($($t:ty => $bits:ty, $basic:expr);* $(;)?) => {
        $(
            impl NumericType for $t {
                const BASIC_TYPE: BasicType = $basic;
                const IS_FLOAT: bool = true;
                const SORT_KEY_LEN: usize = std::mem::size_of::<$t>();

                fn undefined() -> Self {
                    <$t>::NAN
                }

                fn is_undefined(self) -> bool {
                    self.is_nan()
                }

                fn defined_range_i64() -> (i64, i64) {
                    (i64::MIN, i64::MAX)
                }

                fn total_cmp(&self, other: &Self) -> Ordering {
                    <$t>::total_cmp(self, other)
                }

                fn key_bits(self) -> u64 {
                    self.to_bits() as u64
                }

                fn from_i64(v: i64) -> Self {
                    v as $t
                }

                fn from_f64(v: f64) -> Self {
                    v as $t
                }

                fn to_i64(self) -> i64 {
                    self as i64
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn to_value(self) -> Value {
                    Value::Float(self as f64)
                }

                fn parse(s: &str) -> Option<Self> {
                    s.trim().parse::<$t>().ok()
                }

                fn write_sort_key(self, out: &mut [u8]) {
                    let bits = self.to_bits();
                    let sign = 1 << (<$bits>::BITS - 1);
                    let ordered = if bits & sign != 0 { !bits } else { bits ^ sign };
                    out[..Self::SORT_KEY_LEN].copy_from_slice(&ordered.to_be_bytes());
                }

                fn apply(self, op: ArithmeticOp, operand: f64) -> Self {
                    op.apply_f64(self as f64, operand) as $t
                }
            }
        )*
    };
}

impl_float!(
    f32 => u32, BasicType::Float;
    f64 => u64, BasicType::Double;
);

impl NumericType for bool {
    const BASIC_TYPE: BasicType = BasicType::Bool;
    const IS_FLOAT: bool = false;
    const SORT_KEY_LEN: usize = 1;

    fn undefined() -> Self {
        false
    }

    fn is_undefined(self) -> bool {
        false
    }

    fn defined_range_i64() -> (i64, i64) {
        (0, 1)
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn key_bits(self) -> u64 {
        self as u64
    }

    fn from_i64(v: i64) -> Self {
        v != 0
    }

    fn from_f64(v: f64) -> Self {
        v != 0.0
    }

    fn to_i64(self) -> i64 {
        self as i64
    }

    fn to_f64(self) -> f64 {
        if self { 1.0 } else { 0.0 }
    }

    fn to_value(self) -> Value {
        Value::Bool(self)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }

    fn write_sort_key(self, out: &mut [u8]) {
        out[0] = self as u8;
    }

    fn apply(self, op: ArithmeticOp, operand: f64) -> Self {
        op.apply_i64(self as i64, operand) != 0
    }
}

/// Total-order wrapper so floats can key ordered and hashed dictionaries
#[derive(Debug, Clone, Copy)]
pub struct OrdKey<T>(pub T);

impl<T: NumericType> PartialEq for OrdKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl<T: NumericType> Eq for OrdKey<T> {}

impl<T: NumericType> PartialOrd for OrdKey<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: NumericType> Ord for OrdKey<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl<T: NumericType> Hash for OrdKey<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key_bits().hash(state);
    }
}

/// Values an enum store can hold
pub trait EnumValue: Send + Sync + 'static {
    /// Storage element in the value buffers
    type Elem: Copy + Send + Sync + 'static;
    /// Borrowed form handed out by readers
    type Ref<'a>: Copy + fmt::Debug;
    type Owned: Clone + fmt::Debug + Send + Sync + 'static;
    /// Dictionary key; folded for uncased strings
    type Key: Ord + Hash + Clone + fmt::Debug + Send + Sync + 'static;

    fn encode(value: Self::Ref<'_>, out: &mut Vec<Self::Elem>);
    fn decode(elems: &[Self::Elem]) -> Self::Ref<'_>;
    fn make_key(value: Self::Ref<'_>, folded: bool) -> Self::Key;
    fn to_owned_value(value: Self::Ref<'_>) -> Self::Owned;
    fn borrow_owned(value: &Self::Owned) -> Self::Ref<'_>;
    fn to_value(value: Self::Ref<'_>) -> Value;
    fn owned_from_value(value: &Value) -> Option<Self::Owned>;

    /// Whether a single-value attribute treats this value as absent
    fn is_undefined_value(_value: Self::Ref<'_>) -> bool {
        false
    }

    /// Arithmetic update of a stored value; `None` leaves it untouched.
    fn apply_arithmetic(_value: &Self::Owned, _op: ArithmeticOp, _operand: f64) -> Option<Self::Owned> {
        None
    }

    /// Byte form of a key, for building an fst index over the frozen dictionary
    fn key_bytes(_key: &Self::Key) -> Option<&[u8]> {
        None
    }

    fn key_heap_bytes(_key: &Self::Key) -> usize {
        0
    }
}

impl<T: NumericType> EnumValue for T {
    type Elem = T;
    type Ref<'a> = T;
    type Owned = T;
    type Key = OrdKey<T>;

    fn encode(value: T, out: &mut Vec<T>) {
        out.push(value);
    }

    fn decode(elems: &[T]) -> T {
        elems.first().copied().unwrap_or_else(T::undefined)
    }

    fn make_key(value: T, _folded: bool) -> OrdKey<T> {
        OrdKey(value)
    }

    fn to_owned_value(value: T) -> T {
        value
    }

    fn borrow_owned(value: &T) -> T {
        *value
    }

    fn to_value(value: T) -> Value {
        value.to_value()
    }

    fn owned_from_value(value: &Value) -> Option<T> {
        T::from_value(value)
    }

    fn is_undefined_value(value: T) -> bool {
        value.is_undefined()
    }

    fn apply_arithmetic(value: &T, op: ArithmeticOp, operand: f64) -> Option<T> {
        (!value.is_undefined()).then(|| value.apply(op, operand))
    }
}

/// Unicode lowercase fold used for uncased dictionaries and matching
pub fn fold_case(s: &str) -> String {
    s.to_lowercase()
}

impl EnumValue for str {
    type Elem = u8;
    type Ref<'a> = &'a str;
    type Owned = String;
    type Key = String;

    fn encode(value: &str, out: &mut Vec<u8>) {
        out.extend_from_slice(value.as_bytes());
        out.push(0);
    }

    fn decode(elems: &[u8]) -> &str {
        let bytes = match elems.split_last() {
            Some((_, body)) => body,
            None => return "",
        };
        // SAFETY: buffers only ever receive bytes written by `encode` from a &str
        unsafe { std::str::from_utf8_unchecked(bytes) }
    }

    fn make_key(value: &str, folded: bool) -> String {
        if folded { fold_case(value) } else { value.to_string() }
    }

    fn to_owned_value(value: &str) -> String {
        value.to_string()
    }

    fn borrow_owned(value: &String) -> &str {
        value.as_str()
    }

    fn to_value(value: &str) -> Value {
        Value::String(value.to_string())
    }

    fn owned_from_value(value: &Value) -> Option<String> {
        value.as_str().map(str::to_string)
    }

    fn is_undefined_value(value: &str) -> bool {
        value.is_empty()
    }

    fn key_bytes(key: &String) -> Option<&[u8]> {
        Some(key.as_bytes())
    }

    fn key_heap_bytes(key: &String) -> usize {
        key.capacity()
    }
}
