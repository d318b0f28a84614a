//! Typed leaf values.

use core::fmt;

/// A leaf value: a scalar, a vector of scalars or a matrix of scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Str(String),
    Vector(Vec<Value>),
    Matrix(Vec<Vec<Value>>),
}

impl Value {
    /// Build a vector, promoting a list of vectors to a matrix.
    pub fn vector(items: Vec<Value>) -> Self {
        if !items.is_empty() && items.iter().all(|v| matches!(v, Value::Vector(_))) {
            let rows = items
                .into_iter()
                .map(|v| match v {
                    Value::Vector(row) => row,
                    other => vec![other],
                })
                .collect();
            Value::Matrix(rows)
        } else {
            Value::Vector(items)
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Vector(_) | Value::Matrix(_))
    }

    /// 0 for scalars, 1 for vectors, 2 for matrices.
    pub fn number_of_dimensions(&self) -> u8 {
        match self {
            Value::Vector(_) => 1,
            Value::Matrix(_) => 2,
            _ => 0,
        }
    }

    /// Total number of scalar elements.
    pub fn number_of_elements(&self) -> usize {
        match self {
            Value::Vector(items) => items.len(),
            Value::Matrix(rows) => rows.iter().map(Vec::len).sum(),
            _ => 1,
        }
    }

    /// Scalar elements in row-major order.
    pub fn elements(&self) -> Vec<&Value> {
        match self {
            Value::Vector(items) => items.iter().collect(),
            Value::Matrix(rows) => rows.iter().flatten().collect(),
            scalar => vec![scalar],
        }
    }

    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(*v as i128),
            Value::UInt(v) => Some(*v as i128),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i128),
            Value::Bool(v) => Some(*v as i128),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::Vector(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
            Value::Matrix(rows) => {
                f.write_str("{")?;
                for row in rows {
                    write!(f, "{}", Value::Vector(row.clone()))?;
                }
                f.write_str("}")
            }
        }
    }
}

macro_rules! value_from_int {
    ($variant:ident, $wide:ty, $($t:ty),+) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v as $wide)
            }
        })+
    };
}

value_from_int!(Int, i64, i8, i16, i32, i64);
value_from_int!(UInt, u64, u8, u16, u32, u64, usize);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Str(v.clone())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::vector(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(items: [T; N]) -> Self {
        Value::vector(items.into_iter().map(Into::into).collect())
    }
}

/// Conversion out of a leaf value, used by `ConfigTree::read`.
pub trait FromValue: Sized {
    /// Human readable name used in type mismatch errors.
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! from_value_int {
    ($($t:ty),+) => {
        $(impl FromValue for $t {
            const EXPECTED: &'static str = stringify!($t);

            fn from_value(value: &Value) -> Option<Self> {
                value.as_i128().and_then(|v| <$t>::try_from(v).ok())
            }
        })+
    };
}

from_value_int!(u8, u16, u32, u64, usize, i8, i16, i32, i64);

impl FromValue for f64 {
    const EXPECTED: &'static str = "f64";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for f32 {
    const EXPECTED: &'static str = "f32";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64().map(|v| v as f32)
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "bool";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            other => other.as_i128().map(|v| v != 0),
        }
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "string";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(s.clone()),
            Value::Vector(_) | Value::Matrix(_) => None,
            other => Some(other.to_string()),
        }
    }
}

impl FromValue for Value {
    const EXPECTED: &'static str = "value";

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    const EXPECTED: &'static str = "vector";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Vector(items) => items.iter().map(T::from_value).collect(),
            Value::Matrix(rows) => rows
                .iter()
                .map(|row| T::from_value(&Value::Vector(row.clone())))
                .collect(),
            scalar => T::from_value(scalar).map(|v| vec![v]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_vectors_become_matrix() {
        let v = Value::from(vec![vec![0_u32, 10], vec![15, 20]]);
        assert_eq!(v.number_of_dimensions(), 2);
        assert_eq!(v.number_of_elements(), 4);
        let back: Vec<Vec<u32>> = FromValue::from_value(&v).unwrap();
        assert_eq!(back, vec![vec![0, 10], vec![15, 20]]);
    }

    #[test]
    fn integer_reads_are_range_checked() {
        assert_eq!(u8::from_value(&Value::Int(255)), Some(255));
        assert_eq!(u8::from_value(&Value::Int(256)), None);
        assert_eq!(u32::from_value(&Value::Int(-1)), None);
        assert_eq!(i32::from_value(&Value::Str("-4".into())), Some(-4));
    }

    #[test]
    fn scalar_reads_as_single_element_vector() {
        let v: Vec<f32> = FromValue::from_value(&Value::Float(1.5)).unwrap();
        assert_eq!(v, vec![1.5]);
    }

    #[test]
    fn display_uses_brace_syntax() {
        let v = Value::from(vec![1_i32, 2, 3]);
        assert_eq!(v.to_string(), "{1 2 3}");
    }
}
