//! The typed value representation produced by the dynamic data generator
//! and written out as SQL literals.

use chrono::{NaiveDateTime, Timelike};
use std::{
    cmp::Ordering,
    fmt,
    io::{self, Write},
    slice,
    str::from_utf8,
};

/// Implementation of a number: kept as either an exact integer or a float so
/// formatting never loses integer precision for `bigint`-ish columns.
#[derive(Copy, Clone, Debug)]
enum N {
    Int(i128),
    Float(f64),
}

/// An SQL number (integer or floating point).
#[derive(Copy, Clone, Debug)]
pub struct Number(N);

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            N::Int(v) => v.fmt(f),
            N::Float(v) => {
                let mut output = ryu::Buffer::new();
                f.write_str(output.format(v))
            }
        }
    }
}

impl Number {
    /// A decimal number with `scale` digits after the point, formatted as a
    /// plain (non-scientific) literal — used for `Decimal(p, s)` columns.
    pub fn decimal(integer_part: i128, fractional: u64, scale: u32) -> Self {
        let divisor = 10i128.pow(scale);
        let sign = if integer_part < 0 { -1.0 } else { 1.0 };
        let value = integer_part as f64 + sign * (fractional as f64) / (divisor as f64);
        Number(N::Float(value))
    }

    /// Converts this number into a nullable boolean using SQL rules.
    pub fn to_sql_bool(&self) -> Option<bool> {
        match self.0 {
            N::Int(v) => Some(v != 0),
            N::Float(v) if v.is_nan() => None,
            N::Float(v) => Some(v != 0.0),
        }
    }
}

macro_rules! impl_from_int_for_number {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Number {
            fn from(value: $ty) -> Self {
                Number(N::Int(value.into()))
            }
        })*
    }
}
impl_from_int_for_number!(u8, u16, u32, u64, i8, i16, i32, i64, bool);

impl From<f32> for Number {
    fn from(value: f32) -> Self {
        Number(N::Float(value.into()))
    }
}
impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number(N::Float(value))
    }
}
impl From<N> for f64 {
    fn from(n: N) -> Self {
        match n {
            N::Int(i) => i as Self,
            N::Float(f) => f,
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self.0, other.0) {
            (N::Int(a), N::Int(b)) => a == b,
            (a, b) => f64::from(a) == f64::from(b),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.0, other.0) {
            (N::Int(a), N::Int(b)) => a.partial_cmp(&b),
            (a, b) => f64::from(a).partial_cmp(&f64::from(b)),
        }
    }
}

/// An SQL string (UTF-8 or byte-string).
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Bytes {
    /// The raw bytes.
    bytes: Vec<u8>,
    /// Whether the bytes contained non-UTF-8 content.
    is_binary: bool,
}

impl Bytes {
    /// Wraps a `String` as a textual `Bytes` value.
    pub fn from_string(s: String) -> Self {
        Bytes {
            bytes: s.into_bytes(),
            is_binary: false,
        }
    }

    /// Writes the content using SQL format.
    pub fn write_sql(&self, mut output: impl Write) -> Result<(), io::Error> {
        if self.is_binary {
            output.write_all(b"X'")?;
            for b in &self.bytes {
                write!(output, "{:02X}", b)?;
            }
        } else {
            output.write_all(b"'")?;
            for b in &self.bytes {
                output.write_all(if *b == b'\'' { b"''" } else { slice::from_ref(b) })?;
            }
        }
        output.write_all(b"'")?;
        Ok(())
    }
}

/// A typed, generated column value.
///
/// Extends the base `dbgen`-style scalar set (`Null`/`Number`/`Bytes`/
/// `Timestamp`/`Interval`) with the shapes the dynamic data generator
/// additionally needs: `Json`, `Uuid`, `Inet`, and `Array`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Null.
    Null,
    /// A number.
    Number(Number),
    /// A string or byte string.
    Bytes(Bytes),
    /// A timestamp without timezone.
    Timestamp(NaiveDateTime),
    /// A time interval, as a multiple of microseconds.
    Interval(i64),
    /// A JSON value, pre-serialized to its textual form.
    Json(serde_json::Value),
    /// A v4 UUID, stored in its canonical hyphenated textual form.
    Uuid(String),
    /// An IPv4 or IPv6 address literal.
    Inet(String),
    /// An array literal, rendered with SQL `{…}` array syntax.
    Array(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut output = Vec::new();
        self.write_sql(&mut output).map_err(|_| fmt::Error)?;
        let s = String::from_utf8(output).map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}

impl Value {
    /// Writes the SQL representation of this value into a write stream.
    pub fn write_sql(&self, mut output: impl Write) -> Result<(), io::Error> {
        match self {
            Value::Null => {
                output.write_all(b"NULL")?;
            }
            Value::Number(number) => {
                write!(output, "{}", number)?;
            }
            Value::Bytes(bytes) => {
                bytes.write_sql(output)?;
            }
            Value::Timestamp(timestamp) => {
                write!(
                    output,
                    "'{}",
                    timestamp.format("%Y-%m-%d %H:%M:%S"),
                )?;
                let ns = timestamp.nanosecond();
                if ns != 0 {
                    write!(output, ".{:06}", ns / 1000)?;
                }
                output.write_all(b"'")?;
            }
            Value::Interval(interval) => {
                write!(output, "INTERVAL '{} microsecond'", interval)?;
            }
            Value::Json(json) => {
                let bytes = Bytes::from_string(json.to_string());
                bytes.write_sql(output)?;
            }
            Value::Uuid(uuid) => {
                write!(output, "'{}'", uuid)?;
            }
            Value::Inet(inet) => {
                write!(output, "'{}'", inet)?;
            }
            Value::Array(items) => {
                output.write_all(b"'{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        output.write_all(b",")?;
                    }
                    write!(output, "{}", array_element(item))?;
                }
                output.write_all(b"}'")?;
            }
        }
        Ok(())
    }

    /// Compares two values using the rules common among SQL implementations:
    /// comparing against `NULL` yields `None`; numbers, timestamps, and
    /// intervals compare by value; strings compare by UTF-8 binary
    /// collation. Cross-type comparisons are not meaningful and return
    /// `None`, matching the conservative stance the comparator (§4.10) takes
    /// toward its own row normalization.
    pub fn sql_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.bytes.partial_cmp(&b.bytes),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.partial_cmp(b),
            (Value::Interval(a), Value::Interval(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

fn array_element(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_owned(),
        Value::Bytes(b) if !b.is_binary => {
            format!("\"{}\"", String::from_utf8_lossy(&b.bytes).replace('"', "\\\""))
        }
        other => other.to_string(),
    }
}

impl<T: Into<Number>> From<T> for Value {
    fn from(value: T) -> Self {
        Value::Number(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Bytes(Bytes {
            is_binary: false,
            bytes: value.into_bytes(),
        })
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(Bytes {
            is_binary: from_utf8(&bytes).is_err(),
            bytes,
        })
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, T::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_formats_as_null() {
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    #[test]
    fn string_escapes_single_quotes() {
        let v: Value = "o'brien".to_owned().into();
        assert_eq!(v.to_string(), "'o''brien'");
    }

    #[test]
    fn array_renders_braces() {
        let v = Value::Array(vec![1i64.into(), 2i64.into(), Value::Null]);
        assert_eq!(v.to_string(), "'{1,2,NULL}'");
    }

    #[test]
    fn sql_cmp_with_null_is_unknown() {
        assert_eq!(Value::Null.sql_cmp(&Value::from(1i64)), None);
    }

    #[test]
    fn sql_cmp_orders_numbers() {
        assert_eq!(Value::from(1i64).sql_cmp(&Value::from(2i64)), Some(Ordering::Less));
    }
}
