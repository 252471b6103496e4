//! Term model and JSON mapping

use crate::error::{EtfError, EtfResult};
use serde_json::{Map, Number, Value};

/// Leading byte of every encoded stream
pub const FORMAT_VERSION: u8 = 131;

/// Type tags understood by the codec
pub mod tag {
    pub const NEW_FLOAT: u8 = 70;
    pub const SMALL_INTEGER: u8 = 97;
    pub const INTEGER: u8 = 98;
    pub const ATOM: u8 = 100;
    pub const NIL: u8 = 106;
    pub const STRING: u8 = 107;
    pub const LIST: u8 = 108;
    pub const BINARY: u8 = 109;
    pub const SMALL_BIG: u8 = 110;
    pub const SMALL_ATOM: u8 = 115;
    pub const MAP: u8 = 116;
    pub const ATOM_UTF8: u8 = 118;
    pub const SMALL_ATOM_UTF8: u8 = 119;
}

/// A decoded term
///
/// Atom names and binaries keep their raw bytes; conversion to text happens
/// only when mapping onto JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Float(f64),
    SmallInt(u8),
    Int(i32),
    /// Small_Big with at most eight base-256 digits
    BigInt { negative: bool, magnitude: u64 },
    Atom(Vec<u8>),
    Nil,
    /// STRING_EXT: a list of small integers carried as bytes
    String(Vec<u8>),
    List(Vec<Term>),
    Binary(Vec<u8>),
    Map(Vec<(Term, Term)>),
}

impl Term {
    /// Build an atom from its name
    pub fn atom(name: &str) -> Self {
        Self::Atom(name.as_bytes().to_vec())
    }

    /// Build the smallest integer term holding `value`
    pub fn from_i64(value: i64) -> Self {
        if let Ok(small) = u8::try_from(value) {
            Self::SmallInt(small)
        } else if let Ok(int) = i32::try_from(value) {
            Self::Int(int)
        } else {
            Self::BigInt {
                negative: value < 0,
                magnitude: value.unsigned_abs(),
            }
        }
    }

    /// Build the smallest integer term holding `value`
    pub fn from_u64(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(signed) => Self::from_i64(signed),
            Err(_) => Self::BigInt {
                negative: false,
                magnitude: value,
            },
        }
    }

    /// Map the term onto a JSON value
    ///
    /// Atoms and binaries spelling `nil`/`null`/`true`/`false` become the
    /// matching JSON literal. Map keys that are not strings use the JSON text
    /// of the key.
    pub fn to_json(&self) -> EtfResult<Value> {
        Ok(match self {
            Self::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .ok_or(EtfError::NonFiniteFloat)?,
            Self::SmallInt(n) => Value::from(*n),
            Self::Int(n) => Value::from(*n),
            Self::BigInt {
                negative,
                magnitude,
            } => big_to_json(*negative, *magnitude),
            Self::Atom(bytes) => literal_or(bytes, || Ok(latin1(bytes)))?,
            Self::Binary(bytes) => literal_or(bytes, || Ok(binary_text(bytes)))?,
            Self::String(bytes) => Value::String(latin1(bytes)),
            Self::Nil => Value::Array(Vec::new()),
            Self::List(items) => Value::Array(
                items
                    .iter()
                    .map(Term::to_json)
                    .collect::<EtfResult<Vec<_>>>()?,
            ),
            Self::Map(pairs) => {
                let mut object = Map::new();
                for (key, value) in pairs {
                    let key = match key.to_json()? {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    object.insert(key, value.to_json()?);
                }
                Value::Object(object)
            }
        })
    }

    /// Build a term tree from a JSON value
    ///
    /// `null` and booleans become atoms, strings become binaries, the empty
    /// array becomes Nil and object keys become binaries.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::atom("nil"),
            Value::Bool(true) => Self::atom("true"),
            Value::Bool(false) => Self::atom("false"),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Self::from_u64(u)
                } else if let Some(i) = n.as_i64() {
                    Self::from_i64(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => Self::Binary(s.as_bytes().to_vec()),
            Value::Array(items) if items.is_empty() => Self::Nil,
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(object) => Self::Map(
                object
                    .iter()
                    .map(|(k, v)| (Self::Binary(k.as_bytes().to_vec()), Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn literal_or(bytes: &[u8], text: impl FnOnce() -> EtfResult<String>) -> EtfResult<Value> {
    Ok(match bytes {
        b"nil" | b"null" => Value::Null,
        b"true" => Value::Bool(true),
        b"false" => Value::Bool(false),
        _ => Value::String(text()?),
    })
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// UTF-8 when the bytes are valid, otherwise each byte as one Latin-1 char
fn binary_text(bytes: &[u8]) -> String {
    std::str::from_utf8(bytes).map_or_else(|_| latin1(bytes), str::to_owned)
}

fn big_to_json(negative: bool, magnitude: u64) -> Value {
    if !negative {
        return Value::from(magnitude);
    }
    // i64::MIN has no positive counterpart, so go through i128
    match i64::try_from(-i128::from(magnitude)) {
        Ok(n) => Value::from(n),
        Err(_) => Number::from_f64(-(magnitude as f64)).map_or(Value::Null, Value::Number),
    }
}
