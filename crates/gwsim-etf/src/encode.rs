//! Term to binary encoding

use crate::error::{EtfError, EtfResult};
use crate::term::{tag, Term, FORMAT_VERSION};
use serde_json::Value;

/// Encode a term, prefixed with the format version byte
pub fn encode(term: &Term) -> EtfResult<Vec<u8>> {
    let mut out = Vec::with_capacity(64);
    out.push(FORMAT_VERSION);
    write_term(&mut out, term)?;
    Ok(out)
}

/// Encode a JSON value
pub fn encode_from_json(value: &Value) -> EtfResult<Vec<u8>> {
    encode(&Term::from_json(value))
}

fn write_term(out: &mut Vec<u8>, term: &Term) -> EtfResult<()> {
    match term {
        Term::SmallInt(n) => out.extend_from_slice(&[tag::SMALL_INTEGER, *n]),
        Term::Int(n) => {
            out.push(tag::INTEGER);
            out.extend_from_slice(&n.to_be_bytes());
        }
        Term::Float(f) => {
            if !f.is_finite() {
                return Err(EtfError::NonFiniteFloat);
            }
            out.push(tag::NEW_FLOAT);
            out.extend_from_slice(&f.to_be_bytes());
        }
        Term::BigInt {
            negative,
            magnitude,
        } => {
            let digits = magnitude.to_le_bytes();
            let count = digits.iter().rposition(|&d| d != 0).map_or(0, |i| i + 1);
            out.extend_from_slice(&[tag::SMALL_BIG, count as u8, u8::from(*negative)]);
            out.extend_from_slice(&digits[..count]);
        }
        Term::Atom(name) => {
            if let Ok(len) = u8::try_from(name.len()) {
                out.extend_from_slice(&[tag::SMALL_ATOM, len]);
            } else {
                let len = u16::try_from(name.len())
                    .map_err(|_| EtfError::Unsupported(format!("atom of {} bytes", name.len())))?;
                out.push(tag::ATOM);
                out.extend_from_slice(&len.to_be_bytes());
            }
            out.extend_from_slice(name);
        }
        Term::Nil => out.push(tag::NIL),
        Term::String(bytes) => {
            let len = u16::try_from(bytes.len())
                .map_err(|_| EtfError::Unsupported(format!("string of {} bytes", bytes.len())))?;
            out.push(tag::STRING);
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(bytes);
        }
        Term::Binary(bytes) => {
            out.push(tag::BINARY);
            out.extend_from_slice(&length(bytes.len())?.to_be_bytes());
            out.extend_from_slice(bytes);
        }
        Term::List(items) => {
            out.push(tag::LIST);
            out.extend_from_slice(&length(items.len())?.to_be_bytes());
            for item in items {
                write_term(out, item)?;
            }
            out.push(tag::NIL);
        }
        Term::Map(pairs) => {
            out.push(tag::MAP);
            out.extend_from_slice(&length(pairs.len())?.to_be_bytes());
            for (key, value) in pairs {
                write_term(out, key)?;
                write_term(out, value)?;
            }
        }
    }
    Ok(())
}

fn length(len: usize) -> EtfResult<u32> {
    u32::try_from(len).map_err(|_| EtfError::Unsupported(format!("length {len} exceeds u32")))
}
