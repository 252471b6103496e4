//! Binary to term decoding
//!
//! Every length field is checked against the bytes actually remaining before
//! anything is allocated or read.

use crate::error::{EtfError, EtfResult};
use crate::term::{tag, Term, FORMAT_VERSION};
use serde_json::Value;

/// Deepest list/map nesting accepted from the wire
pub const MAX_DEPTH: usize = 256;

/// Decode one version-prefixed term, rejecting trailing bytes
pub fn decode(bytes: &[u8]) -> EtfResult<Term> {
    let mut reader = Reader::new(bytes);
    let version = reader.u8()?;
    if version != FORMAT_VERSION {
        return Err(EtfError::BadVersion(version));
    }

    let term = reader.term(0)?;
    match reader.remaining() {
        0 => Ok(term),
        n => Err(EtfError::TrailingBytes(n)),
    }
}

/// Decode a version-prefixed term into a JSON value
pub fn decode_to_value(bytes: &[u8]) -> EtfResult<Value> {
    decode(bytes)?.to_json()
}

/// Decode a version-prefixed term into JSON text
pub fn decode_to_json(bytes: &[u8]) -> EtfResult<String> {
    decode_to_value(bytes).map(|value| value.to_string())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, needed: usize) -> EtfResult<&'a [u8]> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(EtfError::TruncatedInput { needed, remaining });
        }
        let slice = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> EtfResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> EtfResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> EtfResult<u16> {
        self.array().map(u16::from_be_bytes)
    }

    fn u32(&mut self) -> EtfResult<u32> {
        self.array().map(u32::from_be_bytes)
    }

    fn term(&mut self, depth: usize) -> EtfResult<Term> {
        if depth > MAX_DEPTH {
            return Err(EtfError::NestingTooDeep(MAX_DEPTH));
        }

        let tag = self.u8()?;
        match tag {
            tag::SMALL_INTEGER => self.u8().map(Term::SmallInt),
            tag::INTEGER => self.array().map(|b| Term::Int(i32::from_be_bytes(b))),
            tag::NEW_FLOAT => self.array().map(|b| Term::Float(f64::from_be_bytes(b))),
            tag::SMALL_BIG => self.small_big(),
            tag::ATOM | tag::ATOM_UTF8 => {
                let len = self.u16()?;
                Ok(Term::Atom(self.take(len.into())?.to_vec()))
            }
            tag::SMALL_ATOM | tag::SMALL_ATOM_UTF8 => {
                let len = self.u8()?;
                Ok(Term::Atom(self.take(len.into())?.to_vec()))
            }
            tag::STRING => {
                let len = self.u16()?;
                Ok(Term::String(self.take(len.into())?.to_vec()))
            }
            tag::BINARY => {
                let len = self.u32()? as usize;
                Ok(Term::Binary(self.take(len)?.to_vec()))
            }
            tag::NIL => Ok(Term::Nil),
            tag::LIST => {
                let count = self.u32()? as usize;
                // Each element needs at least one byte
                let mut items = Vec::with_capacity(count.min(self.remaining()));
                for _ in 0..count {
                    items.push(self.term(depth + 1)?);
                }
                // The tail (normally Nil) is read and dropped
                self.term(depth + 1)?;
                Ok(Term::List(items))
            }
            tag::MAP => {
                let count = self.u32()? as usize;
                let mut pairs = Vec::with_capacity(count.min(self.remaining() / 2));
                for _ in 0..count {
                    let key = self.term(depth + 1)?;
                    let value = self.term(depth + 1)?;
                    pairs.push((key, value));
                }
                Ok(Term::Map(pairs))
            }
            other => Err(EtfError::UnknownTag(other)),
        }
    }

    fn small_big(&mut self) -> EtfResult<Term> {
        let digits = self.u8()?;
        let sign = self.u8()?;
        if digits > 8 {
            return Err(EtfError::BigIntTooLarge(digits));
        }

        let magnitude = self
            .take(digits.into())?
            .iter()
            .rev()
            .fold(0u64, |acc, &digit| (acc << 8) | u64::from(digit));
        Ok(Term::BigInt {
            negative: sign != 0,
            magnitude,
        })
    }
}
