//! # gwsim-etf
//!
//! A bounds-checked codec for the subset of Erlang's External Term Format
//! spoken by the gateway, plus lossless interchange with JSON values.
//!
//! ```
//! use serde_json::json;
//!
//! let bytes = gwsim_etf::encode_from_json(&json!({"op": 1, "d": null})).unwrap();
//! assert_eq!(bytes[0], gwsim_etf::FORMAT_VERSION);
//! assert_eq!(gwsim_etf::decode_to_json(&bytes).unwrap(), r#"{"d":null,"op":1}"#);
//! ```

pub mod decode;
pub mod encode;
pub mod error;
pub mod term;

pub use decode::{decode, decode_to_json, decode_to_value};
pub use encode::{encode, encode_from_json};
pub use error::{EtfError, EtfResult};
pub use term::{tag, Term, FORMAT_VERSION};
