//! Integration test utilities for the gateway emulator
//!
//! This crate starts a real listener on an ephemeral port and drives it with
//! a blocking WebSocket client over TLS or plain TCP.

pub mod helpers;

pub use helpers::*;
