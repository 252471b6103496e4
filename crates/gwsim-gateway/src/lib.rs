//! # gwsim-gateway
//!
//! Gateway protocol engine: a TLS socket server that upgrades connections to
//! WebSocket, speaks JSON or ETF, and drives each connection through
//! hello, identify, ready, heartbeat and guild dispatch on a pool of
//! single-threaded session agents.

pub mod connection;
pub mod events;
pub mod frame;
pub mod handlers;
pub mod handshake;
pub mod protocol;
pub mod server;

pub use server::Server;
