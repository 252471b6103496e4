//! Connection management
//!
//! Non-blocking client sockets, the per-agent readiness poller, and the
//! gateway session state machine built on top of them.

mod connection;
mod multiplexer;
mod session;

pub use connection::{Connection, ConnectionError, WRITE_CHUNK_SIZE};
pub use multiplexer::{Multiplexed, Multiplexer, POLL_TIMEOUT};
pub use session::{GatewaySession, SessionIdentity, SessionPhase, CLOSE_GRACE_PERIOD};
