//! Readiness polling over an agent's connections
//!
//! One [`Multiplexer::poll`] call is one short, bounded pass: interests are
//! refreshed, readiness is collected for at most [`POLL_TIMEOUT`], and each
//! ready connection is pumped. It is not an event loop; the owning agent
//! calls it once per iteration.

use super::Connection;
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io;
use std::time::Duration;

/// Upper bound on one poll wait
pub const POLL_TIMEOUT: Duration = Duration::from_millis(1);

const EVENT_CAPACITY: usize = 1024;

/// Anything that owns a [`Connection`] the multiplexer can drive
pub trait Multiplexed {
    fn connection_mut(&mut self) -> &mut Connection;
}

impl Multiplexed for Connection {
    fn connection_mut(&mut self) -> &mut Connection {
        self
    }
}

/// Per-agent poller
pub struct Multiplexer {
    poll: Poll,
    events: Events,
    timeout: Duration,
}

impl Multiplexer {
    pub fn new() -> io::Result<Self> {
        Self::with_timeout(POLL_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENT_CAPACITY),
            timeout,
        })
    }

    /// Run one polling pass
    ///
    /// `on_input` is called for every item whose read appended bytes. Returns
    /// the tokens of items whose connection failed, hung up, or was closed;
    /// the caller disconnects and removes them (see [`Multiplexer::deregister`]).
    pub fn poll<T, F>(&mut self, items: &mut HashMap<Token, T>, mut on_input: F) -> io::Result<Vec<Token>>
    where
        T: Multiplexed,
        F: FnMut(Token, &mut T),
    {
        let mut failed = Vec::new();

        for (&token, item) in items.iter_mut() {
            let conn = item.connection_mut();
            if !conn.is_connected() {
                failed.push(token);
                continue;
            }
            if let Err(e) = self.refresh_interest(token, conn) {
                tracing::debug!(peer = %conn.peer_addr(), error = %e, "Failed to register connection");
                failed.push(token);
            }
        }

        match self.poll.poll(&mut self.events, Some(self.timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(failed),
            Err(e) => return Err(e),
        }

        for event in &self.events {
            let token = event.token();
            let Some(item) = items.get_mut(&token) else {
                continue;
            };

            if event.is_error() {
                failed.push(token);
                continue;
            }

            if event.is_writable() {
                if let Err(e) = item.connection_mut().pump_write() {
                    tracing::debug!(error = %e, "Write failed");
                    failed.push(token);
                    continue;
                }
            }

            if event.is_readable() || event.is_read_closed() {
                match item.connection_mut().pump_read() {
                    Ok(0) => {}
                    Ok(_) => on_input(token, item),
                    Err(e) => {
                        tracing::debug!(error = %e, "Read failed");
                        failed.push(token);
                        continue;
                    }
                }

                // Replies, including TLS handshake records, go out in the same pass
                let conn = item.connection_mut();
                if conn.is_connected() && conn.has_pending_output() {
                    if let Err(e) = conn.pump_write() {
                        tracing::debug!(error = %e, "Write failed");
                        failed.push(token);
                        continue;
                    }
                }
            }

            let conn = item.connection_mut();
            if conn.is_peer_closed() || !conn.is_connected() {
                failed.push(token);
            }
        }

        failed.sort_unstable();
        failed.dedup();
        Ok(failed)
    }

    /// Remove a connection's socket from the poller
    pub fn deregister(&mut self, conn: &mut Connection) {
        if conn.interest.take().is_some() {
            if let Err(e) = self.poll.registry().deregister(conn.socket_mut()) {
                tracing::trace!(error = %e, "Deregister failed");
            }
        }
    }

    /// Read interest always; write interest only while output is pending
    ///
    /// Re-registering while output is pending re-arms the writable edge.
    fn refresh_interest(&mut self, token: Token, conn: &mut Connection) -> io::Result<()> {
        let wanted = if conn.has_pending_output() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };

        match conn.interest {
            None => self.poll.registry().register(conn.socket_mut(), token, wanted)?,
            Some(current) if current != wanted || conn.has_pending_output() => {
                self.poll.registry().reregister(conn.socket_mut(), token, wanted)?;
            }
            Some(_) => return Ok(()),
        }
        conn.interest = Some(wanted);
        Ok(())
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
