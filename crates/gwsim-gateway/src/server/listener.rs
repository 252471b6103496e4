//! Server listener
//!
//! Accepts sockets on its own thread, wraps each in a [`Connection`] (with TLS
//! when configured) and hands it by value to an agent, round-robin. The shard
//! is unknown until Identify, after which the session may move again.

use super::Handoff;
use crate::connection::Connection;
use gwsim_common::{AppError, AppResult};
use rustls::ServerConfig;
use std::io;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Pause between accept attempts when nothing is pending
const ACCEPT_BACKOFF: Duration = Duration::from_millis(5);

/// The accept loop
pub struct Listener {
    socket: TcpListener,
    tls: Option<Arc<ServerConfig>>,
    agents: Vec<UnboundedSender<Handoff>>,
    cancel: CancellationToken,
    accepted: usize,
}

impl Listener {
    /// `socket` must already be bound
    pub fn new(
        socket: TcpListener,
        tls: Option<Arc<ServerConfig>>,
        agents: Vec<UnboundedSender<Handoff>>,
        cancel: CancellationToken,
    ) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            tls,
            agents,
            cancel,
            accepted: 0,
        })
    }

    /// Run the accept loop on a dedicated thread
    pub fn spawn(self) -> AppResult<JoinHandle<()>> {
        thread::Builder::new()
            .name("gwsim-listener".to_string())
            .spawn(move || self.run())
            .map_err(|e| AppError::Thread(format!("failed to spawn listener: {e}")))
    }

    /// Accept until cancelled; accept errors are logged and retried
    pub fn run(mut self) {
        tracing::info!(
            addr = ?self.socket.local_addr().ok(),
            tls = self.tls.is_some(),
            agents = self.agents.len(),
            "Listener started"
        );

        while !self.cancel.is_cancelled() {
            match self.socket.accept() {
                Ok((stream, peer)) => {
                    let connection = match &self.tls {
                        Some(config) => Connection::tls(stream, peer, Arc::clone(config)),
                        None => Connection::plain(stream, peer),
                    };
                    match connection {
                        Ok(connection) => self.hand_off(connection),
                        Err(e) => tracing::warn!(peer = %peer, error = %e, "Failed to set up connection"),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_BACKOFF),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    thread::sleep(ACCEPT_BACKOFF);
                }
            }
        }

        tracing::info!(accepted = self.accepted, "Listener stopped");
    }

    fn hand_off(&mut self, connection: Connection) {
        if self.agents.is_empty() {
            tracing::error!("No agents to accept connections");
            return;
        }
        let agent = self.accepted % self.agents.len();
        self.accepted = self.accepted.wrapping_add(1);

        let peer = connection.peer_addr();
        match self.agents.get(agent).map(|tx| tx.send(Handoff::Accepted(connection))) {
            Some(Ok(())) => tracing::debug!(peer = %peer, agent, "Connection accepted"),
            _ => tracing::warn!(peer = %peer, agent, "Agent is gone; connection dropped"),
        }
    }
}
