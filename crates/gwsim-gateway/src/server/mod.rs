//! Gateway server setup
//!
//! Binds the listening socket, loads the TLS context, and starts the
//! listener thread plus one thread per session agent.

mod agent;
mod listener;
mod state;
mod tls;

pub use agent::{Agent, Handoff};
pub use listener::Listener;
pub use state::{AgentState, ShardLayout};
pub use tls::{load_server_config, server_config};

#[cfg(test)]
pub(crate) use state::test_support;

use gwsim_common::{AppError, AppResult, GatewayConfig};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A running gateway: one listener thread and `agents.count` agent threads
pub struct Server {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    listener: Option<JoinHandle<()>>,
    agents: Vec<JoinHandle<()>>,
}

impl Server {
    /// Bind, spawn every thread, and return once the socket is accepting
    ///
    /// Port 0 binds an ephemeral port; see [`Server::local_addr`].
    pub fn start(config: GatewayConfig, cancel: CancellationToken) -> AppResult<Self> {
        let config = Arc::new(config);
        let tls = config
            .tls
            .as_ref()
            .map(load_server_config)
            .transpose()?;

        let addr = config.gateway.address();
        let socket = TcpListener::bind(&addr).map_err(|source| AppError::Bind {
            addr: addr.clone(),
            source,
        })?;
        let local_addr = socket.local_addr()?;

        let scheme = if tls.is_some() { "wss" } else { "ws" };
        let gateway_url = format!("{scheme}://{local_addr}");
        let shards = Arc::new(ShardLayout::new());

        let mut server = Self {
            local_addr,
            cancel: cancel.clone(),
            listener: None,
            agents: Vec::with_capacity(config.agents.count),
        };

        let (inboxes, receivers): (Vec<_>, Vec<_>) =
            (0..config.agents.count).map(|_| mpsc::unbounded_channel::<Handoff>()).unzip();
        for (agent_id, rx) in receivers.into_iter().enumerate() {
            let state = AgentState::new(agent_id, Arc::clone(&config), Arc::clone(&shards), gateway_url.clone());
            // Dropping `server` on error cancels the threads already running
            let handle = Agent::new(state, rx, inboxes.clone(), cancel.clone())?.spawn()?;
            server.agents.push(handle);
        }

        server.listener = Some(Listener::new(socket, tls, inboxes, cancel)?.spawn()?);

        tracing::info!(
            addr = %local_addr,
            url = %gateway_url,
            agents = config.agents.count,
            encoding = %config.protocol.default_encoding,
            api_version = config.protocol.api_version,
            "Gateway listening"
        );

        Ok(server)
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Token that stops the listener and every agent
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel and wait for every thread
    pub fn shutdown(self) -> AppResult<()> {
        self.cancel.cancel();
        self.join()
    }

    /// Wait for every thread to exit
    pub fn join(mut self) -> AppResult<()> {
        let mut panicked = Vec::new();

        if let Some(listener) = self.listener.take() {
            if listener.join().is_err() {
                panicked.push("listener".to_string());
            }
        }
        for (agent_id, handle) in std::mem::take(&mut self.agents).into_iter().enumerate() {
            if handle.join().is_err() {
                panicked.push(format!("agent {agent_id}"));
            }
        }

        if panicked.is_empty() {
            Ok(())
        } else {
            Err(AppError::Thread(format!("panicked: {}", panicked.join(", "))))
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        // Threads left unjoined still stop
        if self.listener.is_some() || !self.agents.is_empty() {
            self.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("agents", &self.agents.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
