//! Session agent
//!
//! One OS thread owning a disjoint set of sessions. Each iteration takes in
//! newly accepted connections and migrated sessions, runs one multiplexer
//! pass, moves freshly identified sessions to the agent owning their shard,
//! then gives every session one tick of outbound work.

use super::AgentState;
use crate::connection::{Connection, GatewaySession, Multiplexed, Multiplexer};
use gwsim_common::{AppError, AppResult};
use mio::Token;
use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

/// Multiplexer passes allowed for flushing Reconnect messages on shutdown
const SHUTDOWN_DRAIN_PASSES: usize = 200;

/// What arrives in an agent's inbox
pub enum Handoff {
    /// Fresh socket from the listener, assigned by accept order
    Accepted(Connection),
    /// Identified session moving to the agent that owns its shard
    Identified(Box<GatewaySession>),
}

impl std::fmt::Debug for Handoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted(conn) => f.debug_tuple("Accepted").field(&conn.peer_addr()).finish(),
            Self::Identified(session) => f.debug_tuple("Identified").field(session).finish(),
        }
    }
}

/// A session agent and the sessions it owns
pub struct Agent {
    state: AgentState,
    inbox: UnboundedReceiver<Handoff>,
    /// Every agent's inbox, indexed by agent id (this one included)
    peers: Vec<UnboundedSender<Handoff>>,
    cancel: CancellationToken,
    multiplexer: Multiplexer,
    sessions: HashMap<Token, GatewaySession>,
    next_token: usize,
}

impl Agent {
    pub fn new(
        state: AgentState,
        inbox: UnboundedReceiver<Handoff>,
        peers: Vec<UnboundedSender<Handoff>>,
        cancel: CancellationToken,
    ) -> AppResult<Self> {
        Ok(Self {
            state,
            inbox,
            peers,
            cancel,
            multiplexer: Multiplexer::new()?,
            sessions: HashMap::new(),
            next_token: 0,
        })
    }

    /// Run the agent loop on a dedicated thread
    pub fn spawn(self) -> AppResult<JoinHandle<()>> {
        let name = format!("gwsim-agent-{}", self.state.agent_id());
        thread::Builder::new()
            .name(name)
            .spawn(move || self.run())
            .map_err(|e| AppError::Thread(format!("failed to spawn agent: {e}")))
    }

    /// Loop until cancelled, then ask clients to reconnect and close everything
    pub fn run(mut self) {
        tracing::info!(agent = self.state.agent_id(), "Agent started");

        while !self.cancel.is_cancelled() {
            self.step();
        }

        self.shutdown();
        tracing::info!(agent = self.state.agent_id(), "Agent stopped");
    }

    /// One loop iteration
    pub fn step(&mut self) {
        self.accept_new();
        self.poll_once();
        if !self.cancel.is_cancelled() {
            self.place_identified();
        }

        let now = Instant::now();
        let state = &mut self.state;
        let finished: Vec<Token> = self
            .sessions
            .iter_mut()
            .filter_map(|(token, session)| session.tick(state, now).then_some(*token))
            .collect();
        for token in finished {
            self.remove(token);
        }
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn accept_new(&mut self) {
        loop {
            match self.inbox.try_recv() {
                Ok(Handoff::Accepted(connection)) => {
                    let token = self.allocate_token();
                    let session = GatewaySession::new(token, connection, &self.state.config().protocol);
                    self.sessions.insert(token, session);
                }
                Ok(Handoff::Identified(mut session)) => {
                    let token = self.allocate_token();
                    session.rebind(token);
                    if self.cancel.is_cancelled() {
                        session.request_reconnect();
                    }
                    tracing::debug!(
                        agent = self.state.agent_id(),
                        token = token.0,
                        session_id = ?session.identity().map(|i| &i.session_id),
                        "Session migrated in"
                    );
                    self.sessions.insert(token, *session);
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }

    fn allocate_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token = self.next_token.wrapping_add(1);
        token
    }

    /// Hand sessions that just identified to the agent owning their shard
    fn place_identified(&mut self) {
        let agent_id = self.state.agent_id();
        let agents = self.peers.len();
        if agents <= 1 {
            return;
        }

        let moving: Vec<(Token, usize)> = self
            .sessions
            .iter_mut()
            .filter_map(|(token, session)| {
                let index = session.take_placement()?;
                let target = index as usize % agents;
                (target != agent_id).then_some((*token, target))
            })
            .collect();

        for (token, target) in moving {
            let Some(mut session) = self.sessions.remove(&token) else {
                continue;
            };
            self.multiplexer.deregister(session.connection_mut());

            let Some(peer) = self.peers.get(target) else {
                self.sessions.insert(token, session);
                continue;
            };
            match peer.send(Handoff::Identified(Box::new(session))) {
                Ok(()) => tracing::debug!(agent = agent_id, token = token.0, target, "Session migrated out"),
                Err(SendError(handoff)) => {
                    tracing::warn!(agent = agent_id, target, "Shard owner is gone; keeping session");
                    if let Handoff::Identified(session) = handoff {
                        self.sessions.insert(token, *session);
                    }
                }
            }
        }
    }

    fn poll_once(&mut self) {
        let state = &mut self.state;
        let failed = match self
            .multiplexer
            .poll(&mut self.sessions, |_, session| session.on_input(state))
        {
            Ok(failed) => failed,
            Err(e) => {
                tracing::error!(agent = state.agent_id(), error = %e, "Poll failed");
                thread::sleep(Duration::from_millis(10));
                return;
            }
        };

        for token in failed {
            self.remove(token);
        }
    }

    fn remove(&mut self, token: Token) {
        if let Some(mut session) = self.sessions.remove(&token) {
            self.multiplexer.deregister(session.connection_mut());
            session.disconnect();

            let conn = session.connection();
            tracing::debug!(
                agent = self.state.agent_id(),
                token = token.0,
                session_id = ?session.identity().map(|i| &i.session_id),
                bytes_read = conn.bytes_read(),
                bytes_written = conn.bytes_written(),
                "Session removed"
            );
        }
    }

    fn shutdown(&mut self) {
        tracing::info!(
            agent = self.state.agent_id(),
            sessions = self.sessions.len(),
            "Agent stopping; requesting reconnects"
        );

        for session in self.sessions.values_mut() {
            session.request_reconnect();
        }

        for _ in 0..SHUTDOWN_DRAIN_PASSES {
            if self.sessions.is_empty() {
                break;
            }
            self.step();
        }

        for (_, mut session) in self.sessions.drain() {
            session.disconnect();
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("agent_id", &self.state.agent_id())
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}
