//! Gateway session state machine
//!
//! A session wraps one [`Connection`] and walks it through the HTTP upgrade,
//! Hello, Identify/READY and the GUILD_CREATE stream. Inbound work happens in
//! [`GatewaySession::on_input`]; outbound pacing, timeouts and closing happen
//! in [`GatewaySession::tick`], once per agent iteration.

use super::{Connection, Multiplexed};
use crate::events::GatewayEventType;
use crate::frame::{self, FrameOpcode, Message, MessageAssembler};
use crate::handlers::{HandlerError, HandlerResult, MessageDispatcher};
use crate::handshake::{self, HandshakeRequest};
use crate::protocol::{CloseCode, GatewayIntents, GatewayMessage};
use crate::server::AgentState;
use gwsim_common::{ProtocolConfig, WireEncoding};
use gwsim_core::Snowflake;
use mio::Token;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How long a closing session may take to flush before it is cut off
pub const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for the HTTP upgrade request
    Handshake,
    /// Upgraded; frames flow both ways
    Open,
    /// Draining queued dispatches before the close frame (if any) and disconnect
    Closing {
        code: Option<CloseCode>,
        frame_sent: bool,
        deadline: Instant,
    },
}

/// What Identify established for this session
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub session_id: String,
    pub shard: [u32; 2],
    pub intents: GatewayIntents,
}

/// One client session, owned by a single agent
pub struct GatewaySession {
    token: Token,
    connection: Connection,
    phase: SessionPhase,
    encoding: WireEncoding,
    assembler: MessageAssembler,
    identity: Option<SessionIdentity>,
    /// Set once the owning agent has been chosen by shard
    placed: bool,

    /// Last sequence number assigned
    sequence: u64,

    /// Dispatches waiting for the wire, sequence already assigned
    dispatch_queue: VecDeque<GatewayMessage>,

    /// Guild ids announced in READY and not yet sent as GUILD_CREATE
    pending_guilds: VecDeque<Snowflake>,
    guilds_sent: u32,

    last_heartbeat: Instant,
    heartbeat_timeout: Duration,
}

impl GatewaySession {
    pub fn new(token: Token, connection: Connection, protocol: &ProtocolConfig) -> Self {
        Self {
            token,
            connection,
            phase: SessionPhase::Handshake,
            encoding: protocol.default_encoding,
            assembler: MessageAssembler::new(),
            identity: None,
            placed: false,
            sequence: 0,
            dispatch_queue: VecDeque::new(),
            pending_guilds: VecDeque::new(),
            guilds_sent: 0,
            last_heartbeat: Instant::now(),
            heartbeat_timeout: Duration::from_millis(protocol.heartbeat_timeout_ms()),
        }
    }

    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn encoding(&self) -> WireEncoding {
        self.encoding
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    #[must_use]
    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn is_identified(&self) -> bool {
        self.identity.is_some()
    }

    /// Last sequence number assigned to a dispatch
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn guilds_sent(&self) -> u32 {
        self.guilds_sent
    }

    #[must_use]
    pub fn queued_dispatches(&self) -> usize {
        self.dispatch_queue.len()
    }

    /// Shard index of a session that identified since the last call
    ///
    /// Yields once per session, and only while it is open.
    pub(crate) fn take_placement(&mut self) -> Option<u32> {
        if self.placed || self.phase != SessionPhase::Open {
            return None;
        }
        let index = self.identity.as_ref()?.shard[0];
        self.placed = true;
        Some(index)
    }

    /// Adopt the token of the agent that now owns this session
    pub(crate) fn rebind(&mut self, token: Token) {
        self.token = token;
    }

    fn session_id(&self) -> &str {
        self.identity.as_ref().map_or("-", |i| i.session_id.as_str())
    }

    // === Inbound ===

    /// Consume whatever input the connection has accumulated
    pub fn on_input(&mut self, state: &mut AgentState) {
        if self.phase == SessionPhase::Handshake {
            self.process_handshake(state);
        }

        match self.phase {
            SessionPhase::Open => {
                if let Err(err) = self.process_frames(state) {
                    self.fail(err);
                }
            }
            SessionPhase::Closing { .. } => {
                // Nothing more is read once closing starts
                let len = self.connection.input().len();
                self.connection.consume(len);
            }
            SessionPhase::Handshake => {}
        }
    }

    fn process_handshake(&mut self, state: &AgentState) {
        let end = match handshake::find_request_end(self.connection.input()) {
            Ok(Some(end)) => end,
            Ok(None) => return,
            Err(err) => return self.reject_upgrade(&err),
        };

        let request = match HandshakeRequest::parse(&self.connection.input()[..end]) {
            Ok(request) => request,
            Err(err) => return self.reject_upgrade(&err),
        };
        self.connection.consume(end);

        let response = handshake::switching_protocols(&request.accept_key());
        if let Err(err) = self.connection.write(response.as_bytes(), true) {
            return self.fail(err.into());
        }

        self.phase = SessionPhase::Open;
        self.last_heartbeat = Instant::now();

        tracing::debug!(
            agent = state.agent_id(),
            token = self.token.0,
            peer = %self.connection.peer_addr(),
            path = %request.path,
            "WebSocket upgrade complete"
        );

        let hello = self
            .negotiate(&request, &state.config().protocol)
            .and_then(|()| {
                let hello = GatewayMessage::hello(state.config().protocol.heartbeat_interval_ms);
                self.send_message(&hello, true)
            });
        if let Err(err) = hello {
            self.fail(err);
        }
    }

    /// Apply the `v` and `encoding` query parameters
    fn negotiate(&mut self, request: &HandshakeRequest, protocol: &ProtocolConfig) -> HandlerResult<()> {
        if let Some(encoding) = request.query_param("encoding") {
            self.encoding = encoding
                .parse()
                .map_err(|_| HandlerError::Decode(format!("unsupported encoding {encoding:?}")))?;
        }

        let version = request.query_param("v").and_then(|v| v.parse::<u8>().ok());
        if version != Some(protocol.api_version) {
            return Err(HandlerError::InvalidApiVersion);
        }
        Ok(())
    }

    fn reject_upgrade(&mut self, err: &handshake::HandshakeError) {
        tracing::debug!(
            token = self.token.0,
            peer = %self.connection.peer_addr(),
            error = %err,
            "Rejecting upgrade request"
        );

        let len = self.connection.input().len();
        self.connection.consume(len);
        if self.connection.write(handshake::BAD_REQUEST, true).is_err() {
            self.connection.disconnect();
            return;
        }
        self.begin_close(None);
    }

    fn process_frames(&mut self, state: &mut AgentState) -> HandlerResult<()> {
        while self.phase == SessionPhase::Open {
            let Some((frame, used)) = frame::try_decode(self.connection.input())? else {
                break;
            };
            self.connection.consume(used);

            match frame.opcode {
                FrameOpcode::Close => {
                    tracing::debug!(
                        session_id = %self.session_id(),
                        close_code = ?frame.close_code(),
                        "Client closed the connection"
                    );
                    self.connection.disconnect();
                    break;
                }
                // No pong; liveness is the gateway heartbeat
                FrameOpcode::Ping | FrameOpcode::Pong => {}
                _ => {
                    if let Some(message) = self.assembler.push(frame)? {
                        self.handle_message(state, &message)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_message(&mut self, state: &mut AgentState, message: &Message) -> HandlerResult<()> {
        let value: Value = match self.encoding {
            WireEncoding::Json => serde_json::from_slice(&message.payload)?,
            WireEncoding::Etf => gwsim_etf::decode_to_value(&message.payload)?,
        };
        let message = GatewayMessage::from_value(value)?;

        tracing::trace!(session_id = %self.session_id(), %message, "Received");
        MessageDispatcher::dispatch(state, self, message)
    }

    // === Used by handlers ===

    pub(crate) fn record_heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    /// Mark the session identified and remember the guild ids it will receive
    pub(crate) fn establish(&mut self, identity: SessionIdentity, guild_ids: Vec<Snowflake>) {
        self.identity = Some(identity);
        self.pending_guilds = guild_ids.into();
        self.guilds_sent = 0;
    }

    /// Assign the next sequence number and queue a dispatch
    pub(crate) fn enqueue_dispatch(&mut self, event: GatewayEventType, data: Value) -> u64 {
        self.sequence += 1;
        self.dispatch_queue
            .push_back(GatewayMessage::dispatch(event.as_str(), self.sequence, data));
        self.sequence
    }

    /// Encode a message for this session's wire mode and write it
    pub(crate) fn send_message(&mut self, message: &GatewayMessage, priority: bool) -> HandlerResult<()> {
        let bytes = match self.encoding {
            WireEncoding::Json => frame::encode(FrameOpcode::Text, &serde_json::to_vec(message)?),
            WireEncoding::Etf => {
                let value = serde_json::to_value(message)?;
                frame::encode(FrameOpcode::Binary, &gwsim_etf::encode_from_json(&value)?)
            }
        };
        self.connection.write(&bytes, priority)?;
        Ok(())
    }

    // === Outbound pacing ===

    /// One unit of outbound work
    ///
    /// Returns `true` once the session is finished and can be dropped.
    pub fn tick(&mut self, state: &mut AgentState, now: Instant) -> bool {
        if !self.connection.is_connected() {
            return true;
        }

        let silent = now.saturating_duration_since(self.last_heartbeat);
        match self.phase {
            SessionPhase::Handshake if silent > self.heartbeat_timeout => {
                tracing::debug!(token = self.token.0, "No upgrade request before timeout");
                self.connection.disconnect();
                return true;
            }
            SessionPhase::Handshake => return false,
            SessionPhase::Open if silent > self.heartbeat_timeout => {
                self.fail(HandlerError::SessionTimedOut);
            }
            SessionPhase::Open => {
                if let Err(err) = self.send_create_guilds(state) {
                    self.fail(err);
                }
            }
            SessionPhase::Closing { .. } => {}
        }

        if let Err(err) = self.send_final_message() {
            self.fail(err);
        }
        self.progress_close(now)
    }

    /// Queue the next GUILD_CREATE once the dispatch queue has drained
    pub fn send_create_guilds(&mut self, state: &mut AgentState) -> HandlerResult<()> {
        if self.phase != SessionPhase::Open || !self.is_identified() || !self.dispatch_queue.is_empty() {
            return Ok(());
        }
        let Some(id) = self.pending_guilds.pop_front() else {
            return Ok(());
        };

        let guild = state.next_guild(id);
        let data = serde_json::to_value(&guild)?;
        let seq = self.enqueue_dispatch(GatewayEventType::GuildCreate, data);
        self.guilds_sent += 1;

        if self.pending_guilds.is_empty() {
            tracing::debug!(
                session_id = %self.session_id(),
                guilds = self.guilds_sent,
                last_seq = seq,
                "All guilds queued"
            );
        }
        Ok(())
    }

    /// Write one queued dispatch, only when the connection's output is empty
    pub fn send_final_message(&mut self) -> HandlerResult<()> {
        if self.connection.has_pending_output() {
            return Ok(());
        }
        match self.dispatch_queue.pop_front() {
            Some(message) => self.send_message(&message, false),
            None => Ok(()),
        }
    }

    // === Closing ===

    /// Log `err` and start closing with its close code
    pub fn fail(&mut self, err: HandlerError) {
        if let HandlerError::Connection(e) = &err {
            tracing::debug!(session_id = %self.session_id(), error = %e, "Connection lost");
            self.connection.disconnect();
            return;
        }

        let code = err.to_close_code();
        tracing::info!(
            session_id = %self.session_id(),
            token = self.token.0,
            close_code = code.as_u16(),
            error = %err,
            "Closing session"
        );
        self.begin_close(Some(code));
    }

    /// Stop reading and schedule the close; later calls keep the first code
    pub fn begin_close(&mut self, code: Option<CloseCode>) {
        if matches!(self.phase, SessionPhase::Closing { .. }) {
            return;
        }
        self.phase = SessionPhase::Closing {
            code,
            frame_sent: false,
            deadline: Instant::now() + CLOSE_GRACE_PERIOD,
        };
        let len = self.connection.input().len();
        self.connection.consume(len);
    }

    /// Tell an identified client to reconnect elsewhere, then close
    pub fn request_reconnect(&mut self) {
        if self.phase == SessionPhase::Open && self.is_identified() {
            self.dispatch_queue.clear();
            self.pending_guilds.clear();
            if let Err(err) = self.send_message(&GatewayMessage::reconnect(), true) {
                tracing::debug!(session_id = %self.session_id(), error = %err, "Reconnect not sent");
            }
        }
        self.begin_close(None);
    }

    /// Drain, send the close frame, disconnect
    fn progress_close(&mut self, now: Instant) -> bool {
        let SessionPhase::Closing {
            code,
            frame_sent,
            deadline,
        } = self.phase
        else {
            return !self.connection.is_connected();
        };

        if now >= deadline {
            tracing::debug!(session_id = %self.session_id(), "Close grace period expired");
            self.connection.disconnect();
            return true;
        }
        if !self.dispatch_queue.is_empty() {
            return false;
        }

        if !frame_sent {
            if let Some(code) = code {
                if let Err(e) = self.connection.write(&frame::encode_close(code.as_u16()), false) {
                    tracing::debug!(session_id = %self.session_id(), error = %e, "Close frame not sent");
                    self.connection.disconnect();
                    return true;
                }
            }
            self.phase = SessionPhase::Closing {
                code,
                frame_sent: true,
                deadline,
            };
        }

        if self.connection.has_pending_output() {
            return false;
        }
        self.connection.disconnect();
        true
    }

    /// Cut the connection immediately
    pub fn disconnect(&mut self) {
        self.connection.disconnect();
    }
}

impl Multiplexed for GatewaySession {
    fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }
}

impl std::fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySession")
            .field("token", &self.token)
            .field("phase", &self.phase)
            .field("encoding", &self.encoding)
            .field("session_id", &self.session_id())
            .field("sequence", &self.sequence)
            .field("queued", &self.dispatch_queue.len())
            .field("pending_guilds", &self.pending_guilds.len())
            .finish()
    }
}
