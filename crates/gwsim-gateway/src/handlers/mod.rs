//! Op code handlers
//!
//! Handles incoming gateway messages based on their operation code.

mod error;
mod heartbeat;
mod identify;
mod resume;

pub use error::{HandlerError, HandlerResult};
pub use heartbeat::HeartbeatHandler;
pub use identify::{guild_quota, IdentifyHandler};
pub use resume::ResumeHandler;

use crate::connection::GatewaySession;
use crate::protocol::{GatewayMessage, OpCode};
use crate::server::AgentState;

/// Dispatch incoming client messages to appropriate handlers
pub struct MessageDispatcher;

impl MessageDispatcher {
    /// Handle one decoded client message
    ///
    /// Any error closes the session with the error's close code.
    pub fn dispatch(
        state: &mut AgentState,
        session: &mut GatewaySession,
        message: GatewayMessage,
    ) -> HandlerResult<()> {
        // Validate that this is a client-sendable op code
        if !message.op.is_client_op() {
            tracing::warn!(
                session_id = ?session.identity().map(|i| &i.session_id),
                op = %message.op,
                "Received server-only op code from client"
            );
            return Err(HandlerError::UnknownOpcode(u64::from(message.op.as_u8())));
        }

        if !session.is_identified() && !matches!(message.op, OpCode::Heartbeat | OpCode::Identify) {
            return Err(HandlerError::NotAuthenticated);
        }

        match message.op {
            OpCode::Heartbeat => HeartbeatHandler::handle(session, message.d.as_u64()),
            OpCode::Identify => {
                let payload = message
                    .payload()
                    .map_err(|e| HandlerError::Decode(format!("Invalid Identify payload: {e}")))?;
                IdentifyHandler::handle(state, session, payload)
            }
            OpCode::Resume => {
                let payload = message
                    .payload()
                    .map_err(|e| HandlerError::Decode(format!("Invalid Resume payload: {e}")))?;
                ResumeHandler::handle(session, &payload)
            }
            OpCode::RequestGuildMembers => {
                tracing::debug!(
                    agent = state.agent_id(),
                    guild_id = ?message.d.get("guild_id"),
                    "Request Guild Members ignored"
                );
                Ok(())
            }
            OpCode::PresenceUpdate | OpCode::VoiceStateUpdate => {
                tracing::debug!(agent = state.agent_id(), op = %message.op, "Client op ignored");
                Ok(())
            }
            // These ops should never reach here due to is_client_op check
            _ => Err(HandlerError::UnknownOpcode(u64::from(message.op.as_u8()))),
        }
    }
}
