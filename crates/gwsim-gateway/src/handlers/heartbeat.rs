//! Heartbeat handler (op 1)

use super::HandlerResult;
use crate::connection::GatewaySession;
use crate::protocol::GatewayMessage;

/// Handles heartbeat messages
pub struct HeartbeatHandler;

impl HeartbeatHandler {
    /// Handle a heartbeat from the client
    ///
    /// `last_sequence` is the client's last received sequence number (null before any dispatch).
    /// The ACK carries the server's last assigned sequence number.
    pub fn handle(session: &mut GatewaySession, last_sequence: Option<u64>) -> HandlerResult<()> {
        session.record_heartbeat();

        tracing::trace!(
            session_id = ?session.identity().map(|i| &i.session_id),
            client_seq = ?last_sequence,
            server_seq = session.sequence(),
            "Heartbeat received"
        );

        session.send_message(&GatewayMessage::heartbeat_ack(session.sequence()), true)
    }
}
