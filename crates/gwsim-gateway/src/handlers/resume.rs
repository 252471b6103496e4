//! Resume handler (op 6)

use super::HandlerResult;
use crate::connection::GatewaySession;
use crate::events::{GatewayEventType, ResumedEvent};
use crate::protocol::ResumePayload;

/// Handles Resume messages
///
/// Nothing is replayed; the session simply acknowledges with RESUMED.
pub struct ResumeHandler;

impl ResumeHandler {
    pub fn handle(session: &mut GatewaySession, payload: &ResumePayload) -> HandlerResult<()> {
        let data = serde_json::to_value(ResumedEvent {})?;
        let seq = session.enqueue_dispatch(GatewayEventType::Resumed, data);

        tracing::debug!(
            resumed_session = ?payload.session_id,
            client_seq = ?payload.seq,
            seq,
            "Resume acknowledged"
        );
        Ok(())
    }
}
