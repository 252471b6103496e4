//! Identify handler (op 2)

use super::{HandlerError, HandlerResult};
use crate::connection::{GatewaySession, SessionIdentity};
use crate::events::{ApplicationInfo, GatewayEventType, ReadyEvent};
use crate::protocol::{GatewayIntents, IdentifyPayload};
use crate::server::AgentState;
use gwsim_core::UnavailableGuild;

/// Guilds shard `index` of `total` receives when guild `i` goes to shard `i % total`
#[must_use]
pub fn guild_quota(guild_count: u32, index: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    guild_count / total + u32::from(index < guild_count % total)
}

/// Handles Identify messages
pub struct IdentifyHandler;

impl IdentifyHandler {
    /// Handle an Identify message
    ///
    /// Queues READY. If the shard would carry more guilds than the configured
    /// ceiling, READY is still queued and the error closes the session after it.
    pub fn handle(
        state: &mut AgentState,
        session: &mut GatewaySession,
        payload: IdentifyPayload,
    ) -> HandlerResult<()> {
        if session.is_identified() {
            tracing::warn!(
                session_id = ?session.identity().map(|i| &i.session_id),
                "Client sent Identify while already identified"
            );
            return Err(HandlerError::AlreadyAuthenticated);
        }

        let [index, total] = payload
            .shard
            .unwrap_or([0, state.config().agents.shard_count]);
        if total == 0 || index >= total {
            return Err(HandlerError::InvalidShard(format!("[{index}, {total}]")));
        }

        let intents =
            GatewayIntents::parse(payload.intents).ok_or(HandlerError::InvalidIntents(payload.intents))?;

        let guild_count = state.config().generator.guild_count;

        // Per-shard load is bounded by the largest shard
        let per_shard = guild_count.div_ceil(total);
        let max = state.config().protocol.max_guilds_per_shard;
        let sharding_required = per_shard > max;

        // Only a layout that fits fixes the process-wide shard total
        if !sharding_required {
            if let Err(established) = state.shards().establish(total) {
                return Err(HandlerError::InvalidShard(format!(
                    "shard total {total} differs from established {established}"
                )));
            }
        }

        let quota = guild_quota(guild_count, index, total);
        let guild_ids: Vec<_> = (0..quota).map(|_| state.generator.randomize_id()).collect();

        let session_id = uuid::Uuid::new_v4().to_string();
        let mut user = state.generator.generate_user();
        user.bot = true;

        let ready = ReadyEvent {
            v: state.config().protocol.api_version,
            application: ApplicationInfo {
                id: user.id,
                flags: 0,
            },
            user,
            guilds: guild_ids.iter().copied().map(UnavailableGuild::new).collect(),
            session_id: session_id.clone(),
            resume_gateway_url: state.gateway_url().to_string(),
            shard: [index, total],
        };
        let ready_data = serde_json::to_value(&ready)?;

        session.establish(
            SessionIdentity {
                session_id: session_id.clone(),
                shard: [index, total],
                intents,
            },
            guild_ids,
        );
        let seq = session.enqueue_dispatch(GatewayEventType::Ready, ready_data);

        tracing::info!(
            agent = state.agent_id(),
            session_id = %session_id,
            shard = ?[index, total],
            intents = intents.bits(),
            token_present = payload.token.is_some(),
            guilds = quota,
            seq,
            "Client identified"
        );

        if sharding_required {
            return Err(HandlerError::ShardingRequired {
                guilds: per_shard,
                max,
            });
        }

        Ok(())
    }
}
