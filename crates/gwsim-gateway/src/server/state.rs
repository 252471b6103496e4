//! Agent state
//!
//! Everything a session agent's handlers need, owned by the agent thread.
//! The only cross-agent piece is the [`ShardLayout`].

use gwsim_common::GatewayConfig;
use gwsim_core::{GuildSnapshot, PayloadGenerator};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Process-wide shard total, fixed by the first Identify
#[derive(Debug, Default)]
pub struct ShardLayout {
    /// 0 until established
    total: AtomicU32,
}

impl ShardLayout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `total` if nothing is established yet
    ///
    /// Returns the established total as the error when it differs.
    pub fn establish(&self, total: u32) -> Result<(), u32> {
        match self
            .total
            .compare_exchange(0, total, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(existing) if existing == total => Ok(()),
            Err(existing) => Err(existing),
        }
    }

    /// The established shard total, if any
    #[must_use]
    pub fn total(&self) -> Option<u32> {
        match self.total.load(Ordering::Acquire) {
            0 => None,
            total => Some(total),
        }
    }
}

/// Per-agent state handed to every session operation
pub struct AgentState {
    agent_id: usize,
    config: Arc<GatewayConfig>,
    shards: Arc<ShardLayout>,
    /// Payload generator collaborator (not shared between agents)
    pub generator: PayloadGenerator,
    /// Guild snapshot re-randomized for every GUILD_CREATE
    template: GuildSnapshot,
    /// Advertised as `resume_gateway_url` in READY
    gateway_url: String,
}

impl AgentState {
    /// Create the state for one agent
    ///
    /// The template guild is generated once here.
    pub fn new(
        agent_id: usize,
        config: Arc<GatewayConfig>,
        shards: Arc<ShardLayout>,
        gateway_url: String,
    ) -> Self {
        // Snowflake process ids are 5 bits wide
        let process_id = (agent_id % 32) as u8;
        let generator = PayloadGenerator::new(config.generator.clone(), process_id);
        Self::with_generator(agent_id, config, shards, gateway_url, generator)
    }

    /// Create the state around an existing generator
    pub fn with_generator(
        agent_id: usize,
        config: Arc<GatewayConfig>,
        shards: Arc<ShardLayout>,
        gateway_url: String,
        mut generator: PayloadGenerator,
    ) -> Self {
        let template_id = generator.randomize_id();
        let template = generator.generate_guild(template_id);

        Self {
            agent_id,
            config,
            shards,
            generator,
            template,
            gateway_url,
        }
    }

    #[must_use]
    pub fn agent_id(&self) -> usize {
        self.agent_id
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    #[must_use]
    pub fn shards(&self) -> &ShardLayout {
        &self.shards
    }

    #[must_use]
    pub fn template(&self) -> &GuildSnapshot {
        &self.template
    }

    #[must_use]
    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    /// A fresh GUILD_CREATE snapshot carrying `id`
    pub fn next_guild(&mut self, id: gwsim_core::Snowflake) -> GuildSnapshot {
        let mut guild = self.template.clone();
        self.generator.rerandomize(&mut guild, id);
        guild
    }
}

impl std::fmt::Debug for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentState")
            .field("agent_id", &self.agent_id)
            .field("shards", &self.shards)
            .field("gateway_url", &self.gateway_url)
            .finish_non_exhaustive()
    }
}
