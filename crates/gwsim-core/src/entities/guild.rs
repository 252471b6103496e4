//! Guild snapshot entity

use crate::{Channel, GuildMember, Role, Snowflake};
use serde::{Deserialize, Serialize};

/// Full guild state as delivered by a GUILD_CREATE dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildSnapshot {
    pub id: Snowflake,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub owner_id: Snowflake,
    pub joined_at: String,
    pub large: bool,
    pub unavailable: bool,
    pub member_count: u32,
    pub roles: Vec<Role>,
    pub members: Vec<GuildMember>,
    pub channels: Vec<Channel>,
}

/// Placeholder guild listed in READY before its GUILD_CREATE arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
    pub unavailable: bool,
}

impl UnavailableGuild {
    #[must_use]
    pub fn new(id: Snowflake) -> Self {
        Self {
            id,
            unavailable: true,
        }
    }
}
