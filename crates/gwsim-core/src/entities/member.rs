//! Guild member entity

use crate::{Snowflake, User};
use serde::{Deserialize, Serialize};

/// A member of a guild, wrapping its user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildMember {
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    pub roles: Vec<Snowflake>,
    pub joined_at: String,
    pub deaf: bool,
    pub mute: bool,
}
