//! Event payload definitions
//!
//! GUILD_CREATE carries a [`gwsim_core::GuildSnapshot`] directly.

use gwsim_core::{Snowflake, UnavailableGuild, User};
use serde::{Deserialize, Serialize};

/// READY event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyEvent {
    /// Gateway protocol version
    pub v: u8,

    /// The fabricated bot user
    pub user: User,

    /// The shard's guilds; each arrives later as a GUILD_CREATE
    pub guilds: Vec<UnavailableGuild>,

    pub session_id: String,

    pub resume_gateway_url: String,

    /// `[shard_index, shard_count]`
    pub shard: [u32; 2],

    pub application: ApplicationInfo,
}

/// Partial application object in READY
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub id: Snowflake,
    pub flags: u64,
}

/// RESUMED event payload (always empty)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumedEvent {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resumed_serializes_as_empty_object() {
        assert_eq!(serde_json::to_string(&ResumedEvent {}).unwrap(), "{}");
    }

    #[test]
    fn test_ready_shape() {
        let ready = ReadyEvent {
            v: 10,
            user: User {
                id: Snowflake::new(1),
                username: "bot".to_string(),
                discriminator: "0001".to_string(),
                global_name: None,
                avatar: None,
                bot: true,
            },
            guilds: vec![UnavailableGuild::new(Snowflake::new(2))],
            session_id: "abc".to_string(),
            resume_gateway_url: "wss://127.0.0.1:8443".to_string(),
            shard: [0, 1],
            application: ApplicationInfo {
                id: Snowflake::new(1),
                flags: 0,
            },
        };

        let value = serde_json::to_value(&ready).unwrap();
        assert_eq!(value["v"], 10);
        assert_eq!(value["guilds"][0]["id"], "2");
        assert_eq!(value["guilds"][0]["unavailable"], true);
        assert_eq!(value["shard"], serde_json::json!([0, 1]));
        assert_eq!(value["application"]["id"], "1");
    }
}
