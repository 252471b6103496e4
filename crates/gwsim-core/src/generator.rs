//! Fake payload generator
//!
//! Invents users and guild snapshots whose sizes follow the configured
//! statistics. The gateway only cares that the payloads are well-formed; the
//! values themselves are arbitrary.

use crate::{
    Channel, ChannelType, GuildMember, GuildSnapshot, Permissions, Role, Snowflake,
    SnowflakeGenerator, User,
};
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::HashMap;

const ADJECTIVES: &[&str] = &[
    "quiet", "rapid", "amber", "lucky", "frosty", "hidden", "brave", "cosmic", "gentle", "rusty",
];

const NOUNS: &[&str] = &[
    "otter", "harbor", "comet", "lantern", "meadow", "circuit", "falcon", "garden", "summit", "atlas",
];

const ROLE_NAMES: &[&str] = &[
    "Moderator", "Member", "Veteran", "Booster", "Artist", "Helper", "Bot", "Guest",
];

const CHANNEL_NAMES: &[&str] = &[
    "general", "random", "announcements", "off-topic", "support", "media", "dev", "music",
];

/// Statistical parameters for fabricated payloads
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    /// Total guilds spread across all shards
    #[serde(default = "default_guild_count")]
    pub guild_count: u32,
    #[serde(default = "default_min_members")]
    pub min_members: u32,
    #[serde(default = "default_max_members")]
    pub max_members: u32,
    /// Roles per guild, excluding @everyone
    #[serde(default = "default_roles_per_guild")]
    pub roles_per_guild: u32,
    #[serde(default = "default_channels_per_guild")]
    pub channels_per_guild: u32,
    /// Worker field stamped into generated snowflakes
    #[serde(default)]
    pub worker_id: u8,
}

fn default_guild_count() -> u32 {
    100
}

fn default_min_members() -> u32 {
    5
}

fn default_max_members() -> u32 {
    50
}

fn default_roles_per_guild() -> u32 {
    5
}

fn default_channels_per_guild() -> u32 {
    10
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            guild_count: default_guild_count(),
            min_members: default_min_members(),
            max_members: default_max_members(),
            roles_per_guild: default_roles_per_guild(),
            channels_per_guild: default_channels_per_guild(),
            worker_id: 0,
        }
    }
}

/// Generates fabricated gateway payloads
///
/// Owned by a single session agent; `process_id` distinguishes the snowflakes
/// of different agents.
#[derive(Debug)]
pub struct PayloadGenerator {
    config: GeneratorConfig,
    rng: StdRng,
    ids: SnowflakeGenerator,
}

impl PayloadGenerator {
    /// Create a generator seeded from the OS entropy source
    #[must_use]
    pub fn new(config: GeneratorConfig, process_id: u8) -> Self {
        Self::with_rng(config, process_id, StdRng::from_entropy())
    }

    /// Create a deterministic generator (used by tests)
    #[must_use]
    pub fn seeded(config: GeneratorConfig, process_id: u8, seed: u64) -> Self {
        Self::with_rng(config, process_id, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GeneratorConfig, process_id: u8, rng: StdRng) -> Self {
        let ids = SnowflakeGenerator::new(config.worker_id, process_id);
        Self { config, rng, ids }
    }

    /// Produce a fresh identifier
    pub fn randomize_id(&mut self) -> Snowflake {
        self.ids.generate()
    }

    /// Fabricate a user
    pub fn generate_user(&mut self) -> User {
        let id = self.randomize_id();
        let adjective = ADJECTIVES.choose(&mut self.rng).copied().unwrap_or("plain");
        let noun = NOUNS.choose(&mut self.rng).copied().unwrap_or("user");
        let username = format!("{adjective}_{noun}{}", self.rng.gen_range(0..1000));

        User {
            id,
            global_name: Some(format!("{adjective} {noun}")),
            username,
            discriminator: format!("{:04}", self.rng.gen_range(1..10_000)),
            avatar: self
                .rng
                .gen_bool(0.5)
                .then(|| format!("{:032x}", self.rng.gen::<u128>())),
            bot: self.rng.gen_bool(0.02),
        }
    }

    /// Fabricate a complete guild snapshot with the given id
    pub fn generate_guild(&mut self, id: Snowflake) -> GuildSnapshot {
        let roles = self.generate_roles(id);
        let role_ids: Vec<Snowflake> = roles.iter().skip(1).map(|r| r.id).collect();

        let member_count = self
            .rng
            .gen_range(self.config.min_members..=self.config.max_members.max(self.config.min_members));
        let members: Vec<GuildMember> = (0..member_count)
            .map(|_| self.generate_member(&role_ids))
            .collect();
        let owner_id = members
            .first()
            .map_or_else(|| self.randomize_id(), |m| m.user.id);

        let channels = self.generate_channels();
        let adjective = ADJECTIVES.choose(&mut self.rng).copied().unwrap_or("plain");
        let noun = NOUNS.choose(&mut self.rng).copied().unwrap_or("guild");

        GuildSnapshot {
            id,
            name: format!("The {adjective} {noun}"),
            icon: None,
            description: self
                .rng
                .gen_bool(0.3)
                .then(|| format!("A community about {noun}s")),
            owner_id,
            joined_at: self.random_timestamp(),
            large: member_count > 250,
            unavailable: false,
            member_count,
            roles,
            members,
            channels,
        }
    }

    /// Give a guild snapshot new identifiers, keeping its shape
    ///
    /// Replaces the guild id (and the @everyone role that shares it), every
    /// other role id, every member's user id, and every channel id. Role and
    /// parent-channel references are rewritten to the new ids.
    pub fn rerandomize(&mut self, guild: &mut GuildSnapshot, id: Snowflake) {
        let old_guild_id = guild.id;
        guild.id = id;

        let mut role_map = HashMap::with_capacity(guild.roles.len());
        for role in &mut guild.roles {
            let new_id = if role.id == old_guild_id {
                id
            } else {
                self.randomize_id()
            };
            role_map.insert(role.id, new_id);
            role.id = new_id;
        }

        let old_owner = guild.owner_id;
        let mut new_owner = None;
        for member in &mut guild.members {
            let new_user_id = self.randomize_id();
            if member.user.id == old_owner {
                new_owner = Some(new_user_id);
            }
            member.user.id = new_user_id;
            for role_id in &mut member.roles {
                if let Some(mapped) = role_map.get(role_id) {
                    *role_id = *mapped;
                }
            }
        }
        guild.owner_id = match new_owner {
            Some(owner) => owner,
            None => self.randomize_id(),
        };

        let mut channel_map = HashMap::with_capacity(guild.channels.len());
        for channel in &mut guild.channels {
            let new_id = self.randomize_id();
            channel_map.insert(channel.id, new_id);
            channel.id = new_id;
        }
        for channel in &mut guild.channels {
            if let Some(parent) = channel.parent_id {
                channel.parent_id = channel_map.get(&parent).copied();
            }
        }
    }

    fn generate_roles(&mut self, guild_id: Snowflake) -> Vec<Role> {
        let mut roles = Vec::with_capacity(self.config.roles_per_guild as usize + 1);
        roles.push(Role {
            id: guild_id,
            name: "@everyone".to_string(),
            color: 0,
            hoist: false,
            position: 0,
            permissions: Permissions::DEFAULT,
            managed: false,
            mentionable: false,
        });

        for position in 1..=self.config.roles_per_guild {
            let name = ROLE_NAMES.choose(&mut self.rng).copied().unwrap_or("Role");
            let extra = Permissions::from_bits_truncate(self.rng.gen::<u64>());
            roles.push(Role {
                id: self.randomize_id(),
                name: name.to_string(),
                color: self.rng.gen_range(0..=0x00FF_FFFF),
                hoist: self.rng.gen_bool(0.3),
                position,
                permissions: Permissions::DEFAULT | (extra - Permissions::ADMINISTRATOR),
                managed: false,
                mentionable: self.rng.gen_bool(0.5),
            });
        }
        roles
    }

    fn generate_member(&mut self, role_ids: &[Snowflake]) -> GuildMember {
        let user = self.generate_user();
        let role_count = self.rng.gen_range(0..=role_ids.len().min(3));
        let roles = role_ids
            .choose_multiple(&mut self.rng, role_count)
            .copied()
            .collect();

        GuildMember {
            nick: self.rng.gen_bool(0.2).then(|| format!("nick{}", self.rng.gen_range(0..100))),
            user,
            roles,
            joined_at: self.random_timestamp(),
            deaf: false,
            mute: false,
        }
    }

    fn generate_channels(&mut self) -> Vec<Channel> {
        let mut channels = Vec::with_capacity(self.config.channels_per_guild as usize);
        if self.config.channels_per_guild == 0 {
            return channels;
        }

        let category_id = self.randomize_id();
        channels.push(Channel {
            id: category_id,
            channel_type: ChannelType::GuildCategory,
            name: "Channels".to_string(),
            position: 0,
            parent_id: None,
            topic: None,
            nsfw: false,
        });

        for position in 1..self.config.channels_per_guild {
            let voice = self.rng.gen_bool(0.25);
            let base = CHANNEL_NAMES.choose(&mut self.rng).copied().unwrap_or("chat");
            channels.push(Channel {
                id: self.randomize_id(),
                channel_type: if voice {
                    ChannelType::GuildVoice
                } else {
                    ChannelType::GuildText
                },
                name: format!("{base}-{position}"),
                position,
                parent_id: Some(category_id),
                topic: (!voice).then(|| format!("Talk about {base}")),
                nsfw: false,
            });
        }
        channels
    }

    fn random_timestamp(&mut self) -> String {
        let days_ago = self.rng.gen_range(0..3650);
        (Utc::now() - Duration::days(days_ago)).to_rfc3339()
    }
}
