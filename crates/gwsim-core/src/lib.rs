//! # gwsim-core
//!
//! Domain layer for the gateway simulator: Discord-compatible snowflake ids,
//! the fabricated entities carried in READY and GUILD_CREATE payloads, and the
//! generator that invents them. Nothing here performs I/O.

pub mod entities;
pub mod generator;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{Channel, ChannelType, GuildMember, GuildSnapshot, Role, UnavailableGuild, User};
pub use generator::{GeneratorConfig, PayloadGenerator};
pub use value_objects::{Permissions, Snowflake, SnowflakeGenerator, SnowflakeParseError};
