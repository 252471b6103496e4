//! Fabricated entities
//!
//! Wire shapes of the objects embedded in READY and GUILD_CREATE dispatches.

mod channel;
mod guild;
mod member;
mod role;
mod user;

pub use channel::{Channel, ChannelType};
pub use guild::{GuildSnapshot, UnavailableGuild};
pub use member::GuildMember;
pub use role::Role;
pub use user::User;
