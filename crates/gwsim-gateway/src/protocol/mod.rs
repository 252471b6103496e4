//! Gateway protocol definitions
//!
//! Defines the gateway op codes, message envelope, payloads, intents and close codes.

mod close_codes;
mod intents;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::CloseCode;
pub use intents::GatewayIntents;
pub use messages::{EnvelopeError, GatewayMessage};
pub use opcodes::OpCode;
pub use payloads::{HelloPayload, IdentifyPayload, IdentifyProperties, ResumePayload};
