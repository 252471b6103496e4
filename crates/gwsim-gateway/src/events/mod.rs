//! Gateway dispatch events
//!
//! Event names and the payloads carried in `d` of the dispatches this gateway emits.

mod event_types;
mod payloads;

pub use event_types::GatewayEventType;
pub use payloads::{ApplicationInfo, ReadyEvent, ResumedEvent};
