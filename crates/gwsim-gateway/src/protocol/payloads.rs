//! Client and control payload definitions

use serde::{Deserialize, Serialize};

/// Payload for op 10 (Hello)
///
/// Sent by the server immediately after the upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Payload for op 2 (Identify)
///
/// The token is accepted without validation; every field is optional so load
/// generators can send the bare minimum.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifyPayload {
    #[serde(default)]
    pub token: Option<String>,

    /// Raw intent bits
    #[serde(default)]
    pub intents: u64,

    /// `[shard_index, shard_count]`
    #[serde(default)]
    pub shard: Option<[u32; 2]>,

    #[serde(default)]
    pub large_threshold: Option<u32>,

    #[serde(default)]
    pub properties: Option<IdentifyProperties>,
}

/// Client connection properties
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifyProperties {
    #[serde(default, alias = "$os")]
    pub os: Option<String>,

    #[serde(default, alias = "$browser")]
    pub browser: Option<String>,

    #[serde(default, alias = "$device")]
    pub device: Option<String>,
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumePayload {
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub session_id: Option<String>,

    /// Last sequence number the client received
    #[serde(default)]
    pub seq: Option<u64>,
}
