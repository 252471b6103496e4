//! Configuration structs

mod app_config;

pub use app_config::{
    AgentConfig, AppSettings, ConfigError, Environment, GatewayConfig, GeneratorConfig,
    ProtocolConfig, ServerConfig, TlsConfig, WireEncoding,
};
