//! Application configuration structs
//!
//! Loads configuration from environment variables or a config file.

pub use gwsim_core::GeneratorConfig;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub app: AppSettings,
    pub gateway: ServerConfig,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub agents: AgentConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            env: default_env(),
        }
    }
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Listening socket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// PEM certificate chain and private key for the TLS listener
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Payload encoding negotiated per connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WireEncoding {
    #[default]
    Json,
    Etf,
}

impl WireEncoding {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Etf => "etf",
        }
    }
}

impl FromStr for WireEncoding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "etf" => Ok(Self::Etf),
            other => Err(ConfigError::InvalidValue("encoding", other.to_string())),
        }
    }
}

impl fmt::Display for WireEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway protocol tunables
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_api_version")]
    pub api_version: u8,
    #[serde(default)]
    pub default_encoding: WireEncoding,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Silence allowed before a session times out; derived from the interval when unset
    #[serde(default)]
    pub heartbeat_timeout_ms: Option<u64>,
    #[serde(default = "default_max_guilds_per_shard")]
    pub max_guilds_per_shard: u32,
}

impl ProtocolConfig {
    /// Effective heartbeat timeout (1.5x the advertised interval unless overridden)
    #[must_use]
    pub fn heartbeat_timeout_ms(&self) -> u64 {
        self.heartbeat_timeout_ms
            .unwrap_or(self.heartbeat_interval_ms + self.heartbeat_interval_ms / 2)
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            default_encoding: WireEncoding::default(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: None,
            max_guilds_per_shard: default_max_guilds_per_shard(),
        }
    }
}

/// Session agent (worker thread) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_count")]
    pub count: usize,
    /// Shard total assumed when an Identify omits `shard`
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            count: default_agent_count(),
            shard_count: default_shard_count(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "gwsim".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_version() -> u8 {
    10
}

fn default_heartbeat_interval_ms() -> u64 {
    41_250
}

fn default_max_guilds_per_shard() -> u32 {
    2500
}

fn default_agent_count() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

fn default_shard_count() -> u32 {
    1
}

/// Parse an optional environment variable, rejecting values that do not parse
fn env_parse<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        Err(_) => Ok(None),
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let generator_defaults = GeneratorConfig::default();
        let protocol_defaults = ProtocolConfig::default();

        let tls = match (env::var("TLS_CERT_PATH"), env::var("TLS_KEY_PATH")) {
            (Ok(cert), Ok(key)) => Some(TlsConfig {
                cert_path: cert.into(),
                key_path: key.into(),
            }),
            (Err(_), Err(_)) => None,
            (Ok(_), Err(_)) => return Err(ConfigError::MissingVar("TLS_KEY_PATH")),
            (Err(_), Ok(_)) => return Err(ConfigError::MissingVar("TLS_CERT_PATH")),
        };

        let config = Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            gateway: ServerConfig {
                host: env::var("GATEWAY_HOST").unwrap_or_else(|_| default_host()),
                port: env_parse("GATEWAY_PORT")?.ok_or(ConfigError::MissingVar("GATEWAY_PORT"))?,
            },
            tls,
            protocol: ProtocolConfig {
                api_version: env_parse("GATEWAY_API_VERSION")?
                    .unwrap_or(protocol_defaults.api_version),
                default_encoding: env_parse("GATEWAY_DEFAULT_ENCODING")?.unwrap_or_default(),
                heartbeat_interval_ms: env_parse("GATEWAY_HEARTBEAT_INTERVAL_MS")?
                    .unwrap_or(protocol_defaults.heartbeat_interval_ms),
                heartbeat_timeout_ms: env_parse("GATEWAY_HEARTBEAT_TIMEOUT_MS")?,
                max_guilds_per_shard: env_parse("GATEWAY_MAX_GUILDS_PER_SHARD")?
                    .unwrap_or(protocol_defaults.max_guilds_per_shard),
            },
            agents: AgentConfig {
                count: env_parse("AGENT_COUNT")?.unwrap_or_else(default_agent_count),
                shard_count: env_parse("SHARD_COUNT")?.unwrap_or_else(default_shard_count),
            },
            generator: GeneratorConfig {
                guild_count: env_parse("GENERATOR_GUILD_COUNT")?
                    .unwrap_or(generator_defaults.guild_count),
                min_members: env_parse("GENERATOR_MIN_MEMBERS")?
                    .unwrap_or(generator_defaults.min_members),
                max_members: env_parse("GENERATOR_MAX_MEMBERS")?
                    .unwrap_or(generator_defaults.max_members),
                roles_per_guild: env_parse("GENERATOR_ROLES_PER_GUILD")?
                    .unwrap_or(generator_defaults.roles_per_guild),
                channels_per_guild: env_parse("GENERATOR_CHANNELS_PER_GUILD")?
                    .unwrap_or(generator_defaults.channels_per_guild),
                worker_id: env_parse("WORKER_ID")?.unwrap_or(generator_defaults.worker_id),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file (TOML, JSON or YAML by extension)
    ///
    /// Values can be overridden by `GWSIM__SECTION__KEY` environment variables.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("GWSIM")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the gateway cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.count == 0 {
            return Err(ConfigError::InvalidValue("agents.count", "0".to_string()));
        }
        if self.agents.shard_count == 0 {
            return Err(ConfigError::InvalidValue("agents.shard_count", "0".to_string()));
        }
        if self.protocol.heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "protocol.heartbeat_interval_ms",
                "0".to_string(),
            ));
        }
        if self.generator.min_members > self.generator.max_members {
            return Err(ConfigError::InvalidValue(
                "generator.min_members",
                format!(
                    "{} exceeds max_members {}",
                    self.generator.min_members, self.generator.max_members
                ),
            ));
        }
        Ok(())
    }

    /// Whether the listener should terminate TLS
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
