//! Snowflake ID - Discord-compatible 64-bit unique identifier
//!
//! Structure:
//! - Bits 63-22: Timestamp (milliseconds since the Discord epoch)
//! - Bits 21-17: Worker ID (0-31)
//! - Bits 16-12: Process ID (0-31)
//! - Bits 11-0:  Increment (0-4095)

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Discord-compatible Snowflake ID (64-bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Snowflake(u64);

impl Snowflake {
    /// Discord epoch: 2015-01-01 00:00:00 UTC (milliseconds)
    pub const EPOCH: u64 = 1_420_070_400_000;

    /// Create a new Snowflake from a raw value
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }


    /// Parse from string representation
    pub fn parse(s: &str) -> Result<Self, SnowflakeParseError> {
        s.parse::<u64>()
            .map(Snowflake)
            .map_err(|_| SnowflakeParseError::InvalidFormat)
    }
}

/// Error when parsing a Snowflake from string
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SnowflakeParseError {
    #[error("invalid snowflake format")]
    InvalidFormat,
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Snowflake {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<Snowflake> for u64 {
    fn from(id: Snowflake) -> Self {
        id.0
    }
}

impl std::str::FromStr for Snowflake {
    type Err = SnowflakeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Snowflake::parse(s)
    }
}

// Serialize as string for JSON (JavaScript BigInt safety)
impl Serialize for Snowflake {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

// Deserialize from string or number
impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct SnowflakeVisitor;

        impl Visitor<'_> for SnowflakeVisitor {
            type Value = Snowflake;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer representing a snowflake ID")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Snowflake, E>
            where
                E: de::Error,
            {
                Ok(Snowflake(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Snowflake, E>
            where
                E: de::Error,
            {
                u64::try_from(value)
                    .map(Snowflake)
                    .map_err(|_| de::Error::custom("negative snowflake"))
            }

            fn visit_str<E>(self, value: &str) -> Result<Snowflake, E>
            where
                E: de::Error,
            {
                Snowflake::parse(value).map_err(|_| de::Error::custom("invalid snowflake string"))
            }
        }

        deserializer.deserialize_any(SnowflakeVisitor)
    }
}

/// Single-owner Snowflake generator
///
/// Each session agent owns one, so no synchronization is needed. When more than
/// 4096 ids are requested within one millisecond the generator borrows the next
/// millisecond instead of waiting, keeping ids unique and strictly increasing.
#[derive(Debug)]
pub struct SnowflakeGenerator {
    worker_id: u8,
    process_id: u8,
    increment: u16,
    last_timestamp: u64,
}

impl SnowflakeGenerator {
    /// Create a new generator; ids are masked into the 5-bit worker/process fields
    pub fn new(worker_id: u8, process_id: u8) -> Self {
        Self {
            worker_id: worker_id & 0x1F,
            process_id: process_id & 0x1F,
            increment: 0,
            last_timestamp: 0,
        }
    }

    /// Generate a new unique Snowflake ID
    pub fn generate(&mut self) -> Snowflake {
        let now = current_timestamp().max(Snowflake::EPOCH);

        if now > self.last_timestamp {
            self.last_timestamp = now;
            self.increment = 0;
        } else if self.increment == 0xFFF {
            self.last_timestamp += 1;
            self.increment = 0;
        } else {
            self.increment += 1;
        }

        let id = ((self.last_timestamp - Snowflake::EPOCH) << 22)
            | (u64::from(self.worker_id) << 17)
            | (u64::from(self.process_id) << 12)
            | u64::from(self.increment);
        Snowflake::new(id)
    }
}

impl Default for SnowflakeGenerator {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Current time in milliseconds since the Unix epoch
#[inline]
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
