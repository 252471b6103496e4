//! Application error types
//!
//! Startup and lifecycle failures of the gateway process.

use crate::config::ConfigError;
use std::io;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    // TLS material errors (unreadable PEM, no key, rejected certificate)
    #[error("TLS error: {0}")]
    Tls(String),

    // Socket errors
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Worker thread errors
    #[error("Thread error: {0}")]
    Thread(String),
}

impl AppError {
    /// Get a stable error code for logs
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Tls(_) => "TLS_ERROR",
            Self::Bind { .. } => "BIND_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Thread(_) => "THREAD_ERROR",
        }
    }

    /// Check if the error was caused by operator input rather than the environment
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Tls(_))
    }

    /// Create a TLS error
    #[must_use]
    pub fn tls(msg: impl std::fmt::Display) -> Self {
        Self::Tls(msg.to_string())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
