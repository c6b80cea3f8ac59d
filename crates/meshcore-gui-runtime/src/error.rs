//! Error types for the device runtime

use thiserror::Error;

// ----------------------------------------------------------------------------
// Device Errors
// ----------------------------------------------------------------------------

/// Failures reported by a device driver call
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device did not respond within {duration_ms} ms")]
    Timeout { duration_ms: u64 },

    /// The request went out but the reply could not be parsed
    #[error("Malformed device response: {detail}")]
    MalformedResponse { detail: String },

    #[error("Device rejected the request: {reason}")]
    Rejected { reason: String },

    #[error("Connection to device lost")]
    ConnectionLost,

    #[error("Not connected to a device")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// Worth retrying during the bulk load
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DeviceError::Timeout { .. } | DeviceError::MalformedResponse { .. }
        )
    }

    pub fn is_connection_lost(&self) -> bool {
        matches!(self, DeviceError::ConnectionLost)
    }

    pub fn is_malformed_response(&self) -> bool {
        matches!(self, DeviceError::MalformedResponse { .. })
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        DeviceError::Rejected {
            reason: reason.into(),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        DeviceError::MalformedResponse {
            detail: detail.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

// ----------------------------------------------------------------------------
// Runtime Errors
// ----------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Reconnect failed after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Runtime error: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
