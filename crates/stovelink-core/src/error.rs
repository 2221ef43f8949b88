//! Error types shared by the command engine.
//!
//! Protocol-level failures never leave the engine as Rust errors: every
//! variant here is eventually folded into a [`ResultEnvelope`](crate::ResultEnvelope).

use std::path::PathBuf;

/// Failure reported by the device facade.
///
/// The engine only distinguishes "the stove answered" from "it did not";
/// the variants exist for logging.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The stove did not answer or answered garbage.
    #[error("Stove communication failed: {0}")]
    Communication(String),

    /// The driver has not completed its handshake with the board.
    #[error("Stove driver not initialized")]
    NotInitialized,
}

/// Result alias for device facade operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Why a matched command did not produce data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Rejected locally before or instead of a device call.
    #[error("{0}")]
    Rejected(String),

    /// The device call itself failed.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl CommandError {
    /// Build a rejection with the legacy parameter-count message.
    pub fn parameter_count(count: usize) -> Self {
        CommandError::Rejected(format!("Incorrect Parameter Number : {}", count))
    }
}

/// Failure of a single MQTT publish.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("MQTT client not connected")]
    NotConnected,

    #[error("MQTT publish failed: {0}")]
    Failed(String),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_count_message() {
        let err = CommandError::parameter_count(3);
        assert_eq!(err.to_string(), "Incorrect Parameter Number : 3");
    }

    #[test]
    fn test_device_error_converts() {
        let err: CommandError = DeviceError::NotInitialized.into();
        assert!(matches!(err, CommandError::Device(DeviceError::NotInitialized)));
    }
}
