//! Error types for LiveAvatar core

use thiserror::Error;

/// Result type alias for LiveAvatar core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the core library
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Selector not present in a static catalog
    #[error("Unknown {kind}: {value}")]
    UnknownSelection {
        /// Which catalog was consulted (character, style, voice)
        kind: &'static str,
        /// The rejected value
        value: String,
    },

    /// Utterance text could not be turned into markup
    #[error("Invalid utterance: {0}")]
    InvalidUtterance(String),

    /// Frame buffer does not match its declared dimensions
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration parse error
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error came from configuration or selector validation
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::ConfigError(_) | Error::UnknownSelection { .. } | Error::ConfigParse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownSelection {
            kind: "voice",
            value: "xx-XX-Nobody".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown voice: xx-XX-Nobody");
    }

    #[test]
    fn test_is_config_error() {
        assert!(Error::ConfigError("empty".to_string()).is_config_error());
        assert!(!Error::InvalidUtterance("empty".to_string()).is_config_error());
    }
}
