//! Configuration error types

use thiserror::Error;

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Configuration sources could not be read or merged
    #[error("Failed to load configuration from {source_description}: {message}")]
    LoadError {
        source_description: String,
        message: String,
    },

    /// A value is present but unusable
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// The configuration directory does not exist
    #[error("Configuration directory not found: {0}")]
    DirectoryNotFound(String),
}

impl ConfigurationError {
    pub fn load_error(source_description: impl Into<String>, message: impl ToString) -> Self {
        Self::LoadError {
            source_description: source_description.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        Self::load_error("layered sources", err)
    }
}
