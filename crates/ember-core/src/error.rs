//! Error types for Ember

use thiserror::Error;

/// The main error type for Ember operations
#[derive(Debug, Error)]
pub enum EmberError {
    #[error("Channel {id} already registered as {existing}, requested as {requested}")]
    ChannelMismatch {
        id: String,
        existing: String,
        requested: String,
    },

    #[error("Required channel not found: {0}")]
    MissingChannel(String),

    #[error("Channel not bound: {0} (allocate_channels was not called)")]
    ChannelNotBound(String),

    #[error("Channel {id} holds {actual} elements, not {expected}")]
    ChannelType {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Channel {0} requested more than once in a single mutable borrow")]
    ChannelAliased(String),

    #[error("Invalid channel id: {0}")]
    InvalidChannelId(String),

    #[error("Particle controller influencer has no templates")]
    EmptyTemplates,

    #[error("Template not found: controller {index} of effect '{asset}'")]
    TemplateNotFound { asset: String, index: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Controller '{0}' used before init()")]
    NotInitialized(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("TOML serialization error: {0}")]
    TomlSerError(String),
}

/// Result type alias for Ember operations
pub type Result<T> = std::result::Result<T, EmberError>;

impl From<toml::de::Error> for EmberError {
    fn from(err: toml::de::Error) -> Self {
        EmberError::TomlParseError(err.to_string())
    }
}

impl From<toml::ser::Error> for EmberError {
    fn from(err: toml::ser::Error) -> Self {
        EmberError::TomlSerError(err.to_string())
    }
}
