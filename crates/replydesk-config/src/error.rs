//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and validation.
///
/// Every variant is fatal for the command that triggered it.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// API key not found through any resolution method.
    #[error("API key not found for backend '{backend}'. Set {env_var} or add api_key to [llm]")]
    ApiKeyNotFound { backend: String, env_var: String },

    /// Missing required field.
    #[error("missing required setting '{field}' ({hint})")]
    MissingField { field: String, hint: String },

    /// A value is present but out of range.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}
