//! Configuration system for replydesk.
//!
//! Provides TOML-based configuration with:
//! - Sections for the completion backend, embeddings, knowledge store,
//!   follow-up tracker and mail transport
//! - Config file layering (user config dir + project-local overrides)
//! - Environment overrides for paths and mail identifiers
//! - API key resolution (env var → config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, SecretSource, resolve_api_key, resolve_api_key_with};
pub use types::*;
