//! API key resolution.
//!
//! Resolution order:
//! 1. Environment variable (backend-specific, e.g. `GROQ_API_KEY`)
//! 2. Config file (with warning)

use crate::{Backend, ConfigError, ReplydeskConfig};

/// Result of API key resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Environment variable.
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve an API key for a backend from the process environment.
pub fn resolve_api_key(backend: &Backend, config_value: Option<&str>) -> Option<ResolvedSecret> {
    resolve_api_key_with(backend, config_value, |k| std::env::var(k).ok())
}

/// Resolve an API key with an explicit environment lookup.
pub fn resolve_api_key_with<F>(
    backend: &Backend,
    config_value: Option<&str>,
    lookup: F,
) -> Option<ResolvedSecret>
where
    F: Fn(&str) -> Option<String>,
{
    let env_var = backend.env_var();
    if let Some(value) = lookup(env_var).filter(|v| !v.is_empty()) {
        return Some(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(env_var.to_string()),
        });
    }

    config_value
        .filter(|v| !v.is_empty())
        .map(|v| ResolvedSecret {
            value: v.to_string(),
            source: SecretSource::ConfigFile,
        })
}

impl ReplydeskConfig {
    /// Resolve the completion API key or fail with `ApiKeyNotFound`.
    ///
    /// Backends that run without a key (Ollama) resolve to `None`.
    pub fn require_llm_api_key(&self) -> crate::Result<Option<ResolvedSecret>> {
        let llm = self.llm();
        let backend = llm.effective_backend();
        match resolve_api_key(&backend, llm.api_key.as_deref()) {
            Some(secret) => Ok(Some(secret)),
            None if !backend.requires_api_key() => Ok(None),
            None => Err(ConfigError::ApiKeyNotFound {
                backend: backend.to_string(),
                env_var: backend.env_var().to_string(),
            }),
        }
    }
}
