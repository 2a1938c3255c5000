//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! data_dir = "./data"
//!
//! [llm]          # completion backend
//! [embedding]    # embedding provider
//! [knowledge]    # vector index + document folder
//! [tracker]      # follow-up database
//! [mail]         # Microsoft Graph mailbox
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Default chat model (served by Groq).
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Default completion timeout in seconds.
pub const DEFAULT_COMPLETION_TIMEOUT_SECS: u64 = 60;

/// Default Graph API root.
pub const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com/v1.0";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplydeskConfig {
    /// Directory for databases, tokens and logs.
    pub data_dir: Option<PathBuf>,

    /// Completion backend.
    pub llm: Option<LlmConfig>,

    /// Embedding provider.
    pub embedding: Option<EmbeddingConfig>,

    /// Knowledge store and document ingestion.
    pub knowledge: Option<KnowledgeConfig>,

    /// Follow-up tracker.
    pub tracker: Option<TrackerConfig>,

    /// Mailbox access.
    pub mail: Option<MailConfig>,
}

impl ReplydeskConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: ReplydeskConfig) {
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
        if other.llm.is_some() {
            self.llm = other.llm;
        }
        if other.embedding.is_some() {
            self.embedding = other.embedding;
        }
        if other.knowledge.is_some() {
            self.knowledge = other.knowledge;
        }
        if other.tracker.is_some() {
            self.tracker = other.tracker;
        }
        if other.mail.is_some() {
            self.mail = other.mail;
        }
    }

    /// Apply environment overrides using the given lookup.
    ///
    /// Recognised variables: `REPLYDESK_DATA_DIR`, `REPLYDESK_VECTOR_PATH`,
    /// `REPLYDESK_DOCS_DIR`, `AZURE_CLIENT_ID`, `AZURE_TENANT_ID`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("REPLYDESK_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = get("REPLYDESK_VECTOR_PATH") {
            self.knowledge.get_or_insert_with(Default::default).db_path = Some(path.into());
        }
        if let Some(dir) = get("REPLYDESK_DOCS_DIR") {
            self.knowledge.get_or_insert_with(Default::default).docs_dir = Some(dir.into());
        }
        if let Some(id) = get("AZURE_CLIENT_ID") {
            self.mail.get_or_insert_with(Default::default).client_id = Some(id);
        }
        if let Some(tenant) = get("AZURE_TENANT_ID") {
            self.mail.get_or_insert_with(Default::default).tenant_id = tenant;
        }
    }

    /// Resolved data directory.
    ///
    /// Explicit `data_dir`, then the platform data dir, then `./data`.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("replydesk")))
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    pub fn llm(&self) -> LlmConfig {
        self.llm.clone().unwrap_or_default()
    }

    pub fn embedding(&self) -> EmbeddingConfig {
        self.embedding.clone().unwrap_or_default()
    }

    pub fn knowledge(&self) -> KnowledgeConfig {
        self.knowledge.clone().unwrap_or_default()
    }

    pub fn tracker(&self) -> TrackerConfig {
        self.tracker.clone().unwrap_or_default()
    }

    pub fn mail(&self) -> MailConfig {
        self.mail.clone().unwrap_or_default()
    }

    /// Path of the vector index database.
    pub fn knowledge_db_path(&self) -> PathBuf {
        resolve_in(&self.data_dir(), self.knowledge().db_path, "knowledge.db")
    }

    /// Path of the follow-up database.
    pub fn tracker_db_path(&self) -> PathBuf {
        resolve_in(&self.data_dir(), self.tracker().db_path, "followups.db")
    }

    /// Path of the persisted mailbox token.
    pub fn mail_token_path(&self) -> PathBuf {
        resolve_in(&self.data_dir(), self.mail().token_path, "graph-token.json")
    }

    /// Directory for rotated log files.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    /// Require a mail client id (needed for sign-in).
    pub fn require_mail_client_id(&self) -> crate::Result<String> {
        self.mail()
            .client_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                field: "mail.client_id".to_string(),
                hint: "set AZURE_CLIENT_ID or [mail] client_id".to_string(),
            })
    }
}

/// An explicitly configured path wins; otherwise the file lives in the data dir.
fn resolve_in(data_dir: &Path, configured: Option<PathBuf>, default_name: &str) -> PathBuf {
    configured.unwrap_or_else(|| data_dir.join(default_name))
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the completion backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend provider. Default: groq.
    pub backend: Option<Backend>,
    /// Model identifier.
    pub model: Option<String>,
    /// Custom API base URL (for proxies, custom endpoints).
    pub base_url: Option<String>,
    /// API key (prefer env var; warns if set here).
    pub api_key: Option<String>,
    /// Hard timeout for one completion call.
    pub timeout_secs: Option<u64>,
    /// Maximum retry attempts for transient failures.
    pub retry_max: Option<u32>,
    /// Maximum tokens in the generated reply.
    pub max_tokens: Option<u32>,
}

impl LlmConfig {
    pub fn effective_backend(&self) -> Backend {
        self.backend.unwrap_or(Backend::Groq)
    }

    pub fn effective_model(&self) -> String {
        self.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn effective_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_COMPLETION_TIMEOUT_SECS))
    }

    pub fn effective_max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(1024)
    }

    /// Returns true if an API key is stored directly in the config file.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Supported completion providers (all OpenAI-compatible).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Groq,
    Openai,
    Ollama,
    Custom,
}

impl Backend {
    /// Environment variable name for this backend's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Backend::Groq => "GROQ_API_KEY",
            Backend::Openai => "OPENAI_API_KEY",
            Backend::Ollama => "OLLAMA_API_KEY",
            Backend::Custom => "LLM_API_KEY",
        }
    }

    /// Whether calls fail without a key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Backend::Ollama)
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Backend::Groq => "Groq",
            Backend::Openai => "OpenAI",
            Backend::Ollama => "Ollama",
            Backend::Custom => "Custom",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Embedding provider configuration.
///
/// ```toml
/// [embedding]
/// provider = "local"
/// dimensions = 384
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider: "local" (ONNX), "openai", or "mock".
    pub provider: EmbeddingProvider,
    /// Output embedding dimensions. Default depends on provider.
    pub dimensions: Option<usize>,
    /// OpenAI-compatible embedding settings.
    pub openai: Option<EmbeddingOpenAiConfig>,
    /// Local ONNX settings.
    pub local: Option<EmbeddingLocalConfig>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Local,
            dimensions: None,
            openai: None,
            local: None,
        }
    }
}

impl EmbeddingConfig {
    /// Effective dimensions for the configured provider.
    pub fn effective_dimensions(&self) -> usize {
        if let Some(d) = self.dimensions {
            return d;
        }
        match self.provider {
            EmbeddingProvider::Local | EmbeddingProvider::Mock => 384,
            EmbeddingProvider::OpenAi => self
                .openai
                .as_ref()
                .and_then(|c| c.dimensions)
                .unwrap_or(1536),
        }
    }

    /// Provider name as recorded in the knowledge store metadata.
    pub fn provider_name(&self) -> &'static str {
        match self.provider {
            EmbeddingProvider::Local => "local",
            EmbeddingProvider::OpenAi => "openai",
            EmbeddingProvider::Mock => "mock",
        }
    }
}

/// Supported embedding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local ONNX Runtime inference (all-MiniLM-L6-v2).
    Local,
    /// OpenAI-compatible embeddings API.
    OpenAi,
    /// Deterministic hashing embedder for tests and offline demos.
    Mock,
}

/// OpenAI-compatible embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingOpenAiConfig {
    /// Model name. Default: "text-embedding-3-small".
    pub model: String,
    /// Override dimensions.
    pub dimensions: Option<usize>,
    /// Custom base URL.
    pub base_url: Option<String>,
    /// API key (prefer OPENAI_API_KEY).
    pub api_key: Option<String>,
}

impl Default for EmbeddingOpenAiConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            base_url: None,
            api_key: None,
        }
    }
}

/// Local ONNX embedding settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingLocalConfig {
    /// Path to ONNX model file.
    pub model_path: Option<PathBuf>,
    /// Path to tokenizer.json file.
    pub tokenizer_path: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Knowledge store settings.
///
/// ```toml
/// [knowledge]
/// docs_dir = "docs"
/// chunk_size = 500
/// chunk_overlap = 50
/// top_k = 5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Vector index database. Relative to the data dir when unset.
    pub db_path: Option<PathBuf>,
    /// Folder of reference documents.
    pub docs_dir: Option<PathBuf>,
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Hits retrieved per draft.
    pub top_k: usize,
    /// Seed the built-in historical email corpus at startup.
    pub seed_emails: bool,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            docs_dir: None,
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 5,
            seed_emails: true,
        }
    }
}

impl KnowledgeConfig {
    pub fn docs_dir(&self) -> PathBuf {
        self.docs_dir.clone().unwrap_or_else(|| PathBuf::from("docs"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tracker Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Follow-up tracker settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Follow-up database. Relative to the data dir when unset.
    pub db_path: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Mail Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Mailbox settings for Microsoft Graph.
///
/// ```toml
/// [mail]
/// client_id = "..."
/// tenant_id = "consumers"
/// max_fetch = 5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// App registration client id.
    pub client_id: Option<String>,
    /// Tenant (or `consumers` / `common`).
    pub tenant_id: String,
    /// Graph API root.
    pub graph_endpoint: String,
    /// Unread messages fetched per inbox listing.
    pub max_fetch: usize,
    /// Persisted token location.
    pub token_path: Option<PathBuf>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            tenant_id: "consumers".to_string(),
            graph_endpoint: DEFAULT_GRAPH_ENDPOINT.to_string(),
            max_fetch: 5,
            token_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_minimal() {
        let config = ReplydeskConfig::from_toml(
            r#"
            [llm]
            backend = "groq"
            model = "llama-3.3-70b-versatile"
            "#,
        )
        .unwrap();

        let llm = config.llm();
        assert_eq!(llm.effective_backend(), Backend::Groq);
        assert_eq!(llm.effective_model(), "llama-3.3-70b-versatile");
        assert!(config.knowledge.is_none());
    }

    #[test]
    fn test_defaults() {
        let config = ReplydeskConfig::new();
        let knowledge = config.knowledge();
        assert_eq!(knowledge.chunk_size, 500);
        assert_eq!(knowledge.chunk_overlap, 50);
        assert_eq!(knowledge.top_k, 5);
        assert_eq!(config.mail().tenant_id, "consumers");
        assert_eq!(
            config.llm().effective_timeout(),
            Duration::from_secs(DEFAULT_COMPLETION_TIMEOUT_SECS)
        );
        assert_eq!(config.embedding().effective_dimensions(), 384);
    }

    #[test]
    fn test_merge_overrides_sections() {
        let mut base = ReplydeskConfig::from_toml(
            r#"
            [llm]
            model = "base-model"
            [tracker]
            db_path = "/tmp/base.db"
            "#,
        )
        .unwrap();
        let overlay = ReplydeskConfig::from_toml(
            r#"
            [llm]
            model = "project-model"
            "#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.llm().effective_model(), "project-model");
        assert_eq!(base.tracker_db_path(), PathBuf::from("/tmp/base.db"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("REPLYDESK_DATA_DIR", "/srv/replydesk"),
            ("REPLYDESK_DOCS_DIR", "/srv/docs"),
            ("AZURE_CLIENT_ID", "client-123"),
            ("AZURE_TENANT_ID", ""),
        ]
        .into_iter()
        .collect();

        let mut config = ReplydeskConfig::new();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.data_dir(), PathBuf::from("/srv/replydesk"));
        assert_eq!(config.knowledge().docs_dir(), PathBuf::from("/srv/docs"));
        assert_eq!(config.require_mail_client_id().unwrap(), "client-123");
        // Empty values are ignored
        assert_eq!(config.mail().tenant_id, "consumers");
        assert_eq!(
            config.knowledge_db_path(),
            PathBuf::from("/srv/replydesk/knowledge.db")
        );
    }

    #[test]
    fn test_missing_client_id_is_error() {
        let config = ReplydeskConfig::new();
        let err = config.require_mail_client_id().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { .. }));
    }
}
