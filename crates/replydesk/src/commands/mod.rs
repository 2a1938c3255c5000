//! CLI command handlers.

pub mod auth;
pub mod draft;
pub mod followup;
pub mod inbox;
pub mod ingest;
pub mod reply;
pub mod search;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use replydesk_config::{Backend, ReplydeskConfig, resolve_api_key};
use replydesk_domain::{DomainServices, DraftOptions, SeedReport, seed_knowledge};
use replydesk_knowledge::{Chunker, KnowledgeStore};
use replydesk_llm::{EmbedderSpec, OpenAiBackend, OpenAiConfig, SharedBackend, SharedEmbedder};
use replydesk_mail::{DeviceCodeConfig, FileTokenStore, GraphClient};
use replydesk_tracker::FollowUpTracker;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration.
    pub config: ReplydeskConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    pub fn open_tracker(&self) -> Result<Arc<FollowUpTracker>> {
        let path = self.config.tracker_db_path();
        let tracker = FollowUpTracker::open(&path)
            .with_context(|| format!("opening follow-up database {}", path.display()))?;
        Ok(Arc::new(tracker))
    }

    fn build_embedder(&self) -> Result<SharedEmbedder> {
        let embedding = self.config.embedding();
        let openai = embedding.openai.clone().unwrap_or_default();
        let local = embedding.local.clone().unwrap_or_default();
        let spec = EmbedderSpec {
            provider: embedding.provider_name().to_string(),
            openai_api_key: resolve_api_key(&Backend::Openai, openai.api_key.as_deref())
                .map(|s| s.value),
            openai_model: Some(openai.model),
            openai_base_url: openai.base_url,
            local_model_path: local.model_path,
            local_tokenizer_path: local.tokenizer_path,
            dimensions: Some(embedding.effective_dimensions()),
        };
        Ok(replydesk_llm::build_embedder(&spec)?)
    }

    pub fn open_knowledge(&self) -> Result<Arc<KnowledgeStore>> {
        let knowledge = self.config.knowledge();
        let chunker = Chunker::new(knowledge.chunk_size, knowledge.chunk_overlap)?;
        let path = self.config.knowledge_db_path();
        let store = KnowledgeStore::open(&path, self.build_embedder()?)
            .with_context(|| format!("opening knowledge store {}", path.display()))?
            .with_chunker(chunker);
        if store.is_stale() {
            let yellow = Style::new().yellow();
            eprintln!(
                "{} knowledge index was built with a different embedder; run `replydesk ingest --reset`",
                yellow.apply_to("Warning:")
            );
        }
        Ok(Arc::new(store))
    }

    /// Configured documents folder (default `docs`).
    pub fn docs_dir(&self) -> PathBuf {
        self.config.knowledge().docs_dir()
    }

    /// Open the knowledge store and run the idempotent startup seeding.
    pub async fn ready_knowledge(&self) -> Result<Arc<KnowledgeStore>> {
        let store = self.open_knowledge()?;
        let report = self.seed(&store).await?;
        for warning in &report.documents.warnings {
            tracing::warn!(%warning, "Document skipped");
        }
        Ok(store)
    }

    pub async fn seed(&self, store: &KnowledgeStore) -> Result<SeedReport> {
        let include_emails = self.config.knowledge().seed_emails;
        let docs = self.docs_dir();
        Ok(seed_knowledge(store, include_emails, Some(&docs)).await?)
    }

    pub fn build_backend(&self) -> Result<SharedBackend> {
        let llm = self.config.llm();
        let api_key = self.config.require_llm_api_key()?.map(|s| s.value);
        let provider = match llm.effective_backend() {
            Backend::Groq => "groq",
            Backend::Openai => "openai",
            Backend::Ollama => "ollama",
            Backend::Custom => "custom",
        };
        let mut config = OpenAiConfig::for_provider(provider, api_key)?
            .with_model(llm.effective_model())
            .with_timeout(llm.effective_timeout());
        if let Some(url) = llm.base_url {
            config = config.with_base_url(url);
        }
        if let Some(retries) = llm.retry_max {
            config = config.with_max_retries(retries);
        }
        Ok(OpenAiBackend::shared(config)?)
    }

    /// Build the domain facade: seeded knowledge, tracker, completion backend.
    pub async fn services(&self) -> Result<DomainServices> {
        let backend = self.build_backend()?;
        let knowledge = self.ready_knowledge().await?;
        let tracker = self.open_tracker()?;
        let llm = self.config.llm();
        let options = DraftOptions {
            model: llm.effective_model(),
            max_tokens: llm.effective_max_tokens(),
            timeout: llm.effective_timeout(),
        };
        Ok(DomainServices::new(
            knowledge,
            tracker,
            backend,
            options,
            self.config.knowledge().top_k,
        ))
    }

    pub fn device_config(&self) -> Result<DeviceCodeConfig> {
        let client_id = self.config.require_mail_client_id()?;
        Ok(DeviceCodeConfig::new(client_id, self.config.mail().tenant_id))
    }

    pub fn token_store(&self) -> Result<FileTokenStore> {
        Ok(FileTokenStore::new(self.config.mail_token_path()).with_refresh(self.device_config()?))
    }

    pub fn graph(&self) -> Result<GraphClient> {
        let tokens = Arc::new(self.token_store()?);
        Ok(GraphClient::new(tokens).with_endpoint(self.config.mail().graph_endpoint))
    }
}

/// Spinner on stderr; hidden when stderr is not a terminal.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Print a retrieval hit list in the human format.
pub fn print_hits(result: &replydesk_knowledge::RetrievalResult) {
    let dim = Style::new().dim();
    for (i, hit) in result.iter().enumerate() {
        let badge = hit.badge();
        let badge_style = match badge {
            replydesk_knowledge::Badge::High => Style::new().green(),
            replydesk_knowledge::Badge::Medium => Style::new().yellow(),
            replydesk_knowledge::Badge::Low => Style::new().red(),
        };
        println!(
            "{}. [{}] {} {}",
            i + 1,
            hit.item.kind.label(),
            hit.item.source,
            badge_style.apply_to(format!("{:.1}% {}", hit.confidence, badge))
        );
        println!("   {}", dim.apply_to(truncate(&hit.item.text, 160)));
    }
}

/// Truncate to `max` characters on one line.
pub fn truncate(s: &str, max: usize) -> String {
    let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
