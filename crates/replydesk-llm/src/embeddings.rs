//! Text embeddings for the knowledge store.
//!
//! The [`Embedder`] trait turns text into dense vectors. The same embedder
//! must be used at ingestion and query time, otherwise distances are
//! meaningless.
//!
//! # Implementations
//!
//! - [`MockEmbedder`]: deterministic hashed bag-of-words vectors, no network
//! - [`OpenAiEmbedder`]: any OpenAI-compatible `/embeddings` endpoint
//! - [`LocalEmbedder`](local::LocalEmbedder): ONNX Runtime inference
//!   (requires the `local-embeddings` feature)

use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for generating text embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts in a batch.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimensionality of the produced vectors.
    fn dimensions(&self) -> usize;

    /// Provider name, recorded alongside stored vectors.
    fn name(&self) -> &str;
}

/// A shared embedder that can be used across threads.
pub type SharedEmbedder = Arc<dyn Embedder>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic embedder for tests and offline use.
///
/// Each lowercase alphanumeric token is hashed into a signed bucket and the
/// result is L2-normalized, so identical texts land at distance 0 and texts
/// sharing vocabulary land closer than unrelated ones.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        for token in tokens {
            let hash = djb2(&token);
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }
        embedding
    }
}

impl Default for MockEmbedder {
    /// 384 dimensions, same as all-MiniLM-L6-v2.
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}

fn djb2(s: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
    }
    hash
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for OpenAI-compatible embeddings.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Requested output size (`text-embedding-3-*` models can shorten).
    pub dimensions: Option<usize>,
    pub timeout: Duration,
}

impl OpenAiEmbedderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// OpenAI embeddings API client.
pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiEmbedderConfig,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiEmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let dimensions = config.dimensions.unwrap_or(match config.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        });

        Ok(Self {
            client,
            config,
            dimensions,
        })
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Internal("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: self.config.model.clone(),
            input: texts.iter().map(|s| s.to_string()).collect(),
            dimensions: self.config.dimensions,
        };

        let response = self
            .client
            .post(self.embeddings_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Backend(format!(
                "Embedding request failed: HTTP {} - {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Serialization(format!("Failed to parse response: {}", e)))?;

        // Sort by index to ensure correct order
        let mut data = result.data;
        data.sort_by_key(|e| e.index);

        Ok(data.into_iter().map(|e| e.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Debug, serde::Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Local Embedder (ONNX Runtime)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "local-embeddings")]
pub mod local {
    //! Local embeddings using ONNX Runtime (all-MiniLM-L6-v2 style models).

    use super::*;
    use ndarray::Array2;
    use ort::session::{Session, builder::GraphOptimizationLevel};
    use ort::value::TensorRef;
    use parking_lot::Mutex;
    use std::path::Path;
    use tokenizers::Tokenizer;

    fn internal<E: std::fmt::Display>(context: &str) -> impl Fn(E) -> LlmError + '_ {
        move |e| LlmError::Internal(format!("{}: {}", context, e))
    }

    /// Local embedder using ONNX Runtime with mean pooling.
    pub struct LocalEmbedder {
        session: Mutex<Session>,
        tokenizer: Tokenizer,
        dimensions: usize,
    }

    impl LocalEmbedder {
        /// Load a model file and its `tokenizer.json`.
        pub fn load(
            model_path: impl AsRef<Path>,
            tokenizer_path: impl AsRef<Path>,
            dimensions: usize,
        ) -> Result<Self> {
            let session = Session::builder()
                .map_err(internal("Failed to create ONNX session"))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(internal("Failed to set optimization level"))?
                .commit_from_file(model_path.as_ref())
                .map_err(internal("Failed to load ONNX model"))?;

            let tokenizer = Tokenizer::from_file(tokenizer_path.as_ref()).map_err(|e| {
                LlmError::Internal(format!(
                    "Failed to load tokenizer from {:?}: {}",
                    tokenizer_path.as_ref(),
                    e
                ))
            })?;

            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
                dimensions,
            })
        }

        fn run_batch(&self, encodings: &[tokenizers::Encoding]) -> Result<Vec<Vec<f32>>> {
            let batch = encodings.len();
            let max_len = encodings
                .iter()
                .map(|e| e.get_ids().len())
                .max()
                .unwrap_or(0);

            let mut ids = vec![0i64; batch * max_len];
            let mut mask = vec![0i64; batch * max_len];
            let mut types = vec![0i64; batch * max_len];
            for (i, enc) in encodings.iter().enumerate() {
                let offset = i * max_len;
                for (j, ((id, m), t)) in enc
                    .get_ids()
                    .iter()
                    .zip(enc.get_attention_mask())
                    .zip(enc.get_type_ids())
                    .enumerate()
                {
                    ids[offset + j] = *id as i64;
                    mask[offset + j] = *m as i64;
                    types[offset + j] = *t as i64;
                }
            }

            let shape_err = |e: ndarray::ShapeError| LlmError::Internal(format!("Array error: {}", e));
            let ids_arr = Array2::from_shape_vec((batch, max_len), ids).map_err(shape_err)?;
            let mask_arr = Array2::from_shape_vec((batch, max_len), mask.clone()).map_err(shape_err)?;
            let types_arr = Array2::from_shape_vec((batch, max_len), types).map_err(shape_err)?;

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![
                    "input_ids" => TensorRef::from_array_view(&ids_arr).map_err(internal("Input error"))?,
                    "attention_mask" => TensorRef::from_array_view(&mask_arr).map_err(internal("Input error"))?,
                    "token_type_ids" => TensorRef::from_array_view(&types_arr).map_err(internal("Input error"))?,
                ])
                .map_err(internal("ONNX inference failed"))?;

            // (batch, seq_len, hidden)
            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(internal("Output extraction failed"))?;
            let seq_len = shape[1] as usize;
            let hidden = shape[2] as usize;

            let mut results = Vec::with_capacity(batch);
            for i in 0..batch {
                let mut sum = vec![0.0f32; hidden];
                let mut count = 0.0f32;
                for j in 0..seq_len.min(max_len) {
                    if mask[i * max_len + j] == 0 {
                        continue;
                    }
                    let row = &data[(i * seq_len + j) * hidden..(i * seq_len + j + 1) * hidden];
                    for (acc, v) in sum.iter_mut().zip(row) {
                        *acc += v;
                    }
                    count += 1.0;
                }
                if count > 0.0 {
                    sum.iter_mut().for_each(|v| *v /= count);
                }
                let norm: f32 = sum.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 1e-9 {
                    sum.iter_mut().for_each(|v| *v /= norm);
                }
                results.push(sum);
            }

            Ok(results)
        }
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.embed_batch(&[text])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| LlmError::Internal("No embedding returned".to_string()))
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let encodings = texts
                .iter()
                .map(|text| {
                    self.tokenizer
                        .encode(*text, true)
                        .map_err(|e| LlmError::Internal(format!("Tokenization failed: {}", e)))
                })
                .collect::<Result<Vec<_>>>()?;

            let mut all = Vec::with_capacity(texts.len());
            for chunk in encodings.chunks(32) {
                all.extend(self.run_batch(chunk)?);
            }
            Ok(all)
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn name(&self) -> &str {
            "local"
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Provider-agnostic description of an embedder.
///
/// Populated by the caller from its `[embedding]` config section so this
/// crate does not depend on the config crate.
#[derive(Debug, Clone, Default)]
pub struct EmbedderSpec {
    /// Provider name: "local", "openai", or "mock".
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub openai_base_url: Option<String>,
    pub local_model_path: Option<PathBuf>,
    pub local_tokenizer_path: Option<PathBuf>,
    pub dimensions: Option<usize>,
}

/// Build a [`SharedEmbedder`] from a spec.
///
/// "local" falls back to [`MockEmbedder`] with a warning when the model
/// files or the `local-embeddings` feature are missing.
pub fn build_embedder(spec: &EmbedderSpec) -> Result<SharedEmbedder> {
    let dims = spec.dimensions.unwrap_or(384);
    match spec.provider.as_str() {
        "openai" => {
            let api_key = spec.openai_api_key.as_deref().ok_or_else(|| {
                LlmError::Config(
                    "OpenAI embedding provider requires an API key. \
                     Set OPENAI_API_KEY or configure [embedding.openai] api_key."
                        .to_string(),
                )
            })?;
            let mut config = OpenAiEmbedderConfig::new(api_key);
            if let Some(ref model) = spec.openai_model {
                config = config.with_model(model);
            }
            if let Some(ref base_url) = spec.openai_base_url {
                config = config.with_base_url(base_url);
            }
            if let Some(d) = spec.dimensions {
                config = config.with_dimensions(d);
            }
            Ok(Arc::new(OpenAiEmbedder::new(config)?))
        }
        "local" => build_local(spec, dims),
        "mock" => Ok(Arc::new(MockEmbedder::new(dims))),
        other => Err(LlmError::Config(format!(
            "Unknown embedding provider '{}'. Valid: local, openai, mock",
            other
        ))),
    }
}

#[cfg(feature = "local-embeddings")]
fn build_local(spec: &EmbedderSpec, dims: usize) -> Result<SharedEmbedder> {
    let paths = match (&spec.local_model_path, &spec.local_tokenizer_path) {
        (Some(model), Some(tokenizer)) => Some((model.clone(), tokenizer.clone())),
        _ => default_local_model_dir()
            .map(|dir| (dir.join("model.onnx"), dir.join("tokenizer.json")))
            .filter(|(m, t)| m.exists() && t.exists()),
    };

    match paths {
        Some((model, tokenizer)) => Ok(Arc::new(local::LocalEmbedder::load(
            model, tokenizer, dims,
        )?)),
        None => {
            tracing::warn!(
                "Local embedding model not found. Falling back to mock embedder. \
                 Download all-MiniLM-L6-v2 ONNX files into the replydesk models/embeddings dir"
            );
            Ok(Arc::new(MockEmbedder::new(dims)))
        }
    }
}

#[cfg(not(feature = "local-embeddings"))]
fn build_local(_spec: &EmbedderSpec, dims: usize) -> Result<SharedEmbedder> {
    tracing::warn!(
        "Local embeddings requested but the 'local-embeddings' feature is not enabled. \
         Falling back to mock embedder."
    );
    Ok(Arc::new(MockEmbedder::new(dims)))
}

/// Default directory for local embedding model files.
pub fn default_local_model_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("replydesk").join("models").join("embeddings"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
