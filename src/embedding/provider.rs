// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Providers turn text into fixed-dimension vectors. They must be
//! deterministic: the cache relies on identical text producing identical
//! vectors. A [`ProviderFactory`] creates one provider per worker so that no
//! model instance is ever shared between threads.

use anyhow::{bail, Context, Result};
use serde_json::Value;
#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
use std::borrow::Cow;
use std::io::Write;
use std::process::{Command, Stdio};

use crate::vector::l2_normalize;

pub const DEFAULT_FASTEMBED_MODEL: &str = "all-minilm-l6-v2";
const DEFAULT_FASTEMBED_BATCH_SIZE: usize = 256;
const MAX_FASTEMBED_BATCH_SIZE: usize = 1024;
const DEFAULT_FASTEMBED_MAX_CHARS: usize = 2000;
const DEFAULT_COMMAND_BATCH_SIZE: usize = 64;
pub const DEFAULT_HASHING_DIM: usize = 384;

/// Configuration for the fastembed provider.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    pub model: String,
    pub batch_size: usize,
    pub max_chars: usize,
    pub normalize: bool,
}

impl EmbeddingProviderConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Clamps out-of-range values, warning when the batch size is too large.
    pub fn sanitized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = DEFAULT_FASTEMBED_BATCH_SIZE;
        }
        if self.batch_size > MAX_FASTEMBED_BATCH_SIZE {
            tracing::warn!(
                batch_size = self.batch_size,
                max = MAX_FASTEMBED_BATCH_SIZE,
                "embedding batch size exceeds maximum; clamping"
            );
            self.batch_size = MAX_FASTEMBED_BATCH_SIZE;
        }
        if self.max_chars == 0 {
            self.max_chars = DEFAULT_FASTEMBED_MAX_CHARS;
        }
        self
    }
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_FASTEMBED_MODEL.to_string(),
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
            max_chars: DEFAULT_FASTEMBED_MAX_CHARS,
            normalize: true,
        }
    }
}

/// Trait for embedding providers.
pub trait EmbeddingProvider: Send {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Returns the batch size used by the provider.
    fn batch_size(&self) -> usize;

    /// Generates embeddings for the given texts, one per input, in order.
    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed_one(&mut self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_texts(&[text.to_string()])?;
        result
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }

    /// Output dimension. The default embeds a short sample text.
    fn dimension(&mut self) -> Result<usize> {
        let sample = self.embed_one("test")?;
        if sample.is_empty() {
            bail!("Embedding model {} returned an empty vector", self.model_id());
        }
        Ok(sample.len())
    }
}

/// Creates fresh providers; called once per worker.
pub trait ProviderFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn EmbeddingProvider>>;
}

impl<F> ProviderFactory for F
where
    F: Fn() -> Result<Box<dyn EmbeddingProvider>> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn EmbeddingProvider>> {
        self()
    }
}

/// Provider selection resolved from configuration.
#[derive(Debug, Clone)]
pub enum ProviderSpec {
    FastEmbed(EmbeddingProviderConfig),
    Command { command: String, model: String },
    Hashing { dimension: usize },
}

impl ProviderFactory for ProviderSpec {
    fn create(&self) -> Result<Box<dyn EmbeddingProvider>> {
        match self {
            ProviderSpec::FastEmbed(config) => create_fastembed(config.clone()),
            ProviderSpec::Command { command, model } => Ok(Box::new(CommandProvider::new(
                command.clone(),
                model.clone(),
            ))),
            ProviderSpec::Hashing { dimension } => Ok(Box::new(HashingProvider::new(*dimension)?)),
        }
    }
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
fn create_fastembed(config: EmbeddingProviderConfig) -> Result<Box<dyn EmbeddingProvider>> {
    Ok(Box::new(FastEmbedder::new(config)?))
}

#[cfg(all(target_os = "macos", target_arch = "x86_64"))]
fn create_fastembed(_config: EmbeddingProviderConfig) -> Result<Box<dyn EmbeddingProvider>> {
    bail!("The fastembed provider is not available on this platform; use 'command' or 'hashing'")
}

/// FastEmbed provider running a local sentence-transformers model.
#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
pub struct FastEmbedder {
    embedder: fastembed::TextEmbedding,
    config: EmbeddingProviderConfig,
    model_id: String,
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
impl FastEmbedder {
    pub fn new(config: EmbeddingProviderConfig) -> Result<Self> {
        let config = config.sanitized();
        let model = parse_fastembed_model(&config.model)?;
        let model_id = model.to_string();
        let init = fastembed::InitOptions::new(model);
        let embedder = fastembed::TextEmbedding::try_new(init)
            .context("Failed to initialize fastembed model")?;

        Ok(Self {
            embedder,
            config,
            model_id,
        })
    }
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = truncate_texts(texts, self.config.max_chars);
        let mut embeddings = self
            .embedder
            .embed(&prepared, Some(self.config.batch_size))
            .context("fastembed inference failed")?;

        if self.config.normalize {
            for embedding in embeddings.iter_mut() {
                l2_normalize(embedding);
            }
        }

        Ok(embeddings)
    }
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
fn parse_fastembed_model(raw: &str) -> Result<fastembed::EmbeddingModel> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(fastembed::EmbeddingModel::AllMiniLML6V2);
    }

    match value.to_lowercase().as_str() {
        "minilm"
        | "all-minilm-l6-v2"
        | "allminilm-l6-v2"
        | "sentence-transformers/all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => {
            Ok(fastembed::EmbeddingModel::BGESmallENV15)
        }
        other => bail!(
            "Unsupported embedding model '{}'. Supported values: {}, bge-small-en-v1.5",
            other,
            DEFAULT_FASTEMBED_MODEL
        ),
    }
}

/// Command provider that shells out to an external process.
///
/// The command receives `{"model": ..., "texts": [...]}` on stdin and must
/// print either a JSON array of vectors or an object holding one under
/// `embeddings`, `vectors` or `data`.
pub struct CommandProvider {
    command: String,
    model: String,
    batch_size: usize,
}

impl CommandProvider {
    pub fn new(command: String, model: String) -> Self {
        Self {
            command,
            model,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }

    fn run_command(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({
            "model": self.model,
            "texts": texts,
        });

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn embedding command: {}", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.to_string().as_bytes())
                .context("Failed to write embeddings payload to stdin")?;
        }

        let output = child
            .wait_with_output()
            .context("Failed to read embeddings command output")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Embedding command failed (status {}): {}",
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: Value = serde_json::from_str(stdout.trim())
            .context("Failed to parse embeddings command output as JSON")?;
        let vectors = parse_vectors(parsed)?;

        if vectors.len() != texts.len() {
            bail!(
                "Embedding command returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            );
        }
        Ok(vectors)
    }
}

fn parse_vectors(parsed: Value) -> Result<Vec<Vec<f32>>> {
    let rows = match parsed {
        Value::Array(arr) => arr,
        Value::Object(mut obj) => match ["embeddings", "vectors", "data"]
            .iter()
            .find_map(|key| obj.remove(*key))
        {
            Some(Value::Array(arr)) => arr,
            Some(_) => bail!("Embeddings output must be a JSON array"),
            None => bail!("Embeddings command output missing 'embeddings' field"),
        },
        _ => bail!("Embeddings command output must be JSON array or object"),
    };

    rows.iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| anyhow::anyhow!("Embedding row must be an array"))?
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .ok_or_else(|| anyhow::anyhow!("Embedding value must be a number"))
                        .map(|v| v as f32)
                })
                .collect::<Result<Vec<f32>>>()
        })
        .collect()
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.run_command(batch)?);
        }
        Ok(vectors)
    }
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercase whitespace token is hashed into one signed bucket, so texts
/// sharing words get positive cosine similarity. Needs no model files.
pub struct HashingProvider {
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            bail!("Hashing embedder dimension must be at least 1");
        }
        Ok(Self {
            model: format!("hashing-{}", dimension),
            dimension,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
        })
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl EmbeddingProvider for HashingProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    fn dimension(&mut self) -> Result<usize> {
        Ok(self.dimension)
    }
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
fn truncate_texts(texts: &[String], max_chars: usize) -> Vec<Cow<'_, str>> {
    texts
        .iter()
        .map(|text| truncate_to_chars(text.as_str(), max_chars))
        .collect()
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
fn truncate_to_chars(input: &str, max_chars: usize) -> Cow<'_, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}
