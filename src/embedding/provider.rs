// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Providers turn text into fixed-length vectors. The fastembed provider runs
//! a local model, the command provider shells out to an external embedder,
//! and the hashing provider is a deterministic offline stand-in.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashSet;
use std::env;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::{EmbeddingConfig, EmbeddingProviderType, RetryConfig};
use crate::embedding::retry::RetryingProvider;
use crate::errors::{EmbeddingError, Error, Result};

const DEFAULT_FASTEMBED_MODEL: &str = "minilm";
const DEFAULT_FASTEMBED_BATCH_SIZE: usize = 32;
const MAX_FASTEMBED_BATCH_SIZE: usize = 1024;
const DEFAULT_FASTEMBED_MAX_CHARS: usize = 2000;
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// `EX_DATAERR` from sysexits.h; the command rejected its input.
const EXIT_INVALID_INPUT: i32 = 65;

/// Configuration for the fastembed provider.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    pub model: EmbeddingModel,
    pub batch_size: usize,
    pub max_chars: usize,
    pub normalize: bool,
}

impl EmbeddingProviderConfig {
    /// Builds the config from the `[embeddings]` section, then applies
    /// `FASTEMBED_*` environment overrides.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let mut resolved = Self {
            model: parse_model(config.model())?,
            batch_size: config.batch_size().min(MAX_FASTEMBED_BATCH_SIZE),
            max_chars: config.max_chars(),
            normalize: config.normalize(),
        };

        if let Ok(raw) = env::var("FASTEMBED_MODEL") {
            if !raw.trim().is_empty() {
                resolved.model = parse_model(&raw)?;
            }
        }

        let batch_size = parse_usize_env("FASTEMBED_BATCH_SIZE", resolved.batch_size)?;
        resolved.batch_size = match batch_size {
            0 => DEFAULT_FASTEMBED_BATCH_SIZE,
            n if n > MAX_FASTEMBED_BATCH_SIZE => {
                tracing::warn!(
                    "FASTEMBED_BATCH_SIZE={} exceeds max {}; clamping.",
                    n,
                    MAX_FASTEMBED_BATCH_SIZE
                );
                MAX_FASTEMBED_BATCH_SIZE
            }
            n => n,
        };

        let max_chars = parse_usize_env("FASTEMBED_MAX_CHARS", resolved.max_chars)?;
        resolved.max_chars = if max_chars == 0 {
            DEFAULT_FASTEMBED_MAX_CHARS
        } else {
            max_chars
        };

        resolved.normalize = parse_bool_env("FASTEMBED_NORMALIZE", resolved.normalize)?;

        Ok(resolved)
    }
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModel::AllMiniLML6V2,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
            max_chars: DEFAULT_FASTEMBED_MAX_CHARS,
            normalize: true,
        }
    }
}

/// Trait for embedding providers.
///
/// Providers are shared across concurrent retrieval calls, so methods take
/// `&self`; implementations guard any mutable model state internally.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Returns the batch size used by the provider.
    fn batch_size(&self) -> usize;

    /// Generates embeddings for the given texts, one vector per text.
    fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Generates an embedding for a single text.
    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        let mut result = self.embed_batch(&[text.to_string()])?;
        match (result.pop(), result.is_empty()) {
            (Some(vector), true) => Ok(vector),
            (Some(_), false) => Err(EmbeddingError::Provider(
                "provider returned more than one embedding for one text".to_string(),
            )),
            (None, _) => Err(EmbeddingError::Provider("no embedding returned".to_string())),
        }
    }
}

/// FastEmbed provider running a sentence-transformers model locally.
pub struct FastEmbedder {
    embedder: Mutex<TextEmbedding>,
    config: EmbeddingProviderConfig,
    model_id: String,
}

impl FastEmbedder {
    pub fn new(config: EmbeddingProviderConfig) -> Result<Self> {
        let model = config.model.clone();
        let model_id = model.to_string();
        let init = InitOptions::new(model);
        let embedder = TextEmbedding::try_new(init).map_err(|e| {
            Error::Config(format!("failed to initialize fastembed model {}: {}", model_id, e))
        })?;

        Ok(Self {
            embedder: Mutex::new(embedder),
            config,
            model_id,
        })
    }
}

impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = truncate_texts(texts, self.config.max_chars);
        let mut embedder = self
            .embedder
            .lock()
            .map_err(|_| EmbeddingError::Provider("fastembed model lock poisoned".to_string()))?;
        let mut embeddings = embedder
            .embed(&prepared, Some(self.config.batch_size))
            .map_err(|e| EmbeddingError::Provider(e.to_string()))?;
        drop(embedder);

        if self.config.normalize {
            for embedding in embeddings.iter_mut() {
                l2_normalize(embedding);
            }
        }

        Ok(embeddings)
    }
}

/// Command provider that shells out to an external process.
///
/// The process receives `{"model": ..., "texts": [...]}` on stdin and must
/// print a JSON array of vectors (or an object holding one under
/// `embeddings`, `vectors` or `data`). Exit status 65 (`EX_DATAERR`) reports
/// input the embedder refuses and is not retried; any other non-zero status or
/// a missed deadline counts as transient.
pub struct CommandProvider {
    command: String,
    model: String,
    batch_size: usize,
    timeout: Duration,
}

impl CommandProvider {
    pub fn new(command: String, model: String) -> Self {
        Self {
            command,
            model,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run_command(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
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
            .map_err(|e| {
                EmbeddingError::Transient(format!(
                    "failed to spawn embedding command `{}`: {}",
                    self.command, e
                ))
            })?;

        let deadline = Instant::now() + self.timeout;
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);
        // A child that never drains stdin must not stall us past the deadline
        let writer = child
            .stdin
            .take()
            .map(|stdin| spawn_writer(stdin, payload.to_string()));

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    reap(&mut child);
                    return Err(EmbeddingError::Timeout(self.timeout));
                }
                Ok(None) => thread::sleep(COMMAND_POLL_INTERVAL),
                Err(e) => {
                    reap(&mut child);
                    return Err(EmbeddingError::Transient(format!(
                        "failed to wait for embedding command: {}",
                        e
                    )));
                }
            }
        };

        let write_result = writer
            .and_then(|h| h.join().ok())
            .unwrap_or(Ok(()));
        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);

        if status.code() == Some(EXIT_INVALID_INPUT) {
            return Err(EmbeddingError::InvalidInput(format!(
                "embedding command rejected input: {}",
                stderr.trim()
            )));
        }
        if !status.success() {
            return Err(EmbeddingError::Transient(format!(
                "embedding command failed (status {}): {}",
                status,
                stderr.trim()
            )));
        }
        if let Err(e) = write_result {
            debug!("embedding command exited before reading its payload: {}", e);
        }

        parse_command_output(&stdout)
    }
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.run_command(texts)?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::Provider(format!(
                "embedding command returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        let _ = pipe.read_to_string(&mut buf);
        buf
    })
}

fn spawn_writer<W: Write + Send + 'static>(
    mut pipe: W,
    payload: String,
) -> thread::JoinHandle<std::io::Result<()>> {
    // Dropping the pipe at the end closes the child's stdin
    thread::spawn(move || pipe.write_all(payload.as_bytes()))
}

/// Kills the child and collects its exit status so it does not linger.
fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn join_reader(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn parse_command_output(stdout: &str) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
    let malformed = |msg: &str| EmbeddingError::Provider(msg.to_string());

    let parsed: Value = serde_json::from_str(stdout.trim())
        .map_err(|e| EmbeddingError::Provider(format!("embedding output is not JSON: {}", e)))?;

    let embeddings_value = match parsed {
        Value::Array(arr) => Value::Array(arr),
        Value::Object(ref obj) => {
            if let Some(value) = obj.get("embeddings") {
                value.clone()
            } else if let Some(value) = obj.get("vectors") {
                value.clone()
            } else if let Some(value) = obj.get("data") {
                value.clone()
            } else {
                return Err(malformed("embedding output missing 'embeddings' field"));
            }
        }
        _ => return Err(malformed("embedding output must be JSON array or object")),
    };

    embeddings_value
        .as_array()
        .ok_or_else(|| malformed("embeddings output must be a JSON array"))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| malformed("embedding row must be an array"))?
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .map(|v| v as f32)
                        .ok_or_else(|| malformed("embedding value must be a number"))
                })
                .collect()
        })
        .collect()
}

/// Deterministic provider hashing whitespace tokens into signed buckets.
///
/// Texts that share tokens get positive cosine similarity; texts with no
/// shared tokens are nearly orthogonal.
pub struct HashingProvider {
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl HashingProvider {
    /// Creates a new hashing provider with specified dimension.
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            model: format!("hash-{}", dimension),
            dimension,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens: HashSet<String> = text.split_whitespace().map(str::to_lowercase).collect();
        for token in tokens {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as usize
                % self.dimension;
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

    fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Builds the configured provider, wrapped with retry on transient failures.
pub fn create_provider(
    config: &EmbeddingConfig,
    retry: &RetryConfig,
) -> Result<Box<dyn EmbeddingProvider>> {
    let inner: Box<dyn EmbeddingProvider> = match config.provider() {
        EmbeddingProviderType::Builtin => Box::new(FastEmbedder::new(
            EmbeddingProviderConfig::from_config(config)?,
        )?),
        EmbeddingProviderType::Command => Box::new(
            CommandProvider::new(config.command().to_string(), config.model().to_string())
                .with_batch_size(config.batch_size())
                .with_timeout(config.timeout()),
        ),
        EmbeddingProviderType::Hash => Box::new(HashingProvider::new(config.dimension())),
    };

    Ok(Box::new(
        RetryingProvider::new(inner)
            .with_max_attempts(retry.max_attempts())
            .with_initial_delay(retry.initial_delay())
            .with_max_delay(retry.max_delay()),
    ))
}

fn truncate_texts<'a>(texts: &'a [String], max_chars: usize) -> Vec<Cow<'a, str>> {
    texts
        .iter()
        .map(|text| truncate_to_chars(text.as_str(), max_chars))
        .collect()
}

fn truncate_to_chars<'a>(input: &'a str, max_chars: usize) -> Cow<'a, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

fn parse_model(raw: &str) -> Result<EmbeddingModel> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(EmbeddingModel::AllMiniLML6V2);
    }

    match value.to_lowercase().as_str() {
        "minilm"
        | "all-minilm-l6-v2"
        | "allminilm-l6-v2"
        | "sentence-transformers/all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small" | "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => {
            Ok(EmbeddingModel::BGESmallENV15)
        }
        "bge-base" | "bge-base-en-v1.5" | "baai/bge-base-en-v1.5" => {
            Ok(EmbeddingModel::BGEBaseENV15)
        }
        "bge-large" | "bge-large-en-v1.5" | "baai/bge-large-en-v1.5" => {
            Ok(EmbeddingModel::BGELargeENV15)
        }
        other => Err(Error::Config(format!(
            "Unsupported embedding model '{}'. Supported values: {}, bge-small, bge-base, bge-large",
            other, DEFAULT_FASTEMBED_MODEL
        ))),
    }
}

fn parse_usize_env(name: &str, default: usize) -> Result<usize> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                Ok(default)
            } else {
                value
                    .parse::<usize>()
                    .map_err(|_| Error::Config(format!("Invalid {} value: {}", name, value)))
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(Error::Config(format!("Failed to read {}: {}", name, err))),
    }
}

fn parse_bool_env(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim().to_lowercase();
            if value.is_empty() {
                return Ok(default);
            }
            match value.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(Error::Config(format!("Invalid {} value: {}", name, other))),
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(Error::Config(format!("Failed to read {}: {}", name, err))),
    }
}
