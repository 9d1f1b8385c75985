//! Embedding providers for knowledge documents.
//!
//! - **[`DisabledProvider`]**: every call fails; used when
//!   `embedding.provider = "disabled"`.
//! - **[`OpenAIProvider`]**: `POST https://api.openai.com/v1/embeddings`,
//!   key from `OPENAI_API_KEY`.
//! - **[`CohereProvider`]**: `POST https://api.cohere.ai/v1/embed`, key from
//!   `COHERE_API_KEY`. Cohere distinguishes documents from queries, which
//!   is why [`EmbeddingProvider::embed`] takes an [`InputKind`].
//!
//! Vectors are stored in SQLite as little-endian `f32` BLOBs
//! ([`vec_to_blob`] / [`blob_to_vec`]) and ranked with
//! [`cosine_similarity`].
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx: retry with exponential backoff (1s, 2s, 4s, ... capped at 32s)
//! - other HTTP 4xx: fail immediately
//! - network errors: retry

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;

const OPENAI_URL: &str = "https://api.openai.com/v1/embeddings";
const COHERE_URL: &str = "https://api.cohere.ai/v1/embed";

/// What a text will be used for once embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Document,
    Query,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;

    /// Embed `texts`, returning one vector per input in input order.
    async fn embed(&self, texts: &[String], kind: InputKind) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single text.
pub async fn embed_one(
    provider: &dyn EmbeddingProvider,
    text: &str,
    kind: InputKind,
) -> Result<Vec<f32>> {
    let results = provider.embed(&[text.to_string()], kind).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Instantiate the provider named by `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "cohere" => Ok(Box::new(CohereProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled Provider ============

pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String], _kind: InputKind) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ HTTP plumbing shared by remote providers ============

struct HttpEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    api_key: String,
    batch_size: usize,
    max_retries: u32,
}

impl HttpEmbedder {
    fn from_config(config: &EmbeddingConfig, key_var: &str) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            anyhow::anyhow!("embedding.model required for {} provider", config.provider)
        })?;
        let dims = config.dims.ok_or_else(|| {
            anyhow::anyhow!("embedding.dims required for {} provider", config.provider)
        })?;
        let api_key = match std::env::var(key_var) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("{} environment variable not set", key_var),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            model,
            dims,
            api_key,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }

    /// POST `body` to `url`, retrying on 429/5xx and network errors.
    async fn post_json(&self, label: &str, url: &str, body: &Value) -> Result<Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(provider = label, attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(url)
                .bearer_auth(&self.api_key)
                .header("Accept", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(provider = label, %status, "embedding request failed; will retry");
                        last_err = Some(anyhow::anyhow!(
                            "{} API error {}: {}",
                            label,
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("{} API error {}: {}", label, status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| anyhow::anyhow!("{} embedding failed after retries", label)))
    }
}

// ============ OpenAI Provider ============

pub struct OpenAIProvider {
    http: HttpEmbedder,
}

impl OpenAIProvider {
    /// # Errors
    ///
    /// Fails if `model` or `dims` is unset, or `OPENAI_API_KEY` is missing.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            http: HttpEmbedder::from_config(config, "OPENAI_API_KEY")?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.http.model
    }
    fn dims(&self) -> usize {
        self.http.dims
    }

    async fn embed(&self, texts: &[String], _kind: InputKind) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.http.batch_size) {
            let body = json!({ "model": self.http.model, "input": batch });
            let json = self.http.post_json("OpenAI", OPENAI_URL, &body).await?;
            out.extend(parse_openai_response(&json)?);
        }
        Ok(out)
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
pub fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, json_to_vec(embedding, "OpenAI")?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Cohere Provider ============

pub struct CohereProvider {
    http: HttpEmbedder,
}

impl CohereProvider {
    /// # Errors
    ///
    /// Fails if `model` or `dims` is unset, or `COHERE_API_KEY` is missing.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            http: HttpEmbedder::from_config(config, "COHERE_API_KEY")?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for CohereProvider {
    fn model_name(&self) -> &str {
        &self.http.model
    }
    fn dims(&self) -> usize {
        self.http.dims
    }

    async fn embed(&self, texts: &[String], kind: InputKind) -> Result<Vec<Vec<f32>>> {
        let input_type = match kind {
            InputKind::Document => "search_document",
            InputKind::Query => "search_query",
        };

        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.http.batch_size) {
            let body = json!({
                "model": self.http.model,
                "texts": batch,
                "input_type": input_type,
            });
            let json = self.http.post_json("Cohere", COHERE_URL, &body).await?;
            out.extend(parse_cohere_response(&json)?);
        }
        Ok(out)
    }
}

/// Extract `embeddings`, accepting both the plain array form and the
/// typed `{ "float": [...] }` form.
pub fn parse_cohere_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json.get("embeddings").ok_or_else(|| {
        anyhow::anyhow!("Invalid Cohere response: missing embeddings")
    })?;
    let embeddings = embeddings
        .get("float")
        .unwrap_or(embeddings)
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid Cohere response: embeddings is not an array"))?;

    embeddings
        .iter()
        .map(|e| json_to_vec(e, "Cohere"))
        .collect()
}

fn json_to_vec(value: &Value, label: &str) -> Result<Vec<f32>> {
    let values = value.as_array().ok_or_else(|| {
        anyhow::anyhow!("Invalid {} response: embedding is not an array", label)
    })?;
    Ok(values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian bytes for a SQLite BLOB.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, zero, or
/// mismatched-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_similarity() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_openai_missing_data() {
        assert!(parse_openai_response(&json!({ "error": "nope" })).is_err());
    }

    #[test]
    fn test_parse_cohere_both_shapes() {
        let plain = json!({ "embeddings": [[0.5, 0.25]] });
        assert_eq!(parse_cohere_response(&plain).unwrap(), vec![vec![0.5, 0.25]]);

        let typed = json!({ "embeddings": { "float": [[0.5, 0.25], [1.0, 0.0]] } });
        assert_eq!(parse_cohere_response(&typed).unwrap().len(), 2);

        assert!(parse_cohere_response(&json!({})).is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider_fails() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.model_name(), "disabled");
        assert!(embed_one(provider.as_ref(), "نص", InputKind::Query)
            .await
            .is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = EmbeddingConfig {
            provider: "mystery".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }
}
