//! Embedding provider implementations.
//!
//! Concrete backends for [`graphrag_core::embedding::EmbeddingProvider`]:
//! - **[`DisabledProvider`]**: fails every non-empty call; retrieval falls
//!   back to keyword-only.
//! - **[`OpenAIProvider`]**: any OpenAI-compatible `POST {url}/embeddings`
//!   endpoint, batched, with retry and backoff.
//! - **[`OllamaProvider`]**: a local Ollama instance's `/api/embed`.
//! - **`LocalProvider`**: in-process inference via fastembed (feature
//!   `local-embeddings-fastembed`).
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use graphrag_core::embedding::EmbeddingProvider;
//! # use graphrag_harness::config::EmbeddingConfig;
//! # use graphrag_harness::embedding::create_provider;
//! # use graphrag_harness::pool::WorkerPool;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let provider = create_provider(&config, &WorkerPool::default()).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```
//!
//! # Retry Strategy
//!
//! The HTTP providers retry transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! A batch either fully succeeds or the whole call fails; results are put
//! back into input order using the backend-supplied `index`.

#[cfg(feature = "local-embeddings-fastembed")]
mod local;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalProvider;

use anyhow::bail;
use async_trait::async_trait;
use graphrag_core::embedding::{DimensionCache, EmbeddingProvider};
use graphrag_core::{Error, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::pool::WorkerPool;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

// ============ Disabled Provider ============

/// Used when `embedding.provider = "disabled"`.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dimension(&self) -> usize {
        0
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        Err(Error::BackendUnavailable(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI Provider ============

/// Embedding provider for OpenAI-compatible APIs.
///
/// `OPENAI_API_KEY` is read on the first embedding call, not at
/// construction, so a misconfigured key surfaces as
/// [`Error::BackendUnavailable`] at first use.
pub struct OpenAIProvider {
    model: String,
    endpoint: String,
    client: reqwest::Client,
    batch_size: usize,
    max_retries: u32,
    dims: DimensionCache,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let base = config.url.as_deref().unwrap_or(DEFAULT_OPENAI_URL);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            dims: config
                .dims
                .map(DimensionCache::new)
                .unwrap_or_else(|| DimensionCache::for_model(&model)),
            endpoint: format!("{}/embeddings", base.trim_end_matches('/')),
            model,
            client,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dims.get()
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            Error::BackendUnavailable("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = post_with_retry(
                &self.client,
                &self.endpoint,
                Some(&api_key),
                &body,
                self.max_retries,
                "OpenAI",
            )
            .await
            .map_err(Error::embedding)?;
            vectors.extend(parse_openai_response(&json, batch.len()).map_err(Error::embedding)?);
        }

        self.dims.observe(&vectors);
        tracing::debug!(model = %self.model, count = vectors.len(), "embedded texts");
        Ok(vectors)
    }
}

/// Extract `data[].embedding`, restoring input order from `data[].index`.
fn parse_openai_response(json: &Value, expected: usize) -> anyhow::Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, parse_vector(embedding)?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    if indexed.len() != expected {
        bail!(
            "OpenAI returned {} embeddings for {} inputs",
            indexed.len(),
            expected
        );
    }
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default:
/// `http://localhost:11434`). Requires an embedding model to be pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    model: String,
    url: String,
    client: reqwest::Client,
    batch_size: usize,
    max_retries: u32,
    dims: DimensionCache,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            dims: config
                .dims
                .map(DimensionCache::new)
                .unwrap_or_else(|| DimensionCache::for_model(&model)),
            model,
            url: url.trim_end_matches('/').to_string(),
            client,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dims.get()
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let endpoint = format!("{}/api/embed", self.url);

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = post_with_retry(
                &self.client,
                &endpoint,
                None,
                &body,
                self.max_retries,
                "Ollama",
            )
            .await
            .map_err(Error::embedding)?;
            vectors.extend(parse_ollama_response(&json, batch.len()).map_err(Error::embedding)?);
        }

        self.dims.observe(&vectors);
        Ok(vectors)
    }
}

fn parse_ollama_response(json: &Value, expected: usize) -> anyhow::Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let result = embeddings
        .iter()
        .map(parse_vector)
        .collect::<anyhow::Result<Vec<_>>>()?;
    if result.len() != expected {
        bail!(
            "Ollama returned {} embeddings for {} inputs",
            result.len(),
            expected
        );
    }
    Ok(result)
}

fn parse_vector(value: &Value) -> anyhow::Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding: not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow::anyhow!("Invalid embedding: non-numeric component"))
        })
        .collect()
}

// ============ HTTP transport ============

/// POST `body` as JSON, retrying 429/5xx responses and network errors.
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    max_retries: u32,
    backend: &str,
) -> anyhow::Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::warn!(backend, attempt, ?delay, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = bearer {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        backend,
                        status,
                        body_text
                    ));
                    continue;
                }

                // Client error (not 429): fail now
                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", backend, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!(
                    "{} connection error ({}): {}",
                    backend,
                    url,
                    e
                ));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} embedding failed after retries", backend)))
}

/// Create the [`EmbeddingProvider`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (feature `local-embeddings-fastembed`) |
#[cfg_attr(not(feature = "local-embeddings-fastembed"), allow(unused_variables))]
pub fn create_provider(
    config: &EmbeddingConfig,
    pool: &WorkerPool,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config, pool.clone())?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_openai_response_restores_input_order() {
        let json = json!({
            "data": [
                {"index": 2, "embedding": [0.2, 0.2]},
                {"index": 0, "embedding": [0.0, 0.0]},
                {"index": 1, "embedding": [0.1, 0.1]}
            ]
        });
        let vectors = parse_openai_response(&json, 3).unwrap();
        assert_eq!(vectors[0], vec![0.0, 0.0]);
        assert_eq!(vectors[1], vec![0.1f32, 0.1]);
        assert_eq!(vectors[2], vec![0.2f32, 0.2]);
    }

    #[test]
    fn test_openai_response_count_mismatch_fails() {
        let json = json!({"data": [{"index": 0, "embedding": [1.0]}]});
        assert!(parse_openai_response(&json, 2).is_err());
        assert!(parse_openai_response(&json!({}), 1).is_err());
    }

    #[test]
    fn test_ollama_response() {
        let json = json!({"embeddings": [[1.0, 2.0], [3.0, 4.0]]});
        let vectors = parse_ollama_response(&json, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let bad = json!({"embeddings": [[1.0, "x"]]});
        assert!(parse_ollama_response(&bad, 1).is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider() {
        let provider = DisabledProvider;
        assert!(!provider.is_enabled());
        assert!(provider.embed_texts(&[]).await.unwrap().is_empty());
        let err = provider.embed_query("hello").await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_openai_empty_batch_skips_backend() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            model: Some("text-embedding-3-small".into()),
            url: Some("http://127.0.0.1:9".into()),
            ..EmbeddingConfig::default()
        };
        let provider = OpenAIProvider::new(&config).unwrap();
        assert_eq!(provider.dimension(), 1536);
        assert!(provider.embed_texts(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_create_provider_rejects_unknown() {
        let config = EmbeddingConfig {
            provider: "cohere".into(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config, &WorkerPool::default()).is_err());
    }
}
