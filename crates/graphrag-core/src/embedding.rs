//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, plus pure helpers for normalization, similarity and vector
//! serialization.
//!
//! Concrete providers (OpenAI-compatible, Ollama, fastembed) live in the
//! `graphrag-harness` app crate.

use async_trait::async_trait;
use std::sync::OnceLock;

use crate::error::Result;

/// Text-to-vector backend.
///
/// Contract:
/// - output order matches input order;
/// - an empty input returns an empty output without contacting the backend;
/// - any failure fails the whole call with [`Error::Embedding`](crate::Error::Embedding)
///   or [`Error::BackendUnavailable`](crate::Error::BackendUnavailable);
///   there are no partial results.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Vector width: learned from the first successful call, otherwise the
    /// model's default.
    fn dimension(&self) -> usize;

    /// `false` for the disabled provider. Retrieval in `Auto` mode skips the
    /// semantic branch when this is `false`.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_texts(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| crate::Error::embedding("provider returned no vector for query"))
    }
}

/// Default vector width for well-known models; 1024 otherwise.
pub fn default_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
        "text-embedding-3-large" => 3072,
        "nomic-embed-text" => 768,
        "all-minilm-l6-v2" | "all-MiniLM-L6-v2" => 384,
        _ => 1024,
    }
}

/// Dimension learned from the first successful embedding, falling back to a
/// fixed default until then. Set once; later observations are ignored.
#[derive(Debug)]
pub struct DimensionCache {
    fallback: usize,
    observed: OnceLock<usize>,
}

impl DimensionCache {
    pub fn new(fallback: usize) -> Self {
        Self {
            fallback,
            observed: OnceLock::new(),
        }
    }

    pub fn for_model(model: &str) -> Self {
        Self::new(default_dimension(model))
    }

    /// Record the width of a batch's first vector.
    pub fn observe(&self, vectors: &[Vec<f32>]) {
        if let Some(first) = vectors.first() {
            let _ = self.observed.set(first.len());
        }
    }

    pub fn get(&self) -> usize {
        self.observed.get().copied().unwrap_or(self.fallback)
    }
}

/// Scale `v` to unit length in place. A zero vector stays zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Encode a float vector as little-endian f32 bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes; a trailing partial value is ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
