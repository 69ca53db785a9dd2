//! In-process embeddings via fastembed.
//!
//! Models are downloaded from Hugging Face on first use and cached; after
//! that, embedding runs entirely offline. The model is loaded lazily on the
//! first call and reused, and inference runs on the [`WorkerPool`].

use anyhow::bail;
use async_trait::async_trait;
use graphrag_core::embedding::{DimensionCache, EmbeddingProvider};
use graphrag_core::{Error, Result};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::EmbeddingConfig;
use crate::pool::WorkerPool;

const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";

pub struct LocalProvider {
    model_name: String,
    model: fastembed::EmbeddingModel,
    batch_size: usize,
    dims: DimensionCache,
    engine: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
    pool: WorkerPool,
}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig, pool: WorkerPool) -> anyhow::Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
        let model = config_to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or_else(|| local_dimension(&model_name));

        Ok(Self {
            model_name,
            model,
            batch_size: config.batch_size.max(1),
            dims: DimensionCache::new(dims),
            engine: Arc::new(Mutex::new(None)),
            pool,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dims.get()
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let engine = Arc::clone(&self.engine);
        let model = self.model.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        let vectors = self
            .pool
            .run(move || {
                let mut guard = engine.lock().unwrap_or_else(PoisonError::into_inner);
                if guard.is_none() {
                    let loaded = fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(model).with_show_download_progress(false),
                    )
                    .map_err(|e| {
                        Error::BackendUnavailable(format!(
                            "Failed to initialize local embedding model: {}",
                            e
                        ))
                    })?;
                    *guard = Some(loaded);
                }
                let engine = guard.as_mut().ok_or_else(|| {
                    Error::BackendUnavailable("local embedding model not loaded".to_string())
                })?;
                engine
                    .embed(texts, Some(batch_size))
                    .map_err(|e| Error::embedding(format!("Local embedding failed: {}", e)))
            })
            .await?;

        self.dims.observe(&vectors);
        Ok(vectors)
    }
}

fn local_dimension(name: &str) -> usize {
    match name {
        "all-minilm-l6-v2" | "bge-small-en-v1.5" | "multilingual-e5-small" => 384,
        "bge-base-en-v1.5" | "multilingual-e5-base" => 768,
        "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
        _ => 384,
    }
}

fn config_to_fastembed_model(name: &str) -> anyhow::Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_rejected() {
        let config = EmbeddingConfig {
            provider: "local".into(),
            model: Some("word2vec".into()),
            ..EmbeddingConfig::default()
        };
        assert!(LocalProvider::new(&config, WorkerPool::default()).is_err());
    }

    #[test]
    fn test_default_model_dimension() {
        let config = EmbeddingConfig {
            provider: "local".into(),
            ..EmbeddingConfig::default()
        };
        let provider = LocalProvider::new(&config, WorkerPool::default()).unwrap();
        assert_eq!(provider.model_name(), "all-minilm-l6-v2");
        assert_eq!(provider.dimension(), 384);
    }
}
