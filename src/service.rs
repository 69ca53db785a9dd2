//! The assembled retrieval service.
//!
//! [`RagService`] wires one worker pool, one embedding provider, one vector
//! store and one shared graph together and exposes the two public calls of
//! the system: retrieval and ingestion. It is built once at startup (or by
//! each CLI invocation) and shared behind an `Arc`.
//!
//! With `index.persist = false` the service runs purely in memory: nothing
//! is written and [`RagService::reload`] is a no-op.

use anyhow::Context;
use graphrag_core::embedding::EmbeddingProvider;
use graphrag_core::graph::{GraphIndex, SharedGraph};
use graphrag_core::models::Document;
use graphrag_core::search::{
    build_context, build_context_with_citations, AccessContext, RenderedContext, RetrievalParams,
    RetrievalRequest,
};
use graphrag_core::store::VectorIndex;
use graphrag_core::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::persist::read_graph;
use crate::pool::WorkerPool;
use crate::updater::{IndexPaths, IndexUpdater, IngestResponse};
use crate::vector_store::FlatVectorStore;

/// Index sizes as reported by `grag stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub generation: u64,
    pub nodes: usize,
    pub chunks: usize,
    pub edges: usize,
    pub vectors: usize,
    pub dimension: Option<usize>,
    pub embedding_model: String,
    pub embeddings_enabled: bool,
}

pub struct RagService {
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorIndex>,
    graph: Arc<SharedGraph>,
    updater: IndexUpdater,
}

impl RagService {
    /// Build the service from configuration, loading both indexes from
    /// disk. Missing index files start empty.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let pool = WorkerPool::new(config.runtime.worker_threads);
        let embedder = create_provider(&config.embedding, &pool)?;

        let vectors = FlatVectorStore::open(
            pool.clone(),
            &config.index.vector_dir,
            config.index.overfetch,
        )
        .await
        .with_context(|| {
            format!(
                "Failed to load vector index from {}",
                config.index.vector_dir.display()
            )
        })?;

        let graph_path = config.index.graph_path.clone();
        let graph = pool
            .run(move || read_graph(&graph_path))
            .await
            .with_context(|| {
                format!(
                    "Failed to load graph index from {}",
                    config.index.graph_path.display()
                )
            })?;

        tracing::info!(
            nodes = graph.node_count(),
            chunks = graph.chunk_count(),
            vectors = vectors.len(),
            provider = %config.embedding.provider,
            "opened indexes"
        );
        Ok(Self::from_parts(config, pool, embedder, Arc::new(vectors), graph))
    }

    /// Assemble a service from already-built parts.
    pub fn from_parts(
        config: Config,
        pool: WorkerPool,
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorIndex>,
        graph: GraphIndex,
    ) -> Self {
        let graph = Arc::new(SharedGraph::new(graph));
        let mut updater = IndexUpdater::new(
            Arc::clone(&graph),
            Arc::clone(&vectors),
            Arc::clone(&embedder),
            pool,
        );
        if config.index.persist {
            updater = updater.with_paths(IndexPaths {
                graph: config.index.graph_path.clone(),
                vectors: config.index.vector_dir.clone(),
            });
        }
        Self {
            config,
            embedder,
            vectors,
            graph,
            updater,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current graph generation.
    pub fn graph(&self) -> Arc<GraphIndex> {
        self.graph.snapshot()
    }

    pub fn updater(&self) -> &IndexUpdater {
        &self.updater
    }

    /// Context for `query` with the configured retrieval parameters.
    pub async fn retrieve(&self, query: &str, access: &AccessContext) -> Result<String> {
        let graph = self.graph.snapshot();
        let req = RetrievalRequest {
            query,
            access,
            params: self.config.retrieval.clone(),
        };
        build_context(&graph, self.vectors.as_ref(), self.embedder.as_ref(), &req).await
    }

    pub async fn retrieve_with_citations(
        &self,
        query: &str,
        access: &AccessContext,
    ) -> Result<RenderedContext> {
        self.retrieve_with(query, access, self.config.retrieval.clone())
            .await
    }

    /// Context and citations for `query` with explicit parameters.
    pub async fn retrieve_with(
        &self,
        query: &str,
        access: &AccessContext,
        params: RetrievalParams,
    ) -> Result<RenderedContext> {
        let graph = self.graph.snapshot();
        let req = RetrievalRequest {
            query,
            access,
            params,
        };
        build_context_with_citations(&graph, self.vectors.as_ref(), self.embedder.as_ref(), &req)
            .await
    }

    pub async fn ingest(&self, doc: &Document) -> IngestResponse {
        self.updater.ingest(doc).await
    }

    pub async fn update(&self, doc: &Document) -> IngestResponse {
        self.updater.update(doc).await
    }

    pub async fn remove(&self, doc_id: &str) -> IngestResponse {
        self.updater.remove(doc_id).await
    }

    /// Re-read both index files, replacing the in-memory state.
    pub async fn reload(&self) -> Result<()> {
        self.updater.reload().await
    }

    pub fn stats(&self) -> IndexStats {
        let graph = self.graph.snapshot();
        IndexStats {
            generation: graph.generation(),
            nodes: graph.node_count(),
            chunks: graph.chunk_count(),
            edges: graph.edge_count(),
            vectors: self.vectors.len(),
            dimension: self.vectors.dimension(),
            embedding_model: self.embedder.model_name().to_string(),
            embeddings_enabled: self.embedder.is_enabled(),
        }
    }
}
