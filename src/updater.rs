//! Incremental index maintenance.
//!
//! [`IndexUpdater`] owns the write side of one graph/vector pair. Every
//! mutation holds a single async lock for its full duration and goes:
//!
//! ```text
//! chunk → embed (one batch) → vector upsert → delete stale vectors
//!       → one graph splice → publish → persist
//! ```
//!
//! Readers keep using the previous graph snapshot until the splice is
//! published. A failure before the splice leaves the graph untouched.
//!
//! Document ids map onto the index as:
//! - node `doc:<id>` titled with the document source, owning every chunk
//! - nodes `sec:<id>:<i>` for chunks that carry a section
//! - chunks `chunk:doc:<id>:<i>` with source `doc:<id>`
//! - edges `doc → sec` (`contains`) and `sec(i-1) → sec(i)` (`next`)

use graphrag_core::chunk::{chunk_document, document_section_id};
use graphrag_core::embedding::EmbeddingProvider;
use graphrag_core::graph::{GraphIndex, GraphPatch, SharedGraph};
use graphrag_core::models::{document_node_id, Chunk, Document, Edge, Node};
use graphrag_core::store::{VectorIndex, VectorRecord};
use graphrag_core::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::persist::{read_graph, write_graph};
use crate::pool::WorkerPool;

pub const CONTAINS: &str = "contains";
pub const NEXT: &str = "next";

/// On-disk locations of a graph/vector pair.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub graph: PathBuf,
    pub vectors: PathBuf,
}

/// Result of an ingestion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub chunks_affected: usize,
    pub message: String,
}

impl IngestResponse {
    fn ok(chunks_affected: usize, message: String) -> Self {
        Self {
            success: true,
            chunks_affected,
            message,
        }
    }

    fn failed(err: &Error) -> Self {
        Self {
            success: false,
            chunks_affected: 0,
            message: err.to_string(),
        }
    }
}

pub struct IndexUpdater {
    graph: Arc<SharedGraph>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    pool: WorkerPool,
    paths: Option<IndexPaths>,
    lock: Mutex<()>,
}

impl IndexUpdater {
    pub fn new(
        graph: Arc<SharedGraph>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            graph,
            vectors,
            embedder,
            pool,
            paths: None,
            lock: Mutex::new(()),
        }
    }

    /// Persist both indexes to `paths` after every mutation.
    pub fn with_paths(mut self, paths: IndexPaths) -> Self {
        self.paths = Some(paths);
        self
    }

    pub fn graph(&self) -> &Arc<SharedGraph> {
        &self.graph
    }

    pub fn vectors(&self) -> &Arc<dyn VectorIndex> {
        &self.vectors
    }

    /// Index `doc`, replacing any previous version with the same id.
    /// Returns the number of chunks now indexed for it.
    pub async fn add_document(&self, doc: &Document) -> Result<usize> {
        self.replace_document(doc).await
    }

    /// Replace the indexed version of `doc` in one transaction.
    pub async fn update_document(&self, doc: &Document) -> Result<usize> {
        self.replace_document(doc).await
    }

    /// Remove every trace of document `doc_id`. Returns the number of
    /// chunks removed; 0 when the document is not indexed.
    pub async fn remove_document(&self, doc_id: &str) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let current = self.graph.snapshot();

        let patch = removal_patch(&current, doc_id);
        if patch.is_empty() {
            tracing::debug!(doc_id, "remove: document not indexed");
            return Ok(0);
        }
        let removed = patch.remove_chunks.len();

        let stale: Vec<String> = patch.remove_chunks.iter().cloned().collect();
        self.vectors.delete(&stale).await?;

        self.graph.publish(current.splice(patch));
        self.persist_locked().await?;

        tracing::info!(doc_id, chunks = removed, "removed document");
        Ok(removed)
    }

    /// [`add_document`](Self::add_document) reported as an [`IngestResponse`].
    pub async fn ingest(&self, doc: &Document) -> IngestResponse {
        match self.add_document(doc).await {
            Ok(n) => IngestResponse::ok(n, format!("indexed {} chunks from {}", n, doc.id)),
            Err(e) => {
                tracing::warn!(doc_id = %doc.id, error = %e, "ingest failed");
                IngestResponse::failed(&e)
            }
        }
    }

    /// [`update_document`](Self::update_document) reported as an [`IngestResponse`].
    pub async fn update(&self, doc: &Document) -> IngestResponse {
        match self.update_document(doc).await {
            Ok(n) => IngestResponse::ok(n, format!("updated {} with {} chunks", doc.id, n)),
            Err(e) => {
                tracing::warn!(doc_id = %doc.id, error = %e, "update failed");
                IngestResponse::failed(&e)
            }
        }
    }

    /// [`remove_document`](Self::remove_document) reported as an [`IngestResponse`].
    pub async fn remove(&self, doc_id: &str) -> IngestResponse {
        match self.remove_document(doc_id).await {
            Ok(0) => IngestResponse::ok(0, format!("{} is not indexed", doc_id)),
            Ok(n) => IngestResponse::ok(n, format!("removed {} chunks of {}", n, doc_id)),
            Err(e) => {
                tracing::warn!(doc_id, error = %e, "remove failed");
                IngestResponse::failed(&e)
            }
        }
    }

    /// Re-read both indexes from their configured paths.
    pub async fn reload(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        let Some(paths) = self.paths.clone() else {
            return Ok(());
        };
        self.vectors.load(&paths.vectors).await?;
        let graph = self.pool.run(move || read_graph(&paths.graph)).await?;
        let published = self.graph.publish(graph);
        tracing::info!(
            nodes = published.node_count(),
            chunks = published.chunk_count(),
            vectors = self.vectors.len(),
            "reloaded indexes"
        );
        Ok(())
    }

    async fn replace_document(&self, doc: &Document) -> Result<usize> {
        let _guard = self.lock.lock().await;

        let chunks = chunk_document(doc);
        let embedding = self.embedder.is_enabled();
        if chunks.is_empty() {
            tracing::debug!(doc_id = %doc.id, "document has no text to index");
        } else if embedding {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_texts(&texts).await?;
            if vectors.len() != chunks.len() {
                return Err(Error::embedding(format!(
                    "provider returned {} vectors for {} chunks",
                    vectors.len(),
                    chunks.len()
                )));
            }
            let records = chunks
                .iter()
                .zip(vectors)
                .map(|(c, v)| VectorRecord::new(c.id.clone(), v, c.metadata.clone()))
                .collect();
            self.vectors.add(records).await?;
        } else {
            tracing::debug!(doc_id = %doc.id, "embeddings disabled; indexing graph only");
        }

        let current = self.graph.snapshot();
        let mut patch = removal_patch(&current, &doc.id);
        // Without embeddings the old vectors are not overwritten; reused
        // ids are stale too.
        let fresh: HashSet<&str> = if embedding {
            chunks.iter().map(|c| c.id.as_str()).collect()
        } else {
            HashSet::new()
        };
        let stale: Vec<String> = patch
            .remove_chunks
            .iter()
            .filter(|id| !fresh.contains(id.as_str()))
            .cloned()
            .collect();
        self.vectors.delete(&stale).await?;

        let replaced = !patch.is_empty();
        let count = chunks.len();
        let (nodes, edges) = document_structure(doc, &chunks);
        patch.add_nodes = nodes;
        patch.add_edges = edges;
        patch.add_chunks = chunks;

        self.graph.publish(current.splice(patch));
        self.persist_locked().await?;

        tracing::info!(
            doc_id = %doc.id,
            chunks = count,
            stale = stale.len(),
            replaced,
            "indexed document"
        );
        Ok(count)
    }

    async fn persist_locked(&self) -> Result<()> {
        let Some(paths) = &self.paths else {
            return Ok(());
        };
        self.vectors.save(&paths.vectors).await?;
        let snapshot = self.graph.snapshot();
        let path = paths.graph.clone();
        self.pool.run(move || write_graph(&path, &snapshot)).await
    }
}

/// A patch dropping document `doc_id`: its chunks (exact source match),
/// its document node and its section nodes. Empty when nothing matches.
fn removal_patch(graph: &GraphIndex, doc_id: &str) -> GraphPatch {
    let node_id = document_node_id(doc_id);
    let section_prefix = format!("sec:{}:", doc_id);

    let remove_chunks: BTreeSet<String> = graph
        .chunks()
        .filter(|c| c.source.as_deref() == Some(node_id.as_str()))
        .map(|c| c.id.clone())
        .collect();

    let mut remove_nodes: BTreeSet<String> = graph
        .nodes()
        .filter_map(|n| {
            let ordinal = n.id.strip_prefix(&section_prefix)?;
            (!ordinal.is_empty() && ordinal.bytes().all(|b| b.is_ascii_digit()))
                .then(|| n.id.clone())
        })
        .collect();
    if graph.node(&node_id).is_some() {
        remove_nodes.insert(node_id);
    }

    GraphPatch {
        remove_nodes,
        remove_chunks,
        ..GraphPatch::default()
    }
}

/// Nodes and edges describing `doc` and its freshly chunked sections.
fn document_structure(doc: &Document, chunks: &[Chunk]) -> (Vec<Node>, Vec<Edge>) {
    let doc_node = doc.node_id();
    let title = match doc.source.trim() {
        "" => doc.id.clone(),
        source => source.to_string(),
    };
    let mut nodes = vec![Node::new(
        doc_node.clone(),
        title,
        chunks.iter().map(|c| c.id.clone()),
    )];
    let mut edges = Vec::new();

    let mut previous: Option<String> = None;
    for (i, chunk) in chunks.iter().enumerate() {
        let Some(section) = &chunk.section else {
            continue;
        };
        let section_node = document_section_id(&doc.id, i);
        nodes.push(Node::new(
            section_node.clone(),
            section.clone(),
            [chunk.id.clone()],
        ));
        edges.push(Edge::new(doc_node.clone(), section_node.clone(), CONTAINS));
        if let Some(prev) = previous.replace(section_node.clone()) {
            edges.push(Edge::new(prev, section_node, NEXT));
        }
    }

    (nodes, edges)
}
