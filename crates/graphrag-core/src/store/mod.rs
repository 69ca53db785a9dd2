//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines the operations the retrieval pipeline
//! and the index updater need from a similarity backend, enabling pluggable
//! implementations (the persistent flat store in the app crate, the
//! in-memory index used by tests, future ANN backends).
//!
//! Implementations must be `Send + Sync` to work with async runtimes and
//! must serialise `add`/`delete` against `search` internally.

pub mod flat;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::models::Metadata;

/// Metadata equality filters: every key must be present in a record's
/// metadata with an equal value.
pub type Filters = BTreeMap<String, String>;

/// A vector with the chunk id it belongs to and its filterable metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

impl VectorRecord {
    pub fn new(chunk_id: impl Into<String>, vector: Vec<f32>, metadata: Metadata) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            vector,
            metadata,
        }
    }
}

/// A search hit: inner product of the normalized query and stored vector.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: String,
    pub score: f32,
    pub metadata: Metadata,
}

/// Similarity index over normalized vectors.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorIndex::add) | Insert or overwrite records by chunk id |
/// | [`search`](VectorIndex::search) | Top-k by inner product, metadata-filtered |
/// | [`delete`](VectorIndex::delete) | Remove ids, returning how many existed |
/// | [`save`](VectorIndex::save) / [`load`](VectorIndex::load) | Directory persistence |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert records, overwriting any existing id. Vectors are normalized
    /// on the way in. Fails with `DimensionMismatch` without modifying the
    /// index if any vector has the wrong width.
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Up to `top_k` hits in descending score order. Filtering happens after
    /// an over-fetched similarity scan, so fewer than `top_k` hits may come
    /// back even when more matching records exist.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filters: Option<&Filters>,
    ) -> Result<Vec<VectorHit>>;

    /// Remove ids; unknown ids are ignored. Returns the number removed.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    async fn save(&self, dir: &Path) -> Result<()>;

    /// Replace the contents with what `dir` holds. A missing directory
    /// leaves the index untouched.
    async fn load(&self, dir: &Path) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed vector width, or `None` until the first vectors arrive.
    fn dimension(&self) -> Option<usize>;
}

/// `true` when every filter key is present in `metadata` with an equal value.
/// An empty filter set matches everything.
pub fn matches_filters(metadata: &Metadata, filters: &Filters) -> bool {
    filters.iter().all(|(key, expected)| match metadata.get(key) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == *expected,
    })
}
