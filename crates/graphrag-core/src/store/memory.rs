//! In-memory [`VectorIndex`] for tests and embedders that need no
//! persistence.
//!
//! Wraps a [`FlatIndex`] in a `std::sync::RwLock`; every operation completes
//! synchronously. `save`/`load` are unsupported.

use async_trait::async_trait;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use super::flat::{FlatIndex, DEFAULT_OVERFETCH};
use super::{Filters, VectorHit, VectorIndex, VectorRecord};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    inner: RwLock<FlatIndex>,
    overfetch: usize,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(FlatIndex::new()),
            overfetch: DEFAULT_OVERFETCH,
        }
    }

    pub fn with_overfetch(mut self, overfetch: usize) -> Self {
        self.overfetch = overfetch.max(1);
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(records)
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filters: Option<&Filters>,
    ) -> Result<Vec<VectorHit>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .search(query, top_k, filters, self.overfetch.max(1))
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        Ok(self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .delete(ids))
    }

    async fn save(&self, _dir: &Path) -> Result<()> {
        Err(Error::BackendUnavailable(
            "in-memory vector index cannot be persisted".to_string(),
        ))
    }

    async fn load(&self, _dir: &Path) -> Result<()> {
        Err(Error::BackendUnavailable(
            "in-memory vector index cannot be loaded".to_string(),
        ))
    }

    fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn dimension(&self) -> Option<usize> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .dimension()
    }
}
