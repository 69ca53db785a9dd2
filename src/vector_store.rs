//! Persistent flat vector store.
//!
//! [`FlatVectorStore`] implements [`VectorIndex`] over a
//! [`FlatIndex`] guarded by its own read/write lock: searches run
//! concurrently with each other, `add`/`delete` (and the rebuild they
//! trigger) are exclusive. All CPU and file work runs on the
//! [`WorkerPool`].
//!
//! On disk the store is a directory holding `index.flat` and `meta.json`
//! (see [`graphrag_core::store::flat`]).

use async_trait::async_trait;
use graphrag_core::store::flat::{FlatIndex, DEFAULT_OVERFETCH, MATRIX_FILE, META_FILE};
use graphrag_core::store::{Filters, VectorHit, VectorIndex, VectorRecord};
use graphrag_core::Result;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::persist::write_atomic;
use crate::pool::WorkerPool;

pub struct FlatVectorStore {
    inner: Arc<RwLock<FlatIndex>>,
    pool: WorkerPool,
    overfetch: usize,
}

impl FlatVectorStore {
    pub fn new(pool: WorkerPool) -> Self {
        Self {
            inner: Arc::new(RwLock::new(FlatIndex::new())),
            pool,
            overfetch: DEFAULT_OVERFETCH,
        }
    }

    pub fn with_overfetch(mut self, overfetch: usize) -> Self {
        self.overfetch = overfetch.max(1);
        self
    }

    /// Open `dir` if it holds a saved index, otherwise start empty.
    pub async fn open(pool: WorkerPool, dir: &Path, overfetch: usize) -> Result<Self> {
        let store = Self::new(pool).with_overfetch(overfetch);
        store.load(dir).await?;
        Ok(store)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}

#[async_trait]
impl VectorIndex for FlatVectorStore {
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let inner = Arc::clone(&self.inner);
        let count = records.len();
        self.pool
            .run(move || {
                inner
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .add(records)
            })
            .await?;
        tracing::debug!(count, "added vectors");
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filters: Option<&Filters>,
    ) -> Result<Vec<VectorHit>> {
        let inner = Arc::clone(&self.inner);
        let query = query.to_vec();
        let filters = filters.cloned();
        let overfetch = self.overfetch;
        self.pool
            .run(move || {
                inner
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .search(&query, top_k, filters.as_ref(), overfetch)
            })
            .await
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let inner = Arc::clone(&self.inner);
        let ids = ids.to_vec();
        let removed = self
            .pool
            .run(move || {
                Ok(inner
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .delete(&ids))
            })
            .await?;
        tracing::debug!(removed, "deleted vectors");
        Ok(removed)
    }

    async fn save(&self, dir: &Path) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let dir = dir.to_path_buf();
        self.pool
            .run(move || {
                let files = inner
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .encode()?;
                fs::create_dir_all(&dir)?;
                write_atomic(&dir.join(MATRIX_FILE), &files.matrix)?;
                write_atomic(&dir.join(META_FILE), &files.meta)?;
                tracing::debug!(dir = %dir.display(), "saved vector index");
                Ok(())
            })
            .await
    }

    async fn load(&self, dir: &Path) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let dir = dir.to_path_buf();
        self.pool
            .run(move || {
                let meta = match fs::read(dir.join(META_FILE)) {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        tracing::info!(dir = %dir.display(), "no vector index on disk");
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                };
                let matrix = match fs::read(dir.join(MATRIX_FILE)) {
                    Ok(bytes) => Some(bytes),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                    Err(e) => return Err(e.into()),
                };
                let index = FlatIndex::decode(&meta, matrix.as_deref())?;
                tracing::info!(
                    dir = %dir.display(),
                    vectors = index.len(),
                    "loaded vector index"
                );
                *inner.write().unwrap_or_else(PoisonError::into_inner) = index;
                Ok(())
            })
            .await
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
