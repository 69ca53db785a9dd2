//! Bounded pool for blocking work.
//!
//! Vector index rebuilds and searches, index file I/O, and local model
//! inference run on tokio's blocking threads, at most `size` at a time.
//! Async callers simply `.await` the job.

use graphrag_core::{Error, Result};
use std::io;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `job` on a blocking thread once a permit is free.
    ///
    /// A panicking job surfaces as [`Error::Io`].
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Io(io::Error::other(e)))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| Error::Io(io::Error::other(format!("worker job failed: {}", e))))?
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(2)
    }
}
