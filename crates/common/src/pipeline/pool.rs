use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::{Categorize, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("job timed out after {0:?}")]
    Timeout(Duration),
    #[error("worker pool is closed")]
    Closed,
    /// Only observable when panics unwind; the release profile aborts instead
    #[error("job panicked: {0}")]
    Panicked(String),
}

impl Categorize for PoolError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Io
    }
}

/// Bounded admission gate for pipeline jobs
///
/// At most `concurrency` jobs run at once; each is cut off after `timeout`.
/// A timed-out job is dropped at its current suspension point.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    timeout: Duration,
}

impl WorkerPool {
    pub fn new(concurrency: usize, timeout: Duration) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            timeout,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Permits not currently held by a running job
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Stop admitting jobs; running jobs finish normally
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Run `job` once a permit is free
    pub async fn run<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: Future<Output = T>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| PoolError::Closed)?;
        tokio::time::timeout(self.timeout, job)
            .await
            .map_err(|_| PoolError::Timeout(self.timeout))
    }

    /// Spawn every job and collect the results in input order
    ///
    /// A panicking job yields [`PoolError::Panicked`] in builds that unwind.
    /// With `panic = "abort"` the process exits instead.
    pub async fn run_all<I, F, T>(&self, jobs: I) -> Vec<Result<T, PoolError>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let pool = self.clone();
                tokio::spawn(async move { pool.run(job).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(PoolError::Panicked(e.to_string())),
            });
        }
        results
    }
}
