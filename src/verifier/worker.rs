use std::sync::Arc;

use tokio::sync::Semaphore;

use super::Error;

/// Runs CPU-bound crypto off the async executor, at most `workers` jobs at a time.
#[derive(Debug, Clone)]
pub struct CryptoPool {
    permits: Arc<Semaphore>,
}

impl CryptoPool {
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub async fn run<F, T>(&self, job: F) -> Result<T, Error>
    where
        F: FnOnce() -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Configuration("crypto pool is closed".into()))?;
        tokio::task::spawn_blocking(job).await?
    }
}
