//! Upload worker pool
//!
//! Multipart decoding is synchronous and does blocking file I/O, so each
//! upload runs on the blocking thread pool. A semaphore caps how many run
//! at once; further uploads wait for a permit while their bodies back up
//! in the bounded feed channel.

use super::ServerError;
use crate::metrics::UPLOADS_IN_FLIGHT;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Bounded pool of blocking decode workers
#[derive(Debug, Clone)]
pub struct UploadPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl UploadPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// `multiplier` workers per available CPU
    pub fn with_multiplier(multiplier: usize) -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(cpus.saturating_mul(multiplier))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers not currently busy
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `job` on a blocking worker once a permit is free.
    pub async fn run<F, T>(&self, job: F) -> Result<T, ServerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ServerError::RuntimeError("Upload pool closed".into()))?;

        // Released with the job, even when the caller is dropped mid-await
        let in_flight = InFlight::enter();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _in_flight = in_flight;
            job()
        })
        .await
        .map_err(|e| ServerError::RuntimeError(format!("Upload worker failed: {}", e)))
    }
}

/// Holds one unit of the in-flight gauge
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        UPLOADS_IN_FLIGHT.inc();
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        UPLOADS_IN_FLIGHT.dec();
    }
}
