//! Parallel processing configuration
//!
//! Lazy arrays never touch Rayon's global pool. Callers build a dedicated pool
//! from a [`ParallelConfig`] and hand it to
//! [`LazyArray::materialize_in`](crate::lazy_array::LazyArray::materialize_in),
//! so the degree of read parallelism is always explicit.

use crate::errors::{Result, TimelapseError};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

/// Configuration for parallel plane evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelConfig {
    /// Worker count; `None` lets Rayon pick one per logical core
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a new parallel configuration
    #[must_use]
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Use a specific number of threads
    #[must_use]
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }

    /// Use all available CPU cores
    #[must_use]
    pub fn all_cores() -> Self {
        Self {
            num_threads: Some(num_cpus::get()),
        }
    }

    /// Build a dedicated thread pool for this configuration
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero thread count, `ThreadPool` if the pool
    /// cannot be spawned.
    pub fn build_pool(&self) -> Result<ThreadPool> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("plane-reader-{i}"));
        if let Some(num_threads) = self.num_threads {
            if num_threads == 0 {
                return Err(TimelapseError::invalid_argument(
                    "thread count must be at least 1",
                ));
            }
            builder = builder.num_threads(num_threads);
        }

        let pool = builder.build().map_err(|e| {
            TimelapseError::ThreadPool(format!(
                "Failed to initialize thread pool with {:?} threads: {e}",
                self.num_threads
            ))
        })?;

        debug!("Built plane reader pool with {} threads", pool.current_num_threads());
        Ok(pool)
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self { num_threads: None }
    }
}
