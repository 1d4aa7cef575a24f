//! Parallel processing configuration
//!
//! Two knobs drive concurrency: the size of Rayon's global pool (used for
//! per-timestep reductions, clipping masks and Zarr chunk writes) and the
//! number of regions processed at the same time by the dispatcher.

use crate::errors::{DaymetError, Result};
use rayon::ThreadPoolBuilder;
use tracing::{debug, info};

/// Configuration for parallel processing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParallelConfig {
    /// Rayon pool size; `None` leaves Rayon's default
    pub num_threads: Option<usize>,
    /// Regions processed concurrently; `None` uses the number of CPU cores
    pub max_concurrent_regions: Option<usize>,
}

impl ParallelConfig {
    pub fn new(num_threads: Option<usize>, max_concurrent_regions: Option<usize>) -> Self {
        Self {
            num_threads,
            max_concurrent_regions,
        }
    }

    /// Set up the global Rayon thread pool
    ///
    /// Rayon's pool can only be configured once per process; a second call
    /// fails with a thread pool error.
    pub fn setup_global_pool(&self) -> Result<()> {
        match self.num_threads {
            Some(num_threads) => {
                ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build_global()
                    .map_err(|e| {
                        DaymetError::ThreadPoolError(format!(
                            "Failed to initialize thread pool with {num_threads} threads: {e}"
                        ))
                    })?;
                info!("Configured parallel processing with {num_threads} threads");
            }
            None => debug!("Using default thread pool configuration"),
        }
        Ok(())
    }

    /// Number of regions that may be in flight at once, at least one
    pub fn region_concurrency(&self) -> usize {
        self.max_concurrent_regions
            .unwrap_or_else(num_cpus::get)
            .max(1)
    }

    /// A configuration that uses all available CPU cores
    pub fn all_cores() -> Self {
        let cores = num_cpus::get();
        Self::new(Some(cores), Some(cores))
    }

    pub fn with_threads(num_threads: usize) -> Self {
        Self::new(Some(num_threads), None)
    }

    /// Process one region at a time
    pub fn sequential() -> Self {
        Self::new(None, Some(1))
    }
}

/// Information about the parallel processing environment
#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
    pub region_concurrency: usize,
}

impl ParallelInfo {
    pub fn gather(config: &ParallelConfig) -> Self {
        Self {
            current_threads: rayon::current_num_threads(),
            available_cores: num_cpus::get(),
            region_concurrency: config.region_concurrency(),
        }
    }

    pub fn print_info(&self) {
        println!("📊 Parallel Processing Information:");
        println!("   Rayon threads: {}", self.current_threads);
        println!("   Available CPU cores: {}", self.available_cores);
        println!("   Concurrent regions: {}", self.region_concurrency);
    }
}
