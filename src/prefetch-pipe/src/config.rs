use std::{env, thread};

use crate::BadConfiguration;

/// The environment variable that overrides the worker count picked
/// by [`available_threads`].
pub const PREFETCH_WORKER_THREADS: &str = "PREFETCH_WORKER_THREADS";

/// Gets the preferred number of worker threads for a
/// [`MultiThreadedIter`][crate::MultiThreadedIter].
///
/// Configuration is possible with the `PREFETCH_WORKER_THREADS`
/// environment variable. If not set, falls back to
/// [`thread::available_parallelism`].
pub fn available_threads() -> Result<usize, BadConfiguration> {
    match env::var(PREFETCH_WORKER_THREADS) {
        Ok(value) => match value.trim().parse() {
            Ok(0) | Err(_) => Err(BadConfiguration(PREFETCH_WORKER_THREADS)),
            Ok(n) => Ok(n),
        },

        Err(_) => Ok(thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1)),
    }
}
