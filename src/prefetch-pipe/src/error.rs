use std::io;

use thiserror::Error;

/// Errors that may occur when starting a pipe.
#[derive(Debug, Error)]
pub enum PipeError {
    /// The background thread could not be spawned.
    #[error("failed to spawn producer thread: {0}")]
    Spawn(#[from] io::Error),
}

/// The default outcome of [`Producer::reset`][crate::Producer::reset]
/// for producers which cannot start over.
#[derive(Clone, Copy, Debug, Error)]
#[error("rewinding is not supported by this producer")]
pub struct ResetUnsupported;

/// Returned by [`BlockingQueue`][crate::queue::BlockingQueue] operations
/// after the queue was killed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("queue was killed")]
pub struct Killed;

/// An environment variable holds an unusable value.
#[derive(Clone, Debug, Error)]
#[error("invalid value in {0}; must be a natural number")]
pub struct BadConfiguration(pub &'static str);
