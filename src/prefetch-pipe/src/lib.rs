//! Thread-backed pipes for prefetching data ahead of its consumer.
//!
//! # Motivation
//!
//! The front of a compute-heavy pipeline usually spends a lot of time
//! decoding or loading records. Doing that on the consumer thread leaves
//! the consumer idle while it waits for the next record.
//!
//! # Design
//!
//! A [`ThreadedIter`] runs a single [`Producer`] on a background thread
//! and hands completed cells to the consumer through a bounded queue.
//! Consumed cells are handed back with [`ThreadedIter::recycle`] so that
//! the producer can refill them instead of allocating new ones.
//!
//! A [`MultiThreadedIter`] fans the output of a [`ThreadedIter`] out to
//! several worker threads which transform every source cell into an
//! output cell. Results arrive in whatever order the workers finish them.
//!
//! Both pipes implement the pull-based [`DataIter`] interface.

#![deny(rust_2018_idioms, rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod config;
pub use config::*;

mod error;
pub use error::*;

mod iter;
pub use iter::DataIter;

mod multi;
pub use multi::MultiThreadedIter;

mod pool;

mod producer;
pub use producer::*;

pub mod queue;

mod sync;

mod threaded;
pub use threaded::{ThreadedIter, DEFAULT_CAPACITY};
