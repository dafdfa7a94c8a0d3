use std::path::PathBuf;

use clap::Args;
use prefetch_pipe::{DataIter, ThreadedIter, DEFAULT_CAPACITY};

use super::Command;
use crate::chunks::ChunkReader;

/// Subcommand for reading a file ahead of the consumer on a
/// background thread.
#[derive(Debug, Args)]
pub struct Scan {
    /// The file to read.
    path: PathBuf,

    /// The number of bytes per chunk.
    #[clap(short, long, default_value_t = 64 * 1024)]
    chunk_size: usize,

    /// The number of chunks to buffer ahead of the consumer.
    #[clap(short = 'n', long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// How many times to read the file, rewinding in-between.
    #[clap(short, long, default_value_t = 1)]
    passes: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Stats {
    chunks: usize,
    bytes: usize,
    lines: usize,
}

impl Stats {
    fn add(&mut self, chunk: &[u8]) {
        self.chunks += 1;
        self.bytes += chunk.len();
        self.lines += chunk.iter().filter(|&&b| b == b'\n').count();
    }
}

impl Command for Scan {
    fn handle(self) -> eyre::Result<()> {
        eyre::ensure!(self.chunk_size > 0, "chunk size must be non-zero");
        eyre::ensure!(self.capacity > 0, "capacity must be non-zero");

        let (reader, error) = ChunkReader::open(&self.path, self.chunk_size)?;

        let mut iter = ThreadedIter::new(self.capacity);
        iter.init(reader)?;

        let mut previous = None;
        for pass in 0..self.passes {
            if pass > 0 {
                iter.reset();
            }

            let mut stats = Stats::default();
            while iter.advance() {
                stats.add(iter.value());
            }
            error.take()?;

            if previous.is_some_and(|p| p != stats) {
                log::warn!("'{}' changed between passes", self.path.display());
            }
            previous = Some(stats);

            println!(
                "pass {}: {} chunks, {} bytes, {} lines",
                pass + 1,
                stats.chunks,
                stats.bytes,
                stats.lines
            );
        }

        Ok(())
    }
}
