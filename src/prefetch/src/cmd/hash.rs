use std::path::PathBuf;

use clap::Args;
use prefetch_pipe::{available_threads, MultiThreadedIter, ThreadedIter, DEFAULT_CAPACITY};

use super::Command;
use crate::chunks::ChunkReader;

/// Subcommand for checksumming the chunks of a file on a pool of
/// worker threads.
#[derive(Debug, Args)]
pub struct Hash {
    /// The file to hash.
    path: PathBuf,

    /// The number of bytes per chunk.
    #[clap(short, long, default_value_t = 64 * 1024)]
    chunk_size: usize,

    /// The number of chunks to read ahead of the workers.
    #[clap(short = 'n', long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// The number of worker threads.
    ///
    /// Defaults to `PREFETCH_WORKER_THREADS` or the available
    /// parallelism of the system.
    #[clap(short, long)]
    threads: Option<usize>,

    /// The number of results to buffer ahead of the consumer.
    #[clap(short, long, default_value_t = 16)]
    queue: usize,
}

#[derive(Clone, Copy, Debug)]
struct Digest {
    crc: u32,
    len: usize,
}

impl Command for Hash {
    fn handle(self) -> eyre::Result<()> {
        eyre::ensure!(self.chunk_size > 0, "chunk size must be non-zero");
        eyre::ensure!(self.capacity > 0, "capacity must be non-zero");
        eyre::ensure!(self.queue > 0, "queue size must be non-zero");

        let threads = match self.threads {
            Some(0) => eyre::bail!("thread count must be non-zero"),
            Some(n) => n,
            None => available_threads()?,
        };
        log::debug!("Hashing '{}' on {threads} threads", self.path.display());

        let (reader, error) = ChunkReader::open(&self.path, self.chunk_size)?;

        let mut loader = ThreadedIter::new(self.capacity);
        loader.init(reader)?;

        let mut iter = MultiThreadedIter::new(loader, threads, self.queue);
        iter.init(
            |cell: &mut Option<Digest>, chunk: &mut Vec<u8>, _| {
                *cell = Some(Digest {
                    crc: crc32fast::hash(chunk),
                    len: chunk.len(),
                });
            },
            || {},
        );

        // Chunks arrive in no particular order, so they are combined
        // with an order-independent XOR.
        let (mut chunks, mut bytes, mut digest) = (0usize, 0usize, 0u32);
        while let Some(d) = iter.next() {
            chunks += 1;
            bytes += d.len;
            digest ^= d.crc;

            iter.recycle(d);
        }
        error.take()?;

        println!("{chunks} chunks, {bytes} bytes, digest {digest:08x}");
        Ok(())
    }
}
