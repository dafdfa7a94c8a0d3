use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use prefetch_pipe::{Producer, ResetUnsupported};

/// Slot for an I/O error hit by a [`ChunkReader`] on the producer thread.
///
/// The pipe only learns that the reader stopped, so the command checks
/// this once the pipe is exhausted.
#[derive(Clone, Debug, Default)]
pub struct ReadError(Arc<Mutex<Option<io::Error>>>);

impl ReadError {
    fn set(&self, e: io::Error) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(e);
    }

    /// Returns the stored error, if any.
    pub fn take(&self) -> io::Result<()> {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        slot.take().map_or(Ok(()), Err)
    }
}

/// Reads a file in chunks of a fixed size into recycled buffers.
pub struct ChunkReader {
    file: File,
    chunk_size: usize,
    error: ReadError,
}

impl ChunkReader {
    pub fn open<P: AsRef<Path>>(path: P, chunk_size: usize) -> io::Result<(Self, ReadError)> {
        let error = ReadError::default();
        let reader = Self {
            file: File::open(path)?,
            chunk_size,
            error: error.clone(),
        };

        Ok((reader, error))
    }

    fn fill(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        buf.clear();
        (&mut self.file)
            .take(self.chunk_size as u64)
            .read_to_end(buf)
    }
}

impl Producer<Vec<u8>> for ChunkReader {
    fn next(&mut self, cell: &mut Option<Vec<u8>>) -> bool {
        let chunk_size = self.chunk_size;
        let buf = cell.get_or_insert_with(|| Vec::with_capacity(chunk_size));

        match self.fill(buf) {
            Ok(0) => false,
            Ok(_) => true,

            Err(e) => {
                self.error.set(e);
                false
            }
        }
    }

    fn reset(&mut self) -> Result<(), ResetUnsupported> {
        if let Err(e) = self.file.seek(SeekFrom::Start(0)) {
            self.error.set(e);
        }

        Ok(())
    }
}
