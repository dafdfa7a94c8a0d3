use crossbeam_queue::ArrayQueue;

/// A pool which stores recycled cells and hands them out on demand.
///
/// Cells returned to a full pool are dropped, which bounds the memory
/// held by a pipe even when the consumer recycles more cells than the
/// workers ever took.
#[derive(Debug)]
pub struct CellPool<T> {
    queue: ArrayQueue<T>,
}

impl<T> CellPool<T> {
    /// Creates a new pool with an upper bound of cells it can store
    /// at the same time.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
        }
    }

    /// Takes a cell from the pool, if one is available.
    #[inline]
    pub fn take(&self) -> Option<T> {
        self.queue.pop()
    }

    /// Inserts a cell back into the pool.
    #[inline]
    pub fn put(&self, cell: T) {
        let _ = self.queue.push(cell);
    }

    /// Drops every stored cell.
    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
    }
}
