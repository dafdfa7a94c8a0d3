use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use threadpool::{Builder, ThreadPool};

use crate::{pool::CellPool, queue::BlockingQueue, threaded::Shared, DataIter, ThreadedIter};

const WORKER_NAME: &str = "prefetch-worker";

fn make_worker_pool(nthreads: usize) -> ThreadPool {
    Builder::new()
        .num_threads(nthreads)
        .thread_name(WORKER_NAME.into())
        .build()
}

type Transform<T, S> = dyn Fn(&mut Option<T>, &mut S, usize) + Send + Sync;

enum Slot<T, S> {
    /// A transformed cell along with the source cell it came from.
    Item(T, S),
    /// The last entry a worker pushes before it exits.
    Done,
}

struct Fanout<T, S> {
    queue: BlockingQueue<Slot<T, S>>,
    free_cells: CellPool<T>,
    force_stopped: AtomicBool,
    panicked: AtomicBool,
}

struct Workers<T, S> {
    pool: ThreadPool,
    transform: Arc<Transform<T, S>>,
    reset: Box<dyn FnMut() + Send>,
}

// Pushes the end-of-stream entry of a worker, also when it unwinds.
struct Sentinel<'a, T, S>(&'a Fanout<T, S>);

impl<T, S> Drop for Sentinel<'_, T, S> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.panicked.store(true, Ordering::Release);
        }

        // A killed queue is being torn down; nobody counts sentinels.
        let _ = self.0.queue.push(Slot::Done);
    }
}

fn work<T, S>(fanout: &Fanout<T, S>, source: &Shared<S>, transform: &Transform<T, S>, tid: usize) {
    let _sentinel = Sentinel(fanout);

    while let Some(mut item) = source.next() {
        if fanout.force_stopped.load(Ordering::Acquire) {
            source.recycle(item);
            break;
        }

        let mut cell = fanout.free_cells.take();
        transform(&mut cell, &mut item, tid);

        let Some(cell) = cell else {
            panic!("transform left the output cell empty");
        };

        if fanout.queue.push(Slot::Item(cell, item)).is_err() {
            break;
        }
    }

    log::trace!("Worker {tid} finished");
}

/// A pipe which transforms the cells of a [`ThreadedIter`] on a pool
/// of worker threads.
///
/// Every worker takes one source cell at a time from the upstream pipe,
/// transforms it into an output cell and pushes the pair into a shared
/// bounded queue. Source cells go back to the upstream pipe as soon as
/// the consumer receives their output cell.
///
/// Output cells arrive in the order workers finish them, which is
/// generally not the order of the source cells.
pub struct MultiThreadedIter<T, S> {
    loader: ThreadedIter<S>,
    fanout: Arc<Fanout<T, S>>,
    workers: Option<Workers<T, S>>,
    nthreads: usize,
    null_cells: usize,
    out_data: Option<T>,
    destroyed: bool,
}

impl<T, S> MultiThreadedIter<T, S> {
    /// Creates a pipe which runs `nthreads` workers over the cells of
    /// `loader`, buffering up to `queue_capacity` results.
    ///
    /// `loader` must already be initialized. No worker is started before
    /// [`MultiThreadedIter::init`].
    ///
    /// # Panics
    ///
    /// Panics when `nthreads` or `queue_capacity` is zero.
    pub fn new(loader: ThreadedIter<S>, nthreads: usize, queue_capacity: usize) -> Self {
        assert!(nthreads > 0, "a pipe needs at least one worker thread");

        // Every queued result plus the cell each worker fills and the
        // one held by the consumer.
        let pool_capacity = queue_capacity + nthreads + 1;

        Self {
            loader,
            fanout: Arc::new(Fanout {
                queue: BlockingQueue::new(queue_capacity),
                free_cells: CellPool::new(pool_capacity),
                force_stopped: AtomicBool::new(false),
                panicked: AtomicBool::new(false),
            }),
            workers: None,
            nthreads,
            null_cells: 0,
            out_data: None,
            destroyed: false,
        }
    }

    /// Gets the number of worker threads.
    #[inline]
    pub fn thread_count(&self) -> usize {
        self.nthreads
    }

    /// Gets the next transformed cell, waiting for the workers if
    /// necessary.
    ///
    /// The caller takes ownership of the cell and may hand it back with
    /// [`MultiThreadedIter::recycle`]. Returns [`None`] once every worker
    /// has run out of source cells.
    ///
    /// # Panics
    ///
    /// Panics when the pipe was not initialized, and when a worker thread
    /// panicked.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<T> {
        if self.workers.is_none() {
            assert!(
                self.destroyed,
                "next called on a pipe that was never initialized"
            );
            return None;
        }

        if self.null_cells >= self.nthreads {
            return None;
        }

        while let Ok(slot) = self.fanout.queue.pop() {
            match slot {
                Slot::Item(cell, source) => {
                    self.loader.recycle(source);
                    return Some(cell);
                }

                Slot::Done => {
                    self.null_cells += 1;
                    if self.null_cells == self.nthreads {
                        if self.fanout.panicked.load(Ordering::Acquire) {
                            panic!("worker thread panicked");
                        }

                        return None;
                    }
                }
            }
        }

        None
    }

    /// Hands a cell back to the pipe for reuse by the workers.
    ///
    /// This may be called from any thread.
    pub fn recycle(&self, cell: T) {
        self.fanout.free_cells.put(cell);
    }

    /// Stops every worker, destroys the upstream pipe and frees all
    /// cells owned by the pipe.
    ///
    /// This also happens on drop. Calling it more than once is fine.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        log::debug!("Shutting down {} worker threads", self.nthreads);

        self.fanout.force_stopped.store(true, Ordering::Release);
        self.fanout.queue.kill();
        if let Some(workers) = self.workers.take() {
            workers.pool.join();
        }

        self.loader.destroy();

        self.fanout.free_cells.clear();
        let pending = self.fanout.queue.clear();
        log::trace!("Dropped {pending} pending results");

        self.out_data = None;
    }
}

impl<T: Send + 'static, S: Send + 'static> MultiThreadedIter<T, S> {
    /// Starts the worker threads.
    ///
    /// `transform` receives a recycled output cell or [`None`], the
    /// source cell and the index of the calling worker, and must leave a
    /// value in the output cell. `reset` runs on every rewind, before
    /// the upstream pipe is rewound.
    ///
    /// # Panics
    ///
    /// Panics when the pipe was already initialized.
    pub fn init<F, R>(&mut self, transform: F, reset: R)
    where
        F: Fn(&mut Option<T>, &mut S, usize) + Send + Sync + 'static,
        R: FnMut() + Send + 'static,
    {
        assert!(
            self.workers.is_none() && !self.destroyed,
            "a pipe can only be initialized once"
        );

        self.workers = Some(Workers {
            pool: make_worker_pool(self.nthreads),
            transform: Arc::new(transform),
            reset: Box::new(reset),
        });

        self.launch();
    }

    /// Rewinds the pipe and its upstream [`ThreadedIter`] to the first
    /// record.
    ///
    /// Stops all workers, discards every pending result, runs the reset
    /// closure given to [`MultiThreadedIter::init`] and starts the
    /// workers again. Does nothing after the pipe was destroyed.
    ///
    /// # Panics
    ///
    /// Panics when the pipe was not initialized, or when the upstream
    /// producer does not support rewinding.
    pub fn before_first(&mut self) {
        if self.destroyed {
            return;
        }
        assert!(
            self.workers.is_some(),
            "before_first called on a pipe that was never initialized"
        );

        log::debug!("Rewinding {} worker threads", self.nthreads);

        self.fanout.force_stopped.store(true, Ordering::Release);
        while self.advance() {}

        if let Some(workers) = &mut self.workers {
            workers.pool.join();
            (workers.reset)();
        }

        self.loader.before_first();
        self.fanout.force_stopped.store(false, Ordering::Release);
        self.null_cells = 0;

        self.launch();
    }

    fn launch(&self) {
        let Some(workers) = &self.workers else {
            return;
        };

        log::debug!("Launching {} worker threads", self.nthreads);

        for tid in 0..self.nthreads {
            let fanout = self.fanout.clone();
            let source = self.loader.shared();
            let transform = workers.transform.clone();

            workers.pool.execute(move || {
                work(&*fanout, &*source, &*transform, tid);
            });
        }
    }
}

impl<T, S> Drop for MultiThreadedIter<T, S> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<T: Send + 'static, S: Send + 'static> DataIter<T> for MultiThreadedIter<T, S> {
    fn advance(&mut self) -> bool {
        if let Some(cell) = self.out_data.take() {
            self.recycle(cell);
        }

        self.out_data = self.next();
        self.out_data.is_some()
    }

    fn value(&self) -> &T {
        self.out_data
            .as_ref()
            .expect("value called at the beginning or the end of the pipe")
    }

    fn reset(&mut self) {
        self.before_first();
    }
}
