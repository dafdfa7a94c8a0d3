use std::{
    collections::VecDeque,
    mem,
    sync::{Arc, Condvar, Mutex, MutexGuard},
    thread::{self, JoinHandle},
};

use enum_map::{Enum, EnumMap};

use crate::{sync, DataIter, FnProducer, PipeError, Producer, ResetUnsupported};

/// The number of ready cells a [`ThreadedIter`] buffers by default.
pub const DEFAULT_CAPACITY: usize = 8;

const PRODUCER_NAME: &str = "prefetch-producer";

/// Requests from the consumer side to the producer thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Signal {
    Produce,
    Rewind,
    Shutdown,
}

#[derive(Clone, Copy, Debug, Enum)]
enum Role {
    Producer,
    Consumer,
}

struct State<T> {
    signal: Signal,
    // Set by the producer thread once a `Rewind` or `Shutdown` is done.
    signal_processed: bool,
    produce_end: bool,
    running: bool,
    reset_failed: bool,
    poisoned: bool,
    max_capacity: usize,
    queue: VecDeque<T>,
    free_cells: VecDeque<T>,
    // Only used to skip notifications nobody waits for.
    waiting: EnumMap<Role, u32>,
}

impl<T> State<T> {
    #[inline]
    fn has_room(&self) -> bool {
        !self.produce_end
            && (self.queue.len() < self.max_capacity || !self.free_cells.is_empty())
    }

    #[inline]
    fn producer_needs_wake(&self) -> bool {
        self.waiting[Role::Producer] != 0 && !self.produce_end
    }
}

/// State shared between a [`ThreadedIter`] and its producer thread.
pub(crate) struct Shared<T> {
    state: Mutex<State<T>>,
    producer_cond: Condvar,
    consumer_cond: Condvar,
}

impl<T> Shared<T> {
    fn new(max_capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                signal: Signal::Produce,
                signal_processed: false,
                produce_end: false,
                running: false,
                reset_failed: false,
                poisoned: false,
                max_capacity,
                queue: VecDeque::new(),
                free_cells: VecDeque::new(),
                waiting: EnumMap::default(),
            }),
            producer_cond: Condvar::new(),
            consumer_cond: Condvar::new(),
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        sync::lock(&self.state)
    }

    /// Blocks until `ready` holds, accounting for the waiting thread
    /// under its `role`.
    fn wait_until<'a, F>(
        &self,
        role: Role,
        mut state: MutexGuard<'a, State<T>>,
        mut ready: F,
    ) -> MutexGuard<'a, State<T>>
    where
        F: FnMut(&State<T>) -> bool,
    {
        let cond = match role {
            Role::Producer => &self.producer_cond,
            Role::Consumer => &self.consumer_cond,
        };

        state.waiting[role] += 1;
        let mut state = sync::wait_while(cond, state, |s| !ready(&*s));
        state.waiting[role] -= 1;

        state
    }

    pub(crate) fn next(&self) -> Option<T> {
        let state = self.lock();
        match state.signal {
            Signal::Produce => {}
            // The producer thread died while servicing the rewind.
            Signal::Rewind if state.poisoned => {
                drop(state);
                panic!("producer thread panicked");
            }
            Signal::Rewind => {
                drop(state);
                panic!("next must not be called concurrently with before_first");
            }
            Signal::Shutdown => {
                drop(state);
                panic!("next called on a pipe that was shut down");
            }
        }

        if !state.running {
            drop(state);
            panic!("next called on a pipe that was never initialized");
        }

        let mut state = self.wait_until(Role::Consumer, state, |s| {
            !s.queue.is_empty() || s.produce_end
        });

        match state.queue.pop_front() {
            Some(cell) => {
                let notify = state.producer_needs_wake();
                drop(state);

                if notify {
                    self.producer_cond.notify_one();
                }

                Some(cell)
            }

            None => {
                if state.poisoned {
                    drop(state);
                    panic!("producer thread panicked");
                }

                None
            }
        }
    }

    pub(crate) fn recycle(&self, cell: T) {
        let notify = {
            let mut state = self.lock();
            state.free_cells.push_back(cell);
            state.producer_needs_wake()
        };

        if notify {
            self.producer_cond.notify_one();
        }
    }

    fn before_first(&self) {
        let mut state = self.lock();
        if state.signal == Signal::Shutdown {
            return;
        }

        if !state.running || state.poisoned || state.signal != Signal::Produce {
            let reason = if !state.running {
                "before_first called on a pipe that was never initialized"
            } else if state.poisoned {
                "producer thread panicked"
            } else {
                "before_first must not be called concurrently with itself"
            };

            drop(state);
            panic!("{reason}");
        }
        debug_assert!(!state.signal_processed);

        log::debug!("Requesting rewind of producer thread");
        state.signal = Signal::Rewind;
        if state.waiting[Role::Producer] != 0 {
            self.producer_cond.notify_one();
        }

        let mut state = self.wait_until(Role::Consumer, state, |s| s.signal_processed);
        state.signal_processed = false;

        if state.poisoned {
            drop(state);
            panic!("producer thread panicked");
        }
        if mem::take(&mut state.reset_failed) {
            drop(state);
            panic!("{}", ResetUnsupported);
        }

        let notify = state.producer_needs_wake();
        drop(state);

        log::debug!("Producer thread acknowledged rewind");
        if notify {
            self.producer_cond.notify_one();
        }
    }

    fn set_max_capacity(&self, max_capacity: usize) {
        let notify = {
            let mut state = self.lock();
            state.max_capacity = max_capacity;
            state.producer_needs_wake()
        };

        if notify {
            self.producer_cond.notify_one();
        }
    }

    fn request_shutdown(&self) {
        let mut state = self.lock();
        state.signal = Signal::Shutdown;
        if state.waiting[Role::Producer] != 0 {
            self.producer_cond.notify_one();
        }
    }

    fn take_cells(&self) -> (VecDeque<T>, VecDeque<T>) {
        let mut state = self.lock();
        (
            mem::take(&mut state.queue),
            mem::take(&mut state.free_cells),
        )
    }
}

// Marks the pipe as ended when the producer thread unwinds, so that
// consumers fail loudly instead of waiting forever.
struct PoisonOnUnwind<'a, T>(&'a Shared<T>);

impl<T> Drop for PoisonOnUnwind<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            let mut state = self.0.lock();
            state.poisoned = true;
            state.produce_end = true;
            if state.signal != Signal::Produce {
                state.signal_processed = true;
            }
            drop(state);

            self.0.consumer_cond.notify_all();
        }
    }
}

fn produce<T, P: Producer<T>>(shared: &Shared<T>, producer: &mut P) {
    if producer.reset().is_err() {
        log::debug!("Producer does not support rewinding; starting without a reset");
    }

    let mut state = shared.lock();
    loop {
        state = shared.wait_until(Role::Producer, state, |s| {
            s.signal != Signal::Produce || s.has_room()
        });

        match state.signal {
            Signal::Produce => {
                let mut cell = state.free_cells.pop_front();
                drop(state);

                let more = producer.next(&mut cell);

                // Deciding between the ready queue and the free cells must
                // happen under the same lock that publishes the end flag.
                state = shared.lock();
                match (more, cell) {
                    (true, Some(cell)) => state.queue.push_back(cell),

                    (true, None) => {
                        drop(state);
                        panic!("producer reported a record but left the cell empty");
                    }

                    (false, cell) => {
                        log::trace!("Producer reached the end of its records");

                        state.produce_end = true;
                        if let Some(cell) = cell {
                            state.free_cells.push_back(cell);
                        }
                    }
                }

                if state.waiting[Role::Consumer] != 0 {
                    shared.consumer_cond.notify_all();
                }
            }

            Signal::Rewind => {
                state.reset_failed = producer.reset().is_err();

                let State {
                    queue, free_cells, ..
                } = &mut *state;
                free_cells.extend(queue.drain(..));

                state.produce_end = false;
                state.signal_processed = true;
                state.signal = Signal::Produce;

                shared.consumer_cond.notify_all();
            }

            Signal::Shutdown => {
                state.signal_processed = true;
                state.produce_end = true;

                shared.consumer_cond.notify_all();
                return;
            }
        }
    }
}

/// A pipe which runs a [`Producer`] eagerly on a background thread.
///
/// Produced cells are buffered in a bounded queue and handed out in
/// production order by [`ThreadedIter::next`]. Ownership of a cell moves
/// to the caller, who should give it back through
/// [`ThreadedIter::recycle`] so the producer can refill it instead of
/// allocating a new one.
///
/// ```
/// use prefetch_pipe::{FromIter, ThreadedIter};
///
/// let mut iter = ThreadedIter::new(2);
/// iter.init(FromIter::new(1..=3)).unwrap();
///
/// let mut seen = Vec::new();
/// while let Some(cell) = iter.next() {
///     seen.push(cell);
///     iter.recycle(cell);
/// }
/// assert_eq!(seen, [1, 2, 3]);
/// ```
pub struct ThreadedIter<T> {
    shared: Arc<Shared<T>>,
    thread: Option<JoinHandle<()>>,
    out_data: Option<T>,
}

impl<T> ThreadedIter<T> {
    /// Creates a pipe which buffers at most `max_capacity` ready cells
    /// before the producer has to wait.
    ///
    /// No thread is started before [`ThreadedIter::init`].
    ///
    /// # Panics
    ///
    /// Panics when `max_capacity` is zero.
    pub fn new(max_capacity: usize) -> Self {
        assert!(max_capacity > 0, "pipe capacity must be non-zero");

        Self {
            shared: Arc::new(Shared::new(max_capacity)),
            thread: None,
            out_data: None,
        }
    }

    /// Changes the number of ready cells that may be buffered.
    ///
    /// This takes effect immediately, even on a running pipe.
    pub fn set_max_capacity(&self, max_capacity: usize) {
        assert!(max_capacity > 0, "pipe capacity must be non-zero");
        self.shared.set_max_capacity(max_capacity);
    }

    /// Gets the number of ready cells that may be buffered.
    pub fn max_capacity(&self) -> usize {
        self.shared.lock().max_capacity
    }

    pub(crate) fn shared(&self) -> Arc<Shared<T>> {
        self.shared.clone()
    }

    /// Gets the next cell, waiting for the producer if necessary.
    ///
    /// The caller takes ownership of the cell and may hand it back with
    /// [`ThreadedIter::recycle`]. Returns [`None`] once the producer is
    /// exhausted and all buffered cells were handed out.
    ///
    /// This may be called from several threads at once.
    ///
    /// # Panics
    ///
    /// Panics when the pipe was not initialized, is being rewound or was
    /// destroyed, and when the producer thread panicked.
    pub fn next(&self) -> Option<T> {
        self.shared.next()
    }

    /// Hands a cell back to the pipe for reuse by the producer.
    pub fn recycle(&self, cell: T) {
        self.shared.recycle(cell);
    }

    /// Rewinds the producer to its first record, discarding every
    /// buffered cell.
    ///
    /// Blocks until the producer thread has completed the rewind. Must
    /// not run concurrently with [`ThreadedIter::next`]. Does nothing
    /// after the pipe was destroyed.
    ///
    /// # Panics
    ///
    /// Panics when the producer does not support rewinding.
    pub fn before_first(&self) {
        self.shared.before_first();
    }

    /// Stops the producer thread and frees every cell owned by the pipe,
    /// including the current cell of the [`DataIter`] interface.
    ///
    /// This also happens on drop. Calling it more than once is fine.
    pub fn destroy(&mut self) {
        self.out_data = None;
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            log::debug!("Shutting down producer thread");

            self.shared.request_shutdown();
            if thread.join().is_err() {
                log::error!("Producer thread panicked");
            }
        } else {
            // Never initialized; there is no thread to acknowledge.
            let mut state = self.shared.lock();
            state.signal = Signal::Shutdown;
            state.produce_end = true;
        }

        // Dropped outside of the lock.
        let _cells = self.shared.take_cells();
    }
}

impl<T: Send + 'static> ThreadedIter<T> {
    /// Starts the background thread which drives `producer`.
    ///
    /// The pipe takes ownership of the producer and drops it once the
    /// thread terminates. To keep access to the producer, pass an
    /// `Arc<Mutex<P>>`.
    ///
    /// # Panics
    ///
    /// Panics when the pipe was already initialized.
    pub fn init<P>(&mut self, producer: P) -> Result<(), PipeError>
    where
        P: Producer<T> + 'static,
    {
        {
            let mut state = self.shared.lock();
            if state.running || state.signal == Signal::Shutdown {
                drop(state);
                panic!("a pipe can only be initialized once");
            }
            state.running = true;

            log::debug!(
                "Starting producer thread with capacity {}",
                state.max_capacity
            );
        }

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(PRODUCER_NAME.into())
            .spawn(move || {
                let mut producer = producer;
                let _guard = PoisonOnUnwind(&shared);

                produce(&shared, &mut producer);
            });

        match spawned {
            Ok(thread) => {
                self.thread = Some(thread);
                Ok(())
            }

            Err(e) => {
                self.shared.lock().running = false;
                Err(PipeError::Spawn(e))
            }
        }
    }

    /// Starts the background thread with a pair of closures acting
    /// as the producer.
    ///
    /// See [`Producer::next`] and [`Producer::reset`] for their contracts.
    pub fn init_with<N, R>(&mut self, next: N, reset: R) -> Result<(), PipeError>
    where
        N: FnMut(&mut Option<T>) -> bool + Send + 'static,
        R: FnMut() + Send + 'static,
    {
        self.init(FnProducer::new(next, reset))
    }

    /// Like [`ThreadedIter::init_with`], for producers that cannot
    /// be rewound.
    pub fn init_fn<N>(&mut self, next: N) -> Result<(), PipeError>
    where
        N: FnMut(&mut Option<T>) -> bool + Send + 'static,
    {
        self.init(FnProducer::forward_only(next))
    }
}

impl<T> Default for ThreadedIter<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<T> Drop for ThreadedIter<T> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<T> DataIter<T> for ThreadedIter<T> {
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
        if let Some(cell) = self.out_data.take() {
            self.recycle(cell);
        }

        self.before_first();
    }
}
