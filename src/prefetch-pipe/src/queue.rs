//! A bounded blocking queue for many producers and consumers.

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
};

use crate::{sync, Killed};

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    killed: bool,
}

/// A thread-safe FIFO queue with a fixed capacity.
///
/// [`push`] blocks while the queue is full and [`pop`] blocks while it is
/// empty. [`kill`] wakes every blocked caller and makes all current and
/// future calls fail with [`Killed`].
///
/// [`push`]: BlockingQueue::push
/// [`pop`]: BlockingQueue::pop
/// [`kill`]: BlockingQueue::kill
#[derive(Debug)]
pub struct BlockingQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BlockingQueue<T> {
    /// Creates an empty queue which holds at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics when `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");

        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                killed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Gets the maximum number of items in the queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `item` to the queue, waiting for room if necessary.
    ///
    /// After a kill, `item` is dropped and [`Killed`] is returned.
    pub fn push(&self, item: T) -> Result<(), Killed> {
        let state = sync::lock(&self.state);
        let mut state = sync::wait_while(&self.not_full, state, |s| {
            !s.killed && s.items.len() >= self.capacity
        });

        if state.killed {
            return Err(Killed);
        }

        state.items.push_back(item);
        drop(state);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Takes the oldest item from the queue, waiting for one to arrive
    /// if necessary.
    pub fn pop(&self) -> Result<T, Killed> {
        let state = sync::lock(&self.state);
        let mut state =
            sync::wait_while(&self.not_empty, state, |s| !s.killed && s.items.is_empty());

        if state.killed {
            return Err(Killed);
        }

        // The wait only ends on kill or with an item available.
        let item = state.items.pop_front().ok_or(Killed)?;
        drop(state);

        self.not_full.notify_one();
        Ok(item)
    }

    /// Gets the number of items currently in the queue.
    pub fn len(&self) -> usize {
        sync::lock(&self.state).items.len()
    }

    /// Whether the queue currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`BlockingQueue::kill`] was called.
    pub fn is_killed(&self) -> bool {
        sync::lock(&self.state).killed
    }

    /// Fails all blocked and future [`push`] and [`pop`] calls.
    ///
    /// Items already in the queue stay there until [`clear`] or drop.
    ///
    /// [`push`]: BlockingQueue::push
    /// [`pop`]: BlockingQueue::pop
    /// [`clear`]: BlockingQueue::clear
    pub fn kill(&self) {
        sync::lock(&self.state).killed = true;

        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Drops every item in the queue and returns how many there were.
    ///
    /// Unlike [`pop`], this also works on a killed queue.
    ///
    /// [`pop`]: BlockingQueue::pop
    pub fn clear(&self) -> usize {
        let items = {
            let mut state = sync::lock(&self.state);
            std::mem::take(&mut state.items)
        };

        self.not_full.notify_all();
        items.len()
    }
}
