#![allow(dead_code)]

use std::{
    any::Any,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use prefetch_pipe::{Producer, ResetUnsupported};

/// Extracts the message of a panic caught with `catch_unwind`.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or_default()
}

/// Counts the cells that are alive at any point in time.
#[derive(Clone, Debug, Default)]
pub struct Tracker {
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    allocated: Arc<AtomicUsize>,
}

impl Tracker {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    /// Polls until `live` cells exist or the timeout runs out.
    pub fn wait_for_live(&self, live: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if self.live() == live {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }

        false
    }
}

/// A cell which reports its allocation and release to a [`Tracker`].
#[derive(Debug)]
pub struct Counted {
    pub id: usize,
    pub value: usize,
    tracker: Tracker,
}

impl Counted {
    pub fn new(tracker: &Tracker) -> Self {
        let live = tracker.live.fetch_add(1, Ordering::SeqCst) + 1;
        tracker.peak.fetch_max(live, Ordering::SeqCst);
        let id = tracker.allocated.fetch_add(1, Ordering::SeqCst);

        Self {
            id,
            value: 0,
            tracker: tracker.clone(),
        }
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.tracker.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Produces the values `0..end` into recycled [`Counted`] cells.
pub struct Counter {
    next: usize,
    end: usize,
    tracker: Tracker,
}

impl Counter {
    pub fn new(end: usize, tracker: &Tracker) -> Self {
        Self {
            next: 0,
            end,
            tracker: tracker.clone(),
        }
    }
}

impl Producer<Counted> for Counter {
    fn next(&mut self, cell: &mut Option<Counted>) -> bool {
        if self.next >= self.end {
            return false;
        }

        let tracker = &self.tracker;
        let cell = cell.get_or_insert_with(|| Counted::new(tracker));
        cell.value = self.next;
        self.next += 1;

        true
    }

    fn reset(&mut self) -> Result<(), ResetUnsupported> {
        self.next = 0;
        Ok(())
    }
}
