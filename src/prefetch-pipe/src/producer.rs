use std::sync::{Arc, Mutex};

use crate::{sync, ResetUnsupported};

/// A source of cells for a [`ThreadedIter`][crate::ThreadedIter].
///
/// Producers run on the background thread of the pipe, which is why
/// they must be [`Send`].
pub trait Producer<T>: Send {
    /// Loads the next record into `cell`.
    ///
    /// The pipe passes in either a recycled cell or [`None`]:
    ///
    /// - when `cell` is empty, the producer must create a new value and
    ///   store it.
    /// - when `cell` holds a value, the producer fills it in place or
    ///   replaces it.
    ///
    /// Returns `false` when there are no more records. `cell` may be left
    /// empty in that case.
    fn next(&mut self, cell: &mut Option<T>) -> bool;

    /// Rewinds the producer to its first record.
    ///
    /// Producers which cannot start over keep the default, which makes
    /// any rewind request on the owning pipe fatal.
    fn reset(&mut self) -> Result<(), ResetUnsupported> {
        Err(ResetUnsupported)
    }
}

impl<T, P: Producer<T> + ?Sized> Producer<T> for Box<P> {
    fn next(&mut self, cell: &mut Option<T>) -> bool {
        (**self).next(cell)
    }

    fn reset(&mut self) -> Result<(), ResetUnsupported> {
        (**self).reset()
    }
}

/// A producer that stays shared with the caller.
///
/// The pipe only keeps a reference count, so the caller can still use
/// the producer after the pipe was destroyed.
impl<T, P: Producer<T>> Producer<T> for Arc<Mutex<P>> {
    fn next(&mut self, cell: &mut Option<T>) -> bool {
        sync::lock(&**self).next(cell)
    }

    fn reset(&mut self) -> Result<(), ResetUnsupported> {
        sync::lock(&**self).reset()
    }
}

/// A [`Producer`] assembled from a pair of closures.
///
/// See [`ThreadedIter::init_with`][crate::ThreadedIter::init_with].
pub struct FnProducer<N, R> {
    next: N,
    reset: Option<R>,
}

impl<N, R> FnProducer<N, R> {
    /// Creates a producer which rewinds by calling `reset`.
    pub fn new(next: N, reset: R) -> Self {
        Self {
            next,
            reset: Some(reset),
        }
    }
}

impl<N> FnProducer<N, fn()> {
    /// Creates a producer which does not support rewinding.
    pub fn forward_only(next: N) -> Self {
        Self { next, reset: None }
    }
}

impl<T, N, R> Producer<T> for FnProducer<N, R>
where
    N: FnMut(&mut Option<T>) -> bool + Send,
    R: FnMut() + Send,
{
    fn next(&mut self, cell: &mut Option<T>) -> bool {
        (self.next)(cell)
    }

    fn reset(&mut self) -> Result<(), ResetUnsupported> {
        match &mut self.reset {
            Some(reset) => {
                reset();
                Ok(())
            }

            None => Err(ResetUnsupported),
        }
    }
}

/// A [`Producer`] over the items of a cloneable iterator.
///
/// Rewinding starts over from a copy of the iterator as it was
/// handed to [`FromIter::new`].
#[derive(Clone, Debug)]
pub struct FromIter<I> {
    origin: I,
    current: I,
}

impl<I: Iterator + Clone> FromIter<I> {
    /// Creates a producer over the items of `iter`.
    pub fn new(iter: I) -> Self {
        Self {
            current: iter.clone(),
            origin: iter,
        }
    }
}

impl<I> Producer<I::Item> for FromIter<I>
where
    I: Iterator + Clone + Send,
{
    fn next(&mut self, cell: &mut Option<I::Item>) -> bool {
        match self.current.next() {
            Some(item) => {
                *cell = Some(item);
                true
            }

            None => false,
        }
    }

    fn reset(&mut self) -> Result<(), ResetUnsupported> {
        self.current = self.origin.clone();
        Ok(())
    }
}
