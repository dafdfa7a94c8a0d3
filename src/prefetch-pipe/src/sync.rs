use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

// Pipe state stays consistent when user code panics under a lock,
// so poisoning is ignored.

#[inline]
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
pub fn wait_while<'a, T, F>(cond: &Condvar, guard: MutexGuard<'a, T>, f: F) -> MutexGuard<'a, T>
where
    F: FnMut(&mut T) -> bool,
{
    cond.wait_while(guard, f).unwrap_or_else(PoisonError::into_inner)
}
