/// A pull-based sequence of records.
///
/// Unlike [`Iterator`], the current record is borrowed from the sequence
/// and its storage gets reused once the sequence advances.
pub trait DataIter<T> {
    /// Moves to the next record, giving the storage of the current one
    /// back to the sequence.
    ///
    /// Returns `false` once the sequence is exhausted.
    fn advance(&mut self) -> bool;

    /// Gets the current record.
    ///
    /// # Panics
    ///
    /// Panics when called before the first successful [`advance`] or
    /// after the sequence was exhausted.
    ///
    /// [`advance`]: DataIter::advance
    fn value(&self) -> &T;

    /// Rewinds the sequence to before its first record.
    fn reset(&mut self);
}
