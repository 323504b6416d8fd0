//! Cursor traits for traversing and mutating tables in key order.

use crate::{
    table::{Table, TableRow},
    DatabaseError,
};
use std::fmt;

/// The result of a cursor positioning operation: the row the cursor landed on,
/// if any.
pub type PairResult<T> = Result<Option<TableRow<T>>, DatabaseError>;

/// A read-only cursor over table `T`.
pub trait DbCursorRO<T: Table> {
    /// Positions the cursor at the first entry in the table, returning it.
    fn first(&mut self) -> PairResult<T>;

    /// Seeks to the KV pair exactly at `key`.
    fn seek_exact(&mut self, key: T::Key) -> PairResult<T>;

    /// Seeks to the KV pair whose key is greater than or equal to `key`.
    fn seek(&mut self, key: T::Key) -> PairResult<T>;

    /// Positions the cursor at the next KV pair, returning it.
    #[allow(clippy::should_implement_trait)]
    fn next(&mut self) -> PairResult<T>;

    /// Positions the cursor at the last entry in the table, returning it.
    fn last(&mut self) -> PairResult<T>;

    /// Get an iterator that walks through the table.
    ///
    /// If `start_key` is `None`, the walker starts from the first entry of the
    /// table, otherwise from the entry greater than or equal to the provided
    /// key.
    fn walk(&mut self, start_key: Option<T::Key>) -> Result<Walker<'_, T, Self>, DatabaseError>
    where
        Self: Sized,
    {
        let start = match start_key {
            Some(key) => self.seek(key)?,
            None => self.first()?,
        };
        Ok(Walker::new(self, start))
    }
}

/// A read-write cursor over table `T`.
pub trait DbCursorRW<T: Table> {
    /// Database operation that will update an existing row if a specified
    /// value already exists in a table, and insert a new row if it does not.
    fn upsert(&mut self, key: T::Key, value: T::Value) -> Result<(), DatabaseError>;

    /// Append a value to the end of the table.
    ///
    /// This is efficient for pre-sorted data; the key must be strictly greater
    /// than the table's current maximum or the operation fails with
    /// [`DatabaseError::AppendOrder`].
    fn append(&mut self, key: T::Key, value: T::Value) -> Result<(), DatabaseError>;

    /// Delete the row the cursor currently points to.
    fn delete_current(&mut self) -> Result<(), DatabaseError>;
}

/// Provides an iterator to a `Cursor`.
pub struct Walker<'cursor, T: Table, CURSOR: DbCursorRO<T>> {
    /// Cursor to be used to walk through the table.
    cursor: &'cursor mut CURSOR,
    /// `(key, value)` where to start the walk.
    start: Option<TableRow<T>>,
}

impl<T, CURSOR> fmt::Debug for Walker<'_, T, CURSOR>
where
    T: Table,
    CURSOR: DbCursorRO<T> + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Walker").field("cursor", &self.cursor).finish_non_exhaustive()
    }
}

impl<'cursor, T: Table, CURSOR: DbCursorRO<T>> Walker<'cursor, T, CURSOR> {
    /// Construct a walker starting at the given row.
    pub fn new(cursor: &'cursor mut CURSOR, start: Option<TableRow<T>>) -> Self {
        Self { cursor, start }
    }
}

impl<T: Table, CURSOR: DbCursorRO<T> + DbCursorRW<T>> Walker<'_, T, CURSOR> {
    /// Delete the row the walker currently points to.
    pub fn delete_current(&mut self) -> Result<(), DatabaseError> {
        self.cursor.delete_current()
    }
}

impl<T: Table, CURSOR: DbCursorRO<T>> Iterator for Walker<'_, T, CURSOR> {
    type Item = Result<TableRow<T>, DatabaseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(start) = self.start.take() {
            return Some(Ok(start))
        }

        self.cursor.next().transpose()
    }
}
