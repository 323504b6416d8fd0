//! Transaction traits: read and write access scoped to a single atomic view
//! of the store.

use crate::{
    cursor::{DbCursorRO, DbCursorRW},
    table::Table,
    DatabaseError,
};

/// A read-only database transaction.
pub trait DbTx: Send {
    /// The read-only cursor type over table `T`.
    type Cursor<'a, T: Table>: DbCursorRO<T>
    where
        Self: 'a;

    /// Get the value for the given key, if any.
    fn get<T: Table>(&self, key: T::Key) -> Result<Option<T::Value>, DatabaseError>;

    /// Create a read-only cursor over table `T`.
    fn cursor_read<T: Table>(&self) -> Result<Self::Cursor<'_, T>, DatabaseError>;
}

/// A read-write database transaction.
///
/// Writes only become visible to other transactions through
/// [`commit`](DbTxMut::commit); dropping the transaction rolls them back.
pub trait DbTxMut: DbTx {
    /// The read-write cursor type over table `T`.
    type CursorMut<'a, T: Table>: DbCursorRO<T> + DbCursorRW<T>
    where
        Self: 'a;

    /// Put the given value under the given key.
    fn put<T: Table>(&self, key: T::Key, value: T::Value) -> Result<(), DatabaseError>;

    /// Delete the value under the given key, returning whether it existed.
    fn delete<T: Table>(&self, key: T::Key) -> Result<bool, DatabaseError>;

    /// Create a read-write cursor over table `T`.
    fn cursor_write<T: Table>(&self) -> Result<Self::CursorMut<'_, T>, DatabaseError>;

    /// Commit the transaction, atomically promoting all of its writes.
    ///
    /// Returns `true` if anything could have been written, i.e. the
    /// transaction was a write transaction.
    fn commit(self) -> Result<bool, DatabaseError>
    where
        Self: Sized;
}
