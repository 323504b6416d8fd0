//! The top-level database trait.

use crate::{
    transaction::{DbTx, DbTxMut},
    DatabaseError,
};

/// Main implementation of the database, producing read-only and read-write
/// transactions.
pub trait Database: Send + Sync {
    /// The read-only transaction type.
    type TX<'a>: DbTx
    where
        Self: 'a;
    /// The read-write transaction type.
    type TXMut<'a>: DbTxMut
    where
        Self: 'a;

    /// Create a read-only transaction.
    fn tx(&self) -> Result<Self::TX<'_>, DatabaseError>;

    /// Create a read-write transaction.
    fn tx_mut(&self) -> Result<Self::TXMut<'_>, DatabaseError>;

    /// Takes a function and passes a read-only transaction into it, making
    /// sure it's closed in the end of the execution.
    fn view<F, R>(&self, f: F) -> Result<R, DatabaseError>
    where
        F: FnOnce(&Self::TX<'_>) -> R,
    {
        let tx = self.tx()?;
        Ok(f(&tx))
    }

    /// Takes a function and passes a read-write transaction into it, making
    /// sure it's committed in the end of the execution.
    fn update<F, R>(&self, f: F) -> Result<R, DatabaseError>
    where
        F: FnOnce(&Self::TXMut<'_>) -> R,
    {
        let tx = self.tx_mut()?;
        let res = f(&tx);
        tx.commit()?;
        Ok(res)
    }
}
