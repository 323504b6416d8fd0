//! An in-memory database implementation.
//!
//! Transactions operate on a snapshot of the whole store and publish their
//! writes atomically on commit; dropping a transaction discards them. Append
//! order is enforced the way the production backend enforces it, so the
//! test suites exercise the same contract the real store provides. Like that
//! backend, the store expects a single write transaction at a time.

use crate::{
    cursor::{DbCursorRO, DbCursorRW, PairResult},
    database::Database,
    table::{Compress, Decode, Decompress, Encode, Table, TableRow},
    transaction::{DbTx, DbTxMut},
    DatabaseError,
};
use parking_lot::RwLock;
use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    marker::PhantomData,
    ops::Bound,
    sync::Arc,
};

type TableMap = HashMap<&'static str, BTreeMap<Vec<u8>, Vec<u8>>>;

/// An in-memory key-value store with snapshot transactions.
#[derive(Debug, Clone, Default)]
pub struct MemDb {
    inner: Arc<RwLock<TableMap>>,
}

impl MemDb {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of entries currently committed to table `T`.
    pub fn entries<T: Table>(&self) -> usize {
        self.inner.read().get(T::NAME).map(|table| table.len()).unwrap_or_default()
    }
}

impl Database for MemDb {
    type TX<'a> = MemTx where Self: 'a;
    type TXMut<'a> = MemTx where Self: 'a;

    fn tx(&self) -> Result<Self::TX<'_>, DatabaseError> {
        Ok(MemTx::new(self.inner.clone(), false))
    }

    fn tx_mut(&self) -> Result<Self::TXMut<'_>, DatabaseError> {
        Ok(MemTx::new(self.inner.clone(), true))
    }
}

/// A transaction over a [`MemDb`] snapshot.
#[derive(Debug)]
pub struct MemTx {
    db: Arc<RwLock<TableMap>>,
    tables: RefCell<TableMap>,
    write: bool,
}

impl MemTx {
    fn new(db: Arc<RwLock<TableMap>>, write: bool) -> Self {
        let tables = RefCell::new(db.read().clone());
        Self { db, tables, write }
    }

    fn check_writable(&self) -> Result<(), DatabaseError> {
        if self.write {
            Ok(())
        } else {
            Err(DatabaseError::ReadOnly)
        }
    }
}

impl DbTx for MemTx {
    type Cursor<'a, T: Table> = MemCursor<'a, T> where Self: 'a;

    fn get<T: Table>(&self, key: T::Key) -> Result<Option<T::Value>, DatabaseError> {
        let tables = self.tables.borrow();
        let Some(table) = tables.get(T::NAME) else { return Ok(None) };
        table.get(key.encode().as_ref()).map(|value| T::Value::decompress(value)).transpose()
    }

    fn cursor_read<T: Table>(&self) -> Result<Self::Cursor<'_, T>, DatabaseError> {
        Ok(MemCursor::new(&self.tables, false))
    }
}

impl DbTxMut for MemTx {
    type CursorMut<'a, T: Table> = MemCursor<'a, T> where Self: 'a;

    fn put<T: Table>(&self, key: T::Key, value: T::Value) -> Result<(), DatabaseError> {
        self.check_writable()?;
        self.tables
            .borrow_mut()
            .entry(T::NAME)
            .or_default()
            .insert(key.encode().as_ref().to_vec(), value.compress().as_ref().to_vec());
        Ok(())
    }

    fn delete<T: Table>(&self, key: T::Key) -> Result<bool, DatabaseError> {
        self.check_writable()?;
        Ok(self
            .tables
            .borrow_mut()
            .entry(T::NAME)
            .or_default()
            .remove(key.encode().as_ref())
            .is_some())
    }

    fn cursor_write<T: Table>(&self) -> Result<Self::CursorMut<'_, T>, DatabaseError> {
        Ok(MemCursor::new(&self.tables, self.write))
    }

    fn commit(self) -> Result<bool, DatabaseError> {
        if !self.write {
            return Ok(false)
        }
        *self.db.write() = self.tables.into_inner();
        Ok(true)
    }
}

/// A cursor over a table of a [`MemTx`] snapshot.
///
/// The cursor tracks its position by key, so any number of cursors can
/// traverse and mutate the snapshot interleaved.
#[derive(Debug)]
pub struct MemCursor<'tx, T: Table> {
    tables: &'tx RefCell<TableMap>,
    write: bool,
    current: Option<Vec<u8>>,
    _marker: PhantomData<T>,
}

impl<'tx, T: Table> MemCursor<'tx, T> {
    fn new(tables: &'tx RefCell<TableMap>, write: bool) -> Self {
        Self { tables, write, current: None, _marker: PhantomData }
    }

    fn decode_pair(key: &[u8], value: &[u8]) -> Result<TableRow<T>, DatabaseError> {
        Ok((T::Key::decode(key)?, T::Value::decompress(value)?))
    }

    fn found(&mut self, pair: Option<(Vec<u8>, Vec<u8>)>) -> PairResult<T> {
        match pair {
            Some((key, value)) => {
                let row = Self::decode_pair(&key, &value)?;
                self.current = Some(key);
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }
}

impl<T: Table> DbCursorRO<T> for MemCursor<'_, T> {
    fn first(&mut self) -> PairResult<T> {
        let pair = self
            .tables
            .borrow()
            .get(T::NAME)
            .and_then(|table| table.iter().next())
            .map(|(k, v)| (k.clone(), v.clone()));
        self.current = None;
        self.found(pair)
    }

    fn seek_exact(&mut self, key: T::Key) -> PairResult<T> {
        let encoded = key.encode();
        let pair = self
            .tables
            .borrow()
            .get(T::NAME)
            .and_then(|table| table.get_key_value(encoded.as_ref()))
            .map(|(k, v)| (k.clone(), v.clone()));
        self.found(pair)
    }

    fn seek(&mut self, key: T::Key) -> PairResult<T> {
        let encoded = key.encode();
        let pair = self
            .tables
            .borrow()
            .get(T::NAME)
            .and_then(|table| {
                table
                    .range::<[u8], _>((Bound::Included(encoded.as_ref()), Bound::Unbounded))
                    .next()
            })
            .map(|(k, v)| (k.clone(), v.clone()));
        if pair.is_none() {
            // park the cursor past the sought key so `next` does not restart
            self.current = Some(encoded.as_ref().to_vec());
        }
        self.found(pair)
    }

    fn next(&mut self) -> PairResult<T> {
        let Some(current) = self.current.clone() else { return self.first() };
        let pair = self
            .tables
            .borrow()
            .get(T::NAME)
            .and_then(|table| {
                table.range::<[u8], _>((Bound::Excluded(&current[..]), Bound::Unbounded)).next()
            })
            .map(|(k, v)| (k.clone(), v.clone()));
        self.found(pair)
    }

    fn last(&mut self) -> PairResult<T> {
        let pair = self
            .tables
            .borrow()
            .get(T::NAME)
            .and_then(|table| table.iter().next_back())
            .map(|(k, v)| (k.clone(), v.clone()));
        self.found(pair)
    }
}

impl<T: Table> DbCursorRW<T> for MemCursor<'_, T> {
    fn upsert(&mut self, key: T::Key, value: T::Value) -> Result<(), DatabaseError> {
        if !self.write {
            return Err(DatabaseError::ReadOnly)
        }
        let encoded = key.encode().as_ref().to_vec();
        self.tables
            .borrow_mut()
            .entry(T::NAME)
            .or_default()
            .insert(encoded.clone(), value.compress().as_ref().to_vec());
        self.current = Some(encoded);
        Ok(())
    }

    fn append(&mut self, key: T::Key, value: T::Value) -> Result<(), DatabaseError> {
        if !self.write {
            return Err(DatabaseError::ReadOnly)
        }
        let encoded = key.encode().as_ref().to_vec();
        let mut tables = self.tables.borrow_mut();
        let table = tables.entry(T::NAME).or_default();
        if let Some((last, _)) = table.iter().next_back() {
            if last >= &encoded {
                return Err(DatabaseError::AppendOrder { table: T::NAME })
            }
        }
        table.insert(encoded.clone(), value.compress().as_ref().to_vec());
        drop(tables);
        self.current = Some(encoded);
        Ok(())
    }

    fn delete_current(&mut self) -> Result<(), DatabaseError> {
        if !self.write {
            return Err(DatabaseError::ReadOnly)
        }
        if let Some(current) = &self.current {
            self.tables.borrow_mut().entry(T::NAME).or_default().remove(current);
        }
        Ok(())
    }
}
