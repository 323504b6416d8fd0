//! Storage abstraction for the sync pipeline.
//!
//! The traits in this crate mirror the contract of a Btree-based key-value
//! store with single-writer transactions: typed [tables](crate::table::Table),
//! [cursors](crate::cursor) that traverse them in key order and support
//! append-only bulk loads, and [transactions](crate::transaction) whose writes
//! are only promoted by an explicit commit.
//!
//! The [`mem`] module provides an in-memory implementation with the same
//! semantics, used throughout the test suites.

#![warn(missing_debug_implementations, missing_docs, unreachable_pub, rustdoc::all)]
#![deny(unused_must_use, rust_2018_idioms)]

pub mod cursor;
pub mod database;
pub mod mem;
pub mod table;
pub mod tables;
pub mod transaction;

pub use database::Database;
pub use tables::models;

/// Database access error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to decode a key or decompress a value read from a table.
    #[error("failed to decode a value from the database")]
    Decode,
    /// A bulk append was attempted with a key not greater than the table's
    /// current maximum.
    #[error("cannot append out-of-order key to table {table}")]
    AppendOrder {
        /// The table the append was attempted on.
        table: &'static str,
    },
    /// A write was attempted through a read-only transaction.
    #[error("attempted to write through a read-only transaction")]
    ReadOnly,
}
