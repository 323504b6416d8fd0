//! Table and data structure declarations.

pub mod models;

use crate::tables::models::{BlockNumHash, SenderList, StoredBlockBody};
use weft_primitives::{BlockHash, BlockNumber, TransactionSigned, TxNumber};

/// Declares a database table.
macro_rules! table {
    ($(#[$docs:meta])+ ( $table_name:ident ) $key:ty | $value:ty) => {
        $(#[$docs])+
        ///
        #[doc = concat!("Takes [`", stringify!($key), "`] as a key and returns [`", stringify!($value), "`].")]
        #[derive(Clone, Copy, Debug, Default)]
        pub struct $table_name;

        impl $crate::table::Table for $table_name {
            const NAME: &'static str = stringify!($table_name);
            type Key = $key;
            type Value = $value;
        }

        impl std::fmt::Display for $table_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", stringify!($table_name))
            }
        }
    };
}

/// The names of all tables present in the database.
pub const TABLES: [&str; 5] = [
    "CanonicalHeaders",
    "BlockBodies",
    "BlockTransactions",
    "Senders",
    "SyncStage",
];

table!(
    /// Stores the header hashes belonging to the canonical chain.
    ( CanonicalHeaders ) BlockNumber | BlockHash
);

table!(
    /// Stores the pointer of a block to its transaction window.
    ///
    /// Non-canonical blocks share the table; the block hash in the key
    /// disambiguates siblings at the same height.
    ( BlockBodies ) BlockNumHash | StoredBlockBody
);

table!(
    /// Stores raw transactions, keyed by their chain-wide index.
    ( BlockTransactions ) TxNumber | TransactionSigned
);

table!(
    /// Stores the recovered senders of a block's transactions, concatenated
    /// in transaction order. Blocks without transactions have no row.
    ( Senders ) BlockNumHash | SenderList
);

table!(
    /// Stores the highest fully processed block per pipeline stage.
    ( SyncStage ) String | BlockNumber
);
