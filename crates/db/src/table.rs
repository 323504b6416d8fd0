//! Typed table definitions and the codec traits their keys and values
//! implement.

use crate::DatabaseError;
use std::fmt::Debug;

/// Trait that transforms a key for storage in the database.
///
/// Key encodings must preserve ordering: the byte-wise order of encoded keys
/// has to match the `Ord` of the unencoded type.
pub trait Encode: Send + Sync + Sized + Debug {
    /// Encoded type.
    type Encoded: AsRef<[u8]> + Send + Sync;

    /// Encodes data going into the database.
    fn encode(self) -> Self::Encoded;
}

/// Trait that recovers a key read from the database.
pub trait Decode: Send + Sync + Sized + Debug {
    /// Decodes data coming from the database.
    fn decode(value: &[u8]) -> Result<Self, DatabaseError>;
}

/// Trait that transforms a value for storage in the database.
pub trait Compress: Send + Sync + Sized + Debug {
    /// Compressed type.
    type Compressed: AsRef<[u8]> + Send + Sync;

    /// Compresses data going into the database.
    fn compress(self) -> Self::Compressed;
}

/// Trait that recovers a value read from the database.
pub trait Decompress: Send + Sync + Sized + Debug {
    /// Decompresses data coming from the database.
    fn decompress(value: &[u8]) -> Result<Self, DatabaseError>;
}

/// Generic trait that enforces the database key to implement [`Encode`] and
/// [`Decode`].
pub trait Key: Encode + Decode + Ord + Clone {}

impl<T> Key for T where T: Encode + Decode + Ord + Clone {}

/// Generic trait that enforces the database value to implement [`Compress`]
/// and [`Decompress`].
pub trait Value: Compress + Decompress {}

impl<T> Value for T where T: Compress + Decompress {}

/// Generic trait that a database table should follow.
///
/// [`Table::Key`] and [`Table::Value`] define how the data is stored and read
/// from the database.
pub trait Table: Send + Sync + Debug + 'static {
    /// The name of the table as it is present inside the database.
    const NAME: &'static str;
    /// Key element of the table.
    ///
    /// Sorting should be taken into account when encoding this.
    type Key: Key;
    /// Value element of the table.
    type Value: Value;
}

/// A key-value pair of a [`Table`].
pub type TableRow<T> = (<T as Table>::Key, <T as Table>::Value);
