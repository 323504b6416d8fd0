//! Models shared by tables, and the codec implementations of the key and
//! value types.

use crate::{
    table::{Compress, Decode, Decompress, Encode},
    DatabaseError,
};
use alloy_rlp::{Decodable, Encodable, RlpDecodable, RlpEncodable};
use weft_primitives::{Address, BlockHash, BlockNumber, TransactionSigned, TxNumber, B256};

/// The storage representation of a block body: the pointer to the window of
/// the block's transactions in [`BlockTransactions`](crate::tables::BlockTransactions).
#[derive(Debug, Default, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct StoredBlockBody {
    /// The chain-wide index of the first transaction in this block.
    pub first_tx_num: TxNumber,
    /// The total number of transactions in this block.
    pub tx_count: u64,
}

impl StoredBlockBody {
    /// Return the range of transaction indices for this body.
    pub fn tx_num_range(&self) -> std::ops::Range<TxNumber> {
        self.first_tx_num..self.first_tx_num + self.tx_count
    }

    /// Return a flag whether the block is empty.
    pub fn is_empty(&self) -> bool {
        self.tx_count == 0
    }
}

/// `BlockNumber` concatenated with `BlockHash`, used as the key of the body
/// and sender tables. Keeping the number first makes the encoded keys sort by
/// height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockNumHash(pub (BlockNumber, BlockHash));

impl BlockNumHash {
    /// Consumes `self` and returns the block number and hash.
    pub fn take(self) -> (BlockNumber, BlockHash) {
        (self.0 .0, self.0 .1)
    }

    /// Return the block number.
    pub fn number(&self) -> BlockNumber {
        self.0 .0
    }

    /// Return the block hash.
    pub fn hash(&self) -> BlockHash {
        self.0 .1
    }
}

impl From<(BlockNumber, BlockHash)> for BlockNumHash {
    fn from(tpl: (BlockNumber, BlockHash)) -> Self {
        BlockNumHash(tpl)
    }
}

impl Encode for BlockNumHash {
    type Encoded = [u8; 40];

    fn encode(self) -> Self::Encoded {
        let (number, hash) = self.take();

        let mut buf = [0; 40];
        buf[..8].copy_from_slice(&number.to_be_bytes());
        buf[8..].copy_from_slice(hash.as_slice());
        buf
    }
}

impl Decode for BlockNumHash {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        if value.len() != 40 {
            return Err(DatabaseError::Decode)
        }

        let number = u64::from_be_bytes(value[..8].try_into().map_err(|_| DatabaseError::Decode)?);
        let hash = B256::from_slice(&value[8..]);

        Ok(BlockNumHash((number, hash)))
    }
}

/// The senders of a block's transactions, in transaction order.
///
/// Stored as the plain concatenation of 20-byte addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SenderList(pub Vec<Address>);

impl SenderList {
    /// The number of senders in the list.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the list holds no senders.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Compress for SenderList {
    type Compressed = Vec<u8>;

    fn compress(self) -> Self::Compressed {
        let mut buf = Vec::with_capacity(self.0.len() * Address::len_bytes());
        for address in &self.0 {
            buf.extend_from_slice(address.as_slice());
        }
        buf
    }
}

impl Decompress for SenderList {
    fn decompress(value: &[u8]) -> Result<Self, DatabaseError> {
        if value.len() % Address::len_bytes() != 0 {
            return Err(DatabaseError::Decode)
        }
        Ok(SenderList(value.chunks_exact(Address::len_bytes()).map(Address::from_slice).collect()))
    }
}

impl Encode for u64 {
    type Encoded = [u8; 8];

    fn encode(self) -> Self::Encoded {
        self.to_be_bytes()
    }
}

impl Decode for u64 {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        Ok(u64::from_be_bytes(value.try_into().map_err(|_| DatabaseError::Decode)?))
    }
}

impl Compress for u64 {
    type Compressed = [u8; 8];

    fn compress(self) -> Self::Compressed {
        self.to_be_bytes()
    }
}

impl Decompress for u64 {
    fn decompress(value: &[u8]) -> Result<Self, DatabaseError> {
        Ok(u64::from_be_bytes(value.try_into().map_err(|_| DatabaseError::Decode)?))
    }
}

impl Encode for String {
    type Encoded = Vec<u8>;

    fn encode(self) -> Self::Encoded {
        self.into_bytes()
    }
}

impl Decode for String {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        String::from_utf8(value.to_vec()).map_err(|_| DatabaseError::Decode)
    }
}

impl Compress for B256 {
    type Compressed = [u8; 32];

    fn compress(self) -> Self::Compressed {
        self.0
    }
}

impl Decompress for B256 {
    fn decompress(value: &[u8]) -> Result<Self, DatabaseError> {
        if value.len() != 32 {
            return Err(DatabaseError::Decode)
        }
        Ok(B256::from_slice(value))
    }
}

impl Compress for StoredBlockBody {
    type Compressed = Vec<u8>;

    fn compress(self) -> Self::Compressed {
        let mut buf = Vec::with_capacity(self.length());
        self.encode(&mut buf);
        buf
    }
}

impl Decompress for StoredBlockBody {
    fn decompress(mut value: &[u8]) -> Result<Self, DatabaseError> {
        Self::decode(&mut value).map_err(|_| DatabaseError::Decode)
    }
}

impl Compress for TransactionSigned {
    type Compressed = Vec<u8>;

    fn compress(self) -> Self::Compressed {
        let mut buf = Vec::with_capacity(self.length());
        Encodable::encode(&self, &mut buf);
        buf
    }
}

impl Decompress for TransactionSigned {
    fn decompress(mut value: &[u8]) -> Result<Self, DatabaseError> {
        TransactionSigned::decode_enveloped(&mut value).map_err(|_| DatabaseError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_primitives::address;

    #[test]
    fn block_num_hash_key_ordering_matches_encoding() {
        let low = BlockNumHash((1, B256::repeat_byte(0xff)));
        let high = BlockNumHash((2, B256::ZERO));

        assert!(low < high);
        assert!(Encode::encode(low) < Encode::encode(high));

        let decoded = BlockNumHash::decode(Encode::encode(high).as_ref()).unwrap();
        assert_eq!(decoded, high);
    }

    #[test]
    fn sender_list_is_flat_concatenation() {
        let senders = SenderList(vec![
            address!("9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f"),
            address!("c08b5542d177ac6686946920409741463a15dddb"),
        ]);

        let bytes = senders.clone().compress();
        assert_eq!(bytes.len(), 40);
        assert_eq!(SenderList::decompress(&bytes).unwrap(), senders);

        assert_matches::assert_matches!(
            SenderList::decompress(&bytes[..39]),
            Err(DatabaseError::Decode)
        );
    }

    #[test]
    fn stored_block_body_roundtrip() {
        let body = StoredBlockBody { first_tx_num: 10, tx_count: 3 };
        let decoded = StoredBlockBody::decompress(&body.clone().compress()).unwrap();
        assert_eq!(decoded, body);
        assert_eq!(decoded.tx_num_range(), 10..13);
        assert!(!decoded.is_empty());
    }
}
