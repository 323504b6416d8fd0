use crate::{Address, B256};
use alloy_rlp::{RlpDecodable, RlpDecodableWrapper, RlpEncodable, RlpEncodableWrapper};

/// A list of addresses and storage keys that the transaction plans to access.
///
/// Accesses outside the list are possible, but more expensive.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, RlpEncodableWrapper, RlpDecodableWrapper,
)]
pub struct AccessList(pub Vec<AccessListItem>);

/// A single item in an [`AccessList`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable)]
pub struct AccessListItem {
    /// Account address that will be accessed during transaction execution.
    pub address: Address,
    /// The storage keys to be accessed under the account.
    pub storage_keys: Vec<B256>,
}
