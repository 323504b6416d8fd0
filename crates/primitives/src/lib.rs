//! Commonly used types for the sync pipeline: transactions, signatures, chain
//! configuration, and stage identifiers.

#![warn(missing_debug_implementations, missing_docs, unreachable_pub, rustdoc::all)]
#![deny(unused_must_use, rust_2018_idioms)]

mod chain_spec;
mod stage;
pub mod transaction;

pub use chain_spec::{ChainSpec, ChainSpecBuilder, Hardfork, MAINNET, SEPOLIA};
pub use stage::StageId;
pub use transaction::{
    AccessList, AccessListItem, Signature, Transaction, TransactionKind, TransactionSigned,
    TxType, SECP256K1N, SECP256K1N_HALF,
};

pub use alloy_primitives::{self, address, b256, hex, keccak256, Address, Bytes, B256, U256};

/// A block number.
pub type BlockNumber = u64;

/// The hash of a block.
pub type BlockHash = B256;

/// A monotonically increasing transaction index, unique over the whole chain.
pub type TxNumber = u64;

/// The hash of a transaction.
pub type TxHash = B256;

/// An EIP-155 chain identifier.
pub type ChainId = u64;
