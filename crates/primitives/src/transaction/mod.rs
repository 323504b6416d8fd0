//! Transaction types and their signing-preimage encodings.

mod access_list;
mod signature;
mod tx_type;
pub mod util;

pub use access_list::{AccessList, AccessListItem};
pub use signature::{Signature, SECP256K1N, SECP256K1N_HALF};
pub use tx_type::TxType;

use crate::{keccak256, Address, Bytes, ChainId, TxHash, U256};
use alloy_rlp::{
    length_of_length, Decodable, Encodable, Error as RlpError, Header, EMPTY_STRING_CODE,
};
use bytes::Buf;
use std::ops::Deref;

/// A raw transaction.
///
/// Transaction types were introduced in
/// [EIP-2718](https://eips.ethereum.org/EIPS/eip-2718).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transaction {
    /// Legacy transaction.
    Legacy {
        /// Added as EIP-155: Simple replay attack protection
        chain_id: Option<ChainId>,
        /// A scalar value equal to the number of transactions sent by the
        /// sender; formally Tn.
        nonce: u64,
        /// A scalar value equal to the number of Wei to be paid per unit of
        /// gas; formally Tp.
        gas_price: u128,
        /// A scalar value equal to the maximum amount of gas that should be
        /// used in executing this transaction; formally Tg.
        gas_limit: u64,
        /// The 160-bit address of the message call's recipient, or ∅ for a
        /// contract creation transaction; formally Tt.
        to: TransactionKind,
        /// A scalar value equal to the number of Wei to be transferred to the
        /// message call's recipient, or, in the case of contract creation, as
        /// an endowment to the newly created account; formally Tv.
        value: U256,
        /// Input has two uses depending on whether the transaction is Create
        /// or Call: the EVM-code for the account initialisation procedure, or
        /// the input data of the message call; formally Td.
        input: Bytes,
    },
    /// Transaction with an access list:
    /// <https://eips.ethereum.org/EIPS/eip-2930>
    Eip2930 {
        /// Added as EIP-155: Simple replay attack protection
        chain_id: ChainId,
        /// A scalar value equal to the number of transactions sent by the
        /// sender; formally Tn.
        nonce: u64,
        /// A scalar value equal to the number of Wei to be paid per unit of
        /// gas; formally Tp.
        gas_price: u128,
        /// A scalar value equal to the maximum amount of gas that should be
        /// used in executing this transaction; formally Tg.
        gas_limit: u64,
        /// The 160-bit address of the message call's recipient, or ∅ for a
        /// contract creation transaction; formally Tt.
        to: TransactionKind,
        /// A scalar value equal to the number of Wei to be transferred to the
        /// message call's recipient, or, in the case of contract creation, as
        /// an endowment to the newly created account; formally Tv.
        value: U256,
        /// Input has two uses depending on whether the transaction is Create
        /// or Call: the EVM-code for the account initialisation procedure, or
        /// the input data of the message call; formally Td.
        input: Bytes,
        /// The accessList specifies a list of addresses and storage keys;
        /// these addresses and storage keys are added into the
        /// `accessed_addresses` and `accessed_storage_keys` global sets
        /// (introduced in EIP-2929).
        access_list: AccessList,
    },
    /// Transaction with a priority fee:
    /// <https://eips.ethereum.org/EIPS/eip-1559>
    Eip1559 {
        /// Added as EIP-155: Simple replay attack protection
        chain_id: ChainId,
        /// A scalar value equal to the number of transactions sent by the
        /// sender; formally Tn.
        nonce: u64,
        /// Max priority fee per gas the transaction is paying.
        max_priority_fee_per_gas: u128,
        /// Max fee per gas the transaction is paying.
        max_fee_per_gas: u128,
        /// A scalar value equal to the maximum amount of gas that should be
        /// used in executing this transaction; formally Tg.
        gas_limit: u64,
        /// The 160-bit address of the message call's recipient, or ∅ for a
        /// contract creation transaction; formally Tt.
        to: TransactionKind,
        /// A scalar value equal to the number of Wei to be transferred to the
        /// message call's recipient, or, in the case of contract creation, as
        /// an endowment to the newly created account; formally Tv.
        value: U256,
        /// Input has two uses depending on whether the transaction is Create
        /// or Call: the EVM-code for the account initialisation procedure, or
        /// the input data of the message call; formally Td.
        input: Bytes,
        /// The accessList specifies a list of addresses and storage keys;
        /// these addresses and storage keys are added into the
        /// `accessed_addresses` and `accessed_storage_keys` global sets
        /// (introduced in EIP-2929).
        access_list: AccessList,
    },
}

impl Transaction {
    /// Returns the [`TxType`] of the transaction.
    pub fn tx_type(&self) -> TxType {
        match self {
            Transaction::Legacy { .. } => TxType::Legacy,
            Transaction::Eip2930 { .. } => TxType::Eip2930,
            Transaction::Eip1559 { .. } => TxType::Eip1559,
        }
    }

    /// Returns the chain id of the transaction, if one is present.
    ///
    /// Legacy transactions carry one only when signed according to EIP-155.
    pub fn chain_id(&self) -> Option<ChainId> {
        match self {
            Transaction::Legacy { chain_id, .. } => *chain_id,
            Transaction::Eip2930 { chain_id, .. } => Some(*chain_id),
            Transaction::Eip1559 { chain_id, .. } => Some(*chain_id),
        }
    }

    /// Sets the transaction's chain id to the provided value.
    pub fn set_chain_id(&mut self, chain_id: ChainId) {
        match self {
            Transaction::Legacy { chain_id: ref mut c, .. } => *c = Some(chain_id),
            Transaction::Eip2930 { chain_id: ref mut c, .. } => *c = chain_id,
            Transaction::Eip1559 { chain_id: ref mut c, .. } => *c = chain_id,
        }
    }

    /// Gets the transaction's [`TransactionKind`], which is the address of the
    /// recipient or [`TransactionKind::Create`] for a contract creation.
    pub fn kind(&self) -> &TransactionKind {
        match self {
            Transaction::Legacy { to, .. } |
            Transaction::Eip2930 { to, .. } |
            Transaction::Eip1559 { to, .. } => to,
        }
    }

    /// Gets the transaction's nonce.
    pub fn nonce(&self) -> u64 {
        match self {
            Transaction::Legacy { nonce, .. } |
            Transaction::Eip2930 { nonce, .. } |
            Transaction::Eip1559 { nonce, .. } => *nonce,
        }
    }

    /// Outputs the length of the transaction's fields without a RLP header or
    /// EIP-155 fields, in the order covered by the signature.
    pub(crate) fn fields_len(&self) -> usize {
        match self {
            Transaction::Legacy { chain_id: _, nonce, gas_price, gas_limit, to, value, input } => {
                nonce.length() +
                    gas_price.length() +
                    gas_limit.length() +
                    to.length() +
                    value.length() +
                    input.length()
            }
            Transaction::Eip2930 {
                chain_id,
                nonce,
                gas_price,
                gas_limit,
                to,
                value,
                input,
                access_list,
            } => {
                chain_id.length() +
                    nonce.length() +
                    gas_price.length() +
                    gas_limit.length() +
                    to.length() +
                    value.length() +
                    input.length() +
                    access_list.length()
            }
            Transaction::Eip1559 {
                chain_id,
                nonce,
                max_priority_fee_per_gas,
                max_fee_per_gas,
                gas_limit,
                to,
                value,
                input,
                access_list,
            } => {
                chain_id.length() +
                    nonce.length() +
                    max_priority_fee_per_gas.length() +
                    max_fee_per_gas.length() +
                    gas_limit.length() +
                    to.length() +
                    value.length() +
                    input.length() +
                    access_list.length()
            }
        }
    }

    /// Encodes the transaction's fields in the order covered by the signature,
    /// without a RLP header, type byte, or EIP-155 fields.
    pub(crate) fn encode_fields(&self, out: &mut dyn alloy_rlp::BufMut) {
        match self {
            Transaction::Legacy { chain_id: _, nonce, gas_price, gas_limit, to, value, input } => {
                nonce.encode(out);
                gas_price.encode(out);
                gas_limit.encode(out);
                to.encode(out);
                value.encode(out);
                input.encode(out);
            }
            Transaction::Eip2930 {
                chain_id,
                nonce,
                gas_price,
                gas_limit,
                to,
                value,
                input,
                access_list,
            } => {
                chain_id.encode(out);
                nonce.encode(out);
                gas_price.encode(out);
                gas_limit.encode(out);
                to.encode(out);
                value.encode(out);
                input.encode(out);
                access_list.encode(out);
            }
            Transaction::Eip1559 {
                chain_id,
                nonce,
                max_priority_fee_per_gas,
                max_fee_per_gas,
                gas_limit,
                to,
                value,
                input,
                access_list,
            } => {
                chain_id.encode(out);
                nonce.encode(out);
                max_priority_fee_per_gas.encode(out);
                max_fee_per_gas.encode(out);
                gas_limit.encode(out);
                to.encode(out);
                value.encode(out);
                input.encode(out);
                access_list.encode(out);
            }
        }
    }

    /// Outputs the length of the EIP-155 fields. Only non-zero for legacy
    /// transactions carrying a chain id.
    pub(crate) fn eip155_fields_len(&self) -> usize {
        if let Transaction::Legacy { chain_id: Some(id), .. } = self {
            // EIP-155 encodes the chain id and two zeroes
            id.length() + 2
        } else {
            // a pre-EIP-155 legacy transaction or a typed transaction
            0
        }
    }

    /// Encodes the EIP-155 fields `(chain_id, 0, 0)`. Only encodes values for
    /// legacy transactions carrying a chain id.
    pub(crate) fn encode_eip155_fields(&self, out: &mut dyn alloy_rlp::BufMut) {
        // if this is a legacy transaction without a chain id, it must be
        // pre-EIP-155 and does not encode the chain id in the signing preimage
        if let Transaction::Legacy { chain_id: Some(id), .. } = self {
            id.encode(out);
            0x00u8.encode(out);
            0x00u8.encode(out);
        }
    }

    /// Encodes the portion of the transaction covered by its signature.
    ///
    /// Typed transactions are prefixed by their type byte and are not wrapped
    /// into an outer byte string.
    pub fn encode_for_signing(&self, out: &mut dyn alloy_rlp::BufMut) {
        match self.tx_type() {
            TxType::Legacy => {
                let payload_length = self.fields_len() + self.eip155_fields_len();
                Header { list: true, payload_length }.encode(out);
                self.encode_fields(out);
                self.encode_eip155_fields(out);
            }
            tx_type => {
                out.put_u8(tx_type as u8);
                Header { list: true, payload_length: self.fields_len() }.encode(out);
                self.encode_fields(out);
            }
        }
    }

    /// Heavy operation that hashes the RLP-encoded signing preimage.
    /// It is only used for signature signing and signer recovery.
    pub fn signature_hash(&self) -> TxHash {
        let mut buf = Vec::new();
        self.encode_for_signing(&mut buf);
        keccak256(&buf)
    }
}

/// Whether or not the transaction is a contract creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    /// A transaction that creates a contract.
    Create,
    /// A transaction that calls a contract or transfers value.
    Call(Address),
}

impl Encodable for TransactionKind {
    fn length(&self) -> usize {
        match self {
            TransactionKind::Call(to) => to.length(),
            // a creation is encoded as the empty string, a single byte
            TransactionKind::Create => 1,
        }
    }

    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        match self {
            TransactionKind::Call(to) => to.encode(out),
            TransactionKind::Create => out.put_u8(EMPTY_STRING_CODE),
        }
    }
}

impl Decodable for TransactionKind {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        if let Some(&first) = buf.first() {
            if first == EMPTY_STRING_CODE {
                buf.advance(1);
                Ok(TransactionKind::Create)
            } else {
                let addr = <Address as Decodable>::decode(buf)?;
                Ok(TransactionKind::Call(addr))
            }
        } else {
            Err(RlpError::InputTooShort)
        }
    }
}

impl From<Address> for TransactionKind {
    fn from(address: Address) -> Self {
        TransactionKind::Call(address)
    }
}

/// A signed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionSigned {
    transaction: Transaction,
    hash: TxHash,
    signature: Signature,
}

impl AsRef<Transaction> for TransactionSigned {
    fn as_ref(&self) -> &Transaction {
        &self.transaction
    }
}

impl Deref for TransactionSigned {
    type Target = Transaction;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

impl TransactionSigned {
    /// The transaction signature.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The transaction hash, identifying the transaction.
    ///
    /// This is the keccak hash of the enveloped encoding, not of the signing
    /// preimage.
    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// The unsigned transaction.
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Create a new signed transaction from a transaction and its signature.
    /// This will also calculate the transaction hash using its encoding.
    pub fn from_transaction_and_signature(transaction: Transaction, signature: Signature) -> Self {
        let mut initial_tx = Self { transaction, hash: Default::default(), signature };
        let mut buf = Vec::with_capacity(initial_tx.length());
        initial_tx.encode(&mut buf);
        initial_tx.hash = keccak256(&buf);
        initial_tx
    }

    /// Recover the address of the signer, enforcing the EIP-2 low-`s`
    /// constraint on the signature.
    ///
    /// Returns `None` if the transaction's signature is invalid.
    pub fn recover_signer(&self) -> Option<Address> {
        self.signature.recover_signer(self.signature_hash())
    }

    /// Recover the address of the signer without the EIP-2 low-`s` check.
    pub fn recover_signer_unchecked(&self) -> Option<Address> {
        self.signature.recover_signer_unchecked(self.signature_hash())
    }

    /// Decodes a transaction from its enveloped form: the plain RLP list for
    /// legacy transactions, or `type || rlp(fields)` for typed ones.
    pub fn decode_enveloped(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let original_encoding = *buf;
        let first = *buf.first().ok_or(RlpError::InputTooShort)?;

        let (transaction, signature) = if first <= 0x02 {
            buf.advance(1);
            let header = Header::decode(buf)?;
            if !header.list {
                return Err(RlpError::Custom("typed transaction payload must be an RLP list"))
            }
            let transaction = match first {
                1 => Transaction::Eip2930 {
                    chain_id: Decodable::decode(buf)?,
                    nonce: Decodable::decode(buf)?,
                    gas_price: Decodable::decode(buf)?,
                    gas_limit: Decodable::decode(buf)?,
                    to: Decodable::decode(buf)?,
                    value: Decodable::decode(buf)?,
                    input: Decodable::decode(buf)?,
                    access_list: Decodable::decode(buf)?,
                },
                2 => Transaction::Eip1559 {
                    chain_id: Decodable::decode(buf)?,
                    nonce: Decodable::decode(buf)?,
                    max_priority_fee_per_gas: Decodable::decode(buf)?,
                    max_fee_per_gas: Decodable::decode(buf)?,
                    gas_limit: Decodable::decode(buf)?,
                    to: Decodable::decode(buf)?,
                    value: Decodable::decode(buf)?,
                    input: Decodable::decode(buf)?,
                    access_list: Decodable::decode(buf)?,
                },
                _ => return Err(RlpError::Custom("unsupported typed transaction type")),
            };
            let signature = Signature::decode(buf)?;
            (transaction, signature)
        } else {
            let header = Header::decode(buf)?;
            if !header.list {
                return Err(RlpError::Custom("legacy transaction must be an RLP list"))
            }
            let mut transaction = Transaction::Legacy {
                chain_id: None,
                nonce: Decodable::decode(buf)?,
                gas_price: Decodable::decode(buf)?,
                gas_limit: Decodable::decode(buf)?,
                to: Decodable::decode(buf)?,
                value: Decodable::decode(buf)?,
                input: Decodable::decode(buf)?,
            };
            let (signature, extracted_id) = Signature::decode_with_eip155_chain_id(buf)?;
            if let Some(id) = extracted_id {
                transaction.set_chain_id(id);
            }
            (transaction, signature)
        };

        let consumed = original_encoding.len() - buf.len();
        let hash = keccak256(&original_encoding[..consumed]);
        Ok(TransactionSigned { transaction, hash, signature })
    }
}

impl Encodable for TransactionSigned {
    fn length(&self) -> usize {
        match &self.transaction {
            Transaction::Legacy { chain_id, .. } => {
                let payload_length = self.transaction.fields_len() +
                    self.signature.payload_len_with_eip155_chain_id(*chain_id);
                payload_length + length_of_length(payload_length)
            }
            _ => {
                let payload_length =
                    self.transaction.fields_len() + self.signature.payload_len();
                1 + payload_length + length_of_length(payload_length)
            }
        }
    }

    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        match &self.transaction {
            Transaction::Legacy { chain_id, .. } => {
                let payload_length = self.transaction.fields_len() +
                    self.signature.payload_len_with_eip155_chain_id(*chain_id);
                Header { list: true, payload_length }.encode(out);
                self.transaction.encode_fields(out);
                self.signature.encode_with_eip155_chain_id(out, *chain_id);
            }
            _ => {
                out.put_u8(self.transaction.tx_type() as u8);
                let payload_length =
                    self.transaction.fields_len() + self.signature.payload_len();
                Header { list: true, payload_length }.encode(out);
                self.transaction.encode_fields(out);
                self.signature.encode(out);
            }
        }
    }
}

impl Decodable for TransactionSigned {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        Self::decode_enveloped(buf)
    }
}
