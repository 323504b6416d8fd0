//! Helpers shared by the stage test suites: an in-memory stage database and
//! generators for signed transactions and seeded block ranges.

use crate::db;
use weft_db::{
    cursor::DbCursorRO,
    database::Database,
    mem::MemDb,
    models::{BlockNumHash, SenderList, StoredBlockBody},
    tables,
    transaction::{DbTx, DbTxMut},
};
use weft_primitives::{Address, BlockHash, BlockNumber, StageId, TransactionSigned};

/// A block as the test fixtures see it: canonical hash, transactions, and
/// their expected signers.
#[derive(Debug, Clone)]
pub(crate) struct TestBlock {
    pub(crate) number: BlockNumber,
    pub(crate) hash: BlockHash,
    pub(crate) transactions: Vec<TransactionSigned>,
    pub(crate) senders: Vec<Address>,
}

impl TestBlock {
    pub(crate) fn new(
        number: BlockNumber,
        hash: BlockHash,
        transactions: Vec<TransactionSigned>,
    ) -> Self {
        // fixtures with deliberately broken signatures have no signer
        let senders = transactions
            .iter()
            .map(|transaction| transaction.recover_signer().unwrap_or_default())
            .collect();
        Self { number, hash, transactions, senders }
    }
}

/// An in-memory database pre-wired for stage tests.
#[derive(Debug, Default)]
pub(crate) struct TestStageDb {
    pub(crate) db: MemDb,
}

impl TestStageDb {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_progress(&self, id: StageId, block: BlockNumber) {
        self.db.update(|tx| db::write_stage_progress(tx, id, block).unwrap()).unwrap()
    }

    pub(crate) fn progress(&self, id: StageId) -> BlockNumber {
        self.db.view(|tx| db::read_stage_progress(tx, id).unwrap()).unwrap()
    }

    /// Insert canonical blocks with their bodies and transactions, assigning
    /// chain-wide transaction numbers sequentially after the existing ones.
    pub(crate) fn insert_blocks(&self, blocks: &[TestBlock]) {
        self.db
            .update(|tx| {
                let mut next_tx_num = {
                    let mut cursor = tx.cursor_read::<tables::BlockTransactions>().unwrap();
                    cursor.last().unwrap().map(|(tx_num, _)| tx_num + 1).unwrap_or_default()
                };

                for block in blocks {
                    tx.put::<tables::CanonicalHeaders>(block.number, block.hash).unwrap();
                    tx.put::<tables::BlockBodies>(
                        BlockNumHash((block.number, block.hash)),
                        StoredBlockBody {
                            first_tx_num: next_tx_num,
                            tx_count: block.transactions.len() as u64,
                        },
                    )
                    .unwrap();
                    for transaction in &block.transactions {
                        tx.put::<tables::BlockTransactions>(next_tx_num, transaction.clone())
                            .unwrap();
                        next_tx_num += 1;
                    }
                }
            })
            .unwrap()
    }

    /// Insert a body row directly, e.g. for a non-canonical sibling.
    pub(crate) fn insert_body(
        &self,
        number: BlockNumber,
        hash: BlockHash,
        body: StoredBlockBody,
    ) {
        self.db
            .update(|tx| tx.put::<tables::BlockBodies>(BlockNumHash((number, hash)), body).unwrap())
            .unwrap()
    }

    pub(crate) fn delete_body(&self, number: BlockNumber, hash: BlockHash) {
        self.db
            .update(|tx| {
                tx.delete::<tables::BlockBodies>(BlockNumHash((number, hash))).unwrap();
            })
            .unwrap()
    }

    /// The sender row of the given block, if any.
    pub(crate) fn senders(&self, number: BlockNumber, hash: BlockHash) -> Option<Vec<Address>> {
        self.db
            .view(|tx| {
                tx.get::<tables::Senders>(BlockNumHash((number, hash)))
                    .unwrap()
                    .map(|list| list.0)
            })
            .unwrap()
    }

    /// Every sender row, in key order.
    pub(crate) fn sender_rows(&self) -> Vec<((BlockNumber, BlockHash), Vec<Address>)> {
        self.db
            .view(|tx| {
                let mut cursor = tx.cursor_read::<tables::Senders>().unwrap();
                cursor
                    .walk(None)
                    .unwrap()
                    .map(|row| {
                        let (key, SenderList(senders)) = row.unwrap();
                        (key.take(), senders)
                    })
                    .collect()
            })
            .unwrap()
    }
}

pub(crate) mod generators {
    use crate::stages::sender_recovery::RecoveryPackage;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use weft_primitives::{
        transaction::util, AccessList, Address, BlockNumber, Bytes, ChainId, Signature,
        Transaction, TransactionKind, TransactionSigned, TxType, B256, U256,
    };

    use super::TestBlock;

    /// A deterministically seeded generator, so fixtures are reproducible.
    pub(crate) fn rng() -> StdRng {
        StdRng::seed_from_u64(0x73656e64657273)
    }

    /// A stable, distinct hash per height.
    pub(crate) fn block_hash(number: BlockNumber) -> B256 {
        let mut hash = B256::ZERO;
        hash.0[24..].copy_from_slice(&number.to_be_bytes());
        hash
    }

    fn unsigned_tx(rng: &mut StdRng, tx_type: TxType, chain_id: Option<ChainId>) -> Transaction {
        let to = TransactionKind::Call(Address::from(rng.gen::<[u8; 20]>()));
        let value = U256::from(rng.gen::<u64>());
        match tx_type {
            TxType::Legacy => Transaction::Legacy {
                chain_id,
                nonce: rng.gen_range(0..10_000),
                gas_price: rng.gen_range(1..1_000_000_000),
                gas_limit: 21_000,
                to,
                value,
                input: Bytes::default(),
            },
            TxType::Eip2930 => Transaction::Eip2930 {
                chain_id: chain_id.unwrap_or(1),
                nonce: rng.gen_range(0..10_000),
                gas_price: rng.gen_range(1..1_000_000_000),
                gas_limit: 60_000,
                to,
                value,
                input: Bytes::default(),
                access_list: AccessList::default(),
            },
            TxType::Eip1559 => Transaction::Eip1559 {
                chain_id: chain_id.unwrap_or(1),
                nonce: rng.gen_range(0..10_000),
                max_priority_fee_per_gas: rng.gen_range(1..1_000_000_000),
                max_fee_per_gas: rng.gen_range(1_000_000_000..2_000_000_000),
                gas_limit: 60_000,
                to,
                value,
                input: Bytes::default(),
                access_list: AccessList::default(),
            },
        }
    }

    /// A transaction of the given type, signed with a random secret key.
    pub(crate) fn random_signed_tx(
        rng: &mut StdRng,
        tx_type: TxType,
        chain_id: Option<ChainId>,
    ) -> TransactionSigned {
        let transaction = unsigned_tx(rng, tx_type, chain_id);
        let hash = transaction.signature_hash();
        let signature = loop {
            let secret = B256::from(rng.gen::<[u8; 32]>());
            if let Ok(signature) = util::sign_message(secret, hash) {
                break signature
            }
        };
        TransactionSigned::from_transaction_and_signature(transaction, signature)
    }

    /// A transaction carrying the given raw signature values instead of a
    /// real signature.
    pub(crate) fn signed_tx_with_signature(
        tx_type: TxType,
        chain_id: Option<ChainId>,
        r: U256,
        s: U256,
    ) -> TransactionSigned {
        let transaction = unsigned_tx(&mut rng(), tx_type, chain_id);
        TransactionSigned::from_transaction_and_signature(
            transaction,
            Signature { r, s, odd_y_parity: false },
        )
    }

    /// The recovery package of a transaction, with the signer still unset.
    pub(crate) fn package(block_num: BlockNumber, tx: &TransactionSigned) -> RecoveryPackage {
        let signature = tx.signature();
        RecoveryPackage {
            block_num,
            tx_hash: tx.signature_hash(),
            odd_y_parity: signature.odd_y_parity,
            signature: signature.to_rs_bytes(),
            tx_from: Address::ZERO,
        }
    }

    /// A canonical block with `tx_count` transactions of rotating envelope
    /// types, all bound to `chain_id` where the type requires it.
    pub(crate) fn random_block(
        rng: &mut StdRng,
        number: BlockNumber,
        tx_count: usize,
        chain_id: ChainId,
    ) -> TestBlock {
        let transactions = (0..tx_count)
            .map(|index| match index % 4 {
                0 => random_signed_tx(rng, TxType::Legacy, None),
                1 => random_signed_tx(rng, TxType::Legacy, Some(chain_id)),
                2 => random_signed_tx(rng, TxType::Eip2930, Some(chain_id)),
                _ => random_signed_tx(rng, TxType::Eip1559, Some(chain_id)),
            })
            .collect();
        TestBlock::new(number, B256::from(rng.gen::<[u8; 32]>()), transactions)
    }
}
