//! Access helpers over the pipeline's tables.

use crate::error::StageError;
use weft_db::{
    cursor::DbCursorRO,
    tables,
    transaction::{DbTx, DbTxMut},
    DatabaseError,
};
use weft_primitives::{BlockNumber, StageId, TransactionSigned, TxNumber};

/// Read the progress marker of the given stage. A stage that never ran is at
/// progress 0.
pub fn read_stage_progress<TX: DbTx>(txn: &TX, id: StageId) -> Result<BlockNumber, DatabaseError> {
    Ok(txn.get::<tables::SyncStage>(id.as_str().to_string())?.unwrap_or_default())
}

/// Write the progress marker of the given stage.
pub fn write_stage_progress<TX: DbTxMut>(
    txn: &TX,
    id: StageId,
    block: BlockNumber,
) -> Result<(), DatabaseError> {
    txn.put::<tables::SyncStage>(id.as_str().to_string(), block)
}

/// Read `count` consecutive transactions starting at `first_tx_num`.
pub fn read_transactions<C: DbCursorRO<tables::BlockTransactions>>(
    cursor: &mut C,
    first_tx_num: TxNumber,
    count: u64,
) -> Result<Vec<TransactionSigned>, StageError> {
    let mut transactions = Vec::with_capacity(count as usize);
    let mut row = cursor.seek_exact(first_tx_num)?;
    for expected in first_tx_num..first_tx_num + count {
        if expected != first_tx_num {
            row = cursor.next()?;
        }
        match row.take() {
            Some((tx_num, transaction)) if tx_num == expected => transactions.push(transaction),
            _ => {
                return Err(StageError::Unexpected(format!(
                    "missing transaction {expected} in the transactions table"
                )))
            }
        }
    }
    Ok(transactions)
}
