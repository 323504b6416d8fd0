//! Transaction sender recovery.
//!
//! For every canonical block in the unprocessed range, this stage derives the
//! signer address of each transaction through secp256k1 public-key recovery
//! and maintains the sender index: one row per non-empty block, keyed by
//! `(height, hash)`, holding the concatenated 20-byte addresses in
//! transaction order.
//!
//! Recovery is CPU bound, so batches of prepared signing hashes are farmed
//! out to a pool of worker threads while the orchestrator keeps walking the
//! chain; the collector re-establishes global key order before the results
//! are bulk-appended.

mod farm;
mod pool;
mod validate;
mod worker;

pub use farm::FarmProgress;

use crate::{
    db,
    error::StageError,
    stage::{ExecOutput, Stage, UnwindInput, UnwindOutput},
};
use farm::RecoveryFarm;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tempfile::TempDir;
use weft_db::{
    cursor::{DbCursorRO, DbCursorRW},
    models::BlockNumHash,
    tables,
    transaction::DbTxMut,
    Database,
};
use weft_primitives::{Address, BlockNumber, ChainSpec, StageId, TxHash, B256};

/// The bundle of bytes a recovery worker needs to derive one signer address,
/// plus the block number to route the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryPackage {
    /// The block the transaction belongs to.
    pub block_num: BlockNumber,
    /// keccak-256 of the transaction's signing preimage.
    pub tx_hash: TxHash,
    /// The signature parity bit.
    pub odd_y_parity: bool,
    /// The signature as `r || s`, big endian.
    pub signature: [u8; 64],
    /// The recovered signer. Undefined on input; workers populate it.
    pub tx_from: Address,
}

/// A latched stop signal shared by the farm, its pool, and its workers.
///
/// The external side is owned by the caller; the internal side is latched by
/// worker failures and internal shutdown paths. Once either side is set the
/// signal never resets.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    external: Arc<AtomicBool>,
    internal: Arc<AtomicBool>,
}

impl StopToken {
    /// Wrap an externally owned stop flag.
    pub fn new(external: Arc<AtomicBool>) -> Self {
        Self { external, internal: Arc::default() }
    }

    /// Latch the internal stop request.
    pub(crate) fn stop(&self) {
        self.internal.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested from either side.
    pub fn is_stopping(&self) -> bool {
        self.external.load(Ordering::SeqCst) || self.internal.load(Ordering::SeqCst)
    }

    /// Whether the stop was requested by the external owner.
    pub(crate) fn external_requested(&self) -> bool {
        self.external.load(Ordering::SeqCst)
    }
}

/// The sender recovery stage.
///
/// The stage processes every canonical block between its own progress marker
/// and the progress of the block hashes and bodies stages, and writes one
/// sender row per non-empty block. Runs are atomic: a failed or aborted run
/// leaves the sender index and the progress marker untouched.
#[derive(Debug, Clone)]
pub struct SenderRecoveryStage {
    /// The chain whose rules transactions are validated against.
    pub chain_spec: Arc<ChainSpec>,
    /// The memory budget shared by the in-flight recovery batches; each
    /// worker's batch is sized to roughly `batch_bytes / max_workers`.
    pub batch_bytes: usize,
    /// The worker ceiling. Defaults to the hardware concurrency.
    pub max_workers: usize,
    /// The in-memory threshold of the sender collector, above which sorted
    /// runs spill to disk.
    pub etl_buffer_bytes: usize,
    /// An externally owned stop flag, polled between batches and blocks.
    pub stop: Arc<AtomicBool>,
}

impl SenderRecoveryStage {
    /// The default memory budget for in-flight recovery batches.
    pub const DEFAULT_BATCH_BYTES: usize = 512 * 1024 * 1024;
    /// The default collector buffer capacity.
    pub const DEFAULT_ETL_BUFFER_BYTES: usize = 256 * 1024 * 1024;

    /// Create a new stage with default sizing for the given chain.
    pub fn new(chain_spec: Arc<ChainSpec>) -> Self {
        Self {
            chain_spec,
            batch_bytes: Self::DEFAULT_BATCH_BYTES,
            max_workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            etl_buffer_bytes: Self::DEFAULT_ETL_BUFFER_BYTES,
            stop: Arc::default(),
        }
    }

    /// Poll the given externally owned stop flag during execution.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }
}

impl<DB: Database> Stage<DB> for SenderRecoveryStage {
    fn id(&self) -> StageId {
        StageId::Senders
    }

    fn execute(&mut self, database: &DB) -> Result<ExecOutput, StageError> {
        let txn = database.tx_mut()?;
        let etl_dir = Arc::new(TempDir::new().map_err(|err| {
            StageError::Unexpected(format!("unable to create the collector directory: {err}"))
        })?);

        let mut farm = RecoveryFarm::new(
            &txn,
            self.chain_spec.clone(),
            StopToken::new(self.stop.clone()),
            self.max_workers,
            self.batch_bytes,
            etl_dir,
            self.etl_buffer_bytes,
        );
        let output = farm.recover()?;
        drop(farm);

        txn.commit()?;
        Ok(output)
    }

    fn unwind(&mut self, database: &DB, input: UnwindInput) -> Result<UnwindOutput, StageError> {
        let txn = database.tx_mut()?;

        // remove every sender row above the unwind point
        {
            let mut cursor = txn.cursor_write::<tables::Senders>()?;
            let mut row = cursor.seek(BlockNumHash((input.unwind_to + 1, B256::ZERO)))?;
            while row.is_some() {
                cursor.delete_current()?;
                row = cursor.next()?;
            }
        }

        let progress =
            db::read_stage_progress(&txn, StageId::Senders)?.min(input.unwind_to);
        db::write_stage_progress(&txn, StageId::Senders, progress)?;
        txn.commit()?;
        Ok(UnwindOutput { stage_progress: progress })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::InvalidTransactionError,
        test_utils::{generators, TestBlock, TestStageDb},
    };
    use assert_matches::assert_matches;
    use weft_db::models::StoredBlockBody;
    use weft_primitives::{ChainSpecBuilder, TxType, SECP256K1N, U256};

    fn london_chain() -> Arc<ChainSpec> {
        Arc::new(ChainSpecBuilder::default().chain_id(1).london_activated().build())
    }

    /// A stage with batches small enough that even tiny ranges exercise
    /// several workers, and a collector that spills to disk.
    fn test_stage(chain_spec: Arc<ChainSpec>) -> SenderRecoveryStage {
        let mut stage = SenderRecoveryStage::new(chain_spec);
        stage.batch_bytes = 4 * stage.max_workers * std::mem::size_of::<RecoveryPackage>();
        stage.etl_buffer_bytes = 256;
        stage
    }

    fn seed_range(db: &TestStageDb, blocks: &[TestBlock]) {
        let target = blocks.last().map(|block| block.number).unwrap_or_default();
        db.insert_blocks(blocks);
        db.set_progress(StageId::BlockHashes, target);
        db.set_progress(StageId::Bodies, target);
    }

    #[test]
    fn execute_with_no_new_blocks_is_a_noop() {
        let db = TestStageDb::new();
        db.set_progress(StageId::Senders, 100);
        db.set_progress(StageId::BlockHashes, 100);
        db.set_progress(StageId::Bodies, 100);

        let mut stage = test_stage(london_chain());
        let output = stage.execute(&db.db).unwrap();

        assert_eq!(output, ExecOutput { stage_progress: 100, done: true });
        assert_eq!(db.sender_rows().len(), 0);
    }

    #[test]
    fn execute_with_regressed_target_errors() {
        let db = TestStageDb::new();
        db.set_progress(StageId::Senders, 110);
        db.set_progress(StageId::BlockHashes, 100);
        db.set_progress(StageId::Bodies, 120);

        let mut stage = test_stage(london_chain());
        assert_matches!(
            stage.execute(&db.db),
            Err(StageError::InvalidProgress { previous: 110, target: 100 })
        );
        // nothing moved
        assert_eq!(db.progress(StageId::Senders), 110);
    }

    #[test]
    fn execute_recovers_senders_for_canonical_blocks() {
        let mut rng = generators::rng();
        let db = TestStageDb::new();

        // tx counts cycle through 0..=3 so empty blocks are interleaved
        let blocks: Vec<_> = (1u64..=24)
            .map(|number| generators::random_block(&mut rng, number, (number % 4) as usize, 1))
            .collect();
        seed_range(&db, &blocks);

        let mut stage = test_stage(london_chain());
        let output = stage.execute(&db.db).unwrap();

        assert_eq!(output, ExecOutput { stage_progress: 24, done: true });
        assert_eq!(db.progress(StageId::Senders), 24);

        let expected_rows = blocks.iter().filter(|block| !block.transactions.is_empty()).count();
        assert_eq!(db.sender_rows().len(), expected_rows);

        for block in &blocks {
            let row = db.senders(block.number, block.hash);
            if block.transactions.is_empty() {
                assert_eq!(row, None, "unexpected row for empty block {}", block.number);
            } else {
                assert_eq!(row.as_deref(), Some(&block.senders[..]), "block {}", block.number);
            }
        }
    }

    #[test]
    fn non_canonical_siblings_are_skipped() {
        let mut rng = generators::rng();
        let db = TestStageDb::new();

        let blocks: Vec<_> =
            (1u64..=8).map(|number| generators::random_block(&mut rng, number, 1, 1)).collect();
        seed_range(&db, &blocks);

        // siblings sorting both before and after the canonical hash
        for number in [2u64, 5] {
            db.insert_body(number, B256::ZERO, StoredBlockBody { first_tx_num: 0, tx_count: 1 });
            db.insert_body(
                number,
                B256::repeat_byte(0xff),
                StoredBlockBody { first_tx_num: 0, tx_count: 1 },
            );
        }

        let mut stage = test_stage(london_chain());
        let output = stage.execute(&db.db).unwrap();
        assert_eq!(output, ExecOutput { stage_progress: 8, done: true });

        assert_eq!(db.sender_rows().len(), 8);
        for block in &blocks {
            assert_eq!(db.senders(block.number, block.hash).as_deref(), Some(&block.senders[..]));
        }
        // no rows under the sibling hashes
        assert_eq!(db.senders(2, B256::ZERO), None);
        assert_eq!(db.senders(5, B256::repeat_byte(0xff)), None);
    }

    #[test]
    fn rejects_typed_transaction_before_its_fork() {
        let mut rng = generators::rng();
        let db = TestStageDb::new();

        let blocks = vec![TestBlock::new(
            1,
            B256::repeat_byte(1),
            vec![generators::random_signed_tx(&mut rng, TxType::Eip2930, Some(1))],
        )];
        seed_range(&db, &blocks);

        let chain = Arc::new(ChainSpecBuilder::default().chain_id(1).istanbul_activated().build());
        let mut stage = test_stage(chain);
        assert_matches!(
            stage.execute(&db.db),
            Err(StageError::InvalidTransaction {
                block: 1,
                index: 0,
                source: InvalidTransactionError::TypeNotEnabled(TxType::Eip2930, _),
            })
        );

        // the failed run left no trace
        assert_eq!(db.progress(StageId::Senders), 0);
        assert_eq!(db.sender_rows().len(), 0);
    }

    #[test]
    fn rejects_malleable_signature_after_homestead() {
        let db = TestStageDb::new();

        let transaction = generators::signed_tx_with_signature(
            TxType::Legacy,
            None,
            U256::from(1),
            SECP256K1N - U256::from(1),
        );
        let blocks = vec![TestBlock::new(1, B256::repeat_byte(1), vec![transaction])];
        seed_range(&db, &blocks);

        let chain =
            Arc::new(ChainSpecBuilder::default().chain_id(1).homestead_activated().build());
        let mut stage = test_stage(chain);
        assert_matches!(
            stage.execute(&db.db),
            Err(StageError::InvalidTransaction {
                block: 1,
                index: 0,
                source: InvalidTransactionError::Signature,
            })
        );
        assert_eq!(db.progress(StageId::Senders), 0);
    }

    #[test]
    fn rejects_transaction_bound_to_another_chain() {
        let mut rng = generators::rng();
        let db = TestStageDb::new();

        let blocks = vec![TestBlock::new(
            1,
            B256::repeat_byte(1),
            vec![generators::random_signed_tx(&mut rng, TxType::Legacy, Some(3))],
        )];
        seed_range(&db, &blocks);

        let mut stage = test_stage(london_chain());
        assert_matches!(
            stage.execute(&db.db),
            Err(StageError::InvalidTransaction {
                source: InvalidTransactionError::ChainIdMismatch { got: 3, expected: 1 },
                ..
            })
        );
        assert_eq!(db.sender_rows().len(), 0);
    }

    #[test]
    fn stop_request_aborts_without_writing() {
        let db = TestStageDb::new();

        // a long range of empty blocks; the stop signal is polled at the
        // 1024-block boundaries
        let blocks: Vec<_> = (1u64..=3000)
            .map(|number| TestBlock::new(number, generators::block_hash(number), vec![]))
            .collect();
        seed_range(&db, &blocks);

        let stop = Arc::new(AtomicBool::new(true));
        let mut stage = test_stage(london_chain()).with_stop_flag(stop);
        assert_matches!(stage.execute(&db.db), Err(StageError::Aborted));

        assert_eq!(db.progress(StageId::Senders), 0);
        assert_eq!(db.sender_rows().len(), 0);
    }

    #[test]
    fn execute_twice_is_idempotent() {
        let mut rng = generators::rng();
        let db = TestStageDb::new();

        let blocks: Vec<_> =
            (1u64..=12).map(|number| generators::random_block(&mut rng, number, 2, 1)).collect();
        seed_range(&db, &blocks);

        let mut stage = test_stage(london_chain());
        stage.execute(&db.db).unwrap();
        let rows = db.sender_rows();

        // no new bodies: the second run returns immediately
        let output = stage.execute(&db.db).unwrap();
        assert_eq!(output, ExecOutput { stage_progress: 12, done: true });
        assert_eq!(db.sender_rows(), rows);
    }

    #[test]
    fn split_execution_matches_a_single_run() {
        let mut rng = generators::rng();
        let blocks: Vec<_> = (1u64..=24)
            .map(|number| generators::random_block(&mut rng, number, (number % 3) as usize, 1))
            .collect();

        let split_db = TestStageDb::new();
        split_db.insert_blocks(&blocks);
        let whole_db = TestStageDb::new();
        whole_db.insert_blocks(&blocks);

        // two consecutive invocations with an intermediate target
        let mut stage = test_stage(london_chain());
        split_db.set_progress(StageId::BlockHashes, 12);
        split_db.set_progress(StageId::Bodies, 12);
        assert_eq!(stage.execute(&split_db.db).unwrap().stage_progress, 12);
        split_db.set_progress(StageId::BlockHashes, 24);
        split_db.set_progress(StageId::Bodies, 24);
        assert_eq!(stage.execute(&split_db.db).unwrap().stage_progress, 24);

        // one invocation with the final target
        whole_db.set_progress(StageId::BlockHashes, 24);
        whole_db.set_progress(StageId::Bodies, 24);
        assert_eq!(stage.execute(&whole_db.db).unwrap().stage_progress, 24);

        assert_eq!(split_db.sender_rows(), whole_db.sender_rows());
    }

    #[test]
    fn missing_body_is_a_bad_chain_sequence() {
        let mut rng = generators::rng();
        let db = TestStageDb::new();

        let blocks: Vec<_> =
            (1u64..=10).map(|number| generators::random_block(&mut rng, number, 1, 1)).collect();
        seed_range(&db, &blocks);
        db.delete_body(5, blocks[4].hash);

        let mut stage = test_stage(london_chain());
        assert_matches!(
            stage.execute(&db.db),
            Err(StageError::BadChainSequence { expected: 5, got: 6 })
        );
        assert_eq!(db.progress(StageId::Senders), 0);
    }

    #[test]
    fn unwind_drops_rows_above_the_target() {
        let mut rng = generators::rng();
        let db = TestStageDb::new();

        let blocks: Vec<_> =
            (1u64..=20).map(|number| generators::random_block(&mut rng, number, 1, 1)).collect();
        seed_range(&db, &blocks);

        let mut stage = test_stage(london_chain());
        stage.execute(&db.db).unwrap();
        assert_eq!(db.sender_rows().len(), 20);

        let output = stage.unwind(&db.db, UnwindInput { unwind_to: 10 }).unwrap();
        assert_eq!(output, UnwindOutput { stage_progress: 10 });
        assert_eq!(db.progress(StageId::Senders), 10);

        let rows = db.sender_rows();
        assert_eq!(rows.len(), 10);
        assert!(rows.iter().all(|((number, _), _)| *number <= 10));

        // the stage picks up from the unwind point and refills the index
        stage.execute(&db.db).unwrap();
        assert_eq!(db.sender_rows().len(), 20);
        for block in &blocks {
            assert_eq!(db.senders(block.number, block.hash).as_deref(), Some(&block.senders[..]));
        }
    }
}
