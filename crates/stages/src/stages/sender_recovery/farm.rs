use super::{pool::WorkerPool, validate::validate_transaction, RecoveryPackage, StopToken};
use crate::{db, error::StageError, stage::ExecOutput};
use std::{mem, sync::Arc, time::Duration};
use tempfile::TempDir;
use tracing::{debug, error, info, trace};
use weft_db::{
    cursor::DbCursorRO,
    models::{BlockNumHash, SenderList},
    tables,
    transaction::{DbTx, DbTxMut},
};
use weft_etl::{Collector, LoadMode};
use weft_primitives::{
    Address, BlockHash, BlockNumber, ChainSpec, StageId, TransactionSigned,
};

/// A canonical `(height, hash)` pair collected in phase 1. The body walk
/// fills in the transaction count, which harvest-time grouping relies on.
#[derive(Debug, Clone)]
struct CanonicalHeader {
    number: BlockNumber,
    hash: BlockHash,
    tx_count: u64,
}

/// A snapshot of the farm's progress, suitable for periodic logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FarmProgress {
    /// The current phase: 1 loads canonical headers, 2 walks bodies, 3
    /// harvests and loads into the sender index.
    pub phase: u8,
    /// Canonical headers collected.
    pub headers: usize,
    /// Blocks processed so far.
    pub blocks: u64,
    /// Transactions collected so far.
    pub transactions: u64,
    /// Worker batches currently in flight.
    pub workers_in_flight: u32,
    /// The key the collector last loaded, once phase 3 is reached.
    pub load_key: Option<String>,
}

/// Drives sender recovery end to end: loads the canonical headers of the
/// range, walks block bodies into recovery batches, farms the batches out to
/// the worker pool, and collects the recovered senders into the sender index
/// in ascending block order.
pub(crate) struct RecoveryFarm<'a, TX: DbTxMut> {
    txn: &'a TX,
    chain_spec: Arc<ChainSpec>,
    stop: StopToken,
    pool: WorkerPool,
    collector: Collector<BlockNumHash, SenderList>,
    /// Canonical headers of the range being processed.
    headers: Vec<CanonicalHeader>,
    /// The height of the first entry of `headers`.
    header_index_offset: BlockNumber,
    /// The staging batch, dispatched whenever it outgrows `batch_size`.
    batch: Vec<RecoveryPackage>,
    batch_size: usize,
    phase: u8,
    total_processed_blocks: u64,
    total_collected_transactions: u64,
}

impl<'a, TX: DbTxMut> RecoveryFarm<'a, TX> {
    /// Create a farm over the given transaction.
    ///
    /// `batch_bytes` is the memory budget shared by all workers: each batch
    /// is sized so that `max_workers` in-flight batches stay within it.
    pub(crate) fn new(
        txn: &'a TX,
        chain_spec: Arc<ChainSpec>,
        stop: StopToken,
        max_workers: usize,
        batch_bytes: usize,
        etl_dir: Arc<TempDir>,
        etl_buffer_bytes: usize,
    ) -> Self {
        let max_workers = max_workers.max(1);
        let batch_size =
            (batch_bytes / max_workers / mem::size_of::<RecoveryPackage>()).max(1);
        Self {
            txn,
            chain_spec,
            pool: WorkerPool::new(max_workers, stop.clone()),
            stop,
            collector: Collector::new(etl_dir, etl_buffer_bytes),
            headers: Vec::new(),
            header_index_offset: 0,
            batch: Vec::new(),
            batch_size,
            phase: 0,
            total_processed_blocks: 0,
            total_collected_transactions: 0,
        }
    }

    /// Run the stage to completion, returning the progress reached.
    ///
    /// Workers are always stopped and joined before this returns, and nothing
    /// is committed: the caller owns the transaction.
    pub(crate) fn recover(&mut self) -> Result<ExecOutput, StageError> {
        let mut result = self.run();

        // A worker failure latches the stop signal and surfaces here as an
        // abort. Unless the stop came from the outside first, report it for
        // what it is.
        if self.pool.has_exception() &&
            !self.stop.external_requested() &&
            matches!(result, Err(StageError::Aborted))
        {
            result = Err(StageError::Unexpected("a recovery worker failed".to_string()));
        }

        if let Err(err) = &result {
            error!(target: "sync::stages::senders", %err, "sender recovery failed");
        }

        self.pool.stop_all(true);
        self.headers.clear();
        result
    }

    fn run(&mut self) -> Result<ExecOutput, StageError> {
        // Check stage boundaries from the previous execution and the
        // progress of the stages this one consumes
        let previous_progress = db::read_stage_progress(self.txn, StageId::Senders)?;
        let block_hashes_progress = db::read_stage_progress(self.txn, StageId::BlockHashes)?;
        let block_bodies_progress = db::read_stage_progress(self.txn, StageId::Bodies)?;
        let target_progress = block_hashes_progress.min(block_bodies_progress);

        if previous_progress == target_progress {
            // Nothing to process
            return Ok(ExecOutput { stage_progress: previous_progress, done: true })
        }
        if previous_progress > target_progress {
            // Something bad happened. Maybe we need to unwind?
            return Err(StageError::InvalidProgress {
                previous: previous_progress,
                target: target_progress,
            })
        }

        let from = previous_progress + 1;
        self.header_index_offset = from;

        self.phase = 1;
        self.fill_canonical_headers(from, target_progress)?;
        debug!(target: "sync::stages::senders", progress = ?self.progress(), "canonical headers collected");

        self.phase = 2;
        let reached_block_num = self.walk_bodies()?;
        debug!(target: "sync::stages::senders", progress = ?self.progress(), "block bodies walked");

        if self.stop.is_stopping() {
            return Err(StageError::Aborted)
        }
        // flush whatever is left in the staging batch
        self.dispatch_batch()?;
        self.wait_workers_completion();
        if self.stop.is_stopping() {
            return Err(StageError::Aborted)
        }

        self.phase = 3;
        self.collect_workers_results()?;
        if !self.collector.is_empty() {
            trace!(
                target: "sync::stages::senders",
                bytes = self.collector.bytes_size(),
                "loading collected senders"
            );
            let txn = self.txn;
            let mut senders_cursor = txn.cursor_write::<tables::Senders>()?;
            self.collector.load(&mut senders_cursor, LoadMode::Append)?;
        }

        // Update the stage progress with the last reached block number
        db::write_stage_progress(self.txn, StageId::Senders, reached_block_num)?;
        info!(
            target: "sync::stages::senders",
            stage_progress = reached_block_num,
            transactions = self.total_collected_transactions,
            "sender recovery finished"
        );
        Ok(ExecOutput { stage_progress: reached_block_num, done: true })
    }

    /// Phase 1: collect the canonical `(height, hash)` pairs of
    /// `[from, to]`, asserting a dense ascending sequence.
    fn fill_canonical_headers(
        &mut self,
        from: BlockNumber,
        to: BlockNumber,
    ) -> Result<(), StageError> {
        let headers_count = to - from + 1;
        if headers_count > 16 {
            info!(target: "sync::stages::senders", from, to, "collecting canonical headers");
        }
        self.headers.reserve(headers_count as usize);

        let txn = self.txn;
        let mut hashes_cursor = txn.cursor_read::<tables::CanonicalHeaders>()?;

        let mut expected_block_num = from;
        let mut reached_block_num = 0;
        let mut row = hashes_cursor.seek(from)?;
        while let Some((number, hash)) = row {
            if number != expected_block_num {
                return Err(StageError::BadChainSequence {
                    expected: expected_block_num,
                    got: number,
                })
            }
            reached_block_num = number;
            self.headers.push(CanonicalHeader { number, hash, tx_count: 0 });
            if number == to {
                break
            }
            expected_block_num += 1;

            // Poll the stop signal every 1024 rows
            if expected_block_num % 1024 == 0 && self.stop.is_stopping() {
                return Err(StageError::Aborted)
            }
            row = hashes_cursor.next()?;
        }

        // Not reaching `to` means the canonical index has a gap
        if reached_block_num != to {
            error!(
                target: "sync::stages::senders",
                expected = to,
                got = reached_block_num,
                "canonical chain ends too early"
            );
            return Err(StageError::BadChainSequence { expected: to, got: reached_block_num })
        }

        if self.stop.is_stopping() {
            Err(StageError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Phase 2: walk the stored bodies along the canonical chain,
    /// transforming the transactions of every non-empty block into recovery
    /// packages. Bodies of non-canonical siblings are skipped.
    ///
    /// Returns the last canonical height processed.
    fn walk_bodies(&mut self) -> Result<BlockNumber, StageError> {
        let txn = self.txn;
        let mut bodies_cursor = txn.cursor_read::<tables::BlockBodies>()?;
        let mut tx_cursor = txn.cursor_read::<tables::BlockTransactions>()?;

        let (start_num, start_hash) = {
            let first = &self.headers[0];
            (first.number, first.hash)
        };
        trace!(target: "sync::stages::senders", height = start_num, "reading block bodies");

        let mut expected_block_num = start_num;
        let mut header_index = 0usize;
        let mut reached_block_num = 0;

        let mut row = bodies_cursor.seek(BlockNumHash((start_num, start_hash)))?;
        while let Some((key, body)) = row {
            let block_num = key.number();
            if block_num < expected_block_num {
                // a sibling of an already processed height, not canonical
                row = bodies_cursor.next()?;
                continue
            }
            if block_num > expected_block_num {
                // the db misses a block or the bodies are not persisted in
                // sequence
                return Err(StageError::BadChainSequence {
                    expected: expected_block_num,
                    got: block_num,
                })
            }
            if key.hash() != self.headers[header_index].hash {
                // a non-canonical sibling at the expected height
                row = bodies_cursor.next()?;
                continue
            }

            // Poll the stop signal every 1024 blocks
            if block_num % 1024 == 0 && self.stop.is_stopping() {
                return Err(StageError::Aborted)
            }

            reached_block_num = block_num;
            if !body.is_empty() {
                self.headers[header_index].tx_count = body.tx_count;
                let transactions =
                    db::read_transactions(&mut tx_cursor, body.first_tx_num, body.tx_count)?;
                self.transform_and_fill_batch(block_num, &transactions)?;
            }

            header_index += 1;
            if header_index == self.headers.len() {
                // the whole canonical range is covered
                break
            }
            expected_block_num += 1;
            row = bodies_cursor.next()?;
        }

        if header_index != self.headers.len() {
            // the bodies table ended before the canonical range did
            error!(
                target: "sync::stages::senders",
                expected = expected_block_num,
                got = reached_block_num,
                "block bodies end too early"
            );
            return Err(StageError::BadChainSequence {
                expected: expected_block_num,
                got: reached_block_num,
            })
        }
        Ok(reached_block_num)
    }

    /// Validate the block's transactions and append their recovery packages
    /// to the staging batch, dispatching it on overflow.
    fn transform_and_fill_batch(
        &mut self,
        block_num: BlockNumber,
        transactions: &[TransactionSigned],
    ) -> Result<(), StageError> {
        if self.stop.is_stopping() {
            return Err(StageError::Aborted)
        }

        let revision = self.chain_spec.revision(block_num);
        for (index, transaction) in transactions.iter().enumerate() {
            validate_transaction(transaction, revision, self.chain_spec.chain_id()).map_err(
                |source| {
                    error!(
                        target: "sync::stages::senders",
                        block = block_num,
                        index,
                        %source,
                        "invalid transaction"
                    );
                    StageError::InvalidTransaction { block: block_num, index, source }
                },
            )?;

            let signature = transaction.signature();
            self.batch.push(RecoveryPackage {
                block_num,
                tx_hash: transaction.signature_hash(),
                odd_y_parity: signature.odd_y_parity,
                signature: signature.to_rs_bytes(),
                tx_from: Address::ZERO,
            });
        }

        self.total_processed_blocks += 1;
        self.total_collected_transactions += transactions.len() as u64;

        // Did we overflow?
        if self.batch.len() > self.batch_size {
            self.dispatch_batch()?;
        }

        if self.stop.is_stopping() {
            Err(StageError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Hand the staging batch to a free worker, provisioning or waiting for
    /// one as needed. Completed batches are drained into the collector on
    /// every attempt, so workers free up even while the walk is ahead of
    /// them.
    fn dispatch_batch(&mut self) -> Result<(), StageError> {
        let mut wait_count = 5u32;
        loop {
            if self.stop.is_stopping() {
                return Err(StageError::Aborted)
            }
            self.collect_workers_results()?;
            if self.batch.is_empty() {
                return Ok(())
            }

            if let Some(id) = self.pool.find_free() {
                trace!(
                    target: "sync::stages::senders",
                    worker = id,
                    items = self.batch.len(),
                    "dispatching batch"
                );
                if self.pool.dispatch_to(id, &mut self.batch) {
                    self.batch.reserve(self.batch_size);
                    return Ok(())
                }
                continue
            }

            // No worker is free; maybe we can create a new one
            if self.pool.try_spawn()?.is_some() {
                continue
            }

            // No other option than to wait a while and retry
            wait_count -= 1;
            if wait_count == 0 {
                wait_count = 5;
                info!(target: "sync::stages::senders", "waiting for an available worker");
            }
            self.pool.wait_completion(Duration::from_secs(5));
        }
    }

    /// Wait for every in-flight batch to settle, successfully or not.
    fn wait_workers_completion(&self) {
        while self.pool.in_flight() > 0 {
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Drain every harvestable worker in completion order, grouping
    /// contiguous packages of equal height into one sender row per block.
    fn collect_workers_results(&mut self) -> Result<(), StageError> {
        while let Some(id) = self.pool.pop_harvestable() {
            trace!(target: "sync::stages::senders", worker = id, "collecting results");
            let Some(worker_batch) = self.pool.harvest(id) else { continue };

            let mut current: Option<(BlockNumber, Vec<Address>)> = None;
            for package in worker_batch {
                match &mut current {
                    Some((block_num, senders)) if *block_num == package.block_num => {
                        senders.push(package.tx_from);
                    }
                    _ => {
                        if let Some(group) = current.take() {
                            self.collect_block(group)?;
                        }
                        current = Some((package.block_num, vec![package.tx_from]));
                    }
                }
            }
            if let Some(group) = current.take() {
                self.collect_block(group)?;
            }
        }
        Ok(())
    }

    /// Hand one block's senders to the collector under its canonical key.
    fn collect_block(
        &mut self,
        (block_num, senders): (BlockNumber, Vec<Address>),
    ) -> Result<(), StageError> {
        let index = (block_num - self.header_index_offset) as usize;
        let header = self.headers.get(index).ok_or_else(|| {
            StageError::Unexpected(format!(
                "recovered block {block_num} is outside of the canonical range"
            ))
        })?;
        debug_assert_eq!(header.tx_count, senders.len() as u64);
        self.collector.collect(BlockNumHash((block_num, header.hash)), SenderList(senders))?;
        Ok(())
    }

    /// A snapshot of the farm's progress.
    pub(crate) fn progress(&self) -> FarmProgress {
        FarmProgress {
            phase: self.phase,
            headers: self.headers.len(),
            blocks: self.total_processed_blocks,
            transactions: self.total_collected_transactions,
            workers_in_flight: self.pool.in_flight(),
            load_key: self.collector.load_key().map(str::to_string),
        }
    }
}
