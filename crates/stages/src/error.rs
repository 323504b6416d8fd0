use thiserror::Error;
use weft_db::DatabaseError;
use weft_etl::EtlError;
use weft_primitives::{BlockNumber, ChainId, Hardfork, TxType};

/// The reason a transaction was rejected before signer recovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTransactionError {
    /// The transaction's envelope type is not enabled at the block's
    /// revision.
    #[error("transaction type {0} is not enabled at {1}")]
    TypeNotEnabled(TxType, Hardfork),
    /// The signature's `r` or `s` values are out of range.
    #[error("signature values out of range")]
    Signature,
    /// The transaction carries a chain id before the EIP-155 fork.
    #[error("EIP-155 signature before the Spurious Dragon fork")]
    ChainIdBeforeSpuriousDragon,
    /// The transaction is bound to a different chain.
    #[error("chain id {got} does not match the configured chain id {expected}")]
    ChainIdMismatch {
        /// The chain id the transaction carries.
        got: ChainId,
        /// The chain id of the configured chain.
        expected: ChainId,
    },
}

/// A stage execution error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// The stage's own progress is ahead of the progress of the stages it
    /// consumes. The caller should consider unwinding.
    #[error("stage progress {previous} is ahead of the target progress {target}")]
    InvalidProgress {
        /// The stage's recorded progress.
        previous: BlockNumber,
        /// The progress the stage was asked to reach.
        target: BlockNumber,
    },
    /// The stored chain is not a dense, canonical sequence over the requested
    /// range.
    #[error("bad chain sequence: expected block {expected}, got {got}")]
    BadChainSequence {
        /// The height that should have been next.
        expected: BlockNumber,
        /// The height that was found instead.
        got: BlockNumber,
    },
    /// A transaction failed pre-recovery validation.
    #[error("invalid transaction #{index} in block #{block}: {source}")]
    InvalidTransaction {
        /// The block containing the transaction.
        block: BlockNumber,
        /// The in-block position of the transaction.
        index: usize,
        /// The validation failure.
        #[source]
        source: InvalidTransactionError,
    },
    /// The stage encountered a database error.
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// Execution was interrupted by a stop request.
    #[error("stage execution aborted")]
    Aborted,
    /// The stage encountered an unexpected fatal error.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<EtlError> for StageError {
    fn from(err: EtlError) -> Self {
        match err {
            EtlError::Database(err) => StageError::Database(err),
            EtlError::Io(err) => StageError::Unexpected(err.to_string()),
        }
    }
}
