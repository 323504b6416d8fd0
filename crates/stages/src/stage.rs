use crate::error::StageError;
use weft_db::Database;
use weft_primitives::{BlockNumber, StageId};

/// The output of a stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutput {
    /// The highest block the stage's output is complete for.
    pub stage_progress: BlockNumber,
    /// Whether the stage reached its target.
    pub done: bool,
}

/// The input of a stage unwind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnwindInput {
    /// The block to unwind to; the stage's output above it is discarded.
    pub unwind_to: BlockNumber,
}

/// The output of a stage unwind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnwindOutput {
    /// The progress of the stage after the unwind.
    pub stage_progress: BlockNumber,
}

/// A stage is a segmented part of the syncing process of the node.
///
/// Each stage takes care of a well-defined task, such as downloading headers
/// or recovering transaction senders, and persists its results to the
/// database atomically together with its progress marker.
///
/// Stages must have a unique [id][StageId] and implement a way to "roll
/// forwards" ([`Stage::execute`]) and a way to "roll back"
/// ([`Stage::unwind`]). They are executed serially as part of a pipeline.
pub trait Stage<DB: Database> {
    /// Get the ID of the stage.
    ///
    /// Stage IDs must be unique.
    fn id(&self) -> StageId;

    /// Execute the stage.
    ///
    /// The stage reads its boundaries from the stage progress table, writes
    /// all necessary data, and commits together with the updated progress
    /// marker. A failed execution leaves the store untouched.
    fn execute(&mut self, db: &DB) -> Result<ExecOutput, StageError>;

    /// Unwind the stage, discarding its output above `input.unwind_to`.
    fn unwind(&mut self, db: &DB, input: UnwindInput) -> Result<UnwindOutput, StageError>;
}
