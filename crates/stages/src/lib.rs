//! Staged sync stages.
//!
//! A [`Stage`] is a segmented part of the syncing process that reads its
//! input range from the stage progress table, processes it, and commits its
//! output together with an updated progress marker. This crate currently
//! implements the sender recovery stage, which derives the signer address of
//! every canonical transaction and maintains the sender index.

#![warn(missing_debug_implementations, missing_docs, unreachable_pub, rustdoc::all)]
#![deny(unused_must_use, rust_2018_idioms)]

pub mod db;
mod error;
mod stage;
pub mod stages;

#[cfg(test)]
mod test_utils;

pub use error::{InvalidTransactionError, StageError};
pub use stage::{ExecOutput, Stage, UnwindInput, UnwindOutput};
pub use stages::sender_recovery::SenderRecoveryStage;
