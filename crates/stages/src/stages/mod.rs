//! Implementations of the pipeline stages.

pub mod sender_recovery;

pub use sender_recovery::SenderRecoveryStage;
