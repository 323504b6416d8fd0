use std::fmt;

/// The identifier of a sync pipeline stage, used to key the stage progress
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    /// The headers stage.
    Headers,
    /// The block hashes stage, maintaining the canonical hash index.
    BlockHashes,
    /// The block bodies stage.
    Bodies,
    /// The sender recovery stage.
    Senders,
    /// The execution stage.
    Execution,
}

impl StageId {
    /// All stage ids, in pipeline order.
    pub const ALL: [StageId; 5] = [
        StageId::Headers,
        StageId::BlockHashes,
        StageId::Bodies,
        StageId::Senders,
        StageId::Execution,
    ];

    /// Returns the stage name as it is keyed in the database.
    pub const fn as_str(&self) -> &'static str {
        match self {
            StageId::Headers => "Headers",
            StageId::BlockHashes => "BlockHashes",
            StageId::Bodies => "Bodies",
            StageId::Senders => "Senders",
            StageId::Execution => "Execution",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
