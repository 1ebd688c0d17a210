//! Error types and the rejection taxonomy.
//!
//! Every rejection carries a stable machine-readable reason code plus
//! free-text detail via `Display`, and classifies itself into a
//! [`RejectKind`]. Storage errors are deliberately outside the taxonomy:
//! they are fatal and must halt block/transaction processing rather than be
//! reported as a rejection.

use thiserror::Error;

/// How a rejection should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    /// Structurally invalid input. Always rejected; the sender may be
    /// penalized.
    Malformed,
    /// Valid in isolation but inconsistent with the claimed chain position.
    /// The condition can never become true; the node is marked failed.
    ContextualInvalid,
    /// Missing a prerequisite (unknown parent, missing ancestor data).
    /// Held, never marked failed; retried when the prerequisite arrives.
    NotYetValid,
    /// Resource limits (mempool full, fee too low, ancestor caps). Rejected
    /// without penalty.
    ResourceExhausted,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("empty inputs or outputs")] EmptyInputsOrOutputs,
    #[error("zero-value output at index {0}")] ZeroValueOutput(usize),
    #[error("value out of range")] ValueOutOfRange,
    #[error("oversized: {size} > {max}")] Oversized { size: usize, max: usize },
    #[error("duplicate input: {0}")] DuplicateInput(String),
    #[error("null outpoint in non-coinbase input {0}")] NullOutpoint(usize),
    #[error("invalid coinbase: {0}")] BadCoinbase(String),
    #[error("invalid coinstake: {0}")] BadCoinstake(String),
    #[error("signature check failed on input {index}")] BadSignature { index: usize },
    #[error("missing input: {0}")] MissingInput(String),
    #[error("premature spend of {outpoint}: created at height {created}, spent at {spent}")]
    PrematureSpend { outpoint: String, created: u64, spent: u64 },
    #[error("inputs below outputs: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("non-final at height {height}")] NonFinal { height: u64 },
    #[error("serialization: {0}")] Serialization(String),
}

impl TxError {
    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyInputsOrOutputs => "tx-empty",
            Self::ZeroValueOutput(_) => "tx-zero-output",
            Self::ValueOutOfRange => "tx-value-range",
            Self::Oversized { .. } => "tx-oversized",
            Self::DuplicateInput(_) => "tx-duplicate-input",
            Self::NullOutpoint(_) => "tx-null-outpoint",
            Self::BadCoinbase(_) => "tx-bad-coinbase",
            Self::BadCoinstake(_) => "tx-bad-coinstake",
            Self::BadSignature { .. } => "tx-bad-signature",
            Self::MissingInput(_) => "tx-missing-input",
            Self::PrematureSpend { .. } => "tx-premature-spend",
            Self::InsufficientFunds { .. } => "tx-insufficient-funds",
            Self::NonFinal { .. } => "tx-non-final",
            Self::Serialization(_) => "tx-malformed",
        }
    }

    pub fn kind(&self) -> RejectKind {
        match self {
            Self::MissingInput(_) => RejectKind::NotYetValid,
            Self::PrematureSpend { .. }
            | Self::InsufficientFunds { .. }
            | Self::BadSignature { .. }
            | Self::NonFinal { .. } => RejectKind::ContextualInvalid,
            _ => RejectKind::Malformed,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("empty transaction list")] Empty,
    #[error("oversized: {size} > {max}")] Oversized { size: usize, max: usize },
    #[error("first transaction is not coinbase")] FirstTxNotCoinbase,
    #[error("multiple coinbase transactions")] MultipleCoinbase,
    #[error("coinstake outside second position")] MisplacedCoinstake,
    #[error("merkle root mismatch")] BadMerkleRoot,
    #[error("mutated merkle tree (duplicate transactions)")] MutatedMerkle,
    #[error("double spend across transactions: {0}")] DoubleSpend(String),
    #[error("proof predicate failed")] BadProof,
    #[error("unknown parent: {0}")] UnknownParent(String),
    #[error("block data not available: {0}")] MissingData(String),
    #[error("timestamp {got} not after median past {median}")]
    TimestampTooOld { got: u64, median: u64 },
    #[error("timestamp {got} too far in the future (limit {limit})")]
    TimestampTooFar { got: u64, limit: u64 },
    #[error("timestamp {0} violates the stake timestamp mask")] TimestampMask(u64),
    #[error("version {got} below minimum {min} at height {height}")]
    VersionObsolete { got: u64, min: u64, height: u64 },
    #[error("coinbase encodes height {claimed}, expected {expected}")]
    BadCoinbaseHeight { claimed: u64, expected: u64 },
    #[error("fork at height {fork} below last checkpoint {checkpoint}")]
    ForkBelowCheckpoint { fork: u64, checkpoint: u64 },
    #[error("fork depth {depth} exceeds maximum {max}")]
    ForkTooDeep { depth: u64, max: u64 },
    #[error("fork double spend: {0}")] ForkDoubleSpend(String),
    #[error("minted {minted} exceeds allowed {allowed}")]
    BadRewards { minted: u64, allowed: u64 },
    #[error("state commitment mismatch")] CommitmentMismatch,
    #[error("descendant of a failed block")] FailedAncestor,
    #[error("tx {index}: {source}")] Tx { index: usize, source: TxError },
}

impl BlockError {
    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Empty => "blk-empty",
            Self::Oversized { .. } => "blk-oversized",
            Self::FirstTxNotCoinbase => "blk-cb-missing",
            Self::MultipleCoinbase => "blk-cb-multiple",
            Self::MisplacedCoinstake => "blk-cs-misplaced",
            Self::BadMerkleRoot => "blk-bad-merkle",
            Self::MutatedMerkle => "blk-mutated-merkle",
            Self::DoubleSpend(_) => "blk-double-spend",
            Self::BadProof => "blk-bad-proof",
            Self::UnknownParent(_) => "blk-orphan",
            Self::MissingData(_) => "blk-no-data",
            Self::TimestampTooOld { .. } => "blk-time-old",
            Self::TimestampTooFar { .. } => "blk-time-future",
            Self::TimestampMask(_) => "blk-time-mask",
            Self::VersionObsolete { .. } => "blk-version",
            Self::BadCoinbaseHeight { .. } => "blk-cb-height",
            Self::ForkBelowCheckpoint { .. } => "blk-fork-checkpoint",
            Self::ForkTooDeep { .. } => "blk-fork-depth",
            Self::ForkDoubleSpend(_) => "blk-fork-double-spend",
            Self::BadRewards { .. } => "blk-bad-rewards",
            Self::CommitmentMismatch => "blk-bad-commitment",
            Self::FailedAncestor => "blk-failed-ancestor",
            Self::Tx { source, .. } => source.code(),
        }
    }

    pub fn kind(&self) -> RejectKind {
        match self {
            Self::UnknownParent(_) | Self::MissingData(_) => RejectKind::NotYetValid,
            // A timestamp beyond the future drift can become valid as the
            // clock advances.
            Self::TimestampTooFar { .. } => RejectKind::NotYetValid,
            Self::Empty
            | Self::Oversized { .. }
            | Self::FirstTxNotCoinbase
            | Self::MultipleCoinbase
            | Self::MisplacedCoinstake
            | Self::BadMerkleRoot
            | Self::MutatedMerkle
            | Self::DoubleSpend(_)
            | Self::BadProof => RejectKind::Malformed,
            Self::Tx { source, .. } => source.kind(),
            _ => RejectKind::ContextualInvalid,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction already in pool: {0}")] AlreadyKnown(String),
    #[error("coinbase/coinstake not relayable")] NotRelayable,
    #[error("conflicts with pool tx {existing} on outpoint {outpoint}")]
    Conflict { existing: String, outpoint: String },
    #[error("inputs unavailable: {0}")] MissingInputs(String),
    #[error("fee rate {rate} below minimum {min}")] FeeTooLow { rate: u64, min: u64 },
    #[error("too many ancestors: {count} > {max}")] TooManyAncestors { count: usize, max: usize },
    #[error("ancestor size {bytes} exceeds {max}")] AncestorSizeExceeded { bytes: usize, max: usize },
    #[error("too many descendants of {ancestor}: {count} > {max}")]
    TooManyDescendants { ancestor: String, count: usize, max: usize },
    #[error("descendant size of {ancestor} exceeds {max}")]
    DescendantSizeExceeded { ancestor: String, max: usize },
    #[error("pool full")] PoolFull,
    #[error("non-standard: {0}")] NonStandard(String),
    #[error("mandatory flag set failed after standard pass on input {index}")]
    FlagInconsistency { index: usize },
    #[error(transparent)] Tx(#[from] TxError),
}

impl MempoolError {
    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyKnown(_) => "mp-duplicate",
            Self::NotRelayable => "mp-not-relayable",
            Self::Conflict { .. } => "mp-conflict",
            Self::MissingInputs(_) => "mp-missing-inputs",
            Self::FeeTooLow { .. } => "mp-fee-too-low",
            Self::TooManyAncestors { .. } => "mp-ancestor-count",
            Self::AncestorSizeExceeded { .. } => "mp-ancestor-size",
            Self::TooManyDescendants { .. } => "mp-descendant-count",
            Self::DescendantSizeExceeded { .. } => "mp-descendant-size",
            Self::PoolFull => "mp-full",
            Self::NonStandard(_) => "mp-non-standard",
            Self::FlagInconsistency { .. } => "mp-flag-inconsistency",
            Self::Tx(e) => e.code(),
        }
    }

    pub fn kind(&self) -> RejectKind {
        match self {
            Self::MissingInputs(_) => RejectKind::NotYetValid,
            Self::FeeTooLow { .. }
            | Self::TooManyAncestors { .. }
            | Self::AncestorSizeExceeded { .. }
            | Self::TooManyDescendants { .. }
            | Self::DescendantSizeExceeded { .. }
            | Self::PoolFull => RejectKind::ResourceExhausted,
            Self::AlreadyKnown(_) | Self::Conflict { .. } | Self::NonStandard(_) => {
                RejectKind::ContextualInvalid
            }
            Self::NotRelayable | Self::FlagInconsistency { .. } => RejectKind::Malformed,
            Self::Tx(e) => e.kind(),
        }
    }
}

/// Faults against the durable store. Never recovered: the engine halts and
/// requests process shutdown rather than risk diverging from consensus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("i/o: {0}")] Io(String),
    #[error("corrupt state: {0}")] Corrupt(String),
    #[error("undo record missing for block {0}")] MissingUndo(String),
}

#[derive(Error, Debug)]
pub enum WeirError {
    #[error(transparent)] Tx(#[from] TxError),
    #[error(transparent)] Block(#[from] BlockError),
    #[error(transparent)] Mempool(#[from] MempoolError),
    #[error(transparent)] Storage(#[from] StorageError),
}

impl WeirError {
    /// Whether this error is a fatal storage fault rather than a rejection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// The rejection class, if this error is a rejection at all.
    pub fn kind(&self) -> Option<RejectKind> {
        match self {
            Self::Tx(e) => Some(e.kind()),
            Self::Block(e) => Some(e.kind()),
            Self::Mempool(e) => Some(e.kind()),
            Self::Storage(_) => None,
        }
    }

    /// The stable reason code, if this error is a rejection.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Tx(e) => Some(e.code()),
            Self::Block(e) => Some(e.code()),
            Self::Mempool(e) => Some(e.code()),
            Self::Storage(_) => None,
        }
    }
}
