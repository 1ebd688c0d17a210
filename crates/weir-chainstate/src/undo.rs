//! Undo records for reverting connected blocks.
//!
//! Every block connect produces a [`BlockUndo`] capturing the coins its
//! transactions consumed, in consumption order. Disconnecting replays the
//! record in reverse. Undo records are written to the durable log before
//! the coin delta is flushed, so a crash between the two leaves a record
//! that is simply overwritten on reconnect.

use serde::{Deserialize, Serialize};

use weir_core::types::{Coin, OutPoint};

/// A coin consumed by one input, with enough metadata to recreate it.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct SpentCoin {
    pub outpoint: OutPoint,
    pub coin: Coin,
    /// Whether `coin` carries its creation metadata (height, coinbase and
    /// coinstake markers). Records written by block connect always do;
    /// when this is false the restorer falls back to a still-unspent
    /// sibling output of the same transaction.
    pub has_metadata: bool,
}

/// Coins spent by a single transaction, in input order.
#[derive(
    Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxUndo {
    pub spent: Vec<SpentCoin>,
}

/// Undo data for one connected block.
///
/// `txs` holds one entry per transaction in block order, including the
/// coinbase (whose entry is always empty).
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockUndo {
    /// Height the block was connected at.
    pub height: u64,
    pub txs: Vec<TxUndo>,
}

impl BlockUndo {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            txs: Vec::new(),
        }
    }

    /// Total number of coins this record would restore.
    pub fn spent_count(&self) -> usize {
        self.txs.iter().map(|t| t.spent.len()).sum()
    }
}
