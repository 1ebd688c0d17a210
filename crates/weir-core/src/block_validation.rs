//! Block validation: stateless structure checks plus the contextual checks
//! that compare a block against its claimed chain position.
//!
//! [`check_block`] needs nothing but the block and the proof predicate, so
//! it runs before the block is linked into the index. The contextual
//! functions take a [`HeaderContext`] computed by the chainstate from the
//! parent node, keeping this crate free of any chain data structures.

use std::collections::HashSet;

use crate::constants::MAX_BLOCK_SIZE;
use crate::error::BlockError;
use crate::merkle::merkle_root_with_mutation;
use crate::params::ChainParams;
use crate::script::ProofCheck;
use crate::types::{Block, BlockHeader};
use crate::validation::check_transaction;

/// Chain position a header is validated against. Computed by the caller
/// from the parent block-index node.
#[derive(Debug, Clone, Copy)]
pub struct HeaderContext {
    /// Height the block would occupy (parent height + 1).
    pub height: u64,
    /// Median timestamp of the previous 11 blocks.
    pub median_time_past: u64,
    /// Current wall-clock time in unix seconds.
    pub now: u64,
}

/// Stateless block checks: structure, size, proof, merkle commitment, and
/// intra-block double spends.
///
/// A failure here is permanent for this block hash, with one exception:
/// [`BlockError::MutatedMerkle`] identifies a transaction-list mutation of
/// some possibly-valid block, so callers must not mark the hash failed on
/// that error.
pub fn check_block(block: &Block, proof: &dyn ProofCheck) -> Result<(), BlockError> {
    if block.transactions.is_empty() {
        return Err(BlockError::Empty);
    }

    let size = block
        .serialized_size()
        .map_err(|e| BlockError::Tx { index: 0, source: e })?;
    if size > MAX_BLOCK_SIZE {
        return Err(BlockError::Oversized {
            size,
            max: MAX_BLOCK_SIZE,
        });
    }

    proof.check_header(&block.header)?;

    if !block.transactions[0].is_coinbase() {
        return Err(BlockError::FirstTxNotCoinbase);
    }
    for (i, tx) in block.transactions.iter().enumerate().skip(1) {
        if tx.is_coinbase() {
            return Err(BlockError::MultipleCoinbase);
        }
        // A coinstake is only ever the second transaction.
        if tx.is_coinstake() && i != 1 {
            return Err(BlockError::MisplacedCoinstake);
        }
    }

    for (i, tx) in block.transactions.iter().enumerate() {
        check_transaction(tx).map_err(|source| BlockError::Tx { index: i, source })?;
    }

    let mut txids = Vec::with_capacity(block.transactions.len());
    for (i, tx) in block.transactions.iter().enumerate() {
        let txid = tx
            .txid()
            .map_err(|source| BlockError::Tx { index: i, source })?;
        txids.push(txid);
    }
    let (root, mutated) = merkle_root_with_mutation(&txids);
    if mutated {
        return Err(BlockError::MutatedMerkle);
    }
    if root != block.header.merkle_root {
        return Err(BlockError::BadMerkleRoot);
    }

    let mut spent = HashSet::new();
    for tx in block.transactions.iter().skip(1) {
        for input in &tx.inputs {
            if !spent.insert(input.previous_output.clone()) {
                return Err(BlockError::DoubleSpend(input.previous_output.to_string()));
            }
        }
    }

    Ok(())
}

/// Contextual header checks against the claimed chain position.
pub fn contextual_check_header(
    header: &BlockHeader,
    ctx: &HeaderContext,
    params: &ChainParams,
) -> Result<(), BlockError> {
    if header.timestamp <= ctx.median_time_past {
        return Err(BlockError::TimestampTooOld {
            got: header.timestamp,
            median: ctx.median_time_past,
        });
    }

    let limit = ctx.now.saturating_add(params.max_future_drift);
    if header.timestamp > limit {
        return Err(BlockError::TimestampTooFar {
            got: header.timestamp,
            limit,
        });
    }

    let min = params.min_version_at(ctx.height);
    if header.version < min {
        return Err(BlockError::VersionObsolete {
            got: header.version,
            min,
            height: ctx.height,
        });
    }

    if params.mask_active_at(ctx.height) && header.timestamp & params.stake_timestamp_mask != 0 {
        return Err(BlockError::TimestampMask(header.timestamp));
    }

    Ok(())
}

/// Contextual block-body checks: the coinbase must commit to the height it
/// is connected at, so an identical coinbase cannot be replayed on a fork.
pub fn contextual_check_block(block: &Block, height: u64) -> Result<(), BlockError> {
    let coinbase = block.transactions.first().ok_or(BlockError::Empty)?;
    let claimed = decode_coinbase_height(&coinbase.inputs[0].signature).ok_or(
        BlockError::BadCoinbaseHeight {
            claimed: 0,
            expected: height,
        },
    )?;
    if claimed != height {
        return Err(BlockError::BadCoinbaseHeight {
            claimed,
            expected: height,
        });
    }
    Ok(())
}

/// Encode a block height into the leading bytes of the coinbase data field.
pub fn encode_coinbase_height(height: u64) -> Vec<u8> {
    height.to_le_bytes().to_vec()
}

/// Decode the height committed in coinbase data, if present.
pub fn decode_coinbase_height(data: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = data.get(..8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}
