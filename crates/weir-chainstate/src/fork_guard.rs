//! Fork safety checks for blocks that extend a non-active branch.
//!
//! A block arriving on a fork cannot be applied to the current coin view,
//! so its spends are vetted structurally before it becomes a reorg
//! candidate. Every input must resolve to one of: a coin unspent in the
//! active view and untouched by the fork, a coin created on the fork and
//! not yet spent there, or a coin the active chain spent after the fork
//! point (which a reorg would restore). Anything else is a double spend
//! crafted against the fork, including stakes reused across branches.
//!
//! Depth and checkpoint limits live here too: a fork that branches below
//! the last checkpoint or deeper than the rollback window can never be
//! reorganized to.

use std::collections::HashSet;

use weir_core::error::{BlockError, WeirError};
use weir_core::params::ChainParams;
use weir_core::types::{Block, OutPoint};

use crate::block_index::{ActiveChain, BlockIndex, NodeId};
use crate::coins::{CoinsBackend, CoinsCache};
use crate::store::{BlockStore, UndoLog};

/// Validate a fork block's position and spends.
///
/// `parent` is the block's parent node (already in the index); the block
/// itself is not yet inserted. No-op when the chain is empty or the parent
/// is the active tip.
#[allow(clippy::too_many_arguments)]
pub fn check_fork_block<B: CoinsBackend>(
    block: &Block,
    parent: NodeId,
    index: &BlockIndex,
    active: &ActiveChain,
    coins: &mut CoinsCache<B>,
    blocks: &dyn BlockStore,
    undo_log: &dyn UndoLog,
    params: &ChainParams,
) -> Result<(), WeirError> {
    let Some(tip) = active.tip() else {
        return Ok(());
    };
    if parent == tip {
        return Ok(());
    }

    let fork_point = index.last_common_ancestor(parent, tip);
    let fork_height = index.node(fork_point).height;
    let tip_height = index.node(tip).height;

    if let Some((checkpoint_height, _)) = params.last_checkpoint_at_or_below(tip_height) {
        if fork_height < checkpoint_height {
            return Err(BlockError::ForkBelowCheckpoint {
                fork: fork_height,
                checkpoint: checkpoint_height,
            }
            .into());
        }
    }

    let depth = tip_height.saturating_sub(fork_height);
    if depth > params.max_reorg_depth {
        return Err(BlockError::ForkTooDeep {
            depth,
            max: params.max_reorg_depth,
        }
        .into());
    }

    // Seed with the candidate's spends, split by whether the active view
    // can satisfy them right now.
    let mut unresolved: HashSet<OutPoint> = HashSet::new();
    let mut in_view: Vec<OutPoint> = Vec::new();
    for tx in block.transactions.iter().skip(1) {
        for input in &tx.inputs {
            if coins.have_coin(&input.previous_output)? {
                in_view.push(input.previous_output.clone());
            } else {
                unresolved.insert(input.previous_output.clone());
            }
        }
    }

    // Walk the fork branch from the parent down to the fork point,
    // collecting what it created and what it spent.
    let mut fork_created: HashSet<OutPoint> = HashSet::new();
    let mut fork_spent: HashSet<OutPoint> = HashSet::new();
    let mut cursor = parent;
    while cursor != fork_point {
        let node = index.node(cursor);
        let fork_block = blocks
            .block(&node.hash)?
            .ok_or_else(|| BlockError::MissingData(node.hash.to_string()))?;
        for tx in &fork_block.transactions {
            let txid = tx
                .txid()
                .map_err(|e| BlockError::Tx { index: 0, source: e })?;
            let is_coinstake = tx.is_coinstake();
            for (vout, _) in tx.outputs.iter().enumerate() {
                if is_coinstake && vout == 0 {
                    continue;
                }
                fork_created.insert(OutPoint {
                    txid,
                    index: vout as u64,
                });
            }
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    fork_spent.insert(input.previous_output.clone());
                }
            }
        }
        let Some(next) = node.parent else { break };
        cursor = next;
    }

    // A coin visible in the active view is still a double spend if an
    // ancestor on this same fork already consumed it.
    for outpoint in &in_view {
        if fork_spent.contains(outpoint) {
            return Err(BlockError::ForkDoubleSpend(outpoint.to_string()).into());
        }
    }

    // Coins created on the fork and still unspent there discharge.
    unresolved.retain(|op| !(fork_created.contains(op) && !fork_spent.contains(op)));

    if unresolved.is_empty() {
        return Ok(());
    }

    // The rest must have been spent by the active chain after the fork
    // point; undo records of those blocks list exactly such coins.
    let mut height = tip_height;
    while height > fork_height && !unresolved.is_empty() {
        let Some(active_id) = active.at_height(height) else {
            break;
        };
        let hash = index.node(active_id).hash;
        if let Some(undo) = undo_log.read(&hash)? {
            for tx_undo in &undo.txs {
                for spent in &tx_undo.spent {
                    unresolved.remove(&spent.outpoint);
                }
            }
        }
        height -= 1;
    }

    if let Some(op) = unresolved.iter().next() {
        return Err(BlockError::ForkDoubleSpend(op.to_string()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use weir_core::types::{BlockHeader, Coin, Hash256, Transaction, TxInput, TxOutput};

    use crate::coins::StoreBackend;
    use crate::store::{
        CoinStore, CoinsDelta, MemoryBlockStore, MemoryCoinStore, MemoryUndoLog,
    };
    use crate::undo::{BlockUndo, SpentCoin, TxUndo};

    fn header(prev: Hash256, nonce: u64) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: prev,
            merkle_root: Hash256::ZERO,
            timestamp: 1_000 + nonce,
            difficulty_target: u64::MAX,
            nonce,
            state_commitment: Hash256::ZERO,
        }
    }

    fn coinbase() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint::null(),
                signature: vec![],
                public_key: vec![],
            }],
            outputs: vec![TxOutput {
                value: 50,
                pubkey_hash: Hash256([1; 32]),
            }],
            lock_time: 0,
        }
    }

    fn spend_of(outpoint: OutPoint) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: outpoint,
                signature: vec![0; 64],
                public_key: vec![0; 32],
            }],
            outputs: vec![TxOutput {
                value: 10,
                pubkey_hash: Hash256([2; 32]),
            }],
            lock_time: 0,
        }
    }

    fn op(byte: u8) -> OutPoint {
        OutPoint {
            txid: Hash256([byte; 32]),
            index: 0,
        }
    }

    fn coin(value: u64) -> Coin {
        Coin {
            output: TxOutput {
                value,
                pubkey_hash: Hash256([3; 32]),
            },
            height: 1,
            is_coinbase: false,
            is_coinstake: false,
        }
    }

    struct Fixture {
        index: BlockIndex,
        active: ActiveChain,
        coins: CoinsCache<StoreBackend>,
        blocks: MemoryBlockStore,
        undo_log: MemoryUndoLog,
        tip_hash: Hash256,
    }

    /// Genesis plus `n` active blocks, no fork yet.
    fn fixture(n: u64) -> Fixture {
        let mut index = BlockIndex::new();
        let mut active = ActiveChain::new();
        let blocks = MemoryBlockStore::new();
        let genesis = header(Hash256::ZERO, 0);
        let mut prev = genesis.hash();
        active.push(index.insert_genesis(genesis.clone(), 1));
        blocks
            .put_block(&Block {
                header: genesis,
                transactions: vec![coinbase()],
            })
            .unwrap();
        for i in 1..=n {
            let h = header(prev, i);
            prev = h.hash();
            blocks
                .put_block(&Block {
                    header: h.clone(),
                    transactions: vec![coinbase()],
                })
                .unwrap();
            active.push(index.insert(h, 1, true).unwrap());
        }
        Fixture {
            index,
            active,
            coins: CoinsCache::new(StoreBackend::new(Arc::new(MemoryCoinStore::new()))),
            blocks,
            undo_log: MemoryUndoLog::new(),
            tip_hash: prev,
        }
    }

    fn params() -> ChainParams {
        ChainParams::regtest()
    }

    #[test]
    fn extending_tip_is_exempt() {
        let mut fx = fixture(3);
        let tip = fx.active.tip().unwrap();
        let block = Block {
            header: header(fx.tip_hash, 99),
            transactions: vec![coinbase(), spend_of(op(0xAB))],
        };
        check_fork_block(
            &block,
            tip,
            &fx.index,
            &fx.active,
            &mut fx.coins,
            &fx.blocks,
            &fx.undo_log,
            &params(),
        )
        .unwrap();
    }

    #[test]
    fn fork_spend_of_available_coin_passes() {
        let mut fx = fixture(3);
        // Coin unspent in the active view.
        let available = op(0x10);
        let store = MemoryCoinStore::new();
        store
            .apply_delta(CoinsDelta {
                best_block: fx.tip_hash,
                writes: vec![(available.clone(), Some(coin(100)))],
            })
            .unwrap();
        fx.coins = CoinsCache::new(StoreBackend::new(Arc::new(store)));

        // Fork parent at height 2.
        let fork_parent_hash = fx.index.node(fx.active.at_height(2).unwrap()).hash;
        let f1 = header(fork_parent_hash, 50);
        fx.blocks
            .put_block(&Block {
                header: f1.clone(),
                transactions: vec![coinbase()],
            })
            .unwrap();
        let f1_id = fx.index.insert(f1.clone(), 1, true).unwrap();

        let block = Block {
            header: header(f1.hash(), 51),
            transactions: vec![coinbase(), spend_of(available)],
        };
        check_fork_block(
            &block,
            f1_id,
            &fx.index,
            &fx.active,
            &mut fx.coins,
            &fx.blocks,
            &fx.undo_log,
            &params(),
        )
        .unwrap();
    }

    #[test]
    fn spend_of_fork_created_coin_passes() {
        let mut fx = fixture(3);
        let fork_parent_hash = fx.index.node(fx.active.at_height(2).unwrap()).hash;
        let f1_block = Block {
            header: header(fork_parent_hash, 50),
            transactions: vec![coinbase()],
        };
        fx.blocks.put_block(&f1_block).unwrap();
        let f1_id = fx.index.insert(f1_block.header.clone(), 1, true).unwrap();

        // Spend the fork block's coinbase output.
        let created = OutPoint {
            txid: f1_block.transactions[0].txid().unwrap(),
            index: 0,
        };
        let block = Block {
            header: header(f1_block.header.hash(), 51),
            transactions: vec![coinbase(), spend_of(created)],
        };
        check_fork_block(
            &block,
            f1_id,
            &fx.index,
            &fx.active,
            &mut fx.coins,
            &fx.blocks,
            &fx.undo_log,
            &params(),
        )
        .unwrap();
    }

    #[test]
    fn double_spend_within_fork_rejected() {
        let mut fx = fixture(3);
        let target = op(0x20);
        let store = MemoryCoinStore::new();
        store
            .apply_delta(CoinsDelta {
                best_block: fx.tip_hash,
                writes: vec![(target.clone(), Some(coin(100)))],
            })
            .unwrap();
        fx.coins = CoinsCache::new(StoreBackend::new(Arc::new(store)));

        // Fork block f1 spends the coin already.
        let fork_parent_hash = fx.index.node(fx.active.at_height(2).unwrap()).hash;
        let f1_block = Block {
            header: header(fork_parent_hash, 50),
            transactions: vec![coinbase(), spend_of(target.clone())],
        };
        fx.blocks.put_block(&f1_block).unwrap();
        let f1_id = fx.index.insert(f1_block.header.clone(), 1, true).unwrap();

        // The candidate spends the same coin again.
        let block = Block {
            header: header(f1_block.header.hash(), 51),
            transactions: vec![coinbase(), spend_of(target)],
        };
        let err = check_fork_block(
            &block,
            f1_id,
            &fx.index,
            &fx.active,
            &mut fx.coins,
            &fx.blocks,
            &fx.undo_log,
            &params(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            WeirError::Block(BlockError::ForkDoubleSpend(_))
        ));
    }

    #[test]
    fn spend_restored_by_reorg_passes() {
        let mut fx = fixture(3);
        // The active block at height 3 spent this coin; a reorg to the
        // fork would restore it. Record that in the undo log.
        let restored = op(0x30);
        let tip_id = fx.active.tip().unwrap();
        let tip_hash = fx.index.node(tip_id).hash;
        fx.undo_log
            .append(
                &tip_hash,
                &BlockUndo {
                    height: 3,
                    txs: vec![
                        TxUndo::default(),
                        TxUndo {
                            spent: vec![SpentCoin {
                                outpoint: restored.clone(),
                                coin: coin(100),
                                has_metadata: true,
                            }],
                        },
                    ],
                },
            )
            .unwrap();

        let fork_parent_hash = fx.index.node(fx.active.at_height(2).unwrap()).hash;
        let f1 = header(fork_parent_hash, 50);
        fx.blocks
            .put_block(&Block {
                header: f1.clone(),
                transactions: vec![coinbase()],
            })
            .unwrap();
        let f1_id = fx.index.insert(f1.clone(), 1, true).unwrap();

        let block = Block {
            header: header(f1.hash(), 51),
            transactions: vec![coinbase(), spend_of(restored)],
        };
        check_fork_block(
            &block,
            f1_id,
            &fx.index,
            &fx.active,
            &mut fx.coins,
            &fx.blocks,
            &fx.undo_log,
            &params(),
        )
        .unwrap();
    }

    #[test]
    fn spend_of_nonexistent_coin_rejected() {
        let mut fx = fixture(3);
        let fork_parent_hash = fx.index.node(fx.active.at_height(2).unwrap()).hash;
        let f1 = header(fork_parent_hash, 50);
        fx.blocks
            .put_block(&Block {
                header: f1.clone(),
                transactions: vec![coinbase()],
            })
            .unwrap();
        let f1_id = fx.index.insert(f1.clone(), 1, true).unwrap();

        let block = Block {
            header: header(f1.hash(), 51),
            transactions: vec![coinbase(), spend_of(op(0x77))],
        };
        let err = check_fork_block(
            &block,
            f1_id,
            &fx.index,
            &fx.active,
            &mut fx.coins,
            &fx.blocks,
            &fx.undo_log,
            &params(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            WeirError::Block(BlockError::ForkDoubleSpend(_))
        ));
    }

    #[test]
    fn deep_fork_rejected() {
        let p = params();
        let mut fx = fixture(p.max_reorg_depth + 5);
        // Fork off genesis: depth far beyond the window.
        let genesis_id = fx.active.at_height(0).unwrap();
        let genesis_hash = fx.index.node(genesis_id).hash;
        let f1 = header(genesis_hash, 50);
        let f1_id = fx.index.insert(f1.clone(), 1, true).unwrap();

        let block = Block {
            header: header(f1.hash(), 51),
            transactions: vec![coinbase()],
        };
        let err = check_fork_block(
            &block,
            f1_id,
            &fx.index,
            &fx.active,
            &mut fx.coins,
            &fx.blocks,
            &fx.undo_log,
            &p,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            WeirError::Block(BlockError::ForkTooDeep { .. })
        ));
    }
}
