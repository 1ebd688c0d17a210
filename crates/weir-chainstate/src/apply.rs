//! Block application and reversal against a coin view.
//!
//! [`apply_block`] performs the contextual transaction checks that need the
//! UTXO set (existence, maturity, finality, value conservation), verifies
//! witnesses in parallel, enforces the reward bound and the header's state
//! commitment, and mutates the view while building the undo record.
//! [`undo_block`] replays an undo record in reverse.
//!
//! Callers run these against a child [`CoinsCache`] layer: on any rejection
//! the layer is dropped and the parent view is untouched.

use rayon::prelude::*;

use weir_core::error::{BlockError, StorageError, TxError, WeirError};
use weir_core::params::ChainParams;
use weir_core::reward::{block_subsidy, superblock_budget};
use weir_core::script::{ScriptVerifier, VerifyFlags};
use weir_core::types::{state_commitment, Block, Coin, OutPoint, TxOutput};
use weir_core::validation::is_final_at;

use crate::coins::{CoinsBackend, CoinsCache};
use crate::undo::{BlockUndo, SpentCoin, TxUndo};

/// Apply a block at `height` to the coin view.
///
/// The block must already have passed the stateless and contextual header
/// checks. On success the view reflects the post-block state and the
/// returned undo record can reverse it; on error the view is partially
/// mutated and must be discarded.
pub fn apply_block<B: CoinsBackend>(
    block: &Block,
    height: u64,
    median_time_past: u64,
    coins: &mut CoinsCache<B>,
    params: &ChainParams,
    script: &dyn ScriptVerifier,
) -> Result<BlockUndo, WeirError> {
    let mut undo = BlockUndo::new(height);
    let mut fees: u64 = 0;
    let mut minted_stake: u64 = 0;
    // (tx index, input index, spent output) for the parallel witness pass.
    let mut witness_checks: Vec<(usize, usize, TxOutput)> = Vec::new();

    for (i, tx) in block.transactions.iter().enumerate() {
        let txid = tx
            .txid()
            .map_err(|source| BlockError::Tx { index: i, source })?;

        if i == 0 {
            undo.txs.push(TxUndo::default());
        } else {
            if !is_final_at(tx, height, median_time_past) {
                return Err(BlockError::Tx {
                    index: i,
                    source: TxError::NonFinal { height },
                }
                .into());
            }

            let mut tx_undo = TxUndo::default();
            let mut value_in: u64 = 0;
            for (j, input) in tx.inputs.iter().enumerate() {
                let outpoint = input.previous_output.clone();
                let coin = coins
                    .spend_coin(&outpoint)?
                    .ok_or_else(|| BlockError::Tx {
                        index: i,
                        source: TxError::MissingInput(outpoint.to_string()),
                    })?;
                if !coin.is_mature(height, params.maturity) {
                    return Err(BlockError::Tx {
                        index: i,
                        source: TxError::PrematureSpend {
                            outpoint: outpoint.to_string(),
                            created: coin.height,
                            spent: height,
                        },
                    }
                    .into());
                }
                value_in = value_in
                    .checked_add(coin.output.value)
                    .ok_or(BlockError::Tx {
                        index: i,
                        source: TxError::ValueOutOfRange,
                    })?;
                witness_checks.push((i, j, coin.output.clone()));
                tx_undo.spent.push(SpentCoin {
                    outpoint,
                    coin,
                    has_metadata: true,
                });
            }

            let value_out = tx.total_output_value().ok_or(BlockError::Tx {
                index: i,
                source: TxError::ValueOutOfRange,
            })?;

            if tx.is_coinstake() {
                // The coinstake returns its inputs plus the stake reward;
                // the minted difference is bounded below with the coinbase.
                minted_stake = value_out.saturating_sub(value_in);
                fees = fees
                    .checked_add(value_in.saturating_sub(value_out))
                    .ok_or(BlockError::Tx {
                        index: i,
                        source: TxError::ValueOutOfRange,
                    })?;
            } else {
                if value_in < value_out {
                    return Err(BlockError::Tx {
                        index: i,
                        source: TxError::InsufficientFunds {
                            have: value_in,
                            need: value_out,
                        },
                    }
                    .into());
                }
                fees = fees
                    .checked_add(value_in - value_out)
                    .ok_or(BlockError::Tx {
                        index: i,
                        source: TxError::ValueOutOfRange,
                    })?;
            }

            undo.txs.push(tx_undo);
        }

        let is_coinstake = tx.is_coinstake();
        for (vout, output) in tx.outputs.iter().enumerate() {
            // The coinstake position marker is not a spendable coin.
            if is_coinstake && vout == 0 {
                continue;
            }
            coins.add_coin(
                OutPoint {
                    txid,
                    index: vout as u64,
                },
                Coin {
                    output: output.clone(),
                    height,
                    is_coinbase: i == 0,
                    is_coinstake,
                },
                false,
            )?;
        }
    }

    witness_checks
        .par_iter()
        .try_for_each(|(ti, ii, spent)| {
            script
                .verify_input(&block.transactions[*ti], *ii, spent, VerifyFlags::CONSENSUS)
                .map_err(|source| BlockError::Tx {
                    index: *ti,
                    source,
                })
        })
        .map_err(WeirError::from)?;

    let coinbase_out = block.transactions[0]
        .total_output_value()
        .ok_or(BlockError::Tx {
            index: 0,
            source: TxError::ValueOutOfRange,
        })?;
    let minted = coinbase_out.saturating_add(minted_stake);
    let mut allowed = block_subsidy(height, params).saturating_add(fees);
    if params.is_superblock(height) {
        allowed = allowed.saturating_add(superblock_budget(height, params));
    }
    if minted > allowed {
        return Err(BlockError::BadRewards { minted, allowed }.into());
    }

    let expected = state_commitment(&block.header.prev_hash, height, fees, minted);
    if expected != block.header.state_commitment {
        return Err(BlockError::CommitmentMismatch.into());
    }

    coins.set_best_block(block.header.hash());
    tracing::debug!(
        height,
        fees,
        minted,
        spent = undo.spent_count(),
        "applied block"
    );
    Ok(undo)
}

/// How a disconnect went.
///
/// `Unclean` means the view did not match what the undo record expected
/// (a created coin was already gone, a restored coin was already present,
/// or metadata had to be reconstructed). The disconnect still completes
/// with best-effort restoration; callers decide whether to keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    Clean,
    Unclean,
}

/// Sibling outputs probed when an undo record lacks coin metadata.
const METADATA_PROBE_SPAN: u64 = 32;

/// Reverse a block's effect on the coin view using its undo record.
///
/// A record that does not even cover the block's transactions is corrupt
/// and fatal. Lesser mismatches between the record and the view are
/// repaired as far as possible and reported as [`DisconnectOutcome::Unclean`].
pub fn undo_block<B: CoinsBackend>(
    block: &Block,
    undo: &BlockUndo,
    coins: &mut CoinsCache<B>,
) -> Result<DisconnectOutcome, StorageError> {
    if undo.txs.len() != block.transactions.len() {
        return Err(StorageError::Corrupt(format!(
            "undo record covers {} txs, block has {}",
            undo.txs.len(),
            block.transactions.len()
        )));
    }

    let mut clean = true;

    for (i, tx) in block.transactions.iter().enumerate().rev() {
        let txid = tx
            .txid()
            .map_err(|e| StorageError::Corrupt(format!("txid during undo: {e}")))?;

        let is_coinstake = tx.is_coinstake();
        for (vout, _) in tx.outputs.iter().enumerate() {
            if is_coinstake && vout == 0 {
                continue;
            }
            let outpoint = OutPoint {
                txid,
                index: vout as u64,
            };
            if coins.spend_coin(&outpoint)?.is_none() {
                tracing::warn!(%outpoint, "created coin missing during undo");
                clean = false;
            }
        }

        for spent in undo.txs[i].spent.iter().rev() {
            let mut coin = spent.coin.clone();
            if !spent.has_metadata {
                match sibling_metadata(coins, &spent.outpoint)? {
                    Some((height, is_coinbase, is_coinstake)) => {
                        coin.height = height;
                        coin.is_coinbase = is_coinbase;
                        coin.is_coinstake = is_coinstake;
                    }
                    None => {
                        tracing::warn!(
                            outpoint = %spent.outpoint,
                            "no sibling to recover coin metadata from"
                        );
                        clean = false;
                    }
                }
            }
            if coins.have_coin(&spent.outpoint)? {
                tracing::warn!(
                    outpoint = %spent.outpoint,
                    "restored coin already present"
                );
                clean = false;
            }
            coins.add_coin(spent.outpoint.clone(), coin, true)?;
        }
    }

    coins.set_best_block(block.header.prev_hash);
    tracing::debug!(
        height = undo.height,
        restored = undo.spent_count(),
        "disconnected block"
    );
    Ok(if clean {
        DisconnectOutcome::Clean
    } else {
        DisconnectOutcome::Unclean
    })
}

/// Recover creation metadata for a restored coin from a sibling output of
/// the same transaction that is still unspent in the view. All outputs of
/// one transaction share height and coinbase markers.
fn sibling_metadata<B: CoinsBackend>(
    coins: &mut CoinsCache<B>,
    outpoint: &OutPoint,
) -> Result<Option<(u64, bool, bool)>, StorageError> {
    for index in 0..METADATA_PROBE_SPAN {
        if index == outpoint.index {
            continue;
        }
        let probe = OutPoint {
            txid: outpoint.txid,
            index,
        };
        if let Some(sibling) = coins.coin(&probe)? {
            return Ok(Some((
                sibling.height,
                sibling.is_coinbase,
                sibling.is_coinstake,
            )));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use weir_core::block_validation::encode_coinbase_height;
    use weir_core::constants::COIN;
    use weir_core::crypto::{sign_transaction_input, KeyPair};
    use weir_core::merkle::merkle_root;
    use weir_core::script::Ed25519Verifier;
    use weir_core::types::{BlockHeader, Hash256, Transaction, TxInput};

    use crate::coins::StoreBackend;
    use crate::store::{CoinStore, CoinsDelta, MemoryCoinStore};

    fn params() -> ChainParams {
        ChainParams::regtest()
    }

    fn keypair() -> KeyPair {
        KeyPair::from_secret_bytes([7; 32])
    }

    fn make_coinbase(height: u64, value: u64, kp: &KeyPair) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint::null(),
                signature: encode_coinbase_height(height),
                public_key: vec![],
            }],
            outputs: vec![TxOutput {
                value,
                pubkey_hash: kp.pubkey_hash(),
            }],
            lock_time: 0,
        }
    }

    /// Build a block whose merkle root and commitment are consistent with
    /// its contents at the given position.
    fn make_block(
        prev_hash: Hash256,
        height: u64,
        fees: u64,
        minted: u64,
        txs: Vec<Transaction>,
    ) -> Block {
        let txids: Vec<_> = txs.iter().map(|t| t.txid().unwrap()).collect();
        Block {
            header: BlockHeader {
                version: 1,
                prev_hash,
                merkle_root: merkle_root(&txids),
                timestamp: 1_700_000_000 + height * 60,
                difficulty_target: u64::MAX,
                nonce: height,
                state_commitment: state_commitment(&prev_hash, height, fees, minted),
            },
            transactions: txs,
        }
    }

    fn fresh_cache() -> CoinsCache<StoreBackend> {
        CoinsCache::new(StoreBackend::new(Arc::new(MemoryCoinStore::new())))
    }

    /// Seed the store with a mature spendable coin owned by `kp`.
    fn seeded_cache(kp: &KeyPair, value: u64) -> (OutPoint, CoinsCache<StoreBackend>) {
        let store = Arc::new(MemoryCoinStore::new());
        let outpoint = OutPoint {
            txid: Hash256([0x55; 32]),
            index: 0,
        };
        store
            .apply_delta(CoinsDelta {
                best_block: Hash256([1; 32]),
                writes: vec![(
                    outpoint.clone(),
                    Some(Coin {
                        output: TxOutput {
                            value,
                            pubkey_hash: kp.pubkey_hash(),
                        },
                        height: 1,
                        is_coinbase: false,
                        is_coinstake: false,
                    }),
                )],
            })
            .unwrap();
        (outpoint, CoinsCache::new(StoreBackend::new(store)))
    }

    fn signed_spend(kp: &KeyPair, outpoint: OutPoint, value_out: u64) -> Transaction {
        let mut tx = Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: outpoint,
                signature: vec![],
                public_key: vec![],
            }],
            outputs: vec![TxOutput {
                value: value_out,
                pubkey_hash: Hash256([0xBB; 32]),
            }],
            lock_time: 0,
        };
        sign_transaction_input(&mut tx, 0, kp).unwrap();
        tx
    }

    #[test]
    fn coinbase_only_block_applies() {
        let kp = keypair();
        let p = params();
        let mut coins = fresh_cache();
        let subsidy = block_subsidy(1, &p);
        let block = make_block(
            Hash256([1; 32]),
            1,
            0,
            subsidy,
            vec![make_coinbase(1, subsidy, &kp)],
        );
        let undo =
            apply_block(&block, 1, 1_600_000_000, &mut coins, &p, &Ed25519Verifier).unwrap();
        assert_eq!(undo.spent_count(), 0);
        let cb_txid = block.transactions[0].txid().unwrap();
        assert!(coins
            .have_coin(&OutPoint { txid: cb_txid, index: 0 })
            .unwrap());
        assert_eq!(coins.best_block(), Some(block.header.hash()));
    }

    #[test]
    fn spend_moves_value_and_collects_fee() {
        let kp = keypair();
        let p = params();
        let (outpoint, mut coins) = seeded_cache(&kp, 10 * COIN);
        let spend = signed_spend(&kp, outpoint.clone(), 9 * COIN); // 1 COIN fee
        let fees = COIN;
        let minted = block_subsidy(2, &p) + fees;
        let block = make_block(
            Hash256([1; 32]),
            2,
            fees,
            minted,
            vec![make_coinbase(2, minted, &kp), spend.clone()],
        );
        let undo =
            apply_block(&block, 2, 1_600_000_000, &mut coins, &p, &Ed25519Verifier).unwrap();
        assert_eq!(undo.spent_count(), 1);
        assert!(!coins.have_coin(&outpoint).unwrap());
        let new_op = OutPoint {
            txid: spend.txid().unwrap(),
            index: 0,
        };
        assert_eq!(coins.coin(&new_op).unwrap().unwrap().output.value, 9 * COIN);
    }

    #[test]
    fn missing_input_rejected() {
        let kp = keypair();
        let p = params();
        let mut coins = fresh_cache();
        let ghost = OutPoint {
            txid: Hash256([0x99; 32]),
            index: 0,
        };
        let spend = signed_spend(&kp, ghost, COIN);
        let minted = block_subsidy(1, &p);
        let block = make_block(
            Hash256([1; 32]),
            1,
            0,
            minted,
            vec![make_coinbase(1, minted, &kp), spend],
        );
        let err =
            apply_block(&block, 1, 1_600_000_000, &mut coins, &p, &Ed25519Verifier).unwrap_err();
        assert!(matches!(
            err,
            WeirError::Block(BlockError::Tx {
                index: 1,
                source: TxError::MissingInput(_)
            })
        ));
    }

    #[test]
    fn immature_coinbase_spend_rejected() {
        let kp = keypair();
        let p = params();
        let store = Arc::new(MemoryCoinStore::new());
        let outpoint = OutPoint {
            txid: Hash256([0x55; 32]),
            index: 0,
        };
        store
            .apply_delta(CoinsDelta {
                best_block: Hash256([1; 32]),
                writes: vec![(
                    outpoint.clone(),
                    Some(Coin {
                        output: TxOutput {
                            value: 10 * COIN,
                            pubkey_hash: kp.pubkey_hash(),
                        },
                        height: 5,
                        is_coinbase: true,
                        is_coinstake: false,
                    }),
                )],
            })
            .unwrap();
        let mut coins = CoinsCache::new(StoreBackend::new(store));

        // Height 6: only one confirmation, regtest maturity is 10.
        let spend = signed_spend(&kp, outpoint, 9 * COIN);
        let fees = COIN;
        let minted = block_subsidy(6, &p) + fees;
        let block = make_block(
            Hash256([1; 32]),
            6,
            fees,
            minted,
            vec![make_coinbase(6, minted, &kp), spend],
        );
        let err =
            apply_block(&block, 6, 1_600_000_000, &mut coins, &p, &Ed25519Verifier).unwrap_err();
        assert!(matches!(
            err,
            WeirError::Block(BlockError::Tx {
                source: TxError::PrematureSpend { created: 5, spent: 6, .. },
                ..
            })
        ));
    }

    #[test]
    fn bad_witness_rejected() {
        let kp = keypair();
        let p = params();
        let (outpoint, mut coins) = seeded_cache(&kp, 10 * COIN);
        let mut spend = signed_spend(&kp, outpoint, 9 * COIN);
        spend.inputs[0].signature[0] ^= 1;
        let fees = COIN;
        let minted = block_subsidy(2, &p) + fees;
        let block = make_block(
            Hash256([1; 32]),
            2,
            fees,
            minted,
            vec![make_coinbase(2, minted, &kp), spend],
        );
        let err =
            apply_block(&block, 2, 1_600_000_000, &mut coins, &p, &Ed25519Verifier).unwrap_err();
        assert!(matches!(
            err,
            WeirError::Block(BlockError::Tx {
                index: 1,
                source: TxError::BadSignature { index: 0 }
            })
        ));
    }

    #[test]
    fn overclaimed_reward_rejected() {
        let kp = keypair();
        let p = params();
        let mut coins = fresh_cache();
        let minted = block_subsidy(1, &p) + 1;
        let block = make_block(
            Hash256([1; 32]),
            1,
            0,
            minted,
            vec![make_coinbase(1, minted, &kp)],
        );
        let err =
            apply_block(&block, 1, 1_600_000_000, &mut coins, &p, &Ed25519Verifier).unwrap_err();
        assert!(matches!(
            err,
            WeirError::Block(BlockError::BadRewards { .. })
        ));
    }

    #[test]
    fn wrong_commitment_rejected() {
        let kp = keypair();
        let p = params();
        let mut coins = fresh_cache();
        let minted = block_subsidy(1, &p);
        let mut block = make_block(
            Hash256([1; 32]),
            1,
            0,
            minted,
            vec![make_coinbase(1, minted, &kp)],
        );
        block.header.state_commitment = Hash256([0xEE; 32]);
        let err =
            apply_block(&block, 1, 1_600_000_000, &mut coins, &p, &Ed25519Verifier).unwrap_err();
        assert!(matches!(
            err,
            WeirError::Block(BlockError::CommitmentMismatch)
        ));
    }

    #[test]
    fn non_final_transaction_rejected() {
        let kp = keypair();
        let p = params();
        let (outpoint, mut coins) = seeded_cache(&kp, 10 * COIN);
        let mut spend = Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: outpoint,
                signature: vec![],
                public_key: vec![],
            }],
            outputs: vec![TxOutput {
                value: 9 * COIN,
                pubkey_hash: Hash256([0xBB; 32]),
            }],
            lock_time: 100, // height lock beyond the connect height
        };
        sign_transaction_input(&mut spend, 0, &kp).unwrap();
        let fees = COIN;
        let minted = block_subsidy(2, &p) + fees;
        let block = make_block(
            Hash256([1; 32]),
            2,
            fees,
            minted,
            vec![make_coinbase(2, minted, &kp), spend],
        );
        let err =
            apply_block(&block, 2, 1_600_000_000, &mut coins, &p, &Ed25519Verifier).unwrap_err();
        assert!(matches!(
            err,
            WeirError::Block(BlockError::Tx {
                source: TxError::NonFinal { height: 2 },
                ..
            })
        ));
    }

    #[test]
    fn undo_restores_prior_view() {
        let kp = keypair();
        let p = params();
        let (outpoint, mut coins) = seeded_cache(&kp, 10 * COIN);
        let spend = signed_spend(&kp, outpoint.clone(), 9 * COIN);
        let fees = COIN;
        let minted = block_subsidy(2, &p) + fees;
        let block = make_block(
            Hash256([1; 32]),
            2,
            fees,
            minted,
            vec![make_coinbase(2, minted, &kp), spend.clone()],
        );
        let undo =
            apply_block(&block, 2, 1_600_000_000, &mut coins, &p, &Ed25519Verifier).unwrap();

        let outcome = undo_block(&block, &undo, &mut coins).unwrap();
        assert_eq!(outcome, DisconnectOutcome::Clean);

        assert_eq!(
            coins.coin(&outpoint).unwrap().unwrap().output.value,
            10 * COIN
        );
        let spent_op = OutPoint {
            txid: spend.txid().unwrap(),
            index: 0,
        };
        assert!(!coins.have_coin(&spent_op).unwrap());
        let cb_op = OutPoint {
            txid: block.transactions[0].txid().unwrap(),
            index: 0,
        };
        assert!(!coins.have_coin(&cb_op).unwrap());
        assert_eq!(coins.best_block(), Some(Hash256([1; 32])));
    }

    #[test]
    fn undo_with_missing_created_coin_is_unclean() {
        let kp = keypair();
        let p = params();
        let (outpoint, mut coins) = seeded_cache(&kp, 10 * COIN);
        let spend = signed_spend(&kp, outpoint.clone(), 9 * COIN);
        let fees = COIN;
        let minted = block_subsidy(2, &p) + fees;
        let block = make_block(
            Hash256([1; 32]),
            2,
            fees,
            minted,
            vec![make_coinbase(2, minted, &kp), spend.clone()],
        );
        let undo =
            apply_block(&block, 2, 1_600_000_000, &mut coins, &p, &Ed25519Verifier).unwrap();

        // Simulate a view that lost one of the block's created coins.
        let created = OutPoint {
            txid: spend.txid().unwrap(),
            index: 0,
        };
        coins.spend_coin(&created).unwrap();

        let outcome = undo_block(&block, &undo, &mut coins).unwrap();
        assert_eq!(outcome, DisconnectOutcome::Unclean);
        // Restoration still happened for everything the record covers.
        assert_eq!(
            coins.coin(&outpoint).unwrap().unwrap().output.value,
            10 * COIN
        );
        assert_eq!(coins.best_block(), Some(Hash256([1; 32])));
    }

    #[test]
    fn undo_recovers_metadata_from_sibling_output() {
        let kp = keypair();
        let p = params();
        let (outpoint, mut coins) = seeded_cache(&kp, 10 * COIN);

        // Spend splits into two outputs so a sibling survives the later
        // respend of output 0.
        let mut split = Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: outpoint,
                signature: vec![],
                public_key: vec![],
            }],
            outputs: vec![
                TxOutput {
                    value: 4 * COIN,
                    pubkey_hash: kp.pubkey_hash(),
                },
                TxOutput {
                    value: 5 * COIN,
                    pubkey_hash: kp.pubkey_hash(),
                },
            ],
            lock_time: 0,
        };
        sign_transaction_input(&mut split, 0, &kp).unwrap();
        let split_txid = split.txid().unwrap();
        let fees = COIN;
        let minted = block_subsidy(2, &p) + fees;
        let block_a = make_block(
            Hash256([1; 32]),
            2,
            fees,
            minted,
            vec![make_coinbase(2, minted, &kp), split],
        );
        apply_block(&block_a, 2, 1_600_000_000, &mut coins, &p, &Ed25519Verifier).unwrap();

        let spent_op = OutPoint {
            txid: split_txid,
            index: 0,
        };
        let respend = signed_spend(&kp, spent_op.clone(), 3 * COIN);
        let fees = COIN;
        let minted = block_subsidy(3, &p) + fees;
        let block_b = make_block(
            block_a.header.hash(),
            3,
            fees,
            minted,
            vec![make_coinbase(3, minted, &kp), respend],
        );
        let mut undo =
            apply_block(&block_b, 3, 1_600_000_100, &mut coins, &p, &Ed25519Verifier).unwrap();

        // Strip the record's metadata; the restorer must take it from the
        // surviving sibling at index 1.
        undo.txs[1].spent[0].has_metadata = false;
        undo.txs[1].spent[0].coin.height = 0;

        let outcome = undo_block(&block_b, &undo, &mut coins).unwrap();
        assert_eq!(outcome, DisconnectOutcome::Clean);
        let restored = coins.coin(&spent_op).unwrap().unwrap();
        assert_eq!(restored.height, 2);
        assert!(!restored.is_coinbase);
        assert_eq!(restored.output.value, 4 * COIN);
    }

    #[test]
    fn undo_with_mismatched_record_is_corrupt() {
        let kp = keypair();
        let p = params();
        let mut coins = fresh_cache();
        let minted = block_subsidy(1, &p);
        let block = make_block(
            Hash256([1; 32]),
            1,
            0,
            minted,
            vec![make_coinbase(1, minted, &kp)],
        );
        apply_block(&block, 1, 1_600_000_000, &mut coins, &p, &Ed25519Verifier).unwrap();
        let bogus = BlockUndo::new(1); // no per-tx entries
        assert!(matches!(
            undo_block(&block, &bogus, &mut coins),
            Err(StorageError::Corrupt(_))
        ));
    }

    #[test]
    fn coinstake_mints_within_bound() {
        let kp = keypair();
        let p = params();
        let (outpoint, mut coins) = seeded_cache(&kp, 100 * COIN);
        let subsidy = block_subsidy(2, &p);

        let mut coinstake = Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: outpoint,
                signature: vec![],
                public_key: vec![],
            }],
            outputs: vec![
                TxOutput::stake_marker(),
                TxOutput {
                    value: 100 * COIN + subsidy,
                    pubkey_hash: kp.pubkey_hash(),
                },
            ],
            lock_time: 0,
        };
        sign_transaction_input(&mut coinstake, 0, &kp).unwrap();

        // Proof-of-stake block: empty-value coinbase payout goes unused,
        // so the coinbase claims nothing beyond the height commitment.
        let coinbase = Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint::null(),
                signature: encode_coinbase_height(2),
                public_key: vec![],
            }],
            outputs: vec![TxOutput {
                value: 1,
                pubkey_hash: kp.pubkey_hash(),
            }],
            lock_time: 0,
        };

        // minted = coinbase out (1) + stake reward (subsidy); claim one
        // drop less than allowed as fee headroom is zero here.
        let minted = subsidy + 1;
        let block = make_block(
            Hash256([1; 32]),
            2,
            0,
            minted,
            vec![coinbase, coinstake.clone()],
        );
        let err = apply_block(&block, 2, 1_600_000_000, &mut coins, &p, &Ed25519Verifier);
        // subsidy + 1 > subsidy: one drop over the bound.
        assert!(matches!(
            err,
            Err(WeirError::Block(BlockError::BadRewards { .. }))
        ));
    }

    #[test]
    fn coinstake_exact_reward_accepted() {
        let kp = keypair();
        let p = params();
        let (outpoint, mut coins) = seeded_cache(&kp, 100 * COIN);
        let subsidy = block_subsidy(2, &p);

        let mut coinstake = Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: outpoint.clone(),
                signature: vec![],
                public_key: vec![],
            }],
            outputs: vec![
                TxOutput::stake_marker(),
                TxOutput {
                    value: 100 * COIN + subsidy,
                    pubkey_hash: kp.pubkey_hash(),
                },
            ],
            lock_time: 0,
        };
        sign_transaction_input(&mut coinstake, 0, &kp).unwrap();

        let coinbase = make_coinbase(2, 0, &kp);
        // A zero-value coinbase output fails the stateless checks, so for
        // the apply-level test give the coinbase no claim by paying the
        // whole reward through the coinstake.
        let block = make_block(
            Hash256([1; 32]),
            2,
            0,
            subsidy,
            vec![
                Transaction {
                    outputs: vec![TxOutput {
                        value: 0,
                        pubkey_hash: Hash256::ZERO,
                    }],
                    ..coinbase
                },
                coinstake.clone(),
            ],
        );
        // apply_block itself does not re-run stateless checks.
        let undo =
            apply_block(&block, 2, 1_600_000_000, &mut coins, &p, &Ed25519Verifier).unwrap();
        assert_eq!(undo.spent_count(), 1);
        // The stake marker output was not materialized as a coin.
        let cs_txid = coinstake.txid().unwrap();
        assert!(!coins
            .have_coin(&OutPoint { txid: cs_txid, index: 0 })
            .unwrap());
        assert_eq!(
            coins
                .coin(&OutPoint { txid: cs_txid, index: 1 })
                .unwrap()
                .unwrap()
                .output
                .value,
            100 * COIN + subsidy
        );
    }
}
