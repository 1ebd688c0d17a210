//! Property tests for the apply/undo state transition.
//!
//! For arbitrary spend shapes, connecting a block and then disconnecting
//! it must leave the coin view exactly where it started.

use std::sync::Arc;

use proptest::prelude::*;

use weir_chainstate::apply::{apply_block, undo_block, DisconnectOutcome};
use weir_chainstate::coins::{CoinsCache, StoreBackend};
use weir_chainstate::store::{CoinStore, CoinsDelta, MemoryCoinStore};
use weir_core::constants::COIN;
use weir_core::params::ChainParams;
use weir_core::reward::block_subsidy;
use weir_core::script::Ed25519Verifier;
use weir_core::types::{Coin, Hash256, OutPoint, TxOutput};
use weir_tests::helpers::*;

const FUNDING: u64 = 10 * COIN;

/// Store pre-loaded with `n` mature coins owned by the test key.
fn seeded_store(n: usize) -> (Vec<OutPoint>, Arc<MemoryCoinStore>) {
    let kp = keypair();
    let store = Arc::new(MemoryCoinStore::new());
    let outpoints: Vec<OutPoint> = (0..n)
        .map(|i| OutPoint {
            txid: Hash256([i as u8 + 1; 32]),
            index: 0,
        })
        .collect();
    store
        .apply_delta(CoinsDelta {
            best_block: Hash256([0xAA; 32]),
            writes: outpoints
                .iter()
                .map(|op| {
                    (
                        op.clone(),
                        Some(Coin {
                            output: TxOutput {
                                value: FUNDING,
                                pubkey_hash: kp.pubkey_hash(),
                            },
                            height: 1,
                            is_coinbase: false,
                            is_coinstake: false,
                        }),
                    )
                })
                .collect(),
        })
        .unwrap();
    (outpoints, store)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A spend splitting one coin into arbitrary outputs applies and
    /// undoes cleanly, whatever the split.
    #[test]
    fn apply_then_undo_is_identity(
        values in prop::collection::vec(1u64..=COIN, 1..5),
        n_spends in 1usize..4,
    ) {
        let kp = keypair();
        let params = ChainParams::regtest();
        let (outpoints, store) = seeded_store(n_spends);
        let mut coins = CoinsCache::new(StoreBackend::new(store.clone()));

        // One spend per seeded coin, each with the generated output split.
        let mut txs = Vec::new();
        let mut fees = 0u64;
        for op in &outpoints {
            let outs: Vec<(u64, Hash256)> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (*v, pkh(0x50 + i as u8)))
                .collect();
            let paid: u64 = outs.iter().map(|(v, _)| v).sum();
            fees += FUNDING - paid;
            txs.push(signed_tx(&kp, vec![op.clone()], outs));
        }

        let height = 12;
        let minted = block_subsidy(height, &params) + fees;
        let mut block_txs = vec![make_coinbase(height, minted, kp.pubkey_hash())];
        block_txs.extend(txs.iter().cloned());
        let block = make_block(
            Hash256([0xAA; 32]),
            height,
            fees,
            minted,
            0,
            block_txs,
        );

        let undo = apply_block(
            &block,
            height,
            BASE_TIMESTAMP,
            &mut coins,
            &params,
            &Ed25519Verifier,
        )
        .unwrap();
        prop_assert_eq!(undo.spent_count(), n_spends);

        // Applied state: sources gone, outputs present.
        for op in &outpoints {
            prop_assert!(!coins.have_coin(op).unwrap());
        }
        for tx in &txs {
            let txid = tx.txid().unwrap();
            for (vout, output) in tx.outputs.iter().enumerate() {
                let op = OutPoint { txid, index: vout as u64 };
                prop_assert_eq!(
                    coins.coin(&op).unwrap().unwrap().output.value,
                    output.value
                );
            }
        }

        let outcome = undo_block(&block, &undo, &mut coins).unwrap();
        prop_assert_eq!(outcome, DisconnectOutcome::Clean);

        // Back to the seeded state exactly.
        for op in &outpoints {
            let coin = coins.coin(op).unwrap().unwrap();
            prop_assert_eq!(coin.output.value, FUNDING);
            prop_assert_eq!(coin.height, 1);
        }
        for tx in &txs {
            let txid = tx.txid().unwrap();
            for vout in 0..tx.outputs.len() {
                let op = OutPoint { txid, index: vout as u64 };
                prop_assert!(!coins.have_coin(&op).unwrap());
            }
        }
        let cb_op = OutPoint {
            txid: block.transactions[0].txid().unwrap(),
            index: 0,
        };
        prop_assert!(!coins.have_coin(&cb_op).unwrap());
        prop_assert_eq!(coins.best_block(), Some(Hash256([0xAA; 32])));
    }
}

/// A view that lost a created coin still disconnects, reported unclean,
/// and everything the undo record covers comes back.
#[test]
fn disconnect_over_damaged_view_is_unclean_but_restores() {
    let kp = keypair();
    let params = ChainParams::regtest();
    let (outpoints, store) = seeded_store(1);
    let mut coins = CoinsCache::new(StoreBackend::new(store));

    let spend = signed_tx(
        &kp,
        vec![outpoints[0].clone()],
        vec![(9 * COIN, pkh(0x51))],
    );
    let fees = FUNDING - 9 * COIN;
    let height = 12;
    let minted = block_subsidy(height, &params) + fees;
    let block = make_block(
        Hash256([0xAA; 32]),
        height,
        fees,
        minted,
        0,
        vec![make_coinbase(height, minted, kp.pubkey_hash()), spend.clone()],
    );
    let undo = apply_block(
        &block,
        height,
        BASE_TIMESTAMP,
        &mut coins,
        &params,
        &Ed25519Verifier,
    )
    .unwrap();

    // Lose the spend's created coin before disconnecting.
    let created = OutPoint {
        txid: spend.txid().unwrap(),
        index: 0,
    };
    coins.spend_coin(&created).unwrap();

    let outcome = undo_block(&block, &undo, &mut coins).unwrap();
    assert_eq!(outcome, DisconnectOutcome::Unclean);
    let restored = coins.coin(&outpoints[0]).unwrap().unwrap();
    assert_eq!(restored.output.value, FUNDING);
    assert_eq!(coins.best_block(), Some(Hash256([0xAA; 32])));
}
