//! Shared helpers for building valid blocks and engines in tests.

use std::sync::Arc;

use weir_chainstate::engine::{AcceptOutcome, ChainEngine};
use weir_chainstate::store::{MemoryBlockStore, MemoryCoinStore, MemoryUndoLog};
use weir_core::block_validation::encode_coinbase_height;
use weir_core::crypto::{sign_transaction_input, KeyPair};
use weir_core::merkle::merkle_root;
use weir_core::params::{ChainParams, EngineConfig};
use weir_core::reward::block_subsidy;
use weir_core::script::{CompactTargetProof, Ed25519Verifier};
use weir_core::types::{
    state_commitment, Block, BlockHeader, Hash256, OutPoint, Transaction, TxInput, TxOutput,
};

/// Fixed "now" for the injected engine clock; far enough ahead that test
/// block timestamps never trip the future-drift check.
pub const TEST_NOW: u64 = 1_700_200_000;

/// Base timestamp for test blocks; one minute of spacing per height.
pub const BASE_TIMESTAMP: u64 = 1_700_000_000;

pub fn keypair() -> KeyPair {
    KeyPair::from_secret_bytes([7; 32])
}

/// Simple pubkey hash from a seed byte.
pub fn pkh(seed: u8) -> Hash256 {
    Hash256([seed; 32])
}

/// Coinbase paying `value` to `pubkey_hash`, carrying the height
/// commitment in its input.
pub fn make_coinbase(height: u64, value: u64, pubkey_hash: Hash256) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            signature: encode_coinbase_height(height),
            public_key: vec![],
        }],
        outputs: vec![TxOutput { value, pubkey_hash }],
        lock_time: 0,
    }
}

/// Transaction spending `outpoints` (all owned by `kp`) into `outputs`,
/// with every input signed.
pub fn signed_tx(
    kp: &KeyPair,
    outpoints: Vec<OutPoint>,
    outputs: Vec<(u64, Hash256)>,
) -> Transaction {
    let mut tx = Transaction {
        version: 1,
        inputs: outpoints
            .into_iter()
            .map(|op| TxInput {
                previous_output: op,
                signature: vec![],
                public_key: vec![],
            })
            .collect(),
        outputs: outputs
            .into_iter()
            .map(|(value, pubkey_hash)| TxOutput { value, pubkey_hash })
            .collect(),
        lock_time: 0,
    };
    for i in 0..tx.inputs.len() {
        sign_transaction_input(&mut tx, i, kp).unwrap();
    }
    tx
}

/// Block with a consistent merkle root and state commitment for its
/// position. `salt` perturbs the timestamp so equal-height siblings get
/// distinct hashes.
pub fn make_block(
    prev_hash: Hash256,
    height: u64,
    fees: u64,
    minted: u64,
    salt: u64,
    txs: Vec<Transaction>,
) -> Block {
    let txids: Vec<Hash256> = txs.iter().map(|tx| tx.txid().unwrap()).collect();
    Block {
        header: BlockHeader {
            version: 1,
            prev_hash,
            merkle_root: merkle_root(&txids),
            timestamp: BASE_TIMESTAMP + height * 60 + salt,
            difficulty_target: u64::MAX,
            nonce: 0,
            state_commitment: state_commitment(&prev_hash, height, fees, minted),
        },
        transactions: txs,
    }
}

/// Coinbase-only block claiming the full subsidy, paid to `miner`.
pub fn plain_block(prev: &Block, height: u64, salt: u64, miner: Hash256) -> Block {
    let params = ChainParams::regtest();
    let minted = block_subsidy(height, &params);
    make_block(
        prev.header.hash(),
        height,
        0,
        minted,
        salt,
        vec![make_coinbase(height, minted, miner)],
    )
}

/// Regtest genesis paying the initial subsidy to `miner`.
pub fn genesis_block(miner: Hash256) -> Block {
    let params = ChainParams::regtest();
    let minted = block_subsidy(0, &params);
    make_block(
        Hash256::ZERO,
        0,
        0,
        minted,
        0,
        vec![make_coinbase(0, minted, miner)],
    )
}

/// Regtest engine over in-memory stores with a fixed clock.
pub fn memory_engine(genesis: Block, config: EngineConfig) -> ChainEngine {
    ChainEngine::new(
        ChainParams::regtest(),
        config,
        genesis,
        Arc::new(Ed25519Verifier),
        Arc::new(CompactTargetProof::new(u64::MAX)),
        Arc::new(MemoryCoinStore::new()),
        Arc::new(MemoryUndoLog::new()),
        Arc::new(MemoryBlockStore::new()),
        Some(Box::new(|| TEST_NOW)),
    )
    .unwrap()
}

/// Extend the active chain with coinbase-only blocks through `to_height`.
/// Returns every block produced, starting from `from`.
pub fn extend_chain(
    engine: &ChainEngine,
    from: &Block,
    to_height: u64,
    miner: Hash256,
) -> Vec<Block> {
    let mut blocks = vec![from.clone()];
    let start = engine.tip().unwrap().1 + 1;
    for height in start..=to_height {
        let block = plain_block(blocks.last().unwrap(), height, 0, miner);
        assert_eq!(
            engine.submit_block(block.clone()).unwrap(),
            AcceptOutcome::Connected
        );
        blocks.push(block);
    }
    blocks
}

/// Outpoint of a block's coinbase payout.
pub fn coinbase_outpoint(block: &Block) -> OutPoint {
    OutPoint {
        txid: block.transactions[0].txid().unwrap(),
        index: 0,
    }
}
