//! Durable storage interfaces and in-memory implementations.
//!
//! The engine is generic over three narrow traits: [`CoinStore`] for the
//! flushed UTXO set, [`UndoLog`] for per-block undo records, and
//! [`BlockStore`] for raw block bodies. The memory implementations here are
//! used in tests; production nodes inject the RocksDB implementations from
//! weir-store.
//!
//! All methods take `&self`: implementations provide their own interior
//! locking so the engine can hold them behind `Arc<dyn _>`.

use parking_lot::Mutex;
use std::collections::HashMap;

use weir_core::error::StorageError;
use weir_core::types::{Block, Coin, Hash256, OutPoint};

use crate::undo::BlockUndo;

/// A batch of coin-set changes flushed atomically with the best-block
/// marker. `None` deletes the outpoint.
#[derive(Debug, Default)]
pub struct CoinsDelta {
    /// Hash of the block the flushed set corresponds to.
    pub best_block: Hash256,
    pub writes: Vec<(OutPoint, Option<Coin>)>,
}

impl CoinsDelta {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Durable UTXO set.
///
/// [`apply_delta`](CoinStore::apply_delta) must be atomic: either every
/// write in the delta lands together with the best-block marker, or none
/// do. The committed best block is how startup knows which chain state the
/// flushed set represents.
pub trait CoinStore: Send + Sync {
    /// Look up an unspent coin. `None` if spent or unknown.
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, StorageError>;

    /// The block hash the flushed set corresponds to. `None` before the
    /// first flush.
    fn best_block(&self) -> Result<Option<Hash256>, StorageError>;

    /// Atomically apply a delta and advance the best-block marker.
    fn apply_delta(&self, delta: CoinsDelta) -> Result<(), StorageError>;

    /// Number of unspent coins. Memory implementations answer exactly;
    /// disk implementations may estimate.
    fn coin_count(&self) -> Result<u64, StorageError>;
}

/// Durable per-block undo records.
pub trait UndoLog: Send + Sync {
    fn append(&self, block_hash: &Hash256, undo: &BlockUndo) -> Result<(), StorageError>;

    fn read(&self, block_hash: &Hash256) -> Result<Option<BlockUndo>, StorageError>;

    fn remove(&self, block_hash: &Hash256) -> Result<(), StorageError>;
}

/// Raw block bodies by hash.
pub trait BlockStore: Send + Sync {
    fn put_block(&self, block: &Block) -> Result<(), StorageError>;

    fn block(&self, hash: &Hash256) -> Result<Option<Block>, StorageError>;

    fn contains(&self, hash: &Hash256) -> Result<bool, StorageError> {
        Ok(self.block(hash)?.is_some())
    }
}

struct MemoryCoinInner {
    coins: HashMap<OutPoint, Coin>,
    best_block: Option<Hash256>,
}

/// In-memory [`CoinStore`] for tests. No persistence, unbounded growth.
pub struct MemoryCoinStore {
    inner: Mutex<MemoryCoinInner>,
}

impl MemoryCoinStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryCoinInner {
                coins: HashMap::new(),
                best_block: None,
            }),
        }
    }
}

impl Default for MemoryCoinStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CoinStore for MemoryCoinStore {
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, StorageError> {
        Ok(self.inner.lock().coins.get(outpoint).cloned())
    }

    fn best_block(&self) -> Result<Option<Hash256>, StorageError> {
        Ok(self.inner.lock().best_block)
    }

    fn apply_delta(&self, delta: CoinsDelta) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        for (outpoint, coin) in delta.writes {
            match coin {
                Some(c) => {
                    inner.coins.insert(outpoint, c);
                }
                None => {
                    inner.coins.remove(&outpoint);
                }
            }
        }
        inner.best_block = Some(delta.best_block);
        Ok(())
    }

    fn coin_count(&self) -> Result<u64, StorageError> {
        Ok(self.inner.lock().coins.len() as u64)
    }
}

/// In-memory [`UndoLog`] for tests.
pub struct MemoryUndoLog {
    records: Mutex<HashMap<Hash256, BlockUndo>>,
}

impl MemoryUndoLog {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryUndoLog {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoLog for MemoryUndoLog {
    fn append(&self, block_hash: &Hash256, undo: &BlockUndo) -> Result<(), StorageError> {
        self.records.lock().insert(*block_hash, undo.clone());
        Ok(())
    }

    fn read(&self, block_hash: &Hash256) -> Result<Option<BlockUndo>, StorageError> {
        Ok(self.records.lock().get(block_hash).cloned())
    }

    fn remove(&self, block_hash: &Hash256) -> Result<(), StorageError> {
        self.records.lock().remove(block_hash);
        Ok(())
    }
}

/// In-memory [`BlockStore`] for tests.
pub struct MemoryBlockStore {
    blocks: Mutex<HashMap<Hash256, Block>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for MemoryBlockStore {
    fn put_block(&self, block: &Block) -> Result<(), StorageError> {
        self.blocks.lock().insert(block.header.hash(), block.clone());
        Ok(())
    }

    fn block(&self, hash: &Hash256) -> Result<Option<Block>, StorageError> {
        Ok(self.blocks.lock().get(hash).cloned())
    }
}
