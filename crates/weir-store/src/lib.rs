//! # weir-store
//! RocksDB persistence for the Weir chain state.
//!
//! [`RocksStore`] implements the `weir-chainstate` storage traits over
//! column families for coins, blocks, undo records, and metadata. All
//! mutations go through an atomic [`WriteBatch`], so the coin set and the
//! best-block marker always move together.

use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};

use weir_chainstate::store::{BlockStore, CoinStore, CoinsDelta, UndoLog};
use weir_chainstate::undo::BlockUndo;
use weir_core::error::StorageError;
use weir_core::types::{Block, Coin, Hash256, OutPoint};

// --- Column family names ---

const CF_COINS: &str = "coins";
const CF_BLOCKS: &str = "blocks";
const CF_UNDO: &str = "undo";
const CF_METADATA: &str = "metadata";

const ALL_CFS: &[&str] = &[CF_COINS, CF_BLOCKS, CF_UNDO, CF_METADATA];

// --- Metadata keys ---

const META_BEST_BLOCK: &[u8] = b"best_block";
const META_COIN_COUNT: &[u8] = b"coin_count";

/// RocksDB-backed durable store for the coin set, block bodies, and undo
/// records.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a database at the given path, creating all column
    /// families as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(Self { db })
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(|e| StorageError::Io(e.to_string()))
    }

    /// Merge SSTables and reclaim space from deleted keys across all
    /// column families.
    pub fn compact(&self) {
        for cf_name in ALL_CFS {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.compact_range_cf(&cf, None::<&[u8]>, None::<&[u8]>);
            }
        }
    }

    // --- Internal helpers ---

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::Corrupt(format!("missing column family: {name}")))
    }

    fn encode_outpoint(outpoint: &OutPoint) -> Result<Vec<u8>, StorageError> {
        bincode::encode_to_vec(outpoint, bincode::config::standard())
            .map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    fn get_meta_u64(&self, key: &[u8]) -> Result<u64, StorageError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StorageError::Io(e.to_string()))?
        {
            Some(bytes) => {
                let fixed: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StorageError::Corrupt("invalid metadata value length".into()))?;
                Ok(u64::from_le_bytes(fixed))
            }
            None => Ok(0),
        }
    }
}

impl CoinStore for RocksStore {
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, StorageError> {
        let cf = self.cf_handle(CF_COINS)?;
        let key = Self::encode_outpoint(outpoint)?;
        match self
            .db
            .get_cf(&cf, &key)
            .map_err(|e| StorageError::Io(e.to_string()))?
        {
            Some(data) => {
                let (coin, _): (Coin, _) =
                    bincode::decode_from_slice(&data, bincode::config::standard())
                        .map_err(|e| StorageError::Corrupt(e.to_string()))?;
                Ok(Some(coin))
            }
            None => Ok(None),
        }
    }

    fn best_block(&self) -> Result<Option<Hash256>, StorageError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self
            .db
            .get_cf(&cf, META_BEST_BLOCK)
            .map_err(|e| StorageError::Io(e.to_string()))?
        {
            Some(bytes) => {
                let fixed: [u8; 32] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StorageError::Corrupt("invalid best-block length".into()))?;
                Ok(Some(Hash256(fixed)))
            }
            None => Ok(None),
        }
    }

    fn apply_delta(&self, delta: CoinsDelta) -> Result<(), StorageError> {
        let cf_coins = self.cf_handle(CF_COINS)?;
        let cf_meta = self.cf_handle(CF_METADATA)?;

        let mut batch = WriteBatch::default();
        let mut count = self.get_meta_u64(META_COIN_COUNT)? as i64;

        for (outpoint, coin) in &delta.writes {
            let key = Self::encode_outpoint(outpoint)?;
            let existed = self
                .db
                .get_cf(&cf_coins, &key)
                .map_err(|e| StorageError::Io(e.to_string()))?
                .is_some();
            match coin {
                Some(coin) => {
                    let value = bincode::encode_to_vec(coin, bincode::config::standard())
                        .map_err(|e| StorageError::Corrupt(e.to_string()))?;
                    batch.put_cf(cf_coins, &key, &value);
                    if !existed {
                        count += 1;
                    }
                }
                None => {
                    batch.delete_cf(cf_coins, &key);
                    if existed {
                        count -= 1;
                    }
                }
            }
        }

        batch.put_cf(cf_meta, META_COIN_COUNT, (count.max(0) as u64).to_le_bytes());
        batch.put_cf(cf_meta, META_BEST_BLOCK, delta.best_block.as_bytes());

        self.db
            .write(batch)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        tracing::debug!(
            best_block = %delta.best_block,
            writes = delta.writes.len(),
            "flushed coin delta"
        );
        Ok(())
    }

    fn coin_count(&self) -> Result<u64, StorageError> {
        self.get_meta_u64(META_COIN_COUNT)
    }
}

impl UndoLog for RocksStore {
    fn append(&self, block_hash: &Hash256, undo: &BlockUndo) -> Result<(), StorageError> {
        let cf = self.cf_handle(CF_UNDO)?;
        let bytes = bincode::encode_to_vec(undo, bincode::config::standard())
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        self.db
            .put_cf(&cf, block_hash.as_bytes(), &bytes)
            .map_err(|e| StorageError::Io(e.to_string()))
    }

    fn read(&self, block_hash: &Hash256) -> Result<Option<BlockUndo>, StorageError> {
        let cf = self.cf_handle(CF_UNDO)?;
        match self
            .db
            .get_cf(&cf, block_hash.as_bytes())
            .map_err(|e| StorageError::Io(e.to_string()))?
        {
            Some(data) => {
                let (undo, _): (BlockUndo, _) =
                    bincode::decode_from_slice(&data, bincode::config::standard())
                        .map_err(|e| StorageError::Corrupt(e.to_string()))?;
                Ok(Some(undo))
            }
            None => Ok(None),
        }
    }

    fn remove(&self, block_hash: &Hash256) -> Result<(), StorageError> {
        let cf = self.cf_handle(CF_UNDO)?;
        self.db
            .delete_cf(&cf, block_hash.as_bytes())
            .map_err(|e| StorageError::Io(e.to_string()))
    }
}

impl BlockStore for RocksStore {
    fn put_block(&self, block: &Block) -> Result<(), StorageError> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        let bytes = bincode::encode_to_vec(block, bincode::config::standard())
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        self.db
            .put_cf(&cf, block.header.hash().as_bytes(), &bytes)
            .map_err(|e| StorageError::Io(e.to_string()))
    }

    fn block(&self, hash: &Hash256) -> Result<Option<Block>, StorageError> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        match self
            .db
            .get_cf(&cf, hash.as_bytes())
            .map_err(|e| StorageError::Io(e.to_string()))?
        {
            Some(data) => {
                let (block, _): (Block, _) =
                    bincode::decode_from_slice(&data, bincode::config::standard())
                        .map_err(|e| StorageError::Corrupt(e.to_string()))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_chainstate::undo::{SpentCoin, TxUndo};
    use weir_core::types::TxOutput;

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn temp_store() -> (RocksStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path().join("chaindata")).unwrap();
        (store, dir)
    }

    fn coin(value: u64) -> Coin {
        Coin {
            output: TxOutput {
                value,
                pubkey_hash: Hash256([0xAA; 32]),
            },
            height: 3,
            is_coinbase: false,
            is_coinstake: false,
        }
    }

    fn op(byte: u8) -> OutPoint {
        OutPoint {
            txid: Hash256([byte; 32]),
            index: 0,
        }
    }

    // ------------------------------------------------------------------
    // Coin store
    // ------------------------------------------------------------------

    #[test]
    fn fresh_store_is_empty() {
        let (store, _dir) = temp_store();
        assert_eq!(store.best_block().unwrap(), None);
        assert_eq!(store.coin_count().unwrap(), 0);
        assert!(store.coin(&op(1)).unwrap().is_none());
    }

    #[test]
    fn delta_round_trips_coins_and_marker() {
        let (store, _dir) = temp_store();
        let best = Hash256([0x11; 32]);
        store
            .apply_delta(CoinsDelta {
                best_block: best,
                writes: vec![(op(1), Some(coin(500))), (op(2), Some(coin(700)))],
            })
            .unwrap();

        assert_eq!(store.best_block().unwrap(), Some(best));
        assert_eq!(store.coin_count().unwrap(), 2);
        assert_eq!(store.coin(&op(1)).unwrap().unwrap().output.value, 500);
        assert_eq!(store.coin(&op(2)).unwrap().unwrap().output.value, 700);
    }

    #[test]
    fn delete_write_removes_coin_and_adjusts_count() {
        let (store, _dir) = temp_store();
        store
            .apply_delta(CoinsDelta {
                best_block: Hash256([0x11; 32]),
                writes: vec![(op(1), Some(coin(500)))],
            })
            .unwrap();
        store
            .apply_delta(CoinsDelta {
                best_block: Hash256([0x22; 32]),
                writes: vec![(op(1), None)],
            })
            .unwrap();

        assert!(store.coin(&op(1)).unwrap().is_none());
        assert_eq!(store.coin_count().unwrap(), 0);
        assert_eq!(store.best_block().unwrap(), Some(Hash256([0x22; 32])));
    }

    #[test]
    fn overwrite_does_not_double_count() {
        let (store, _dir) = temp_store();
        store
            .apply_delta(CoinsDelta {
                best_block: Hash256([0x11; 32]),
                writes: vec![(op(1), Some(coin(500)))],
            })
            .unwrap();
        store
            .apply_delta(CoinsDelta {
                best_block: Hash256([0x22; 32]),
                writes: vec![(op(1), Some(coin(900)))],
            })
            .unwrap();

        assert_eq!(store.coin_count().unwrap(), 1);
        assert_eq!(store.coin(&op(1)).unwrap().unwrap().output.value, 900);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chaindata");
        let best = Hash256([0x33; 32]);
        {
            let store = RocksStore::open(&path).unwrap();
            store
                .apply_delta(CoinsDelta {
                    best_block: best,
                    writes: vec![(op(7), Some(coin(1_234)))],
                })
                .unwrap();
            store.flush().unwrap();
        }
        let store = RocksStore::open(&path).unwrap();
        assert_eq!(store.best_block().unwrap(), Some(best));
        assert_eq!(store.coin(&op(7)).unwrap().unwrap().output.value, 1_234);
        assert_eq!(store.coin_count().unwrap(), 1);
    }

    // ------------------------------------------------------------------
    // Undo log
    // ------------------------------------------------------------------

    #[test]
    fn undo_log_round_trip() {
        let (store, _dir) = temp_store();
        let hash = Hash256([0x44; 32]);
        let mut undo = BlockUndo::new(9);
        undo.txs.push(TxUndo::default());
        undo.txs.push(TxUndo {
            spent: vec![SpentCoin {
                outpoint: op(5),
                coin: coin(800),
                has_metadata: true,
            }],
        });

        assert!(store.read(&hash).unwrap().is_none());
        store.append(&hash, &undo).unwrap();

        let back = store.read(&hash).unwrap().unwrap();
        assert_eq!(back.height, 9);
        assert_eq!(back.spent_count(), 1);
        assert_eq!(back.txs[1].spent[0].coin.output.value, 800);

        store.remove(&hash).unwrap();
        assert!(store.read(&hash).unwrap().is_none());
    }

    // ------------------------------------------------------------------
    // Block store
    // ------------------------------------------------------------------

    #[test]
    fn block_store_round_trip() {
        use weir_core::types::{BlockHeader, Transaction, TxInput};

        let (store, _dir) = temp_store();
        let block = Block {
            header: BlockHeader {
                version: 1,
                prev_hash: Hash256::ZERO,
                merkle_root: Hash256([0x66; 32]),
                timestamp: 1_700_000_000,
                difficulty_target: u64::MAX,
                nonce: 42,
                state_commitment: Hash256::ZERO,
            },
            transactions: vec![Transaction {
                version: 1,
                inputs: vec![TxInput {
                    previous_output: OutPoint::null(),
                    signature: vec![0, 0, 0, 0, 0, 0, 0, 0],
                    public_key: vec![],
                }],
                outputs: vec![TxOutput {
                    value: 50,
                    pubkey_hash: Hash256([0x77; 32]),
                }],
                lock_time: 0,
            }],
        };
        let hash = block.header.hash();

        assert!(!store.contains(&hash).unwrap());
        store.put_block(&block).unwrap();
        assert!(store.contains(&hash).unwrap());
        assert_eq!(store.block(&hash).unwrap().unwrap(), block);
    }
}
