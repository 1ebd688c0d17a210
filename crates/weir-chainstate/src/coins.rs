//! Layered in-memory view of the UTXO set.
//!
//! A [`CoinsCache`] sits over any [`CoinsBackend`] — the durable store via
//! [`StoreBackend`], or another cache. The engine keeps one long-lived
//! cache over the store and opens a short-lived child cache per block
//! connect or disconnect, so a failed apply is discarded by dropping the
//! child and the parent view is never half-mutated.
//!
//! Entries track two flags. `dirty` means the entry differs from the
//! backend and must be written on flush. `fresh` means the backend has
//! never seen this coin, so a create followed by a spend in the same layer
//! annihilates to nothing instead of flushing a delete.

use std::collections::HashMap;
use std::sync::Arc;

use weir_core::error::StorageError;
use weir_core::types::{Coin, Hash256, OutPoint};

use crate::store::{CoinStore, CoinsDelta};

/// Read-only coin lookup a [`CoinsCache`] layers over.
pub trait CoinsBackend {
    fn backend_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, StorageError>;
}

impl<T: CoinsBackend + ?Sized> CoinsBackend for &T {
    fn backend_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, StorageError> {
        (**self).backend_coin(outpoint)
    }
}

/// Adapter making an `Arc<dyn CoinStore>` usable as a cache backend.
pub struct StoreBackend {
    store: Arc<dyn CoinStore>,
}

impl StoreBackend {
    pub fn new(store: Arc<dyn CoinStore>) -> Self {
        Self { store }
    }
}

impl CoinsBackend for StoreBackend {
    fn backend_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, StorageError> {
        self.store.coin(outpoint)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    /// `None` marks a coin spent in this layer.
    coin: Option<Coin>,
    dirty: bool,
    fresh: bool,
}

/// Dirty entries extracted from a child cache, to be absorbed by its
/// parent.
pub struct CacheWrites {
    pub best_block: Option<Hash256>,
    writes: Vec<(OutPoint, Option<Coin>, bool)>, // (outpoint, coin, fresh)
}

/// Write-back coin cache over a [`CoinsBackend`].
pub struct CoinsCache<B> {
    backend: B,
    entries: HashMap<OutPoint, CacheEntry>,
    best_block: Option<Hash256>,
}

impl<B: CoinsBackend> CoinsCache<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            entries: HashMap::new(),
            best_block: None,
        }
    }

    /// Block hash this view corresponds to, if set.
    pub fn best_block(&self) -> Option<Hash256> {
        self.best_block
    }

    pub fn set_best_block(&mut self, hash: Hash256) {
        self.best_block = Some(hash);
    }

    /// Number of entries currently cached.
    pub fn cached_len(&self) -> usize {
        self.entries.len()
    }

    /// Drop a cached entry without touching the backend. Entries with
    /// unflushed state (dirty or fresh) are kept; only a clean read-through
    /// copy may be evicted.
    pub fn uncache(&mut self, outpoint: &OutPoint) {
        if let Some(entry) = self.entries.get(outpoint) {
            if !entry.dirty && !entry.fresh {
                self.entries.remove(outpoint);
            }
        }
    }

    /// Fetch a coin, pulling it into the cache on a backend hit.
    pub fn coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>, StorageError> {
        if let Some(entry) = self.entries.get(outpoint) {
            return Ok(entry.coin.clone());
        }
        match self.backend.backend_coin(outpoint)? {
            Some(coin) => {
                self.entries.insert(
                    outpoint.clone(),
                    CacheEntry {
                        coin: Some(coin.clone()),
                        dirty: false,
                        fresh: false,
                    },
                );
                Ok(Some(coin))
            }
            None => Ok(None),
        }
    }

    /// Whether an unspent coin exists at this outpoint.
    pub fn have_coin(&mut self, outpoint: &OutPoint) -> Result<bool, StorageError> {
        Ok(self.coin(outpoint)?.is_some())
    }

    /// Create a coin.
    ///
    /// `overwrite` is only set when restoring coins from undo data, where
    /// the outpoint legitimately existed before. Otherwise an existing
    /// unspent coin at the same outpoint means the state is corrupt:
    /// transaction IDs are hashes of distinct content, so a double create
    /// cannot happen on valid input.
    pub fn add_coin(
        &mut self,
        outpoint: OutPoint,
        coin: Coin,
        overwrite: bool,
    ) -> Result<(), StorageError> {
        let fresh = match self.entries.get(&outpoint) {
            Some(entry) => {
                if entry.coin.is_some() && !overwrite {
                    return Err(StorageError::Corrupt(format!(
                        "coin already exists at {outpoint}"
                    )));
                }
                // A spent fresh entry means the backend never saw the coin.
                entry.coin.is_none() && entry.fresh
            }
            None => !overwrite,
        };
        self.entries.insert(
            outpoint,
            CacheEntry {
                coin: Some(coin),
                dirty: true,
                fresh,
            },
        );
        Ok(())
    }

    /// Spend a coin, returning it. `Ok(None)` if no unspent coin exists.
    pub fn spend_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>, StorageError> {
        let Some(coin) = self.coin(outpoint)? else {
            return Ok(None);
        };
        // Entry exists after the fetch above.
        if let Some(entry) = self.entries.get_mut(outpoint) {
            if entry.fresh {
                // Created and spent in this layer: nothing to flush.
                self.entries.remove(outpoint);
            } else {
                entry.coin = None;
                entry.dirty = true;
            }
        }
        Ok(Some(coin))
    }

    /// Consume the cache, returning its dirty entries for the parent to
    /// absorb.
    pub fn into_writes(self) -> CacheWrites {
        let writes = self
            .entries
            .into_iter()
            .filter(|(_, e)| e.dirty)
            .map(|(op, e)| (op, e.coin, e.fresh))
            .collect();
        CacheWrites {
            best_block: self.best_block,
            writes,
        }
    }

    /// Absorb a child cache's writes into this layer.
    pub fn absorb(&mut self, child: CacheWrites) {
        for (outpoint, coin, child_fresh) in child.writes {
            match self.entries.get_mut(&outpoint) {
                Some(entry) => {
                    if coin.is_none() && entry.fresh {
                        // Spend of a coin this layer created: annihilate.
                        self.entries.remove(&outpoint);
                    } else {
                        entry.coin = coin;
                        entry.dirty = true;
                    }
                }
                None => {
                    self.entries.insert(
                        outpoint,
                        CacheEntry {
                            coin,
                            dirty: true,
                            fresh: child_fresh,
                        },
                    );
                }
            }
        }
        if let Some(best) = child.best_block {
            self.best_block = Some(best);
        }
    }

    /// Drain all entries into a flushable delta.
    ///
    /// Fresh spent entries never reach here (they are removed on spend);
    /// fresh unspent entries become inserts and everything dirty-spent
    /// becomes a delete. Clean entries are dropped.
    pub fn take_delta(&mut self) -> Result<CoinsDelta, StorageError> {
        let best_block = self.best_block.ok_or_else(|| {
            StorageError::Corrupt("flush without a best block".into())
        })?;
        let writes = self
            .entries
            .drain()
            .filter(|(_, e)| e.dirty)
            .map(|(op, e)| (op, e.coin))
            .collect();
        Ok(CoinsDelta { best_block, writes })
    }
}

impl<B: CoinsBackend> CoinsBackend for CoinsCache<B> {
    fn backend_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, StorageError> {
        match self.entries.get(outpoint) {
            Some(entry) => Ok(entry.coin.clone()),
            None => self.backend.backend_coin(outpoint),
        }
    }
}
