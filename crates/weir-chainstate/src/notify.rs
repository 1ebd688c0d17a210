//! Chain event notifications.
//!
//! Listeners observe connects, disconnects, and tip updates. Events fire
//! after the corresponding state is durable, in chain order, from inside
//! the serialization region — listeners must not call back into the
//! engine and should hand work off quickly.

use parking_lot::RwLock;
use std::sync::Arc;

use weir_core::types::{Block, Hash256, Transaction};

/// Why a transaction left the mempool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Confirmed by a connected block.
    Included,
    /// A connected block spent one of its inputs.
    Conflict,
    /// Pushed out by higher-paying entries when the pool was full.
    Evicted,
    /// Sat unconfirmed past the expiry window.
    Expired,
}

/// Observer of chain-state transitions. All methods have empty defaults so
/// listeners implement only what they care about.
pub trait ChainListener: Send + Sync {
    /// A block was connected to the active chain.
    fn block_connected(&self, _block: &Block, _height: u64) {}

    /// A block was disconnected during a reorganization.
    fn block_disconnected(&self, _block: &Block, _height: u64) {}

    /// A transaction entered the mempool.
    fn transaction_added(&self, _tx: &Transaction) {}

    /// A transaction left the mempool.
    fn transaction_removed(&self, _tx: &Transaction, _reason: RemovalReason) {}

    /// The active tip changed. Fires once per tip movement, after any
    /// connect/disconnect events for the step.
    fn tip_updated(&self, _hash: &Hash256, _height: u64, _chain_work: u128) {}
}

/// Fan-out dispatcher over registered listeners.
pub struct Notifier {
    listeners: RwLock<Vec<Arc<dyn ChainListener>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, listener: Arc<dyn ChainListener>) {
        self.listeners.write().push(listener);
    }

    pub fn block_connected(&self, block: &Block, height: u64) {
        for l in self.listeners.read().iter() {
            l.block_connected(block, height);
        }
    }

    pub fn block_disconnected(&self, block: &Block, height: u64) {
        for l in self.listeners.read().iter() {
            l.block_disconnected(block, height);
        }
    }

    pub fn transaction_added(&self, tx: &Transaction) {
        for l in self.listeners.read().iter() {
            l.transaction_added(tx);
        }
    }

    pub fn transaction_removed(&self, tx: &Transaction, reason: RemovalReason) {
        for l in self.listeners.read().iter() {
            l.transaction_removed(tx, reason);
        }
    }

    pub fn tip_updated(&self, hash: &Hash256, height: u64, chain_work: u128) {
        for l in self.listeners.read().iter() {
            l.tip_updated(hash, height, chain_work);
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
