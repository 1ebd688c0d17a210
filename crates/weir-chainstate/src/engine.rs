//! The chain-state engine: block acceptance, best-chain activation, and
//! the public query surface.
//!
//! All chain mutation happens inside one `Mutex<ChainInner>` — the
//! serialization region. Acceptance and activation run under it; between
//! activation batches the lock is released so readers and concurrent
//! submitters interleave with long reorganizations. Durable writes follow
//! a fixed order per connected block: undo record first, then the coin
//! delta with the best-block marker, then notifications. A crash between
//! the two leaves a stale undo record, which is harmless.
//!
//! A storage fault anywhere flips the engine into a halted state: every
//! subsequent call fails fast rather than risk diverging from the durable
//! set. Shutdown is cooperative and separate: a stop request is honored
//! between blocks, never mid-block, and connected blocks stay connected.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use weir_core::block_validation::{
    check_block, contextual_check_block, contextual_check_header, HeaderContext,
};
use weir_core::error::{BlockError, StorageError, WeirError};
use weir_core::params::{ChainParams, EngineConfig};
use weir_core::script::{ProofCheck, ScriptVerifier};
use weir_core::types::{Block, Coin, Hash256, OutPoint, Transaction};

use crate::apply::{apply_block, undo_block, DisconnectOutcome};
use crate::block_index::{ActiveChain, BlockIndex, CandidateKey, NodeId, ValidityTier};
use crate::coins::{CoinsCache, StoreBackend};
use crate::fork_guard::check_fork_block;
use crate::mempool::Mempool;
use crate::notify::{ChainListener, Notifier, RemovalReason};
use crate::store::{BlockStore, CoinStore, UndoLog};

/// Injectable clock, unix seconds.
pub type Clock = Box<dyn Fn() -> u64 + Send + Sync>;

/// How a submitted block was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Accepted and now part of the active chain.
    Connected,
    /// Accepted onto a side branch; not (yet) the best chain.
    SideChain,
    /// Already known with data.
    Duplicate,
    /// Parent unknown; held until it arrives.
    Held,
}

/// Maximum blocks parked per unknown parent, and parents tracked overall.
const MAX_HELD_PER_PARENT: usize = 8;
const MAX_HELD_PARENTS: usize = 256;

enum ConnectResult {
    Connected(Block),
    Invalid(WeirError),
    MissingData,
}

struct ChainInner {
    index: BlockIndex,
    active: ActiveChain,
    coins: CoinsCache<StoreBackend>,
    /// Viable leaves ordered worst-to-best.
    candidates: BTreeSet<CandidateKey>,
    /// Blocks waiting for an unknown parent, keyed by that parent's hash.
    held: HashMap<Hash256, Vec<Block>>,
    mempool: Mempool,
}

/// The chain-state engine. Cheap to share behind an `Arc`; all methods
/// take `&self`.
pub struct ChainEngine {
    inner: Mutex<ChainInner>,
    params: ChainParams,
    config: EngineConfig,
    script: Arc<dyn ScriptVerifier>,
    proof: Arc<dyn ProofCheck>,
    store: Arc<dyn CoinStore>,
    undo_log: Arc<dyn UndoLog>,
    blocks: Arc<dyn BlockStore>,
    notifier: Notifier,
    clock: Clock,
    halted: AtomicBool,
    stopping: AtomicBool,
}

impl ChainEngine {
    /// Create an engine over the given stores and connect the genesis
    /// block if the store is empty.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: ChainParams,
        config: EngineConfig,
        genesis: Block,
        script: Arc<dyn ScriptVerifier>,
        proof: Arc<dyn ProofCheck>,
        store: Arc<dyn CoinStore>,
        undo_log: Arc<dyn UndoLog>,
        blocks: Arc<dyn BlockStore>,
        clock: Option<Clock>,
    ) -> Result<Self, WeirError> {
        let clock = clock.unwrap_or_else(|| {
            Box::new(|| {
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0)
            })
        });

        check_block(&genesis, proof.as_ref())?;
        let genesis_hash = genesis.header.hash();
        let genesis_work = proof.header_work(&genesis.header);

        let mut index = BlockIndex::new();
        let mut active = ActiveChain::new();
        let mut coins = CoinsCache::new(StoreBackend::new(store.clone()));

        let genesis_id = index.insert_genesis(genesis.header.clone(), genesis_work);
        active.push(genesis_id);
        blocks.put_block(&genesis)?;

        match store.best_block()? {
            None => {
                // Fresh store: materialize the genesis coin set.
                let undo = apply_block(
                    &genesis,
                    0,
                    0,
                    &mut coins,
                    &params,
                    script.as_ref(),
                )?;
                undo_log.append(&genesis_hash, &undo)?;
                store.apply_delta(coins.take_delta()?)?;
            }
            Some(best) if best == genesis_hash => {}
            Some(best) => {
                // The store outlived a previous run. Walk the persisted
                // blocks back from its best-block marker to genesis, then
                // rebuild the index and active chain forward. The coin set
                // is already durable; only the in-memory structures need
                // replaying.
                let mut chain = Vec::new();
                let mut cursor = best;
                while cursor != genesis_hash {
                    let block = blocks.block(&cursor)?.ok_or_else(|| {
                        StorageError::Corrupt(format!(
                            "persisted tip {best} unreachable: block {cursor} missing"
                        ))
                    })?;
                    cursor = block.header.prev_hash;
                    chain.push(block);
                }
                chain.reverse();
                for block in &chain {
                    let work = proof.header_work(&block.header);
                    let id = index
                        .insert(block.header.clone(), work, true)
                        .map_err(|e| {
                            StorageError::Corrupt(format!("persisted chain broken: {e}"))
                        })?;
                    index.set_tier(id, ValidityTier::Applied);
                    active.push(id);
                }
                tracing::info!(tip = %best, height = chain.len(), "resumed persisted chain");
            }
        }
        coins.set_best_block(store.best_block()?.unwrap_or(genesis_hash));

        let mut candidates = BTreeSet::new();
        let tip = active.tip().unwrap_or(genesis_id);
        candidates.insert(index.candidate_key(tip));

        let mempool = Mempool::new(&config);
        Ok(Self {
            inner: Mutex::new(ChainInner {
                index,
                active,
                coins,
                candidates,
                held: HashMap::new(),
                mempool,
            }),
            params,
            config,
            script,
            proof,
            store,
            undo_log,
            blocks,
            notifier: Notifier::new(),
            clock,
            halted: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        })
    }

    pub fn register_listener(&self, listener: Arc<dyn ChainListener>) {
        self.notifier.register(listener);
    }

    /// Whether a storage fault has halted the engine.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Request a cooperative stop. In-flight per-block work completes;
    /// the activation loop exits at the next block boundary and connected
    /// blocks stay connected.
    pub fn request_shutdown(&self) {
        tracing::info!("shutdown requested");
        self.stopping.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn check_running(&self) -> Result<(), WeirError> {
        if self.is_halted() {
            return Err(StorageError::Corrupt("engine halted after storage fault".into()).into());
        }
        Ok(())
    }

    /// Record a fatal storage fault and halt all further processing.
    fn halt(&self, err: &StorageError) {
        tracing::error!(error = %err, "storage fault; halting chain engine");
        self.halted.store(true, Ordering::SeqCst);
    }

    fn fatal_guard<T>(&self, result: Result<T, WeirError>) -> Result<T, WeirError> {
        if let Err(WeirError::Storage(e)) = &result {
            self.halt(e);
        }
        result
    }

    /// Submit a block for validation and possible connection.
    ///
    /// Runs acceptance under the serialization region, then drives
    /// best-chain activation. Held and duplicate submissions return their
    /// outcome without error.
    pub fn submit_block(&self, block: Block) -> Result<AcceptOutcome, WeirError> {
        self.check_running()?;
        let result = self.submit_block_inner(block);
        self.fatal_guard(result)
    }

    fn submit_block_inner(&self, block: Block) -> Result<AcceptOutcome, WeirError> {
        let hash = block.header.hash();
        let outcome = {
            let mut inner = self.inner.lock();
            let outcome = self.accept_block(&mut inner, block)?;
            // Anything parked on a newly linked block links in now too.
            self.link_held(&mut inner);
            outcome
        };
        if outcome == AcceptOutcome::Duplicate || outcome == AcceptOutcome::Held {
            return Ok(outcome);
        }
        self.activate_best_chain(Some(hash))?;

        // Activation may have connected the block, reorganized onto its
        // branch, or left it on a side branch.
        let inner = self.inner.lock();
        match inner.index.get(&hash) {
            Some(id) if inner.active.contains(id, &inner.index) => Ok(AcceptOutcome::Connected),
            Some(_) => Ok(AcceptOutcome::SideChain),
            None => Ok(AcceptOutcome::Held),
        }
    }

    /// Stateless + contextual acceptance of a single block into the index.
    fn accept_block(
        &self,
        inner: &mut ChainInner,
        block: Block,
    ) -> Result<AcceptOutcome, WeirError> {
        let hash = block.header.hash();
        if let Some(id) = inner.index.get(&hash) {
            if inner.index.node(id).have_data {
                return Ok(AcceptOutcome::Duplicate);
            }
        }

        check_block(&block, self.proof.as_ref())?;

        let Some(parent) = inner.index.get(&block.header.prev_hash) else {
            self.hold_block(inner, block);
            return Ok(AcceptOutcome::Held);
        };
        let parent_node = inner.index.node(parent);
        if !parent_node.is_viable() {
            // Linking under a failed branch: fail it too without wasting
            // an apply attempt.
            let work = self.proof.header_work(&block.header);
            let id = inner.index.insert(block.header.clone(), work, true)?;
            inner.index.set_tier(id, ValidityTier::Tree);
            return Err(BlockError::FailedAncestor.into());
        }

        let height = parent_node.height + 1;
        let ctx = HeaderContext {
            height,
            median_time_past: inner.index.median_time_past(parent),
            now: (self.clock)(),
        };
        contextual_check_header(&block.header, &ctx, &self.params)?;
        contextual_check_block(&block, height)?;

        check_fork_block(
            &block,
            parent,
            &inner.index,
            &inner.active,
            &mut inner.coins,
            self.blocks.as_ref(),
            self.undo_log.as_ref(),
            &self.params,
        )?;

        let work = self.proof.header_work(&block.header);
        let id = inner.index.insert(block.header.clone(), work, true)?;
        // A body arriving for a previously data-less header counts too.
        inner.index.set_have_data(id, true);
        inner.index.set_tier(id, ValidityTier::ContextChecked);
        self.blocks.put_block(&block)?;

        // The parent is no longer a leaf candidate; this block is.
        inner.candidates.remove(&inner.index.candidate_key(parent));
        inner.candidates.insert(inner.index.candidate_key(id));

        let on_active_parent = inner.active.tip() == Some(parent);
        tracing::info!(
            hash = %hash,
            height,
            work = %inner.index.node(id).chain_work,
            side_chain = !on_active_parent,
            "block accepted"
        );
        Ok(if on_active_parent {
            // Will connect in the activation pass that follows.
            AcceptOutcome::Connected
        } else {
            AcceptOutcome::SideChain
        })
    }

    fn hold_block(&self, inner: &mut ChainInner, block: Block) {
        if inner.held.len() >= MAX_HELD_PARENTS && !inner.held.contains_key(&block.header.prev_hash)
        {
            tracing::debug!(parent = %block.header.prev_hash, "held-block table full, dropping");
            return;
        }
        let slot = inner.held.entry(block.header.prev_hash).or_default();
        if slot.len() < MAX_HELD_PER_PARENT {
            tracing::debug!(
                hash = %block.header.hash(),
                parent = %block.header.prev_hash,
                "holding block until parent arrives"
            );
            slot.push(block);
        }
    }

    /// Re-attempt held blocks whose parent is now linked.
    fn link_held(&self, inner: &mut ChainInner) {
        loop {
            let ready: Vec<Hash256> = inner
                .held
                .keys()
                .filter(|parent| inner.index.get(parent).is_some())
                .copied()
                .collect();
            if ready.is_empty() {
                return;
            }
            for parent in ready {
                let Some(blocks) = inner.held.remove(&parent) else {
                    continue;
                };
                for block in blocks {
                    // Individual failures only affect this held block.
                    if let Err(e) = self.accept_block(inner, block) {
                        tracing::debug!(error = %e, "held block rejected after linking");
                    }
                }
            }
        }
    }

    /// Drive the active chain toward the best viable candidate, batch by
    /// batch. The region lock is dropped between batches so readers and
    /// other submitters interleave with deep reorganizations.
    ///
    /// A candidate that fails to connect is marked failed and activation
    /// continues with the next best; its rejection only surfaces to the
    /// caller when the failing block is `submitted` itself.
    fn activate_best_chain(&self, submitted: Option<Hash256>) -> Result<(), WeirError> {
        loop {
            if self.is_stopping() {
                return Ok(());
            }
            let mut inner = self.inner.lock();
            let Some(best) = self.best_candidate(&inner) else {
                return Ok(());
            };
            let tip_id = match inner.active.tip() {
                Some(t) => t,
                None => return Ok(()),
            };
            if best.id == tip_id || best.work <= inner.index.node(tip_id).chain_work {
                // Nothing beats the current tip.
                return Ok(());
            }

            let (progressed, reject) = self.step_toward(&mut inner, best.id)?;
            drop(inner);
            if let Some((hash, err)) = reject {
                if submitted == Some(hash) {
                    return Err(err);
                }
                tracing::warn!(hash = %hash, error = %err, "candidate branch invalidated");
            }
            if !progressed {
                return Ok(());
            }
        }
    }

    fn best_candidate(&self, inner: &ChainInner) -> Option<CandidateKey> {
        inner
            .candidates
            .iter()
            .rev()
            .find(|key| {
                let node = inner.index.node(key.id);
                node.is_viable() && node.have_data
            })
            .copied()
    }

    /// One bounded batch of disconnects/connects toward `target`. Returns
    /// whether any step succeeded, plus the rejection if a block on the
    /// path failed to connect.
    fn step_toward(
        &self,
        inner: &mut ChainInner,
        target: NodeId,
    ) -> Result<(bool, Option<(Hash256, WeirError)>), WeirError> {
        let tip = match inner.active.tip() {
            Some(t) => t,
            None => return Ok((false, None)),
        };
        let fork_point = inner.index.last_common_ancestor(tip, target);

        let mut steps = 0usize;
        let mut progressed = false;
        let mut reject: Option<(Hash256, WeirError)> = None;
        let mut displaced: Vec<Vec<Transaction>> = Vec::new();
        let mut connected_blocks: Vec<(Block, u64)> = Vec::new();

        // Phase one: rewind to the fork point. Disconnection runs tip
        // first, so `displaced` holds the newest block's payments first.
        while inner.active.tip() != Some(fork_point) && steps < self.config.connect_batch {
            let block = self.disconnect_tip(inner)?;
            displaced.push(block.transactions.into_iter().skip(1).collect());
            steps += 1;
            progressed = true;
        }

        // Phase two: connect along the path to the target.
        if inner.active.tip() == Some(fork_point) {
            let path = self.path_from(inner, fork_point, target);
            for id in path {
                if steps >= self.config.connect_batch {
                    break;
                }
                match self.connect_tip(inner, id)? {
                    ConnectResult::Connected(block) => {
                        let height = inner.index.node(id).height;
                        connected_blocks.push((block, height));
                        steps += 1;
                        progressed = true;
                    }
                    ConnectResult::Invalid(err) => {
                        // The branch was marked failed; restart candidate
                        // selection from the survivors.
                        reject = Some((inner.index.node(id).hash, err));
                        progressed = true;
                        break;
                    }
                    ConnectResult::MissingData => {
                        progressed = true;
                        break;
                    }
                }
            }
        }

        // Mempool maintenance and notifications happen after the durable
        // writes of the batch.
        for (block, _) in &connected_blocks {
            for (entry, reason) in inner.mempool.remove_for_block(block) {
                self.notifier.transaction_removed(&entry.tx, reason);
            }
        }
        if !displaced.is_empty() {
            let tip_id = inner.active.tip().unwrap_or(fork_point);
            let height = inner.index.node(tip_id).height + 1;
            let mtp = inner.index.median_time_past(tip_id);
            let now = (self.clock)();
            // Oldest block first so in-pool parents land before their
            // children; admission is best effort and displaced payments
            // may no longer qualify. The fee floor is waived: these were
            // already paid for once.
            for tx in displaced.into_iter().rev().flatten() {
                match self.readmit(inner, tx, height, mtp, now, true) {
                    Ok(_) => {}
                    Err(WeirError::Storage(e)) => return Err(WeirError::Storage(e)),
                    Err(err) => {
                        tracing::debug!(error = %err, "displaced transaction not readmitted");
                    }
                }
            }
        }

        for (block, height) in &connected_blocks {
            self.notifier.block_connected(block, *height);
        }
        if progressed {
            if let Some(tip) = inner.active.tip() {
                let node = inner.index.node(tip);
                self.notifier.tip_updated(&node.hash, node.height, node.chain_work);
                tracing::info!(
                    hash = %node.hash,
                    height = node.height,
                    "active tip updated"
                );
            }
        }
        Ok((progressed, reject))
    }

    fn readmit(
        &self,
        inner: &mut ChainInner,
        tx: Transaction,
        height: u64,
        mtp: u64,
        now: u64,
        bypass_floor: bool,
    ) -> Result<Hash256, WeirError> {
        let ChainInner { coins, mempool, .. } = inner;
        let admitted = mempool.accept(
            tx,
            coins,
            height,
            mtp,
            now,
            &self.params,
            self.script.as_ref(),
            bypass_floor,
        )?;
        for entry in &admitted.evicted {
            self.notifier
                .transaction_removed(&entry.tx, RemovalReason::Evicted);
        }
        if let Some(entry) = mempool.get(&admitted.txid) {
            self.notifier.transaction_added(&entry.tx);
        }
        Ok(admitted.txid)
    }

    /// Nodes between `from` (exclusive) and `to` (inclusive), ascending.
    fn path_from(&self, inner: &ChainInner, from: NodeId, to: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut cursor = to;
        while cursor != from {
            path.push(cursor);
            match inner.index.node(cursor).parent {
                Some(p) => cursor = p,
                None => break,
            }
        }
        path.reverse();
        path
    }

    /// Disconnect the current tip, returning its block for mempool
    /// re-admission.
    fn disconnect_tip(&self, inner: &mut ChainInner) -> Result<Block, WeirError> {
        let tip = inner
            .active
            .tip()
            .ok_or_else(|| StorageError::Corrupt("disconnect on empty chain".into()))?;
        let node = inner.index.node(tip);
        let hash = node.hash;
        let height = node.height;

        let block = self
            .blocks
            .block(&hash)?
            .ok_or_else(|| StorageError::Corrupt(format!("tip block {hash} missing")))?;
        let undo = self
            .undo_log
            .read(&hash)?
            .ok_or_else(|| StorageError::MissingUndo(hash.to_string()))?;

        let mut child = CoinsCache::new(&inner.coins);
        let outcome = undo_block(&block, &undo, &mut child)?;
        if outcome == DisconnectOutcome::Unclean {
            tracing::warn!(hash = %hash, height, "unclean disconnect, continuing");
        }
        let writes = child.into_writes();
        inner.coins.absorb(writes);
        self.store.apply_delta(inner.coins.take_delta()?)?;
        self.undo_log.remove(&hash)?;

        inner.active.pop();
        // The disconnected block remains a candidate leaf; its parent is
        // the tip again but may be re-extended either way.
        inner.candidates.insert(inner.index.candidate_key(tip));

        self.notifier.block_disconnected(&block, height);
        tracing::info!(hash = %hash, height, "tip disconnected");
        Ok(block)
    }

    /// Connect `id` on top of the current tip.
    fn connect_tip(&self, inner: &mut ChainInner, id: NodeId) -> Result<ConnectResult, WeirError> {
        let node = inner.index.node(id);
        let hash = node.hash;
        let height = node.height;
        debug_assert_eq!(inner.active.tip(), node.parent);

        let Some(block) = self.blocks.block(&hash)? else {
            inner.index.set_have_data(id, false);
            inner.candidates.remove(&inner.index.candidate_key(id));
            return Ok(ConnectResult::MissingData);
        };
        let parent = node.parent.ok_or_else(|| {
            StorageError::Corrupt("connect_tip on a parentless block".into())
        })?;
        let mtp = inner.index.median_time_past(parent);

        let mut child = CoinsCache::new(&inner.coins);
        match apply_block(
            &block,
            height,
            mtp,
            &mut child,
            &self.params,
            self.script.as_ref(),
        ) {
            Ok(undo) => {
                let writes = child.into_writes();
                inner.coins.absorb(writes);
                // Undo record first, then the coin delta: recovery needs
                // the record for any block the marker says is connected.
                self.undo_log.append(&hash, &undo)?;
                self.store.apply_delta(inner.coins.take_delta()?)?;

                inner.index.set_tier(id, ValidityTier::Applied);
                inner.active.push(id);
                Ok(ConnectResult::Connected(block))
            }
            Err(WeirError::Storage(e)) => Err(WeirError::Storage(e)),
            Err(reject) => {
                // Invalid against its real position: the block and every
                // descendant can never connect.
                drop(child);
                tracing::warn!(hash = %hash, height, error = %reject, "block failed to connect");
                inner.index.mark_failed(id);
                let stale: Vec<CandidateKey> = inner
                    .candidates
                    .iter()
                    .filter(|k| !inner.index.node(k.id).is_viable())
                    .copied()
                    .collect();
                for key in stale {
                    inner.candidates.remove(&key);
                }
                Ok(ConnectResult::Invalid(reject))
            }
        }
    }

    /// Submit a transaction for mempool admission.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<Hash256, WeirError> {
        self.check_running()?;
        let mut inner = self.inner.lock();
        let tip = inner
            .active
            .tip()
            .ok_or_else(|| StorageError::Corrupt("no active tip".into()))?;
        let height = inner.index.node(tip).height + 1;
        let mtp = inner.index.median_time_past(tip);
        let now = (self.clock)();
        let result = self.readmit(&mut inner, tx, height, mtp, now, false);
        drop(inner);
        self.fatal_guard(result)
    }

    /// Expire stale mempool entries against the current clock.
    pub fn expire_mempool(&self) -> Vec<Hash256> {
        let now = (self.clock)();
        let expired = self.inner.lock().mempool.expire(now);
        let mut txids = Vec::with_capacity(expired.len());
        for entry in expired {
            self.notifier
                .transaction_removed(&entry.tx, RemovalReason::Expired);
            txids.push(entry.txid);
        }
        txids
    }

    // --- Queries ---

    /// Current tip as `(hash, height)`.
    pub fn tip(&self) -> Option<(Hash256, u64)> {
        let inner = self.inner.lock();
        inner.active.tip().map(|id| {
            let node = inner.index.node(id);
            (node.hash, node.height)
        })
    }

    /// Cumulative work of the active tip.
    pub fn tip_work(&self) -> Option<u128> {
        let inner = self.inner.lock();
        inner
            .active
            .tip()
            .map(|id| inner.index.node(id).chain_work)
    }

    /// Active-chain block hash at `height`.
    pub fn block_hash_at(&self, height: u64) -> Option<Hash256> {
        let inner = self.inner.lock();
        inner
            .active
            .at_height(height)
            .map(|id| inner.index.node(id).hash)
    }

    /// Whether the block is known, and whether it is on the active chain.
    pub fn block_status(&self, hash: &Hash256) -> Option<(u64, bool)> {
        let inner = self.inner.lock();
        inner.index.get(hash).map(|id| {
            let node = inner.index.node(id);
            (node.height, inner.active.contains(id, &inner.index))
        })
    }

    /// Fetch a stored block body.
    pub fn block(&self, hash: &Hash256) -> Result<Option<Block>, WeirError> {
        Ok(self.blocks.block(hash)?)
    }

    /// Look up an unspent coin in the active view.
    pub fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, WeirError> {
        self.check_running()?;
        let mut inner = self.inner.lock();
        let result = inner.coins.coin(outpoint).map_err(WeirError::from);
        drop(inner);
        self.fatal_guard(result)
    }

    /// Whether the mempool holds this transaction.
    pub fn mempool_contains(&self, txid: &Hash256) -> bool {
        self.inner.lock().mempool.contains(txid)
    }

    /// Mempool size as `(count, bytes)`.
    pub fn mempool_size(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.mempool.len(), inner.mempool.total_bytes())
    }
}
