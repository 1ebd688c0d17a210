//! In-memory pool of unconfirmed transactions.
//!
//! Admission runs the full pipeline: structural checks, input resolution
//! against the pool and the active coin view, maturity and finality,
//! fee-floor and package limits, then witness verification under relay
//! flags with a consensus-flag backstop. A transaction that passes is
//! valid for inclusion in the next block as far as the pool can tell.
//!
//! Indices: O(1) lookup by txid, O(1) conflict detection via the
//! spent-outpoint map, fee-rate order for eviction, and a child map for
//! package walks. Not thread-safe; the engine serializes access.

use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use weir_core::error::{MempoolError, TxError, WeirError};
use weir_core::params::{ChainParams, EngineConfig};
use weir_core::script::{ScriptVerifier, VerifyFlags};
use weir_core::types::{Block, Hash256, OutPoint, Transaction, TxOutput};
use weir_core::validation::{check_transaction, is_final_at};

use crate::coins::{CoinsBackend, CoinsCache};
use crate::notify::RemovalReason;

/// Fee rate precision: rates are milli-drops per byte.
const FEE_RATE_PRECISION: u128 = 1_000;

fn compute_fee_rate(fee: u64, size: usize) -> u64 {
    if size == 0 {
        return u64::MAX;
    }
    let rate = (fee as u128) * FEE_RATE_PRECISION / (size as u128);
    rate.min(u64::MAX as u128) as u64
}

/// A pooled transaction with precomputed metadata.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub txid: Hash256,
    /// Fee in drops.
    pub fee: u64,
    /// Serialized size in bytes.
    pub size: usize,
    /// Unix time the entry was admitted.
    pub time_added: u64,
    fee_rate: u64,
    /// In-pool parents, for package walks.
    parents: HashSet<Hash256>,
}

impl MempoolEntry {
    /// Fee rate in milli-drops per byte.
    pub fn fee_rate(&self) -> u64 {
        self.fee_rate
    }
}

/// Outcome of a successful admission.
#[derive(Debug)]
pub struct Admitted {
    pub txid: Hash256,
    /// Entries evicted to make room, lowest fee rate first.
    pub evicted: Vec<MempoolEntry>,
}

/// Unconfirmed transaction pool with package-limited admission.
pub struct Mempool {
    entries: HashMap<Hash256, MempoolEntry>,
    /// Spent outpoint → pool tx spending it.
    by_outpoint: HashMap<OutPoint, Hash256>,
    /// `(fee_rate, txid)` ascending; lowest first for eviction.
    by_fee_rate: BTreeSet<(u64, Hash256)>,
    /// In-pool children by parent txid.
    children: HashMap<Hash256, HashSet<Hash256>>,
    total_bytes: usize,
    max_bytes: usize,
    max_ancestors: usize,
    max_ancestor_bytes: usize,
    max_descendants: usize,
    max_descendant_bytes: usize,
    min_fee_rate: u64,
    expiry_secs: u64,
}

impl Mempool {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            entries: HashMap::new(),
            by_outpoint: HashMap::new(),
            by_fee_rate: BTreeSet::new(),
            children: HashMap::new(),
            total_bytes: 0,
            max_bytes: config.mempool_max_bytes,
            max_ancestors: config.max_ancestors,
            max_ancestor_bytes: config.max_ancestor_bytes,
            max_descendants: config.max_descendants,
            max_descendant_bytes: config.max_descendant_bytes,
            min_fee_rate: config.min_relay_fee_rate,
            expiry_secs: config.mempool_expiry_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Hash256) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    /// All pooled txids, unordered.
    pub fn txids(&self) -> Vec<Hash256> {
        self.entries.keys().copied().collect()
    }

    /// The relay fee floor, scaled up as the pool fills.
    ///
    /// Doubles for each quarter of capacity in use, so a pool under
    /// pressure prices out low-fee traffic before hard eviction starts.
    pub fn dynamic_min_fee_rate(&self) -> u64 {
        let quarters = if self.max_bytes == 0 {
            0
        } else {
            (self.total_bytes * 4 / self.max_bytes).min(3) as u32
        };
        self.min_fee_rate.saturating_mul(1 << quarters)
    }

    /// Admit a transaction.
    ///
    /// `height` is the height the transaction would confirm at (tip + 1)
    /// and `median_time_past` the tip's median time, both used for
    /// finality and maturity. `bypass_floor` waives the fee floor for
    /// transactions replayed from a disconnected block; every other check
    /// still applies. Storage faults reading the coin view are fatal and
    /// surface as `WeirError::Storage`.
    pub fn accept<B: CoinsBackend>(
        &mut self,
        tx: Transaction,
        view: &mut CoinsCache<B>,
        height: u64,
        median_time_past: u64,
        now: u64,
        params: &ChainParams,
        script: &dyn ScriptVerifier,
        bypass_floor: bool,
    ) -> Result<Admitted, WeirError> {
        check_transaction(&tx).map_err(MempoolError::Tx)?;

        if tx.is_coinbase() || tx.is_coinstake() {
            return Err(MempoolError::NotRelayable.into());
        }

        let encoded = bincode::encode_to_vec(&tx, bincode::config::standard())
            .map_err(|e| MempoolError::Tx(TxError::Serialization(e.to_string())))?;
        let txid = Hash256(blake3::hash(&encoded).into());
        let size = encoded.len();

        if self.entries.contains_key(&txid) {
            return Err(MempoolError::AlreadyKnown(txid.to_string()).into());
        }

        for input in &tx.inputs {
            if let Some(existing) = self.by_outpoint.get(&input.previous_output) {
                return Err(MempoolError::Conflict {
                    existing: existing.to_string(),
                    outpoint: input.previous_output.to_string(),
                }
                .into());
            }
        }

        if !is_final_at(&tx, height, median_time_past) {
            return Err(MempoolError::Tx(TxError::NonFinal { height }).into());
        }

        // Resolve each input from the pool or the active view.
        let mut parents: HashSet<Hash256> = HashSet::new();
        let mut spent_outputs: Vec<TxOutput> = Vec::with_capacity(tx.inputs.len());
        let mut value_in: u64 = 0;
        for input in &tx.inputs {
            let outpoint = &input.previous_output;
            let output = if let Some(parent) = self.entries.get(&outpoint.txid) {
                let out = parent
                    .tx
                    .outputs
                    .get(outpoint.index as usize)
                    .ok_or_else(|| MempoolError::MissingInputs(outpoint.to_string()))?;
                parents.insert(outpoint.txid);
                out.clone()
            } else {
                match view.coin(outpoint)? {
                    Some(coin) => {
                        if !coin.is_mature(height, params.maturity) {
                            return Err(MempoolError::Tx(TxError::PrematureSpend {
                                outpoint: outpoint.to_string(),
                                created: coin.height,
                                spent: height,
                            })
                            .into());
                        }
                        coin.output
                    }
                    None => {
                        return Err(MempoolError::MissingInputs(outpoint.to_string()).into())
                    }
                }
            };
            value_in = value_in
                .checked_add(output.value)
                .ok_or(MempoolError::Tx(TxError::ValueOutOfRange))?;
            spent_outputs.push(output);
        }

        let value_out = tx
            .total_output_value()
            .ok_or(MempoolError::Tx(TxError::ValueOutOfRange))?;
        if value_in < value_out {
            return Err(MempoolError::Tx(TxError::InsufficientFunds {
                have: value_in,
                need: value_out,
            })
            .into());
        }
        let fee = value_in - value_out;

        let fee_rate = compute_fee_rate(fee, size);
        let floor = self.dynamic_min_fee_rate();
        if fee_rate < floor && !bypass_floor {
            return Err(MempoolError::FeeTooLow {
                rate: fee_rate,
                min: floor,
            }
            .into());
        }

        self.check_package_limits(&parents, size)?;

        // Witness checks, parallel per input: relay flags first, then the
        // consensus subset as a consistency backstop. Relay rules are a
        // strict superset, so a consensus failure after a relay pass is a
        // verifier bug.
        spent_outputs
            .par_iter()
            .enumerate()
            .try_for_each(|(i, spent)| {
                match script.verify_input(&tx, i, spent, VerifyFlags::STANDARD) {
                    Ok(()) => {
                        if script
                            .verify_input(&tx, i, spent, VerifyFlags::CONSENSUS)
                            .is_err()
                        {
                            tracing::error!(
                                txid = %txid,
                                input = i,
                                "consensus flags rejected input that passed relay flags"
                            );
                            return Err(WeirError::from(MempoolError::FlagInconsistency {
                                index: i,
                            }));
                        }
                        Ok(())
                    }
                    Err(relay_err) => {
                        match script.verify_input(&tx, i, spent, VerifyFlags::CONSENSUS) {
                            Ok(()) => {
                                Err(MempoolError::NonStandard(relay_err.to_string()).into())
                            }
                            Err(e) => Err(MempoolError::Tx(e).into()),
                        }
                    }
                }
            })?;

        // Evict from the bottom until the new entry fits. The eviction set
        // is planned before any removal so a PoolFull rejection leaves the
        // pool untouched.
        let mut planned: HashSet<Hash256> = HashSet::new();
        let mut roots: Vec<Hash256> = Vec::new();
        let mut freed = 0usize;
        for &(rate, candidate) in self.by_fee_rate.iter() {
            if self.total_bytes - freed + size <= self.max_bytes {
                break;
            }
            if planned.contains(&candidate) {
                continue;
            }
            if rate >= fee_rate {
                return Err(MempoolError::PoolFull.into());
            }
            roots.push(candidate);
            for id in self.descendant_closure(&candidate) {
                if planned.insert(id) {
                    freed += self.entries.get(&id).map_or(0, |e| e.size);
                }
            }
            planned.insert(candidate);
            freed += self.entries.get(&candidate).map_or(0, |e| e.size);
        }
        if self.total_bytes - freed + size > self.max_bytes {
            return Err(MempoolError::PoolFull.into());
        }
        let mut evicted = Vec::new();
        for root in &roots {
            evicted.extend(self.remove_recursive(root));
        }

        for input in &tx.inputs {
            self.by_outpoint.insert(input.previous_output.clone(), txid);
        }
        self.by_fee_rate.insert((fee_rate, txid));
        for parent in &parents {
            self.children.entry(*parent).or_default().insert(txid);
        }
        self.total_bytes += size;
        self.entries.insert(
            txid,
            MempoolEntry {
                tx,
                txid,
                fee,
                size,
                time_added: now,
                fee_rate,
                parents,
            },
        );
        tracing::debug!(txid = %txid, fee, size, "transaction admitted");
        Ok(Admitted { txid, evicted })
    }

    /// Ancestor and descendant package limits for a candidate with the
    /// given in-pool parents and size.
    fn check_package_limits(
        &self,
        parents: &HashSet<Hash256>,
        size: usize,
    ) -> Result<(), MempoolError> {
        let ancestors = self.ancestor_closure(parents);
        if ancestors.len() > self.max_ancestors {
            return Err(MempoolError::TooManyAncestors {
                count: ancestors.len(),
                max: self.max_ancestors,
            });
        }
        let ancestor_bytes: usize = ancestors
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|e| e.size)
            .sum();
        if ancestor_bytes + size > self.max_ancestor_bytes {
            return Err(MempoolError::AncestorSizeExceeded {
                bytes: ancestor_bytes + size,
                max: self.max_ancestor_bytes,
            });
        }

        for ancestor in &ancestors {
            let descendants = self.descendant_closure(ancestor);
            if descendants.len() + 1 > self.max_descendants {
                return Err(MempoolError::TooManyDescendants {
                    ancestor: ancestor.to_string(),
                    count: descendants.len() + 1,
                    max: self.max_descendants,
                });
            }
            let descendant_bytes: usize = descendants
                .iter()
                .filter_map(|id| self.entries.get(id))
                .map(|e| e.size)
                .sum();
            if descendant_bytes + size > self.max_descendant_bytes {
                return Err(MempoolError::DescendantSizeExceeded {
                    ancestor: ancestor.to_string(),
                    max: self.max_descendant_bytes,
                });
            }
        }
        Ok(())
    }

    /// Transitive in-pool ancestors reachable from `parents`.
    fn ancestor_closure(&self, parents: &HashSet<Hash256>) -> HashSet<Hash256> {
        let mut seen: HashSet<Hash256> = HashSet::new();
        let mut queue: VecDeque<Hash256> = parents.iter().copied().collect();
        while let Some(txid) = queue.pop_front() {
            if !seen.insert(txid) {
                continue;
            }
            if let Some(entry) = self.entries.get(&txid) {
                for parent in &entry.parents {
                    if !seen.contains(parent) {
                        queue.push_back(*parent);
                    }
                }
            }
        }
        seen
    }

    /// Transitive in-pool descendants of `txid`, not including itself.
    fn descendant_closure(&self, txid: &Hash256) -> HashSet<Hash256> {
        let mut seen: HashSet<Hash256> = HashSet::new();
        let mut queue: VecDeque<Hash256> = VecDeque::new();
        if let Some(kids) = self.children.get(txid) {
            queue.extend(kids.iter().copied());
        }
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(kids) = self.children.get(&id) {
                for kid in kids {
                    if !seen.contains(kid) {
                        queue.push_back(*kid);
                    }
                }
            }
        }
        seen
    }

    /// Remove a transaction and all of its in-pool descendants.
    ///
    /// Returns the removed entries, descendants before ancestors.
    pub fn remove_recursive(&mut self, txid: &Hash256) -> Vec<MempoolEntry> {
        let mut removed = Vec::new();
        let mut order: Vec<Hash256> = self.descendant_closure(txid).into_iter().collect();
        order.push(*txid);
        for id in order {
            if let Some(entry) = self.remove_entry(&id) {
                removed.push(entry);
            }
        }
        removed
    }

    fn remove_entry(&mut self, txid: &Hash256) -> Option<MempoolEntry> {
        let entry = self.entries.remove(txid)?;
        for input in &entry.tx.inputs {
            self.by_outpoint.remove(&input.previous_output);
        }
        self.by_fee_rate.remove(&(entry.fee_rate, entry.txid));
        for parent in &entry.parents {
            if let Some(kids) = self.children.get_mut(parent) {
                kids.remove(txid);
                if kids.is_empty() {
                    self.children.remove(parent);
                }
            }
        }
        // Surviving children no longer have this tx as an in-pool parent;
        // leaving the stale link would defer them in selection forever.
        if let Some(kids) = self.children.remove(txid) {
            for kid in kids {
                if let Some(child) = self.entries.get_mut(&kid) {
                    child.parents.remove(txid);
                }
            }
        }
        self.total_bytes -= entry.size;
        Some(entry)
    }

    /// Drop everything a connected block made stale: its own transactions
    /// and any pool entry conflicting with its spends (plus descendants of
    /// the conflicts). Returns the removed entries tagged with why each
    /// one left.
    pub fn remove_for_block(&mut self, block: &Block) -> Vec<(MempoolEntry, RemovalReason)> {
        let mut removed = Vec::new();
        for tx in &block.transactions {
            if let Ok(txid) = tx.txid() {
                if self.entries.contains_key(&txid) {
                    // The tx itself confirmed; its children gain a
                    // confirmed parent and stay.
                    if let Some(entry) = self.remove_entry(&txid) {
                        removed.push((entry, RemovalReason::Included));
                    }
                }
            }
            for input in &tx.inputs {
                if let Some(conflict) = self.by_outpoint.get(&input.previous_output).copied() {
                    for entry in self.remove_recursive(&conflict) {
                        removed.push((entry, RemovalReason::Conflict));
                    }
                }
            }
        }
        removed
    }

    /// Expire entries older than the configured lifetime, with their
    /// descendants. Returns the expired entries.
    pub fn expire(&mut self, now: u64) -> Vec<MempoolEntry> {
        let cutoff = now.saturating_sub(self.expiry_secs);
        let stale: Vec<Hash256> = self
            .entries
            .values()
            .filter(|e| e.time_added < cutoff)
            .map(|e| e.txid)
            .collect();
        let mut expired = Vec::new();
        for txid in stale {
            if self.entries.contains_key(&txid) {
                expired.extend(self.remove_recursive(&txid));
            }
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired mempool entries");
        }
        expired
    }

    /// Select transactions for a block template, highest fee rate first.
    ///
    /// Greedily fills up to `max_bytes` of serialized transaction data. An
    /// entry whose in-pool parents have not all been selected yet is
    /// deferred so the result is always topologically valid; entries too
    /// large for the remaining space are skipped (smaller ones may still
    /// fit).
    pub fn select_for_block(&self, max_bytes: usize) -> Vec<&MempoolEntry> {
        let mut selected: Vec<&MempoolEntry> = Vec::new();
        let mut chosen: HashSet<Hash256> = HashSet::new();
        let mut remaining = max_bytes;
        let mut deferred: VecDeque<&MempoolEntry> = VecDeque::new();

        for (_, txid) in self.by_fee_rate.iter().rev() {
            if remaining == 0 {
                break;
            }
            let Some(entry) = self.entries.get(txid) else {
                continue;
            };
            if entry.size > remaining {
                continue;
            }
            if !entry.parents.iter().all(|p| chosen.contains(p)) {
                deferred.push_back(entry);
                continue;
            }
            chosen.insert(entry.txid);
            remaining -= entry.size;
            selected.push(entry);

            // A newly satisfied parent may unblock deferred children.
            let mut stalled = 0;
            while stalled < deferred.len() {
                let Some(candidate) = deferred.pop_front() else {
                    break;
                };
                if candidate.size <= remaining
                    && candidate.parents.iter().all(|p| chosen.contains(p))
                {
                    chosen.insert(candidate.txid);
                    remaining -= candidate.size;
                    selected.push(candidate);
                    stalled = 0;
                } else {
                    deferred.push_back(candidate);
                    stalled += 1;
                }
            }
        }

        selected
    }
}
