//! The block index: an append-only arena of every header ever accepted,
//! linked into a tree by parent pointers.
//!
//! Nodes are addressed by [`NodeId`] (arena position). A node's parent is
//! always inserted before it, so a single ascending pass visits parents
//! before children; failure propagation relies on this. Skip pointers give
//! O(log n) ancestor lookups on long chains.

use std::collections::HashMap;

use weir_core::error::BlockError;
use weir_core::script::accumulate_work;
use weir_core::types::{BlockHeader, Hash256};

pub type NodeId = usize;

/// How far a block has been validated.
///
/// Tiers only ever increase. `Tree` means the header is linked and passed
/// stateless checks; `ContextChecked` adds the positional header and body
/// checks; `Applied` means the block has been connected at least once and
/// its state transition is known good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidityTier {
    Tree,
    ContextChecked,
    Applied,
}

/// One node of the block tree.
#[derive(Debug, Clone)]
pub struct IndexNode {
    pub hash: Hash256,
    pub header: BlockHeader,
    pub parent: Option<NodeId>,
    /// Ancestor roughly halfway back, for logarithmic walks.
    pub skip: Option<NodeId>,
    pub height: u64,
    /// Cumulative work from genesis through this block.
    pub chain_work: u128,
    /// Arrival order. Ties in chain work are broken in favor of the block
    /// seen first.
    pub seq: u64,
    pub tier: ValidityTier,
    /// This block itself failed validation.
    pub failed: bool,
    /// Some ancestor failed validation.
    pub failed_parent: bool,
    /// Whether the full block body is stored.
    pub have_data: bool,
}

impl IndexNode {
    /// Whether this node can ever be part of the active chain.
    pub fn is_viable(&self) -> bool {
        !self.failed && !self.failed_parent
    }
}

/// Ordering key for best-chain candidates.
///
/// Greater is better: more work wins, then earlier arrival, then the
/// smaller hash as a final deterministic tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateKey {
    pub work: u128,
    pub seq: u64,
    pub hash: Hash256,
    pub id: NodeId,
}

impl Ord for CandidateKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.work
            .cmp(&other.work)
            .then_with(|| other.seq.cmp(&self.seq))
            .then_with(|| other.hash.cmp(&self.hash))
    }
}

impl PartialOrd for CandidateKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// The append-only block tree.
pub struct BlockIndex {
    nodes: Vec<IndexNode>,
    by_hash: HashMap<Hash256, NodeId>,
    next_seq: u64,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            by_hash: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &IndexNode {
        &self.nodes[id]
    }

    pub fn get(&self, hash: &Hash256) -> Option<NodeId> {
        self.by_hash.get(hash).copied()
    }

    /// Insert the genesis header. Must be the first insertion.
    pub fn insert_genesis(&mut self, header: BlockHeader, work: u128) -> NodeId {
        debug_assert!(self.nodes.is_empty());
        let hash = header.hash();
        let id = self.nodes.len();
        self.nodes.push(IndexNode {
            hash,
            header,
            parent: None,
            skip: None,
            height: 0,
            chain_work: work,
            seq: self.next_seq,
            tier: ValidityTier::Applied,
            failed: false,
            failed_parent: false,
            have_data: true,
        });
        self.next_seq += 1;
        self.by_hash.insert(hash, id);
        id
    }

    /// Link a new header under its parent. The parent must already be in
    /// the index; `work` is the header's own work contribution.
    pub fn insert(
        &mut self,
        header: BlockHeader,
        work: u128,
        have_data: bool,
    ) -> Result<NodeId, BlockError> {
        let hash = header.hash();
        if let Some(existing) = self.by_hash.get(&hash) {
            return Ok(*existing);
        }
        let parent = self
            .get(&header.prev_hash)
            .ok_or_else(|| BlockError::UnknownParent(header.prev_hash.to_string()))?;

        let height = self.nodes[parent].height + 1;
        let chain_work = accumulate_work(self.nodes[parent].chain_work, work);
        let skip = self.ancestor_at(parent, skip_height(height));
        let failed_parent = !self.nodes[parent].is_viable();

        let id = self.nodes.len();
        self.nodes.push(IndexNode {
            hash,
            header,
            parent: Some(parent),
            skip,
            height,
            chain_work,
            seq: self.next_seq,
            tier: ValidityTier::Tree,
            failed: false,
            failed_parent,
            have_data,
        });
        self.next_seq += 1;
        self.by_hash.insert(hash, id);
        Ok(id)
    }

    /// The ancestor of `id` at exactly `height`, using skip pointers.
    pub fn ancestor_at(&self, id: NodeId, height: u64) -> Option<NodeId> {
        let mut current = id;
        if height > self.nodes[current].height {
            return None;
        }
        while self.nodes[current].height > height {
            let node = &self.nodes[current];
            // Take the skip whenever it does not overshoot the goal.
            current = match node.skip {
                Some(skip) if self.nodes[skip].height >= height => skip,
                _ => node.parent?,
            };
        }
        Some(current)
    }

    /// Lowest common ancestor of two nodes.
    pub fn last_common_ancestor(&self, a: NodeId, b: NodeId) -> NodeId {
        let mut a = a;
        let mut b = b;
        let min_height = self.nodes[a].height.min(self.nodes[b].height);
        if let Some(x) = self.ancestor_at(a, min_height) {
            a = x;
        }
        if let Some(x) = self.ancestor_at(b, min_height) {
            b = x;
        }
        while a != b {
            // Genesis is a common ancestor of everything, so parents exist
            // until the walk converges.
            match (self.nodes[a].parent, self.nodes[b].parent) {
                (Some(pa), Some(pb)) => {
                    a = pa;
                    b = pb;
                }
                _ => break,
            }
        }
        a
    }

    /// Median timestamp of the last 11 blocks ending at `id`.
    pub fn median_time_past(&self, id: NodeId) -> u64 {
        let mut times = Vec::with_capacity(weir_core::constants::MEDIAN_TIME_SPAN);
        let mut current = Some(id);
        while let Some(node_id) = current {
            if times.len() == weir_core::constants::MEDIAN_TIME_SPAN {
                break;
            }
            let node = &self.nodes[node_id];
            times.push(node.header.timestamp);
            current = node.parent;
        }
        times.sort_unstable();
        times[times.len() / 2]
    }

    /// Mark a block failed and propagate the failure to every descendant.
    ///
    /// Children always have larger arena positions than their parents, so
    /// one ascending pass suffices.
    pub fn mark_failed(&mut self, id: NodeId) {
        self.nodes[id].failed = true;
        for i in (id + 1)..self.nodes.len() {
            if let Some(parent) = self.nodes[i].parent {
                if !self.nodes[parent].is_viable() {
                    self.nodes[i].failed_parent = true;
                }
            }
        }
    }

    pub fn set_tier(&mut self, id: NodeId, tier: ValidityTier) {
        if tier > self.nodes[id].tier {
            self.nodes[id].tier = tier;
        }
    }

    pub fn set_have_data(&mut self, id: NodeId, have: bool) {
        self.nodes[id].have_data = have;
    }

    /// Candidate key for a node.
    pub fn candidate_key(&self, id: NodeId) -> CandidateKey {
        let node = &self.nodes[id];
        CandidateKey {
            work: node.chain_work,
            seq: node.seq,
            hash: node.hash,
            id,
        }
    }
}

impl Default for BlockIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Height of the skip pointer for a node at `height`: clear the lowest set
/// bit, stepping one further on odd heights so consecutive skips differ.
fn skip_height(height: u64) -> u64 {
    if height < 2 {
        return 0;
    }
    if height & 1 == 1 {
        invert_lowest_one(invert_lowest_one(height - 1)) + 1
    } else {
        invert_lowest_one(height)
    }
}

fn invert_lowest_one(n: u64) -> u64 {
    n & n.wrapping_sub(1)
}

/// The active chain: block-index nodes by height.
#[derive(Debug, Default)]
pub struct ActiveChain {
    nodes: Vec<NodeId>,
}

impl ActiveChain {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn tip(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    /// Height of the tip. Genesis-only chains have height 0.
    pub fn height(&self) -> Option<u64> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(self.nodes.len() as u64 - 1)
        }
    }

    pub fn at_height(&self, height: u64) -> Option<NodeId> {
        self.nodes.get(height as usize).copied()
    }

    /// Whether `id` lies on the active chain.
    pub fn contains(&self, id: NodeId, index: &BlockIndex) -> bool {
        self.at_height(index.node(id).height) == Some(id)
    }

    pub fn push(&mut self, id: NodeId) {
        self.nodes.push(id);
    }

    pub fn pop(&mut self) -> Option<NodeId> {
        self.nodes.pop()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
