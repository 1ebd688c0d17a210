//! Chain parameters and engine configuration.
//!
//! All chain-variant behavior lives here instead of free-standing globals:
//! the engine receives one [`ChainParams`] at construction and threads it
//! through every contextual check.

use crate::constants::{
    COIN, DEFAULT_MAX_ANCESTOR_BYTES, DEFAULT_MAX_ANCESTORS, DEFAULT_MAX_DESCENDANT_BYTES,
    DEFAULT_MAX_DESCENDANTS, DEFAULT_MEMPOOL_EXPIRY_SECS, DEFAULT_MEMPOOL_MAX_BYTES,
    MAX_FUTURE_DRIFT, MIN_RELAY_FEE_RATE,
};
use crate::types::Hash256;

/// A scheduled network upgrade: from `height` on, headers must carry at
/// least `min_version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionUpgrade {
    pub height: u64,
    pub min_version: u64,
}

/// Consensus parameters for one chain deployment.
#[derive(Debug, Clone)]
pub struct ChainParams {
    /// Confirmations before a coinbase/coinstake output may be spent.
    pub maturity: u64,
    /// Maximum seconds a header timestamp may lie in the future.
    pub max_future_drift: u64,
    /// Mask the proof-of-stake timestamp granularity: from
    /// `mask_activation_height` on, `timestamp & stake_timestamp_mask`
    /// must be zero.
    pub stake_timestamp_mask: u64,
    pub mask_activation_height: u64,
    /// Upgrade schedule, ascending by height.
    pub upgrades: Vec<VersionUpgrade>,
    /// Hard checkpoints, ascending by height. No reorganization may fork
    /// below the highest checkpoint at or under the current tip.
    pub checkpoints: Vec<(u64, Hash256)>,
    /// Maximum depth of any reorganization or fork acceptance.
    pub max_reorg_depth: u64,
    /// Superblock cadence: every `superblock_cycle` blocks (height > 0),
    /// a governance payout of up to `superblock_budget` may be minted on
    /// top of subsidy and fees.
    pub superblock_cycle: u64,
    pub superblock_budget: u64,
    /// Initial block subsidy and its halving interval.
    pub subsidy_initial: u64,
    pub subsidy_halving_interval: u64,
}

impl ChainParams {
    /// Production parameters.
    pub fn mainnet() -> Self {
        Self {
            maturity: 100,
            max_future_drift: MAX_FUTURE_DRIFT,
            stake_timestamp_mask: 0xF,
            mask_activation_height: 200,
            upgrades: vec![
                VersionUpgrade { height: 0, min_version: 1 },
                VersionUpgrade { height: 200, min_version: 2 },
            ],
            checkpoints: vec![],
            max_reorg_depth: 100,
            superblock_cycle: 43_200,
            superblock_budget: 4_320 * COIN,
            subsidy_initial: 50 * COIN,
            subsidy_halving_interval: 840_000,
        }
    }

    /// Local regression-test parameters: tiny maturity, no timestamp mask,
    /// short superblock cycle.
    pub fn regtest() -> Self {
        Self {
            maturity: 10,
            max_future_drift: MAX_FUTURE_DRIFT,
            stake_timestamp_mask: 0,
            mask_activation_height: u64::MAX,
            upgrades: vec![VersionUpgrade { height: 0, min_version: 1 }],
            checkpoints: vec![],
            max_reorg_depth: 50,
            superblock_cycle: 20,
            superblock_budget: 10 * COIN,
            subsidy_initial: 50 * COIN,
            subsidy_halving_interval: 150,
        }
    }

    /// Minimum header version mandated at `height`.
    pub fn min_version_at(&self, height: u64) -> u64 {
        self.upgrades
            .iter()
            .rev()
            .find(|u| u.height <= height)
            .map(|u| u.min_version)
            .unwrap_or(1)
    }

    /// Whether the stake timestamp mask applies at `height`.
    pub fn mask_active_at(&self, height: u64) -> bool {
        self.stake_timestamp_mask != 0 && height >= self.mask_activation_height
    }

    /// The highest checkpoint at or below `height`, if any.
    pub fn last_checkpoint_at_or_below(&self, height: u64) -> Option<(u64, Hash256)> {
        self.checkpoints
            .iter()
            .rev()
            .find(|(h, _)| *h <= height)
            .copied()
    }

    /// Whether `height` is a superblock (governance payout) height.
    pub fn is_superblock(&self, height: u64) -> bool {
        self.superblock_cycle != 0 && height != 0 && height % self.superblock_cycle == 0
    }
}

/// Engine tunables that are deployment policy rather than consensus.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Blocks connected per batch before the serialization region is
    /// released and reacquired.
    pub connect_batch: usize,
    pub mempool_max_bytes: usize,
    pub max_ancestors: usize,
    pub max_ancestor_bytes: usize,
    pub max_descendants: usize,
    pub max_descendant_bytes: usize,
    pub min_relay_fee_rate: u64,
    pub mempool_expiry_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connect_batch: 32,
            mempool_max_bytes: DEFAULT_MEMPOOL_MAX_BYTES,
            max_ancestors: DEFAULT_MAX_ANCESTORS,
            max_ancestor_bytes: DEFAULT_MAX_ANCESTOR_BYTES,
            max_descendants: DEFAULT_MAX_DESCENDANTS,
            max_descendant_bytes: DEFAULT_MAX_DESCENDANT_BYTES,
            min_relay_fee_rate: MIN_RELAY_FEE_RATE,
            mempool_expiry_secs: DEFAULT_MEMPOOL_EXPIRY_SECS,
        }
    }
}
