//! Block subsidy schedule and superblock budget.

use crate::params::ChainParams;

/// Base subsidy for a block at `height`, halving on the configured
/// interval. Returns zero once the shift exhausts the initial subsidy.
pub fn block_subsidy(height: u64, params: &ChainParams) -> u64 {
    let halvings = height / params.subsidy_halving_interval;
    if halvings >= 64 {
        return 0;
    }
    params.subsidy_initial >> halvings
}

/// Governance payout ceiling for `height`: the superblock budget on
/// superblock heights, zero everywhere else.
pub fn superblock_budget(height: u64, params: &ChainParams) -> u64 {
    if params.is_superblock(height) {
        params.superblock_budget
    } else {
        0
    }
}
