//! BLAKE3 merkle tree over transaction IDs.
//!
//! Domain-separated hashing prevents second-preimage attacks:
//! leaf = `BLAKE3(0x00 || txid)`, node = `BLAKE3(0x01 || left || right)`.
//! Odd layers duplicate their last element, which makes a block with a
//! duplicated transaction pair hash to the same root as the honest block —
//! the classic merkle malleability. [`merkle_root_with_mutation`] detects
//! that case and reports it so the validator can reject without caching
//! the (ambiguous) hash as failed.

use crate::types::Hash256;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

fn leaf_hash(data: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(data.as_bytes());
    Hash256(hasher.finalize().into())
}

fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Compute the merkle root of `leaves` (typically transaction IDs).
/// Returns [`Hash256::ZERO`] for an empty slice.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    merkle_root_with_mutation(leaves).0
}

/// Compute the merkle root and detect tree mutation.
///
/// The mutation flag is set when any layer contains two identical adjacent
/// hashes in distinct positions — the signature of a duplicated-transaction
/// block whose root collides with the honest one.
pub fn merkle_root_with_mutation(leaves: &[Hash256]) -> (Hash256, bool) {
    if leaves.is_empty() {
        return (Hash256::ZERO, false);
    }

    let mut mutated = false;
    let mut current: Vec<Hash256> = leaves.iter().map(leaf_hash).collect();

    while current.len() > 1 {
        let mut next = Vec::with_capacity(current.len().div_ceil(2));
        let mut i = 0;
        while i < current.len() {
            let left = &current[i];
            let right = if i + 1 < current.len() {
                if current[i] == current[i + 1] {
                    mutated = true;
                }
                &current[i + 1]
            } else {
                left
            };
            next.push(node_hash(left, right));
            i += 2;
        }
        current = next;
    }

    (current[0], mutated)
}
