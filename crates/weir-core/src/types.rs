//! Core protocol types: transactions, blocks, coins.
//!
//! All monetary values are in drops (1 WEIR = 10^8 drops). Transaction IDs
//! use BLAKE3 over the canonical bincode encoding; block header hashes use
//! double SHA-256 over a fixed byte layout.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::TxError;

/// A 32-byte hash value.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Used for coinbase previous outpoints and the empty
    /// best-block marker.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Reference to a specific output of a previous transaction.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    /// Transaction ID containing the referenced output.
    pub txid: Hash256,
    /// Index of the output within the transaction.
    pub index: u64,
}

impl OutPoint {
    /// The null outpoint, used for coinbase transaction inputs.
    pub fn null() -> Self {
        Self {
            txid: Hash256::ZERO,
            index: u64::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.index == u64::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// A transaction input, spending a previous output.
///
/// The `signature` and `public_key` fields are opaque witness bytes consumed
/// by the [`ScriptVerifier`](crate::script::ScriptVerifier); the core never
/// interprets them beyond length and emptiness.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxInput {
    /// The outpoint being spent. Null outpoint for coinbase.
    pub previous_output: OutPoint,
    /// Witness signature bytes. For coinbase inputs this field carries the
    /// height encoding plus arbitrary miner data instead.
    pub signature: Vec<u8>,
    /// Witness public key bytes. Empty for coinbase inputs.
    pub public_key: Vec<u8>,
}

/// A transaction output, creating a new coin.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    /// Value in drops.
    pub value: u64,
    /// Locking predicate: BLAKE3 hash of the owner's public key. Opaque to
    /// the consensus core; resolved by the injected script verifier.
    pub pubkey_hash: Hash256,
}

impl TxOutput {
    /// The empty output that marks the first position of a coinstake
    /// transaction. Carries no value and no predicate.
    pub fn stake_marker() -> Self {
        Self {
            value: 0,
            pubkey_hash: Hash256::ZERO,
        }
    }

    /// Whether this output is the coinstake position marker.
    pub fn is_stake_marker(&self) -> bool {
        self.value == 0 && self.pubkey_hash.is_zero()
    }
}

/// A transaction transferring value between predicates.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    /// Protocol version.
    pub version: u64,
    /// Inputs consuming previous outputs.
    pub inputs: Vec<TxInput>,
    /// New outputs created by this transaction.
    pub outputs: Vec<TxOutput>,
    /// Block height or timestamp before which this tx is invalid.
    /// Zero disables the lock.
    pub lock_time: u64,
}

impl Transaction {
    /// Compute the transaction ID (BLAKE3 hash of the canonical encoding).
    pub fn txid(&self) -> Result<Hash256, TxError> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TxError::Serialization(e.to_string()))?;
        Ok(Hash256(blake3::hash(&encoded).into()))
    }

    /// Check if this is a coinbase transaction (single input with null
    /// outpoint).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// Check if this is a coinstake transaction: at least one real input,
    /// at least two outputs, and the first output is the empty stake marker.
    pub fn is_coinstake(&self) -> bool {
        !self.inputs.is_empty()
            && !self.inputs[0].previous_output.is_null()
            && self.outputs.len() >= 2
            && self.outputs[0].is_stake_marker()
    }

    /// Sum of all output values. Returns None on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }

    /// Serialized size of this transaction in bytes.
    pub fn serialized_size(&self) -> Result<usize, TxError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map(|b| b.len())
            .map_err(|e| TxError::Serialization(e.to_string()))
    }
}

/// Block header.
///
/// The proof predicate (proof-of-work during bootstrap, proof-of-stake
/// kernel afterwards) is evaluated over the header hash by the injected
/// [`ProofCheck`](crate::script::ProofCheck); the header only carries the
/// compact target the predicate compares against.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Protocol version. Minimum version is mandated per height by the
    /// network upgrade schedule.
    pub version: u64,
    /// Hash of the previous block header.
    pub prev_hash: Hash256,
    /// BLAKE3 merkle root of the block's transactions.
    pub merkle_root: Hash256,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Compact difficulty target consumed by the proof predicate.
    pub difficulty_target: u64,
    /// Proof nonce.
    pub nonce: u64,
    /// Anchor committing to the block's effect on the ledger; recomputed
    /// and checked during block application.
    pub state_commitment: Hash256,
}

impl BlockHeader {
    /// Header size in bytes when serialized for hashing.
    const HASH_SIZE: usize = 4 * 8 + 3 * 32;

    /// Compute the block header hash (double SHA-256 over a fixed layout).
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(Self::HASH_SIZE);
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(self.prev_hash.as_bytes());
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&self.difficulty_target.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        data.extend_from_slice(self.state_commitment.as_bytes());
        let first = Sha256::digest(&data);
        Hash256(Sha256::digest(first).into())
    }
}

/// A complete block: header plus transactions.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    pub header: BlockHeader,
    /// Ordered list of transactions. First must be the sole coinbase; a
    /// coinstake, if present, must be second.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Get the coinbase transaction, if the block is non-empty.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// Whether this block is proof-of-stake (second transaction is a
    /// coinstake).
    pub fn is_proof_of_stake(&self) -> bool {
        self.transactions.len() > 1 && self.transactions[1].is_coinstake()
    }

    /// The coinstake transaction of a proof-of-stake block.
    pub fn coinstake(&self) -> Option<&Transaction> {
        if self.is_proof_of_stake() {
            self.transactions.get(1)
        } else {
            None
        }
    }

    /// Serialized size of this block in bytes.
    pub fn serialized_size(&self) -> Result<usize, TxError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map(|b| b.len())
            .map_err(|e| TxError::Serialization(e.to_string()))
    }
}

/// An unspent transaction output together with its creation metadata.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Coin {
    /// The unspent output.
    pub output: TxOutput,
    /// Height of the block that created this coin.
    pub height: u64,
    /// Whether the creating transaction was a coinbase.
    pub is_coinbase: bool,
    /// Whether the creating transaction was a coinstake.
    pub is_coinstake: bool,
}

impl Coin {
    /// Check whether this coin may be spent at `spend_height`.
    ///
    /// Coinbase and coinstake outputs are unspendable until `maturity`
    /// confirmations have accrued; other coins are always mature.
    pub fn is_mature(&self, spend_height: u64, maturity: u64) -> bool {
        if !self.is_coinbase && !self.is_coinstake {
            return true;
        }
        spend_height.saturating_sub(self.height) >= maturity
    }
}

/// Compute the state commitment anchor a block header must carry.
///
/// Commits to the parent linkage, the height, and the block's aggregate
/// value flow. Both the producer and [`apply_block`] recompute this from
/// the same inputs, so a mismatch proves the header lies about the block's
/// ledger effect.
pub fn state_commitment(prev_hash: &Hash256, height: u64, fees: u64, minted: u64) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"weir.anchor.v1");
    hasher.update(prev_hash.as_bytes());
    hasher.update(&height.to_le_bytes());
    hasher.update(&fees.to_le_bytes());
    hasher.update(&minted.to_le_bytes());
    Hash256(hasher.finalize().into())
}
