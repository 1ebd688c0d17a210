//! Pluggable predicate and proof verification seams.
//!
//! Stateless transaction checks never touch witnesses; witness verification
//! happens at connect time (and mempool admission) through the
//! [`ScriptVerifier`] trait so the engine can be tested with a permissive
//! stub and run in production with [`Ed25519Verifier`]. Header proof
//! checking goes through [`ProofCheck`] for the same reason.

use crate::crypto;
use crate::error::{BlockError, TxError};
use crate::types::{BlockHeader, Hash256, Transaction, TxOutput};

/// Verification flags controlling which witness checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyFlags {
    /// Verify signatures against the spent predicate hash.
    pub check_signatures: bool,
    /// Enforce relay-only standardness rules on witness sizes.
    pub require_standard: bool,
}

impl VerifyFlags {
    /// Consensus rules only, as applied at block connect.
    pub const CONSENSUS: Self = Self {
        check_signatures: true,
        require_standard: false,
    };

    /// Consensus plus relay standardness, as applied at mempool admission.
    pub const STANDARD: Self = Self {
        check_signatures: true,
        require_standard: true,
    };
}

/// Maximum witness sizes accepted under standardness rules. Consensus does
/// not bound these beyond the transaction size limit.
const MAX_STANDARD_SIGNATURE_BYTES: usize = 64;
const MAX_STANDARD_PUBKEY_BYTES: usize = 32;

/// Verifies one input's witness against the output it spends.
pub trait ScriptVerifier: Send + Sync {
    fn verify_input(
        &self,
        tx: &Transaction,
        input_index: usize,
        spent_output: &TxOutput,
        flags: VerifyFlags,
    ) -> Result<(), TxError>;
}

/// Production verifier: Ed25519 signature over the transaction sighash,
/// public key bound by BLAKE3 predicate hash.
#[derive(Debug, Default)]
pub struct Ed25519Verifier;

impl ScriptVerifier for Ed25519Verifier {
    fn verify_input(
        &self,
        tx: &Transaction,
        input_index: usize,
        spent_output: &TxOutput,
        flags: VerifyFlags,
    ) -> Result<(), TxError> {
        if flags.require_standard {
            let input = tx
                .inputs
                .get(input_index)
                .ok_or(TxError::BadSignature { index: input_index })?;
            if input.signature.len() > MAX_STANDARD_SIGNATURE_BYTES
                || input.public_key.len() > MAX_STANDARD_PUBKEY_BYTES
            {
                return Err(TxError::BadSignature { index: input_index });
            }
        }
        if flags.check_signatures {
            crypto::verify_transaction_input(tx, input_index, &spent_output.pubkey_hash)?;
        }
        Ok(())
    }
}

/// Checks a header's production proof and assigns it a work value.
pub trait ProofCheck: Send + Sync {
    /// Verify the header's proof is valid in isolation.
    fn check_header(&self, header: &BlockHeader) -> Result<(), BlockError>;

    /// Work contributed by a header with this difficulty target.
    ///
    /// Defined as `2^64 / (target + 1)`, so smaller (harder) targets yield
    /// more work. Cumulative chain work uses saturating addition in u128.
    fn header_work(&self, header: &BlockHeader) -> u128 {
        (1u128 << 64) / (header.difficulty_target as u128 + 1)
    }
}

/// Default proof check: the header hash, read as a big-endian u64 prefix,
/// must not exceed the claimed difficulty target.
///
/// Regtest networks set the minimum target to `u64::MAX` so any header
/// passes; mainnet difficulty adjustment is owned by the producer layer and
/// only the target floor is enforced here.
#[derive(Debug, Clone, Copy)]
pub struct CompactTargetProof {
    /// Easiest target this network permits.
    pub min_target: u64,
}

impl CompactTargetProof {
    pub fn new(min_target: u64) -> Self {
        Self { min_target }
    }
}

impl ProofCheck for CompactTargetProof {
    fn check_header(&self, header: &BlockHeader) -> Result<(), BlockError> {
        if header.difficulty_target > self.min_target {
            return Err(BlockError::BadProof);
        }
        let hash = header.hash();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        if u64::from_be_bytes(prefix) > header.difficulty_target {
            return Err(BlockError::BadProof);
        }
        Ok(())
    }
}

/// Work prefix sum, saturating at `u128::MAX` instead of wrapping.
pub fn accumulate_work(parent_work: u128, header_work: u128) -> u128 {
    parent_work.saturating_add(header_work)
}
