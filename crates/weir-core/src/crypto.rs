//! Ed25519 signing for the default locking predicate.
//!
//! The predicate stored in a [`TxOutput`](crate::types::TxOutput) is the
//! BLAKE3 hash of the owner's public key; an input unlocks it by revealing
//! the key and an Ed25519 signature over the transaction sighash.
//!
//! The sighash commits to the version, every input outpoint, every output,
//! the lock time, and the index of the input being signed. Witness bytes
//! are excluded so inputs can be signed independently in any order.

use ed25519_dalek::{Signer, Verifier};
use std::fmt;

use crate::error::TxError;
use crate::types::{Hash256, Transaction};

/// Ed25519 keypair for signing transaction inputs.
pub struct KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Generate a random keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Create a keypair from 32-byte secret key material.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&bytes),
        }
    }

    /// Raw public key bytes.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// The BLAKE3 predicate hash of this keypair's public key.
    pub fn pubkey_hash(&self) -> Hash256 {
        pubkey_hash(&self.public_key_bytes())
    }

    /// Sign a message, returning the raw 64-byte Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

/// Compute the BLAKE3 predicate hash from raw public key bytes.
pub fn pubkey_hash(pubkey_bytes: &[u8; 32]) -> Hash256 {
    Hash256(blake3::hash(pubkey_bytes).into())
}

/// Compute the signing hash (sighash) for one input of a transaction.
pub fn signing_hash(tx: &Transaction, input_index: usize) -> Result<Hash256, TxError> {
    if input_index >= tx.inputs.len() {
        return Err(TxError::BadSignature { index: input_index });
    }

    let mut data = Vec::new();
    data.extend_from_slice(&tx.version.to_le_bytes());

    data.extend_from_slice(&(tx.inputs.len() as u64).to_le_bytes());
    for input in &tx.inputs {
        data.extend_from_slice(input.previous_output.txid.as_bytes());
        data.extend_from_slice(&input.previous_output.index.to_le_bytes());
    }

    data.extend_from_slice(&(tx.outputs.len() as u64).to_le_bytes());
    for output in &tx.outputs {
        data.extend_from_slice(&output.value.to_le_bytes());
        data.extend_from_slice(output.pubkey_hash.as_bytes());
    }

    data.extend_from_slice(&tx.lock_time.to_le_bytes());
    data.extend_from_slice(&(input_index as u64).to_le_bytes());

    Ok(Hash256(blake3::hash(&data).into()))
}

/// Sign a transaction input in place, writing the signature and public key
/// into its witness fields.
pub fn sign_transaction_input(
    tx: &mut Transaction,
    input_index: usize,
    keypair: &KeyPair,
) -> Result<(), TxError> {
    let sighash = signing_hash(tx, input_index)?;
    let signature = keypair.sign(sighash.as_bytes());
    let pubkey = keypair.public_key_bytes();
    tx.inputs[input_index].signature = signature.to_vec();
    tx.inputs[input_index].public_key = pubkey.to_vec();
    Ok(())
}

/// Verify one input's witness against the predicate hash of the coin it
/// spends.
///
/// Checks that the revealed public key hashes to `expected_pubkey_hash` and
/// that the Ed25519 signature verifies over the sighash.
pub fn verify_transaction_input(
    tx: &Transaction,
    input_index: usize,
    expected_pubkey_hash: &Hash256,
) -> Result<(), TxError> {
    let input = tx
        .inputs
        .get(input_index)
        .ok_or(TxError::BadSignature { index: input_index })?;

    let pk_bytes: [u8; 32] = input
        .public_key
        .as_slice()
        .try_into()
        .map_err(|_| TxError::BadSignature { index: input_index })?;
    let vk = ed25519_dalek::VerifyingKey::from_bytes(&pk_bytes)
        .map_err(|_| TxError::BadSignature { index: input_index })?;

    if pubkey_hash(&pk_bytes) != *expected_pubkey_hash {
        return Err(TxError::BadSignature { index: input_index });
    }

    let sig_bytes: [u8; 64] = input
        .signature
        .as_slice()
        .try_into()
        .map_err(|_| TxError::BadSignature { index: input_index })?;
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);

    let sighash = signing_hash(tx, input_index)?;
    vk.verify(sighash.as_bytes(), &sig)
        .map_err(|_| TxError::BadSignature { index: input_index })
}
