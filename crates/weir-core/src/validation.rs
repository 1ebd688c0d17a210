//! Stateless transaction validation.
//!
//! Everything here is decidable from the transaction bytes alone. Checks
//! that need chain context (coin existence, maturity, fees, finality
//! against a concrete tip) live in the chainstate crate.

use std::collections::HashSet;

use crate::constants::{LOCKTIME_THRESHOLD, MAX_COINBASE_DATA, MAX_MONEY, MAX_TX_SIZE};
use crate::error::TxError;
use crate::types::Transaction;

/// Check a transaction against all stateless consensus rules.
///
/// Rejections from this function are permanent: the transaction can never
/// become valid in any chain context.
pub fn check_transaction(tx: &Transaction) -> Result<(), TxError> {
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(TxError::EmptyInputsOrOutputs);
    }

    let size = tx.serialized_size()?;
    if size > MAX_TX_SIZE {
        return Err(TxError::Oversized {
            size,
            max: MAX_TX_SIZE,
        });
    }

    // The stake marker (output 0 of a coinstake) is the only zero-value
    // output consensus permits.
    let marker_ok = tx.is_coinstake();
    let mut total: u64 = 0;
    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value == 0 && !(marker_ok && i == 0) {
            return Err(TxError::ZeroValueOutput(i));
        }
        if output.value > MAX_MONEY {
            return Err(TxError::ValueOutOfRange);
        }
        total = total
            .checked_add(output.value)
            .ok_or(TxError::ValueOutOfRange)?;
        if total > MAX_MONEY {
            return Err(TxError::ValueOutOfRange);
        }
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.previous_output.clone()) {
            return Err(TxError::DuplicateInput(input.previous_output.to_string()));
        }
    }

    if tx.is_coinbase() {
        // The coinbase witness field carries arbitrary producer data.
        if tx.inputs[0].signature.len() > MAX_COINBASE_DATA {
            return Err(TxError::BadCoinbase("coinbase data too large".into()));
        }
    } else {
        for (i, input) in tx.inputs.iter().enumerate() {
            if input.previous_output.is_null() {
                return Err(TxError::NullOutpoint(i));
            }
        }
        // A non-coinbase transaction whose first output is the empty stake
        // marker must be a structurally complete coinstake.
        if tx.outputs[0].is_stake_marker() && !tx.is_coinstake() {
            return Err(TxError::BadCoinstake("stake marker without coinstake shape".into()));
        }
    }

    Ok(())
}

/// Whether a transaction is final at the given chain position.
///
/// Lock times below [`LOCKTIME_THRESHOLD`] are block heights, values at or
/// above it are unix timestamps compared against the tip's median time past.
pub fn is_final_at(tx: &Transaction, height: u64, median_time_past: u64) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let cutoff = if tx.lock_time < LOCKTIME_THRESHOLD {
        height
    } else {
        median_time_past
    };
    tx.lock_time < cutoff
}
