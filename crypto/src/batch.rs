//! Bulk signature verification.
//!
//! Every item of a batch is first checked together with a single
//! multi-scalar multiplication. When that fails at least one signature is bad,
//! so the batch is re-checked item by item in parallel to find out which.

use ed25519_dalek::{Verifier, VerifyingKey};
use orv_types::{Account, Signature};
use rayon::prelude::*;

use crate::sign::{dalek_signature, verifying_key};

/// One signature to check.
pub struct SignatureCheck<'a> {
    pub message: &'a [u8],
    pub signature: &'a Signature,
    pub account: &'a Account,
}

/// Verify a set of signatures. The result has one entry per input, `true`
/// for a valid signature.
pub fn verify_batch(items: &[SignatureCheck<'_>]) -> Vec<bool> {
    if items.is_empty() {
        return Vec::new();
    }

    // Keys that are not curve points can never verify and would poison the batch.
    let keys: Vec<Option<VerifyingKey>> = items
        .iter()
        .map(|item| verifying_key(item.account))
        .collect();

    let mut messages = Vec::with_capacity(items.len());
    let mut signatures = Vec::with_capacity(items.len());
    let mut verifying_keys = Vec::with_capacity(items.len());
    for (item, key) in items.iter().zip(&keys) {
        if let Some(key) = key {
            messages.push(item.message);
            signatures.push(dalek_signature(item.signature));
            verifying_keys.push(*key);
        }
    }

    if verifying_keys.len() == items.len()
        && ed25519_dalek::verify_batch(&messages, &signatures, &verifying_keys).is_ok()
    {
        return vec![true; items.len()];
    }

    items
        .par_iter()
        .zip(keys.par_iter())
        .map(|(item, key)| match key {
            Some(key) => key
                .verify(item.message, &dalek_signature(item.signature))
                .is_ok(),
            None => false,
        })
        .collect()
}
