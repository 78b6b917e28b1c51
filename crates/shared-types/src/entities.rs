//! # Core Domain Entities
//!
//! Defines the transaction-level entities consumed by the pack core:
//! account keys, access descriptors, and verified transactions.

use serde::{Deserialize, Serialize};

/// A 32-byte transaction fingerprint (leading signature bytes).
pub type Fingerprint = [u8; 32];

/// Maximum transaction payload size in bytes.
///
/// Matches the network MTU minus headers; a payload larger than this can
/// never have arrived on a ring intact.
pub const TXN_MTU: usize = 1232;

/// A fixed-width opaque account identifier used as the conflict-domain key.
///
/// Two transactions conflict exactly when their access sets intersect on at
/// least one `AccountKey` in a write-involving way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountKey(pub [u8; 32]);

impl AccountKey {
    /// Builds a key with the low 8 bytes set from `v` (big-endian).
    ///
    /// Convenience for tests and fixtures; production keys arrive as raw
    /// 32-byte identifiers.
    pub fn from_low_u64(v: u64) -> Self {
        let mut key = [0u8; 32];
        key[24..].copy_from_slice(&v.to_be_bytes());
        Self(key)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Parsed access descriptor for one verified transaction.
///
/// The write and read sets drive conflict scheduling; the compute cost and
/// priority drive budget packing and ordering. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnDescriptor {
    /// Accounts this transaction writes.
    pub writable: Vec<AccountKey>,
    /// Accounts this transaction only reads.
    pub readonly: Vec<AccountKey>,
    /// Number of signers on the transaction.
    pub signer_cnt: u8,
    /// Declared compute-unit cost.
    pub compute_units: u32,
    /// Priority score (fee per compute unit scale; higher is better).
    pub priority: u64,
    /// True if this is a consensus vote transaction.
    pub is_vote: bool,
}

impl TxnDescriptor {
    /// Total number of account references (read and write).
    pub fn account_cnt(&self) -> usize {
        self.writable.len() + self.readonly.len()
    }

    /// Iterates over every account key this transaction touches.
    pub fn accounts(&self) -> impl Iterator<Item = &AccountKey> {
        self.writable.iter().chain(self.readonly.iter())
    }

    /// Returns true if `key` appears in the write set.
    pub fn writes(&self, key: &AccountKey) -> bool {
        self.writable.contains(key)
    }
}

/// A pre-verified transaction: opaque payload plus its parsed descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedTxn {
    /// Raw payload bytes as they will be handed to a bank (<= `TXN_MTU`).
    pub payload: Vec<u8>,
    /// Parsed access descriptor.
    pub descriptor: TxnDescriptor,
}

impl VerifiedTxn {
    /// Derives the pool fingerprint from the leading payload bytes.
    ///
    /// The payload begins with the transaction's first signature, which is
    /// unique per transaction, so the first 32 bytes identify it. Shorter
    /// payloads are zero-padded.
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint_of(&self.payload)
    }
}

/// Fingerprint of a raw payload; see [`VerifiedTxn::fingerprint`].
pub fn fingerprint_of(payload: &[u8]) -> Fingerprint {
    let mut fp = [0u8; 32];
    let n = payload.len().min(32);
    fp[..n].copy_from_slice(&payload[..n]);
    fp
}
