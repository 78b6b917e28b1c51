//! Core domain entities for the pack core.
//!
//! A pool entry wraps one pre-verified transaction with its ingest
//! metadata; the priority key is the value object that orders entries in
//! the scheduling queue.

use std::cmp::Ordering;

use shared_types::{Fingerprint, TxnDescriptor, VerifiedTxn};

/// One pending transaction in the pool.
///
/// Payload and descriptor are immutable from commit until removal.
#[derive(Clone, Debug)]
pub struct TxnEntry {
    /// The verified transaction (payload plus descriptor).
    pub txn: VerifiedTxn,
    /// Pool fingerprint (unique identifier).
    pub fingerprint: Fingerprint,
    /// Timestamp when committed to the pool (monotone ns).
    pub ingest_ns: i64,
}

impl TxnEntry {
    /// Creates an entry, deriving the fingerprint from the payload.
    pub fn new(txn: VerifiedTxn, ingest_ns: i64) -> Self {
        let fingerprint = txn.fingerprint();
        Self {
            txn,
            fingerprint,
            ingest_ns,
        }
    }

    /// Access descriptor.
    pub fn descriptor(&self) -> &TxnDescriptor {
        &self.txn.descriptor
    }

    /// Priority score (higher schedules first).
    pub fn priority(&self) -> u64 {
        self.txn.descriptor.priority
    }

    /// Declared compute-unit cost.
    pub fn compute_units(&self) -> u32 {
        self.txn.descriptor.compute_units
    }

    /// True for consensus vote transactions.
    pub fn is_vote(&self) -> bool {
        self.txn.descriptor.is_vote
    }

    /// The ordering key for this entry.
    pub fn priority_key(&self) -> PriorityKey {
        PriorityKey {
            priority: self.priority(),
            ingest_ns: self.ingest_ns,
            fingerprint: self.fingerprint,
        }
    }
}

/// Ordering key for the scheduling queue.
///
/// Implements `Ord` such that the *best* entry compares least: higher
/// priority first, then earlier ingest (FIFO), then ascending fingerprint
/// as a deterministic tie-break.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PriorityKey {
    /// Priority score (higher = better).
    pub priority: u64,
    /// Ingest timestamp (earlier = better for ties).
    pub ingest_ns: i64,
    /// Fingerprint (deterministic final tie-break).
    pub fingerprint: Fingerprint,
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority = earlier in iteration order (reverse comparison)
        other
            .priority
            .cmp(&self.priority)
            // Earlier ingest = higher priority (FIFO for equal scores)
            .then_with(|| self.ingest_ns.cmp(&other.ingest_ns))
            // Deterministic tie-breaker
            .then_with(|| self.fingerprint.cmp(&other.fingerprint))
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
