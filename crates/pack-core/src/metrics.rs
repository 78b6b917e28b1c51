//! Metrics collection for the pack core.
//!
//! Every recoverable failure class is a monotone counter; external readers
//! observe the shared struct lock-free. The error taxonomy is reported
//! here, not through the error type.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::pool::{InsertOutcome, RejectReason};

/// Monotone counters published by the pack tile.
#[derive(Debug, Default)]
pub struct PackMetrics {
    // Insert outcome classes (one per InsertOutcome variant)
    /// Transactions accepted into an empty fingerprint slot.
    pub txn_accepted_new: AtomicU64,
    /// Transactions accepted by replacing a lower-priority duplicate.
    pub txn_accepted_replace: AtomicU64,
    /// Dropped: duplicate of a higher-priority entry.
    pub txn_dropped_duplicate: AtomicU64,
    /// Dropped: already older than the expiry horizon.
    pub txn_dropped_stale: AtomicU64,
    /// Dropped: malformed payload or descriptor.
    pub txn_dropped_invalid: AtomicU64,
    /// Dropped: pool at capacity.
    pub txn_dropped_capacity: AtomicU64,

    // Ingest
    /// Pre-parsed transaction fragments received.
    pub normal_txn_received: AtomicU64,
    /// Raw (gossiped vote) fragments received.
    pub gossiped_votes_received: AtomicU64,
    /// Fragments lost to producer overrun on transaction rings.
    pub ingest_overruns: AtomicU64,
    /// Raw fragments whose descriptor parse failed.
    pub parse_failures: AtomicU64,
    /// Fragments lost to overrun on the control ring.
    pub control_overruns: AtomicU64,
    /// Control fragments discarded as not-interesting.
    pub control_filtered: AtomicU64,

    // Scheduling
    /// Microblocks published across all banks.
    pub microblocks_published: AtomicU64,
    /// Transactions scheduled into microblocks.
    pub txns_scheduled: AtomicU64,
    /// Transactions removed by TTL expiry.
    pub txns_expired: AtomicU64,
    /// Leader slots entered.
    pub slots_started: AtomicU64,
    /// Leader slots skipped because the BecameLeader fragment was overrun.
    pub slots_skipped: AtomicU64,
    /// DonePacking notifications emitted.
    pub done_packing_sent: AtomicU64,

    // Phase timing (cumulative)
    /// Total time spent committing transactions into the pool.
    pub insert_time_ns: AtomicU64,
    /// Total time spent in microblock selection.
    pub schedule_time_ns: AtomicU64,
}

impl PackMetrics {
    /// Creates a zeroed metrics block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one commit outcome.
    pub fn record_insert(&self, outcome: &InsertOutcome) {
        let counter = match outcome {
            InsertOutcome::AcceptedNew => &self.txn_accepted_new,
            InsertOutcome::AcceptedReplace { .. } => &self.txn_accepted_replace,
            InsertOutcome::Rejected(RejectReason::DuplicateOfHigher) => {
                &self.txn_dropped_duplicate
            }
            InsertOutcome::Rejected(RejectReason::Stale) => &self.txn_dropped_stale,
            InsertOutcome::Rejected(RejectReason::Invalid) => &self.txn_dropped_invalid,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Increments a counter by one.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads a counter.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Average selection time per published microblock, in nanoseconds.
    pub fn avg_schedule_time_ns(&self) -> f64 {
        let published = Self::get(&self.microblocks_published);
        if published == 0 {
            return 0.0;
        }
        Self::get(&self.schedule_time_ns) as f64 / published as f64
    }

    /// Average commit time per accepted transaction, in nanoseconds.
    pub fn avg_insert_time_ns(&self) -> f64 {
        let accepted =
            Self::get(&self.txn_accepted_new) + Self::get(&self.txn_accepted_replace);
        if accepted == 0 {
            return 0.0;
        }
        Self::get(&self.insert_time_ns) as f64 / accepted as f64
    }
}
