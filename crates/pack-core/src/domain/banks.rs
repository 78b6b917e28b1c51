//! # Bank Tracker
//!
//! Observes per-bank liveness through shared monotone counters and gates
//! microblock dispatch.
//!
//! Each bank publishes the sequence number of the last microblock it
//! finished into its counter; the tracker compares that against the
//! sequence it last dispatched. A bank is dispatchable when both match and
//! the minimum inter-microblock spacing has elapsed. The spacing throttles
//! each bank to roughly `slot_duration / spacing` microblocks per slot so
//! the downstream sequencer is never outrun, even though the pool itself
//! is much faster.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::errors::{PackError, Result};

/// Sentinel meaning "nothing dispatched / bank idle since startup".
pub const BANK_SEQ_IDLE: u64 = u64::MAX;

/// Per-bank busy/ready state.
#[derive(Debug)]
pub struct BankTracker {
    /// Completion counters, written by the banks (wait-free reads here).
    current: Vec<Arc<AtomicU64>>,
    /// Sequence of the last microblock dispatched to each bank.
    expect: Vec<u64>,
    /// Earliest next-dispatch time per bank.
    ready_at: Vec<i64>,
    /// Highest counter value observed per bank, for regression detection.
    last_seen: Vec<u64>,
    /// Minimum inter-microblock spacing.
    spacing_ns: i64,
}

impl BankTracker {
    /// Creates a tracker for `bank_cnt` banks with the given minimum
    /// dispatch spacing.
    pub fn new(bank_cnt: usize, spacing_ns: i64) -> Self {
        Self {
            current: (0..bank_cnt)
                .map(|_| Arc::new(AtomicU64::new(BANK_SEQ_IDLE)))
                .collect(),
            expect: vec![BANK_SEQ_IDLE; bank_cnt],
            ready_at: vec![0; bank_cnt],
            last_seen: vec![BANK_SEQ_IDLE; bank_cnt],
            spacing_ns,
        }
    }

    /// Number of banks tracked.
    pub fn bank_cnt(&self) -> usize {
        self.current.len()
    }

    /// The shared counter for bank `bank`, for the bank side to publish
    /// completions into.
    pub fn counter(&self, bank: usize) -> Arc<AtomicU64> {
        Arc::clone(&self.current[bank])
    }

    /// True if bank `bank` is idle at its expected sequence and the
    /// spacing has elapsed.
    ///
    /// # Errors
    /// [`PackError::BankCounterRegressed`] if the counter moved backwards;
    /// the counter is monotone by contract.
    pub fn is_ready(&mut self, bank: usize, now_ns: i64) -> Result<bool> {
        let observed = self.current[bank].load(Ordering::Acquire);
        let last_seen = self.last_seen[bank];
        if last_seen != BANK_SEQ_IDLE && observed != BANK_SEQ_IDLE && observed < last_seen {
            return Err(PackError::BankCounterRegressed {
                bank,
                observed,
                last_seen,
            });
        }
        if observed != BANK_SEQ_IDLE {
            self.last_seen[bank] = observed;
        }
        Ok(observed == self.expect[bank] && now_ns >= self.ready_at[bank])
    }

    /// Records a dispatch of sequence `seq` to bank `bank` at time
    /// `now_ns`; the bank is busy until its counter reaches `seq` and not
    /// dispatchable again before `now_ns + spacing`.
    pub fn record_dispatch(&mut self, bank: usize, seq: u64, now_ns: i64) {
        self.expect[bank] = seq;
        self.ready_at[bank] = now_ns + self.spacing_ns;
    }
}
