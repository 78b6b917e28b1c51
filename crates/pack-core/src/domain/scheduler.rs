//! # Conflict Scheduler
//!
//! Selects the next microblock for a bank: the highest-priority set of
//! pending transactions that fits the compute budget, conflicts with
//! nothing in flight, and respects the vote-share policy.
//!
//! Conflict rule: a candidate's write set must be disjoint from the
//! read-and-write sets of every in-flight microblock and of the earlier
//! selections in the microblock under construction; its read set must be
//! disjoint from their write sets. Read-read overlap is allowed.

use std::collections::HashSet;

use shared_types::{AccountKey, TxnDescriptor};

use super::entities::TxnEntry;
use super::errors::{PackError, Result};
use super::pool::PendingPool;

/// Account footprint of one dispatched-but-unacknowledged microblock.
#[derive(Debug, Default)]
struct InflightSet {
    writes: HashSet<AccountKey>,
    reads: HashSet<AccountKey>,
}

/// Greedy conflict-aware microblock builder.
#[derive(Debug)]
pub struct ConflictScheduler {
    /// One footprint per bank; empty when the bank has nothing in flight.
    inflight: Vec<InflightSet>,
}

impl ConflictScheduler {
    /// Creates a scheduler for `bank_cnt` banks.
    pub fn new(bank_cnt: usize) -> Self {
        Self {
            inflight: (0..bank_cnt).map(|_| InflightSet::default()).collect(),
        }
    }

    /// Number of banks tracked.
    pub fn bank_cnt(&self) -> usize {
        self.inflight.len()
    }

    /// Builds the next microblock for `bank` into `out` (cleared first).
    ///
    /// Returns the number of transactions selected, possibly zero; zero
    /// means no admissible transaction exists at this instant and has no
    /// side effects. On a non-zero count the selected entries are removed
    /// from the pool and their account sets become bank `bank`'s in-flight
    /// footprint.
    pub fn schedule_next(
        &mut self,
        pool: &mut PendingPool,
        bank: usize,
        budget_cus: u64,
        vote_fraction: f32,
        max_txn: usize,
        out: &mut Vec<TxnEntry>,
    ) -> Result<usize> {
        if bank >= self.inflight.len() {
            return Err(PackError::InvariantViolation(format!(
                "schedule for bank {bank} of {}",
                self.inflight.len()
            )));
        }
        out.clear();

        let mut cum_writes: HashSet<AccountKey> = HashSet::new();
        let mut cum_reads: HashSet<AccountKey> = HashSet::new();
        let mut cus_used = 0u64;
        let mut votes = 0usize;

        while out.len() < max_txn {
            let pick = {
                let remaining = budget_cus - cus_used;
                let inflight = &self.inflight;
                let fits = |entry: &TxnEntry| {
                    entry.compute_units() as u64 <= remaining
                        && admissible(inflight, &cum_writes, &cum_reads, entry.descriptor())
                };
                // Admit a vote whenever votes/max(1,selected) is below the
                // target and one is eligible; otherwise take the best
                // admissible candidate of either class.
                let want_vote =
                    (votes as f32) < vote_fraction * (out.len().max(1) as f32);
                let found = if want_vote {
                    pool.peek_best(|entry| entry.is_vote() && fits(entry))
                        .or_else(|| pool.peek_best(&fits))
                } else {
                    pool.peek_best(&fits)
                };
                found.map(|(index, _)| index)
            };
            let Some(index) = pick else {
                break;
            };

            let entry = pool.take_scheduled(index)?;
            cus_used += entry.compute_units() as u64;
            votes += entry.is_vote() as usize;
            cum_writes.extend(entry.descriptor().writable.iter().copied());
            cum_reads.extend(entry.descriptor().readonly.iter().copied());
            out.push(entry);
        }

        if !out.is_empty() {
            let set = &mut self.inflight[bank];
            set.writes.extend(cum_writes);
            set.reads.extend(cum_reads);
        }
        Ok(out.len())
    }

    /// Dissolves bank `bank`'s in-flight footprint after the bank
    /// acknowledged completion.
    pub fn microblock_complete(&mut self, bank: usize) -> Result<()> {
        let set = self.inflight.get_mut(bank).ok_or_else(|| {
            PackError::InvariantViolation(format!("complete for bank {bank}"))
        })?;
        set.writes.clear();
        set.reads.clear();
        Ok(())
    }

    /// Dissolves every in-flight footprint (end of slot).
    pub fn end_block(&mut self) {
        for set in &mut self.inflight {
            set.writes.clear();
            set.reads.clear();
        }
    }

    /// Accounts bank `bank` currently holds write locks on.
    pub fn inflight_writes(&self, bank: usize) -> impl Iterator<Item = &AccountKey> {
        self.inflight[bank].writes.iter()
    }

    /// Accounts bank `bank` currently holds read locks on.
    pub fn inflight_reads(&self, bank: usize) -> impl Iterator<Item = &AccountKey> {
        self.inflight[bank].reads.iter()
    }
}

/// True if a transaction with `descriptor` conflicts with nothing in
/// flight and nothing already selected.
fn admissible(
    inflight: &[InflightSet],
    cum_writes: &HashSet<AccountKey>,
    cum_reads: &HashSet<AccountKey>,
    descriptor: &TxnDescriptor,
) -> bool {
    for acct in &descriptor.writable {
        if cum_writes.contains(acct) || cum_reads.contains(acct) {
            return false;
        }
        if inflight
            .iter()
            .any(|set| set.writes.contains(acct) || set.reads.contains(acct))
        {
            return false;
        }
    }
    for acct in &descriptor.readonly {
        if cum_writes.contains(acct) {
            return false;
        }
        if inflight.iter().any(|set| set.writes.contains(acct)) {
            return false;
        }
    }
    true
}
