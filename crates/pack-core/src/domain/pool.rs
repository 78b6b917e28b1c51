//! # Pending Pool - Priority Queue with Conflict Indexing and Expiry
//!
//! The bounded collection of pending transactions awaiting scheduling.
//!
//! ## Data Structures
//!
//! - `entries`: arena of slots addressed by stable `u32` indices
//! - `by_fingerprint`: O(1) lookup by transaction fingerprint
//! - `by_priority`: O(log n) scheduling queue (BTreeMap keyed by
//!   [`PriorityKey`])
//! - `acct_writers` / `acct_readers`: conflict index, account key to the
//!   set of entries touching it
//! - `by_expiry`: O(log n) ingest-ordered index for TTL sweeps
//!
//! ## Invariants Enforced
//!
//! - INVARIANT-1: `by_fingerprint` and `by_priority` hold exactly the
//!   same entries
//! - INVARIANT-2: every live entry appears in the account index for every
//!   key it touches
//! - INVARIANT-3: live size never exceeds the configured capacity
//! - INVARIANT-4: entries older than the expiry watermark are absent
//!
//! Index updates are transactional: any partial state detected during an
//! update surfaces as a fatal [`PackError::InvariantViolation`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use shared_types::{AccountKey, Fingerprint, TxnDescriptor, VerifiedTxn, TXN_MTU};

use super::entities::{PriorityKey, TxnEntry};
use super::errors::{PackError, Result};

/// A reserved staging slot.
///
/// The handle exclusively owns the writable staging area for one incoming
/// transaction; the pool slot it names stays off the free list until the
/// handle is committed or cancelled.
#[derive(Debug)]
pub struct Handle {
    index: u32,
    /// Staged payload bytes.
    pub payload: Vec<u8>,
    /// Staged descriptor, once parsed or copied.
    pub descriptor: Option<TxnDescriptor>,
}

/// Classified result of a commit, reported as distinct metrics classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Installed; no prior entry with this fingerprint.
    AcceptedNew,
    /// Installed, evicting a strictly lower-priority entry with the same
    /// fingerprint.
    AcceptedReplace {
        /// Fingerprint of the evicted entry.
        evicted: Fingerprint,
    },
    /// Dropped.
    Rejected(RejectReason),
}

/// Why a staged transaction was dropped at commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// An entry with the same fingerprint and higher (or equal, earlier)
    /// priority is already pooled.
    DuplicateOfHigher,
    /// Ingest timestamp already behind the expiry watermark.
    Stale,
    /// Empty or oversized payload, missing descriptor, zero cost, or no
    /// account references.
    Invalid,
}

/// Bounded priority-ordered pool of pending transactions.
#[derive(Debug, Default)]
pub struct PendingPool {
    /// Arena; `None` slots are free or staged.
    entries: Vec<Option<TxnEntry>>,
    /// Free arena indices.
    free: Vec<u32>,
    /// Number of reserved-but-uncommitted handles.
    outstanding: usize,
    by_fingerprint: HashMap<Fingerprint, u32>,
    by_priority: BTreeMap<PriorityKey, u32>,
    acct_writers: HashMap<AccountKey, HashSet<u32>>,
    acct_readers: HashMap<AccountKey, HashSet<u32>>,
    by_expiry: BTreeSet<(i64, u32)>,
    /// Highest horizon passed to `expire_before`; commits behind it are
    /// stale.
    expired_watermark: i64,
    /// Transactions scheduled since the last `end_block`.
    scheduled_in_block: u64,
}

impl PendingPool {
    /// Creates a pool with room for `capacity` transactions.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: (0..capacity).map(|_| None).collect(),
            free: (0..capacity as u32).rev().collect(),
            ..Self::default()
        }
    }

    /// Number of live (committed) entries.
    pub fn len(&self) -> usize {
        self.by_fingerprint.len()
    }

    /// True if no entries are live.
    pub fn is_empty(&self) -> bool {
        self.by_fingerprint.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Transactions scheduled since the last `end_block`.
    pub fn scheduled_in_block(&self) -> u64 {
        self.scheduled_in_block
    }

    /// Reserves a staging slot.
    ///
    /// # Errors
    /// - [`PackError::PoolFull`] when every slot is live or staged
    ///   (recoverable: the fragment is dropped and counted).
    /// - [`PackError::InvariantViolation`] if the free list is exhausted on
    ///   a pool that is not actually full (fatal).
    pub fn reserve(&mut self) -> Result<Handle> {
        let Some(index) = self.free.pop() else {
            if self.len() + self.outstanding < self.entries.len() {
                return Err(PackError::InvariantViolation(format!(
                    "free list empty with {} live + {} staged of {} slots",
                    self.len(),
                    self.outstanding,
                    self.entries.len()
                )));
            }
            return Err(PackError::PoolFull {
                capacity: self.entries.len(),
            });
        };
        self.outstanding += 1;
        Ok(Handle {
            index,
            payload: Vec::new(),
            descriptor: None,
        })
    }

    /// Returns a reserved slot to the free pool without installing.
    ///
    /// Used when the producer overran the fragment mid-copy.
    pub fn cancel(&mut self, handle: Handle) {
        self.outstanding -= 1;
        self.free.push(handle.index);
    }

    /// Atomically installs the staged transaction.
    ///
    /// On fingerprint collision the strictly higher-priority entry is kept
    /// (ties keep the earlier-ingested incumbent).
    pub fn commit(&mut self, handle: Handle, ingest_ns: i64) -> Result<InsertOutcome> {
        let Handle {
            index,
            payload,
            descriptor,
        } = handle;
        self.outstanding -= 1;

        let Some(descriptor) = descriptor else {
            self.free.push(index);
            return Ok(InsertOutcome::Rejected(RejectReason::Invalid));
        };
        if payload.is_empty()
            || payload.len() > TXN_MTU
            || descriptor.account_cnt() == 0
            || descriptor.compute_units == 0
            || has_duplicate_accounts(&descriptor)
        {
            self.free.push(index);
            return Ok(InsertOutcome::Rejected(RejectReason::Invalid));
        }
        if ingest_ns < self.expired_watermark {
            self.free.push(index);
            return Ok(InsertOutcome::Rejected(RejectReason::Stale));
        }

        let entry = TxnEntry::new(
            VerifiedTxn {
                payload,
                descriptor,
            },
            ingest_ns,
        );
        let fingerprint = entry.fingerprint;

        if let Some(&existing_index) = self.by_fingerprint.get(&fingerprint) {
            let existing_key = self
                .entry_ref(existing_index)?
                .priority_key();
            if entry.priority_key() < existing_key {
                self.evict(existing_index)?;
                self.install(index, entry)?;
                return Ok(InsertOutcome::AcceptedReplace {
                    evicted: fingerprint,
                });
            }
            self.free.push(index);
            return Ok(InsertOutcome::Rejected(RejectReason::DuplicateOfHigher));
        }

        self.install(index, entry)?;
        Ok(InsertOutcome::AcceptedNew)
    }

    /// Removes every entry with `ingest_ns < horizon_ns`; returns the count.
    ///
    /// Calling with a horizon at or below a previous one is a no-op.
    pub fn expire_before(&mut self, horizon_ns: i64) -> Result<usize> {
        if horizon_ns > self.expired_watermark {
            self.expired_watermark = horizon_ns;
        }
        let mut removed = 0;
        while let Some(&(ingest_ns, index)) = self.by_expiry.iter().next() {
            if ingest_ns >= horizon_ns {
                break;
            }
            self.evict(index)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Highest-priority entry satisfying `filter`, if any.
    ///
    /// Linear in the number of entries rejected by the filter before the
    /// first match.
    pub fn peek_best<F>(&self, filter: F) -> Option<(u32, &TxnEntry)>
    where
        F: Fn(&TxnEntry) -> bool,
    {
        for &index in self.by_priority.values() {
            if let Some(entry) = self.entries[index as usize].as_ref() {
                if filter(entry) {
                    return Some((index, entry));
                }
            }
        }
        None
    }

    /// Removes an entry selected for scheduling.
    pub fn take_scheduled(&mut self, index: u32) -> Result<TxnEntry> {
        let entry = self.evict(index)?;
        self.scheduled_in_block += 1;
        Ok(entry)
    }

    /// Removes an entry by fingerprint.
    pub fn remove(&mut self, fingerprint: &Fingerprint) -> Result<Option<TxnEntry>> {
        match self.by_fingerprint.get(fingerprint).copied() {
            Some(index) => Ok(Some(self.evict(index)?)),
            None => Ok(None),
        }
    }

    /// Advisory reset of per-block bookkeeping. Removes nothing.
    pub fn end_block(&mut self) {
        self.scheduled_in_block = 0;
    }

    fn entry_ref(&self, index: u32) -> Result<&TxnEntry> {
        self.entries[index as usize].as_ref().ok_or_else(|| {
            PackError::InvariantViolation(format!("index {index} maps to an empty arena slot"))
        })
    }

    /// Installs `entry` at arena slot `index`, updating every index
    /// together.
    fn install(&mut self, index: u32, entry: TxnEntry) -> Result<()> {
        let key = entry.priority_key();
        if self.by_priority.insert(key, index).is_some() {
            return Err(PackError::InvariantViolation(
                "duplicate priority key on install".into(),
            ));
        }
        if self.by_fingerprint.insert(entry.fingerprint, index).is_some() {
            return Err(PackError::InvariantViolation(
                "duplicate fingerprint on install".into(),
            ));
        }
        for acct in &entry.txn.descriptor.writable {
            self.acct_writers.entry(*acct).or_default().insert(index);
        }
        for acct in &entry.txn.descriptor.readonly {
            self.acct_readers.entry(*acct).or_default().insert(index);
        }
        self.by_expiry.insert((entry.ingest_ns, index));
        self.entries[index as usize] = Some(entry);
        Ok(())
    }

    /// Removes the entry at `index` from every structure and frees the
    /// slot.
    fn evict(&mut self, index: u32) -> Result<TxnEntry> {
        let entry = self.entries[index as usize].take().ok_or_else(|| {
            PackError::InvariantViolation(format!("evict of empty arena slot {index}"))
        })?;

        if self.by_priority.remove(&entry.priority_key()) != Some(index) {
            return Err(PackError::InvariantViolation(
                "priority index out of sync on evict".into(),
            ));
        }
        if self.by_fingerprint.remove(&entry.fingerprint) != Some(index) {
            return Err(PackError::InvariantViolation(
                "fingerprint index out of sync on evict".into(),
            ));
        }
        for acct in &entry.txn.descriptor.writable {
            if !Self::unindex(&mut self.acct_writers, acct, index) {
                return Err(PackError::InvariantViolation(
                    "writer index out of sync on evict".into(),
                ));
            }
        }
        for acct in &entry.txn.descriptor.readonly {
            if !Self::unindex(&mut self.acct_readers, acct, index) {
                return Err(PackError::InvariantViolation(
                    "reader index out of sync on evict".into(),
                ));
            }
        }
        if !self.by_expiry.remove(&(entry.ingest_ns, index)) {
            return Err(PackError::InvariantViolation(
                "expiry index out of sync on evict".into(),
            ));
        }
        self.free.push(index);
        Ok(entry)
    }

    fn unindex(
        map: &mut HashMap<AccountKey, HashSet<u32>>,
        acct: &AccountKey,
        index: u32,
    ) -> bool {
        let Some(set) = map.get_mut(acct) else {
            return false;
        };
        let removed = set.remove(&index);
        if set.is_empty() {
            map.remove(acct);
        }
        removed
    }

    /// Exhaustively validates I1-I3 and the expiry index. Test and
    /// diagnostics aid; linear in pool size.
    pub fn check_invariants(&self) -> Result<()> {
        let live = self.entries.iter().filter(|e| e.is_some()).count();
        if live != self.by_fingerprint.len()
            || live != self.by_priority.len()
            || live != self.by_expiry.len()
        {
            return Err(PackError::InvariantViolation(format!(
                "index sizes diverge: arena {live}, fingerprint {}, priority {}, expiry {}",
                self.by_fingerprint.len(),
                self.by_priority.len(),
                self.by_expiry.len()
            )));
        }
        if live > self.capacity() {
            return Err(PackError::InvariantViolation(format!(
                "{live} live entries exceed capacity {}",
                self.capacity()
            )));
        }
        if live + self.outstanding + self.free.len() != self.entries.len() {
            return Err(PackError::InvariantViolation(
                "arena accounting does not sum to capacity".into(),
            ));
        }
        for (key, &index) in &self.by_priority {
            let entry = self.entry_ref(index)?;
            if entry.priority_key() != *key {
                return Err(PackError::InvariantViolation(format!(
                    "priority key mismatch at index {index}"
                )));
            }
            if self.by_fingerprint.get(&entry.fingerprint) != Some(&index) {
                return Err(PackError::InvariantViolation(format!(
                    "fingerprint index mismatch at index {index}"
                )));
            }
            for acct in &entry.txn.descriptor.writable {
                if !self
                    .acct_writers
                    .get(acct)
                    .is_some_and(|set| set.contains(&index))
                {
                    return Err(PackError::InvariantViolation(format!(
                        "writer index missing entry {index}"
                    )));
                }
            }
            for acct in &entry.txn.descriptor.readonly {
                if !self
                    .acct_readers
                    .get(acct)
                    .is_some_and(|set| set.contains(&index))
                {
                    return Err(PackError::InvariantViolation(format!(
                        "reader index missing entry {index}"
                    )));
                }
            }
        }
        for set in self.acct_writers.values().chain(self.acct_readers.values()) {
            for &index in set {
                self.entry_ref(index)?;
            }
        }
        Ok(())
    }
}

/// A descriptor may reference each account at most once; the strict
/// accounting in `evict` relies on it.
fn has_duplicate_accounts(descriptor: &TxnDescriptor) -> bool {
    let mut seen = HashSet::new();
    descriptor.accounts().any(|acct| !seen.insert(*acct))
}
