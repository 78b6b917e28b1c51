//! # Leader Slot Controller
//!
//! State machine spanning "not leader" and "leader for slot S".
//!
//! `BecameLeader` control fragments are processed speculatively: the slot
//! deadline is staged while the fragment is read and only committed once
//! the overrun re-check passes. Until then the effective deadline is zero,
//! so a slot whose `BecameLeader` fragment was overrun terminates (and is
//! skipped silently) on the next tick.
//!
//! A slot ends either at its wall-clock deadline, in which case a
//! `DonePacking` notification carrying the microblock count must be sent,
//! or by reaching the microblock cap, in which case the notification must
//! NOT be sent: the sequencer auto-terminates a slot after the maximum
//! allowed microblocks, and a late `DonePacking` would terminate the
//! *next* slot it is already waiting on.

use shared_types::{BankHandle, BecameLeader};

use super::errors::{PackError, Result};

/// Current leadership state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaderState {
    /// Not packing; all scheduling is idle.
    NotLeader,
    /// Packing microblocks for `slot`.
    Leader {
        /// Slot being packed.
        slot: u64,
        /// Opaque bank handle for the slot's microblock trailers.
        bank: BankHandle,
        /// Microblocks dispatched so far in this slot.
        microblock_cnt: u64,
        /// Cap provided by the sequencer.
        max_microblocks: u64,
        /// Wall-clock end of the slot; zero until the `BecameLeader`
        /// fragment is confirmed not overrun.
        slot_end_ns: i64,
    },
}

/// Why a leader slot ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotEndReason {
    /// Wall clock passed the confirmed slot deadline.
    Deadline,
    /// The microblock cap was reached.
    MaxMicroblocks,
    /// The `BecameLeader` fragment was overrun; the slot never had a
    /// confirmed deadline and is skipped silently.
    Skipped,
}

/// Summary of a completed (or skipped) leader slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotEnd {
    /// The slot that ended.
    pub slot: u64,
    /// Microblocks dispatched during the slot.
    pub microblock_cnt: u64,
    /// Why it ended.
    pub reason: SlotEndReason,
}

impl SlotEnd {
    /// True if a `DonePacking` control fragment must be emitted for this
    /// slot end.
    pub fn emit_done_packing(&self) -> bool {
        matches!(self.reason, SlotEndReason::Deadline)
    }
}

/// The leader-slot state machine.
#[derive(Debug)]
pub struct SlotController {
    state: LeaderState,
    /// Deadline latched during speculative `BecameLeader` processing.
    staged_slot_end_ns: i64,
    block_duration_ns: i64,
}

impl SlotController {
    /// Creates a controller with the configured slot length.
    pub fn new(block_duration_ns: i64) -> Self {
        Self {
            state: LeaderState::NotLeader,
            staged_slot_end_ns: 0,
            block_duration_ns,
        }
    }

    /// Current state.
    pub fn state(&self) -> &LeaderState {
        &self.state
    }

    /// True while packing a slot.
    pub fn is_leader(&self) -> bool {
        matches!(self.state, LeaderState::Leader { .. })
    }

    /// True if another microblock may be dispatched right now.
    pub fn can_pack(&self) -> bool {
        match self.state {
            LeaderState::Leader {
                microblock_cnt,
                max_microblocks,
                ..
            } => microblock_cnt < max_microblocks,
            LeaderState::NotLeader => false,
        }
    }

    /// Slot currently being packed.
    pub fn slot(&self) -> Option<u64> {
        match self.state {
            LeaderState::Leader { slot, .. } => Some(slot),
            LeaderState::NotLeader => None,
        }
    }

    /// Bank handle for the current slot.
    pub fn bank(&self) -> Option<BankHandle> {
        match self.state {
            LeaderState::Leader { bank, .. } => Some(bank),
            LeaderState::NotLeader => None,
        }
    }

    /// Speculative half of `BecameLeader` processing: become leader with a
    /// zero deadline, staging the real deadline for [`Self::confirm`].
    ///
    /// # Errors
    /// [`PackError::LeaderOverlap`] if already packing a slot; the
    /// sequencer must end one slot before starting the next.
    pub fn stage(&mut self, slot: u64, record: &BecameLeader) -> Result<()> {
        if let LeaderState::Leader {
            slot: current_slot, ..
        } = self.state
        {
            return Err(PackError::LeaderOverlap {
                current_slot,
                new_slot: slot,
            });
        }
        self.state = LeaderState::Leader {
            slot,
            bank: record.bank,
            microblock_cnt: 0,
            max_microblocks: record.max_microblocks_in_slot,
            slot_end_ns: 0,
        };
        self.staged_slot_end_ns = record.slot_start_ns + self.block_duration_ns;
        Ok(())
    }

    /// Confirmed half: the fragment survived the overrun re-check, so the
    /// staged deadline takes effect.
    pub fn confirm(&mut self) {
        if let LeaderState::Leader { slot_end_ns, .. } = &mut self.state {
            if *slot_end_ns == 0 {
                *slot_end_ns = self.staged_slot_end_ns;
            }
        }
    }

    /// Accounts one dispatched microblock; ends the slot when the cap is
    /// reached.
    pub fn on_microblock(&mut self) -> Option<SlotEnd> {
        let LeaderState::Leader {
            slot,
            microblock_cnt,
            max_microblocks,
            ..
        } = &mut self.state
        else {
            return None;
        };
        *microblock_cnt += 1;
        if *microblock_cnt >= *max_microblocks {
            let end = SlotEnd {
                slot: *slot,
                microblock_cnt: *microblock_cnt,
                reason: SlotEndReason::MaxMicroblocks,
            };
            self.state = LeaderState::NotLeader;
            return Some(end);
        }
        None
    }

    /// Ends the slot if the wall clock has passed its deadline.
    ///
    /// A slot whose deadline was never confirmed (zero) ends immediately
    /// and silently.
    pub fn check_deadline(&mut self, now_ns: i64) -> Option<SlotEnd> {
        let LeaderState::Leader {
            slot,
            microblock_cnt,
            slot_end_ns,
            ..
        } = self.state
        else {
            return None;
        };
        if now_ns < slot_end_ns {
            return None;
        }
        let reason = if slot_end_ns == 0 {
            SlotEndReason::Skipped
        } else {
            SlotEndReason::Deadline
        };
        self.state = LeaderState::NotLeader;
        Some(SlotEnd {
            slot,
            microblock_cnt,
            reason,
        })
    }
}
