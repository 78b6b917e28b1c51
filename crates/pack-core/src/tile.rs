//! # Pack Tile
//!
//! The event loop tying the components together. The loop is
//! single-threaded and cooperative: each `run_once` tick runs the three
//! phases in order, and nothing ever blocks.
//!
//! ```text
//! run_once(now)
//! ├── before_credit   cancel a staging handle left by an interrupted tick
//! ├── after_credit    slot deadline, expiry sweep, per-bank scheduling
//! │                   (at most one microblock published per tick)
//! └── ingress poll    control ring, then each transaction ring
//! ```
//!
//! Scheduling runs before ingress within a tick, so a transaction
//! committed at tick T is first eligible at tick T+1.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use frag_ring::{Consumer, Producer};
use shared_types::{
    MicroblockFrame, MicroblockTrailer, PohPktType, PohSignature, POH_BANK_SENTINEL, TXN_MTU,
};
use tracing::{debug, info};

use crate::config::PackConfig;
use crate::domain::banks::BankTracker;
use crate::domain::entities::TxnEntry;
use crate::domain::errors::{PackError, Result};
use crate::domain::leader::{LeaderState, SlotController, SlotEnd, SlotEndReason};
use crate::domain::pool::PendingPool;
use crate::domain::scheduler::ConflictScheduler;
use crate::ingress::IngressAdapter;
use crate::metrics::PackMetrics;
use crate::time::TimeSource;

/// The pack tile: owns all state, driven by `run_once` ticks.
pub struct PackTile {
    config: PackConfig,
    metrics: Arc<PackMetrics>,
    pool: PendingPool,
    scheduler: ConflictScheduler,
    banks: BankTracker,
    controller: SlotController,
    ingress: IngressAdapter,
    out: Producer,
    microblock_buf: Vec<TxnEntry>,
}

impl PackTile {
    /// Wires up a tile over its input rings and the output ring.
    pub fn new(
        config: PackConfig,
        txn_in: Vec<Consumer>,
        control_in: Consumer,
        out: Producer,
    ) -> Result<Self> {
        config.validate()?;
        if out.mtu() < TXN_MTU + 512 {
            return Err(PackError::InvalidConfig(format!(
                "output ring mtu {} cannot carry a single-transaction microblock",
                out.mtu()
            )));
        }
        info!(
            "packing microblocks of at most {} transactions to {} bank tiles",
            config.max_txn_per_microblock, config.bank_tile_count
        );
        Ok(Self {
            pool: PendingPool::new(config.max_pending_transactions),
            scheduler: ConflictScheduler::new(config.bank_tile_count),
            banks: BankTracker::new(config.bank_tile_count, config.microblock_duration_ns),
            controller: SlotController::new(config.block_duration_ns),
            ingress: IngressAdapter::new(txn_in, control_in),
            metrics: Arc::new(PackMetrics::new()),
            microblock_buf: Vec::new(),
            config,
            out,
        })
    }

    /// Shared metrics block for external observers.
    pub fn metrics(&self) -> Arc<PackMetrics> {
        Arc::clone(&self.metrics)
    }

    /// The completion counter bank `bank` publishes into.
    pub fn bank_counter(&self, bank: usize) -> Arc<AtomicU64> {
        self.banks.counter(bank)
    }

    /// Read-only view of the pending pool.
    pub fn pool(&self) -> &PendingPool {
        &self.pool
    }

    /// Current leadership state.
    pub fn leader_state(&self) -> &LeaderState {
        self.controller.state()
    }

    /// Runs one tick of the loop at time `now_ns`.
    pub fn run_once(&mut self, now_ns: i64) -> Result<()> {
        self.before_credit();
        self.after_credit(now_ns)?;
        self.ingress
            .poll(&mut self.pool, &mut self.controller, &self.metrics, now_ns)?;
        Ok(())
    }

    /// Busy-polls the loop until `shutdown` is raised or a fatal error
    /// surfaces.
    pub fn run(&mut self, clock: &dyn TimeSource, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::Relaxed) {
            self.run_once(clock.now_ns())?;
            std::hint::spin_loop();
        }
        Ok(())
    }

    /// Tick entry: reclaim a staging handle from an interrupted tick.
    fn before_credit(&mut self) {
        self.ingress.cancel_outstanding(&mut self.pool);
    }

    /// Slot bookkeeping and scheduling.
    fn after_credit(&mut self, now_ns: i64) -> Result<()> {
        // If we time out on our slot, stop being leader.
        if let Some(end) = self.controller.check_deadline(now_ns) {
            self.finish_slot(end, now_ns)?;
        }
        if !self.controller.can_pack() {
            return Ok(());
        }

        for bank in 0..self.banks.bank_cnt() {
            if !self.banks.is_ready(bank, now_ns)? {
                continue;
            }
            self.scheduler.microblock_complete(bank)?;

            let horizon = (now_ns - self.config.transaction_lifetime_ns).max(0);
            let expired = self.pool.expire_before(horizon)?;
            PackMetrics::add(&self.metrics.txns_expired, expired as u64);

            let started = Instant::now();
            let cnt = self.scheduler.schedule_next(
                &mut self.pool,
                bank,
                self.config.cus_per_microblock,
                self.config.vote_fraction,
                self.config.max_txn_per_microblock,
                &mut self.microblock_buf,
            )?;
            PackMetrics::add(
                &self.metrics.schedule_time_ns,
                started.elapsed().as_nanos() as u64,
            );
            if cnt == 0 {
                continue;
            }

            self.publish_microblock(bank, now_ns)?;
            if let Some(end) = self.controller.on_microblock() {
                self.finish_slot(end, now_ns)?;
            }
            // Burst is 1: wait for the next tick before scheduling the next
            // microblock.
            break;
        }
        Ok(())
    }

    /// Publishes the microblock staged in `microblock_buf` to `bank`.
    fn publish_microblock(&mut self, bank: usize, now_ns: i64) -> Result<()> {
        let LeaderState::Leader {
            slot,
            bank: handle,
            ..
        } = *self.controller.state()
        else {
            return Err(PackError::InvariantViolation(
                "microblock staged while not leader".into(),
            ));
        };
        let cnt = self.microblock_buf.len() as u64;
        let frame = MicroblockFrame {
            txns: self
                .microblock_buf
                .drain(..)
                .map(|entry| entry.txn)
                .collect(),
            trailer: MicroblockTrailer { bank: handle },
        };
        let sig = PohSignature {
            slot,
            pkt_type: PohPktType::Microblock,
            bank_index: bank as u8,
        };
        let seq = self.out.publish(sig.encode(), &frame.to_bytes()?, now_ns)?;
        self.banks.record_dispatch(bank, seq, now_ns);
        PackMetrics::bump(&self.metrics.microblocks_published);
        PackMetrics::add(&self.metrics.txns_scheduled, cnt);
        debug!(
            "published microblock {} for slot {} to bank {} ({} txns)",
            seq, slot, bank, cnt
        );
        Ok(())
    }

    /// Common slot teardown for all three end reasons.
    fn finish_slot(&mut self, end: SlotEnd, now_ns: i64) -> Result<()> {
        let scheduled = self.pool.scheduled_in_block();
        self.pool.end_block();
        self.scheduler.end_block();
        match end.reason {
            SlotEndReason::Skipped => {
                PackMetrics::bump(&self.metrics.slots_skipped);
                debug!("slot {} skipped: BecameLeader fragment overrun", end.slot);
            }
            SlotEndReason::MaxMicroblocks => {
                // The sequencer infers termination from the count; an extra
                // DonePacking here would terminate the next slot.
                info!(
                    "slot {} reached its cap of {} microblocks ({} transactions)",
                    end.slot, end.microblock_cnt, scheduled
                );
            }
            SlotEndReason::Deadline => {
                let sig = PohSignature {
                    slot: end.microblock_cnt,
                    pkt_type: PohPktType::DonePacking,
                    bank_index: POH_BANK_SENTINEL,
                };
                self.out.publish(sig.encode(), &[], now_ns)?;
                PackMetrics::bump(&self.metrics.done_packing_sent);
                info!(
                    "slot {} done packing: {} microblocks ({} transactions)",
                    end.slot, end.microblock_cnt, scheduled
                );
            }
        }
        Ok(())
    }
}
