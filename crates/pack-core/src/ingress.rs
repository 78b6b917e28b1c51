//! # Ingress Adapter
//!
//! Consumes fragments from the transaction rings and the PoH control ring.
//!
//! Per-fragment protocol:
//! 1. note the metadata (control fragments that are not `BecameLeader` are
//!    discarded here),
//! 2. reserve a pool staging handle (transaction rings),
//! 3. speculatively copy the payload out of the shared data region,
//! 4. re-check the fragment for producer overrun,
//! 5. parse from the private copy and commit (or cancel).
//!
//! The copy out of the ring is the speculative step; decoding always runs
//! on the validated private copy, so no pointer into the producer's buffer
//! survives the overrun re-check.

use std::time::Instant;

use frag_ring::{Consumer, Poll};
use shared_types::{
    BecameLeader, PohPktType, PohSignature, WireError, TXN_SIG_PREPARSED, TXN_SIG_RAW,
};
use tracing::{debug, info, warn};

use crate::domain::errors::Result;
use crate::domain::leader::SlotController;
use crate::domain::pool::{Handle, PendingPool};
use crate::metrics::PackMetrics;

/// Multiplexes the tile's input rings into pool commits and leader
/// transitions.
pub struct IngressAdapter {
    txn_in: Vec<Consumer>,
    control_in: Consumer,
    /// Staging handle for the fragment currently being processed. Left
    /// behind only if a tick is interrupted; `cancel_outstanding` reclaims
    /// it.
    staged: Option<Handle>,
    scratch: Vec<u8>,
}

impl IngressAdapter {
    /// Creates an adapter over `txn_in` transaction rings and the control
    /// ring.
    pub fn new(txn_in: Vec<Consumer>, control_in: Consumer) -> Self {
        Self {
            txn_in,
            control_in,
            staged: None,
            scratch: Vec::new(),
        }
    }

    /// Unconditionally cancels a staging handle left over from an
    /// interrupted tick. Runs at every tick entry.
    pub fn cancel_outstanding(&mut self, pool: &mut PendingPool) {
        if let Some(handle) = self.staged.take() {
            pool.cancel(handle);
            debug!("cancelled staging handle left by interrupted tick");
        }
    }

    /// Polls the control ring and each transaction ring for at most one
    /// fragment each; returns the number of fragments consumed.
    pub fn poll(
        &mut self,
        pool: &mut PendingPool,
        controller: &mut SlotController,
        metrics: &PackMetrics,
        now_ns: i64,
    ) -> Result<usize> {
        let mut processed = 0;
        processed += usize::from(self.poll_control(controller, metrics)?);
        for ring in 0..self.txn_in.len() {
            processed += usize::from(self.poll_txn_ring(ring, pool, metrics, now_ns)?);
        }
        Ok(processed)
    }

    fn poll_txn_ring(
        &mut self,
        ring: usize,
        pool: &mut PendingPool,
        metrics: &PackMetrics,
        now_ns: i64,
    ) -> Result<bool> {
        let meta = match self.txn_in[ring].poll() {
            Poll::Empty => return Ok(false),
            Poll::Overrun { lost } => {
                PackMetrics::add(&metrics.ingest_overruns, lost);
                debug!("transaction ring {} overrun, {} fragments lost", ring, lost);
                return Ok(true);
            }
            Poll::Frag(meta) => meta,
        };

        match meta.sig {
            TXN_SIG_PREPARSED => PackMetrics::bump(&metrics.normal_txn_received),
            TXN_SIG_RAW => PackMetrics::bump(&metrics.gossiped_votes_received),
            _ => {}
        }

        let handle = match pool.reserve() {
            Ok(handle) => handle,
            Err(err) if !err.is_fatal() => {
                PackMetrics::bump(&metrics.txn_dropped_capacity);
                self.txn_in[ring].advance();
                return Ok(true);
            }
            Err(err) => return Err(err),
        };
        self.staged = Some(handle);

        self.txn_in[ring].copy_payload(&meta, &mut self.scratch);
        if !self.txn_in[ring].still_valid(&meta) {
            if let Some(handle) = self.staged.take() {
                pool.cancel(handle);
            }
            PackMetrics::bump(&metrics.ingest_overruns);
            self.txn_in[ring].advance();
            return Ok(true);
        }
        self.txn_in[ring].advance();

        let Some(mut handle) = self.staged.take() else {
            return Ok(true);
        };
        match stage_frame(&mut handle, meta.sig, &self.scratch) {
            Ok(()) => {
                let start = Instant::now();
                let outcome = pool.commit(handle, now_ns)?;
                PackMetrics::add(&metrics.insert_time_ns, start.elapsed().as_nanos() as u64);
                metrics.record_insert(&outcome);
            }
            Err(err) => {
                pool.cancel(handle);
                PackMetrics::bump(&metrics.parse_failures);
                warn!("transaction frame parse failed on ring {}: {}", ring, err);
            }
        }
        Ok(true)
    }

    fn poll_control(
        &mut self,
        controller: &mut SlotController,
        metrics: &PackMetrics,
    ) -> Result<bool> {
        let meta = match self.control_in.poll() {
            Poll::Empty => return Ok(false),
            Poll::Overrun { lost } => {
                PackMetrics::add(&metrics.control_overruns, lost);
                warn!("control ring overrun, {} fragments lost", lost);
                return Ok(true);
            }
            Poll::Frag(meta) => meta,
        };

        let sig = match PohSignature::decode(meta.sig) {
            Ok(sig) if sig.pkt_type == PohPktType::BecameLeader => sig,
            _ => {
                // Not interested in stamped microblocks, only leader
                // updates.
                PackMetrics::bump(&metrics.control_filtered);
                self.control_in.advance();
                return Ok(true);
            }
        };

        self.control_in.copy_payload(&meta, &mut self.scratch);
        match BecameLeader::from_bytes(&self.scratch) {
            Ok(record) => {
                // Speculative: become leader with a zero deadline; only a
                // fragment that survives the re-check commits the real one.
                controller.stage(sig.slot, &record)?;
                if self.control_in.still_valid(&meta) {
                    controller.confirm();
                    PackMetrics::bump(&metrics.slots_started);
                    info!(
                        "became leader for slot {} ({} microblocks max)",
                        sig.slot, record.max_microblocks_in_slot
                    );
                } else {
                    PackMetrics::bump(&metrics.control_overruns);
                    warn!(
                        "BecameLeader fragment for slot {} overrun; slot will be skipped",
                        sig.slot
                    );
                }
                self.control_in.advance();
                Ok(true)
            }
            Err(err) => {
                if self.control_in.still_valid(&meta) {
                    // The fragment is intact, so the control stream itself
                    // is corrupt.
                    return Err(err.into());
                }
                PackMetrics::bump(&metrics.control_overruns);
                self.control_in.advance();
                Ok(true)
            }
        }
    }
}

/// Decodes a validated frame copy into the staging handle.
fn stage_frame(handle: &mut Handle, sig: u64, frame: &[u8]) -> std::result::Result<(), WireError> {
    match sig {
        TXN_SIG_PREPARSED => {
            let (payload, descriptor) = shared_types::decode_preparsed(frame)?;
            handle.payload = payload;
            handle.descriptor = Some(descriptor);
        }
        TXN_SIG_RAW => {
            let txn = shared_types::decode_raw(frame)?;
            handle.payload = txn.payload;
            handle.descriptor = Some(txn.descriptor);
        }
        _ => {
            // Unknown sub-format: stage the bytes without a descriptor so
            // the commit classifies it as invalid.
            handle.payload = frame.to_vec();
            handle.descriptor = None;
        }
    }
    Ok(())
}
