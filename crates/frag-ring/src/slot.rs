//! Per-fragment slot: atomic sequence marker, metadata, and payload area.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

/// Metadata of one fragment, as observed by a consumer at poll time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FragMeta {
    /// Monotone fragment sequence number.
    pub seq: u64,
    /// Semantic channel signature (format discriminator, control word).
    pub sig: u64,
    /// Payload size in bytes.
    pub sz: u32,
    /// Publish timestamp (ns on the producer's monotone clock).
    pub tspub: i64,
}

/// One slot of the metadata ring.
///
/// The `seq` field uses the LSB as a write-in-progress flag:
/// - `seq = frag_seq << 1` -> committed (even)
/// - `seq = (frag_seq << 1) | 1` -> write in progress (odd)
///
/// Readers detect both torn reads and producer laps by re-checking `seq`
/// after copying the payload: any rewrite of the slot changes the marker.
#[repr(align(64))]
pub(crate) struct Slot {
    /// Commit marker: `frag_seq << 1`, LSB=1 means write in progress.
    seq: AtomicU64,
    /// Fragment signature.
    sig: AtomicU64,
    /// Payload length in bytes.
    sz: AtomicU32,
    /// Publish timestamp.
    tspub: AtomicI64,
    /// Payload area, `mtu` bytes.
    payload: UnsafeCell<Box<[u8]>>,
}

// SAFETY: Slot is shared between one producer and any number of consumer
// threads. The payload cell is only written between mark_writing() and
// commit(); consumers copy it speculatively and discard the copy unless a
// subsequent Acquire load of `seq` proves the slot was not rewritten.
unsafe impl Send for Slot {}
unsafe impl Sync for Slot {}

impl Slot {
    /// Creates an empty slot with an `mtu`-byte payload area.
    ///
    /// The marker starts at `u64::MAX` (odd), which no committed fragment
    /// ever encodes, so an unwritten slot can never validate.
    pub(crate) fn new(mtu: usize) -> Self {
        Self {
            seq: AtomicU64::new(u64::MAX),
            sig: AtomicU64::new(0),
            sz: AtomicU32::new(0),
            tspub: AtomicI64::new(0),
            payload: UnsafeCell::new(vec![0u8; mtu].into_boxed_slice()),
        }
    }

    /// Marks the slot as write-in-progress for fragment `frag_seq`.
    #[inline]
    pub(crate) fn mark_writing(&self, frag_seq: u64) {
        // Relaxed is sufficient: the odd value tells readers "don't trust
        // the slot" regardless of ordering; synchronization happens at
        // commit() with Release.
        self.seq.store((frag_seq << 1) | 1, Ordering::Relaxed);
    }

    /// Fills the slot with one fragment's metadata and payload.
    ///
    /// Must only be called by the producer, between `mark_writing` and
    /// `commit`.
    #[inline]
    pub(crate) fn write(&self, sig: u64, payload: &[u8], tspub: i64) {
        self.sig.store(sig, Ordering::Relaxed);
        self.sz.store(payload.len() as u32, Ordering::Relaxed);
        self.tspub.store(tspub, Ordering::Relaxed);
        // SAFETY: the single producer is the only writer, and the slot is
        // marked write-in-progress, so any concurrent reader copy will fail
        // its sequence re-check and be discarded.
        unsafe {
            let dst = &mut *self.payload.get();
            std::ptr::copy_nonoverlapping(payload.as_ptr(), dst.as_mut_ptr(), payload.len());
        }
    }

    /// Commits the slot: the fragment becomes visible to consumers.
    #[inline]
    pub(crate) fn commit(&self, frag_seq: u64) {
        // Release pairs with the Acquire in marker(): all payload and
        // metadata writes above become visible before the even marker does.
        self.seq.store(frag_seq << 1, Ordering::Release);
    }

    /// Current sequence marker (Acquire).
    #[inline]
    pub(crate) fn marker(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }

    /// Returns true if the slot currently holds committed fragment `frag_seq`.
    #[inline]
    pub(crate) fn holds(&self, frag_seq: u64) -> bool {
        self.marker() == frag_seq << 1
    }

    /// Reads the metadata fields for fragment `frag_seq`.
    ///
    /// Only meaningful if `holds(frag_seq)` was observed; the caller must
    /// re-check `holds` afterwards to validate what it read.
    #[inline]
    pub(crate) fn meta(&self, frag_seq: u64) -> FragMeta {
        FragMeta {
            seq: frag_seq,
            sig: self.sig.load(Ordering::Relaxed),
            sz: self.sz.load(Ordering::Relaxed),
            tspub: self.tspub.load(Ordering::Relaxed),
        }
    }

    /// Speculatively copies `len` payload bytes into `dst`.
    ///
    /// The copy may be torn if the producer laps the consumer mid-read; the
    /// caller must validate with `holds` before trusting `dst`.
    #[inline]
    pub(crate) fn copy_payload(&self, dst: &mut [u8], len: usize) {
        // SAFETY: u8 has no invalid bit patterns, so a torn copy yields
        // garbage bytes but no undefined values; the caller discards the
        // copy unless the sequence re-check passes.
        unsafe {
            let src = &*self.payload.get();
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_mut_ptr(), len);
        }
    }
}
