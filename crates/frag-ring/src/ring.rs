//! Ring construction and the producer/consumer protocol.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::slot::{FragMeta, Slot};

/// Ring construction and publication errors.
#[derive(Debug, Error)]
pub enum RingError {
    /// Ring depth must be a nonzero power of two.
    #[error("ring depth {0} is not a nonzero power of two")]
    BadDepth(u64),

    /// Payload area size must be nonzero.
    #[error("ring mtu must be nonzero")]
    ZeroMtu,

    /// Payload exceeds the ring's payload area.
    #[error("payload of {sz} bytes exceeds ring mtu {mtu}")]
    PayloadTooLarge { sz: usize, mtu: usize },

    /// A producer handle was already taken for this ring.
    #[error("ring already has a producer")]
    ProducerTaken,
}

/// A single-producer fragment ring with independent consumer cursors.
pub struct Ring {
    slots: Box<[Slot]>,
    /// Next fragment sequence to be published.
    head: AtomicU64,
    depth: u64,
    mtu: usize,
    producer_taken: AtomicBool,
}

impl Ring {
    /// Allocates a ring of `depth` slots, each with an `mtu`-byte payload
    /// area.
    pub fn new(depth: u64, mtu: usize) -> Result<Arc<Self>, RingError> {
        if depth == 0 || !depth.is_power_of_two() {
            return Err(RingError::BadDepth(depth));
        }
        if mtu == 0 {
            return Err(RingError::ZeroMtu);
        }
        let slots = (0..depth).map(|_| Slot::new(mtu)).collect::<Vec<_>>();
        Ok(Arc::new(Self {
            slots: slots.into_boxed_slice(),
            head: AtomicU64::new(0),
            depth,
            mtu,
            producer_taken: AtomicBool::new(false),
        }))
    }

    /// Ring depth in slots.
    pub fn depth(&self) -> u64 {
        self.depth
    }

    /// Payload area size per slot.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Next sequence the producer will publish (Acquire).
    #[inline]
    pub fn head(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    #[inline]
    fn publish_head(&self, next: u64) {
        // Release: the slot commit for `next - 1` is visible before the
        // head advances past it.
        self.head.store(next, Ordering::Release);
    }

    #[inline]
    fn slot(&self, frag_seq: u64) -> &Slot {
        &self.slots[(frag_seq & (self.depth - 1)) as usize]
    }
}

/// The sole producer handle for a ring.
pub struct Producer {
    ring: Arc<Ring>,
    seq: u64,
}

impl Producer {
    /// Claims the producer side of `ring`.
    ///
    /// Only one producer may exist per ring; a second claim fails.
    pub fn new(ring: Arc<Ring>) -> Result<Self, RingError> {
        if ring.producer_taken.swap(true, Ordering::AcqRel) {
            return Err(RingError::ProducerTaken);
        }
        Ok(Self { ring, seq: 0 })
    }

    /// Publishes one fragment and returns its sequence number.
    ///
    /// Never blocks: a producer that laps a slow consumer simply overwrites
    /// the oldest slot; the consumer observes the overrun.
    pub fn publish(&mut self, sig: u64, payload: &[u8], tspub: i64) -> Result<u64, RingError> {
        if payload.len() > self.ring.mtu {
            return Err(RingError::PayloadTooLarge {
                sz: payload.len(),
                mtu: self.ring.mtu,
            });
        }
        let seq = self.seq;
        let slot = self.ring.slot(seq);
        slot.mark_writing(seq);
        slot.write(sig, payload, tspub);
        slot.commit(seq);
        self.ring.publish_head(seq + 1);
        self.seq = seq + 1;
        Ok(seq)
    }

    /// Sequence number the next publish will use.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Payload area size of the underlying ring.
    pub fn mtu(&self) -> usize {
        self.ring.mtu
    }
}

/// Result of one consumer poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Poll {
    /// No fragment at the cursor yet.
    Empty,
    /// The producer lapped this consumer; `lost` fragments were skipped and
    /// the cursor now points at the oldest still-valid fragment.
    Overrun { lost: u64 },
    /// A fragment is available at the cursor. The caller must copy the
    /// payload and then re-validate with [`Consumer::still_valid`] before
    /// trusting it.
    Frag(FragMeta),
}

/// A consumer cursor over a ring.
///
/// Consumers are independent: each tracks its own position, and a slow
/// consumer is overrun rather than exerting backpressure.
pub struct Consumer {
    ring: Arc<Ring>,
    cursor: u64,
}

impl Consumer {
    /// Attaches a consumer at the current ring head.
    pub fn new(ring: Arc<Ring>) -> Self {
        let cursor = ring.head();
        Self { ring, cursor }
    }

    /// Attaches a consumer at sequence zero (sees all history still in the
    /// ring).
    pub fn from_start(ring: Arc<Ring>) -> Self {
        Self { ring, cursor: 0 }
    }

    /// Current cursor position.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Polls for the fragment at the cursor.
    pub fn poll(&mut self) -> Poll {
        let head = self.ring.head();
        if head <= self.cursor {
            return Poll::Empty;
        }
        if head - self.cursor > self.ring.depth {
            return self.skip_to(head);
        }
        let slot = self.ring.slot(self.cursor);
        if slot.holds(self.cursor) {
            Poll::Frag(slot.meta(self.cursor))
        } else {
            // The producer advanced past this slot between the head load
            // and the marker load (or is rewriting it right now).
            let head = self.ring.head();
            self.skip_to(head)
        }
    }

    /// Jumps the cursor to the oldest fragment that can still be valid
    /// given `head`, reporting how many fragments were lost.
    fn skip_to(&mut self, head: u64) -> Poll {
        let oldest = head.saturating_sub(self.ring.depth);
        let next = oldest.max(self.cursor + 1);
        let lost = next - self.cursor;
        self.cursor = next;
        Poll::Overrun { lost }
    }

    /// Speculatively copies the fragment payload into `dst`.
    ///
    /// `dst` is resized to the fragment size. The bytes are only
    /// trustworthy if [`Consumer::still_valid`] returns true afterwards.
    pub fn copy_payload(&self, meta: &FragMeta, dst: &mut Vec<u8>) {
        let len = (meta.sz as usize).min(self.ring.mtu);
        dst.resize(len, 0);
        self.ring.slot(meta.seq).copy_payload(dst, len);
    }

    /// Re-checks that the fragment observed at poll time has not been
    /// overwritten since.
    pub fn still_valid(&self, meta: &FragMeta) -> bool {
        self.ring.slot(meta.seq).holds(meta.seq)
    }

    /// Moves the cursor past the current fragment.
    pub fn advance(&mut self) {
        self.cursor += 1;
    }
}
