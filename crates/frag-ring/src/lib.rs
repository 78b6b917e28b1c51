//! # Fragment Ring
//!
//! Lock-free single-producer fragment transport with independent consumer
//! cursors, modeled on shared-memory metadata-cache rings.
//!
//! A ring is a power-of-two array of slots. The producer publishes fragment
//! `s` by writing the payload and metadata into slot `s % depth`, then
//! committing the slot's sequence marker, then advancing the ring head. A
//! consumer reads the head, speculatively copies the slot contents, and
//! re-reads the sequence marker to detect that the producer lapped it
//! mid-copy (an *overrun*). Overruns are recoverable: the consumer skips
//! forward to the oldest still-valid fragment and reports how many it lost.
//!
//! ## Memory Ordering Strategy
//!
//! - **Release** on `commit` and head publication: all payload and metadata
//!   writes become visible before the sequence marker / head does.
//! - **Acquire** on consumer loads of the head and the slot sequence: pairs
//!   with the Release stores to establish happens-before.
//! - **Relaxed** on `mark_writing` and the metadata fields: the odd
//!   sequence value itself tells readers not to trust the slot; the
//!   metadata fields are only read after an Acquire load of the sequence
//!   observed the committed value, and re-validated after the copy.
//!
//! The 64-bit fragment sequence (63 usable bits; the LSB of the slot marker
//! is the write-in-progress flag) cannot wrap in any realistic deployment.

mod ring;
mod slot;

pub use ring::{Consumer, Poll, Producer, Ring, RingError};
pub use slot::FragMeta;
