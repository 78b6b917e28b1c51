//! # Wire Formats
//!
//! Fragment signature packing and payload codecs for the rings the pack
//! core is attached to:
//!
//! - the PoH control channel (`BecameLeader` in, `DonePacking` out),
//! - the transaction ingest channels (pre-parsed and raw frames),
//! - the microblock output channel to the banks.
//!
//! Every payload that crosses a ring is copied out of the shared data
//! region before decoding, so these codecs only ever operate on owned
//! byte slices.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::{TxnDescriptor, VerifiedTxn};

/// Fragment signature value for pre-parsed transaction frames.
pub const TXN_SIG_PREPARSED: u64 = 0;

/// Fragment signature value for raw (unparsed) transaction frames.
pub const TXN_SIG_RAW: u64 = 1;

/// Bank index sentinel carried by `DonePacking` control fragments.
pub const POH_BANK_SENTINEL: u8 = u8::MAX;

/// Wire codec errors.
///
/// All of these are recoverable at fragment scope: the affected fragment is
/// discarded and counted, the loop continues.
#[derive(Debug, Error)]
pub enum WireError {
    /// Frame shorter than its fixed-layout regions require.
    #[error("frame truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    /// Embedded length field points outside the frame.
    #[error("frame length field corrupt: payload_sz {payload_sz}, frame {frame_sz}")]
    BadLength { payload_sz: usize, frame_sz: usize },

    /// Serialized region failed to decode.
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Unknown packet type in a control signature.
    #[error("unknown control packet type {0}")]
    UnknownPktType(u8),
}

/// Opaque bank handle passed through from the PoH sequencer.
///
/// The pack core never dereferences this; it is echoed back in every
/// microblock trailer so the bank can find its execution context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankHandle(pub u64);

/// Packet types on the PoH control channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PohPktType {
    /// A stamped microblock (produced by this core, consumed by banks).
    Microblock = 0,
    /// Leader transition notification (consumed by this core).
    BecameLeader = 1,
    /// End-of-slot notification (produced by this core).
    DonePacking = 2,
}

impl TryFrom<u8> for PohPktType {
    type Error = WireError;

    fn try_from(v: u8) -> Result<Self, WireError> {
        match v {
            0 => Ok(Self::Microblock),
            1 => Ok(Self::BecameLeader),
            2 => Ok(Self::DonePacking),
            other => Err(WireError::UnknownPktType(other)),
        }
    }
}

/// Decoded control-channel fragment signature.
///
/// Packed into the 64-bit fragment signature as
/// `slot (48 bits) | pkt_type (8 bits) | bank_index (8 bits)`.
/// `DonePacking` reuses the slot field to carry the microblock count, since
/// the sequencer already knows which slot it told us to pack for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PohSignature {
    /// Slot number (or microblock count for `DonePacking`).
    pub slot: u64,
    /// Packet type.
    pub pkt_type: PohPktType,
    /// Destination bank index, or `POH_BANK_SENTINEL`.
    pub bank_index: u8,
}

impl PohSignature {
    /// Packs the signature into a fragment `sig` word.
    ///
    /// The slot is truncated to 48 bits; slot numbers are bounded far below
    /// that by the epoch schedule.
    pub fn encode(&self) -> u64 {
        ((self.slot & 0xFFFF_FFFF_FFFF) << 16)
            | ((self.pkt_type as u64) << 8)
            | (self.bank_index as u64)
    }

    /// Unpacks a fragment `sig` word.
    pub fn decode(sig: u64) -> Result<Self, WireError> {
        Ok(Self {
            slot: sig >> 16,
            pkt_type: PohPktType::try_from(((sig >> 8) & 0xFF) as u8)?,
            bank_index: (sig & 0xFF) as u8,
        })
    }
}

/// Payload of a `BecameLeader` control fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BecameLeader {
    /// Opaque bank handle for the slot.
    pub bank: BankHandle,
    /// Slot start time on the monotone host clock (ns).
    pub slot_start_ns: i64,
    /// Maximum microblocks the sequencer will accept for this slot.
    pub max_microblocks_in_slot: u64,
}

impl BecameLeader {
    /// Serializes the record for the control ring.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserializes a record copied off the control ring.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Trailer appended to every microblock frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroblockTrailer {
    /// Bank handle echoed from the `BecameLeader` record.
    pub bank: BankHandle,
}

/// A microblock as published on the output ring: the selected transactions
/// followed by the bank trailer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroblockFrame {
    /// Selected transactions, in intra-microblock execution order.
    pub txns: Vec<VerifiedTxn>,
    /// Bank trailer.
    pub trailer: MicroblockTrailer,
}

impl MicroblockFrame {
    /// Serializes the frame for the output ring.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserializes a frame copied off the output ring.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

// =============================================================================
// TRANSACTION FRAME CODECS
// =============================================================================

/// Encodes a pre-parsed transaction frame (`sig == TXN_SIG_PREPARSED`).
///
/// Layout:
/// ```text
/// payload ....... (payload_sz bytes)
/// 0 or 1 byte of padding (descriptor region starts 2-aligned)
/// descriptor .... (bincode)
/// payload_sz .... (u16, little-endian)
/// ```
pub fn encode_preparsed(payload: &[u8], descriptor: &TxnDescriptor) -> Result<Vec<u8>, WireError> {
    let mut frame = Vec::with_capacity(payload.len() + 64);
    frame.extend_from_slice(payload);
    if payload.len() % 2 != 0 {
        frame.push(0);
    }
    bincode::serialize_into(&mut frame, descriptor)?;
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    Ok(frame)
}

/// Decodes a pre-parsed transaction frame into (payload, descriptor).
pub fn decode_preparsed(frame: &[u8]) -> Result<(Vec<u8>, TxnDescriptor), WireError> {
    if frame.len() < 2 {
        return Err(WireError::Truncated {
            need: 2,
            have: frame.len(),
        });
    }
    let suffix_at = frame.len() - 2;
    let payload_sz = u16::from_le_bytes([frame[suffix_at], frame[suffix_at + 1]]) as usize;
    let padded = payload_sz + (payload_sz % 2);
    if padded > suffix_at {
        return Err(WireError::BadLength {
            payload_sz,
            frame_sz: frame.len(),
        });
    }
    let descriptor: TxnDescriptor = bincode::deserialize(&frame[padded..suffix_at])?;
    Ok((frame[..payload_sz].to_vec(), descriptor))
}

/// Encodes a raw transaction frame (`sig == TXN_SIG_RAW`).
///
/// Raw frames are a self-contained envelope; the consumer parses the
/// descriptor out of the frame itself.
pub fn encode_raw(txn: &VerifiedTxn) -> Result<Vec<u8>, WireError> {
    Ok(bincode::serialize(txn)?)
}

/// Parses a raw transaction frame.
pub fn decode_raw(frame: &[u8]) -> Result<VerifiedTxn, WireError> {
    Ok(bincode::deserialize(frame)?)
}
