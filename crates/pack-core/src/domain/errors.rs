//! Error types for the pack core.
//!
//! Per-fragment failures (overrun, parse, duplicate) are not errors: they
//! are counted and the loop continues. `PackError` covers the remaining
//! conditions, almost all of which are fatal to the tile.

use thiserror::Error;

/// Result type alias for pack operations.
pub type Result<T> = std::result::Result<T, PackError>;

/// Errors surfaced by pack core operations.
#[derive(Debug, Error)]
pub enum PackError {
    /// The pending pool is at capacity; the fragment is dropped and counted.
    ///
    /// The only recoverable variant.
    #[error("pending pool full at {capacity} transactions")]
    PoolFull {
        /// Configured pool capacity.
        capacity: usize,
    },

    /// A pool data-structure invariant no longer holds. Fatal: partial
    /// index state cannot be trusted for conflict decisions.
    #[error("pool invariant violated: {0}")]
    InvariantViolation(String),

    /// A bank's idle counter moved backwards. Fatal: the counter is
    /// monotone by contract, so a regression means shared-memory
    /// corruption.
    #[error("bank {bank} counter regressed: observed {observed}, last seen {last_seen}")]
    BankCounterRegressed {
        /// Bank index.
        bank: usize,
        /// Value just read.
        observed: u64,
        /// Highest value previously read.
        last_seen: u64,
    },

    /// A `BecameLeader` arrived while already packing a slot. Fatal: the
    /// sequencer must end one slot before starting the next.
    #[error("became leader for slot {new_slot} while still leader for slot {current_slot}")]
    LeaderOverlap {
        /// Slot currently being packed.
        current_slot: u64,
        /// Slot the sequencer tried to start.
        new_slot: u64,
    },

    /// Configuration rejected at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Output-ring failure while publishing. Fatal: the tile sized its
    /// frames against the ring MTU at startup.
    #[error("ring error: {0}")]
    Ring(#[from] frag_ring::RingError),

    /// Encode failure while building an outgoing frame. Fatal for the same
    /// reason.
    #[error("wire error: {0}")]
    Wire(#[from] shared_types::WireError),
}

impl PackError {
    /// True if the tile must terminate on this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::PoolFull { .. })
    }
}
