//! Configuration types for the pack core.

use serde::Deserialize;

use crate::domain::errors::{PackError, Result};

/// Hard upper bound on bank consumers.
pub const MAX_BANK_TILES: usize = 16;

/// Runtime configuration for the pack tile.
///
/// All durations are in nanoseconds on the monotone host clock.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// Capacity of the pending pool.
    pub max_pending_transactions: usize,

    /// Number of bank consumers (1..=[`MAX_BANK_TILES`]).
    pub bank_tile_count: usize,

    /// Per-microblock compute budget.
    pub cus_per_microblock: u64,

    /// Target vote share within a microblock.
    pub vote_fraction: f32,

    /// Minimum inter-microblock spacing per bank.
    ///
    /// Caps microblocks per slot near `block_duration / spacing` per bank,
    /// deliberately throttling below the sequencer's downstream capacity.
    pub microblock_duration_ns: i64,

    /// Slot length.
    pub block_duration_ns: i64,

    /// Pool TTL for pending transactions.
    pub transaction_lifetime_ns: i64,

    /// Upper bound on transactions per microblock.
    pub max_txn_per_microblock: usize,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            max_pending_transactions: 4096,
            bank_tile_count: 4,
            cus_per_microblock: 1_500_000,
            vote_fraction: 0.75,
            microblock_duration_ns: 2_000_000,
            block_duration_ns: 400_000_000,
            transaction_lifetime_ns: 60_000_000_000,
            max_txn_per_microblock: 31,
        }
    }
}

impl PackConfig {
    /// Validates the configuration at startup.
    pub fn validate(&self) -> Result<()> {
        if self.max_pending_transactions == 0 {
            return Err(PackError::InvalidConfig(
                "max_pending_transactions must be nonzero".into(),
            ));
        }
        if self.bank_tile_count == 0 || self.bank_tile_count > MAX_BANK_TILES {
            return Err(PackError::InvalidConfig(format!(
                "bank_tile_count {} outside 1..={MAX_BANK_TILES}",
                self.bank_tile_count
            )));
        }
        if self.cus_per_microblock == 0 || self.max_txn_per_microblock == 0 {
            return Err(PackError::InvalidConfig(
                "microblock budget and size must be nonzero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.vote_fraction) {
            return Err(PackError::InvalidConfig(format!(
                "vote_fraction {} outside [0, 1]",
                self.vote_fraction
            )));
        }
        if self.microblock_duration_ns <= 0
            || self.block_duration_ns <= 0
            || self.transaction_lifetime_ns <= 0
        {
            return Err(PackError::InvalidConfig(
                "durations must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Small limits for tests.
    pub fn for_testing() -> Self {
        Self {
            max_pending_transactions: 64,
            bank_tile_count: 2,
            max_txn_per_microblock: 8,
            ..Self::default()
        }
    }
}
