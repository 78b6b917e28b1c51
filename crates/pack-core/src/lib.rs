//! # Pack Core
//!
//! Transaction packing and microblock scheduling for a validator pipeline.
//!
//! ## Purpose
//!
//! Takes verified transactions off producer rings and arranges them into
//! microblocks: groups of transactions dispatched to one bank worker to be
//! executed serially, chosen so that microblocks in flight on different
//! banks never write to each other's accounts and can execute in parallel.
//!
//! ## Domain Invariants
//!
//! | ID | Invariant | Enforcement Location |
//! |----|-----------|---------------------|
//! | INVARIANT-1 | fingerprint and priority indexes hold the same entries | `domain/pool.rs` install/evict |
//! | INVARIANT-2 | every live entry is account-indexed for every key it touches | `domain/pool.rs` install/evict |
//! | INVARIANT-3 | pool size never exceeds capacity | `domain/pool.rs` reserve |
//! | INVARIANT-4 | no entry outlives the transaction lifetime | `tile.rs` expiry sweep per scheduling attempt |
//! | INVARIANT-5 | in-flight microblocks are pairwise conflict-free | `domain/scheduler.rs` admission |
//! | INVARIANT-6 | per-bank dispatch spacing >= microblock duration | `domain/banks.rs` ready gate |
//! | INVARIANT-7 | microblocks per slot <= sequencer cap | `domain/leader.rs` immediate end at cap |
//!
//! ## Module Structure
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  tile.rs     - event loop: before_credit / after_credit /      │
//! │                ingress poll, one microblock per tick           │
//! │  ingress.rs  - speculative fragment decode with overrun        │
//! │                cancellation                                    │
//! └────────────────────────────────────────────────────────────────┘
//!                           ↓ drives ↓
//! ┌────────────────────────────────────────────────────────────────┐
//! │  domain/pool.rs      - bounded priority pool with conflict     │
//! │                        and expiry indexes                      │
//! │  domain/scheduler.rs - conflict-free microblock selection      │
//! │  domain/banks.rs     - per-bank busy/ready gating              │
//! │  domain/leader.rs    - leader slot state machine               │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency Model
//!
//! The tile is single-threaded and pinned; all state here is owned by one
//! thread. Parallelism is external: ring producers and bank consumers run
//! elsewhere and interact only through the fragment rings and the per-bank
//! completion counters.

pub mod config;
pub mod domain;
pub mod ingress;
pub mod metrics;
pub mod tile;
pub mod time;

pub use config::{PackConfig, MAX_BANK_TILES};
pub use domain::*;
pub use ingress::IngressAdapter;
pub use metrics::PackMetrics;
pub use tile::PackTile;
pub use time::{MonotonicClock, TimeSource};
