//! Concrete end-to-end scenarios, black-box through the rings.

#![cfg(test)]

use pack_core::{LeaderState, PackConfig, PackMetrics};
use shared_types::POH_BANK_SENTINEL;

use super::harness::{txn, TestNode, TEST_BANK};

const MICROBLOCK_NS: i64 = 2_000_000;
const BLOCK_NS: i64 = 400_000_000;

fn config(banks: usize) -> PackConfig {
    PackConfig {
        bank_tile_count: banks,
        max_txn_per_microblock: 16,
        ..PackConfig::default()
    }
}

#[test]
fn test_single_transaction_single_bank() {
    let mut node = TestNode::new(config(1));
    node.send_txn(&txn(1, 10, &[0xA], &[], 100, false));
    node.become_leader(42, 0, 10);

    node.tick(1_000); // ingest leader + transaction
    node.tick(2_000); // schedule
    let frames = node.drain_out();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].is_microblock());
    assert_eq!(frames[0].sig.slot, 42);
    assert_eq!(frames[0].sig.bank_index, 0);
    let microblock = frames[0].microblock();
    assert_eq!(microblock.txns.len(), 1);
    assert_eq!(microblock.txns[0].payload[0], 1);
    assert_eq!(microblock.trailer.bank, TEST_BANK);

    // After the 400 ms slot: NotLeader, DonePacking carrying count=1.
    node.tick(BLOCK_NS);
    assert_eq!(*node.tile.leader_state(), LeaderState::NotLeader);
    let frames = node.drain_out();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].is_done_packing());
    assert_eq!(frames[0].sig.slot, 1);
    assert_eq!(frames[0].sig.bank_index, POH_BANK_SENTINEL);
    assert!(frames[0].payload.is_empty());
}

#[test]
fn test_conflicting_transactions_serialize_across_banks() {
    let mut node = TestNode::new(config(2));
    node.send_txn(&txn(1, 10, &[0xA], &[], 100, false));
    node.send_txn(&txn(2, 9, &[0xA], &[], 100, false));
    node.become_leader(42, 0, 100);

    node.tick(1_000); // ingest leader + T1
    node.tick(2_000); // schedule T1; ingest T2
    let frames = node.drain_out();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].sig.bank_index, 0);
    assert_eq!(frames[0].microblock().txns[0].payload[0], 1);
    let seq1 = frames[0].seq;

    // T2 writes the same account as the in-flight microblock, so neither
    // bank may take it: both banks come up empty on these ticks.
    node.tick(3_000);
    node.tick(2_100_000);
    assert!(node.drain_out().is_empty());
    assert_eq!(node.tile.pool().len(), 1);

    // Once T1 completes, T2 becomes schedulable.
    node.ack(0, seq1);
    node.tick(3_000_000);
    let frames = node.drain_out();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].is_microblock());
    assert_eq!(frames[0].microblock().txns[0].payload[0], 2);
}

#[test]
fn test_vote_share_enforcement() {
    let mut node = TestNode::new(config(1));
    node.send_txn(&txn(0, 1, &[99], &[], 100, true)); // the only vote
    for i in 1..=9u8 {
        node.send_txn(&txn(i, 10, &[i as u64], &[], 100, false));
    }

    let mut now = 0;
    for _ in 0..10 {
        now += 1_000;
        node.tick(now);
    }
    assert_eq!(node.tile.pool().len(), 10);

    node.become_leader(42, now, 1_000);
    now += 1_000;
    node.tick(now); // ingest leader
    now += 1_000;
    node.tick(now); // schedule

    let frames = node.drain_out();
    assert_eq!(frames.len(), 1);
    let microblock = frames[0].microblock();
    assert_eq!(microblock.txns.len(), 10);
    // 0/max(1,0) < 0.75 with a vote eligible: the low-priority vote leads;
    // from 1/1 >= 0.75 on, priority order takes over.
    assert!(microblock.txns[0].descriptor.is_vote);
    assert!(microblock.txns[1..].iter().all(|t| !t.descriptor.is_vote));
}

#[test]
fn test_producer_overrun_discards_fragments() {
    let mut node = TestNode::with_txn_ring_depth(config(1), 2);
    node.send_txn(&txn(1, 10, &[1], &[], 100, false));
    node.tick(1_000);
    assert_eq!(node.tile.pool().len(), 1);

    // The producer laps the depth-2 ring before the core runs again.
    for i in 2..=5u8 {
        node.send_txn(&txn(i, 10, &[i as u64], &[], 100, false));
    }

    node.tick(2_000);
    let metrics = node.metrics();
    assert_eq!(PackMetrics::get(&metrics.ingest_overruns), 2);
    assert_eq!(node.tile.pool().len(), 1); // overrun changed nothing

    node.tick(3_000);
    node.tick(4_000);
    assert_eq!(node.tile.pool().len(), 3);
    node.tile.pool().check_invariants().unwrap();
}

#[test]
fn test_slot_ends_at_microblock_cap_without_done_packing() {
    let mut node = TestNode::new(config(1));
    // All three write the same account, so each lands in its own
    // microblock.
    for i in 1..=3u8 {
        node.send_txn(&txn(i, 10, &[7], &[], 100, false));
    }
    let mut now = 0;
    for _ in 0..3 {
        now += 1_000;
        node.tick(now);
    }
    node.become_leader(42, now, 3);
    now += 1_000;
    node.tick(now);

    for expected in 1..=3u64 {
        now += MICROBLOCK_NS + 100_000;
        node.tick(now);
        let frames = node.drain_out();
        assert_eq!(frames.len(), 1, "microblock {expected} missing");
        assert!(frames[0].is_microblock());
        node.ack(0, frames[0].seq);
    }
    assert_eq!(*node.tile.leader_state(), LeaderState::NotLeader);

    // Even a late tick must not emit DonePacking after a cap-terminated
    // slot.
    now += BLOCK_NS;
    node.tick(now);
    assert!(node.drain_out().is_empty());
    let metrics = node.metrics();
    assert_eq!(PackMetrics::get(&metrics.done_packing_sent), 0);
    assert_eq!(PackMetrics::get(&metrics.microblocks_published), 3);
}

#[test]
fn test_slot_ends_at_deadline_with_zero_count() {
    let mut node = TestNode::new(config(1));
    node.become_leader(42, 0, 1_000);
    node.tick(1_000);
    assert!(matches!(
        node.tile.leader_state(),
        LeaderState::Leader { .. }
    ));

    node.tick(BLOCK_NS);
    assert_eq!(*node.tile.leader_state(), LeaderState::NotLeader);
    let frames = node.drain_out();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].is_done_packing());
    assert_eq!(frames[0].sig.slot, 0);
    assert_eq!(PackMetrics::get(&node.metrics().done_packing_sent), 1);
}

#[test]
fn test_raw_vote_frames_ingest_end_to_end() {
    let mut node = TestNode::new(config(1));
    node.send_raw_txn(&txn(5, 3, &[1], &[], 100, true));
    node.become_leader(42, 0, 10);

    node.tick(1_000);
    node.tick(2_000);
    let frames = node.drain_out();
    assert_eq!(frames.len(), 1);
    let microblock = frames[0].microblock();
    assert!(microblock.txns[0].descriptor.is_vote);
    assert_eq!(
        PackMetrics::get(&node.metrics().gossiped_votes_received),
        1
    );
}
