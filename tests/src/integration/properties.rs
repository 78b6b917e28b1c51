//! Invariant properties checked against observable ring output.

#![cfg(test)]

use std::collections::HashSet;

use pack_core::{PackConfig, PackMetrics};
use rand::{rngs::StdRng, Rng, SeedableRng};
use shared_types::AccountKey;

use super::harness::{txn, TestNode};

const MICROBLOCK_NS: i64 = 2_000_000;

#[test]
fn test_empty_pool_scheduling_is_side_effect_free() {
    let mut node = TestNode::new(PackConfig {
        bank_tile_count: 2,
        ..PackConfig::default()
    });
    node.become_leader(42, 0, 100);

    for tick in 1..=20i64 {
        node.tick(tick * 100_000);
    }
    assert!(node.drain_out().is_empty());
    assert_eq!(PackMetrics::get(&node.metrics().microblocks_published), 0);
    node.tile.pool().check_invariants().unwrap();
}

#[test]
fn test_every_microblock_respects_budget_and_size() {
    let mut rng = StdRng::seed_from_u64(7);
    let config = PackConfig {
        bank_tile_count: 1,
        cus_per_microblock: 500,
        max_txn_per_microblock: 4,
        ..PackConfig::default()
    };
    let mut node = TestNode::new(config);

    for i in 0..20u8 {
        node.send_txn(&txn(
            i,
            rng.gen_range(1..100),
            &[i as u64],
            &[],
            rng.gen_range(50..400),
            false,
        ));
    }
    let mut now = 0;
    for _ in 0..20 {
        now += 1_000;
        node.tick(now);
    }
    node.become_leader(42, now, 1_000);
    now += 1_000;
    node.tick(now);

    let mut scheduled = 0usize;
    for _ in 0..100 {
        now += MICROBLOCK_NS + 100_000;
        node.tick(now);
        for frame in node.drain_out() {
            assert!(frame.is_microblock());
            let microblock = frame.microblock();
            assert!(microblock.txns.len() <= 4);
            let total_cus: u64 = microblock
                .txns
                .iter()
                .map(|t| t.descriptor.compute_units as u64)
                .sum();
            assert!(total_cus <= 500, "budget exceeded: {total_cus}");
            scheduled += microblock.txns.len();
            node.ack(0, frame.seq);
        }
        if node.tile.pool().is_empty() {
            break;
        }
    }
    assert_eq!(scheduled, 20);
}

#[test]
fn test_cadence_per_bank_meets_minimum_spacing() {
    let mut node = TestNode::new(PackConfig {
        bank_tile_count: 1,
        ..PackConfig::default()
    });
    // Mutually conflicting: exactly one transaction per microblock.
    for i in 0..12u8 {
        node.send_txn(&txn(i, 10, &[7], &[], 100, false));
    }
    let mut now = 0;
    for _ in 0..12 {
        now += 1_000;
        node.tick(now);
    }
    node.become_leader(42, now, 1_000);

    let mut publish_times = Vec::new();
    while !node.tile.pool().is_empty() {
        now += 100_000;
        node.tick(now);
        for frame in node.drain_out() {
            if frame.is_microblock() {
                publish_times.push(frame.tspub);
                node.ack(0, frame.seq);
            }
        }
    }

    assert_eq!(publish_times.len(), 12);
    for pair in publish_times.windows(2) {
        assert!(
            pair[1] - pair[0] >= MICROBLOCK_NS,
            "cadence violated: {} then {}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn test_pool_never_exceeds_capacity() {
    let mut node = TestNode::new(PackConfig {
        bank_tile_count: 1,
        max_pending_transactions: 8,
        ..PackConfig::default()
    });
    for i in 0..12u8 {
        node.send_txn(&txn(i, 10, &[i as u64], &[], 100, false));
    }
    for tick in 1..=12i64 {
        node.tick(tick * 1_000);
        assert!(node.tile.pool().len() <= 8);
    }
    assert_eq!(node.tile.pool().len(), 8);
    assert_eq!(PackMetrics::get(&node.metrics().txn_dropped_capacity), 4);
    node.tile.pool().check_invariants().unwrap();
}

#[test]
fn test_expired_transactions_are_never_scheduled() {
    const TTL: i64 = 60_000_000_000;
    let mut node = TestNode::new(PackConfig {
        bank_tile_count: 1,
        ..PackConfig::default()
    });
    node.send_txn(&txn(1, 10, &[1], &[], 100, false));
    node.tick(1_000);
    assert_eq!(node.tile.pool().len(), 1);

    // The node first becomes leader well past the transaction's lifetime.
    let late = TTL + 10_000_000;
    node.become_leader(42, late, 100);
    node.tick(late + 1_000);
    node.tick(late + 2_000);

    assert!(node.drain_out().is_empty());
    assert!(node.tile.pool().is_empty());
    assert_eq!(PackMetrics::get(&node.metrics().txns_expired), 1);
}

#[test]
fn test_inflight_microblocks_are_pairwise_conflict_free() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let bank_cnt = 4usize;
    let mut node = TestNode::new(PackConfig {
        bank_tile_count: bank_cnt,
        max_txn_per_microblock: 4,
        ..PackConfig::default()
    });

    // Dense account contention across 6 hot write accounts.
    for i in 0..24u8 {
        let first = rng.gen_range(0..6u64);
        let second = (first + rng.gen_range(1..6)) % 6;
        let reads = [rng.gen_range(6..10u64)];
        node.send_txn(&txn(
            i,
            rng.gen_range(1..100),
            &[first, second],
            &reads,
            rng.gen_range(50..500),
            false,
        ));
    }
    let mut now = 0;
    for _ in 0..24 {
        now += 1_000;
        node.tick(now);
    }
    node.become_leader(42, now, 1_000);

    // Footprint of the unacknowledged microblock per bank.
    let mut outstanding: Vec<Option<(u64, HashSet<AccountKey>, HashSet<AccountKey>)>> =
        vec![None; bank_cnt];

    for _ in 0..400 {
        now += 500_000;
        node.tick(now);
        for frame in node.drain_out() {
            if !frame.is_microblock() {
                continue;
            }
            let bank = frame.sig.bank_index as usize;
            assert!(
                outstanding[bank].is_none(),
                "bank {bank} received a microblock while busy"
            );
            let microblock = frame.microblock();
            let writes: HashSet<AccountKey> = microblock
                .txns
                .iter()
                .flat_map(|t| t.descriptor.writable.iter().copied())
                .collect();
            let reads: HashSet<AccountKey> = microblock
                .txns
                .iter()
                .flat_map(|t| t.descriptor.readonly.iter().copied())
                .collect();

            for (other, slot) in outstanding.iter().enumerate() {
                let Some((_, other_writes, other_reads)) = slot else {
                    continue;
                };
                assert!(other != bank);
                assert!(
                    writes.is_disjoint(other_writes) && writes.is_disjoint(other_reads),
                    "write conflict between banks {bank} and {other}"
                );
                assert!(
                    reads.is_disjoint(other_writes),
                    "read-write conflict between banks {bank} and {other}"
                );
            }
            outstanding[bank] = Some((frame.seq, writes, reads));
        }

        for (bank, slot) in outstanding.iter_mut().enumerate() {
            if slot.is_some() && rng.gen_bool(0.5) {
                let (seq, _, _) = slot.take().unwrap();
                node.ack(bank, seq);
            }
        }
        if node.tile.pool().is_empty() && outstanding.iter().all(Option::is_none) {
            break;
        }
    }

    assert!(node.tile.pool().is_empty(), "pool failed to drain");
    node.tile.pool().check_invariants().unwrap();
}
