//! In-process test node: real rings on both sides of a [`PackTile`],
//! producers and bank acknowledgements driven from the test body, time
//! driven by explicit tick values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use frag_ring::{Consumer, Poll, Producer, Ring};
use pack_core::{PackConfig, PackMetrics, PackTile};
use shared_types::{
    encode_preparsed, encode_raw, AccountKey, BankHandle, BecameLeader, MicroblockFrame,
    PohPktType, PohSignature, TxnDescriptor, VerifiedTxn, TXN_SIG_PREPARSED, TXN_SIG_RAW,
};

/// Bank handle used by every test slot.
pub const TEST_BANK: BankHandle = BankHandle(0xAB);

/// Installs the env-filtered subscriber once per test binary; run with
/// `RUST_LOG=pack_core=debug` to watch the tile narrate a scenario.
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// One fragment observed on the output ring.
pub struct OutFrame {
    pub seq: u64,
    pub sig: PohSignature,
    pub payload: Vec<u8>,
    pub tspub: i64,
}

impl OutFrame {
    pub fn is_microblock(&self) -> bool {
        self.sig.pkt_type == PohPktType::Microblock
    }

    pub fn is_done_packing(&self) -> bool {
        self.sig.pkt_type == PohPktType::DonePacking
    }

    /// Decodes the payload as a microblock frame.
    pub fn microblock(&self) -> MicroblockFrame {
        MicroblockFrame::from_bytes(&self.payload).expect("microblock frame decodes")
    }
}

/// A pack tile with its rings, from the outside.
pub struct TestNode {
    pub tile: PackTile,
    pub txn_producer: Producer,
    pub poh_producer: Producer,
    out: Consumer,
    bank_counters: Vec<Arc<AtomicU64>>,
}

impl TestNode {
    /// Builds a node with roomy rings.
    pub fn new(config: PackConfig) -> Self {
        Self::with_txn_ring_depth(config, 256)
    }

    /// Builds a node with a specific transaction-ring depth (small depths
    /// force overruns).
    pub fn with_txn_ring_depth(config: PackConfig, txn_depth: u64) -> Self {
        init_tracing();
        let txn_ring = Ring::new(txn_depth, 2048).unwrap();
        let poh_ring = Ring::new(16, 256).unwrap();
        let out_ring = Ring::new(256, 1 << 16).unwrap();

        let txn_producer = Producer::new(txn_ring.clone()).unwrap();
        let poh_producer = Producer::new(poh_ring.clone()).unwrap();
        let out = Consumer::from_start(out_ring.clone());

        let bank_cnt = config.bank_tile_count;
        let tile = PackTile::new(
            config,
            vec![Consumer::from_start(txn_ring)],
            Consumer::from_start(poh_ring),
            Producer::new(out_ring).unwrap(),
        )
        .unwrap();
        let bank_counters = (0..bank_cnt).map(|i| tile.bank_counter(i)).collect();

        Self {
            tile,
            txn_producer,
            poh_producer,
            out,
            bank_counters,
        }
    }

    /// Publishes a pre-parsed transaction frame.
    pub fn send_txn(&mut self, txn: &VerifiedTxn) {
        let frame = encode_preparsed(&txn.payload, &txn.descriptor).unwrap();
        self.txn_producer
            .publish(TXN_SIG_PREPARSED, &frame, 0)
            .unwrap();
    }

    /// Publishes a raw (self-parsing) transaction frame.
    pub fn send_raw_txn(&mut self, txn: &VerifiedTxn) {
        let frame = encode_raw(txn).unwrap();
        self.txn_producer.publish(TXN_SIG_RAW, &frame, 0).unwrap();
    }

    /// Publishes a `BecameLeader` control fragment.
    pub fn become_leader(&mut self, slot: u64, start_ns: i64, max_microblocks: u64) {
        let sig = PohSignature {
            slot,
            pkt_type: PohPktType::BecameLeader,
            bank_index: 0,
        };
        let record = BecameLeader {
            bank: TEST_BANK,
            slot_start_ns: start_ns,
            max_microblocks_in_slot: max_microblocks,
        };
        self.poh_producer
            .publish(sig.encode(), &record.to_bytes().unwrap(), start_ns)
            .unwrap();
    }

    /// Runs one tile tick at `now_ns`.
    pub fn tick(&mut self, now_ns: i64) {
        self.tile.run_once(now_ns).unwrap();
    }

    /// Acknowledges microblock `seq` as completed by `bank`.
    pub fn ack(&mut self, bank: usize, seq: u64) {
        self.bank_counters[bank].store(seq, Ordering::Release);
    }

    /// Drains every frame currently on the output ring.
    pub fn drain_out(&mut self) -> Vec<OutFrame> {
        let mut frames = Vec::new();
        loop {
            match self.out.poll() {
                Poll::Empty => break,
                Poll::Overrun { .. } => panic!("test drained the output ring too slowly"),
                Poll::Frag(meta) => {
                    let mut payload = Vec::new();
                    self.out.copy_payload(&meta, &mut payload);
                    assert!(self.out.still_valid(&meta));
                    self.out.advance();
                    frames.push(OutFrame {
                        seq: meta.seq,
                        sig: PohSignature::decode(meta.sig).unwrap(),
                        payload,
                        tspub: meta.tspub,
                    });
                }
            }
        }
        frames
    }

    /// Shared metrics block.
    pub fn metrics(&self) -> Arc<PackMetrics> {
        self.tile.metrics()
    }
}

/// Builds a verified transaction; `first_byte` determines the fingerprint.
pub fn txn(
    first_byte: u8,
    priority: u64,
    writes: &[u64],
    reads: &[u64],
    compute_units: u32,
    is_vote: bool,
) -> VerifiedTxn {
    let mut payload = vec![0u8; 64];
    payload[0] = first_byte;
    VerifiedTxn {
        payload,
        descriptor: TxnDescriptor {
            writable: writes.iter().copied().map(AccountKey::from_low_u64).collect(),
            readonly: reads.iter().copied().map(AccountKey::from_low_u64).collect(),
            signer_cnt: 1,
            compute_units,
            priority,
            is_vote,
        },
    }
}
