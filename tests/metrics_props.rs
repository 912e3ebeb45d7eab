//
// Randomized checks of counter aggregation across threads.
//
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use udpcount::metrics::{LocalMetrics, SharedMetrics};
use udpcount::report::Reporter;

fn random_sizes(rng: &mut StdRng, n: usize) -> Vec<usize> {
    (0..n).map(|_| rng.gen_range(0..65508)).collect()
}

#[test]
fn totals_equal_sum_of_recorded_sizes() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..100 {
        let n = rng.gen_range(0..500);
        let sizes = random_sizes(&mut rng, n);
        let metrics = LocalMetrics::new();
        for &s in &sizes {
            metrics.add_packet(s, false);
        }
        assert_eq!(metrics.total_packets(), n as u64);
        assert_eq!(metrics.total_bytes(), sizes.iter().map(|&s| s as u64).sum::<u64>());
    }
}

#[test]
fn merge_order_does_not_matter() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let parts: Vec<LocalMetrics> = (0..4)
            .map(|_| {
                let m = LocalMetrics::new();
                let n = rng.gen_range(0..100);
                for s in random_sizes(&mut rng, n) {
                    m.add_packet(s, rng.gen_bool(0.1));
                }
                for _ in 0..rng.gen_range(0..3) {
                    m.add_error();
                }
                m
            })
            .collect();

        let forward = SharedMetrics::new();
        for m in &parts {
            forward.merge(m);
        }

        // ((d + c) + (b + a)) in the opposite order and grouping.
        let left = LocalMetrics::new();
        left.merge(&parts[3]);
        left.merge(&parts[2]);
        let right = LocalMetrics::new();
        right.merge(&parts[1]);
        right.merge(&parts[0]);
        let backward = SharedMetrics::new();
        backward.merge(&left);
        backward.merge(&right);

        assert_eq!(forward.total_packets(), backward.total_packets());
        assert_eq!(forward.total_bytes(), backward.total_bytes());
        assert_eq!(forward.packets(), backward.packets());
        assert_eq!(forward.bytes(), backward.bytes());
        assert_eq!(forward.truncated(), backward.truncated());
        assert_eq!(forward.errors(), backward.errors());
    }
}

#[test]
fn concurrent_merges_lose_nothing() {
    let shared = Arc::new(SharedMetrics::new());
    let threads = 4;
    let rounds = 1000;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let shared = shared.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(t);
                let mut packets = 0u64;
                let mut bytes = 0u64;
                for _ in 0..rounds {
                    let local = LocalMetrics::new();
                    for _ in 0..rng.gen_range(1..8) {
                        let len = rng.gen_range(0..1500);
                        local.add_packet(len, false);
                        packets += 1;
                        bytes += len as u64;
                    }
                    shared.merge(&local);
                }
                (packets, bytes)
            })
        })
        .collect();

    let (packets, bytes) = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .fold((0, 0), |(p, b), (tp, tb)| (p + tp, b + tb));
    assert_eq!(shared.total_packets(), packets);
    assert_eq!(shared.total_bytes(), bytes);
    assert_eq!(shared.packets(), packets);
}

#[test]
fn reports_racing_merges_account_for_every_packet() {
    let shared = Arc::new(SharedMetrics::new());
    let stop = Arc::new(AtomicBool::new(false));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let local = LocalMetrics::new();
                local.add_packet(100, true);
                local.add_error();
                while !stop.load(Ordering::Relaxed) {
                    shared.merge(&local);
                }
            })
        })
        .collect();

    let start = Instant::now();
    let mut reporter = Reporter::new(start);
    let (mut packets, mut bytes, mut errors, mut truncated) = (0u64, 0u64, 0u64, 0u64);
    for i in 1..=200_000u64 {
        let r = reporter.snapshot(&shared, start + Duration::from_micros(i));
        packets += r.packets;
        bytes += r.bytes;
        errors += r.errors;
        truncated += r.truncated;
    }

    stop.store(true, Ordering::Relaxed);
    for w in workers {
        w.join().unwrap();
    }

    let rest = shared.take_window(1.0);
    packets += rest.packets;
    bytes += rest.bytes;
    errors += rest.errors;
    truncated += rest.truncated;

    assert_eq!(packets, shared.total_packets());
    assert_eq!(bytes, shared.total_bytes());
    assert_eq!(errors, packets);
    assert_eq!(truncated, packets);
}
