//! Per-packet admission and per-tick engine benchmarks.
//!
//! Measures:
//! - `AdmissionPolicy::decide` against a full buffer for each policy
//! - a whole 1000-tick run per policy on the reference mix
//!
//! Run with: cargo bench --package bwbattle-core

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use bwbattle_core::buffer::Buffer;
use bwbattle_core::config::{PolicyKind, SimulationConfig};
use bwbattle_core::policy::{AdmissionPolicy, Decision, TickState};
use bwbattle_core::{run, Packet, TrafficClass};

/// Fills a buffer through `policy`, starting a new tick whenever an arrival
/// is refused so token buckets refill.
fn full_buffer(policy: &mut AdmissionPolicy, capacity: usize) -> Buffer {
    let mut buffer = Buffer::new(capacity);
    let mut tick = TickState {
        tick: 0,
        virtual_clock: 0.0,
    };
    let mut id = 0u64;
    while !buffer.is_full() {
        let class = TrafficClass::ALL[(id % 3) as usize];
        let mut p = Packet::new(id, class, 2.0, tick.tick);
        id += 1;
        match policy.decide(&buffer, &mut p, &tick) {
            Decision::Admit => buffer.insert(p, policy.insert_position()).unwrap(),
            Decision::Drop(_) | Decision::AdmitWithPreemption { .. } => {
                tick.tick += 1;
                policy.begin_tick(&tick);
            }
        }
    }
    buffer
}

fn bench_decide_full_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("decide_full_buffer");
    group.throughput(Throughput::Elements(1));

    let base = SimulationConfig::default();
    for kind in PolicyKind::ALL {
        for capacity in [20usize, 256] {
            let fresh = AdmissionPolicy::from_config(&base.with_policy(kind));
            let buffer = full_buffer(&mut fresh.clone(), capacity);
            let tick = TickState {
                tick: 1,
                virtual_clock: 0.0,
            };
            // Each iteration starts from full buckets so Gold reaches the
            // capacity check instead of being policed.
            group.bench_function(format!("{}/{capacity}", kind.as_str()), |b| {
                b.iter_batched(
                    || {
                        (
                            fresh.clone(),
                            Packet::new(u64::MAX, TrafficClass::Gold, 1.0, 1),
                        )
                    },
                    |(mut policy, mut p)| black_box(policy.decide(&buffer, &mut p, &tick)),
                    BatchSize::SmallInput,
                );
            });
        }
    }

    group.finish();
}

fn bench_full_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_1000_ticks");
    group.throughput(Throughput::Elements(1000));

    for kind in PolicyKind::ALL {
        let cfg = SimulationConfig::default().with_policy(kind);
        group.bench_function(kind.as_str(), |b| {
            b.iter(|| black_box(run(cfg.clone()).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decide_full_buffer, bench_full_run);
criterion_main!(benches);
