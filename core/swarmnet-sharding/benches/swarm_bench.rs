use criterion::{black_box, criterion_group, criterion_main, Criterion};
use swarmnet_core::constants::QUEUE_SWARM_ID;
use swarmnet_core::PublicKey;
use swarmnet_sharding::{calc_swarm_changes, SwarmMap};

fn key(i: u32) -> PublicKey {
    let mut bytes = [0u8; 32];
    bytes[..4].copy_from_slice(&i.to_le_bytes());
    PublicKey(bytes)
}

fn benchmark_initial_partition(c: &mut Criterion) {
    let mut queued = SwarmMap::new();
    queued.insert(QUEUE_SWARM_ID, (0..2_000).map(key).collect());

    c.bench_function("partition_2000_queued", |b| {
        b.iter(|| {
            let mut swarms = queued.clone();
            calc_swarm_changes(&mut swarms, black_box(0xC0FFEE));
            black_box(swarms);
        });
    });
}

fn benchmark_incremental_rebalance(c: &mut Criterion) {
    let mut settled = SwarmMap::new();
    settled.insert(QUEUE_SWARM_ID, (0..2_000).map(key).collect());
    calc_swarm_changes(&mut settled, 1);
    if let Some(queue) = settled.get_mut(&QUEUE_SWARM_ID) {
        queue.extend((10_000..10_020).map(key));
    }

    c.bench_function("rebalance_20_new_nodes", |b| {
        b.iter(|| {
            let mut swarms = settled.clone();
            calc_swarm_changes(&mut swarms, black_box(2));
            black_box(swarms);
        });
    });
}

criterion_group!(benches, benchmark_initial_partition, benchmark_incremental_rebalance);
criterion_main!(benches);
