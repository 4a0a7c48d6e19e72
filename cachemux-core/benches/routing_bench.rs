use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use cachemux_core::{HashMethod, HashRing, RoutingMethod, RoutingStrategy};
use std::hint::black_box;

/// Benchmark: ring lookup per hash method and ring size
fn bench_ring_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_lookup");

    for method in [HashMethod::Crc32, HashMethod::Md5] {
        for nodes in [4usize, 16, 64] {
            let names: Vec<String> = (0..nodes).map(|i| format!("node-{}", i)).collect();
            let ring = HashRing::from_nodes(method, names.iter().map(|name| (name.as_str(), 32)));

            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", method), nodes),
                &ring,
                |b, ring| {
                    b.iter(|| ring.lookup(black_box("user:1000:profile")));
                },
            );
        }
    }

    group.finish();
}

/// Benchmark: modular strategies, regex extraction vs key hash
fn bench_modular_route(c: &mut Criterion) {
    let mut group = c.benchmark_group("modular_route");

    let mod_strategy =
        RoutingStrategy::modular("bench", RoutingMethod::Mod, Some(r"user:(\d+):.*"), Some(16))
            .unwrap();
    group.bench_function("mod", |b| {
        b.iter(|| mod_strategy.route(black_box("user:1000:profile")));
    });

    let hash_strategy =
        RoutingStrategy::modular("bench", RoutingMethod::HashMod, None, Some(16)).unwrap();
    group.bench_function("hash_mod", |b| {
        b.iter(|| hash_strategy.route(black_box("user:1000:profile")));
    });

    group.finish();
}

criterion_group!(benches, bench_ring_lookup, bench_modular_route);
criterion_main!(benches);
