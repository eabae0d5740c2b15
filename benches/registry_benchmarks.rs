//! Performance benchmarks for the registry hot path.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use hearth_plugin_system::{Manifest, PluginRegistry};

fn manifest(id: &str) -> Manifest {
    Manifest {
        id: id.to_owned(),
        name: id.to_owned(),
        version: "1.0.0".to_owned(),
        description: String::new(),
        icon: String::new(),
        color: String::new(),
        permissions: vec![],
    }
}

/// Benchmark registration and lookup against registries of varying size.
pub fn benchmark_registry_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    for size in [10usize, 100, 1000] {
        let registry = PluginRegistry::new();
        for k in 0..size {
            let id = format!("plugin-{}", k);
            registry.register(&id, None, manifest(&id));
        }

        group.bench_function(BenchmarkId::new("get", size), |b| {
            b.iter(|| {
                let _ = black_box(registry.get("plugin-5"));
            });
        });

        group.bench_function(BenchmarkId::new("list", size), |b| {
            b.iter(|| {
                let _ = black_box(registry.list());
            });
        });
    }

    group.bench_function(BenchmarkId::new("register_overwrite", ""), |b| {
        let registry = PluginRegistry::new();
        b.iter(|| {
            registry.register("hot", None, manifest("hot"));
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_registry_ops);
criterion_main!(benches);
