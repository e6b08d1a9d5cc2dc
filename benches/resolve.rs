use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use ffidecl::{BindingConfig, Declared, DescriptorCache, Registry, Signature, SignatureBuilder, TypeTag};

fn sample_signature() -> (Arc<DescriptorCache>, Arc<Signature>) {
    let registry = Arc::new(Registry::new());
    let cache = Arc::new(DescriptorCache::new(Arc::clone(&registry)));
    let builder = SignatureBuilder::new(registry, &BindingConfig::default());
    let sig = builder
        .build(
            "bench_fn",
            &[
                ("a", Declared::Int),
                ("b", Declared::Float),
                ("c", Declared::Str),
            ],
            Declared::Int,
        )
        .unwrap();
    (cache, sig)
}

fn bench_resolve_warm(c: &mut Criterion) {
    let (cache, sig) = sample_signature();
    cache.resolve(&sig).unwrap();

    c.bench_function("resolve_warm", |b| {
        b.iter(|| black_box(cache.resolve(&sig).unwrap()));
    });
}

fn bench_resolve_cold(c: &mut Criterion) {
    c.bench_function("resolve_cold", |b| {
        b.iter_batched(
            sample_signature,
            |(cache, sig)| black_box(cache.resolve(&sig).unwrap()),
            BatchSize::SmallInput,
        );
    });
}

fn bench_pointer_interning(c: &mut Criterion) {
    let registry = Registry::new();

    c.bench_function("intern_repeat_pointer", |b| {
        b.iter(|| black_box(registry.bounded_pointer(TypeTag::U8, 64)));
    });
}

criterion_group!(benches, bench_resolve_warm, bench_resolve_cold, bench_pointer_interning);
criterion_main!(benches);
