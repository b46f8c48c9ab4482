//! Throughput benchmark for the reaction batch engine.
//!
//! Measures full matrix expansion over in-memory streams with the template
//! chemistry, at different worker-pool sizes.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use retort::chem::template::TemplateChemistry;
use retort::chem::{ChemistryEngine, ReactionSource};
use retort::core::RunOptions;
use retort::plan::CombinationPolicy;
use retort::pool::PoolConfig;
use retort::report::NullProgress;
use retort::stream::InMemoryStream;
use retort::ReactionBatchEngine;
use std::sync::Arc;

fn build_stream(chem: &TemplateChemistry, prefix: &str, count: usize) -> InMemoryStream {
    InMemoryStream::from_structures(
        (0..count).map(|i| Some(chem.structure(&format!("{}{}", prefix, i)))).collect(),
    )
}

fn bench_matrix_expansion(c: &mut Criterion) {
    let chem = Arc::new(TemplateChemistry::new());
    let primary = build_stream(&chem, "C", 100);
    let secondary = build_stream(&chem, "N", 20);
    let source = ReactionSource::Pattern("C.N>>{0}-{1}".to_string());

    let mut group = c.benchmark_group("matrix_100x20");
    for workers in [1usize, 4] {
        group.bench_function(format!("workers_{}", workers), |b| {
            b.iter(|| {
                let engine =
                    ReactionBatchEngine::new(Arc::clone(&chem) as Arc<dyn ChemistryEngine>)
                        .with_pool_config(PoolConfig::with_workers(workers));
                let mut rows = 0u64;
                engine
                    .run(
                        &primary,
                        Some(&secondary),
                        &source,
                        &CombinationPolicy::matrix(),
                        &RunOptions::default(),
                        &NullProgress,
                        |batch| rows += batch.len() as u64,
                    )
                    .unwrap();
                black_box(rows)
            });
        });
    }
    group.finish();
}

fn bench_paired_with_unique_products(c: &mut Criterion) {
    let chem = Arc::new(TemplateChemistry::new());
    let primary = build_stream(&chem, "CC", 2_000);
    let secondary = build_stream(&chem, "N", 2_000);
    let source = ReactionSource::Pattern("C.N>>{0}{1}.{0}{1}".to_string());
    let options = RunOptions { unique_products: true, passthrough_columns: Vec::new() };

    c.bench_function("paired_2000_unique", |b| {
        b.iter(|| {
            let engine = ReactionBatchEngine::new(Arc::clone(&chem) as Arc<dyn ChemistryEngine>)
                .with_pool_config(PoolConfig::with_workers(4));
            let mut rows = 0u64;
            engine
                .run(
                    &primary,
                    Some(&secondary),
                    &source,
                    &CombinationPolicy::paired(),
                    &options,
                    &NullProgress,
                    |batch| rows += batch.len() as u64,
                )
                .unwrap();
            black_box(rows)
        });
    });
}

criterion_group!(benches, bench_matrix_expansion, bench_paired_with_unique_products);
criterion_main!(benches);
