// Benchmarks for shard assembly and keyed CSV loading
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use pipestore::{
    stack_shards, AssembleOptions, KeyedTableLoader, Parallelism, PipelineArtifacts, PipelineConfig,
    RefId, ShardVectors,
};
use rand::prelude::*;
use std::fmt::Write as _;

const DIM: usize = 128;

/// Refs 0..total dealt out to `shards` workers in random order
fn random_shards(total: usize, shards: usize) -> Vec<ShardVectors<f32>> {
    let mut rng = rand::rng();
    let mut refs: Vec<RefId> = (0..total as RefId).collect();
    refs.shuffle(&mut rng);

    refs.chunks(total.div_ceil(shards))
        .enumerate()
        .map(|(w, chunk)| ShardVectors {
            shard: format!("worker-{}", w),
            refs: chunk.to_vec().into(),
            vectors: Array2::from_shape_fn((chunk.len(), DIM), |_| rng.random_range(-1.0f32..1.0)),
        })
        .collect()
}

fn benchmark_stack(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_shards");

    for size in [1_000, 10_000, 50_000].iter() {
        let shards = random_shards(*size, 16);
        group.bench_with_input(BenchmarkId::new("f32x128", size), &shards, |b, shards| {
            b.iter(|| black_box(stack_shards(shards, false).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_assemble(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::from_value(serde_json::json!({
        "score": { "output_data_directory": dir.path(), "f_db": "document_scores.h5" }
    }))
    .unwrap();
    let artifacts = PipelineArtifacts::new(config);
    {
        let writer = artifacts.score_writer("unique").unwrap();
        for shard in random_shards(20_000, 16) {
            let refs = shard.refs.to_vec();
            writer.write_shard(&shard.shard, &refs, shard.vectors, None).unwrap();
        }
    }

    let mut group = c.benchmark_group("assemble");
    group.sample_size(20);
    for (name, parallelism) in [("serial", Parallelism::Serial), ("all_cores", Parallelism::AllCores)] {
        let assembler = pipestore::VectorAssembler::new(artifacts.config().score_db_path().unwrap(), parallelism);
        group.bench_function(name, |b| {
            b.iter(|| black_box(assembler.assemble::<f32>("unique", AssembleOptions::default()).unwrap()));
        });
    }
    group.finish();
}

fn benchmark_csv_load(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = rand::rng();
    let mut refs: Vec<RefId> = (0..40_000).collect();
    refs.shuffle(&mut rng);
    for (i, chunk) in refs.chunks(1_000).enumerate() {
        let mut contents = String::from("_ref,title,text\n");
        for r in chunk {
            writeln!(contents, "{},title {},body of document {}", r, r, r).unwrap();
        }
        std::fs::write(dir.path().join(format!("part-{:03}.csv", i)), contents).unwrap();
    }

    let mut group = c.benchmark_group("csv_load");
    group.sample_size(20);
    for (name, parallelism) in [("serial", Parallelism::Serial), ("all_cores", Parallelism::AllCores)] {
        let loader = KeyedTableLoader::new(parallelism);
        group.bench_function(name, |b| {
            b.iter(|| black_box(loader.load("*.csv", dir.path(), &["title", "text"]).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_stack, benchmark_assemble, benchmark_csv_load);
criterion_main!(benches);
