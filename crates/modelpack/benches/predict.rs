//! Serving benchmarks: single-record latency and batch throughput.

use std::hint::black_box;
use std::num::NonZeroUsize;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use modelpack::runner::{PipelineRunner, RunnerConfig};
use modelpack::testing::{abc_predictor, malignant_record, tumour_batch, tumour_package, tumour_predictor};
use modelpack::value::{record, Value};
use modelpack::{ModelPackage, Predictor};

/// Baseline Criterion configuration.
fn default_criterion() -> Criterion {
    Criterion::default()
        .configure_from_args()
        .warm_up_time(Duration::from_secs(2))
        .measurement_time(Duration::from_secs(10))
        .sample_size(20)
}

fn bench_single_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict/single_record");

    let abc = abc_predictor();
    let partial = record([("a", Value::from(5))]);
    group.bench_function("abc_partial", |b| {
        b.iter(|| black_box(abc.predict(black_box(&partial))))
    });

    let tumour = tumour_predictor();
    let raw = malignant_record();
    group.bench_function("tumour_transformed", |b| {
        b.iter(|| black_box(tumour.predict(black_box(&raw))))
    });
    group.bench_function("tumour_preprocess_only", |b| {
        b.iter(|| black_box(tumour.preprocess(black_box(&raw)).map(|row| row.n_defaulted())))
    });

    group.finish();
}

fn bench_batch_threads(c: &mut Criterion) {
    let predictor = tumour_predictor();
    let batch_size = 10_000usize;
    let records = tumour_batch(batch_size);

    let mut group = c.benchmark_group("predict/batch");
    group.throughput(Throughput::Elements(batch_size as u64));

    for n_threads in [1usize, 2, 4, 0] {
        let config = RunnerConfig::builder()
            .maybe_n_threads(NonZeroUsize::new(n_threads))
            .chunk_size(64)
            .build()
            .expect("valid runner config");
        let runner = PipelineRunner::new(config);
        let label = if n_threads == 0 { "auto".to_string() } else { n_threads.to_string() };
        group.bench_with_input(BenchmarkId::new("threads", label), &records, |b, records| {
            b.iter(|| black_box(runner.run(&predictor, black_box(records))))
        });
    }

    group.finish();
}

fn bench_package_load(c: &mut Criterion) {
    let bytes = tumour_package().to_bytes().expect("fixture encodes");

    c.bench_function("predict/package_load", |b| {
        b.iter(|| {
            let package = ModelPackage::from_bytes(black_box(&bytes)).expect("fixture decodes");
            black_box(Predictor::from_package(&package).expect("fixture loads"))
        })
    });
}

criterion_group! {
    name = benches;
    config = default_criterion();
    targets = bench_single_record, bench_batch_threads, bench_package_load
}
criterion_main!(benches);
