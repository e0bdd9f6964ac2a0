use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoroshiro128PlusPlus;
use segmette::{isodata, kmeans, ClusterCount, ImageBuf, IsodataOptions, KmeansOptions};

fn synthetic_image(width: u32, height: u32, depth: usize) -> ImageBuf {
    let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(0);
    let data = (0..(width * height) as usize * depth)
        .map(|_| rng.gen())
        .collect();
    ImageBuf::new(data, width, height, depth).unwrap()
}

fn kmeans_strategies(c: &mut Criterion) {
    let image = synthetic_image(128, 128, 3);
    let options = KmeansOptions::new().max_iterations(10);

    let mut group = c.benchmark_group("kmeans_strategies");
    group
        .sample_size(30)
        .noise_threshold(0.05)
        .sampling_mode(SamplingMode::Flat)
        .warm_up_time(Duration::from_millis(500));

    for k in [4u16, 16, 64] {
        let k = ClusterCount::try_from(k).unwrap();

        group.bench_with_input(BenchmarkId::new("scan", k), &k, |b, &k| {
            b.iter(|| kmeans::segment(image.as_slice(), k, &options));
        });
        group.bench_with_input(BenchmarkId::new("kdtree", k), &k, |b, &k| {
            b.iter(|| kmeans::segment_kdtree(image.as_slice(), k, &options));
        });
        group.bench_with_input(BenchmarkId::new("cached", k), &k, |b, &k| {
            b.iter(|| kmeans::segment_cached(image.as_slice(), k, &options));
        });
    }
    group.finish();
}

fn isodata_rounds(c: &mut Criterion) {
    let image = synthetic_image(128, 128, 3);
    let options = IsodataOptions::new().min_elements(4).max_rounds(5);

    let mut group = c.benchmark_group("isodata");
    group
        .sample_size(20)
        .sampling_mode(SamplingMode::Flat)
        .warm_up_time(Duration::from_millis(500));

    for k in [4u16, 16] {
        let k = ClusterCount::try_from(k).unwrap();
        group.bench_with_input(BenchmarkId::new("segment", k), &k, |b, &k| {
            b.iter(|| isodata::segment(image.as_slice(), k, &options));
        });
    }
    group.finish();
}

criterion_group!(benches, kmeans_strategies, isodata_rounds);
criterion_main!(benches);
