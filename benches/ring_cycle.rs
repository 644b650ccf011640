//! Ring handoff, frame and resize benchmarks on the host backend.

#![allow(unused_results, clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use interop_ring::pipeline::host::{HostCompute, HostDisplay, HostGpu, HostStream};
use interop_ring::InteropRing;

type HostRing = InteropRing<HostDisplay, HostCompute>;

fn ring(gpu: &HostGpu, multi_gpu: bool) -> HostRing {
    let mut ring = InteropRing::configure(
        gpu.display(),
        gpu.compute(),
        gpu.device_ids(),
        3,
        multi_gpu,
    )
    .unwrap();
    ring.resize(64, 64).unwrap();
    ring
}

fn handoff_benchmark(c: &mut Criterion) {
    let stream = HostStream(0);
    let mut group = c.benchmark_group("handoff");

    let gpu = HostGpu::new(1);
    let mut single = ring(&gpu, false);
    group.bench_function("single_gpu", |b| {
        b.iter(|| {
            single.map(black_box(&stream)).unwrap();
            single.unmap(black_box(&stream)).unwrap();
            single.swap().unwrap();
        })
    });

    let gpu = HostGpu::new(4);
    let mut multi = ring(&gpu, true);
    group.bench_function("four_gpus", |b| {
        b.iter(|| {
            multi.map(black_box(&stream)).unwrap();
            multi.unmap(black_box(&stream)).unwrap();
            multi.swap().unwrap();
        })
    });
    group.finish();
}

fn frame_benchmark(c: &mut Criterion) {
    let stream = HostStream(0);
    let gpu = HostGpu::new(2);
    let mut ring = ring(&gpu, true);
    c.bench_function("frame_with_pattern_and_blit", |b| {
        b.iter(|| {
            ring.map(&stream).unwrap();
            for part in ring.array_get().unwrap() {
                let x0 = part.partition.x;
                part.array
                    .fill(|x, y| [(x0 + x) as u8, y as u8, 0, 255])
                    .unwrap();
            }
            ring.unmap(&stream).unwrap();
            ring.swap().unwrap();
            ring.blit().unwrap();
        })
    });
}

fn resize_benchmark(c: &mut Criterion) {
    let gpu = HostGpu::new(3);
    let mut ring = ring(&gpu, true);
    let mut wide = false;
    c.bench_function("resize_three_gpus", |b| {
        b.iter(|| {
            wide = !wide;
            let width = if wide { 1920 } else { 1280 };
            ring.resize(black_box(width), 16).unwrap();
        })
    });
}

criterion_group!(benches, handoff_benchmark, frame_benchmark, resize_benchmark);
criterion_main!(benches);
