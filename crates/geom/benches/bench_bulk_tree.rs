use std::hint::black_box;
use std::time::Instant;

use glam::Vec2;
use streamer_common::SplitMix64;
use streamer_geom::{BoundingBox, BulkTree, SplitStrategy};

fn random_boxes(n: usize, seed: u64) -> Vec<(usize, BoundingBox)> {
    let mut rng = SplitMix64::new(seed);
    (0..n)
        .map(|i| {
            let x = rng.range(-3000.0, 3000.0);
            let y = rng.range(-3000.0, 3000.0);
            let w = rng.range(1.0, 120.0);
            (i, BoundingBox::new(Vec2::new(x, y), Vec2::new(x + w, y + w)))
        })
        .collect()
}

fn bench_build(n: usize, iterations: usize) {
    let items = random_boxes(n, 42);
    let strategy = SplitStrategy::new(4, 16).unwrap();

    let start = Instant::now();
    for _ in 0..iterations {
        let tree = BulkTree::build(black_box(items.clone()), strategy);
        black_box(tree.height());
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  build ({n} boxes, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn bench_search(n: usize, radius: f32, iterations: usize) {
    let tree = BulkTree::build(random_boxes(n, 7), SplitStrategy::new(4, 16).unwrap());
    let mut rng = SplitMix64::new(3);

    let start = Instant::now();
    for _ in 0..iterations {
        let c = Vec2::new(rng.range(-3000.0, 3000.0), rng.range(-3000.0, 3000.0));
        let _ = black_box(tree.search(&BoundingBox::around(black_box(c), radius)));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  search ({n} boxes, r={radius}, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn main() {
    println!("=== Bulk Tree Benchmarks ===\n");

    println!("Bulk build:");
    bench_build(1_000, 100);
    bench_build(10_000, 10);
    bench_build(100_000, 2);

    println!("\nBox search:");
    bench_search(10_000, 50.0, 10_000);
    bench_search(10_000, 300.0, 10_000);
    bench_search(100_000, 300.0, 1_000);

    println!("\n=== Done ===");
}
