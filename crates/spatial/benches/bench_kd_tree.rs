use std::hint::black_box;
use std::time::Instant;

use glam::Vec3;
use shardspace_spatial::{KdTree, LazyIndex};

fn make_points(count: usize, spacing: f32) -> Vec<(Vec3, usize)> {
    let side = (count as f32).cbrt().ceil() as usize;
    (0..count)
        .map(|i| {
            let x = (i % side) as f32 * spacing;
            let y = ((i / side) % side) as f32 * spacing;
            let z = (i / (side * side)) as f32 * spacing;
            (Vec3::new(x, y, z), i)
        })
        .collect()
}

fn bench_build(count: usize, iterations: usize) {
    let points = make_points(count, 0.01);

    let start = Instant::now();
    for _ in 0..iterations {
        black_box(KdTree::build(black_box(points.clone())));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  build ({count} points, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn bench_radius(count: usize, radius: f32, iterations: usize) {
    let tree = KdTree::build(make_points(count, 0.01));
    let center = Vec3::splat(0.05);

    let start = Instant::now();
    let mut hits = 0usize;
    for _ in 0..iterations {
        hits += black_box(tree.within_radius(black_box(center), black_box(radius))).len();
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  radius query ({count} points, r={radius}, {iterations} iters): {per_iter:?}/iter, {} hits/iter",
        hits / iterations
    );
}

fn bench_lazy_churn(count: usize, iterations: usize) {
    let points = make_points(count, 0.01);
    let index: LazyIndex<usize> = LazyIndex::new();

    let start = Instant::now();
    for i in 0..iterations {
        // Every fourth step is a structural change.
        if i % 4 == 0 {
            index.invalidate();
        }
        let tree = index.current(|| points.clone());
        black_box(tree.within_radius(Vec3::ZERO, 0.05));
    }
    let elapsed = start.elapsed();
    println!(
        "  lazy index ({count} points, {iterations} iters, {} rebuilds): total {elapsed:?}",
        index.rebuild_count()
    );
}

fn main() {
    println!("=== k-d Tree Benchmarks ===\n");

    println!("Build:");
    bench_build(1_000, 200);
    bench_build(10_000, 20);
    bench_build(100_000, 2);

    println!("\nRadius query:");
    bench_radius(10_000, 0.02, 10_000);
    bench_radius(10_000, 0.05, 10_000);
    bench_radius(100_000, 0.05, 1_000);

    println!("\nLazy rebuild under churn:");
    bench_lazy_churn(1_000, 1_000);
    bench_lazy_churn(10_000, 100);

    println!("\n=== Done ===");
}
