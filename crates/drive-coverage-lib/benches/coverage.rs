//! Performance benchmarks for drive-coverage-lib
//!
//! Run with: cargo bench --package drive-coverage-lib

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use drive_coverage_lib::{
    CoverageChecker, CoverageConfig, CoverageMode, Quadtree, SegmentCollection,
};
use geo::{Coord, LineString};

/// Generate a street grid where roughly two thirds of the streets have a return lane.
///
/// Blocks are 100 m wide, streets 60 m long and return lanes 4 m apart, so each
/// segment has only a few neighbours within reach.
fn generate_street_grid(blocks_per_side: usize) -> SegmentCollection {
    let mut lines = Vec::with_capacity(blocks_per_side * blocks_per_side * 4);

    for row in 0..blocks_per_side {
        for col in 0..blocks_per_side {
            let x = col as f64 * 100.0;
            let y = row as f64 * 100.0;
            let two_way = (row + col) % 3 != 0;

            // East-west street
            lines.push(LineString::new(vec![
                Coord { x, y },
                Coord { x: x + 30.0, y: y + 0.5 },
                Coord { x: x + 60.0, y },
            ]));
            if two_way {
                lines.push(LineString::new(vec![
                    Coord { x: x + 60.0, y: y + 4.0 },
                    Coord { x, y: y + 4.0 },
                ]));
            }

            // North-south street
            lines.push(LineString::new(vec![
                Coord { x: x + 80.0, y },
                Coord { x: x + 80.0, y: y + 60.0 },
            ]));
            if two_way {
                lines.push(LineString::new(vec![
                    Coord { x: x + 84.0, y: y + 60.0 },
                    Coord { x: x + 84.0, y },
                ]));
            }
        }
    }

    SegmentCollection::from_line_strings(Some("EPSG:3857".to_string()), lines)
        .expect("generated geometry is valid")
}

// ============================================================================
// Core Benchmarks - Key performance indicators
// ============================================================================

fn bench_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("check");
    group.sample_size(20);

    for blocks in [32, 100] {
        let collection = generate_street_grid(blocks);
        group.throughput(Throughput::Elements(collection.len() as u64));

        for (name, mode, parallel) in [
            ("independent", CoverageMode::Independent, false),
            ("independent_parallel", CoverageMode::Independent, true),
            ("symmetric", CoverageMode::Symmetric, false),
        ] {
            let checker = CoverageChecker::new(CoverageConfig {
                mode,
                parallel,
                ..CoverageConfig::default()
            });
            group.bench_with_input(
                BenchmarkId::new(name, collection.len()),
                &collection,
                |b, collection| {
                    b.iter(|| checker.check(collection).unwrap());
                },
            );
        }
    }

    group.finish();
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");

    let collection = generate_street_grid(100);
    group.throughput(Throughput::Elements(collection.len() as u64));

    group.bench_function("build", |b| {
        b.iter(|| Quadtree::build(&collection).unwrap());
    });

    let index = Quadtree::build(&collection).unwrap();
    let query = collection[collection.len() / 2].bounding_box();
    group.bench_function("query_single", |b| {
        b.iter(|| index.query(query).unwrap());
    });

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(benches, bench_check, bench_index);

criterion_main!(benches);
