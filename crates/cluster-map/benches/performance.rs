//! Performance benchmarks for cluster-map
//!
//! Run with: cargo bench --package cluster-map

use cluster_map::{
    ClusterManager, Clusterable, Configuration, Coordinate, Quadtree, Region, Size, Span,
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

#[derive(Clone, Debug, PartialEq)]
struct Marker {
    id: usize,
    coordinate: Coordinate,
}

impl Clusterable for Marker {
    fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    fn set_coordinate(&mut self, coordinate: Coordinate) {
        self.coordinate = coordinate;
    }
}

/// Generate markers scattered over a square area around a base coordinate.
fn generate_markers(count: usize, base_lat: f64, base_lon: f64, extent: f64) -> Vec<Marker> {
    (0..count)
        .map(|id| {
            let t = id as f64 / count as f64;
            // Deterministic scatter, denser towards the middle
            let lat = base_lat + ((t * 7919.0).sin() * (t * 31.0).cos()) * extent * 0.5;
            let lon = base_lon + ((t * 104_729.0).cos() * (t * 17.0).sin()) * extent * 0.5;
            Marker {
                id,
                coordinate: Coordinate::new(lat, lon),
            }
        })
        .collect()
}

fn region(center_lat: f64, center_lon: f64, extent: f64) -> Region {
    Region::new(
        Coordinate::new(center_lat, center_lon),
        Span {
            latitude_delta: extent,
            longitude_delta: extent,
        },
    )
}

// ============================================================================
// Index Benchmarks
// ============================================================================

fn bench_quadtree(c: &mut Criterion) {
    let mut group = c.benchmark_group("quadtree");
    group.sample_size(20);

    for count in [10_000, 100_000] {
        let markers = generate_markers(count, 52.52, 13.40, 1.0);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("insert", count), &markers, |b, markers| {
            b.iter(|| {
                let mut tree = Quadtree::new();
                for marker in markers.iter().cloned() {
                    tree.add(marker);
                }
                tree
            });
        });

        let mut tree = Quadtree::new();
        for marker in markers.iter().cloned() {
            tree.add(marker);
        }
        let small = region(52.52, 13.40, 0.05).to_map_rect();
        let large = region(52.52, 13.40, 1.0).to_map_rect();

        group.bench_with_input(BenchmarkId::new("query_small", count), &tree, |b, tree| {
            b.iter(|| tree.find_annotation_refs(small).len());
        });
        group.bench_with_input(BenchmarkId::new("query_large", count), &tree, |b, tree| {
            b.iter(|| tree.find_annotation_refs(large).len());
        });
    }

    group.finish();
}

// ============================================================================
// Reload Benchmarks
// ============================================================================

fn bench_reload(c: &mut Criterion) {
    let mut group = c.benchmark_group("reload");
    group.sample_size(20);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .build()
        .expect("Failed to build tokio runtime");
    let viewport = Size::new(428.0, 926.0);

    for count in [10_000, 100_000] {
        let manager = ClusterManager::new(Configuration::default());
        runtime.block_on(manager.add_many(generate_markers(count, 52.52, 13.40, 1.0)));

        group.throughput(Throughput::Elements(count as u64));

        // Same viewport every time: full clustering pass, empty difference
        let overview = region(52.52, 13.40, 1.0);
        group.bench_function(BenchmarkId::new("steady_overview", count), |b| {
            b.iter(|| runtime.block_on(manager.reload(viewport, overview)));
        });

        // Alternating zoom: every reload replaces the visible set
        let detail = region(52.52, 13.40, 0.1);
        let mut zoomed_in = false;
        group.bench_function(BenchmarkId::new("alternating_zoom", count), |b| {
            b.iter(|| {
                zoomed_in = !zoomed_in;
                let target = if zoomed_in { detail } else { overview };
                runtime.block_on(manager.reload(viewport, target))
            });
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(benches, bench_quadtree, bench_reload);

criterion_main!(benches);
