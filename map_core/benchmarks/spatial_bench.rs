use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use map_core::{
    detect_adjacencies, BoundingBox, Coordinate, LineOfSightCalculator, ProvinceRecord,
    ProvinceSpatialIndex, QuadTreeIndex, TerrainCell, TerrainCellType, TerrainGrid,
};
use map_core::map_config::{QuadTreeConfig, SpatialGridConfig};
use rand::{rngs::SmallRng, Rng, SeedableRng};

fn square_map(side: u32, size: f64) -> Vec<ProvinceRecord> {
    let mut provinces = Vec::with_capacity((side * side) as usize);
    for row in 0..side {
        for col in 0..side {
            let (x, y) = (f64::from(col) * size, f64::from(row) * size);
            provinces.push(ProvinceRecord::new(
                row * side + col,
                format!("P{row}_{col}"),
                0,
                vec![
                    Coordinate::new(x, y),
                    Coordinate::new(x + size, y),
                    Coordinate::new(x + size, y + size),
                    Coordinate::new(x, y + size),
                ],
            ));
        }
    }
    provinces
}

fn bench_adjacency(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_adjacencies");
    for side in [10u32, 30] {
        let provinces = square_map(side, 50.0);
        group.bench_with_input(BenchmarkId::from_parameter(side), &provinces, |b, provinces| {
            b.iter(|| {
                let mut provinces = provinces.clone();
                black_box(detect_adjacencies(&mut provinces, 0.001))
            });
        });
    }
    group.finish();
}

fn bench_spatial_queries(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(42);
    let points: Vec<(u32, f64, f64)> = (0..5_000)
        .map(|id| (id, rng.gen_range(0.0..10_000.0), rng.gen_range(0.0..10_000.0)))
        .collect();

    let grid = ProvinceSpatialIndex::new(SpatialGridConfig::default());
    let mut quadtree = QuadTreeIndex::new(QuadTreeConfig {
        world_bounds: BoundingBox::new(0.0, 0.0, 10_000.0, 10_000.0),
        ..QuadTreeConfig::default()
    });
    for &(id, x, y) in &points {
        grid.insert_province(id, x, y);
        quadtree.insert(id, BoundingBox::around(Coordinate::new(x, y), 20.0));
    }

    let mut group = c.benchmark_group("spatial_queries");
    group.bench_function("grid_radius_250", |b| {
        b.iter(|| black_box(grid.find_provinces_in_radius(5_000.0, 5_000.0, 250.0)))
    });
    group.bench_function("grid_exact_radius_250", |b| {
        b.iter(|| black_box(grid.find_provinces_within_radius_exact(5_000.0, 5_000.0, 250.0)))
    });
    group.bench_function("grid_nearest_10", |b| {
        b.iter(|| black_box(grid.find_nearest_provinces(1_234.0, 8_765.0, 10)))
    });
    group.bench_function("quadtree_region_500", |b| {
        let region = BoundingBox::new(4_750.0, 4_750.0, 5_250.0, 5_250.0);
        b.iter(|| black_box(quadtree.query_region(&region)))
    });
    group.bench_function("quadtree_nearest_10", |b| {
        b.iter(|| black_box(quadtree.find_n_nearest(Coordinate::new(1_234.0, 8_765.0), 10)))
    });
    group.finish();
}

fn bench_line_of_sight(c: &mut Criterion) {
    let mut terrain = TerrainGrid::new(256, 256, 1.0);
    let mut rng = SmallRng::seed_from_u64(7);
    for _ in 0..2_000 {
        let (x, y) = (rng.gen_range(0..256), rng.gen_range(0..256));
        let cell = if rng.gen_bool(0.3) {
            TerrainCell::new(TerrainCellType::Mountain, 400.0)
        } else {
            TerrainCell::new(TerrainCellType::Forest, 20.0)
        };
        terrain.set_cell(x, y, cell);
    }
    let calculator = LineOfSightCalculator::default();
    let viewer = Coordinate::new(128.5, 128.5);

    let mut group = c.benchmark_group("line_of_sight");
    for range in [20.0, 60.0] {
        group.bench_with_input(BenchmarkId::new("visible_cells", range), &range, |b, &range| {
            b.iter(|| black_box(calculator.visible_cells(viewer, range, &terrain)))
        });
    }
    group.bench_function("single_ray_100", |b| {
        let target = Coordinate::new(228.5, 178.5);
        b.iter(|| black_box(calculator.ray_cast(viewer, target, &terrain)))
    });
    group.finish();
}

criterion_group!(benches, bench_adjacency, bench_spatial_queries, bench_line_of_sight);
criterion_main!(benches);
