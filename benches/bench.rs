// Criterion benchmarks for the nearby places pipeline

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nearby_places::core::geometry::{validate_radius, GeometryLimits};
use nearby_places::core::merge::{merge, OverpassMapper, SourceBatch};
use nearby_places::core::query::{FilterSelection, QueryBuilder};
use nearby_places::models::{PoiSource, SearchArea};
use serde_json::{json, Value};

fn area() -> SearchArea {
    let query = validate_radius(Some("33.8938"), Some("35.5018"), Some("1500"), &GeometryLimits::default())
        .expect("valid benchmark query");
    SearchArea::Radius(query)
}

fn create_elements(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            let offset = (i % 100) as f64 * 0.0005;
            json!({
                "type": if i % 3 == 0 { "way" } else { "node" },
                "id": i,
                "lat": 33.88 + offset,
                "lon": 35.49 + offset,
                "tags": {
                    "leisure": "fitness_centre",
                    "name": format!("Gym {}", i % 150),
                    "addr:street": "Hamra Street"
                }
            })
        })
        .collect()
}

fn bench_compile_query(c: &mut Criterion) {
    let builder = QueryBuilder::default();
    let area = area();
    let selection = FilterSelection::parse(["gym,nutritionist", "wheelchair=yes"]);

    c.bench_function("compile_query", |b| {
        b.iter(|| builder.compile(black_box(&area), black_box(&selection)));
    });
}

fn bench_normalize_and_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_and_merge");
    let mapper = OverpassMapper { center: area().reference_point() };

    for size in [100, 500, 1000, 5000].iter() {
        let elements = create_elements(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let batch = SourceBatch::from_records(PoiSource::Fallback, black_box(&elements), &mapper);
                merge(vec![batch], true)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile_query, bench_normalize_and_merge);
criterion_main!(benches);
