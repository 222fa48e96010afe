//! Performance benchmarks for pantry-transfer

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pantry_transfer::{
    export, import, ExportOptions, ImportOptions, MemoryStore, Record, Registry, Snapshot,
};
use serde_json::Value;
use tokio::runtime::Runtime;

fn populated_store(ingredients: usize) -> MemoryStore {
    let units = vec![
        Record::new().with("id", "g").with("factor", 1),
        Record::new().with("id", "kg").with("factor", 1000),
    ];
    let recipes: Vec<Record> = (0..ingredients / 4)
        .map(|i| {
            Record::new()
                .with("id", format!("R{}", i))
                .with("name", format!("Recipe {}", i))
                .with("output_unit_id", "kg")
                .with("image_data", "x".repeat(256))
        })
        .collect();
    let ingredient_rows: Vec<Record> = (0..ingredients)
        .map(|i| {
            let produced_by = if i % 4 == 0 && i / 4 < recipes.len() {
                Value::from(format!("R{}", i / 4))
            } else {
                Value::Null
            };
            Record::new()
                .with("id", format!("I{}", i))
                .with("name", format!("Ingredient {}", i))
                .with("default_unit_id", "g")
                .with("produced_by_recipe_id", produced_by)
                .with("image_data", "x".repeat(256))
        })
        .collect();
    let components: Vec<Record> = (0..ingredients)
        .map(|i| {
            Record::new()
                .with("id", format!("C{}", i))
                .with("recipe_id", format!("R{}", i % recipes.len().max(1)))
                .with("ingredient_id", format!("I{}", i))
                .with("quantity", 1.5)
        })
        .collect();

    MemoryStore::with_tables([
        ("unit", units),
        ("ingredient", ingredient_rows),
        ("recipe", recipes),
        ("recipe_component", components),
    ])
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let registry = Registry::inventory();
    let rt = Runtime::new().unwrap();

    for size in [100usize, 1000] {
        let store = populated_store(size);
        let snapshot = rt
            .block_on(export(&store, &registry, ExportOptions::full()))
            .unwrap();
        let body = serde_json::to_value(&snapshot).unwrap();
        let text = snapshot.to_json().unwrap();

        group.bench_with_input(BenchmarkId::new("decode", size), &body, |b, body| {
            b.iter(|| Snapshot::decode(black_box(&registry), black_box(body)))
        });

        group.bench_with_input(BenchmarkId::new("from_json", size), &text, |b, text| {
            b.iter(|| Snapshot::from_json(black_box(&registry), black_box(text)))
        });

        group.bench_with_input(BenchmarkId::new("to_json", size), &snapshot, |b, snapshot| {
            b.iter(|| black_box(snapshot).to_json())
        });
    }

    group.finish();
}

fn bench_transfer(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer");
    let registry = Registry::inventory();
    let rt = Runtime::new().unwrap();

    for size in [100usize, 1000] {
        let store = populated_store(size);

        group.bench_with_input(BenchmarkId::new("export_full", size), &store, |b, store| {
            b.to_async(&rt)
                .iter(|| export(store, &registry, ExportOptions::full()))
        });

        group.bench_with_input(BenchmarkId::new("export_plain", size), &store, |b, store| {
            b.to_async(&rt)
                .iter(|| export(store, &registry, ExportOptions::plain()))
        });

        let snapshot = rt
            .block_on(export(&store, &registry, ExportOptions::full()))
            .unwrap();
        let body = serde_json::to_value(&snapshot).unwrap();
        let destination = MemoryStore::new();

        group.bench_with_input(BenchmarkId::new("import", size), &body, |b, body| {
            b.to_async(&rt).iter(|| {
                import(&destination, &registry, black_box(body), ImportOptions::default())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec, bench_transfer);
criterion_main!(benches);
