// Load performance benchmarks for fixture-loader

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fixture_loader::{EntityRegistry, EntityType, MemoryResourceLoader, MemoryStore, ScriptExecutor};
use std::hint::black_box;
use std::sync::Arc;

fn setup(scripts: MemoryResourceLoader) -> (MemoryStore, ScriptExecutor) {
    let types = EntityRegistry::new().with(EntityType::new("User").attributes(["name", "age"]));
    let store = MemoryStore::new(Arc::new(types));
    let executor = ScriptExecutor::in_memory(&store).with_resource_loader(scripts);
    (store, executor)
}

fn benchmark_rows_per_script(c: &mut Criterion) {
    let mut group = c.benchmark_group("rows_per_script");

    for size in [10, 100, 1000].iter() {
        let script = format!(
            r#"
            users = table(User, {{"name", "age"}}, function()
                for i = 1, {} do
                    row("user" .. i, i)
                end
            end)
            "#,
            size
        );
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &script, |b, script| {
            b.iter(|| {
                let (_store, executor) =
                    setup(MemoryResourceLoader::new().with_script("users.lua", script.as_str()));
                black_box(executor.load(["users.lua"]).unwrap());
            });
        });
    }

    group.finish();
}

fn benchmark_scripts_per_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("scripts_per_batch");

    for size in [1, 10, 50].iter() {
        let mut scripts = MemoryResourceLoader::new();
        let names: Vec<String> = (0..*size).map(|i| format!("s{:03}.lua", i)).collect();
        for (i, name) in names.iter().enumerate() {
            scripts.insert(
                name.as_str(),
                format!("v{} = {} table(User, {{'name'}}, function() row('{}') end)", i, i, name),
            );
        }

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &names, |b, names| {
            b.iter(|| {
                let (_store, executor) = setup(scripts.clone());
                black_box(executor.load(names.iter().map(String::as_str)).unwrap());
            });
        });
    }

    group.finish();
}

fn benchmark_nested_load(c: &mut Criterion) {
    let scripts = MemoryResourceLoader::new()
        .with_script("leaf.lua", "table(User, {'name'}, function() leaf = row('leaf') end)")
        .with_script("mid.lua", "a = load('leaf.lua') b = load('leaf.lua')")
        .with_script("root.lua", "m = load({ left = 'mid.lua', right = 'mid.lua' })");

    c.bench_function("nested_load", |b| {
        b.iter(|| {
            let (_store, executor) = setup(scripts.clone());
            black_box(executor.load(["root.lua"]).unwrap());
        });
    });
}

criterion_group!(
    benches,
    benchmark_rows_per_script,
    benchmark_scripts_per_batch,
    benchmark_nested_load
);
criterion_main!(benches);
