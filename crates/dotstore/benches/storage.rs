use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use dotstore::{FileStore, MemoryStore, Store};
use tempfile::TempDir;

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("memory_put_1kb", |b| {
        let store = MemoryStore::new();
        let data = vec![b'x'; 1024];

        let mut counter = 0u64;
        b.iter(|| {
            let key = format!("bench.{}", counter % 1000);
            black_box(store.put(&key, data.clone(), None).unwrap());
            counter += 1;
        });
    });

    group.bench_function("file_put_1kb_100_entries", |b| {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let data = vec![b'x'; 1024];

        let mut counter = 0u64;
        b.iter(|| {
            let key = format!("bench.{}", counter % 100);
            black_box(store.put(&key, data.clone(), None).unwrap());
            counter += 1;
        });
    });
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("memory_get_1kb", |b| {
        let store = MemoryStore::new();
        let data = vec![b'x'; 1024];

        // Pre-populate with 100 entries
        for i in 0..100 {
            store.put(&format!("bench.{}", i), data.clone(), None).unwrap();
        }

        b.iter(|| {
            black_box(store.get("bench.50").unwrap());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_put, bench_get);
criterion_main!(benches);
