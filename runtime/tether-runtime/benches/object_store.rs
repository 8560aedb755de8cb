use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use tether_runtime::{Bridge, ManagedObject};

fn bench_store_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_store");
    for size in [1024usize, 8192] {
        let bridge = Bridge::with_defaults();
        let objects: Vec<ManagedObject> = (0..size).map(|i| ManagedObject::str(&i.to_string())).collect();
        group.bench_with_input(BenchmarkId::new("store_decref", size), &objects, |b, objects| {
            b.iter(|| {
                for object in objects {
                    let handle = bridge.store(object.clone());
                    black_box(handle);
                    bridge.dec_ref(handle).unwrap();
                }
            });
        });
    }
    group.finish();
}

fn bench_borrowed_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_store");
    for size in [1024usize, 8192] {
        let bridge = Bridge::with_defaults();
        let dict = bridge.dict_new();
        let keys: Vec<String> = (0..size).map(|i| format!("k{i}")).collect();
        for (i, key) in keys.iter().enumerate() {
            let value = bridge.store(ManagedObject::Int(i as i64));
            bridge.dict_set_item_string(dict, key, value).unwrap();
            bridge.dec_ref(value).unwrap();
        }
        group.bench_with_input(BenchmarkId::new("get_item_free_temps", size), &keys, |b, keys| {
            b.iter(|| {
                for key in keys {
                    black_box(bridge.dict_get_item_string(dict, key).unwrap());
                }
                bridge.free_temps().unwrap();
            });
        });
    }
    group.finish();
}

fn bench_execution_lock(c: &mut Criterion) {
    let bridge = Bridge::with_defaults();
    c.bench_function("ensure_release", |b| {
        b.iter(|| {
            let state = bridge.ensure_execution_lock().unwrap();
            bridge.release_execution_lock(black_box(state)).unwrap();
        });
    });
}

criterion_group!(benches, bench_store_release, bench_borrowed_lookup, bench_execution_lock);
criterion_main!(benches);
