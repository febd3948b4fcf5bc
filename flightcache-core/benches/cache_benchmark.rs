use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use flightcache_core::{Cache, CacheOptions};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn new_cache() -> Cache<u64, String> {
    Cache::new(CacheOptions::default().with_max_cache_time(Duration::from_secs(60)))
}

fn bench_get_or_create_miss(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("get_or_create_miss");

    for size in [10u64, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.to_async(&rt).iter(|| async move {
                let cache = new_cache();
                for i in 0..size {
                    let key = format!("key{}", i);
                    cache
                        .get_or_create(&key, |_| async move { Ok(black_box(i)) })
                        .await
                        .unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_get_or_create_hit(c: &mut Criterion) {
    let rt = runtime();
    let cache = new_cache();
    rt.block_on(async {
        for i in 0..1000u64 {
            cache.set_value(&format!("key{}", i), i).await.unwrap();
        }
    });

    c.bench_function("get_or_create_hit", |b| {
        b.to_async(&rt).iter(|| async {
            for i in 0..1000u64 {
                let value = cache
                    .get_or_create(&format!("key{}", i), |_| async { Ok(0) })
                    .await
                    .unwrap();
                black_box(value);
            }
        });
    });
}

fn bench_concurrent_same_key(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("concurrent_same_key");

    for tasks in [4usize, 16, 64].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(tasks), tasks, |b, &tasks| {
            b.to_async(&rt).iter(|| async move {
                let cache = Arc::new(new_cache());
                let handles: Vec<_> = (0..tasks)
                    .map(|_| {
                        let cache = cache.clone();
                        tokio::spawn(async move {
                            cache
                                .get_or_create("shared", |_| async {
                                    tokio::task::yield_now().await;
                                    Ok(1)
                                })
                                .await
                        })
                    })
                    .collect();
                for handle in handles {
                    black_box(handle.await.unwrap().unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_get_or_create_miss,
    bench_get_or_create_hit,
    bench_concurrent_same_key
);
criterion_main!(benches);
