//! Reference counting and dispatch benchmarks
//!
//! Measures retain/release traffic on mortal and immortal objects and
//! the cost of a vtable dispatch.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cfish_runtime::classes::{self, boolean, integer, OBJ_EQUALS};
use cfish_runtime::Obj;

fn bench_retain_release(c: &mut Criterion) {
    classes::bootstrap_core();
    let mortal = integer::new(42);
    let immortal = boolean::singleton(true);

    let mut group = c.benchmark_group("retain_release");
    group.bench_function("mortal", |b| {
        b.iter(|| {
            let copy = black_box(&mortal).clone();
            drop(black_box(copy));
        });
    });
    group.bench_function("immortal", |b| {
        b.iter(|| {
            let copy = black_box(&immortal).clone();
            drop(black_box(copy));
        });
    });
    group.finish();
}

fn bench_lifecycle(c: &mut Criterion) {
    classes::bootstrap_core();

    let mut group = c.benchmark_group("lifecycle");
    for count in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::new("alloc_destroy", count), &count, |b, &count| {
            b.iter(|| {
                let objects: Vec<Obj> = (0..count as i64).map(integer::new).collect();
                black_box(objects);
            });
        });
    }
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    classes::bootstrap_core();
    let a = integer::new(7);
    let b = integer::new(7);

    c.bench_function("dispatch_equals", |bench| {
        bench.iter(|| {
            let equals = black_box(&a).class().method(&OBJ_EQUALS);
            black_box(equals(&a, &b))
        });
    });
}

criterion_group!(benches, bench_retain_release, bench_lifecycle, bench_dispatch);
criterion_main!(benches);
