use std::cmp::Ordering;
use std::sync::Arc;

use cfish_runtime::classes::{self, integer};
use cfish_runtime::config::RuntimeConfig;
use cfish_runtime::sort::{compare_objs, Comparator};
use cfish_runtime::{Obj, SortExternal, VecRunReader};

fn drain<T>(engine: &mut SortExternal<T>) -> Vec<T> {
    std::iter::from_fn(|| engine.fetch()).collect()
}

/// Deterministic pseudo-random sequence
fn scrambled(len: usize, seed: u64) -> Vec<i64> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as i64 % 10_000
        })
        .collect()
}

#[test]
fn sorts_integer_objects_through_compare_to() {
    classes::bootstrap_core();
    let mut engine = SortExternal::for_objects();
    engine.set_mem_thresh(16 * std::mem::size_of::<Obj>());

    let values = scrambled(200, 7);
    for value in &values {
        engine.feed(integer::new(*value));
    }
    assert!(engine.num_runs() > 1);
    engine.flip();

    let sorted: Vec<i64> = drain(&mut engine)
        .iter()
        .filter_map(integer::value)
        .collect();
    let mut expected = values;
    expected.sort();
    assert_eq!(sorted, expected);
}

#[test]
fn merged_objects_keep_one_reference() {
    classes::bootstrap_core();
    let keep: Vec<Obj> = [3, 1, 2].into_iter().map(integer::new).collect();

    let mut engine = SortExternal::for_objects();
    for obj in &keep {
        engine.feed(obj.clone());
    }
    assert!(keep.iter().all(|obj| obj.get_count() == 2));

    engine.sort_buffer();
    let first = engine.fetch().unwrap();
    assert_eq!(integer::value(&first), Some(1));
    drop(first);
    drop(engine);
    assert!(keep.iter().all(|obj| obj.get_count() == 1));
}

#[test]
fn disk_style_runs_merge_with_spilled_runs() {
    let compare: Comparator<i64> = Arc::new(|a: &i64, b: &i64| a.cmp(b));
    let mut engine = SortExternal::with_comparator(Arc::clone(&compare));
    engine.set_mem_thresh(32 * std::mem::size_of::<i64>());

    let mut expected = Vec::new();
    for seed in 0..4 {
        let mut run = scrambled(100, seed);
        run.sort();
        expected.extend_from_slice(&run);
        engine.add_run(SortExternal::from_reader(
            Arc::clone(&compare),
            VecRunReader::new(run, 16),
        ));
    }
    for value in scrambled(150, 99) {
        expected.push(value);
        engine.feed(value);
    }
    engine.flip();
    expected.sort();

    assert_eq!(drain(&mut engine), expected);
}

#[test]
fn closure_readers_stream_batches() {
    let compare: Comparator<u32> = Arc::new(|a: &u32, b: &u32| a.cmp(b));
    let mut engine = SortExternal::with_comparator(Arc::clone(&compare));

    for start in 0..3u32 {
        let mut next = start;
        engine.add_run(SortExternal::from_reader(
            Arc::clone(&compare),
            move |out: &mut Vec<u32>| -> usize {
                if next >= 30 {
                    return 0;
                }
                out.push(next);
                next += 3;
                1
            },
        ));
    }
    engine.flip();

    assert_eq!(drain(&mut engine), (0..30).collect::<Vec<_>>());
}

#[test]
fn descending_order() {
    let mut engine = SortExternal::new(|a: &i64, b: &i64| b.cmp(a));
    engine.set_mem_thresh(8 * std::mem::size_of::<i64>());
    for value in 0..50 {
        engine.feed(value);
    }
    engine.flip();
    assert_eq!(drain(&mut engine), (0..50).rev().collect::<Vec<_>>());
}

#[test]
fn threshold_from_config() {
    let config = RuntimeConfig::parse("[sort]\nmem_thresh = 64\n").unwrap();
    let mut engine = SortExternal::new(|a: &u64, b: &u64| a.cmp(b)).with_config(&config.sort);
    for value in (0..20u64).rev() {
        engine.feed(value);
    }
    // 64 bytes hold 8 items before each spill
    assert_eq!(engine.num_runs(), 2);
    engine.flip();
    assert_eq!(drain(&mut engine), (0..20).collect::<Vec<_>>());
}

#[test]
fn compare_objs_orders_integers() {
    classes::bootstrap_core();
    let a = integer::new(1);
    let b = integer::new(2);
    assert_eq!(compare_objs(&a, &b), Ordering::Less);
    assert_eq!(compare_objs(&b, &a), Ordering::Greater);
}
