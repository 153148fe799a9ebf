use std::sync::atomic::{AtomicUsize, Ordering};

use cfish_runtime::class::{bootstrap, ClassFlags, ClassSlot, ClassSpec, DestroyFn, OverriddenMethSpec};
use cfish_runtime::classes::{self, boolean, integer, OBJ, OBJ_DESTROY};
use cfish_runtime::config::RuntimeConfig;
use cfish_runtime::{declare_method, runtime, Class, Obj, RawObj};
use once_cell::sync::OnceCell;
use rayon::prelude::*;

static TRACKED: ClassSlot = ClassSlot::new();
static DESTROYED: AtomicUsize = AtomicUsize::new(0);
declare_method!(TRACKED_DESTROY: DestroyFn = "Destroy");

fn tracked_destroy(obj: RawObj) {
    DESTROYED.fetch_add(1, Ordering::SeqCst);
    obj.super_destroy(TRACKED.get());
}

fn tracked() -> &'static Class {
    static READY: OnceCell<()> = OnceCell::new();
    READY.get_or_init(|| {
        runtime::init_with(&RuntimeConfig::default());
        bootstrap(
            &[ClassSpec {
                klass: &TRACKED,
                parent: Some(&OBJ),
                name: "Lifecycle::Tracked",
                ivars_size: 0,
                ivars_offset: None,
                num_novel_meths: 0,
                num_overridden_meths: 1,
                num_inherited_meths: 0,
                flags: ClassFlags::empty(),
            }],
            &[],
            &[OverriddenMethSpec::new(
                &TRACKED_DESTROY,
                &OBJ_DESTROY,
                tracked_destroy as DestroyFn,
            )],
            &[],
        );
    });
    TRACKED.get()
}

#[test]
fn shared_objects_die_exactly_once() {
    let klass = tracked();
    let objects: Vec<Obj> = (0..500).map(|_| klass.make_obj()).collect();

    // Every worker takes and drops its own references
    objects.par_iter().for_each(|obj| {
        let copies: Vec<Obj> = (0..8).map(|_| obj.clone()).collect();
        assert!(obj.get_count() >= 9);
        drop(copies);
    });
    assert!(objects.iter().all(|obj| obj.get_count() == 1));
    assert_eq!(DESTROYED.load(Ordering::SeqCst), 0);

    // Last references released from many threads
    objects.into_par_iter().for_each(drop);
    assert_eq!(DESTROYED.load(Ordering::SeqCst), 500);
}

#[test]
fn handles_cross_threads() {
    classes::bootstrap_core();
    let n = integer::new(1234);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let copy = n.clone();
            std::thread::spawn(move || integer::value(&copy))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), Some(1234));
    }
    assert_eq!(n.get_count(), 1);
}

#[test]
fn immortals_survive_contention() {
    classes::bootstrap_core();
    let truth = boolean::singleton(true);
    let before = truth.get_count();

    (0..10_000).into_par_iter().for_each(|i| {
        let flag = boolean::singleton(i % 2 == 0);
        let again = flag.clone();
        assert!(again.release() >= 1);
    });

    assert_eq!(truth.get_count(), before);
    assert_eq!(boolean::value(&truth), Some(true));
}

#[test]
fn sum_over_shared_integers() {
    classes::bootstrap_core();
    let numbers: Vec<Obj> = (1..=100).map(integer::new).collect();
    let total: i64 = numbers
        .par_iter()
        .map(|obj| integer::value(&obj.clone()).unwrap_or(0))
        .sum();
    assert_eq!(total, 5050);
    assert!(numbers.iter().all(|obj| obj.get_count() == 1));
}
