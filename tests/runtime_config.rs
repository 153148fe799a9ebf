use cfish_runtime::config::RuntimeConfig;
use cfish_runtime::{runtime, SortExternal};

#[test]
fn sort_engines_follow_runtime_config() {
    let config = RuntimeConfig::parse("[sort]\nmem_thresh = 64\n").unwrap();
    assert_eq!(runtime::init_with(&config).sort.mem_thresh, 64);

    let mut engine = SortExternal::new(|a: &u64, b: &u64| a.cmp(b));
    assert_eq!(engine.mem_thresh(), 64);
    for value in (0..20u64).rev() {
        engine.feed(value);
    }
    // 64 bytes hold 8 items before each spill
    assert_eq!(engine.num_runs(), 2);
    engine.flip();
    assert_eq!(std::iter::from_fn(|| engine.fetch()).collect::<Vec<_>>(), (0..20).collect::<Vec<_>>());

    // An explicit setting still wins
    let engine = SortExternal::new(|a: &u64, b: &u64| a.cmp(b)).with_config(&Default::default());
    assert_ne!(engine.mem_thresh(), 64);
}
