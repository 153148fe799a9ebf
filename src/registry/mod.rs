//! Class registry - lock-free, insert-once name lookup
//!
//! Design: Fixed-capacity open addressing over atomic entry pointers.
//! - Insert claims an empty slot with compare-and-swap; a key can only
//!   ever be bound once, so a lost race turns into "already present".
//! - Lookups probe without locking and never block.
//! - The table never grows; exhausting it is fatal.


use std::hash::{Hash, Hasher};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use rustc_hash::FxHasher;

use crate::class::Class;
use crate::errors::{fatal, ErrorKind};

/// Default slot count of the global class registry
pub const DEFAULT_CAPACITY: usize = 256;

struct Entry<V> {
    hash: u64,
    key: Box<str>,
    value: V,
}

/// Insert-once string-keyed table safe for concurrent use
pub struct LockFreeRegistry<V> {
    slots: Box<[AtomicPtr<Entry<V>>]>,
    mask: usize,
    len: AtomicUsize,
}

// Entries are immutable after publication and only freed on drop
unsafe impl<V: Send + Sync> Send for LockFreeRegistry<V> {}
unsafe impl<V: Send + Sync> Sync for LockFreeRegistry<V> {}

#[inline]
fn hash_key(key: &str) -> u64 {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

impl<V> LockFreeRegistry<V> {
    /// Table with at least `capacity` slots (rounded up to a power of two)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let slots = (0..capacity)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        Self {
            slots,
            mask: capacity - 1,
            len: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bind `key` to `value`; false if `key` was already bound
    pub fn register(&self, key: &str, value: V) -> bool {
        let hash = hash_key(key);
        let fresh = Box::into_raw(Box::new(Entry {
            hash,
            key: key.into(),
            value,
        }));

        let start = hash as usize & self.mask;
        for probe in 0..self.slots.len() {
            let slot = &self.slots[(start + probe) & self.mask];
            let mut current = slot.load(Ordering::Acquire);

            if current.is_null() {
                match slot.compare_exchange(
                    ptr::null_mut(),
                    fresh,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        self.len.fetch_add(1, Ordering::AcqRel);
                        return true;
                    }
                    Err(winner) => current = winner,
                }
            }

            // SAFETY: non-null slots hold entries that live as long as the table
            let entry = unsafe { &*current };
            if entry.hash == hash && &*entry.key == key {
                // SAFETY: our entry was never published
                drop(unsafe { Box::from_raw(fresh) });
                return false;
            }
        }

        // SAFETY: our entry was never published
        drop(unsafe { Box::from_raw(fresh) });
        fatal(ErrorKind::RegistryFull {
            capacity: self.capacity(),
        })
    }

    /// Look up `key`
    pub fn fetch(&self, key: &str) -> Option<&V> {
        let hash = hash_key(key);
        let start = hash as usize & self.mask;

        for probe in 0..self.slots.len() {
            let current = self.slots[(start + probe) & self.mask].load(Ordering::Acquire);
            if current.is_null() {
                return None;
            }
            // SAFETY: see `register`
            let entry = unsafe { &*current };
            if entry.hash == hash && &*entry.key == key {
                return Some(&entry.value);
            }
        }
        None
    }

    /// Snapshot of all keys, in slot order
    pub fn keys(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter_map(|slot| {
                let current = slot.load(Ordering::Acquire);
                // SAFETY: see `register`
                (!current.is_null()).then(|| unsafe { (*current).key.to_string() })
            })
            .collect()
    }
}

impl<V> Drop for LockFreeRegistry<V> {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            let entry = *slot.get_mut();
            if !entry.is_null() {
                // SAFETY: exclusive access; every entry came from Box::into_raw
                drop(unsafe { Box::from_raw(entry) });
            }
        }
    }
}

// ============================================================================
// Global class registry
// ============================================================================

type ClassRegistry = LockFreeRegistry<&'static Class>;

static CLASS_REGISTRY: AtomicPtr<ClassRegistry> = AtomicPtr::new(ptr::null_mut());

/// Create the global class registry if nobody has yet
///
/// Racing initializers each build a table; one wins the compare-and-swap
/// and the others free theirs. Returns the table in use.
pub fn init_registry(capacity: usize) -> &'static ClassRegistry {
    let current = CLASS_REGISTRY.load(Ordering::Acquire);
    if !current.is_null() {
        // SAFETY: the published table is never freed
        return unsafe { &*current };
    }

    let fresh = Box::into_raw(Box::new(ClassRegistry::new(capacity)));
    match CLASS_REGISTRY.compare_exchange(
        ptr::null_mut(),
        fresh,
        Ordering::AcqRel,
        Ordering::Acquire,
    ) {
        // SAFETY: we just published it and never free it
        Ok(_) => unsafe { &*fresh },
        Err(winner) => {
            // SAFETY: ours lost and was never visible
            drop(unsafe { Box::from_raw(fresh) });
            // SAFETY: the published table is never freed
            unsafe { &*winner }
        }
    }
}

/// The global class registry, created with the default capacity on first use
pub fn class_registry() -> &'static ClassRegistry {
    init_registry(DEFAULT_CAPACITY)
}

/// Look up a class by name; `None` also before the registry exists
pub fn fetch_class(name: &str) -> Option<&'static Class> {
    let current = CLASS_REGISTRY.load(Ordering::Acquire);
    if current.is_null() {
        return None;
    }
    // SAFETY: the published table is never freed
    unsafe { &*current }.fetch(name).copied()
}

/// Register `klass` under its own name
pub fn add_to_registry(klass: &'static Class) -> bool {
    let registry = class_registry();
    if registry.fetch(klass.name()).is_some() {
        return false;
    }
    registry.register(klass.name(), klass)
}

/// Register `klass` under `alias`
pub fn add_alias_to_registry(klass: &'static Class, alias: &str) -> bool {
    let registry = class_registry();
    if registry.fetch(alias).is_some() {
        return false;
    }
    registry.register(alias, klass)
}
