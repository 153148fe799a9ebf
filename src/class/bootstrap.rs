//! Parcel bootstrap - building class descriptors from static specs
//!
//! Design: Three passes over a parcel's class specs.
//! 1. Allocate each descriptor, sized from its parent, and publish the
//!    raw block so later specs can find their parents.
//! 2. Fill in metadata and vtables, parents strictly before children.
//!    A vtable starts as a copy of the parent's, then gets inherited,
//!    overridden and novel methods in that order.
//! 3. Name the classes, attach method descriptors and register them.
//!
//! Bootstrap is single-threaded per parcel. Readers may only reach a
//! descriptor after its parcel finished bootstrapping.

use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU8, Ordering};

use once_cell::sync::OnceCell;

use crate::class::layout::ClassBlock;
use crate::class::method::{Method, MethodOffset, MethodRef, MethodSignature, RawMethod};
use crate::class::{Class, ClassFlags, SLOT_SIZE, VTABLE_OFFSET};
use crate::classes::{BOOLEAN, CLASS, METHOD};
use crate::errors::{fatal, ErrorKind};
use crate::logging::{log_class_registered, log_parcel_bootstrap, warn};
use crate::object::unbound_class;

/// Parcel ids handed out so far
static PARCEL_COUNT: AtomicI32 = AtomicI32::new(0);

/// Optional per-class hook run during pass 2
static BOOTSTRAP_HOOK: OnceCell<fn(&mut Class)> = OnceCell::new();

/// Install a hook called on every descriptor before its vtable is filled.
/// Returns false if a hook was already installed.
pub fn set_bootstrap_hook(hook: fn(&mut Class)) -> bool {
    BOOTSTRAP_HOOK.set(hook).is_ok()
}

fn claim_parcel_id() -> i32 {
    let mut current = PARCEL_COUNT.load(Ordering::Relaxed);
    loop {
        match PARCEL_COUNT.compare_exchange_weak(
            current,
            current + 1,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return current + 1,
            Err(actual) => current = actual,
        }
    }
}

#[derive(Clone, Copy)]
struct ClassPtr(NonNull<Class>);

// Descriptors are immutable once their parcel is bootstrapped
unsafe impl Send for ClassPtr {}
unsafe impl Sync for ClassPtr {}

/// Global handle to one class descriptor, filled in by bootstrap
pub struct ClassSlot {
    ptr: OnceCell<ClassPtr>,
}

impl ClassSlot {
    pub const fn new() -> Self {
        Self {
            ptr: OnceCell::new(),
        }
    }

    /// The class, or a fatal error before its parcel is bootstrapped
    #[inline]
    pub fn get(&self) -> &'static Class {
        match self.try_get() {
            Some(klass) => klass,
            None => fatal(ErrorKind::ClassNotBootstrapped),
        }
    }

    #[inline]
    pub fn try_get(&self) -> Option<&'static Class> {
        // SAFETY: published blocks are never freed
        self.ptr.get().map(|klass| unsafe { &*klass.0.as_ptr() })
    }

    #[inline]
    pub fn is_bootstrapped(&self) -> bool {
        self.ptr.get().is_some()
    }

    fn raw(&self) -> *const Class {
        self.ptr
            .get()
            .map_or(unbound_class(), |klass| klass.0.as_ptr() as *const Class)
    }

    fn publish(&self, block: ClassBlock, name: &str) {
        let klass = ClassPtr(block.into_raw());
        if self.ptr.set(klass).is_err() {
            // SAFETY: the rejected block was never visible to anyone
            drop(unsafe { ClassBlock::from_raw(klass.0) });
            fatal(ErrorKind::DoubleBootstrap {
                class: name.to_string(),
            });
        }
    }

    /// Exclusive access during pass 2
    ///
    /// # Safety
    /// Only the bootstrap that published this slot may call this, and no
    /// reference obtained through `get` may be live.
    unsafe fn get_mut(&self) -> &mut Class {
        match self.ptr.get() {
            Some(klass) => &mut *klass.0.as_ptr(),
            None => fatal(ErrorKind::ClassNotBootstrapped),
        }
    }
}

impl Default for ClassSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte offset of a class's parcel-local instance variables
#[derive(Debug)]
pub struct IvarsOffset(AtomicU32);

impl IvarsOffset {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, offset: u32) {
        self.0.store(offset, Ordering::Release);
    }
}

impl Default for IvarsOffset {
    fn default() -> Self {
        Self::new()
    }
}

/// Static description of one class
pub struct ClassSpec {
    pub klass: &'static ClassSlot,
    pub parent: Option<&'static ClassSlot>,
    pub name: &'static str,
    /// Size of the parcel-local ivars struct
    pub ivars_size: u32,
    pub ivars_offset: Option<&'static IvarsOffset>,
    pub num_novel_meths: usize,
    pub num_overridden_meths: usize,
    pub num_inherited_meths: usize,
    /// Only `FINAL` is honored; refcount specialness is decided by bootstrap
    pub flags: ClassFlags,
}

/// A method introduced by a class
pub struct NovelMethSpec {
    offset: &'static MethodOffset,
    name: &'static str,
    func: RawMethod,
    callback: Option<RawMethod>,
}

impl NovelMethSpec {
    pub fn new<F: MethodSignature>(method: &'static MethodRef<F>, func: F) -> Self {
        Self {
            offset: method.offset_cell(),
            name: method.name(),
            func: RawMethod::erase(func),
            callback: None,
        }
    }

    /// A method the host may override through `callback`
    pub fn with_callback<F: MethodSignature>(
        method: &'static MethodRef<F>,
        func: F,
        callback: F,
    ) -> Self {
        Self {
            callback: Some(RawMethod::erase(callback)),
            ..Self::new(method, func)
        }
    }
}

/// A parent method replaced by a class
pub struct OverriddenMethSpec {
    offset: &'static MethodOffset,
    parent_offset: &'static MethodOffset,
    func: RawMethod,
}

impl OverriddenMethSpec {
    pub fn new<F: MethodSignature>(
        method: &'static MethodRef<F>,
        parent: &'static MethodRef<F>,
        func: F,
    ) -> Self {
        Self {
            offset: method.offset_cell(),
            parent_offset: parent.offset_cell(),
            func: RawMethod::erase(func),
        }
    }
}

/// A parent method kept as is; only its offset is propagated
pub struct InheritedMethSpec {
    offset: &'static MethodOffset,
    parent_offset: &'static MethodOffset,
}

impl InheritedMethSpec {
    pub fn new<F: MethodSignature>(
        method: &'static MethodRef<F>,
        parent: &'static MethodRef<F>,
    ) -> Self {
        Self {
            offset: method.offset_cell(),
            parent_offset: parent.offset_cell(),
        }
    }
}

/// Build and register every class of one parcel
///
/// Specs must list parents before children. Returns the parcel id.
pub fn bootstrap(
    specs: &[ClassSpec],
    novel_specs: &[NovelMethSpec],
    overridden_specs: &[OverriddenMethSpec],
    inherited_specs: &[InheritedMethSpec],
) -> i32 {
    let parcel_id = claim_parcel_id();

    // Pass 1: allocate and publish
    for spec in specs {
        let novel_offset = spec
            .parent
            .map_or(VTABLE_OFFSET, |parent| parent.get().class_alloc_size());
        let class_alloc_size = novel_offset + spec.num_novel_meths as u32 * SLOT_SIZE;
        spec.klass
            .publish(ClassBlock::allocate(class_alloc_size), spec.name);
    }

    // Pass 2: metadata and vtables
    let metaclass = CLASS.raw();
    let mut novel_iter = novel_specs.iter();
    let mut overridden_iter = overridden_specs.iter();
    let mut inherited_iter = inherited_specs.iter();

    for spec in specs {
        let parent = spec.parent.map(ClassSlot::get);
        let ivars_offset = parcel_ivars_offset(parent, parcel_id);
        if let Some(offset) = spec.ivars_offset {
            offset.set(ivars_offset);
        }

        // SAFETY: published by pass 1 of this call; nothing else holds it yet
        let klass = unsafe { spec.klass.get_mut() };
        let mut novel_offset = parent.map_or(VTABLE_OFFSET, Class::class_alloc_size);

        klass.header.set_class_ptr(metaclass);
        klass.parent = parent;
        klass.parcel_id = parcel_id;
        klass.class_alloc_size = novel_offset + spec.num_novel_meths as u32 * SLOT_SIZE;
        klass.obj_alloc_size = if ptr::eq(spec.klass, &CLASS) {
            VTABLE_OFFSET
        } else {
            ivars_offset + spec.ivars_size
        };

        if let Some(hook) = BOOTSTRAP_HOOK.get() {
            hook(klass);
        }

        klass.flags = ClassFlags::empty();
        if is_refcount_special(spec.klass) {
            klass.flags.insert(ClassFlags::REFCOUNT_SPECIAL);
        }
        if spec.flags.contains(ClassFlags::FINAL) {
            klass.flags.insert(ClassFlags::FINAL);
        }

        if let Some(parent) = parent {
            let inherited = parent.vtable().len();
            klass.vtable[..inherited].copy_from_slice(parent.vtable());
        }

        for meth in inherited_iter.by_ref().take(spec.num_inherited_meths) {
            meth.offset.set(meth.parent_offset.get());
        }

        for meth in overridden_iter.by_ref().take(spec.num_overridden_meths) {
            let offset = meth.parent_offset.get();
            meth.offset.set(offset);
            klass.override_raw(meth.func, offset);
        }

        for meth in novel_iter.by_ref().take(spec.num_novel_meths) {
            meth.offset.set(novel_offset);
            klass.override_raw(meth.func, novel_offset);
            novel_offset += SLOT_SIZE;
        }
    }

    // Pass 3: names, method descriptors, registration
    let method_class = METHOD.raw();
    let mut novel_iter = novel_specs.iter();

    for spec in specs {
        let klass = spec.klass.get();
        if klass.name.set(spec.name.into()).is_err() {
            fatal(ErrorKind::DoubleBootstrap {
                class: spec.name.to_string(),
            });
        }

        let methods: Box<[Method]> = novel_iter
            .by_ref()
            .take(spec.num_novel_meths)
            .map(|meth| Method::new(method_class, meth.name, meth.callback, meth.offset.get()))
            .collect();
        if klass.methods.set(methods).is_err() {
            fatal(ErrorKind::DoubleBootstrap {
                class: spec.name.to_string(),
            });
        }

        if !klass.add_to_registry() {
            warn!(target: "registry", class = spec.name, "class name already registered");
        }
        log_class_registered(spec.name, parcel_id, klass.class_alloc_size());
    }

    log_parcel_bootstrap(parcel_id, specs.len());
    parcel_id
}

/// Offset where a class's parcel-local ivars begin: the object size of
/// the nearest ancestor from another parcel
fn parcel_ivars_offset(parent: Option<&'static Class>, parcel_id: i32) -> u32 {
    let mut ancestor = parent;
    while let Some(klass) = ancestor {
        if klass.parcel_id() != parcel_id {
            break;
        }
        ancestor = klass.parent();
    }
    ancestor.map_or(0, Class::obj_alloc_size)
}

fn is_refcount_special(slot: &'static ClassSlot) -> bool {
    [&CLASS, &METHOD, &BOOLEAN]
        .iter()
        .any(|special| ptr::eq(slot, *special))
}

const NOT_STARTED: u8 = 0;
const IN_PROGRESS: u8 = 1;
const DONE: u8 = 2;

/// A unit of classes bootstrapped together, after its prerequisites
pub struct Parcel {
    name: &'static str,
    prereqs: &'static [&'static Parcel],
    init: fn(),
    state: AtomicU8,
}

impl Parcel {
    pub const fn new(name: &'static str, prereqs: &'static [&'static Parcel], init: fn()) -> Self {
        Self {
            name,
            prereqs,
            init,
            state: AtomicU8::new(NOT_STARTED),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn is_bootstrapped(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }

    /// Bootstrap prerequisites, then this parcel; later calls are no-ops
    ///
    /// Re-entering a parcel that is still bootstrapping is fatal.
    pub fn bootstrap(&self) {
        match self
            .state
            .compare_exchange(NOT_STARTED, IN_PROGRESS, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(DONE) => return,
            Err(_) => fatal(ErrorKind::BootstrapCycle {
                parcel: self.name.to_string(),
            }),
        }

        for prereq in self.prereqs {
            prereq.bootstrap();
        }
        (self.init)();

        self.state.store(DONE, Ordering::Release);
    }
}

impl std::fmt::Debug for Parcel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parcel")
            .field("name", &self.name)
            .field("bootstrapped", &self.is_bootstrapped())
            .finish()
    }
}
