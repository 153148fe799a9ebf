//! Object handles and reference counting
//!
//! Design: `Obj` is an owning handle. Cloning retains, dropping releases,
//! and the last release dispatches the class's Destroy method. Objects
//! of refcount-special classes (classes, methods, booleans) are immortal:
//! retain and release leave them untouched.

mod header;


pub use header::ObjHeader;
pub(crate) use header::unbound_class;

use std::cmp::Ordering;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{fence, Ordering as AtomicOrdering};

use crate::class::{Class, ClassFlags, IvarsOffset};
use crate::classes::{OBJ_COMPARE_TO, OBJ_DESTROY, OBJ_EQUALS, OBJ_TO_STRING};
use crate::logging::log_object_destroyed;

/// Unowned pointer to a live object
///
/// Handed to Destroy implementations, which run after the last owner is gone.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawObj(NonNull<ObjHeader>);

unsafe impl Send for RawObj {}
unsafe impl Sync for RawObj {}

impl RawObj {
    #[inline]
    pub(crate) fn from_header(header: NonNull<ObjHeader>) -> Self {
        Self(header)
    }

    #[inline]
    pub fn header(&self) -> &ObjHeader {
        // SAFETY: RawObj only wraps pointers to live objects
        unsafe { self.0.as_ref() }
    }

    #[inline]
    pub fn class(&self) -> &'static Class {
        self.header().class()
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.0.as_ptr().cast()
    }

    #[inline]
    pub fn refcount(&self) -> u32 {
        self.header().refcount()
    }

    /// Pointer to the instance variables at `offset`
    ///
    /// # Safety
    /// `T` must describe the ivars layout registered for this object's
    /// class, and the offset must be assigned.
    #[inline]
    pub unsafe fn ivars_ptr<T>(&self, offset: &IvarsOffset) -> *mut T {
        self.as_ptr().add(offset.get() as usize).cast()
    }

    /// Run the parent's Destroy for an object of class `klass`
    ///
    /// Destroy implementations call this last to release inherited state
    /// and the object memory.
    pub fn super_destroy(self, klass: &'static Class) {
        if let Some(parent) = klass.parent() {
            let destroy = parent.method(&OBJ_DESTROY);
            destroy(self);
        }
    }
}

impl fmt::Debug for RawObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawObj({}@{:p})", self.class().name(), self.0.as_ptr())
    }
}

/// Owning handle to a reference-counted object
pub struct Obj {
    raw: RawObj,
}

impl Obj {
    /// Adopt one reference
    ///
    /// # Safety
    /// The caller transfers ownership of one counted reference.
    #[inline]
    pub unsafe fn from_raw(raw: RawObj) -> Self {
        Self { raw }
    }

    /// Give up the handle without releasing
    #[inline]
    pub fn into_raw(self) -> RawObj {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }

    #[inline]
    pub fn as_raw(&self) -> RawObj {
        self.raw
    }

    #[inline]
    pub fn class(&self) -> &'static Class {
        self.raw.class()
    }

    /// Take a new reference (increments the count)
    #[inline]
    pub fn retain(&self) -> Obj {
        inc_refcount(self.raw);
        Obj { raw: self.raw }
    }

    /// Drop this reference, returning the remaining count
    #[inline]
    pub fn release(self) -> u32 {
        dec_refcount(self.into_raw())
    }

    #[inline]
    pub fn get_count(&self) -> u32 {
        self.raw.refcount()
    }

    /// Whether the object's class is `klass` or descends from it
    pub fn is_a(&self, klass: &Class) -> bool {
        self.class().is_subclass_of(klass)
    }

    pub fn ptr_eq(a: &Obj, b: &Obj) -> bool {
        a.raw == b.raw
    }

    /// Shared view of the instance variables at `offset`
    ///
    /// # Safety
    /// See `RawObj::ivars_ptr`.
    #[inline]
    pub unsafe fn ivars<T>(&self, offset: &IvarsOffset) -> &T {
        &*self.raw.ivars_ptr::<T>(offset)
    }

    pub fn to_string_dyn(&self) -> String {
        let to_string = self.class().method(&OBJ_TO_STRING);
        to_string(self)
    }

    pub fn equals(&self, other: &Obj) -> bool {
        let equals = self.class().method(&OBJ_EQUALS);
        equals(self, other)
    }

    pub fn compare_to(&self, other: &Obj) -> Ordering {
        let compare_to = self.class().method(&OBJ_COMPARE_TO);
        compare_to(self, other)
    }
}

impl Clone for Obj {
    #[inline]
    fn clone(&self) -> Self {
        self.retain()
    }
}

impl Drop for Obj {
    #[inline]
    fn drop(&mut self) {
        dec_refcount(self.raw);
    }
}

impl fmt::Display for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_dyn())
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Obj")
            .field("class", &self.class().name())
            .field("refcount", &self.get_count())
            .finish()
    }
}

/// Null-tolerant retain
#[inline]
pub fn retain(obj: Option<&Obj>) -> Option<Obj> {
    obj.map(Obj::retain)
}

/// Null-tolerant release; returns the remaining count (0 for none)
#[inline]
pub fn release(obj: Option<Obj>) -> u32 {
    obj.map_or(0, Obj::release)
}

/// Null-tolerant refcount query
#[inline]
pub fn get_count(obj: Option<&Obj>) -> u32 {
    obj.map_or(0, Obj::get_count)
}

#[inline(always)]
fn is_immortal(raw: RawObj) -> bool {
    raw.class().flags().contains(ClassFlags::REFCOUNT_SPECIAL)
}

#[inline(always)]
pub(crate) fn inc_refcount(raw: RawObj) {
    if is_immortal(raw) {
        return;
    }
    let old = raw.header().refcount.fetch_add(1, AtomicOrdering::Relaxed);

    // Overflow detection in debug builds
    debug_assert!(old < u32::MAX, "refcount overflow");
}

#[inline(always)]
pub(crate) fn dec_refcount(raw: RawObj) -> u32 {
    if is_immortal(raw) {
        return raw.refcount();
    }
    let old = raw.header().refcount.fetch_sub(1, AtomicOrdering::Release);

    debug_assert!(old > 0, "refcount underflow");

    if old == 1 {
        // Synchronize with all previous decrements
        fence(AtomicOrdering::Acquire);
        destroy(raw);
        0
    } else {
        old - 1
    }
}

#[cold]
fn destroy(raw: RawObj) {
    let klass = raw.class();
    log_object_destroyed(klass.name(), raw.as_ptr());
    let destroy = klass.method(&OBJ_DESTROY);
    destroy(raw);
}
