//! Object header - the prefix shared by every runtime object
//!
//! Design: `repr(C)` so the header sits at offset 0 of plain objects,
//! class descriptors and method descriptors alike.

use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::class::{Class, VtableSlot};

/// Object header - class pointer plus atomic refcount
#[repr(C, align(8))]
pub struct ObjHeader {
    klass: *const Class,
    pub(crate) refcount: AtomicU32,
}

// The class pointer targets an immortal descriptor
unsafe impl Send for ObjHeader {}
unsafe impl Sync for ObjHeader {}

impl ObjHeader {
    /// Header for a fresh object owned by one reference
    #[inline]
    pub fn new(klass: &'static Class) -> Self {
        Self::with_class_ptr(klass)
    }

    #[inline]
    pub(crate) fn with_class_ptr(klass: *const Class) -> Self {
        Self {
            klass,
            refcount: AtomicU32::new(1),
        }
    }

    /// Header whose class is not known yet
    #[inline]
    pub(crate) fn unbound() -> Self {
        Self::with_class_ptr(unbound_class())
    }

    #[inline]
    pub(crate) fn class_ptr(&self) -> *const Class {
        self.klass
    }

    #[inline]
    pub(crate) fn set_class_ptr(&mut self, klass: *const Class) {
        self.klass = klass;
    }

    /// Class of the object (caller guarantees the header is bound)
    #[inline]
    pub fn class(&self) -> &'static Class {
        debug_assert!(!self.klass.is_null(), "object header without class");
        // SAFETY: bound headers point at leaked class descriptors
        unsafe { &*self.klass }
    }

    #[inline]
    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Relaxed)
    }
}

/// Null class pointer with empty vtable metadata
#[inline]
pub(crate) fn unbound_class() -> *const Class {
    ptr::slice_from_raw_parts(ptr::null::<VtableSlot>(), 0) as *const Class
}
