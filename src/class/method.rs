//! Method descriptors and typed dispatch handles
//!
//! Design: Vtable slots hold type-erased function pointers (`RawMethod`).
//! Every slot position is named by a `MethodRef<F>` that fixes the
//! signature `F`, so a slot is only ever written and read as one type.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};

use once_cell::sync::OnceCell;

use crate::class::Class;
use crate::errors::{fatal, ErrorKind};
use crate::object::{Obj, ObjHeader, RawObj};

/// Type-erased method function pointer stored in a vtable slot
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawMethod(NonNull<()>);

// Function pointers are plain code addresses
unsafe impl Send for RawMethod {}
unsafe impl Sync for RawMethod {}

impl RawMethod {
    /// Erase a typed method function
    #[inline]
    pub fn erase<F: MethodSignature>(func: F) -> Self {
        debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<Self>());
        // SAFETY: MethodSignature is only implemented for function pointer
        // types, which are non-null and pointer sized.
        unsafe {
            let addr: *mut () = mem::transmute_copy(&func);
            Self(NonNull::new_unchecked(addr))
        }
    }

    /// Recover the typed function
    ///
    /// # Safety
    /// `self` must have been produced by `erase::<F>`.
    #[inline]
    pub(crate) unsafe fn cast<F: MethodSignature>(self) -> F {
        mem::transmute_copy(&self.0.as_ptr())
    }

    #[inline]
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl std::fmt::Debug for RawMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawMethod({:p})", self.0.as_ptr())
    }
}

/// Function pointer types that may live in a vtable slot
///
/// # Safety
/// Implementors must be function pointer types.
pub unsafe trait MethodSignature: Copy + Send + Sync + 'static {}

macro_rules! impl_method_signature {
    ($($arg:ty),*) => {
        unsafe impl<R: 'static> MethodSignature for fn(&Obj $(, $arg)*) -> R {}
    };
}

impl_method_signature!();
impl_method_signature!(&Obj);
impl_method_signature!(&str);
impl_method_signature!(bool);
impl_method_signature!(i64);
impl_method_signature!(u32);
impl_method_signature!(usize);
impl_method_signature!(&Obj, &Obj);
unsafe impl MethodSignature for fn(RawObj) {}

pub type DestroyFn = fn(RawObj);
pub type ToStringFn = fn(&Obj) -> String;
pub type EqualsFn = fn(&Obj, &Obj) -> bool;
pub type CompareToFn = fn(&Obj, &Obj) -> Ordering;

/// Byte offset of a method's slot, assigned during bootstrap
///
/// Offsets count from the start of the class descriptor, so the first
/// slot sits at `VTABLE_OFFSET`. Zero means "not yet assigned".
#[derive(Debug)]
pub struct MethodOffset(AtomicU32);

impl MethodOffset {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.0.load(AtomicOrdering::Acquire)
    }

    #[inline]
    pub(crate) fn set(&self, offset: u32) {
        self.0.store(offset, AtomicOrdering::Release);
    }

    #[inline]
    pub fn is_assigned(&self) -> bool {
        self.get() != 0
    }
}

impl Default for MethodOffset {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed name for one method slot
///
/// Declared with `declare_method!`, which pairs each handle with its own
/// offset cell.
pub struct MethodRef<F> {
    name: &'static str,
    offset: &'static MethodOffset,
    _sig: PhantomData<F>,
}

impl<F: MethodSignature> MethodRef<F> {
    /// # Safety
    /// `offset` must not be shared with a `MethodRef` of another signature.
    #[doc(hidden)]
    pub const unsafe fn new(name: &'static str, offset: &'static MethodOffset) -> Self {
        Self {
            name,
            offset,
            _sig: PhantomData,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset.get()
    }

    #[inline]
    pub(crate) fn offset_cell(&self) -> &'static MethodOffset {
        self.offset
    }
}

impl<F> std::fmt::Debug for MethodRef<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRef")
            .field("name", &self.name)
            .field("offset", &self.offset.get())
            .finish()
    }
}

/// Declare a typed method handle backed by a private offset cell
///
/// ```ignore
/// declare_method!(pub ANIMAL_SPEAK: fn(&Obj) -> String = "Speak");
/// ```
#[macro_export]
macro_rules! declare_method {
    ($vis:vis $name:ident : $sig:ty = $meth:literal) => {
        $vis static $name: $crate::class::MethodRef<$sig> = {
            static OFFSET: $crate::class::MethodOffset = $crate::class::MethodOffset::new();
            // SAFETY: OFFSET is private to this handle
            unsafe { $crate::class::MethodRef::new($meth, &OFFSET) }
        };
    };
}

/// Introspectable descriptor for a novel method
#[repr(C)]
pub struct Method {
    header: ObjHeader,
    name: Box<str>,
    callback: Option<RawMethod>,
    offset: u32,
    host_alias: OnceCell<String>,
    is_excluded: AtomicBool,
}

impl Method {
    pub(crate) fn new(
        metaclass: *const Class,
        name: &str,
        callback: Option<RawMethod>,
        offset: u32,
    ) -> Self {
        Self {
            header: ObjHeader::with_class_ptr(metaclass),
            name: name.into(),
            callback,
            offset,
            host_alias: OnceCell::new(),
            is_excluded: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host-dispatch trampoline installed when a host subclass overrides this method
    #[inline]
    pub fn callback(&self) -> Option<RawMethod> {
        self.callback
    }

    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn host_alias(&self) -> Option<&str> {
        self.host_alias.get().map(String::as_str)
    }

    /// Rename the method on the host side; may only happen once
    pub fn set_host_alias(&self, alias: &str) -> bool {
        self.host_alias.set(alias.to_string()).is_ok()
    }

    /// Name the host uses for this method: the alias, or the lowercased name
    pub fn host_name(&self) -> String {
        match self.host_alias() {
            Some(alias) => alias.to_string(),
            None => self.name.to_lowercase(),
        }
    }

    #[inline]
    pub fn is_excluded(&self) -> bool {
        self.is_excluded.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn exclude(&self) {
        self.is_excluded.store(true, AtomicOrdering::Release);
    }

    /// Recover the descriptor behind a METHOD instance
    ///
    /// # Safety
    /// `obj` must be an instance of the Method class.
    pub(crate) unsafe fn from_obj(obj: &Obj) -> &'static Method {
        &*(obj.as_raw().as_ptr() as *const Method)
    }

    /// View the descriptor as an (immortal) object
    pub fn as_obj(&'static self) -> Obj {
        if self.header.class_ptr().is_null() {
            fatal(ErrorKind::ClassNotBootstrapped);
        }
        // SAFETY: header is the first field of a repr(C) struct that lives forever
        unsafe { Obj::from_raw(RawObj::from_header(NonNull::from(&self.header))) }
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("offset", &self.offset)
            .field("host_alias", &self.host_alias())
            .field("is_excluded", &self.is_excluded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(_obj: &Obj) -> i64 {
        42
    }

    #[test]
    fn erase_round_trip_preserves_function() {
        let raw = RawMethod::erase(answer as fn(&Obj) -> i64);
        let back: fn(&Obj) -> i64 = unsafe { raw.cast() };
        assert_eq!(back as usize, answer as fn(&Obj) -> i64 as usize);
        assert_eq!(raw.addr(), answer as fn(&Obj) -> i64 as usize);
    }

    #[test]
    fn offsets_start_unassigned() {
        let offset = MethodOffset::new();
        assert!(!offset.is_assigned());
        offset.set(64);
        assert_eq!(offset.get(), 64);
    }

    #[test]
    fn host_name_prefers_alias() {
        let method = Method::new(crate::object::unbound_class(), "To_String", None, 48);
        assert_eq!(method.host_name(), "to_string");
        assert!(method.set_host_alias("stringify"));
        assert!(!method.set_host_alias("again"));
        assert_eq!(method.host_name(), "stringify");
    }

    #[test]
    fn exclusion_flag() {
        let method = Method::new(crate::object::unbound_class(), "Speak", None, 48);
        assert!(!method.is_excluded());
        method.exclude();
        assert!(method.is_excluded());
    }
}
