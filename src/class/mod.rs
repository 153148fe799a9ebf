//! Class descriptors - metadata and embedded vtables
//!
//! Design: `Class` is a dynamically sized `repr(C)` struct. Its head
//! holds the metadata and its tail is the vtable itself. Method dispatch
//! indexes the tail by a per-method byte offset fixed at bootstrap.
//!
//! Descriptors live for the whole process. Once published they are only
//! reachable through `&'static Class`.

pub mod bootstrap;
pub mod host;
pub mod layout;
mod method;
mod singleton;


pub use bootstrap::{
    bootstrap, set_bootstrap_hook, ClassSlot, ClassSpec, InheritedMethSpec, IvarsOffset,
    NovelMethSpec, OverriddenMethSpec, Parcel,
};
pub use host::{host_bindings, set_host_bindings, HostBindings, HostTable, NoHost};
pub use method::{
    CompareToFn, DestroyFn, EqualsFn, Method, MethodOffset, MethodRef, MethodSignature,
    RawMethod, ToStringFn,
};

use std::fmt;
use std::mem;
use std::ops::BitOr;
use std::ptr;

use once_cell::sync::OnceCell;

use crate::errors::{fatal, ErrorKind};
use crate::object::{Obj, ObjHeader};
use crate::registry;

/// One vtable entry; empty until a method is installed
pub type VtableSlot = Option<RawMethod>;

/// Class flag bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ClassFlags(u32);

impl ClassFlags {
    /// Instances are immortal; refcounting is a no-op
    pub const REFCOUNT_SPECIAL: Self = Self(1 << 0);
    /// The class may not be subclassed
    pub const FINAL: Self = Self(1 << 1);

    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for ClassFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Class descriptor layout, generic over the vtable storage
#[repr(C)]
pub struct ClassRepr<V: ?Sized> {
    pub(crate) header: ObjHeader,
    pub(crate) parent: Option<&'static Class>,
    pub(crate) parcel_id: i32,
    pub(crate) flags: ClassFlags,
    pub(crate) obj_alloc_size: u32,
    pub(crate) class_alloc_size: u32,
    pub(crate) name: OnceCell<Box<str>>,
    pub(crate) methods: OnceCell<Box<[Method]>>,
    pub(crate) vtable: V,
}

/// A class descriptor with its vtable
pub type Class = ClassRepr<[VtableSlot]>;

/// The fixed head of a descriptor (no slots)
pub(crate) type ClassHead = ClassRepr<[VtableSlot; 0]>;

/// Byte offset of the first vtable slot
pub const VTABLE_OFFSET: u32 = mem::size_of::<ClassHead>() as u32;

/// Bytes per vtable slot
pub const SLOT_SIZE: u32 = mem::size_of::<VtableSlot>() as u32;

impl Class {
    #[inline]
    pub fn name(&self) -> &str {
        self.name.get().map_or("", |name| &**name)
    }

    #[inline]
    pub fn parent(&self) -> Option<&'static Class> {
        self.parent
    }

    #[inline]
    pub fn parcel_id(&self) -> i32 {
        self.parcel_id
    }

    #[inline]
    pub fn flags(&self) -> ClassFlags {
        self.flags
    }

    #[inline]
    pub fn is_final(&self) -> bool {
        self.flags.contains(ClassFlags::FINAL)
    }

    #[inline]
    pub fn obj_alloc_size(&self) -> u32 {
        self.obj_alloc_size
    }

    #[inline]
    pub fn class_alloc_size(&self) -> u32 {
        self.class_alloc_size
    }

    #[inline]
    pub fn vtable(&self) -> &[VtableSlot] {
        &self.vtable
    }

    /// Descriptors of the methods this class introduced
    #[inline]
    pub fn methods(&self) -> &[Method] {
        self.methods.get().map_or(&[][..], |methods| &**methods)
    }

    /// This class followed by its ancestors, nearest first
    pub fn ancestors(&'static self) -> impl Iterator<Item = &'static Class> {
        std::iter::successors(Some(self), |klass| klass.parent)
    }

    /// Whether `self` is `other` or inherits from it
    pub fn is_subclass_of(&self, other: &Class) -> bool {
        let mut current: Option<&Class> = Some(self);
        while let Some(klass) = current {
            if klass == other {
                return true;
            }
            current = klass.parent;
        }
        false
    }

    #[inline]
    fn slot_index(&self, offset: u32) -> usize {
        let index = offset
            .checked_sub(VTABLE_OFFSET)
            .filter(|rel| rel % SLOT_SIZE == 0)
            .map(|rel| (rel / SLOT_SIZE) as usize)
            .filter(|&index| index < self.vtable.len());

        match index {
            Some(index) => index,
            None => fatal(ErrorKind::SlotOutOfRange {
                class: self.name().to_string(),
                offset,
            }),
        }
    }

    /// Raw slot contents at a byte offset
    #[inline]
    pub fn slot(&self, offset: u32) -> VtableSlot {
        self.vtable[self.slot_index(offset)]
    }

    /// Resolve a method for dispatch
    #[inline]
    pub fn method<F: MethodSignature>(&self, method: &MethodRef<F>) -> F {
        match self.slot(method.offset()) {
            // SAFETY: the slot at a MethodRef<F>'s offset only ever holds an F
            Some(raw) => unsafe { raw.cast::<F>() },
            None => fatal(ErrorKind::AbstractMethod {
                class: self.name().to_string(),
                method: method.name().to_string(),
            }),
        }
    }

    /// Install a raw function pointer at a byte offset
    pub(crate) fn override_raw(&mut self, func: RawMethod, offset: u32) {
        let index = self.slot_index(offset);
        self.vtable[index] = Some(func);
    }

    /// Install a method implementation
    pub fn override_method<F: MethodSignature>(&mut self, method: &MethodRef<F>, func: F) {
        self.override_raw(RawMethod::erase(func), method.offset());
    }

    /// Allocate a new instance holding one reference
    pub fn make_obj(&'static self) -> Obj {
        let raw = layout::allocate_object(self);
        // SAFETY: the fresh object carries exactly the reference we adopt
        unsafe { Obj::from_raw(raw) }
    }

    /// The descriptor viewed as an (immortal) object
    pub fn as_obj(&'static self) -> Obj {
        if self.header.class_ptr().is_null() {
            fatal(ErrorKind::ClassNotBootstrapped);
        }
        let header = ptr::NonNull::from(&self.header);
        // SAFETY: CLASS instances are refcount-special; the handle never frees
        unsafe { Obj::from_raw(crate::object::RawObj::from_header(header)) }
    }

    /// Recover the descriptor behind a CLASS instance
    ///
    /// # Safety
    /// `obj` must be an instance of the Class class.
    pub(crate) unsafe fn from_obj(obj: &Obj) -> &'static Class {
        let base = obj.as_raw().as_ptr();
        let head = &*(base as *const ClassHead);
        let slots = layout::num_slots(head.class_alloc_size);
        &*(ptr::slice_from_raw_parts(base as *const VtableSlot, slots) as *const Class)
    }

    /// Find a novel method by name in this class or its ancestors
    pub fn find_method(&'static self, name: &str) -> Option<&'static Method> {
        self.ancestors()
            .flat_map(|klass| klass.methods().iter())
            .find(|method| method.name() == name)
    }

    /// A method this class itself introduces; a miss is fatal
    fn novel_method(&'static self, meth_name: &str) -> &'static Method {
        match self.methods().iter().find(|method| method.name() == meth_name) {
            Some(method) => method,
            None => fatal(ErrorKind::MethodNotFound {
                class: self.name().to_string(),
                method: meth_name.to_string(),
            }),
        }
    }

    /// Give one of this class's novel methods a different host-side name
    pub fn add_host_method_alias(&'static self, alias: &str, meth_name: &str) {
        let method = self.novel_method(meth_name);
        if !method.set_host_alias(alias) {
            crate::logging::warn!(
                target: "class",
                class = self.name(),
                method = meth_name,
                "host alias already set"
            );
        }
    }

    /// Keep one of this class's novel methods from ever being overridden
    /// by host subclasses
    pub fn exclude_host_method(&'static self, meth_name: &str) {
        self.novel_method(meth_name).exclude();
    }

    /// Look up a registered class by name
    pub fn fetch_class(name: &str) -> Option<&'static Class> {
        registry::fetch_class(name)
    }

    /// Register under the class's own name; false if the name is taken
    pub fn add_to_registry(&'static self) -> bool {
        registry::add_to_registry(self)
    }

    /// Register under an additional name; false if the name is taken
    pub fn add_alias_to_registry(&'static self, alias: &str) -> bool {
        registry::add_alias_to_registry(self, alias)
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self as *const Class as *const u8, other as *const Class as *const u8)
    }
}

impl Eq for Class {}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name())
            .field("parent", &self.parent.map(Class::name))
            .field("parcel_id", &self.parcel_id)
            .field("obj_alloc_size", &self.obj_alloc_size)
            .field("class_alloc_size", &self.class_alloc_size)
            .field("slots", &self.vtable.len())
            .finish()
    }
}
