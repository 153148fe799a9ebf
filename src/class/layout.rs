//! Raw storage for class descriptors and objects
//!
//! Design: A class descriptor is one heap block. A fixed `repr(C)` head
//! is followed by `num_slots` vtable entries, so a slot's byte offset
//! from the block start is stable and shared by every subclass.
//! All raw allocation in the crate goes through this module.

use std::alloc::{self, Layout};
use std::mem;
use std::ptr::{self, addr_of_mut, NonNull};

use once_cell::sync::OnceCell;

use crate::class::{Class, ClassFlags, ClassHead, VtableSlot, SLOT_SIZE, VTABLE_OFFSET};
use crate::object::{ObjHeader, RawObj};

/// Number of vtable slots in a block of `class_alloc_size` bytes
#[inline]
pub fn num_slots(class_alloc_size: u32) -> usize {
    debug_assert!(class_alloc_size >= VTABLE_OFFSET);
    ((class_alloc_size - VTABLE_OFFSET) / SLOT_SIZE) as usize
}

fn class_layout(num_slots: usize) -> Layout {
    let size = VTABLE_OFFSET as usize + num_slots * SLOT_SIZE as usize;
    match Layout::from_size_align(size, mem::align_of::<ClassHead>()) {
        Ok(layout) => layout,
        Err(_) => alloc::handle_alloc_error(Layout::new::<ClassHead>()),
    }
}

fn object_layout(obj_alloc_size: u32) -> Layout {
    let size = (obj_alloc_size as usize).max(mem::size_of::<ObjHeader>());
    match Layout::from_size_align(size, mem::align_of::<ObjHeader>()) {
        Ok(layout) => layout.pad_to_align(),
        Err(_) => alloc::handle_alloc_error(Layout::new::<ObjHeader>()),
    }
}

/// Allocate a blank class descriptor with every slot empty
fn allocate_class(class_alloc_size: u32) -> NonNull<Class> {
    let slots = num_slots(class_alloc_size);
    let layout = class_layout(slots);

    // SAFETY: layout has non-zero size (the head is never empty)
    let block = unsafe { alloc::alloc_zeroed(layout) };
    if block.is_null() {
        alloc::handle_alloc_error(layout);
    }

    let klass = ptr::slice_from_raw_parts_mut(block.cast::<VtableSlot>(), slots) as *mut Class;

    // SAFETY: klass addresses a fresh block sized for this many slots
    unsafe {
        addr_of_mut!((*klass).header).write(ObjHeader::unbound());
        addr_of_mut!((*klass).parent).write(None);
        addr_of_mut!((*klass).parcel_id).write(0);
        addr_of_mut!((*klass).flags).write(ClassFlags::empty());
        addr_of_mut!((*klass).obj_alloc_size).write(0);
        addr_of_mut!((*klass).class_alloc_size).write(class_alloc_size);
        addr_of_mut!((*klass).name).write(OnceCell::new());
        addr_of_mut!((*klass).methods).write(OnceCell::new());

        let vtable = addr_of_mut!((*klass).vtable) as *mut VtableSlot;
        for i in 0..slots {
            vtable.add(i).write(None);
        }

        NonNull::new_unchecked(klass)
    }
}

/// Drop and free a class block
///
/// # Safety
/// `klass` must come from `allocate_class` and must not be reachable anywhere.
unsafe fn free_class(klass: NonNull<Class>) {
    let slots = klass.as_ref().vtable.len();
    ptr::drop_in_place(klass.as_ptr());
    alloc::dealloc(klass.as_ptr().cast(), class_layout(slots));
}

/// Exclusive owner of a class block under construction
pub(crate) struct ClassBlock(NonNull<Class>);

impl ClassBlock {
    pub(crate) fn allocate(class_alloc_size: u32) -> Self {
        Self(allocate_class(class_alloc_size))
    }

    /// Reclaim a block previously released with `into_raw`
    ///
    /// # Safety
    /// No reference to the block may be live.
    pub(crate) unsafe fn from_raw(klass: NonNull<Class>) -> Self {
        Self(klass)
    }

    pub(crate) fn as_mut(&mut self) -> &mut Class {
        // SAFETY: the block is exclusively owned
        unsafe { self.0.as_mut() }
    }

    /// Borrow the block as if already published
    ///
    /// # Safety
    /// The reference must not outlive the block; dropping an unpublished
    /// block frees it.
    pub(crate) unsafe fn as_static(&self) -> &'static Class {
        &*self.0.as_ptr()
    }

    /// Release ownership without freeing
    pub(crate) fn into_raw(self) -> NonNull<Class> {
        let klass = self.0;
        mem::forget(self);
        klass
    }

    /// Make the block permanent
    pub(crate) fn leak(self) -> &'static Class {
        // SAFETY: forgetting the owner keeps the block alive forever
        unsafe { &*self.into_raw().as_ptr() }
    }
}

impl Drop for ClassBlock {
    fn drop(&mut self) {
        // SAFETY: an owned block has never been published
        unsafe { free_class(self.0) }
    }
}

/// Allocate a zeroed object of `klass` holding one reference
pub(crate) fn allocate_object(klass: &'static Class) -> RawObj {
    let layout = object_layout(klass.obj_alloc_size());

    // SAFETY: object layouts are at least header sized
    let block = unsafe { alloc::alloc_zeroed(layout) };
    if block.is_null() {
        alloc::handle_alloc_error(layout);
    }

    let header = block.cast::<ObjHeader>();
    // SAFETY: block is fresh and aligned for the header
    unsafe {
        header.write(ObjHeader::new(klass));
        RawObj::from_header(NonNull::new_unchecked(header))
    }
}

/// Free an object's memory
///
/// # Safety
/// The object must be dead: no handles remain and its ivars were dropped.
pub(crate) unsafe fn free_object(obj: RawObj) {
    let layout = object_layout(obj.class().obj_alloc_size());
    alloc::dealloc(obj.as_ptr(), layout);
}
