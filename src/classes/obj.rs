//! Default method implementations of Obj, Class and Method

use std::cmp::Ordering;

use crate::class::layout;
use crate::errors::{fatal, ErrorKind};
use crate::object::{Obj, RawObj};

pub(super) fn obj_destroy(obj: RawObj) {
    // SAFETY: Destroy runs once, after the last reference is gone
    unsafe { layout::free_object(obj) }
}

pub(super) fn obj_to_string(obj: &Obj) -> String {
    format!("{}@{:p}", obj.class().name(), obj.as_raw().as_ptr())
}

pub(super) fn obj_equals(obj: &Obj, other: &Obj) -> bool {
    Obj::ptr_eq(obj, other)
}

pub(super) fn obj_compare_to(obj: &Obj, _other: &Obj) -> Ordering {
    fatal(ErrorKind::AbstractMethod {
        class: obj.class().name().to_string(),
        method: "Compare_To".to_string(),
    })
}

/// Destroy for classes whose instances must never die
pub(super) fn immortal_destroy(obj: RawObj) {
    fatal(ErrorKind::DestroyImmortal {
        class: obj.class().name().to_string(),
    })
}

/// A class object's string form is the name of the class it describes
pub(super) fn class_to_string(obj: &Obj) -> String {
    // SAFETY: instances of CLASS are class descriptors, headed by ObjHeader
    let described = unsafe { crate::class::Class::from_obj(obj) };
    described.name().to_string()
}

pub(super) fn method_to_string(obj: &Obj) -> String {
    // SAFETY: instances of METHOD are Method descriptors, headed by ObjHeader
    let method = unsafe { crate::class::Method::from_obj(obj) };
    method.name().to_string()
}
