//! Integer - a boxed, immutable 64-bit signed value

use std::cmp::Ordering;
use std::ptr::addr_of_mut;

use crate::classes::{INTEGER, INTEGER_IVARS_OFFSET};
use crate::errors::{fatal, ErrorKind};
use crate::object::{Obj, ObjHeader};

#[repr(C)]
pub struct IntegerIvars {
    pub header: ObjHeader,
    pub value: i64,
}

/// New Integer holding one reference
pub fn new(value: i64) -> Obj {
    let obj = INTEGER.get().make_obj();
    // SAFETY: fresh Integer instance, not yet shared
    unsafe {
        let ivars = obj.as_raw().ivars_ptr::<IntegerIvars>(&INTEGER_IVARS_OFFSET);
        addr_of_mut!((*ivars).value).write(value);
    }
    obj
}

/// The value of an Integer, or `None` for any other object
pub fn value(obj: &Obj) -> Option<i64> {
    if !obj.is_a(INTEGER.get()) {
        return None;
    }
    // SAFETY: checked class above
    Some(unsafe { obj.ivars::<IntegerIvars>(&INTEGER_IVARS_OFFSET) }.value)
}

pub(super) fn to_string(obj: &Obj) -> String {
    value(obj).unwrap_or_default().to_string()
}

pub(super) fn equals(obj: &Obj, other: &Obj) -> bool {
    match (value(obj), value(other)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

pub(super) fn compare_to(obj: &Obj, other: &Obj) -> Ordering {
    match (value(obj), value(other)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => fatal(ErrorKind::IncomparableObjects {
            left: obj.class().name().to_string(),
            right: other.class().name().to_string(),
        }),
    }
}
