//! Boolean - two immortal instances, `true` and `false`

use std::ptr::addr_of_mut;

use once_cell::sync::OnceCell;

use crate::classes::{BOOLEAN, BOOLEAN_IVARS_OFFSET};
use crate::object::{Obj, ObjHeader, RawObj};

#[repr(C)]
pub struct BooleanIvars {
    pub header: ObjHeader,
    pub value: bool,
}

static SINGLETONS: OnceCell<[RawObj; 2]> = OnceCell::new();

pub(super) fn init_singletons() {
    SINGLETONS.get_or_init(|| [make(false), make(true)]);
}

fn make(value: bool) -> RawObj {
    let obj = BOOLEAN.get().make_obj();
    // SAFETY: fresh Boolean instance, not yet shared
    unsafe {
        let ivars = obj.as_raw().ivars_ptr::<BooleanIvars>(&BOOLEAN_IVARS_OFFSET);
        addr_of_mut!((*ivars).value).write(value);
    }
    obj.into_raw()
}

/// The shared instance for `value`
pub fn singleton(value: bool) -> Obj {
    let singletons = SINGLETONS.get_or_init(|| [make(false), make(true)]);
    // SAFETY: Boolean is refcount-special; handles never release the instance
    unsafe { Obj::from_raw(singletons[usize::from(value)]) }
}

/// The value of a Boolean, or `None` for any other object
pub fn value(obj: &Obj) -> Option<bool> {
    if !obj.is_a(BOOLEAN.get()) {
        return None;
    }
    // SAFETY: checked class above
    Some(unsafe { obj.ivars::<BooleanIvars>(&BOOLEAN_IVARS_OFFSET) }.value)
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
