//! Core parcel - the classes every other parcel builds on
//!
//! `Obj` is the root. `Class` and `Method` describe the object system
//! itself, and `Boolean` and `Integer` are the final value classes.
//! Instances of `Class`, `Method` and `Boolean` are immortal.

pub mod boolean;
pub mod integer;
mod obj;

#[cfg(test)]
mod tests;

use std::mem;

use once_cell::sync::OnceCell;

use crate::class::{
    bootstrap, ClassFlags, ClassSlot, ClassSpec, CompareToFn, DestroyFn, EqualsFn,
    InheritedMethSpec, IvarsOffset, Method, NovelMethSpec, OverriddenMethSpec, Parcel,
    ToStringFn,
};
use crate::declare_method;
use crate::object::ObjHeader;

pub use boolean::BooleanIvars;
pub use integer::IntegerIvars;

pub static OBJ: ClassSlot = ClassSlot::new();
pub static CLASS: ClassSlot = ClassSlot::new();
pub static METHOD: ClassSlot = ClassSlot::new();
pub static BOOLEAN: ClassSlot = ClassSlot::new();
pub static INTEGER: ClassSlot = ClassSlot::new();

pub static BOOLEAN_IVARS_OFFSET: IvarsOffset = IvarsOffset::new();
pub static INTEGER_IVARS_OFFSET: IvarsOffset = IvarsOffset::new();

// Obj (novel)
declare_method!(pub OBJ_DESTROY: DestroyFn = "Destroy");
declare_method!(pub OBJ_TO_STRING: ToStringFn = "To_String");
declare_method!(pub OBJ_EQUALS: EqualsFn = "Equals");
declare_method!(pub OBJ_COMPARE_TO: CompareToFn = "Compare_To");

// Class
declare_method!(pub CLASS_DESTROY: DestroyFn = "Destroy");
declare_method!(pub CLASS_TO_STRING: ToStringFn = "To_String");
declare_method!(pub CLASS_EQUALS: EqualsFn = "Equals");

// Method
declare_method!(pub METHOD_DESTROY: DestroyFn = "Destroy");
declare_method!(pub METHOD_TO_STRING: ToStringFn = "To_String");

// Boolean
declare_method!(pub BOOLEAN_DESTROY: DestroyFn = "Destroy");
declare_method!(pub BOOLEAN_TO_STRING: ToStringFn = "To_String");
declare_method!(pub BOOLEAN_EQUALS: EqualsFn = "Equals");
declare_method!(pub BOOLEAN_COMPARE_TO: CompareToFn = "Compare_To");

// Integer
declare_method!(pub INTEGER_DESTROY: DestroyFn = "Destroy");
declare_method!(pub INTEGER_TO_STRING: ToStringFn = "To_String");
declare_method!(pub INTEGER_EQUALS: EqualsFn = "Equals");
declare_method!(pub INTEGER_COMPARE_TO: CompareToFn = "Compare_To");

/// The core parcel; every other parcel lists it as a prerequisite
pub static CORE_PARCEL: Parcel = Parcel::new("Clownfish", &[], bootstrap_core_classes);

static CORE_BOOTSTRAPPED: OnceCell<()> = OnceCell::new();

/// Bootstrap the core parcel once, serializing concurrent callers
pub fn bootstrap_core() {
    CORE_BOOTSTRAPPED.get_or_init(|| CORE_PARCEL.bootstrap());
}

fn bootstrap_core_classes() {
    let header_size = mem::size_of::<ObjHeader>() as u32;

    let specs = [
        ClassSpec {
            klass: &OBJ,
            parent: None,
            name: "Clownfish::Obj",
            ivars_size: header_size,
            ivars_offset: None,
            num_novel_meths: 4,
            num_overridden_meths: 0,
            num_inherited_meths: 0,
            flags: ClassFlags::empty(),
        },
        ClassSpec {
            klass: &CLASS,
            parent: Some(&OBJ),
            name: "Clownfish::Class",
            ivars_size: 0,
            ivars_offset: None,
            num_novel_meths: 0,
            num_overridden_meths: 2,
            num_inherited_meths: 1,
            flags: ClassFlags::FINAL,
        },
        ClassSpec {
            klass: &METHOD,
            parent: Some(&OBJ),
            name: "Clownfish::Method",
            ivars_size: mem::size_of::<Method>() as u32,
            ivars_offset: None,
            num_novel_meths: 0,
            num_overridden_meths: 2,
            num_inherited_meths: 0,
            flags: ClassFlags::FINAL,
        },
        ClassSpec {
            klass: &BOOLEAN,
            parent: Some(&OBJ),
            name: "Clownfish::Boolean",
            ivars_size: mem::size_of::<BooleanIvars>() as u32,
            ivars_offset: Some(&BOOLEAN_IVARS_OFFSET),
            num_novel_meths: 0,
            num_overridden_meths: 3,
            num_inherited_meths: 1,
            flags: ClassFlags::FINAL,
        },
        ClassSpec {
            klass: &INTEGER,
            parent: Some(&OBJ),
            name: "Clownfish::Integer",
            ivars_size: mem::size_of::<IntegerIvars>() as u32,
            ivars_offset: Some(&INTEGER_IVARS_OFFSET),
            num_novel_meths: 0,
            num_overridden_meths: 3,
            num_inherited_meths: 1,
            flags: ClassFlags::FINAL,
        },
    ];

    let novel = [
        NovelMethSpec::new(&OBJ_DESTROY, obj::obj_destroy as DestroyFn),
        NovelMethSpec::new(&OBJ_TO_STRING, obj::obj_to_string as ToStringFn),
        NovelMethSpec::new(&OBJ_EQUALS, obj::obj_equals as EqualsFn),
        NovelMethSpec::new(&OBJ_COMPARE_TO, obj::obj_compare_to as CompareToFn),
    ];

    let overridden = [
        // Class
        OverriddenMethSpec::new(&CLASS_DESTROY, &OBJ_DESTROY, obj::immortal_destroy as DestroyFn),
        OverriddenMethSpec::new(&CLASS_TO_STRING, &OBJ_TO_STRING, obj::class_to_string as ToStringFn),
        // Method
        OverriddenMethSpec::new(&METHOD_DESTROY, &OBJ_DESTROY, obj::immortal_destroy as DestroyFn),
        OverriddenMethSpec::new(&METHOD_TO_STRING, &OBJ_TO_STRING, obj::method_to_string as ToStringFn),
        // Boolean
        OverriddenMethSpec::new(&BOOLEAN_DESTROY, &OBJ_DESTROY, obj::immortal_destroy as DestroyFn),
        OverriddenMethSpec::new(&BOOLEAN_TO_STRING, &OBJ_TO_STRING, boolean::to_string as ToStringFn),
        OverriddenMethSpec::new(&BOOLEAN_EQUALS, &OBJ_EQUALS, boolean::equals as EqualsFn),
        // Integer
        OverriddenMethSpec::new(&INTEGER_TO_STRING, &OBJ_TO_STRING, integer::to_string as ToStringFn),
        OverriddenMethSpec::new(&INTEGER_EQUALS, &OBJ_EQUALS, integer::equals as EqualsFn),
        OverriddenMethSpec::new(&INTEGER_COMPARE_TO, &OBJ_COMPARE_TO, integer::compare_to as CompareToFn),
    ];

    let inherited = [
        InheritedMethSpec::new(&CLASS_EQUALS, &OBJ_EQUALS),
        InheritedMethSpec::new(&BOOLEAN_COMPARE_TO, &OBJ_COMPARE_TO),
        InheritedMethSpec::new(&INTEGER_DESTROY, &OBJ_DESTROY),
    ];

    bootstrap(&specs, &novel, &overridden, &inherited);
    boolean::init_singletons();
}
