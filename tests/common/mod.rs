//! Test parcels shared by the integration tests
//!
//! `Zoo` defines `Animal` and `Dog` on top of the core parcel. `Kennel`
//! defines the final `Puppy` on top of `Zoo`, so its ivars start past a
//! foreign parcel's instance variables.

#![allow(dead_code)]

use std::ptr::addr_of_mut;
use std::sync::atomic::{AtomicUsize, Ordering};

use cfish_runtime::class::{
    bootstrap, set_bootstrap_hook, ClassFlags, ClassSlot, ClassSpec, InheritedMethSpec,
    IvarsOffset, NovelMethSpec, OverriddenMethSpec, Parcel,
};
use cfish_runtime::classes::{self, OBJ};
use cfish_runtime::{declare_method, Class, Obj};
use once_cell::sync::OnceCell;

#[repr(C)]
pub struct AnimalIvars {
    pub legs: i64,
}

#[repr(C)]
pub struct DogIvars {
    pub legs: i64,
    pub good: bool,
}

#[repr(C)]
pub struct PuppyIvars {
    pub age: u32,
}

pub static ANIMAL: ClassSlot = ClassSlot::new();
pub static DOG: ClassSlot = ClassSlot::new();
pub static PUPPY: ClassSlot = ClassSlot::new();

pub static ANIMAL_IVARS: IvarsOffset = IvarsOffset::new();
pub static DOG_IVARS: IvarsOffset = IvarsOffset::new();
pub static PUPPY_IVARS: IvarsOffset = IvarsOffset::new();

declare_method!(pub ANIMAL_SPEAK: fn(&Obj) -> String = "Speak");
declare_method!(pub ANIMAL_LEGS: fn(&Obj) -> i64 = "Legs");
declare_method!(pub DOG_SPEAK: fn(&Obj) -> String = "Speak");
declare_method!(pub DOG_LEGS: fn(&Obj) -> i64 = "Legs");
declare_method!(pub DOG_FETCH: fn(&Obj, i64) -> i64 = "Fetch");
declare_method!(pub PUPPY_SPEAK: fn(&Obj) -> String = "Speak");
declare_method!(pub PUPPY_WAG: fn(&Obj) -> u32 = "Wag");

static ZOO_PREREQS: [&Parcel; 1] = [&classes::CORE_PARCEL];
static KENNEL_PREREQS: [&Parcel; 1] = [&ZOO];

pub static ZOO: Parcel = Parcel::new("Zoo", &ZOO_PREREQS, bootstrap_zoo);
pub static KENNEL: Parcel = Parcel::new("Kennel", &KENNEL_PREREQS, bootstrap_kennel);

/// Classes seen by the bootstrap hook
pub static HOOKED: AtomicUsize = AtomicUsize::new(0);

fn count_hook(_klass: &mut Class) {
    HOOKED.fetch_add(1, Ordering::SeqCst);
}

/// Bootstrap the core parcel and both test parcels once
pub fn setup() {
    static READY: OnceCell<()> = OnceCell::new();
    READY.get_or_init(|| {
        classes::bootstrap_core();
        let _ = set_bootstrap_hook(count_hook);
        KENNEL.bootstrap();
    });
}

fn animal_speak(_obj: &Obj) -> String {
    "...".to_string()
}

fn host_speak(obj: &Obj) -> String {
    format!("{} speaks through the host", obj.class().name())
}

fn animal_legs(obj: &Obj) -> i64 {
    // SAFETY: every Zoo object starts its ivars with AnimalIvars
    unsafe { obj.ivars::<AnimalIvars>(&ANIMAL_IVARS) }.legs
}

fn dog_speak(_obj: &Obj) -> String {
    "Woof".to_string()
}

fn dog_fetch(obj: &Obj, throws: i64) -> i64 {
    // SAFETY: Fetch is only reachable from Dog and its subclasses
    let ivars = unsafe { obj.ivars::<DogIvars>(&DOG_IVARS) };
    if ivars.good {
        throws
    } else {
        0
    }
}

fn puppy_wag(obj: &Obj) -> u32 {
    // SAFETY: Wag is only reachable from Puppy
    unsafe { obj.ivars::<PuppyIvars>(&PUPPY_IVARS) }.age
}

fn bootstrap_zoo() {
    bootstrap(
        &[
            ClassSpec {
                klass: &ANIMAL,
                parent: Some(&OBJ),
                name: "Zoo::Animal",
                ivars_size: std::mem::size_of::<AnimalIvars>() as u32,
                ivars_offset: Some(&ANIMAL_IVARS),
                num_novel_meths: 2,
                num_overridden_meths: 0,
                num_inherited_meths: 0,
                flags: ClassFlags::empty(),
            },
            ClassSpec {
                klass: &DOG,
                parent: Some(&ANIMAL),
                name: "Zoo::Dog",
                ivars_size: std::mem::size_of::<DogIvars>() as u32,
                ivars_offset: Some(&DOG_IVARS),
                num_novel_meths: 1,
                num_overridden_meths: 1,
                num_inherited_meths: 1,
                flags: ClassFlags::empty(),
            },
        ],
        &[
            NovelMethSpec::with_callback(
                &ANIMAL_SPEAK,
                animal_speak as fn(&Obj) -> String,
                host_speak as fn(&Obj) -> String,
            ),
            NovelMethSpec::new(&ANIMAL_LEGS, animal_legs as fn(&Obj) -> i64),
            NovelMethSpec::new(&DOG_FETCH, dog_fetch as fn(&Obj, i64) -> i64),
        ],
        &[OverriddenMethSpec::new(
            &DOG_SPEAK,
            &ANIMAL_SPEAK,
            dog_speak as fn(&Obj) -> String,
        )],
        &[InheritedMethSpec::new(&DOG_LEGS, &ANIMAL_LEGS)],
    );
}

fn bootstrap_kennel() {
    bootstrap(
        &[ClassSpec {
            klass: &PUPPY,
            parent: Some(&DOG),
            name: "Kennel::Puppy",
            ivars_size: std::mem::size_of::<PuppyIvars>() as u32,
            ivars_offset: Some(&PUPPY_IVARS),
            num_novel_meths: 1,
            num_overridden_meths: 0,
            num_inherited_meths: 1,
            flags: ClassFlags::FINAL,
        }],
        &[NovelMethSpec::new(&PUPPY_WAG, puppy_wag as fn(&Obj) -> u32)],
        &[],
        &[InheritedMethSpec::new(&PUPPY_SPEAK, &DOG_SPEAK)],
    );
}

pub fn new_animal(legs: i64) -> Obj {
    let obj = ANIMAL.get().make_obj();
    // SAFETY: fresh Animal, not yet shared
    unsafe {
        let ivars = obj.as_raw().ivars_ptr::<AnimalIvars>(&ANIMAL_IVARS);
        addr_of_mut!((*ivars).legs).write(legs);
    }
    obj
}

pub fn new_dog(good: bool) -> Obj {
    init_dog(DOG.get().make_obj(), good)
}

pub fn new_puppy(age: u32) -> Obj {
    let obj = init_dog(PUPPY.get().make_obj(), true);
    // SAFETY: fresh Puppy, not yet shared
    unsafe {
        let ivars = obj.as_raw().ivars_ptr::<PuppyIvars>(&PUPPY_IVARS);
        addr_of_mut!((*ivars).age).write(age);
    }
    obj
}

fn init_dog(obj: Obj, good: bool) -> Obj {
    // SAFETY: fresh Dog or Puppy, not yet shared
    unsafe {
        let ivars = obj.as_raw().ivars_ptr::<DogIvars>(&DOG_IVARS);
        addr_of_mut!((*ivars).legs).write(4);
        addr_of_mut!((*ivars).good).write(good);
    }
    obj
}
