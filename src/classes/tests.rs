use super::*;
use crate::class::Class;
use crate::object::Obj;
use std::cmp::Ordering;

fn setup() {
    bootstrap_core();
}

// ============================================================================
// Parcel
// ============================================================================

#[test]
fn bootstrap_is_idempotent() {
    setup();
    let obj = OBJ.get();
    bootstrap_core();
    CORE_PARCEL.bootstrap();
    assert!(CORE_PARCEL.is_bootstrapped());
    assert_eq!(OBJ.get(), obj);
}

#[test]
fn concurrent_bootstrap_is_serialized() {
    let handles: Vec<_> = (0..8)
        .map(|_| std::thread::spawn(|| {
            bootstrap_core();
            INTEGER.get().name().to_string()
        }))
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), "Clownfish::Integer");
    }
}

#[test]
fn core_classes_share_one_parcel() {
    setup();
    let parcel = OBJ.get().parcel_id();
    for slot in [&CLASS, &METHOD, &BOOLEAN, &INTEGER] {
        assert_eq!(slot.get().parcel_id(), parcel);
    }
}

#[test]
fn class_objects_are_sized_as_descriptors() {
    setup();
    assert_eq!(CLASS.get().obj_alloc_size(), crate::class::VTABLE_OFFSET);
    assert_eq!(
        METHOD.get().obj_alloc_size() as usize,
        mem::size_of::<Method>()
    );
}

// ============================================================================
// Obj
// ============================================================================

#[test]
fn obj_equality_is_identity() {
    setup();
    let a = OBJ.get().make_obj();
    let b = OBJ.get().make_obj();
    assert!(a.equals(&a.clone()));
    assert!(!a.equals(&b));
}

#[test]
#[should_panic(expected = "Insane attempt to destroy immortal object of class 'Clownfish::Boolean'")]
fn destroying_immortals_is_fatal() {
    setup();
    let truth = boolean::singleton(true);
    let destroy = truth.class().method(&OBJ_DESTROY);
    destroy(truth.as_raw());
}

#[test]
#[should_panic(expected = "Insane attempt to destroy immortal object of class 'Clownfish::Class'")]
fn destroying_classes_is_fatal() {
    setup();
    let klass = INTEGER.get().as_obj();
    let destroy = klass.class().method(&OBJ_DESTROY);
    destroy(klass.as_raw());
}

#[test]
fn method_objects_describe_methods() {
    setup();
    let method = OBJ.get().find_method("To_String").unwrap();
    assert_eq!(method.name(), "To_String");
    assert_eq!(method.offset(), OBJ_TO_STRING.offset());
    assert_eq!(method.host_name(), "to_string");
    assert!(!method.is_excluded());
    assert_eq!(method.as_obj().to_string(), "To_String");
}

// ============================================================================
// Boolean
// ============================================================================

#[test]
fn booleans_are_shared() {
    setup();
    let a = boolean::singleton(true);
    let b = boolean::singleton(true);
    assert!(Obj::ptr_eq(&a, &b));
    assert!(!Obj::ptr_eq(&a, &boolean::singleton(false)));
    assert_eq!(boolean::value(&a), Some(true));
    assert_eq!(boolean::value(&boolean::singleton(false)), Some(false));
}

#[test]
fn boolean_strings_and_equality() {
    setup();
    let yes = boolean::singleton(true);
    let no = boolean::singleton(false);
    assert_eq!(yes.to_string(), "true");
    assert_eq!(no.to_string(), "false");
    assert!(yes.equals(&boolean::singleton(true)));
    assert!(!yes.equals(&no));
    assert!(!yes.equals(&integer::new(1)));
}

#[test]
#[should_panic(expected = "Abstract method 'Compare_To' not defined by class 'Clownfish::Boolean'")]
fn booleans_do_not_compare() {
    setup();
    boolean::singleton(true).compare_to(&boolean::singleton(false));
}

// ============================================================================
// Integer
// ============================================================================

#[test]
fn integer_values() {
    setup();
    let n = integer::new(i64::MIN);
    assert_eq!(integer::value(&n), Some(i64::MIN));
    assert_eq!(n.to_string(), i64::MIN.to_string());
    assert_eq!(integer::value(&boolean::singleton(true)), None);
    assert_eq!(n.class(), INTEGER.get());
}

#[test]
fn integer_equality_is_by_value() {
    setup();
    let a = integer::new(42);
    let b = integer::new(42);
    assert!(!Obj::ptr_eq(&a, &b));
    assert!(a.equals(&b));
    assert!(!a.equals(&integer::new(43)));
    assert!(!a.equals(&OBJ.get().make_obj()));
}

#[test]
fn integer_ordering() {
    setup();
    let small = integer::new(-5);
    let big = integer::new(5);
    assert_eq!(small.compare_to(&big), Ordering::Less);
    assert_eq!(big.compare_to(&small), Ordering::Greater);
    assert_eq!(big.compare_to(&integer::new(5)), Ordering::Equal);
}

#[test]
#[should_panic(expected = "Can't compare Clownfish::Integer to Clownfish::Boolean")]
fn integer_against_other_class_is_fatal() {
    setup();
    integer::new(1).compare_to(&boolean::singleton(true));
}

#[test]
fn integers_are_mortal() {
    setup();
    let klass: &Class = INTEGER.get();
    assert!(!klass
        .flags()
        .contains(crate::class::ClassFlags::REFCOUNT_SPECIAL));
    let n = integer::new(3);
    let copy = n.clone();
    assert_eq!(n.get_count(), 2);
    assert_eq!(copy.release(), 1);
}
