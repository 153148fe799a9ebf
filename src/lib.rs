//! cfish-runtime - object model and external sort primitives
//!
//! Reference-counted objects whose classes carry embedded vtables,
//! a lock-free class registry, parcel bootstrap, dynamic subclasses for
//! host languages, and a k-way external merge sort.

// Object model
pub mod class;
pub mod classes;
pub mod object;
pub mod registry;

// Algorithms
pub mod sort;

// Ambient
pub mod config;
pub mod errors;
pub mod logging;
pub mod runtime;

// Re-export commonly used items
pub use class::{
    bootstrap, Class, ClassFlags, ClassSlot, ClassSpec, HostBindings, HostTable,
    InheritedMethSpec, IvarsOffset, Method, MethodRef, NovelMethSpec, OverriddenMethSpec,
    Parcel,
};
pub use classes::{bootstrap_core, CORE_PARCEL};
pub use config::RuntimeConfig;
pub use errors::{fatal, ErrorKind, RuntimeError};
pub use object::{get_count, release, retain, Obj, ObjHeader, RawObj};
pub use registry::LockFreeRegistry;
pub use sort::{Comparator, RunReader, SortExternal, VecRunReader};
