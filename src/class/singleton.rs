//! Dynamic subclasses created on first reference
//!
//! A host subclass the runtime has never seen becomes a copy of its
//! parent descriptor with its own name. Methods the host defines itself
//! get their slots pointed at the host callback trampolines.

use rustc_hash::FxHashSet;

use crate::class::host::{host_bindings, HostBindings};
use crate::class::layout::ClassBlock;
use crate::class::Class;
use crate::errors::{fatal, ErrorKind, RuntimeError};
use crate::logging::log_singleton_created;
use crate::registry;

impl Class {
    /// Fetch or create the class named `class_name`
    ///
    /// Without an explicit `parent` the installed host bindings are asked
    /// for the parent's name, which is resolved recursively.
    pub fn singleton(
        class_name: &str,
        parent: Option<&'static Class>,
    ) -> Result<&'static Class, RuntimeError> {
        Self::singleton_with(class_name, parent, host_bindings())
    }

    /// `singleton` against explicit host bindings
    pub fn singleton_with(
        class_name: &str,
        parent: Option<&'static Class>,
        host: &dyn HostBindings,
    ) -> Result<&'static Class, RuntimeError> {
        if let Some(klass) = registry::fetch_class(class_name) {
            return Ok(klass);
        }

        let parent = match parent {
            Some(parent) => parent,
            None => {
                let parent_name = host
                    .find_parent_class(class_name)
                    .ok_or_else(|| RuntimeError::no_parent_class(class_name))?;
                Self::singleton_with(&parent_name, None, host)
                    .map_err(|err| err.with_context(format!("resolving parent of {}", class_name)))?
            }
        };

        let mut block = simple_subclass(parent, class_name)?;
        let overrides = apply_host_overrides(&mut block, parent, class_name, host);

        // SAFETY: the block is only leaked once the registry accepted it;
        // a rejected candidate was never visible outside this function.
        let candidate = unsafe { block.as_static() };
        if candidate.add_to_registry() {
            let singleton = block.leak();
            host.register_with_host(singleton, parent);
            log_singleton_created(class_name, parent.name(), overrides);
            return Ok(singleton);
        }

        // Lost the race; use the winner
        drop(block);
        match registry::fetch_class(class_name) {
            Some(klass) => Ok(klass),
            None => fatal(ErrorKind::RegistryRace {
                class: class_name.to_string(),
            }),
        }
    }
}

/// Copy of `parent` under a new name, with no novel methods
fn simple_subclass(parent: &'static Class, name: &str) -> Result<ClassBlock, RuntimeError> {
    if parent.is_final() {
        return Err(RuntimeError::final_parent(name, parent.name()));
    }

    let mut block = ClassBlock::allocate(parent.class_alloc_size());
    let subclass = block.as_mut();

    subclass.header.set_class_ptr(parent.header.class_ptr());
    subclass.parent = Some(parent);
    subclass.parcel_id = parent.parcel_id();
    subclass.flags = parent.flags();
    subclass.obj_alloc_size = parent.obj_alloc_size();
    subclass.class_alloc_size = parent.class_alloc_size();
    subclass.vtable.copy_from_slice(parent.vtable());
    if subclass.name.set(name.into()).is_err() || subclass.methods.set(Box::default()).is_err() {
        fatal(ErrorKind::DoubleBootstrap {
            class: name.to_string(),
        });
    }

    Ok(block)
}

/// Point the slots of host-defined methods at their callbacks
fn apply_host_overrides(
    block: &mut ClassBlock,
    parent: &'static Class,
    class_name: &str,
    host: &dyn HostBindings,
) -> usize {
    let fresh = host.fresh_host_methods(class_name);
    if fresh.is_empty() {
        return 0;
    }
    let fresh: FxHashSet<&str> = fresh.iter().map(String::as_str).collect();

    let subclass = block.as_mut();
    let mut overrides = 0;
    for ancestor in parent.ancestors() {
        for method in ancestor.methods() {
            let Some(callback) = method.callback() else {
                continue;
            };
            if method.is_excluded() || !fresh.contains(method.host_name().as_str()) {
                continue;
            }
            subclass.override_raw(callback, method.offset());
            overrides += 1;
        }
    }
    overrides
}
