//! Runtime initialization - the one entry point embedders call first
//!
//! Wires configuration into logging, sizes the class registry and
//! bootstraps the core parcel. Later calls are no-ops.

use once_cell::sync::OnceCell;

use crate::classes;
use crate::config::RuntimeConfig;
use crate::logging::{self, log_runtime_init};
use crate::registry;

static RUNTIME: OnceCell<RuntimeConfig> = OnceCell::new();

/// Initialize with configuration discovered from the working directory
pub fn init() -> &'static RuntimeConfig {
    RUNTIME.get_or_init(|| start(RuntimeConfig::discover()))
}

/// Initialize with explicit configuration
///
/// Only the first initialization takes effect; the returned configuration
/// is the one in force.
pub fn init_with(config: &RuntimeConfig) -> &'static RuntimeConfig {
    RUNTIME.get_or_init(|| start(config.clone()))
}

/// The configuration in force, if initialized
pub fn config() -> Option<&'static RuntimeConfig> {
    RUNTIME.get()
}

pub fn is_initialized() -> bool {
    RUNTIME.get().is_some()
}

fn start(config: RuntimeConfig) -> RuntimeConfig {
    logging::init_with_config(config.log_config());

    // A registry created earlier (by an eager bootstrap) keeps its size
    let registry = registry::init_registry(config.registry.capacity);
    if registry.capacity() != config.registry.capacity.max(1).next_power_of_two() {
        logging::warn!(
            target: "runtime",
            requested = config.registry.capacity,
            actual = registry.capacity(),
            "class registry already created"
        );
    }

    classes::bootstrap_core();
    log_runtime_init(registry.capacity());
    config
}
