//! Host-language bindings consulted when creating dynamic subclasses
//!
//! The runtime itself knows nothing about a host. An embedding installs
//! a `HostBindings` implementation once; without one, `NoHost` answers
//! every query with "nothing known".

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::class::Class;

/// Queries the runtime makes of the host environment
pub trait HostBindings: Send + Sync {
    /// Name of the parent class the host declared for `class_name`
    fn find_parent_class(&self, class_name: &str) -> Option<String>;

    /// Host-side method names defined directly by `class_name`
    fn fresh_host_methods(&self, class_name: &str) -> Vec<String>;

    /// Called after a dynamic subclass was registered
    fn register_with_host(&self, _singleton: &'static Class, _parent: &'static Class) {}
}

/// Bindings for a runtime without a host
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHost;

impl HostBindings for NoHost {
    fn find_parent_class(&self, _class_name: &str) -> Option<String> {
        None
    }

    fn fresh_host_methods(&self, _class_name: &str) -> Vec<String> {
        Vec::new()
    }
}

static HOST: OnceCell<Box<dyn HostBindings>> = OnceCell::new();
static NO_HOST: NoHost = NoHost;

/// Install the process-wide host bindings; fails if already installed
pub fn set_host_bindings(bindings: Box<dyn HostBindings>) -> Result<(), Box<dyn HostBindings>> {
    HOST.set(bindings)
}

/// The installed host bindings, or `NoHost`
pub fn host_bindings() -> &'static dyn HostBindings {
    match HOST.get() {
        Some(bindings) => bindings.as_ref(),
        None => &NO_HOST,
    }
}

/// Table-driven bindings: declarations are recorded up front
///
/// Useful for embeddings whose class graph is known from metadata, and
/// for exercising the subclassing path without a real host.
#[derive(Debug, Default)]
pub struct HostTable {
    parents: DashMap<String, String>,
    methods: DashMap<String, Vec<String>>,
    registered: Mutex<Vec<(String, String)>>,
}

impl HostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `class_name` as a host subclass of `parent`
    pub fn declare_subclass(&self, class_name: &str, parent: &str) -> &Self {
        self.parents
            .insert(class_name.to_string(), parent.to_string());
        self
    }

    /// Declare that `class_name` defines `host_method` itself
    pub fn declare_method(&self, class_name: &str, host_method: &str) -> &Self {
        self.methods
            .entry(class_name.to_string())
            .or_default()
            .push(host_method.to_string());
        self
    }

    /// `(class, parent)` pairs reported through `register_with_host`, in order
    pub fn registered(&self) -> Vec<(String, String)> {
        self.registered.lock().clone()
    }
}

impl HostBindings for HostTable {
    fn find_parent_class(&self, class_name: &str) -> Option<String> {
        self.parents.get(class_name).map(|parent| parent.value().clone())
    }

    fn fresh_host_methods(&self, class_name: &str) -> Vec<String> {
        self.methods
            .get(class_name)
            .map(|methods| methods.value().clone())
            .unwrap_or_default()
    }

    fn register_with_host(&self, singleton: &'static Class, parent: &'static Class) {
        self.registered
            .lock()
            .push((singleton.name().to_string(), parent.name().to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_host_knows_nothing() {
        assert!(NoHost.find_parent_class("Anything").is_none());
        assert!(NoHost.fresh_host_methods("Anything").is_empty());
    }

    #[test]
    fn table_records_declarations() {
        let table = HostTable::new();
        table
            .declare_subclass("MyObj", "Clownfish::Obj")
            .declare_method("MyObj", "to_string")
            .declare_method("MyObj", "equals");

        assert_eq!(table.find_parent_class("MyObj").as_deref(), Some("Clownfish::Obj"));
        assert_eq!(table.fresh_host_methods("MyObj"), vec!["to_string", "equals"]);
        assert!(table.fresh_host_methods("Other").is_empty());
        assert!(table.registered().is_empty());
    }
}
