//! Named plugin lookup for policy modules.
//!
//! The registry is owned by the daemon and mutated only from the loop
//! thread; plugins expose their service interface to hooks through a name
//! lookup plus an `Any` downcast.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::Error;

/// A loadable policy module exposing a named service.
pub trait Plugin: Send + Sync {
    /// Registry name, unique per process.
    fn name(&self) -> &str;

    /// Concrete-type access for callers that found the plugin by name.
    fn as_any(&self) -> &dyn Any;
}

/// Process-wide plugin table, initialised at startup and torn down at
/// shutdown.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin. A duplicate name is an [`Error::InvalidArgument`].
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), Error> {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(Error::InvalidArgument(format!(
                "plugin '{name}' is already registered"
            )));
        }
        debug!(plugin = %name, "plugin registered");
        self.plugins.insert(name, plugin);
        Ok(())
    }

    /// Looks up a plugin by name.
    pub fn find(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    /// Removes a plugin, returning whether it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.plugins.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakePlugin {
        marker: u32,
    }

    impl Plugin for FakePlugin {
        fn name(&self) -> &str {
            "fake"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn register_find_downcast() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(FakePlugin { marker: 7 })).unwrap();

        let found = registry.find("fake").expect("plugin should be registered");
        let concrete = found
            .as_any()
            .downcast_ref::<FakePlugin>()
            .expect("downcast to the concrete plugin type");
        assert_eq!(concrete.marker, 7);

        assert!(registry.find("missing").is_none());
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(FakePlugin { marker: 1 })).unwrap();
        assert!(registry.register(Arc::new(FakePlugin { marker: 2 })).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_removes() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(FakePlugin { marker: 1 })).unwrap();
        assert!(registry.unregister("fake"));
        assert!(registry.is_empty());
    }
}
