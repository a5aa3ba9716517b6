//! Handler registries.
//!
//! Two layers:
//! - [`HandlerFactoryRegistry`]: a compile-time table of `factory name ->
//!   constructor function`, built once from every handler compiled into the
//!   binary. Stands in for dynamic class loading, which Rust has no
//!   equivalent of -- the binary is the deployment unit, so "discoverable
//!   handlers" means "handlers linked into this binary".
//! - [`HandlerRegistry`]: the live, per-process table of `type_code ->
//!   handler instance`, built by resolving a declarative mapping file
//!   through the factory registry at startup.

use std::collections::HashMap;

use super::trait_def::JobHandler;

/// Constructs a fresh handler instance. Stored as a plain function pointer
/// since handlers are expected to be cheap, stateless adapters.
pub type HandlerFactory = fn() -> Box<dyn JobHandler>;

/// Compile-time table of factory name to constructor.
///
/// Every handler shipped in the binary registers a factory name here (e.g.
/// `"sample.code_index"`). The mapping file (see
/// [`super::mapping::load_mapping`]) then binds task `type_code`s to these
/// factory names, so which handlers actually run is a deployment-time
/// decision, not a recompile.
pub struct HandlerFactoryRegistry {
    factories: HashMap<&'static str, HandlerFactory>,
}

impl HandlerFactoryRegistry {
    /// Build an empty factory registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a named factory. Panics if the name is already registered,
    /// since two handlers racing for the same factory name is a build-time
    /// programming error, not a runtime condition.
    pub fn register(&mut self, name: &'static str, factory: HandlerFactory) {
        if self.factories.insert(name, factory).is_some() {
            panic!("handler factory '{name}' registered twice");
        }
    }

    /// Build the factory registry containing every handler shipped with
    /// this binary.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("sample.code_index", || {
            Box::new(crate::plugins::code_index::CodeIndexHandler)
        });
        registry
    }

    /// Construct a new handler instance from a registered factory name.
    pub fn construct(&self, factory_name: &str) -> Option<Box<dyn JobHandler>> {
        self.factories.get(factory_name).map(|f| f())
    }

    /// Names of every registered factory.
    pub fn list(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for HandlerFactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The live, per-process table of `type_code -> handler instance` the
/// engine dispatches tasks through.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a task `type_code` to a handler instance. If the type code is
    /// already bound, the old handler is replaced and returned.
    pub fn register(
        &mut self,
        type_code: impl Into<String>,
        handler: Box<dyn JobHandler>,
    ) -> Option<Box<dyn JobHandler>> {
        self.handlers.insert(type_code.into(), handler)
    }

    /// Look up the handler bound to a task's `type_code`.
    pub fn get(&self, type_code: &str) -> Option<&dyn JobHandler> {
        self.handlers.get(type_code).map(|b| b.as_ref())
    }

    /// List every bound type code.
    pub fn list(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }

    /// Number of bound type codes.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// `true` if no type codes are bound.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::context::ExecutionContext;
    use anyhow::Result;
    use async_trait::async_trait;

    struct FakeHandler;

    #[async_trait]
    impl JobHandler for FakeHandler {
        async fn execute(&self, _payload: &str, _ctx: &ExecutionContext) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn factory_registry_has_builtins() {
        let registry = HandlerFactoryRegistry::with_builtins();
        assert!(registry.list().contains(&"sample.code_index"));
    }

    #[test]
    fn factory_registry_constructs_handler() {
        let registry = HandlerFactoryRegistry::with_builtins();
        let handler = registry.construct("sample.code_index");
        assert!(handler.is_some());
    }

    #[test]
    fn factory_registry_unknown_name_returns_none() {
        let registry = HandlerFactoryRegistry::with_builtins();
        assert!(registry.construct("nonexistent").is_none());
    }

    #[test]
    fn handler_registry_register_and_get() {
        let mut registry = HandlerRegistry::new();
        registry.register("builtin.noop", Box::new(FakeHandler));
        assert!(registry.get("builtin.noop").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn handler_registry_replace_returns_old() {
        let mut registry = HandlerRegistry::new();
        let old = registry.register("builtin.noop", Box::new(FakeHandler));
        assert!(old.is_none());
        let replaced = registry.register("builtin.noop", Box::new(FakeHandler));
        assert!(replaced.is_some());
        assert_eq!(registry.len(), 1);
    }
}
