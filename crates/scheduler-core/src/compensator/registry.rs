//! Live registry binding a compensation entry's `action_type` to the
//! [`Compensator`] that knows how to undo it.

use std::collections::HashMap;

use super::trait_def::Compensator;

/// A collection of registered [`Compensator`] implementations, keyed by
/// `action_type`.
#[derive(Default)]
pub struct CompensatorRegistry {
    compensators: HashMap<String, Box<dyn Compensator>>,
}

impl CompensatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compensator under the given `action_type`. First-wins: if
    /// `action_type` is already bound, the existing compensator is kept, a
    /// warning is logged, and the given compensator is handed back.
    pub fn register(
        &mut self,
        action_type: impl Into<String>,
        compensator: Box<dyn Compensator>,
    ) -> Option<Box<dyn Compensator>> {
        let action_type = action_type.into();
        if self.compensators.contains_key(&action_type) {
            tracing::warn!(action_type = %action_type, "compensator already registered, keeping first binding");
            return Some(compensator);
        }
        self.compensators.insert(action_type, compensator);
        None
    }

    /// Build the registry containing every compensator shipped with this
    /// binary. `default_root` backs the sample file-restore compensator's
    /// payloads that omit their own `root`.
    pub fn with_builtins(default_root: Option<String>) -> Self {
        let mut registry = Self::new();
        registry.register(
            "sample.file_restore",
            Box::new(crate::plugins::file_restore::FileRestoreCompensator::new(default_root)),
        );
        registry
    }

    /// Look up the compensator for an `action_type`.
    pub fn get(&self, action_type: &str) -> Option<&dyn Compensator> {
        self.compensators.get(action_type).map(|b| b.as_ref())
    }

    /// List every registered action type.
    pub fn list(&self) -> Vec<&str> {
        self.compensators.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    struct FakeCompensator;

    #[async_trait]
    impl Compensator for FakeCompensator {
        async fn compensate(&self, _payload: &str) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn register_and_get() {
        let mut registry = CompensatorRegistry::new();
        registry.register("sample.thing", Box::new(FakeCompensator));
        assert!(registry.get("sample.thing").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn register_keeps_first_binding_on_conflict() {
        let mut registry = CompensatorRegistry::new();
        let first = registry.register("sample.thing", Box::new(FakeCompensator));
        assert!(first.is_none());
        let rejected = registry.register("sample.thing", Box::new(FakeCompensator));
        assert!(rejected.is_some(), "conflicting registration should be handed back, not swapped in");
        assert_eq!(registry.list(), vec!["sample.thing"]);
    }

    #[test]
    fn builtins_include_file_restore() {
        let registry = CompensatorRegistry::with_builtins(None);
        assert!(registry.list().contains(&"sample.file_restore"));
    }
}
