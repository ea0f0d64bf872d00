//! Behavior trait and registry: per-phase hooks, capability-style.
//!
//! One [`Behavior`] exists per component *type*, shared across all nodes and
//! conversations; everything per-node lives in the state tree and arrives
//! through the [`Visit`]. Deep widget-class hierarchies are replaced by this
//! one object-safe trait with default no-op hooks — a control implements
//! exactly the phases it cares about.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dispatch::{DispatchError, Visit};
use crate::message::Message;

// ---------------------------------------------------------------------------
// Behavior
// ---------------------------------------------------------------------------

/// Per-phase component behavior. All hooks default to no-ops.
pub trait Behavior: Send + Sync {
    /// Runs before the node's phase hook and before any descendant, on every
    /// message. Groups pin their buffers here.
    fn before_children(
        &self,
        _v: &mut Visit<'_, '_>,
        _msg: &Message,
    ) -> Result<(), DispatchError> {
        Ok(())
    }

    /// Runs after the whole subtree, on every message. Groups gather and
    /// unpin here.
    fn after_children(
        &self,
        _v: &mut Visit<'_, '_>,
        _msg: &Message,
    ) -> Result<(), DispatchError> {
        Ok(())
    }

    /// First dispatch after state construction; register permanent actions
    /// and allocate substructure.
    fn on_initialize(&self, _v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        Ok(())
    }

    /// Read per-request context before actions run.
    fn on_request(&self, _v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        Ok(())
    }

    /// A registered action fired at this node.
    fn on_action(&self, _v: &mut Visit<'_, '_>, _name: &str) -> Result<(), DispatchError> {
        Ok(())
    }

    /// Refresh display-bound values from the model after actions ran.
    fn on_prepare(&self, _v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        Ok(())
    }

    /// Execute commands deferred during earlier phases.
    fn on_command(&self, _v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        Ok(())
    }

    /// Emit markup and register next-cycle callbacks.
    fn render(&self, _v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        Ok(())
    }

    /// Route a message to the matching phase hook.
    fn handle(&self, v: &mut Visit<'_, '_>, msg: &Message) -> Result<(), DispatchError> {
        match msg {
            Message::Initialize => self.on_initialize(v),
            Message::Request => self.on_request(v),
            Message::Action { name } => self.on_action(v, name),
            Message::Prepare => self.on_prepare(v),
            Message::Command => self.on_command(v),
            Message::Render => self.render(v),
        }
    }
}

/// Behavior with every hook left at its default: structural nodes.
pub struct NoopBehavior;

impl Behavior for NoopBehavior {}

// ---------------------------------------------------------------------------
// BehaviorRegistry
// ---------------------------------------------------------------------------

/// Maps component type names to shared behaviors.
///
/// Unknown type names resolve to [`NoopBehavior`], so a tree can carry
/// structural nodes without registering anything for them.
pub struct BehaviorRegistry {
    map: HashMap<String, Arc<dyn Behavior>>,
    noop: Arc<dyn Behavior>,
}

impl BehaviorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            noop: Arc::new(NoopBehavior),
        }
    }

    /// A registry with every built-in control registered.
    pub fn with_defaults() -> Self {
        use super::{
            ActionLink, FieldGroup, Label, PortRoot, PortletSlot, TextField, UploadField,
        };
        let mut registry = Self::new();
        registry.register("Port", Arc::new(PortRoot));
        registry.register("Label", Arc::new(Label));
        registry.register("TextField", Arc::new(TextField));
        registry.register("FieldGroup", Arc::new(FieldGroup));
        registry.register("ActionLink", Arc::new(ActionLink));
        registry.register("UploadField", Arc::new(UploadField));
        registry.register("PortletSlot", Arc::new(PortletSlot));
        registry
    }

    /// Register (or replace) the behavior for a type name.
    pub fn register(&mut self, type_name: impl Into<String>, behavior: Arc<dyn Behavior>) {
        self.map.insert(type_name.into(), behavior);
    }

    /// The behavior for a type name; no-op when unregistered.
    pub fn resolve(&self, type_name: &str) -> Arc<dyn Behavior> {
        self.map
            .get(type_name)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.noop))
    }

    /// Whether a behavior is registered under the given type name.
    pub fn contains(&self, type_name: &str) -> bool {
        self.map.contains_key(type_name)
    }

    /// Number of registered behaviors.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no behaviors are registered.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for BehaviorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_resolves_noop() {
        let registry = BehaviorRegistry::new();
        assert!(registry.is_empty());
        // Resolving an unknown type never fails.
        let _behavior = registry.resolve("Anything");
        assert!(!registry.contains("Anything"));
    }

    #[test]
    fn with_defaults_registers_builtins() {
        let registry = BehaviorRegistry::with_defaults();
        for name in [
            "Port",
            "Label",
            "TextField",
            "FieldGroup",
            "ActionLink",
            "UploadField",
            "PortletSlot",
        ] {
            assert!(registry.contains(name), "missing builtin {name}");
        }
        assert_eq!(registry.len(), 7);
    }

    #[test]
    fn register_replaces() {
        let mut registry = BehaviorRegistry::new();
        registry.register("X", Arc::new(NoopBehavior));
        registry.register("X", Arc::new(NoopBehavior));
        assert_eq!(registry.len(), 1);
    }
}
