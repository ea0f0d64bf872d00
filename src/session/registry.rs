//! Action records and the per-session action registry.
//!
//! An [`Action`] is a named, path-targeted callback descriptor created during
//! a render and fired by a client-supplied identifier on the next cycle.
//! Several actions may share a name (repeated rows in a list register one
//! action each); firing a name dispatches to all of them in registration
//! order.

use crate::tree::path::TreePath;

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// An immutable callback descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Registry key the client echoes back to fire this action.
    pub name: String,
    /// Path from the tree root to the target node.
    pub target: TreePath,
    /// Single-use actions are cleared every cycle; non-responsive actions
    /// persist for direct invocation (bookmarked links).
    pub responsive: bool,
    /// Fire under an ambient transaction.
    pub transactional: bool,
}

impl Action {
    /// A single-use action, cleared after every cycle.
    pub fn responsive(name: impl Into<String>, target: TreePath) -> Self {
        Self {
            name: name.into(),
            target,
            responsive: true,
            transactional: false,
        }
    }

    /// A permanent action, kept across cycles for explicit invocation.
    pub fn permanent(name: impl Into<String>, target: TreePath) -> Self {
        Self {
            name: name.into(),
            target,
            responsive: false,
            transactional: false,
        }
    }

    /// Mark the action transactional (builder).
    pub fn transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }
}

// ---------------------------------------------------------------------------
// ActionRegistry
// ---------------------------------------------------------------------------

/// The session's table of registered actions.
///
/// Kept as a single vec in registration order; lookup filters by name, which
/// preserves the registration order the firing protocol requires.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    entries: Vec<Action>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action. Duplicate names are allowed.
    pub fn register(&mut self, action: Action) {
        self.entries.push(action);
    }

    /// All actions registered under `name`, in registration order.
    pub fn lookup(&self, name: &str) -> Vec<Action> {
        self.entries
            .iter()
            .filter(|a| a.name == name)
            .cloned()
            .collect()
    }

    /// Whether any action is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|a| a.name == name)
    }

    /// Drop every responsive (single-use) action. Fresh ones are registered
    /// again at the next render.
    pub fn clear_responsive(&mut self) {
        self.entries.retain(|a| !a.responsive);
    }

    /// Drop everything, responsive or not. Used when the state tree is
    /// rebuilt and every stored target path has gone stale.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
