//! Component node types: ComponentId, Role, ValueKind, ComponentData.

use slotmap::new_key_type;

new_key_type! {
    /// Unique identifier for a component node. Copy, lightweight (u64).
    pub struct ComponentId;
}

/// The structural role a component plays in the tree.
///
/// Roles decide which flavor of state node a conversation allocates for the
/// component and how grouping distance is computed at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The single tree root.
    Root,
    /// A structural node with no buffered value of its own.
    Generic,
    /// An input-bearing node with a buffered value.
    Control,
    /// A grouping control pinning a composite buffer for its descendants.
    Group,
}

/// The target type a control converts submitted wire text into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValueKind {
    /// Free text, no conversion.
    #[default]
    Text,
    /// Signed integer.
    Int,
    /// Boolean (`true`/`false`/`on`).
    Bool,
}

/// Data declared for a single component node.
///
/// Components are built once per tree compilation and shared read-only across
/// every conversation that uses the tree, so this is declaration data only —
/// anything mutable per conversation lives in the state tree.
#[derive(Debug, Clone)]
pub struct ComponentData {
    /// Behavior type name (e.g. "TextField", "FieldGroup").
    pub type_name: String,
    /// Structural role.
    pub role: Role,
    /// Declared name, used for wire field naming and action naming.
    pub name: Option<String>,
    /// Binding expression resolved against the enclosing scope at bind time.
    pub expr: Option<String>,
    /// Declaration context for diagnostics (template path and position).
    pub context: String,
    /// Conversion target for submitted values.
    pub value_kind: ValueKind,
    /// For action-exposing components: register a permanent (non-responsive)
    /// action instead of a single-use one.
    pub permanent: bool,
    /// For action-exposing components: fire under an ambient transaction.
    pub transactional: bool,
}

impl ComponentData {
    /// Create a new `ComponentData` with the given behavior type and defaults.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            role: Role::Generic,
            name: None,
            expr: None,
            context: String::new(),
            value_kind: ValueKind::Text,
            permanent: false,
            transactional: false,
        }
    }

    /// Set the structural role (builder).
    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Set the declared name (builder).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the binding expression (builder).
    pub fn with_expr(mut self, expr: impl Into<String>) -> Self {
        self.expr = Some(expr.into());
        self
    }

    /// Set the declaration context used in diagnostics (builder).
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Set the conversion target for submitted values (builder).
    pub fn with_value_kind(mut self, kind: ValueKind) -> Self {
        self.value_kind = kind;
        self
    }

    /// Mark exposed actions as permanent (builder).
    pub fn permanent(mut self, permanent: bool) -> Self {
        self.permanent = permanent;
        self
    }

    /// Mark exposed actions as transactional (builder).
    pub fn transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }

    /// Declaration context if set, otherwise the type name.
    pub fn describe(&self) -> &str {
        if self.context.is_empty() {
            &self.type_name
        } else {
            &self.context
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
