//! Binding facade: the boundary to the external expression engine.
//!
//! The real expression/data-binding engine lives behind the [`Binder`] trait:
//! given a declared expression and the enclosing [`BindScope`], it resolves a
//! [`Slot`] with get/set semantics against the backing model. The engine here
//! consumes that capability, it does not reimplement it. [`MapBinder`] is the
//! in-memory reference implementation used by tests and the pilot.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::tree::node::ValueKind;
use crate::tree::path::TreePath;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// The closed value type flowing between controls and model slots.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Free text.
    Text(String),
    /// Composite record, assembled by grouping controls.
    Record(BTreeMap<String, Value>),
}

impl Value {
    /// Convenience constructor for text values.
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// An empty record.
    pub fn record() -> Self {
        Value::Record(BTreeMap::new())
    }

    /// Parse submitted wire text into the control's target type.
    ///
    /// Conversion failures are per-control input errors, recovered locally —
    /// the caller stores the message on the control state instead of failing
    /// the request.
    pub fn parse(kind: ValueKind, raw: &str) -> Result<Value, String> {
        match kind {
            ValueKind::Text => Ok(Value::Text(raw.to_owned())),
            ValueKind::Int => raw
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("`{raw}` is not a whole number")),
            ValueKind::Bool => match raw.trim() {
                "true" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "off" | "0" | "" => Ok(Value::Bool(false)),
                other => Err(format!("`{other}` is not a boolean")),
            },
        }
    }

    /// Render the value as display text for markup output.
    pub fn display_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Text(s) => s.clone(),
            Value::Record(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{k}={}", v.display_text()))
                    .collect();
                parts.join(", ")
            }
        }
    }

    /// Read a record field, `Null` if absent or not a record.
    pub fn field(&self, name: &str) -> Value {
        match self {
            Value::Record(fields) => fields.get(name).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Write a record field, converting `self` to a record first if needed.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        if !matches!(self, Value::Record(_)) {
            *self = Value::record();
        }
        if let Value::Record(fields) = self {
            fields.insert(name.into(), value);
        }
    }

    /// A short name for the value's shape, used in slot type errors.
    pub fn shape(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Text(_) => "text",
            Value::Record(_) => "record",
        }
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// A model slot rejected a write.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{message}")]
pub struct SlotError {
    /// Human-readable rejection reason, rendered inline at the control.
    pub message: String,
}

impl SlotError {
    /// Build a slot error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A gettable/settable slot in the backing model.
pub trait Slot: Send + Sync + std::fmt::Debug {
    /// Read the current model value.
    fn get(&self) -> Value;

    /// Write a value back to the model. The model may reject the write.
    fn set(&self, value: Value) -> Result<(), SlotError>;
}

/// Shared handle to a bound slot.
pub type SlotRef = Arc<dyn Slot>;

// ---------------------------------------------------------------------------
// BindScope
// ---------------------------------------------------------------------------

/// The chained binding scope a component exports to its children.
///
/// Each grouping component extends its parent's scope with one segment; leaf
/// expressions are resolved within the innermost scope. Scopes are immutable
/// and cheaply cloneable (shared links).
#[derive(Debug, Clone, Default)]
pub struct BindScope {
    link: Option<Arc<ScopeLink>>,
}

#[derive(Debug)]
struct ScopeLink {
    parent: Option<Arc<ScopeLink>>,
    segment: String,
}

impl BindScope {
    /// The root scope (no segments).
    pub fn root() -> Self {
        Self::default()
    }

    /// Extend this scope with one segment, producing the child scope.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        Self {
            link: Some(Arc::new(ScopeLink {
                parent: self.link.clone(),
                segment: segment.into(),
            })),
        }
    }

    /// Segments root-first.
    pub fn segments(&self) -> Vec<&str> {
        let mut segments = Vec::new();
        let mut current = self.link.as_deref();
        while let Some(link) = current {
            segments.push(link.segment.as_str());
            current = link.parent.as_deref();
        }
        segments.reverse();
        segments
    }

    /// Qualify an expression within this scope (`customer` + `name` →
    /// `customer.name`).
    pub fn qualify(&self, expr: &str) -> String {
        let mut qualified = String::new();
        for segment in self.segments() {
            qualified.push_str(segment);
            qualified.push('.');
        }
        qualified.push_str(expr);
        qualified
    }
}

impl fmt::Display for BindScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments().join("."))
    }
}

// ---------------------------------------------------------------------------
// Binder
// ---------------------------------------------------------------------------

/// Binding failed.
///
/// Bind-time errors are fatal at tree-construction time: the tree reports them
/// path-qualified and the build aborts. They are never retried per-request.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// The expression does not resolve against the model.
    #[error("unresolved expression `{expr}`")]
    Unresolved {
        /// The qualified expression that failed.
        expr: String,
    },
    /// A component's binding failed; carries the path-qualified context.
    #[error("binding failed at `{path}` ({context}): {source}")]
    AtComponent {
        /// Tree path of the failing component.
        path: TreePath,
        /// The component's declaration context.
        context: String,
        /// The underlying failure.
        #[source]
        source: Box<BindError>,
    },
    /// `bind` was called twice on the same tree.
    #[error("tree is already bound")]
    AlreadyBound,
    /// `bind` was called on a tree with no root.
    #[error("tree has no root")]
    NoRoot,
    /// The tree was mounted before being bound.
    #[error("tree mounted before bind")]
    NotBound,
}

/// Resolves declared expressions to model slots.
///
/// This is the whole surface the engine needs from the expression engine.
pub trait Binder {
    /// Resolve `expr` within `scope` to a slot.
    fn bind(&self, expr: &str, scope: &BindScope) -> Result<SlotRef, BindError>;
}

// ---------------------------------------------------------------------------
// MapModel / MapBinder
// ---------------------------------------------------------------------------

/// A shared in-memory model keyed by qualified expression.
///
/// Reads of absent keys yield `Null`; writes insert. Used by tests and the
/// pilot in place of the external expression engine.
#[derive(Debug, Clone, Default)]
pub struct MapModel {
    values: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl MapModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value, `Null` if absent.
    pub fn get(&self, key: &str) -> Value {
        self.values
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Insert or replace a value.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key.into(), value);
    }
}

#[derive(Debug)]
struct MapSlot {
    model: MapModel,
    key: String,
}

impl Slot for MapSlot {
    fn get(&self) -> Value {
        self.model.get(&self.key)
    }

    fn set(&self, value: Value) -> Result<(), SlotError> {
        // Writes may not change an existing value's shape; this is the model
        // rejecting a value, which surfaces as a per-control input error.
        let existing = self.model.get(&self.key);
        if !matches!(existing, Value::Null) && existing.shape() != value.shape() {
            return Err(SlotError::new(format!(
                "slot `{}` holds {}, refusing {}",
                self.key,
                existing.shape(),
                value.shape()
            )));
        }
        self.model.set(self.key.clone(), value);
        Ok(())
    }
}

/// [`Binder`] over a [`MapModel`].
///
/// Permissive by default (any expression resolves); with a schema, only the
/// listed keys resolve and everything else is a bind failure.
#[derive(Debug, Clone, Default)]
pub struct MapBinder {
    model: MapModel,
    schema: Option<BTreeSet<String>>,
}

impl MapBinder {
    /// A permissive binder over the given model.
    pub fn new(model: MapModel) -> Self {
        Self {
            model,
            schema: None,
        }
    }

    /// Restrict the binder to the given qualified keys (builder).
    pub fn with_schema<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schema = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// The backing model.
    pub fn model(&self) -> &MapModel {
        &self.model
    }
}

impl Binder for MapBinder {
    fn bind(&self, expr: &str, scope: &BindScope) -> Result<SlotRef, BindError> {
        let key = scope.qualify(expr);
        if let Some(schema) = &self.schema {
            if !schema.contains(&key) {
                return Err(BindError::Unresolved { expr: key });
            }
        }
        Ok(Arc::new(MapSlot {
            model: self.model.clone(),
            key,
        }))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
