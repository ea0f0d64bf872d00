//! Component tree: arena of declaration nodes, bound once, then shared.
//!
//! All nodes live in a single `SlotMap`. Parent/child relationships, child
//! indices, and per-node bindings are stored in secondary maps so lookup is
//! O(1). A tree is built mutable, [`bind`](ComponentTree::bind)ed exactly once,
//! then frozen behind an `Arc` and shared read-only by every conversation.

use slotmap::{SecondaryMap, SlotMap};

use super::node::{ComponentData, ComponentId, Role};
use super::path::TreePath;
use crate::binding::{BindError, BindScope, Binder, SlotRef};

/// Empty slice constant for returning when a node has no children.
const EMPTY_CHILDREN: &[ComponentId] = &[];

// ---------------------------------------------------------------------------
// ComponentBinding
// ---------------------------------------------------------------------------

/// What binding established for one component.
pub struct ComponentBinding {
    /// The resolved model slot, if the component declared an expression.
    pub slot: Option<SlotRef>,
    /// Parent-hops to the nearest enclosing group node, precomputed once at
    /// bind time. Dispatch must never re-walk ancestors to find this.
    pub group_distance: Option<usize>,
}

static UNBOUND: ComponentBinding = ComponentBinding {
    slot: None,
    group_distance: None,
};

// ---------------------------------------------------------------------------
// ComponentTree
// ---------------------------------------------------------------------------

/// The component tree for one compiled template.
///
/// Immutable after [`bind`](ComponentTree::bind); the `version` token lets a
/// conversation detect that its state tree was built against a blueprint that
/// has since been recompiled.
pub struct ComponentTree {
    nodes: SlotMap<ComponentId, ComponentData>,
    children: SecondaryMap<ComponentId, Vec<ComponentId>>,
    parent: SecondaryMap<ComponentId, ComponentId>,
    index: SecondaryMap<ComponentId, usize>,
    bindings: SecondaryMap<ComponentId, ComponentBinding>,
    root: Option<ComponentId>,
    version: u64,
    bound: bool,
}

impl ComponentTree {
    /// Create an empty tree with blueprint version 0.
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            children: SecondaryMap::new(),
            parent: SecondaryMap::new(),
            index: SecondaryMap::new(),
            bindings: SecondaryMap::new(),
            root: None,
            version: 0,
            bound: false,
        }
    }

    /// Set the blueprint version (builder). Bump on every recompile.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// The blueprint version this tree was compiled as.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Insert the root node.
    ///
    /// # Panics
    ///
    /// Panics (debug) if a root already exists or the tree is bound.
    pub fn insert_root(&mut self, data: ComponentData) -> ComponentId {
        debug_assert!(!self.bound, "tree is already bound");
        debug_assert!(self.root.is_none(), "tree already has a root");
        let id = self.nodes.insert(data);
        self.children.insert(id, Vec::new());
        self.root = Some(id);
        id
    }

    /// Insert a node as the last child of `parent`.
    ///
    /// # Panics
    ///
    /// Panics (debug) if `parent` does not exist or the tree is bound.
    pub fn insert_child(&mut self, parent: ComponentId, data: ComponentData) -> ComponentId {
        debug_assert!(!self.bound, "tree is already bound");
        debug_assert!(
            self.nodes.contains_key(parent),
            "parent node does not exist"
        );
        let id = self.nodes.insert(data);
        self.children.insert(id, Vec::new());
        self.parent.insert(id, parent);
        let siblings = self
            .children
            .get_mut(parent)
            .expect("parent must have children vec");
        self.index.insert(id, siblings.len());
        siblings.push(id);
        id
    }

    /// Immutable access to a node's declaration data.
    pub fn get(&self, id: ComponentId) -> Option<&ComponentData> {
        self.nodes.get(id)
    }

    /// The parent of a node, if it has one.
    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.parent.get(id).copied()
    }

    /// The children of a node, in declaration order.
    pub fn children(&self, id: ComponentId) -> &[ComponentId] {
        self.children
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(EMPTY_CHILDREN)
    }

    /// A node's index within its parent. The root has index 0.
    pub fn child_index(&self, id: ComponentId) -> usize {
        self.index.get(id).copied().unwrap_or(0)
    }

    /// The root node, if set.
    pub fn root(&self) -> Option<ComponentId> {
        self.root
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the tree contains a node with the given id.
    pub fn contains(&self, id: ComponentId) -> bool {
        self.nodes.contains_key(id)
    }

    /// The tree path addressing `id` from the root.
    pub fn path_of(&self, id: ComponentId) -> TreePath {
        let mut indices = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent.get(current).copied() {
            indices.push(self.child_index(current));
            current = parent;
        }
        indices.reverse();
        TreePath::from_indices(&indices)
    }

    /// Resolve a tree path to a node id, `None` if any step dangles.
    pub fn resolve(&self, path: &TreePath) -> Option<ComponentId> {
        let mut current = self.root?;
        for &index in path.indices() {
            current = self.children(current).get(index).copied()?;
        }
        Some(current)
    }

    /// Pre-order depth-first traversal starting from `start`.
    pub fn walk_preorder(&self, start: ComponentId) -> Vec<ComponentId> {
        let mut result = Vec::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if !self.nodes.contains_key(current) {
                continue;
            }
            result.push(current);
            for &child in self.children(current).iter().rev() {
                stack.push(child);
            }
        }
        result
    }

    // ── Binding ──────────────────────────────────────────────────────

    /// Resolve every declared expression against `binder`, pre-order.
    ///
    /// Each node's `bind` happens exactly once per tree instantiation:
    /// grouping nodes extend the scope exported to their children, and the
    /// distance to the nearest enclosing group is computed and cached here.
    /// A failure aborts the build with a path-qualified error.
    pub fn bind(&mut self, binder: &dyn Binder) -> Result<(), BindError> {
        if self.bound {
            return Err(BindError::AlreadyBound);
        }
        let root = self.root.ok_or(BindError::NoRoot)?;
        self.bind_node(binder, root, &BindScope::root(), None)?;
        self.bound = true;
        Ok(())
    }

    fn bind_node(
        &mut self,
        binder: &dyn Binder,
        id: ComponentId,
        scope: &BindScope,
        group_distance: Option<usize>,
    ) -> Result<(), BindError> {
        let data = self.nodes[id].clone();
        let slot = match &data.expr {
            Some(expr) => {
                let slot = binder.bind(expr, scope).map_err(|err| {
                    BindError::AtComponent {
                        path: self.path_of(id),
                        context: data.describe().to_owned(),
                        source: Box::new(err),
                    }
                })?;
                Some(slot)
            }
            None => None,
        };
        self.bindings.insert(
            id,
            ComponentBinding {
                slot,
                group_distance,
            },
        );

        let child_scope = match (&data.role, &data.expr) {
            (Role::Group, Some(expr)) => scope.child(expr.clone()),
            _ => scope.clone(),
        };
        let child_distance = if data.role == Role::Group {
            Some(1)
        } else {
            group_distance.map(|d| d + 1)
        };
        for child in self.children(id).to_vec() {
            self.bind_node(binder, child, &child_scope, child_distance)?;
        }
        Ok(())
    }

    /// Whether [`bind`](ComponentTree::bind) has run.
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// The binding established for a node. Unbound nodes read as slotless.
    pub fn binding(&self, id: ComponentId) -> &ComponentBinding {
        self.bindings.get(id).unwrap_or(&UNBOUND)
    }
}

impl Default for ComponentTree {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
