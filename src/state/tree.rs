//! State tree: the per-conversation mutable mirror of a component tree.
//!
//! Shape invariant: the state tree mirrors the component tree exactly (same
//! child cardinality and ordering) for the lifetime of a conversation. The
//! blueprint version it was built against is recorded; when the component
//! tree is recompiled the conversation's state tree no longer
//! [`matches`](StateTree::matches) and is rebuilt from scratch.

use slotmap::{SecondaryMap, SlotMap};

use super::frame::StateFrame;
use super::node::{ControlState, GroupState, StateId, StateKind, StateNode};
use crate::tree::node::Role;
use crate::tree::path::TreePath;
use crate::tree::tree::ComponentTree;
use crate::tree::ComponentId;

/// Empty slice constant for returning when a node has no children.
const EMPTY_CHILDREN: &[StateId] = &[];

// ---------------------------------------------------------------------------
// StateTree
// ---------------------------------------------------------------------------

/// Per-conversation state arena, addressed by the same child-index paths as
/// the component tree.
#[derive(Debug)]
pub struct StateTree {
    nodes: SlotMap<StateId, StateNode>,
    children: SecondaryMap<StateId, Vec<StateId>>,
    parent: SecondaryMap<StateId, StateId>,
    index: SecondaryMap<StateId, usize>,
    root: StateId,
    blueprint_version: u64,
}

impl StateTree {
    /// Build a fresh state tree mirroring `tree`.
    ///
    /// The payload of each node follows the component's role: controls get a
    /// [`ControlState`], groups a [`GroupState`], everything else is plain.
    ///
    /// # Panics
    ///
    /// Panics if `tree` has no root; bound trees always have one.
    pub fn for_tree(tree: &ComponentTree) -> Self {
        let root_component = tree.root().expect("bound tree has a root");
        let mut nodes = SlotMap::with_key();
        let mut children = SecondaryMap::new();
        let mut parent = SecondaryMap::new();
        let mut index = SecondaryMap::new();

        let root = Self::mirror(
            tree,
            root_component,
            None,
            0,
            &mut nodes,
            &mut children,
            &mut parent,
            &mut index,
        );

        Self {
            nodes,
            children,
            parent,
            index,
            root,
            blueprint_version: tree.version(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn mirror(
        tree: &ComponentTree,
        component: ComponentId,
        parent_state: Option<StateId>,
        child_index: usize,
        nodes: &mut SlotMap<StateId, StateNode>,
        children: &mut SecondaryMap<StateId, Vec<StateId>>,
        parent: &mut SecondaryMap<StateId, StateId>,
        index: &mut SecondaryMap<StateId, usize>,
    ) -> StateId {
        let role = tree
            .get(component)
            .map(|data| data.role)
            .unwrap_or(Role::Generic);
        let kind = match role {
            Role::Control => StateKind::Control(ControlState::default()),
            Role::Group => StateKind::Group(GroupState::new()),
            Role::Root | Role::Generic => StateKind::Plain,
        };
        let id = nodes.insert(StateNode::new(component, kind));
        children.insert(id, Vec::with_capacity(tree.children(component).len()));
        if let Some(p) = parent_state {
            parent.insert(id, p);
            index.insert(id, child_index);
            children
                .get_mut(p)
                .expect("parent must have children vec")
                .push(id);
        }
        for (i, &child) in tree.children(component).iter().enumerate() {
            Self::mirror(tree, child, Some(id), i, nodes, children, parent, index);
        }
        id
    }

    /// The root state node.
    pub fn root(&self) -> StateId {
        self.root
    }

    /// The blueprint version this state tree was built against.
    pub fn blueprint_version(&self) -> u64 {
        self.blueprint_version
    }

    /// Whether this state tree still matches the given component tree.
    pub fn matches(&self, tree: &ComponentTree) -> bool {
        self.blueprint_version == tree.version()
    }

    /// Immutable access to a state node.
    pub fn get(&self, id: StateId) -> Option<&StateNode> {
        self.nodes.get(id)
    }

    /// Mutable access to a state node.
    pub fn get_mut(&mut self, id: StateId) -> Option<&mut StateNode> {
        self.nodes.get_mut(id)
    }

    /// The parent of a state node, if it has one.
    pub fn parent(&self, id: StateId) -> Option<StateId> {
        self.parent.get(id).copied()
    }

    /// The children of a state node, mirroring component declaration order.
    pub fn children(&self, id: StateId) -> &[StateId] {
        self.children
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(EMPTY_CHILDREN)
    }

    /// Number of state nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree is empty (never true for a built tree).
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The tree path addressing `id` from the root.
    pub fn path_of(&self, id: StateId) -> TreePath {
        let mut indices = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent.get(current).copied() {
            indices.push(self.index.get(current).copied().unwrap_or(0));
            current = parent;
        }
        indices.reverse();
        TreePath::from_indices(&indices)
    }

    /// Resolve a tree path to a state node, `None` if any step dangles.
    pub fn resolve(&self, path: &TreePath) -> Option<StateId> {
        let mut current = self.root;
        for &index in path.indices() {
            current = self.children(current).get(index).copied()?;
        }
        Some(current)
    }

    /// The wire variable name for a node, derived lazily from its tree path
    /// (`"v"` for the root, `"v1_0"` for path `1.0`) and cached for the
    /// conversation's lifetime.
    pub fn variable_name(&mut self, id: StateId) -> String {
        if let Some(node) = self.nodes.get(id) {
            if let Some(name) = &node.variable {
                return name.clone();
            }
        }
        let path = self.path_of(id);
        let mut name = String::from("v");
        for (i, index) in path.indices().iter().enumerate() {
            if i > 0 {
                name.push('_');
            }
            name.push_str(&index.to_string());
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.variable = Some(name.clone());
        }
        name
    }

    /// Stamp the current frame onto every node, once per render cycle.
    pub fn stamp_all(&mut self, frame: StateFrame) {
        for (_, node) in self.nodes.iter_mut() {
            node.frame = Some(frame);
        }
    }

    /// The nearest enclosing group of `id`, using the distance precomputed at
    /// bind time — a fixed number of parent hops, never a search.
    pub fn nearest_group(&self, tree: &ComponentTree, id: StateId) -> Option<StateId> {
        let component = self.nodes.get(id)?.component;
        let distance = tree.binding(component).group_distance?;
        let mut current = id;
        for _ in 0..distance {
            current = self.parent(current)?;
        }
        Some(current)
    }

    /// Record a per-control input error and aggregate it upward: every
    /// enclosing group's error flag is set, transitively, so the UI can
    /// signal failure without committing partial writes.
    pub fn report_error(
        &mut self,
        tree: &ComponentTree,
        id: StateId,
        message: impl Into<String>,
    ) {
        let message = message.into();
        if let Some(node) = self.nodes.get_mut(id) {
            node.error = true;
            if let Some(control) = node.control_mut() {
                control.error = Some(message);
            }
        }
        let mut group = self.nearest_group(tree, id);
        while let Some(gid) = group {
            if let Some(gs) = self.nodes.get_mut(gid).and_then(StateNode::group_mut) {
                gs.child_error = true;
            }
            group = self.nearest_group(tree, gid);
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
