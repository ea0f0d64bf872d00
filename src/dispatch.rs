//! Dispatch: explicit context threading and tree delivery orders.
//!
//! Everything a dispatch needs — the inbound request, the synchronization
//! status, the current frame, the pinned-group stack, the ambient transaction
//! — travels in a [`DispatchContext`] passed down explicitly; there is no
//! thread-local state. The [`Dispatcher`] walks a message through the state
//! tree either multicast (pre-order, ancestors before descendants) or
//! point-to-point along a stored [`TreePath`].

use std::collections::VecDeque;
use std::sync::Arc;

use crate::binding::{SlotRef, Value};
use crate::controls::{Behavior, BehaviorRegistry};
use crate::http::Request;
use crate::message::Message;
use crate::session::PortSession;
use crate::state::frame::{StateFrame, SyncStatus};
use crate::state::node::{ControlState, GroupState, StateId, StateNode};
use crate::state::tree::StateTree;
use crate::transaction::{Completion, Transaction};
use crate::tree::node::{ComponentData, ComponentId};
use crate::tree::path::TreePath;
use crate::tree::tree::{ComponentBinding, ComponentTree};

// ---------------------------------------------------------------------------
// DispatchError
// ---------------------------------------------------------------------------

/// A behavior failed in a way the phase boundary must surface.
///
/// Per-control input errors never become this — they are stored on control
/// state and rendered inline. This is for genuine faults, caught at the
/// phase boundary and logged with the acting component's declaration context.
#[derive(Debug, thiserror::Error)]
#[error("dispatch failed at {context}: {message}")]
pub struct DispatchError {
    /// Declaration context of the acting component.
    pub context: String,
    /// What went wrong.
    pub message: String,
}

impl DispatchError {
    /// Build an error with the given component context.
    pub fn new(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchContext
// ---------------------------------------------------------------------------

/// Per-request context threaded through every behavior hook.
pub struct DispatchContext<'req> {
    /// The inbound request.
    pub request: &'req Request,
    /// How the request relates to the session's current frame. Out-of-sync
    /// requests may want a stale-page affordance in the render.
    pub status: SyncStatus,
    /// The frame the render cycle runs under.
    pub frame: StateFrame,
    /// Rendered body, accumulated during the render phase.
    pub body: String,
    /// Upload size limit, from the engine configuration.
    pub upload_limit: usize,
    /// Whether the action currently firing was registered transactional.
    pub transactional: bool,
    redirect: Option<String>,
    queued: VecDeque<String>,
    groups: Vec<StateId>,
    transaction: Option<Transaction>,
}

impl<'req> DispatchContext<'req> {
    /// Create a context for one request cycle.
    pub fn new(
        request: &'req Request,
        status: SyncStatus,
        frame: StateFrame,
        upload_limit: usize,
    ) -> Self {
        Self {
            request,
            status,
            frame,
            body: String::new(),
            upload_limit,
            transactional: false,
            redirect: None,
            queued: VecDeque::new(),
            groups: Vec::new(),
            transaction: None,
        }
    }

    /// Append markup to the response body.
    pub fn write(&mut self, markup: &str) {
        self.body.push_str(markup);
    }

    // ── Redirect ─────────────────────────────────────────────────────

    /// Request a redirect. Later phases' side effects will not run. The
    /// first redirect wins.
    pub fn redirect_to(&mut self, target: impl Into<String>) {
        if self.redirect.is_none() {
            self.redirect = Some(target.into());
        }
    }

    /// The requested redirect target, if any.
    pub fn redirect(&self) -> Option<&str> {
        self.redirect.as_deref()
    }

    // ── Action chaining ──────────────────────────────────────────────

    /// Enqueue a follow-up action; the action phase loops until the queue
    /// drains.
    pub fn enqueue_action(&mut self, name: impl Into<String>) {
        self.queued.push_back(name.into());
    }

    /// Drain the queued follow-up action names.
    pub fn drain_queued(&mut self) -> Vec<String> {
        self.queued.drain(..).collect()
    }

    // ── Pinned groups ────────────────────────────────────────────────

    /// Pin a group's buffer for its descendants. Called by the dispatcher's
    /// traversal, paired with [`pop_group`](Self::pop_group).
    pub fn push_group(&mut self, id: StateId) {
        self.groups.push(id);
    }

    /// Unpin the innermost group.
    pub fn pop_group(&mut self) {
        self.groups.pop();
    }

    /// The innermost pinned group, the dynamically-scoped buffer a control
    /// writes through.
    pub fn innermost_group(&self) -> Option<StateId> {
        self.groups.last().copied()
    }

    // ── Ambient transaction ──────────────────────────────────────────

    /// Whether an ambient transaction is running.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Start the ambient transaction if none is running; a second
    /// transactional commit in the same dispatch joins the running one.
    pub fn ensure_transaction(&mut self) {
        if self.transaction.is_none() {
            self.transaction = Some(Transaction::begin());
        }
    }

    /// Record a slot's prior value into the ambient transaction, if one is
    /// running.
    pub fn record_write(&mut self, slot: SlotRef, prior: Value) {
        if let Some(txn) = &mut self.transaction {
            txn.record(slot, prior);
        }
    }

    /// Mark the ambient transaction for rollback, if one is running.
    pub fn mark_rollback(&mut self) {
        if let Some(txn) = &mut self.transaction {
            txn.mark_rollback();
        }
    }

    /// The running ambient transaction, if any.
    pub fn active_transaction(&mut self) -> Option<&mut Transaction> {
        self.transaction.as_mut()
    }

    /// Complete the ambient transaction once the message dispatch finishes.
    pub fn complete_transaction(&mut self) -> Option<Completion> {
        self.transaction.take().map(Transaction::complete)
    }
}

// ---------------------------------------------------------------------------
// Visit
// ---------------------------------------------------------------------------

/// One behavior invocation's view of the dispatch: the visited node plus
/// borrows of everything it may touch.
pub struct Visit<'a, 'req> {
    /// The visited state node.
    pub id: StateId,
    /// Its component.
    pub component: ComponentId,
    /// The shared component tree.
    pub tree: &'a ComponentTree,
    /// The conversation's state tree.
    pub state: &'a mut StateTree,
    /// The conversation's session.
    pub session: &'a mut PortSession,
    /// The per-request context.
    pub ctx: &'a mut DispatchContext<'req>,
}

impl Visit<'_, '_> {
    /// The visited node's declaration data.
    pub fn data(&self) -> &ComponentData {
        self.tree
            .get(self.component)
            .expect("state node's component exists")
    }

    /// The visited node's binding.
    pub fn binding(&self) -> &ComponentBinding {
        self.tree.binding(self.component)
    }

    /// The visited node's model slot, if bound.
    pub fn slot(&self) -> Option<SlotRef> {
        self.binding().slot.clone()
    }

    /// The visited node's state.
    pub fn node(&self) -> &StateNode {
        self.state.get(self.id).expect("visited state node exists")
    }

    /// Mutable state of the visited node.
    pub fn node_mut(&mut self) -> &mut StateNode {
        self.state
            .get_mut(self.id)
            .expect("visited state node exists")
    }

    /// Mutable control state, for control and group nodes.
    pub fn control_mut(&mut self) -> Option<&mut ControlState> {
        self.node_mut().control_mut()
    }

    /// Mutable group state, for group nodes.
    pub fn group_mut(&mut self) -> Option<&mut GroupState> {
        self.node_mut().group_mut()
    }

    /// The visited node's tree path.
    pub fn path(&self) -> TreePath {
        self.state.path_of(self.id)
    }

    /// The visited node's wire variable name.
    pub fn variable_name(&mut self) -> String {
        self.state.variable_name(self.id)
    }

    /// Record a per-control input error and aggregate it to enclosing
    /// groups.
    pub fn report_error(&mut self, message: impl Into<String>) {
        self.state.report_error(self.tree, self.id, message);
    }

    /// Build a [`DispatchError`] carrying this component's declaration
    /// context.
    pub fn fail(&self, message: impl Into<String>) -> DispatchError {
        DispatchError::new(self.data().describe(), message)
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Walks messages through the state tree.
pub struct Dispatcher<'a, 'req> {
    /// The shared component tree.
    pub tree: &'a ComponentTree,
    /// Behavior lookup by component type name.
    pub behaviors: &'a BehaviorRegistry,
    /// The conversation's state tree.
    pub state: &'a mut StateTree,
    /// The conversation's session.
    pub session: &'a mut PortSession,
    /// The per-request context.
    pub ctx: &'a mut DispatchContext<'req>,
}

impl<'req> Dispatcher<'_, 'req> {
    /// Multicast `msg` to every node, pre-order: each node's hook runs after
    /// its `before_children` and before any descendant, `after_children`
    /// runs once the subtree is done.
    pub fn multicast(&mut self, msg: &Message) -> Result<(), DispatchError> {
        let root = self.state.root();
        self.deliver(root, msg)
    }

    /// Deliver `msg` point-to-point to the node at `path`. Nodes along the
    /// path get their `before_children`/`after_children` hooks (so groups pin
    /// their buffers), but only the target's phase hook runs. A dangling path
    /// is logged and skipped: it is ordinary traffic from a since-replaced
    /// tree, not a fault.
    pub fn to_path(&mut self, path: &TreePath, msg: &Message) -> Result<(), DispatchError> {
        let root = self.state.root();
        self.deliver_along(root, path.indices(), msg)
    }

    fn deliver(&mut self, id: StateId, msg: &Message) -> Result<(), DispatchError> {
        let (component, behavior) = self.resolve(id);
        behavior.before_children(&mut self.visit(id, component), msg)?;
        behavior.handle(&mut self.visit(id, component), msg)?;
        for child in self.state.children(id).to_vec() {
            self.deliver(child, msg)?;
        }
        behavior.after_children(&mut self.visit(id, component), msg)?;
        Ok(())
    }

    fn deliver_along(
        &mut self,
        id: StateId,
        remaining: &[usize],
        msg: &Message,
    ) -> Result<(), DispatchError> {
        let (component, behavior) = self.resolve(id);
        behavior.before_children(&mut self.visit(id, component), msg)?;
        match remaining.split_first() {
            None => {
                behavior.handle(&mut self.visit(id, component), msg)?;
            }
            Some((&index, rest)) => match self.state.children(id).get(index).copied() {
                Some(child) => self.deliver_along(child, rest, msg)?,
                None => {
                    tracing::warn!(
                        message = msg.name(),
                        index,
                        "target path dangles, skipping delivery"
                    );
                }
            },
        }
        behavior.after_children(&mut self.visit(id, component), msg)?;
        Ok(())
    }

    fn resolve(&self, id: StateId) -> (ComponentId, Arc<dyn Behavior>) {
        let component = self
            .state
            .get(id)
            .expect("dispatched state node exists")
            .component;
        let type_name = self
            .tree
            .get(component)
            .map(|data| data.type_name.as_str())
            .unwrap_or_default();
        (component, self.behaviors.resolve(type_name))
    }

    fn visit<'s>(&'s mut self, id: StateId, component: ComponentId) -> Visit<'s, 'req> {
        Visit {
            id,
            component,
            tree: self.tree,
            state: self.state,
            session: self.session,
            ctx: self.ctx,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
