//! FieldGroup: scatter/gather grouping with transactional commits.
//!
//! A group pins its composite buffer for all descendant controls for the
//! duration of one message dispatch, so multi-field records are assembled
//! bottom-up and decomposed top-down:
//!
//! - **scatter** (pre-order, before children): read the model value into the
//!   buffer, replacing any leftover partial edit, and reset the group's own
//!   error flag. Runs during the prepare phase and on an explicit revert.
//! - **gather** (post-order, after children): if the buffer differs from the
//!   last committed value, push it back to the model slot and mark the value
//!   updated. Input read during the request phase queues the gather as a
//!   deferred commit, executed in the command phase once sibling data
//!   dependencies are resolved; a save directive upgrades it to
//!   transactional, a revert cancels it.
//!
//! A save registered as transactional commits under the ambient transaction:
//! any descendant error marks it for rollback and the whole composite edit
//! is withdrawn as a unit.

use super::behavior::Behavior;
use super::escape;
use crate::binding::Value;
use crate::dispatch::{DispatchError, Visit};
use crate::message::Message;
use crate::session::Action;
use crate::state::frame::SyncStatus;
use crate::state::node::{DeferredCommand, GroupState, StateId, StateNode};
use crate::state::tree::StateTree;
use crate::transaction::Transaction;
use crate::tree::tree::ComponentTree;

// ---------------------------------------------------------------------------
// Scatter / gather
// ---------------------------------------------------------------------------

/// Scatter: model → buffer.
///
/// Replaces whatever a prior partial edit left in the buffer and resets the
/// group's own error state. The descendant-error aggregation flag is managed
/// per request cycle and is not touched here.
pub fn scatter_group(tree: &ComponentTree, state: &mut StateTree, id: StateId) {
    let Some(component) = state.get(id).map(|n| n.component) else {
        return;
    };
    let fetched = tree.binding(component).slot.as_ref().map(|slot| slot.get());
    let Some(node) = state.get_mut(id) else {
        return;
    };
    node.error = false;
    let Some(group) = node.group_mut() else {
        return;
    };
    if let Some(value) = fetched {
        let value = match value {
            Value::Null => Value::record(),
            other => other,
        };
        group.control.buffer = value.clone();
        group.control.committed = value;
    }
    group.control.updated = false;
    group.control.error = None;
}

/// Gather: buffer → model.
///
/// Pushes only when the buffer differs from the last committed value, and
/// never while a descendant reports an error — no partial writes. Returns
/// whether the model was updated. Under a transaction, the slot's prior
/// value is recorded before the write and any failure marks rollback.
pub fn gather_group(
    tree: &ComponentTree,
    state: &mut StateTree,
    id: StateId,
    mut txn: Option<&mut Transaction>,
) -> bool {
    let Some(component) = state.get(id).map(|n| n.component) else {
        return false;
    };
    let Some(slot) = tree.binding(component).slot.clone() else {
        return false;
    };
    let Some((buffer, committed, child_error)) = state
        .get(id)
        .and_then(StateNode::group)
        .map(|g| (g.control.buffer.clone(), g.control.committed.clone(), g.child_error))
    else {
        return false;
    };

    if child_error {
        if let Some(txn) = txn.as_deref_mut() {
            txn.mark_rollback();
        }
        return false;
    }
    if buffer == committed {
        return false;
    }

    if let Some(txn) = txn.as_deref_mut() {
        txn.record(slot.clone(), slot.get());
    }
    match slot.set(buffer.clone()) {
        Ok(()) => {
            if let Some(group) = state.get_mut(id).and_then(StateNode::group_mut) {
                group.control.committed = buffer;
                group.control.updated = true;
            }
            true
        }
        Err(err) => {
            state.report_error(tree, id, err.message);
            if let Some(txn) = txn.as_deref_mut() {
                txn.mark_rollback();
            }
            false
        }
    }
}

// ---------------------------------------------------------------------------
// FieldGroup
// ---------------------------------------------------------------------------

/// The grouping control.
pub struct FieldGroup;

impl FieldGroup {
    fn base_name(v: &mut Visit<'_, '_>) -> String {
        match v.data().name.clone() {
            Some(name) => name,
            None => v.variable_name(),
        }
    }
}

impl Behavior for FieldGroup {
    fn before_children(
        &self,
        v: &mut Visit<'_, '_>,
        msg: &Message,
    ) -> Result<(), DispatchError> {
        v.ctx.push_group(v.id);
        match msg {
            // A fresh input cycle re-aggregates descendant errors.
            Message::Request => {
                if let Some(group) = v.group_mut() {
                    group.child_error = false;
                }
            }
            // Scatter replaces a PRIOR cycle's leftover partial edit. Input
            // buffered this cycle is awaiting its deferred commit and must
            // not be clobbered.
            Message::Prepare => {
                let pending_commit = v.node().group().is_some_and(|g| {
                    g.deferred
                        .iter()
                        .any(|c| matches!(c, DeferredCommand::Commit { .. }))
                });
                if !pending_commit {
                    scatter_group(v.tree, v.state, v.id);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn after_children(
        &self,
        v: &mut Visit<'_, '_>,
        msg: &Message,
    ) -> Result<(), DispatchError> {
        match msg {
            // Post-order gather, deferred to the command phase so data
            // dependencies between sibling controls resolve first. A stale
            // request buffers input but never re-applies it to the model.
            Message::Request => {
                if v.ctx.status != SyncStatus::OutOfSync {
                    if let Some(group) = v.group_mut() {
                        if group.control.buffer != group.control.committed {
                            group.queue_commit(false);
                        }
                    }
                }
            }
            Message::Render => v.ctx.write("</fieldset>"),
            _ => {}
        }
        v.ctx.pop_group();
        Ok(())
    }

    fn on_action(&self, v: &mut Visit<'_, '_>, name: &str) -> Result<(), DispatchError> {
        let base = Self::base_name(v);
        if name == format!("{base}.save") {
            let transactional = v.ctx.transactional;
            if let Some(group) = v.group_mut() {
                group.queue_commit(transactional);
            }
        } else if name == format!("{base}.revert") {
            if let Some(group) = v.group_mut() {
                group.queue_revert();
            }
        }
        Ok(())
    }

    fn on_command(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        let commands = v
            .group_mut()
            .map(GroupState::take_deferred)
            .unwrap_or_default();
        for command in commands {
            match command {
                DeferredCommand::Commit { transactional } => {
                    if transactional {
                        v.ctx.ensure_transaction();
                        gather_group(v.tree, v.state, v.id, v.ctx.active_transaction());
                    } else {
                        gather_group(v.tree, v.state, v.id, None);
                    }
                }
                DeferredCommand::Revert => scatter_group(v.tree, v.state, v.id),
            }
        }
        Ok(())
    }

    fn render(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        let var = v.variable_name();
        let invalid = v
            .node()
            .group()
            .is_some_and(|g| g.child_error);
        v.ctx.write(&format!(
            "<fieldset name=\"{var}\"{}>",
            if invalid { " class=\"invalid\"" } else { "" }
        ));

        let base = Self::base_name(v);
        let path = v.path();
        let transactional = v.data().transactional;
        let save_url = v.session.register_action(
            Action::responsive(format!("{base}.save"), path.clone()).transactional(transactional),
        );
        let revert_url = v
            .session
            .register_action(Action::responsive(format!("{base}.revert"), path));
        v.ctx.write(&format!(
            "<a class=\"save\" href=\"{}\">save</a><a class=\"revert\" href=\"{}\">revert</a>",
            escape(&save_url),
            escape(&revert_url)
        ));
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{MapBinder, MapModel};
    use crate::transaction::Completion;
    use crate::tree::node::{ComponentData, Role};

    /// One group (`expr=order`) with one text field; the model starts with a
    /// committed record.
    fn fixture() -> (ComponentTree, StateTree, MapModel, StateId) {
        let model = MapModel::new();
        let mut record = Value::record();
        record.set_field("name", Value::text("Ada"));
        model.set("order", record);

        let mut tree = ComponentTree::new();
        let root = tree.insert_root(ComponentData::new("Port").role(Role::Root));
        let group = tree.insert_child(
            root,
            ComponentData::new("FieldGroup")
                .role(Role::Group)
                .with_name("order")
                .with_expr("order"),
        );
        tree.insert_child(
            group,
            ComponentData::new("TextField")
                .role(Role::Control)
                .with_name("name")
                .with_expr("name"),
        );
        tree.bind(&MapBinder::new(model.clone())).unwrap();

        let state = StateTree::for_tree(&tree);
        let gid = {
            let root = state.root();
            state.children(root)[0]
        };
        (tree, state, model, gid)
    }

    fn scatter(tree: &ComponentTree, state: &mut StateTree, gid: StateId) {
        scatter_group(tree, state, gid);
    }

    #[test]
    fn scatter_reads_model_into_buffer() {
        let (tree, mut state, _model, gid) = fixture();
        scatter(&tree, &mut state, gid);
        let group = state.get(gid).unwrap().group().unwrap();
        assert_eq!(group.control.buffer.field("name"), Value::text("Ada"));
        assert_eq!(group.control.committed, group.control.buffer);
        assert!(!group.control.updated);
    }

    #[test]
    fn scatter_replaces_partial_edit() {
        let (tree, mut state, _model, gid) = fixture();
        scatter(&tree, &mut state, gid);
        state
            .get_mut(gid)
            .unwrap()
            .group_mut()
            .unwrap()
            .control
            .buffer
            .set_field("name", Value::text("partial"));
        scatter(&tree, &mut state, gid);
        let group = state.get(gid).unwrap().group().unwrap();
        assert_eq!(group.control.buffer.field("name"), Value::text("Ada"));
    }

    #[test]
    fn gather_untouched_buffer_is_a_noop() {
        let (tree, mut state, model, gid) = fixture();
        scatter(&tree, &mut state, gid);
        let updated = gather_group(&tree, &mut state, gid, None);
        assert!(!updated);
        assert!(!state.get(gid).unwrap().group().unwrap().control.updated);
        assert_eq!(model.get("order").field("name"), Value::text("Ada"));
    }

    #[test]
    fn gather_pushes_mutated_buffer_once() {
        let (tree, mut state, model, gid) = fixture();
        scatter(&tree, &mut state, gid);
        state
            .get_mut(gid)
            .unwrap()
            .group_mut()
            .unwrap()
            .control
            .buffer
            .set_field("name", Value::text("Grace"));

        let updated = gather_group(&tree, &mut state, gid, None);
        assert!(updated);
        assert_eq!(model.get("order").field("name"), Value::text("Grace"));
        assert!(state.get(gid).unwrap().group().unwrap().control.updated);

        // Gathering again without further edits is a no-op.
        let again = gather_group(&tree, &mut state, gid, None);
        assert!(!again);
    }

    #[test]
    fn gather_skips_on_descendant_error() {
        let (tree, mut state, model, gid) = fixture();
        scatter(&tree, &mut state, gid);
        let field = state.children(gid)[0];
        state
            .get_mut(gid)
            .unwrap()
            .group_mut()
            .unwrap()
            .control
            .buffer
            .set_field("name", Value::text("Grace"));
        state.report_error(&tree, field, "rejected");

        let updated = gather_group(&tree, &mut state, gid, None);
        assert!(!updated);
        assert_eq!(model.get("order").field("name"), Value::text("Ada"));
    }

    #[test]
    fn transactional_gather_rolls_back_on_error() {
        let (tree, mut state, model, gid) = fixture();
        scatter(&tree, &mut state, gid);
        let field = state.children(gid)[0];
        state
            .get_mut(gid)
            .unwrap()
            .group_mut()
            .unwrap()
            .control
            .buffer
            .set_field("name", Value::text("Grace"));
        state.report_error(&tree, field, "rejected");

        let mut txn = Transaction::begin();
        gather_group(&tree, &mut state, gid, Some(&mut txn));
        assert!(txn.is_marked());
        assert_eq!(txn.complete(), Completion::RolledBack);
        assert_eq!(model.get("order").field("name"), Value::text("Ada"));
    }

    #[test]
    fn transactional_gather_records_prior_value() {
        let (tree, mut state, model, gid) = fixture();
        scatter(&tree, &mut state, gid);
        state
            .get_mut(gid)
            .unwrap()
            .group_mut()
            .unwrap()
            .control
            .buffer
            .set_field("name", Value::text("Grace"));

        let mut txn = Transaction::begin();
        let updated = gather_group(&tree, &mut state, gid, Some(&mut txn));
        assert!(updated);
        assert_eq!(txn.recorded(), 1);
        assert_eq!(model.get("order").field("name"), Value::text("Grace"));
        // A later rollback (another group errored) withdraws this write too.
        txn.mark_rollback();
        txn.complete();
        assert_eq!(model.get("order").field("name"), Value::text("Ada"));
    }

    #[test]
    fn gather_reports_slot_rejection_on_the_group() {
        let (tree, mut state, model, gid) = fixture();
        scatter(&tree, &mut state, gid);
        // Force a shape the slot will reject.
        state.get_mut(gid).unwrap().group_mut().unwrap().control.buffer = Value::Int(3);

        let updated = gather_group(&tree, &mut state, gid, None);
        assert!(!updated);
        let group = state.get(gid).unwrap();
        assert!(group.error);
        assert!(group.control().unwrap().error.is_some());
        assert_eq!(model.get("order").field("name"), Value::text("Ada"));
    }
}
