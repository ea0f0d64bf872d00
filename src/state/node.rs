//! State node types: StateId, StateNode, ControlState, GroupState.
//!
//! One state node exists per component per conversation. The component tree
//! carries what was declared; these nodes carry what the conversation has
//! done with it — buffered edits, errors, frame stamps, deferred commands.

use slotmap::new_key_type;

use crate::binding::Value;
use crate::state::frame::StateFrame;
use crate::tree::node::ComponentId;

new_key_type! {
    /// Unique identifier for a state node. Copy, lightweight (u64).
    pub struct StateId;
}

// ---------------------------------------------------------------------------
// ControlState
// ---------------------------------------------------------------------------

/// Buffered-value state for an input-bearing node.
///
/// The buffer is authoritative during a request cycle; it is synchronized
/// with the backing model only at explicit scatter/gather boundaries.
#[derive(Debug, Clone, Default)]
pub struct ControlState {
    /// The buffered value, in the control's target type.
    pub buffer: Value,
    /// The value most recently committed to (or read from) the model slot.
    pub committed: Value,
    /// Set when a gather pushed a changed buffer back to the model.
    pub updated: bool,
    /// Per-control input error, rendered inline. Recovered locally, never
    /// aborts the request.
    pub error: Option<String>,
    /// Wire field name: the declared name, or one assigned by the enclosing
    /// group's local-name counter at initialization.
    pub wire_name: Option<String>,
    /// Frame-scoped display cache; stale once the frame advances.
    pub display: Option<(StateFrame, String)>,
}

impl ControlState {
    /// Display text for the buffer, computed at most once per frame.
    pub fn display_for(&mut self, frame: StateFrame) -> String {
        match &self.display {
            Some((stamped, text)) if *stamped == frame => text.clone(),
            _ => {
                let text = self.buffer.display_text();
                self.display = Some((frame, text.clone()));
                text
            }
        }
    }
}

// ---------------------------------------------------------------------------
// GroupState
// ---------------------------------------------------------------------------

/// A command deferred during input processing, executed in the command phase
/// once data dependencies between sibling controls are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredCommand {
    /// Push the group buffer to the model (gather); transactional commits
    /// roll back as a unit if any descendant reported an error.
    Commit { transactional: bool },
    /// Re-read the group buffer from the model (scatter), discarding edits.
    Revert,
}

/// State for a grouping control.
///
/// The group's own buffer is the composite value its descendants assemble
/// bottom-up and decompose top-down.
#[derive(Debug, Clone)]
pub struct GroupState {
    /// The group's own buffered composite value.
    pub control: ControlState,
    /// Auto-incrementing counter naming unnamed child controls.
    local_names: u32,
    /// True if any descendant control currently reports an error.
    pub child_error: bool,
    /// Commands deferred until the command phase.
    pub deferred: Vec<DeferredCommand>,
}

impl GroupState {
    /// Fresh group state with an empty composite buffer. Buffer and
    /// committed start equal: a group with no edits has nothing to push.
    pub fn new() -> Self {
        Self {
            control: ControlState {
                buffer: Value::record(),
                committed: Value::record(),
                ..ControlState::default()
            },
            local_names: 0,
            child_error: false,
            deferred: Vec::new(),
        }
    }

    /// Hand out the next local name for an unnamed child control.
    pub fn next_local_name(&mut self) -> String {
        let name = format!("f{}", self.local_names);
        self.local_names += 1;
        name
    }

    /// Queue a command for the command phase.
    pub fn defer(&mut self, command: DeferredCommand) {
        self.deferred.push(command);
    }

    /// Queue a commit, folding into an already-queued one: a save directive
    /// upgrades a pending plain commit to transactional instead of queuing a
    /// second push.
    pub fn queue_commit(&mut self, transactional: bool) {
        for command in &mut self.deferred {
            if let DeferredCommand::Commit {
                transactional: queued,
            } = command
            {
                *queued = *queued || transactional;
                return;
            }
        }
        self.defer(DeferredCommand::Commit { transactional });
    }

    /// Queue a revert, cancelling any pending commit: discarding edits and
    /// pushing them cannot both happen.
    pub fn queue_revert(&mut self) {
        self.deferred
            .retain(|c| !matches!(c, DeferredCommand::Commit { .. }));
        if !self.deferred.contains(&DeferredCommand::Revert) {
            self.defer(DeferredCommand::Revert);
        }
    }

    /// Drain the deferred-command queue in order.
    pub fn take_deferred(&mut self) -> Vec<DeferredCommand> {
        std::mem::take(&mut self.deferred)
    }
}

impl Default for GroupState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// StateNode
// ---------------------------------------------------------------------------

/// Role-dependent payload of a state node.
#[derive(Debug, Clone)]
pub enum StateKind {
    /// Structural node, no buffered value.
    Plain,
    /// Input-bearing node.
    Control(ControlState),
    /// Grouping node.
    Group(GroupState),
}

/// One component's per-conversation state.
#[derive(Debug, Clone)]
pub struct StateNode {
    /// The component this state belongs to (behavior lookup).
    pub component: ComponentId,
    /// Frame last stamped onto this node; older than the session's current
    /// frame means cached values must be recomputed.
    pub frame: Option<StateFrame>,
    /// Error flag, independent of any control-level message.
    pub error: bool,
    /// Role-dependent payload.
    pub kind: StateKind,
    /// Lazily derived wire variable name (see `StateTree::variable_name`).
    pub(crate) variable: Option<String>,
}

impl StateNode {
    /// Create a state node for a component with the given payload.
    pub fn new(component: ComponentId, kind: StateKind) -> Self {
        Self {
            component,
            frame: None,
            error: false,
            kind,
            variable: None,
        }
    }

    /// The control state, for control and group nodes.
    pub fn control(&self) -> Option<&ControlState> {
        match &self.kind {
            StateKind::Control(c) => Some(c),
            StateKind::Group(g) => Some(&g.control),
            StateKind::Plain => None,
        }
    }

    /// Mutable control state, for control and group nodes.
    pub fn control_mut(&mut self) -> Option<&mut ControlState> {
        match &mut self.kind {
            StateKind::Control(c) => Some(c),
            StateKind::Group(g) => Some(&mut g.control),
            StateKind::Plain => None,
        }
    }

    /// The group state, for group nodes only.
    pub fn group(&self) -> Option<&GroupState> {
        match &self.kind {
            StateKind::Group(g) => Some(g),
            _ => None,
        }
    }

    /// Mutable group state, for group nodes only.
    pub fn group_mut(&mut self) -> Option<&mut GroupState> {
        match &mut self.kind {
            StateKind::Group(g) => Some(g),
            _ => None,
        }
    }

    /// Whether this node is a grouping node.
    pub fn is_group(&self) -> bool {
        matches!(self.kind, StateKind::Group(_))
    }

    /// Whether this node's stamp matches `frame`.
    pub fn fresh(&self, frame: StateFrame) -> bool {
        self.frame == Some(frame)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use crate::tree::node::ComponentId;

    fn make_component() -> ComponentId {
        let mut sm: SlotMap<ComponentId, ()> = SlotMap::with_key();
        sm.insert(())
    }

    #[test]
    fn control_accessors() {
        let cid = make_component();
        let mut node = StateNode::new(cid, StateKind::Control(ControlState::default()));
        assert!(node.control().is_some());
        assert!(node.group().is_none());
        assert!(!node.is_group());
        node.control_mut().unwrap().buffer = Value::Int(3);
        assert_eq!(node.control().unwrap().buffer, Value::Int(3));
    }

    #[test]
    fn group_exposes_its_control_state() {
        let cid = make_component();
        let mut node = StateNode::new(cid, StateKind::Group(GroupState::new()));
        assert!(node.is_group());
        assert!(node.control().is_some());
        node.control_mut().unwrap().buffer.set_field("a", Value::Int(1));
        assert_eq!(
            node.group().unwrap().control.buffer.field("a"),
            Value::Int(1)
        );
    }

    #[test]
    fn plain_has_no_control() {
        let cid = make_component();
        let node = StateNode::new(cid, StateKind::Plain);
        assert!(node.control().is_none());
        assert!(node.group().is_none());
    }

    #[test]
    fn local_names_increment() {
        let mut group = GroupState::new();
        assert_eq!(group.next_local_name(), "f0");
        assert_eq!(group.next_local_name(), "f1");
        assert_eq!(group.next_local_name(), "f2");
    }

    #[test]
    fn deferred_commands_drain_in_order() {
        let mut group = GroupState::new();
        group.defer(DeferredCommand::Revert);
        group.defer(DeferredCommand::Commit {
            transactional: true,
        });
        let drained = group.take_deferred();
        assert_eq!(
            drained,
            vec![
                DeferredCommand::Revert,
                DeferredCommand::Commit {
                    transactional: true
                }
            ]
        );
        assert!(group.take_deferred().is_empty());
    }

    #[test]
    fn queue_commit_folds_and_upgrades() {
        let mut group = GroupState::new();
        group.queue_commit(false);
        group.queue_commit(true);
        group.queue_commit(false);
        assert_eq!(
            group.take_deferred(),
            vec![DeferredCommand::Commit {
                transactional: true
            }]
        );
    }

    #[test]
    fn queue_revert_cancels_pending_commit() {
        let mut group = GroupState::new();
        group.queue_commit(false);
        group.queue_revert();
        group.queue_revert();
        assert_eq!(group.take_deferred(), vec![DeferredCommand::Revert]);
    }

    #[test]
    fn display_cache_is_frame_scoped() {
        let mut control = ControlState {
            buffer: Value::Int(42),
            ..ControlState::default()
        };
        let f1 = StateFrame::initial();
        assert_eq!(control.display_for(f1), "42");
        // A mutation without a frame advance reuses the cache.
        control.buffer = Value::Int(7);
        assert_eq!(control.display_for(f1), "42");
        // The next frame recomputes.
        assert_eq!(control.display_for(f1.next()), "7");
    }

    #[test]
    fn fresh_tracks_stamp() {
        let cid = make_component();
        let mut node = StateNode::new(cid, StateKind::Plain);
        let f1 = StateFrame::initial();
        assert!(!node.fresh(f1));
        node.frame = Some(f1);
        assert!(node.fresh(f1));
        assert!(!node.fresh(f1.next()));
    }
}
