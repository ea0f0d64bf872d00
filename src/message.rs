//! Messages: the closed set of phase signals dispatched through the tree.
//!
//! One [`Message`] variant exists per sequencer phase. Components interpret
//! each according to their role; there is no open message hierarchy.

/// A phase signal carried to the tree along an explicit delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// First dispatch after state-tree construction, pre-order, so components
    /// can register permanent actions and allocate substructure.
    Initialize,
    /// Per-request context read, multicast before actions run.
    Request,
    /// A fired action, delivered point-to-point along its stored target path.
    Action {
        /// The fired action's registry name.
        name: String,
    },
    /// Refresh display-bound values from the model, multicast. Groups scatter
    /// here.
    Prepare,
    /// Execute commands deferred during earlier phases, multicast.
    Command,
    /// Emit markup and register next-cycle callbacks, multicast.
    Render,
}

impl Message {
    /// Human-readable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Initialize => "Initialize",
            Message::Request => "Request",
            Message::Action { .. } => "Action",
            Message::Prepare => "Prepare",
            Message::Command => "Command",
            Message::Render => "Render",
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
