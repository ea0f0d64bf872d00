//! Port sessions: the per-conversation server-side object.
//!
//! A [`PortSession`] holds everything one addressable conversation
//! accumulates across exchanges: the action registry, pending action
//! parameters, the current [`StateFrame`], the root of the state tree, and
//! any nested port sessions. One exists per conversation path, created
//! lazily on first request and destroyed with the containing HTTP session.
//!
//! - [`registry`] — `Action` and `ActionRegistry`
//! - [`store`] — `SessionStore` with locking and expiry

pub mod registry;
pub mod store;

pub use registry::{Action, ActionRegistry};
pub use store::SessionStore;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::http::{self, PARAM_ACTION, PARAM_FRAME, PARAM_PORT};
use crate::state::frame::StateFrame;
use crate::state::tree::StateTree;

// ---------------------------------------------------------------------------
// PortSession
// ---------------------------------------------------------------------------

/// Per-conversation session state.
pub struct PortSession {
    path: String,
    callback_prefix: String,
    port_id: Option<String>,
    parent_path: Option<String>,
    registry: ActionRegistry,
    params: BTreeMap<String, Vec<String>>,
    frame: StateFrame,
    state: Option<StateTree>,
    ports: BTreeMap<String, PortSession>,
    created: Instant,
    touched: Instant,
}

impl PortSession {
    /// Create a fresh session for a conversation path.
    pub fn new(path: impl Into<String>, callback_prefix: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            path: path.into(),
            callback_prefix: callback_prefix.into(),
            port_id: None,
            parent_path: None,
            registry: ActionRegistry::new(),
            params: BTreeMap::new(),
            frame: StateFrame::initial(),
            state: None,
            ports: BTreeMap::new(),
            created: now,
            touched: now,
        }
    }

    /// The conversation path this session serves.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// This session's port identifier, when nested inside another port.
    pub fn port_id(&self) -> Option<&str> {
        self.port_id.as_deref()
    }

    /// The owning session's conversation path, when nested.
    pub fn parent_path(&self) -> Option<&str> {
        self.parent_path.as_deref()
    }

    // ── Frame ────────────────────────────────────────────────────────

    /// The current state frame.
    pub fn frame(&self) -> StateFrame {
        self.frame
    }

    /// Mint the next frame and make it current. Called exactly once per full
    /// render cycle.
    pub fn advance_frame(&mut self) -> StateFrame {
        self.frame = self.frame.next();
        tracing::trace!(path = %self.path, frame = %self.frame, "frame advanced");
        self.frame
    }

    // ── Actions ──────────────────────────────────────────────────────

    /// The action registry.
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Mutable access to the action registry.
    pub fn registry_mut(&mut self) -> &mut ActionRegistry {
        &mut self.registry
    }

    /// Register an action and return the callback URL that fires it.
    pub fn register_action(&mut self, action: Action) -> String {
        let url = self.callback_url(&action.name);
        self.registry.register(action);
        url
    }

    /// Build the callback URL for an action name under the current frame:
    /// action name, frame token, port identifier when nested, and every
    /// pending action parameter, in that order.
    pub fn callback_url(&self, name: &str) -> String {
        let mut pairs: Vec<(String, String)> = vec![
            (PARAM_ACTION.to_owned(), name.to_owned()),
            (PARAM_FRAME.to_owned(), self.frame.to_string()),
        ];
        if let Some(port) = &self.port_id {
            pairs.push((PARAM_PORT.to_owned(), port.clone()));
        }
        for (param, values) in &self.params {
            for value in values {
                pairs.push((param.clone(), value.clone()));
            }
        }
        let base = format!("{}{}", self.callback_prefix, self.path);
        http::append_query(&base, &pairs)
    }

    /// The URL addressing a nested port of this conversation.
    pub fn portlet_url(&self, port_id: &str) -> String {
        let base = format!("{}{}", self.callback_prefix, self.path);
        http::append_query(&base, &[(PARAM_PORT.to_owned(), port_id.to_owned())])
    }

    // ── Action parameters ────────────────────────────────────────────

    /// Set a pending action parameter, echoed verbatim into every
    /// subsequently generated callback URL until cleared.
    pub fn set_action_parameter(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.params.insert(name.into(), values);
    }

    /// Clear one pending action parameter.
    pub fn clear_action_parameter(&mut self, name: &str) {
        self.params.remove(name);
    }

    /// Clear all pending action parameters.
    pub fn clear_action_parameters(&mut self) {
        self.params.clear();
    }

    /// The pending action parameters as URL pairs, for redirect re-encoding.
    pub fn parameter_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (name, values) in &self.params {
            for value in values {
                pairs.push((name.clone(), value.clone()));
            }
        }
        pairs
    }

    // ── State tree ───────────────────────────────────────────────────

    /// Whether a state tree exists for this conversation.
    pub fn has_state(&self) -> bool {
        self.state.is_some()
    }

    /// Take the state tree out for a dispatch. The sequencer restores it on
    /// every exit path.
    pub fn take_state(&mut self) -> Option<StateTree> {
        self.state.take()
    }

    /// Put the state tree back after a dispatch.
    pub fn restore_state(&mut self, state: StateTree) {
        self.state = Some(state);
    }

    /// Read-only view of the state tree, if present.
    pub fn state(&self) -> Option<&StateTree> {
        self.state.as_ref()
    }

    // ── Nested ports ─────────────────────────────────────────────────

    /// The nested session for `port_id`, created lazily with a parent link.
    pub fn port_mut(&mut self, port_id: &str) -> &mut PortSession {
        if !self.ports.contains_key(port_id) {
            let mut child = PortSession::new(self.path.clone(), self.callback_prefix.clone());
            child.port_id = Some(port_id.to_owned());
            child.parent_path = Some(self.path.clone());
            tracing::debug!(path = %self.path, port = port_id, "nested port session created");
            self.ports.insert(port_id.to_owned(), child);
        }
        self.ports
            .get_mut(port_id)
            .expect("just inserted nested session")
    }

    /// An existing nested session, if any.
    pub fn port(&self, port_id: &str) -> Option<&PortSession> {
        self.ports.get(port_id)
    }

    // ── Lifetime ─────────────────────────────────────────────────────

    /// Record activity, for expiry accounting.
    pub fn touch(&mut self, now: Instant) {
        self.touched = now;
    }

    /// Time since the last activity.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.touched)
    }

    /// When the session was created.
    pub fn created_at(&self) -> Instant {
        self.created
    }
}

// ===========================================================================
// Tests
// ===========================================================================
