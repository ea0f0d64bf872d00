//! The phase sequencer: one state machine execution per inbound request.
//!
//! ```text
//! INIT → REQUEST → ACTION(loop) → [FRAME-ADVANCE] → PREPARE → COMMAND → RENDER → DONE
//! ```
//!
//! The sequencer classifies the request against the session's current frame,
//! drives the phases in order, and is terminal on the first redirect or
//! unrecoverable error. Out-of-sync requests are a defined recovery path:
//! stale responsive actions are discarded and processing continues; they are
//! never an error.

use std::collections::VecDeque;

use crate::config::EngineConfig;
use crate::controls::BehaviorRegistry;
use crate::dispatch::{DispatchContext, DispatchError, Dispatcher};
use crate::http::{self, Request, Response};
use crate::message::Message;
use crate::session::PortSession;
use crate::state::frame::{classify, SyncStatus};
use crate::state::tree::StateTree;
use crate::transaction::Completion;
use crate::tree::path::TreePath;
use crate::tree::tree::ComponentTree;

/// Upper bound on actions fired in one cycle, against runaway programmatic
/// chaining.
const MAX_FIRED_ACTIONS: usize = 256;

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

/// Drives one request through the phase sequence against one session.
pub struct Sequencer<'a> {
    tree: &'a ComponentTree,
    behaviors: &'a BehaviorRegistry,
    config: &'a EngineConfig,
}

impl<'a> Sequencer<'a> {
    /// Create a sequencer over a mounted tree.
    pub fn new(
        tree: &'a ComponentTree,
        behaviors: &'a BehaviorRegistry,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            tree,
            behaviors,
            config,
        }
    }

    /// Run the full phase sequence. The caller holds the session lock for
    /// the entire call; the state tree is taken out for the dispatch and
    /// restored on every exit path.
    pub fn run(&self, session: &mut PortSession, request: &Request) -> Response {
        let status = classify(session.frame(), request.frame_token());
        let span = tracing::debug_span!("dispatch", path = %session.path(), ?status);
        let _entered = span.enter();

        let mut frame_advanced = false;
        if status == SyncStatus::OutOfSync {
            // Stale render: discard single-use actions before the action
            // phase, and advance the frame immediately instead of at its
            // normal point.
            session.registry_mut().clear_responsive();
            session.advance_frame();
            frame_advanced = true;
            tracing::debug!("out-of-sync request, responsive actions discarded");
        }

        let (mut state, initialized) = match session.take_state() {
            Some(existing) if existing.matches(self.tree) => (existing, false),
            Some(stale) => {
                // The blueprint was recompiled: every stored target path is
                // suspect, so the whole registry goes with the state tree.
                tracing::info!(
                    old = stale.blueprint_version(),
                    new = self.tree.version(),
                    "blueprint changed, rebuilding conversation state"
                );
                session.registry_mut().clear();
                (StateTree::for_tree(self.tree), true)
            }
            None => (StateTree::for_tree(self.tree), true),
        };

        let mut ctx = DispatchContext::new(
            request,
            status,
            session.frame(),
            self.config.upload_limit,
        );
        let outcome =
            self.run_phases(&mut state, session, &mut ctx, initialized, &mut frame_advanced);
        session.restore_state(state);

        match outcome {
            Ok(()) => match ctx.redirect() {
                Some(target) => {
                    let location = http::append_query(target, &session.parameter_pairs());
                    tracing::debug!(location = %location, "redirecting");
                    Response::redirect(location)
                }
                None => {
                    let mut response = Response::ok();
                    response.content_type = Some("text/html; charset=utf-8".to_owned());
                    // Output is conversation- and frame-dependent.
                    response
                        .headers
                        .push(("Cache-Control".to_owned(), "no-cache".to_owned()));
                    response.body = std::mem::take(&mut ctx.body);
                    response
                }
            },
            Err(err) => {
                tracing::error!(context = %err.context, error = %err.message, "dispatch failed");
                let body = if self.config.dev_diagnostics {
                    format!("internal error: {err}")
                } else {
                    "internal error".to_owned()
                };
                Response::text(500, body)
            }
        }
    }

    fn run_phases(
        &self,
        state: &mut StateTree,
        session: &mut PortSession,
        ctx: &mut DispatchContext<'_>,
        initialized: bool,
        frame_advanced: &mut bool,
    ) -> Result<(), DispatchError> {
        // INIT: a fresh state tree gets one Initialize dispatch, ancestors
        // before descendants, so components can register permanent actions.
        if initialized {
            self.multicast(state, session, ctx, &Message::Initialize)?;
        }

        // REQUEST
        self.multicast(state, session, ctx, &Message::Request)?;
        if ctx.redirect().is_some() {
            return Ok(());
        }

        // ACTION: fire every identifier in the request, draining any
        // programmatically chained identifiers until quiet.
        self.fire_actions(state, session, ctx)?;
        session.registry_mut().clear_responsive();
        if ctx.redirect().is_some() {
            return Ok(());
        }

        // FRAME-ADVANCE: exactly once per cycle; request-lifetime caches go
        // stale here so prepare and render recompute fresh values.
        if !*frame_advanced {
            session.advance_frame();
            *frame_advanced = true;
        }
        ctx.frame = session.frame();

        // PREPARE
        self.multicast(state, session, ctx, &Message::Prepare)?;
        if ctx.redirect().is_some() {
            return Ok(());
        }

        // COMMAND, then complete any ambient transaction the commands ran
        // under.
        self.multicast(state, session, ctx, &Message::Command)?;
        if let Some(Completion::RolledBack) = ctx.complete_transaction() {
            tracing::debug!("transactional commit rolled back");
        }
        if ctx.redirect().is_some() {
            return Ok(());
        }

        // RENDER
        state.stamp_all(ctx.frame);
        self.multicast(state, session, ctx, &Message::Render)?;
        Ok(())
    }

    fn fire_actions(
        &self,
        state: &mut StateTree,
        session: &mut PortSession,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<(), DispatchError> {
        let mut pending: VecDeque<String> = ctx
            .request
            .action_names()
            .into_iter()
            .map(str::to_owned)
            .collect();
        let mut fired = 0usize;
        while let Some(name) = pending.pop_front() {
            let actions = session.registry().lookup(&name);
            if actions.is_empty() {
                // Reachable via ordinary stale-bookmark traffic: a no-op.
                tracing::debug!(action = %name, "unknown action ignored");
                continue;
            }
            for action in actions {
                fired += 1;
                if fired > MAX_FIRED_ACTIONS {
                    tracing::warn!(limit = MAX_FIRED_ACTIONS, "action chain limit hit");
                    return Ok(());
                }
                ctx.transactional = action.transactional;
                self.to_path(
                    state,
                    session,
                    ctx,
                    &action.target,
                    &Message::Action { name: name.clone() },
                )?;
            }
            ctx.transactional = false;
            for queued in ctx.drain_queued() {
                pending.push_back(queued);
            }
        }
        Ok(())
    }

    fn multicast(
        &self,
        state: &mut StateTree,
        session: &mut PortSession,
        ctx: &mut DispatchContext<'_>,
        msg: &Message,
    ) -> Result<(), DispatchError> {
        Dispatcher {
            tree: self.tree,
            behaviors: self.behaviors,
            state,
            session,
            ctx,
        }
        .multicast(msg)
    }

    fn to_path(
        &self,
        state: &mut StateTree,
        session: &mut PortSession,
        ctx: &mut DispatchContext<'_>,
        path: &TreePath,
        msg: &Message,
    ) -> Result<(), DispatchError> {
        Dispatcher {
            tree: self.tree,
            behaviors: self.behaviors,
            state,
            session,
            ctx,
        }
        .to_path(path, msg)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::binding::{MapBinder, MapModel};
    use crate::controls::Behavior;
    use crate::dispatch::Visit;
    use crate::http::PARAM_FRAME;
    use crate::tree::node::{ComponentData, Role};

    fn simple_tree() -> ComponentTree {
        let mut tree = ComponentTree::new();
        let root = tree.insert_root(ComponentData::new("Port").role(Role::Root));
        tree.insert_child(
            root,
            ComponentData::new("ActionLink")
                .role(Role::Control)
                .with_name("go"),
        );
        tree.bind(&MapBinder::new(MapModel::new())).unwrap();
        tree
    }

    fn run_once(
        tree: &ComponentTree,
        session: &mut PortSession,
        request: &Request,
    ) -> Response {
        let behaviors = BehaviorRegistry::with_defaults();
        let config = EngineConfig::default();
        Sequencer::new(tree, &behaviors, &config).run(session, request)
    }

    #[test]
    fn first_request_renders_frame_one() {
        let tree = simple_tree();
        let mut session = PortSession::new("/p", "");
        let response = run_once(&tree, &mut session, &Request::get("/p"));
        assert_eq!(response.status, 200);
        assert!(response.body.contains("name=\"lrs\" value=\"F1\""));
        assert_eq!(response.header("cache-control"), Some("no-cache"));
        assert!(session.has_state());
    }

    #[test]
    fn responsive_cycle_advances_frame() {
        let tree = simple_tree();
        let mut session = PortSession::new("/p", "");
        run_once(&tree, &mut session, &Request::get("/p"));
        let second = Request::get("/p").with_param(PARAM_FRAME, "F1");
        let response = run_once(&tree, &mut session, &second);
        assert!(response.body.contains("value=\"F2\""));
        assert!(!response.body.contains("class=\"stale\""));
    }

    #[test]
    fn stale_request_shows_affordance_and_advances() {
        let tree = simple_tree();
        let mut session = PortSession::new("/p", "");
        run_once(&tree, &mut session, &Request::get("/p"));
        run_once(
            &tree,
            &mut session,
            &Request::get("/p").with_param(PARAM_FRAME, "F1"),
        );
        // Replay the first render's token.
        let replay = Request::get("/p").with_param(PARAM_FRAME, "F1");
        let response = run_once(&tree, &mut session, &replay);
        assert!(response.body.contains("class=\"stale\""));
        assert!(response.body.contains("value=\"F3\""));
    }

    #[test]
    fn blueprint_change_rebuilds_state_and_clears_registry() {
        let tree = simple_tree();
        let mut session = PortSession::new("/p", "");
        run_once(&tree, &mut session, &Request::get("/p"));
        assert!(session.registry().contains("go"));

        let mut recompiled = ComponentTree::new().with_version(1);
        let root = recompiled.insert_root(ComponentData::new("Port").role(Role::Root));
        recompiled.insert_child(
            root,
            ComponentData::new("ActionLink")
                .role(Role::Control)
                .with_name("go"),
        );
        recompiled.bind(&MapBinder::new(MapModel::new())).unwrap();

        let request = Request::get("/p").with_param(PARAM_FRAME, "F1");
        run_once(&recompiled, &mut session, &request);
        assert_eq!(
            session.state().unwrap().blueprint_version(),
            1,
        );
    }

    /// A behavior that redirects during the request phase.
    struct RedirectOnRequest;

    impl Behavior for RedirectOnRequest {
        fn on_request(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
            v.ctx.redirect_to("/elsewhere");
            Ok(())
        }
    }

    #[test]
    fn redirect_short_circuits_render() {
        let mut tree = ComponentTree::new();
        tree.insert_root(ComponentData::new("Redirector").role(Role::Root));
        tree.bind(&MapBinder::new(MapModel::new())).unwrap();

        let mut behaviors = BehaviorRegistry::with_defaults();
        behaviors.register("Redirector", Arc::new(RedirectOnRequest));
        let config = EngineConfig::default();
        let mut session = PortSession::new("/p", "");
        session.set_action_parameter("ctx", vec!["7".to_owned()]);

        let request = Request::get("/p");
        let response = Sequencer::new(&tree, &behaviors, &config).run(&mut session, &request);
        assert_eq!(response.status, 303);
        // Pending action parameters ride along on the redirect.
        assert_eq!(response.header("location"), Some("/elsewhere?ctx=7"));
        assert!(response.body.is_empty());
        // The state tree still comes back.
        assert!(session.has_state());
    }

    /// A behavior that fails during the prepare phase.
    struct FailOnPrepare;

    impl Behavior for FailOnPrepare {
        fn on_prepare(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
            Err(v.fail("backing store unavailable"))
        }
    }

    #[test]
    fn dispatch_failure_surfaces_as_500() {
        let mut tree = ComponentTree::new();
        tree.insert_root(
            ComponentData::new("Faulty")
                .role(Role::Root)
                .with_context("faulty.tmpl:1"),
        );
        tree.bind(&MapBinder::new(MapModel::new())).unwrap();

        let mut behaviors = BehaviorRegistry::with_defaults();
        behaviors.register("Faulty", Arc::new(FailOnPrepare));
        let config = EngineConfig::default().with_dev_diagnostics(true);
        let mut session = PortSession::new("/p", "");

        let response =
            Sequencer::new(&tree, &behaviors, &config).run(&mut session, &Request::get("/p"));
        assert_eq!(response.status, 500);
        assert!(response.body.contains("faulty.tmpl:1"));
        // Guaranteed cleanup: the session got its state tree back.
        assert!(session.has_state());
    }

    #[test]
    fn opaque_errors_without_dev_diagnostics() {
        let mut tree = ComponentTree::new();
        tree.insert_root(ComponentData::new("Faulty").role(Role::Root));
        tree.bind(&MapBinder::new(MapModel::new())).unwrap();

        let mut behaviors = BehaviorRegistry::with_defaults();
        behaviors.register("Faulty", Arc::new(FailOnPrepare));
        let config = EngineConfig::default();
        let mut session = PortSession::new("/p", "");

        let response =
            Sequencer::new(&tree, &behaviors, &config).run(&mut session, &Request::get("/p"));
        assert_eq!(response.status, 500);
        assert_eq!(response.body, "internal error");
    }

    /// A behavior whose action chains a follow-up action.
    struct Chainer;

    impl Behavior for Chainer {
        fn on_initialize(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
            let path = v.path();
            v.session
                .register_action(crate::session::Action::permanent("first", path.clone()));
            v.session
                .register_action(crate::session::Action::permanent("second", path));
            Ok(())
        }

        fn on_action(&self, v: &mut Visit<'_, '_>, name: &str) -> Result<(), DispatchError> {
            if name == "first" {
                v.ctx.enqueue_action("second");
            }
            if let Some(control) = v.control_mut() {
                let n = match control.buffer {
                    crate::binding::Value::Int(n) => n,
                    _ => 0,
                };
                control.buffer = crate::binding::Value::Int(n + 1);
            }
            Ok(())
        }
    }

    #[test]
    fn action_phase_drains_chained_actions() {
        let mut tree = ComponentTree::new();
        let root = tree.insert_root(ComponentData::new("Port").role(Role::Root));
        tree.insert_child(root, ComponentData::new("Chainer").role(Role::Control));
        tree.bind(&MapBinder::new(MapModel::new())).unwrap();

        let mut behaviors = BehaviorRegistry::with_defaults();
        behaviors.register("Chainer", Arc::new(Chainer));
        let config = EngineConfig::default();
        let mut session = PortSession::new("/p", "");

        Sequencer::new(&tree, &behaviors, &config).run(&mut session, &Request::get("/p"));
        let request = Request::get("/p")
            .with_param("action", "first")
            .with_param(PARAM_FRAME, "F1");
        Sequencer::new(&tree, &behaviors, &config).run(&mut session, &request);

        // Both the fired action and its chained follow-up dispatched.
        let state = session.state().unwrap();
        let chainer = state.children(state.root())[0];
        assert_eq!(
            state.get(chainer).unwrap().control().unwrap().buffer,
            crate::binding::Value::Int(2)
        );
    }
}
