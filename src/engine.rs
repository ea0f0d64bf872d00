//! Engine: trees, sessions, behaviors, and the single request entry point.
//!
//! One [`Engine`] serves a set of mounted component trees. Each inbound
//! request resolves to a tree and a session; the session's lock is held for
//! the entire phase sequence, so concurrent requests against the same
//! conversation (double-click, two tabs) serialize. Out-of-band exchanges
//! (`oob`) bypass the phase sequence entirely.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::binding::BindError;
use crate::config::EngineConfig;
use crate::controls::BehaviorRegistry;
use crate::http::{Request, Response};
use crate::sequencer::Sequencer;
use crate::session::store::{SessionHandle, SessionStore};
use crate::tree::tree::ComponentTree;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The UI delivery engine.
pub struct Engine {
    config: EngineConfig,
    behaviors: BehaviorRegistry,
    trees: RwLock<HashMap<String, Arc<ComponentTree>>>,
    port_trees: RwLock<HashMap<(String, String), Arc<ComponentTree>>>,
    sessions: SessionStore,
}

impl Engine {
    /// Create an engine with the built-in behaviors.
    pub fn new(config: EngineConfig) -> Self {
        let sessions = SessionStore::new(
            config.session_lifetime(),
            config.callback_prefix.clone(),
        );
        Self {
            config,
            behaviors: BehaviorRegistry::with_defaults(),
            trees: RwLock::new(HashMap::new()),
            port_trees: RwLock::new(HashMap::new()),
            sessions,
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Mutable access to the behavior registry, for registering custom
    /// controls before serving traffic.
    pub fn behaviors_mut(&mut self) -> &mut BehaviorRegistry {
        &mut self.behaviors
    }

    /// The session store (expiry sweeps are the embedder's schedule).
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// The session serving a conversation path, if one exists.
    pub fn session(&self, path: &str) -> Option<SessionHandle> {
        self.sessions.peek(path)
    }

    /// Mount a bound component tree at a conversation path.
    pub fn mount(&self, path: impl Into<String>, tree: ComponentTree) -> Result<(), BindError> {
        if !tree.is_bound() {
            return Err(BindError::NotBound);
        }
        let path = path.into();
        tracing::info!(path = %path, version = tree.version(), "tree mounted");
        self.trees
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(path, Arc::new(tree));
        Ok(())
    }

    /// Mount a bound component tree for a nested port of a conversation
    /// path.
    pub fn mount_port(
        &self,
        path: impl Into<String>,
        port_id: impl Into<String>,
        tree: ComponentTree,
    ) -> Result<(), BindError> {
        if !tree.is_bound() {
            return Err(BindError::NotBound);
        }
        self.port_trees
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert((path.into(), port_id.into()), Arc::new(tree));
        Ok(())
    }

    /// The tree mounted at a path, if any.
    pub fn tree(&self, path: &str) -> Option<Arc<ComponentTree>> {
        self.trees
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(path)
            .map(Arc::clone)
    }

    fn port_tree(&self, path: &str, port_id: &str) -> Option<Arc<ComponentTree>> {
        self.port_trees
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&(path.to_owned(), port_id.to_owned()))
            .map(Arc::clone)
    }

    /// Handle one request: resolve the tree and session, serialize on the
    /// session, and run the phase sequence. The lock is released on every
    /// exit path, including a failed dispatch.
    pub fn handle(&self, request: &Request) -> Response {
        if let Some(oob) = request.oob() {
            return self.handle_oob(request, oob);
        }
        let Some(tree) = self.tree(&request.path) else {
            tracing::debug!(path = %request.path, "no tree mounted");
            return Response::not_found();
        };

        let handle = self.sessions.obtain(&request.path);
        // A poisoned lock means an earlier dispatch panicked; the session
        // data is still the best state there is, so recover it rather than
        // wedge the conversation.
        let mut session = handle.lock().unwrap_or_else(|p| p.into_inner());
        session.touch(Instant::now());

        match request.port_id() {
            Some(port_id) => {
                let Some(port_tree) = self.port_tree(&request.path, port_id) else {
                    tracing::debug!(path = %request.path, port = port_id, "no port tree mounted");
                    return Response::not_found();
                };
                let child = session.port_mut(port_id);
                Sequencer::new(&port_tree, &self.behaviors, &self.config).run(child, request)
            }
            None => Sequencer::new(&tree, &self.behaviors, &self.config).run(&mut session, request),
        }
    }

    /// Out-of-band exchanges bypass the phase sequence. `oob=ping` is the
    /// session-liveness probe: remaining lifetime in milliseconds, plain
    /// text.
    fn handle_oob(&self, request: &Request, oob: &str) -> Response {
        match oob {
            "ping" => {
                let remaining = self
                    .sessions
                    .remaining_lifetime(&request.path, Instant::now())
                    .unwrap_or(Duration::ZERO);
                Response::text(200, remaining.as_millis().to_string())
            }
            other => Response::text(400, format!("unknown out-of-band request `{other}`")),
        }
    }
}

/// The diagnostic page for a tree that failed to bind.
///
/// Bind failures abort tree construction and are never retried per-request;
/// this page is what the embedder serves from the affected route instead.
/// With diagnostics enabled the fault chain is included, source by source.
pub fn bind_failure_page(err: &BindError, dev_diagnostics: bool) -> Response {
    let mut response = Response::text(500, String::new());
    response.content_type = Some("text/html; charset=utf-8".to_owned());
    response.body.push_str("<h1>Page failed to build</h1>");
    if dev_diagnostics {
        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
        response.body.push_str("<ol class=\"fault-chain\">");
        while let Some(fault) = source {
            response
                .body
                .push_str(&format!("<li>{}</li>", crate::controls::escape(&fault.to_string())));
            source = fault.source();
        }
        response.body.push_str("</ol>");
    }
    response
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use crate::binding::{BindError, MapBinder, MapModel};
    use crate::http::{PARAM_FRAME, PARAM_OOB, PARAM_PORT};
    use crate::tree::node::{ComponentData, Role};

    fn bound_tree() -> ComponentTree {
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

    #[test]
    fn bind_failure_page_lists_the_fault_chain_in_dev_mode() {
        let mut tree = ComponentTree::new();
        let root = tree.insert_root(ComponentData::new("Port").role(Role::Root));
        tree.insert_child(
            root,
            ComponentData::new("TextField")
                .role(Role::Control)
                .with_expr("nmae")
                .with_context("order.tmpl:5"),
        );
        let binder = MapBinder::new(MapModel::new()).with_schema(["name"]);
        let err = tree.bind(&binder).unwrap_err();

        let page = bind_failure_page(&err, true);
        assert_eq!(page.status, 500);
        assert!(page.body.contains("order.tmpl:5"));
        assert!(page.body.contains("nmae"));

        let opaque = bind_failure_page(&err, false);
        assert!(!opaque.body.contains("nmae"));
    }

    #[test]
    fn unmounted_path_is_not_found() {
        let engine = Engine::new(EngineConfig::default());
        let response = engine.handle(&Request::get("/nowhere"));
        assert_eq!(response.status, 404);
    }

    #[test]
    fn mount_rejects_unbound_tree() {
        let engine = Engine::new(EngineConfig::default());
        let mut tree = ComponentTree::new();
        tree.insert_root(ComponentData::new("Port").role(Role::Root));
        assert!(matches!(
            engine.mount("/p", tree),
            Err(BindError::NotBound)
        ));
    }

    #[test]
    fn handle_creates_session_and_renders() {
        let engine = Engine::new(EngineConfig::default());
        engine.mount("/p", bound_tree()).unwrap();
        let response = engine.handle(&Request::get("/p"));
        assert_eq!(response.status, 200);
        assert!(response.body.contains("lrs"));
        assert!(engine.session("/p").is_some());
        assert_eq!(engine.sessions().len(), 1);
    }

    #[test]
    fn oob_ping_reports_remaining_lifetime() {
        let engine = Engine::new(
            EngineConfig::default().with_session_lifetime(Duration::from_secs(60)),
        );
        engine.mount("/p", bound_tree()).unwrap();
        engine.handle(&Request::get("/p"));
        let response = engine.handle(&Request::get("/p").with_param(PARAM_OOB, "ping"));
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type.as_deref(), Some("text/plain"));
        let millis: u128 = response.body.parse().unwrap();
        assert!(millis > 0 && millis <= 60_000);
    }

    #[test]
    fn oob_ping_without_session_reports_zero() {
        let engine = Engine::new(EngineConfig::default());
        let response = engine.handle(&Request::get("/p").with_param(PARAM_OOB, "ping"));
        assert_eq!(response.body, "0");
        // The probe never creates a session.
        assert!(engine.session("/p").is_none());
    }

    #[test]
    fn oob_unknown_marker_is_rejected() {
        let engine = Engine::new(EngineConfig::default());
        let response = engine.handle(&Request::get("/p").with_param(PARAM_OOB, "mystery"));
        assert_eq!(response.status, 400);
    }

    #[test]
    fn nested_port_routes_to_child_session() {
        let engine = Engine::new(EngineConfig::default());
        engine.mount("/p", bound_tree()).unwrap();
        engine.mount_port("/p", "side", bound_tree()).unwrap();

        engine.handle(&Request::get("/p"));
        let response = engine.handle(&Request::get("/p").with_param(PARAM_PORT, "side"));
        assert_eq!(response.status, 200);
        // The child renders callback URLs addressed at itself.
        assert!(response.body.contains("port=side"));

        let handle = engine.session("/p").unwrap();
        let session = handle.lock().unwrap();
        assert!(session.port("side").is_some());
    }

    #[test]
    fn unknown_port_is_not_found() {
        let engine = Engine::new(EngineConfig::default());
        engine.mount("/p", bound_tree()).unwrap();
        let response = engine.handle(&Request::get("/p").with_param(PARAM_PORT, "ghost"));
        assert_eq!(response.status, 404);
    }

    #[test]
    fn concurrent_requests_serialize_on_one_session() {
        let engine = Arc::new(Engine::new(EngineConfig::default()));
        engine.mount("/p", bound_tree()).unwrap();
        engine.handle(&Request::get("/p"));

        let mut workers = Vec::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            workers.push(thread::spawn(move || {
                engine.handle(&Request::get("/p").with_param(PARAM_FRAME, "F1"))
            }));
        }
        for worker in workers {
            let response = worker.join().unwrap();
            assert_eq!(response.status, 200);
        }
        // One session absorbed all eight cycles: frame advanced every time.
        let handle = engine.session("/p").unwrap();
        let session = handle.lock().unwrap();
        assert_eq!(session.frame().to_string(), "F9");
    }
}
