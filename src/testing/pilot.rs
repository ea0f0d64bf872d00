//! Pilot: programmatic conversation traffic against a headless engine.
//!
//! The `Pilot` wraps an [`Engine`](crate::engine::Engine) around one mounted
//! tree and provides methods to simulate a conversation: open it, fire
//! actions under the current frame, replay stale URLs, and inspect each
//! exchange's rendered body and embedded frame token.

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::http::{Request, Response, PARAM_ACTION, PARAM_FRAME};
use crate::tree::tree::ComponentTree;

// ---------------------------------------------------------------------------
// Pilot
// ---------------------------------------------------------------------------

/// A headless conversation driver for testing.
///
/// # Examples
///
/// ```ignore
/// let mut pilot = Pilot::new(tree, "/order/123");
/// pilot.open();
/// assert_eq!(pilot.lrs(), Some("F1"));
/// pilot.fire("submit");
/// ```
pub struct Pilot {
    engine: Engine,
    path: String,
    last: Option<Response>,
    lrs: Option<String>,
}

impl Pilot {
    /// Mount a bound tree at `path` on an engine with default config.
    ///
    /// # Panics
    ///
    /// Panics if the tree is not bound; bind before building the pilot.
    pub fn new(tree: ComponentTree, path: &str) -> Self {
        Self::with_config(tree, path, EngineConfig::default())
    }

    /// Mount a bound tree at `path` with the given engine config.
    pub fn with_config(tree: ComponentTree, path: &str, config: EngineConfig) -> Self {
        let engine = Engine::new(config);
        engine
            .mount(path, tree)
            .expect("pilot requires a bound tree");
        Self {
            engine,
            path: path.to_owned(),
            last: None,
            lrs: None,
        }
    }

    /// The engine, for mounting extra trees or inspecting sessions.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Mutable engine access, for registering custom behaviors.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// The conversation path this pilot drives.
    pub fn path(&self) -> &str {
        &self.path
    }

    // ── Traffic ──────────────────────────────────────────────────────

    /// Send an arbitrary request and record the exchange.
    pub fn request(&mut self, request: Request) -> &Response {
        let response = self.engine.handle(&request);
        self.lrs = extract_frame_token(&response.body);
        self.last = Some(response);
        self.last.as_ref().expect("exchange just recorded")
    }

    /// First request of the conversation: no frame token.
    pub fn open(&mut self) -> &Response {
        let request = Request::get(&self.path);
        self.request(request)
    }

    /// Fire an action under the current frame, like clicking a freshly
    /// rendered link.
    pub fn fire(&mut self, action: &str) -> &Response {
        let mut request = Request::get(&self.path).with_param(PARAM_ACTION, action);
        if let Some(lrs) = &self.lrs {
            request = request.with_param(PARAM_FRAME, lrs.clone());
        }
        self.request(request)
    }

    /// Fire an action under the current frame with submitted field values
    /// (wire variable name → raw text), like submitting a form.
    pub fn fire_with_fields(&mut self, action: &str, fields: &[(&str, &str)]) -> &Response {
        let mut request = Request::post(&self.path).with_param(PARAM_ACTION, action);
        if let Some(lrs) = &self.lrs {
            request = request.with_param(PARAM_FRAME, lrs.clone());
        }
        for (name, value) in fields {
            request = request.with_body_param(*name, *value);
        }
        self.request(request)
    }

    /// Submit field values without firing any action.
    pub fn submit_fields(&mut self, fields: &[(&str, &str)]) -> &Response {
        let mut request = Request::post(&self.path);
        if let Some(lrs) = &self.lrs {
            request = request.with_param(PARAM_FRAME, lrs.clone());
        }
        for (name, value) in fields {
            request = request.with_body_param(*name, *value);
        }
        self.request(request)
    }

    /// Replay an action under an explicit (typically stale) frame token,
    /// like resubmitting a bookmarked URL.
    pub fn replay(&mut self, action: &str, lrs: &str) -> &Response {
        let request = Request::get(&self.path)
            .with_param(PARAM_ACTION, action)
            .with_param(PARAM_FRAME, lrs);
        self.request(request)
    }

    // ── Inspection ───────────────────────────────────────────────────

    /// The last exchange's response.
    pub fn response(&self) -> Option<&Response> {
        self.last.as_ref()
    }

    /// The last exchange's rendered body.
    pub fn body(&self) -> &str {
        self.last.as_ref().map(|r| r.body.as_str()).unwrap_or("")
    }

    /// The frame token embedded in the last render, if any.
    pub fn lrs(&self) -> Option<&str> {
        self.lrs.as_deref()
    }
}

/// Pull the embedded frame token out of a rendered body.
fn extract_frame_token(body: &str) -> Option<String> {
    let marker = "name=\"lrs\" value=\"";
    let start = body.find(marker)? + marker.len();
    let rest = &body[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_owned())
}

// ===========================================================================
// Tests
// ===========================================================================
