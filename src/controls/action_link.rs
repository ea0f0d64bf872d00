//! ActionLink: exposes a named callback and renders its URL.
//!
//! A responsive link re-registers its action at every render, so replaying a
//! stale URL finds nothing to fire. A permanent link registers once at
//! initialization and stays invocable from bookmarks.

use super::behavior::Behavior;
use super::escape;
use crate::binding::Value;
use crate::dispatch::{DispatchError, Visit};
use crate::session::Action;

/// A link firing a registered action.
pub struct ActionLink;

impl ActionLink {
    fn action_name(v: &mut Visit<'_, '_>) -> String {
        match v.data().name.clone() {
            Some(name) => name,
            None => v.variable_name(),
        }
    }

    /// How many times this link's action has fired in this conversation.
    /// Kept in the control buffer.
    fn bump_fired(v: &mut Visit<'_, '_>) {
        if let Some(control) = v.control_mut() {
            let fired = match control.buffer {
                Value::Int(n) => n,
                _ => 0,
            };
            control.buffer = Value::Int(fired + 1);
        }
    }
}

impl Behavior for ActionLink {
    fn on_initialize(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        if v.data().permanent {
            let name = Self::action_name(v);
            let path = v.path();
            let transactional = v.data().transactional;
            v.session
                .register_action(Action::permanent(name, path).transactional(transactional));
        }
        Ok(())
    }

    fn on_action(&self, v: &mut Visit<'_, '_>, name: &str) -> Result<(), DispatchError> {
        tracing::debug!(action = name, path = %v.path(), "action link fired");
        Self::bump_fired(v);
        Ok(())
    }

    fn render(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        let name = Self::action_name(v);
        let url = if v.data().permanent {
            // Registered once at initialization; only the URL is rebuilt so
            // it carries the current frame.
            v.session.callback_url(&name)
        } else {
            let path = v.path();
            let transactional = v.data().transactional;
            v.session
                .register_action(Action::responsive(name.clone(), path).transactional(transactional))
        };
        v.ctx.write(&format!(
            "<a href=\"{}\">{}</a>",
            escape(&url),
            escape(&name)
        ));
        Ok(())
    }
}
