//! Root behavior: page wrapper, frame embedding, stale affordance.

use super::behavior::Behavior;
use crate::dispatch::{DispatchError, Visit};
use crate::message::Message;
use crate::state::frame::SyncStatus;

/// The tree root.
///
/// Wraps the rendered body, embeds the current frame token so every
/// follow-up request can be classified, and surfaces the out-of-sync flag as
/// a visible notice.
pub struct PortRoot;

impl Behavior for PortRoot {
    fn render(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        let frame = v.ctx.frame;
        v.ctx.write(&format!(
            "<div class=\"port\"><input type=\"hidden\" name=\"lrs\" value=\"{frame}\"/>"
        ));
        if v.ctx.status == SyncStatus::OutOfSync {
            v.ctx
                .write("<p class=\"stale\">This page was out of date and has been refreshed.</p>");
        }
        Ok(())
    }

    fn after_children(
        &self,
        v: &mut Visit<'_, '_>,
        msg: &Message,
    ) -> Result<(), DispatchError> {
        if matches!(msg, Message::Render) {
            v.ctx.write("</div>");
        }
        Ok(())
    }
}
