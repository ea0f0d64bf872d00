//! UploadField: upload intake with size limiting.

use super::behavior::Behavior;
use super::escape;
use crate::binding::Value;
use crate::dispatch::{DispatchError, Visit};
use crate::state::node::StateNode;

/// Accepts uploaded content submitted under this control's wire name.
///
/// A size-limit violation is a per-control input error, rendered inline like
/// any other rejected value.
pub struct UploadField;

impl Behavior for UploadField {
    fn on_request(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        let var = v.variable_name();
        let Some(upload) = v.ctx.request.upload.as_ref().filter(|u| u.field == var) else {
            return Ok(());
        };
        let size = upload.content.len();
        let file_name = upload.file_name.clone();
        if size > v.ctx.upload_limit {
            let limit = v.ctx.upload_limit;
            v.report_error(format!("upload of {size} bytes exceeds the {limit} byte limit"));
            return Ok(());
        }
        if let Some(control) = v.control_mut() {
            control.error = None;
            control.buffer = Value::text(file_name.clone());
        }
        if let Some(gid) = v.ctx.innermost_group() {
            let field = v
                .node()
                .control()
                .and_then(|c| c.wire_name.clone())
                .unwrap_or(var);
            if let Some(group) = v.state.get_mut(gid).and_then(StateNode::group_mut) {
                group.control.buffer.set_field(field, Value::text(file_name));
            }
        }
        Ok(())
    }

    fn render(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        let var = v.variable_name();
        let error = v.node().control().and_then(|c| c.error.clone());
        v.ctx
            .write(&format!("<input type=\"file\" name=\"{var}\"/>"));
        if let Some(message) = error {
            v.ctx
                .write(&format!("<em class=\"error\">{}</em>", escape(&message)));
        }
        Ok(())
    }
}
