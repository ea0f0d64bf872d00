//! TextField: a buffered input control with type conversion.
//!
//! Submitted wire text is parsed into the control's target type during the
//! request phase. Inside a group, the parsed value is written through the
//! innermost pinned group buffer; a solo field synchronizes its own slot.
//! Conversion failures are recovered locally: the raw text stays in the
//! buffer for redisplay and the error message renders inline.

use super::behavior::Behavior;
use super::escape;
use crate::binding::Value;
use crate::dispatch::{DispatchError, Visit};
use crate::state::node::StateNode;

/// Buffered single-value input.
pub struct TextField;

impl TextField {
    /// The field name this control writes into a group buffer: the declared
    /// name, or the one assigned at initialization.
    fn field_name(v: &mut Visit<'_, '_>) -> String {
        if let Some(control) = v.node().control() {
            if let Some(name) = &control.wire_name {
                return name.clone();
            }
        }
        v.variable_name()
    }
}

impl Behavior for TextField {
    fn on_initialize(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        // Named fields keep their declared name; unnamed ones draw from the
        // enclosing group's local-name counter.
        let assigned = match v.data().name.clone() {
            Some(name) => name,
            None => match v.state.nearest_group(v.tree, v.id) {
                Some(gid) => v
                    .state
                    .get_mut(gid)
                    .and_then(StateNode::group_mut)
                    .map(|g| g.next_local_name())
                    .unwrap_or_else(|| v.state.variable_name(v.id)),
                None => v.variable_name(),
            },
        };
        if let Some(control) = v.control_mut() {
            control.wire_name = Some(assigned);
        }
        Ok(())
    }

    fn on_request(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        let var = v.variable_name();
        let raw = match v.ctx.request.param(&var) {
            Some(raw) => raw.to_owned(),
            None => return Ok(()),
        };
        match Value::parse(v.data().value_kind, &raw) {
            Ok(value) => {
                if let Some(control) = v.control_mut() {
                    control.error = None;
                    control.buffer = value.clone();
                }
                match v.ctx.innermost_group() {
                    Some(gid) => {
                        let field = Self::field_name(v);
                        if let Some(group) = v.state.get_mut(gid).and_then(StateNode::group_mut) {
                            group.control.buffer.set_field(field, value);
                        }
                    }
                    None => {
                        // Solo field: its own slot is the gather boundary.
                        if let Some(slot) = v.slot() {
                            let committed = v
                                .node()
                                .control()
                                .map(|c| c.committed.clone())
                                .unwrap_or_default();
                            if value != committed {
                                match slot.set(value.clone()) {
                                    Ok(()) => {
                                        if let Some(control) = v.control_mut() {
                                            control.committed = value;
                                            control.updated = true;
                                        }
                                    }
                                    Err(err) => v.report_error(err.message),
                                }
                            }
                        }
                    }
                }
            }
            Err(message) => {
                if let Some(control) = v.control_mut() {
                    control.buffer = Value::text(raw);
                }
                v.report_error(message);
            }
        }
        Ok(())
    }

    fn on_prepare(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        // A field holding a rejected value keeps its raw text for redisplay.
        if v.node().control().is_some_and(|c| c.error.is_some()) {
            return Ok(());
        }
        match v.ctx.innermost_group() {
            Some(gid) => {
                let field = Self::field_name(v);
                let value = v
                    .state
                    .get(gid)
                    .and_then(StateNode::control)
                    .map(|c| c.buffer.field(&field))
                    .unwrap_or_default();
                if let Some(control) = v.control_mut() {
                    control.buffer = value;
                }
            }
            None => {
                if let Some(slot) = v.slot() {
                    let value = slot.get();
                    if let Some(control) = v.control_mut() {
                        control.committed = value.clone();
                        control.buffer = value;
                        control.updated = false;
                    }
                }
            }
        }
        Ok(())
    }

    fn render(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        let var = v.variable_name();
        let frame = v.ctx.frame;
        let (text, error) = match v.control_mut() {
            Some(control) => (control.display_for(frame), control.error.clone()),
            None => (String::new(), None),
        };
        v.ctx.write(&format!(
            "<input name=\"{var}\" value=\"{}\"/>",
            escape(&text)
        ));
        if let Some(message) = error {
            v.ctx
                .write(&format!("<em class=\"error\">{}</em>", escape(&message)));
        }
        Ok(())
    }
}
