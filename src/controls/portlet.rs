//! PortletSlot: mounts a nested port.
//!
//! The slot renders the frame for a nested conversation; requests carrying
//! the `port` query parameter are routed by the engine to the nested
//! session, which runs its own phase sequence against its own tree.

use super::behavior::Behavior;
use super::escape;
use crate::dispatch::{DispatchError, Visit};

/// Placeholder for an embedded port. Its declared name is the port id.
pub struct PortletSlot;

impl Behavior for PortletSlot {
    fn render(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        let port_id = match v.data().name.clone() {
            Some(name) => name,
            None => v.variable_name(),
        };
        let src = v.session.portlet_url(&port_id);
        v.ctx.write(&format!(
            "<iframe class=\"portlet\" src=\"{}\"></iframe>",
            escape(&src)
        ));
        Ok(())
    }
}
