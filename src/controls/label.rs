//! Label: read-only text from the bound slot or the declared name.

use super::behavior::Behavior;
use super::escape;
use crate::dispatch::{DispatchError, Visit};

/// Renders its bound model value, or its declared name when unbound.
pub struct Label;

impl Behavior for Label {
    fn render(&self, v: &mut Visit<'_, '_>) -> Result<(), DispatchError> {
        let text = match v.slot() {
            Some(slot) => slot.get().display_text(),
            None => v.data().name.clone().unwrap_or_default(),
        };
        v.ctx.write(&format!("<span>{}</span>", escape(&text)));
        Ok(())
    }
}
