//! Per-conversation state: the mutable mirror of the component tree.
//!
//! - [`frame`] — `StateFrame` tokens and the synchronization-status algorithm
//! - [`node`] — `StateNode`, `ControlState`, `GroupState`
//! - [`tree`] — `StateTree` arena mirroring the component tree

pub mod frame;
pub mod node;
pub mod tree;

pub use frame::{classify, StateFrame, SyncStatus};
pub use node::{ControlState, DeferredCommand, GroupState, StateId, StateKind, StateNode};
pub use tree::StateTree;
