//! # portico
//!
//! A server-side, stateful component UI engine: a tree of addressable
//! components whose rendered output and interaction state persist across a
//! sequence of request/response exchanges for one logical conversation (a
//! "port").
//!
//! The heart of the crate is not markup — it is sequencing multi-phase
//! request processing against mutable, tree-shaped, concurrently-accessed
//! state: frame-versioned renders that detect stale callbacks (back button,
//! bookmarks, duplicate submits), and transactional scatter/gather buffering
//! for grouped input.
//!
//! ## Core Systems
//!
//! - **[`tree`]** — Slotmap-backed component arena, child-index paths, the
//!   once-per-instantiation bind pass
//! - **[`binding`]** — The boundary to the external expression engine:
//!   `Binder`, `Slot`, chained scopes, an in-memory reference binder
//! - **[`state`]** — Per-conversation state tree, frame tokens, the
//!   synchronization-status algorithm
//! - **[`session`]** — Port sessions, the action registry, callback URLs,
//!   the locking session store
//! - **[`message`]** / **[`dispatch`]** — The closed message set, explicit
//!   context threading, multicast and point-to-point delivery
//! - **[`sequencer`]** — The Initialize→Request→Action→Prepare→Command→
//!   Render phase machine
//! - **[`controls`]** — Built-in behaviors: fields, groups with
//!   transactional commits, action links, nested ports
//! - **[`transaction`]** — Ambient undo-log transactions with
//!   distinguishable rollback
//! - **[`http`]** — The abstract request/response boundary and query codec
//! - **[`engine`]** — The entry point tying trees, sessions, and behaviors
//!   together
//! - **[`testing`]** — Headless conversation pilot

// Foundation
pub mod binding;
pub mod http;
pub mod tree;

// Per-conversation state
pub mod session;
pub mod state;

// Dispatch
pub mod dispatch;
pub mod message;
pub mod transaction;

// Behaviors
pub mod controls;

// Orchestration
pub mod config;
pub mod engine;
pub mod sequencer;

// Test harness
pub mod testing;
