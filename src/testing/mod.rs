//! Test harness: a headless conversation driver.
//!
//! Use the [`Pilot`] to drive a mounted tree through request/response
//! exchanges without an HTTP server, capturing each render's embedded frame
//! token for assertions.

pub mod pilot;

pub use pilot::Pilot;
