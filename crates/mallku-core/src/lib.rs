//! Shared types and ambient services for the Mallku correlation engine.
//!
//! This crate carries the pieces every other workspace member depends on:
//! opaque identifiers, the event model, the error taxonomy, configuration,
//! a backoff-retry helper, and tracing initialization.

pub mod config;
pub mod error;
pub mod event;
pub mod ids;
pub mod logging;
pub mod retry;

pub use error::{Error, Result};
pub use ids::Id;
