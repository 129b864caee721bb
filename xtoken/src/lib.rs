//! xtoken service crate.
//!
//! This module exposes the service wiring for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
