//! HTTP surface: one gated endpoint that runs a credential race.

pub mod auth;
pub mod error;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
