//! # pulse_core
//!
//! Core authentication logic for Pulse: self-issued tokens, the auth session
//! store, the SSO (OIDC) client, request credential resolution, and role
//! permissions.

pub mod auth;
pub mod migrate;
pub mod models;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
