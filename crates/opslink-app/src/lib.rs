//! HTTP surface for the opslink service.
//!
//! The library half hosts the axum routes and shared state so tests can
//! drive the full intake path in process; the `opslink` binary wires the
//! production clients into the same router.

pub mod routes;
pub mod server;

pub use routes::router;
pub use server::AppState;
