//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Listener accepts TCP connection
//!     → Axum serves the request handler
//!     → handler.rs (request id, trace span, log method + path)
//!     → empty 200 response
//! ```
//!
//! The handler does no routing or proxying; every listener shares it.

pub mod handler;

pub use handler::{default_handler, X_REQUEST_ID};
