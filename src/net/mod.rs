//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Bind (address, port) + request handler
//!     → listener.rs (bind, spawn server task)
//!     → Listener handle held by the reconciliation engine
//!     → listener.rs (graceful close on stop)
//! ```

pub mod listener;

pub use listener::{BindError, CloseError, Listener, ListenerId, ListenerManager, RequestHandler};
