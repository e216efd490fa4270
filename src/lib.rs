//! Endpoint router library.
//!
//! Keeps a set of live network listeners consistent with a desired topology
//! read from an endpoint catalog.

// Core subsystems
pub mod endpoint;
pub mod net;
pub mod http;
pub mod reconcile;

// Configuration source
pub mod catalog;
pub mod config;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::RouterConfig;
pub use endpoint::{Bind, Endpoint, Node, NodeOrdering};
pub use lifecycle::Shutdown;
pub use reconcile::{EventStream, ReconcileError, ReconciliationEngine, StatusEvent};
