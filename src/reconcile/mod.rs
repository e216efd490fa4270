//! Reconciliation subsystem.
//!
//! # Data Flow
//! ```text
//! desired Vec<Endpoint>
//!     → engine.rs (command queued to the single owner of listener records)
//!     → validate, diff against realized records
//!     → net::listener start/stop
//!     → events.rs (one EventStream per command, ends with OK or an error)
//! ```

pub mod engine;
pub mod events;

pub use engine::{RealizedEndpoint, ReconciliationEngine};
pub use events::{EventItem, EventStream, ReconcileError, ReconcileReport, StatusEvent};
