//! Desired-topology model.
//!
//! # Data Flow
//! ```text
//! catalog (key paths)
//!     → catalog::source materializes Endpoint values
//!     → validation.rs (duplicate / empty names)
//!     → reconcile::engine diffs against realized listeners
//! ```
//!
//! # Design Decisions
//! - Values are plain data; the engine never mutates them
//! - Equality is structural over the whole node/bind tree
//! - Node ordering is significant unless `NodeOrdering::Unordered` is chosen

pub mod model;
pub mod validation;

pub use model::{Bind, Endpoint, Node, NodeOrdering};
pub use validation::{validate_desired, DesiredStateError};
