//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!     → CLI flags applied on top
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal or missing config files
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{CatalogConfig, EngineConfig, LogFormat, ObservabilityConfig, RouterConfig};
