//! Endpoint catalog: the configuration-source adapter.
//!
//! # Data Flow
//! ```text
//! CLI add/delete ──→ source.rs ──→ store.rs (CatalogStore trait)
//!                                     ├─ MemoryStore
//!                                     └─ file.rs (FileStore, JSON on disk)
//!
//! watcher.rs (file changed)
//!     → FileStore::reload
//!     → source.rs materializes Vec<Endpoint>
//!     → reconciliation engine
//! ```
//!
//! The reconciliation engine never sees key paths; only `Endpoint` values
//! leave this module.

pub mod file;
pub mod paths;
pub mod source;
pub mod store;
pub mod watcher;

pub use file::FileStore;
pub use paths::{CatalogKey, KeyPrefix, PathError, TlsPart};
pub use source::{CatalogError, EndpointCatalog, TlsMaterial};
pub use store::{CatalogStore, MemoryStore, StoreError};
pub use watcher::CatalogWatcher;
