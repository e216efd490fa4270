//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::endpoint::NodeOrdering;

/// Root configuration for the router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Reconciliation behaviour.
    pub engine: EngineConfig,

    /// Where desired endpoints are read from.
    pub catalog: CatalogConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Reconciliation engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Shut down realized endpoints that are absent from a desired set.
    pub prune_missing: bool,

    /// Whether node and bind order is significant when diffing endpoints.
    pub node_ordering: NodeOrdering,

    /// Upper bound on a graceful listener close, in seconds.
    pub close_timeout_secs: u64,
}

impl EngineConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prune_missing: false,
            node_ordering: NodeOrdering::Strict,
            close_timeout_secs: 5,
        }
    }
}

/// Endpoint catalog configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Path of the JSON catalog file.
    pub path: String,

    /// First key path segment.
    pub app_id: String,

    /// Second key path segment.
    pub cluster_id: String,

    /// Re-read the catalog when the file changes.
    pub watch: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: "catalog.json".to_string(),
            app_id: "HelloWorld".to_string(),
            cluster_id: "ClusterWorld".to_string(),
            watch: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
