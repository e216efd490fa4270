//! Hierarchical key paths of the endpoint catalog.
//!
//! ```text
//! {appId}/{clusterId}/{service}/nodes/{node}        → {"ip": "...", "port": n}
//! {appId}/{clusterId}/{service}/tls/{cert|chain|key} → raw bytes
//! ```

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("key segment must not be empty")]
    Empty,

    #[error("key segment {0:?} must not contain '/'")]
    Separator(String),
}

/// Check that `segment` can be used as one component of a key path.
pub fn validate_segment(segment: &str) -> Result<(), PathError> {
    if segment.is_empty() {
        Err(PathError::Empty)
    } else if segment.contains('/') {
        Err(PathError::Separator(segment.to_string()))
    } else {
        Ok(())
    }
}

/// One of the three TLS blobs stored per service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlsPart {
    Cert,
    Chain,
    Key,
}

impl TlsPart {
    pub const ALL: [TlsPart; 3] = [TlsPart::Cert, TlsPart::Chain, TlsPart::Key];

    pub fn as_str(&self) -> &'static str {
        match self {
            TlsPart::Cert => "cert",
            TlsPart::Chain => "chain",
            TlsPart::Key => "key",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|part| part.as_str() == s)
    }
}

impl fmt::Display for TlsPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key path understood by the catalog, relative to its prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogKey {
    Node { service: String, node: String },
    Tls { service: String, part: TlsPart },
}

/// The `{appId}/{clusterId}` root every catalog key lives under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPrefix {
    app_id: String,
    cluster_id: String,
}

impl KeyPrefix {
    pub fn new(app_id: impl Into<String>, cluster_id: impl Into<String>) -> Result<Self, PathError> {
        let app_id = app_id.into();
        let cluster_id = cluster_id.into();
        validate_segment(&app_id)?;
        validate_segment(&cluster_id)?;
        Ok(Self { app_id, cluster_id })
    }

    pub fn root(&self) -> String {
        format!("{}/{}", self.app_id, self.cluster_id)
    }

    pub fn service(&self, service: &str) -> Result<String, PathError> {
        validate_segment(service)?;
        Ok(format!("{}/{}", self.root(), service))
    }

    pub fn node(&self, service: &str, node: &str) -> Result<String, PathError> {
        validate_segment(node)?;
        Ok(format!("{}/nodes/{}", self.service(service)?, node))
    }

    pub fn tls(&self, service: &str, part: TlsPart) -> Result<String, PathError> {
        Ok(format!("{}/tls/{}", self.service(service)?, part))
    }

    /// Classify a full key. Keys outside this prefix or of unknown shape yield `None`.
    pub fn parse(&self, key: &str) -> Option<CatalogKey> {
        let rest = key.strip_prefix(&self.root())?.strip_prefix('/')?;
        let segments: Vec<&str> = rest.split('/').collect();
        match segments.as_slice() {
            [service, "nodes", node] if !service.is_empty() && !node.is_empty() => Some(CatalogKey::Node {
                service: service.to_string(),
                node: node.to_string(),
            }),
            [service, "tls", part] if !service.is_empty() => Some(CatalogKey::Tls {
                service: service.to_string(),
                part: TlsPart::parse(part)?,
            }),
            _ => None,
        }
    }
}
