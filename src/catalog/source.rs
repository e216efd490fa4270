//! Endpoint catalog: services, nodes and TLS blobs on top of a [`CatalogStore`].
//!
//! # Responsibilities
//! - Write and delete services under the catalog key layout
//! - Materialize the desired `Endpoint` list for the reconciliation engine
//! - Render the catalog as a JSON tree for inspection
//!
//! # Design Decisions
//! - Services and nodes come out in key order, so equal catalogs yield equal endpoints
//! - A node value that does not decode is skipped with a warning; one bad key
//!   must not take every other endpoint down with it
//! - Services without nodes are not endpoints

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::catalog::paths::{CatalogKey, KeyPrefix, PathError, TlsPart};
use crate::catalog::store::{CatalogStore, StoreError};
use crate::endpoint::{Bind, Endpoint, Node};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("TLS material for {service} is incomplete: missing {missing}")]
    IncompleteTls { service: String, missing: TlsPart },
}

/// Certificate, chain and private key of one service, as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub cert: Vec<u8>,
    pub chain: Vec<u8>,
    pub key: Vec<u8>,
}

impl TlsMaterial {
    fn part(&self, part: TlsPart) -> &[u8] {
        match part {
            TlsPart::Cert => &self.cert,
            TlsPart::Chain => &self.chain,
            TlsPart::Key => &self.key,
        }
    }
}

/// Stored node value: one bind, or several for multi-homed nodes.
#[derive(Deserialize)]
#[serde(untagged)]
enum NodeValue {
    Single(Bind),
    Many(Vec<Bind>),
}

impl From<NodeValue> for Vec<Bind> {
    fn from(value: NodeValue) -> Self {
        match value {
            NodeValue::Single(bind) => vec![bind],
            NodeValue::Many(binds) => binds,
        }
    }
}

#[derive(Clone)]
pub struct EndpointCatalog {
    store: Arc<dyn CatalogStore>,
    prefix: KeyPrefix,
}

impl EndpointCatalog {
    pub fn new(store: Arc<dyn CatalogStore>, prefix: KeyPrefix) -> Self {
        Self { store, prefix }
    }

    /// Register `node` of `service` on `bind`, optionally with TLS material.
    pub fn add_endpoint(
        &self,
        service: &str,
        node: &str,
        bind: Bind,
        tls: Option<&TlsMaterial>,
    ) -> Result<(), CatalogError> {
        let node_key = self.prefix.node(service, node)?;
        self.store
            .set_json(&node_key, &json!({ "ip": bind.ip.to_string(), "port": bind.port }))?;

        if let Some(tls) = tls {
            for part in TlsPart::ALL {
                self.store
                    .set_raw(&self.prefix.tls(service, part)?, tls.part(part).to_vec())?;
            }
        }

        tracing::info!(service = %service, node = %node, bind = %bind, tls = tls.is_some(), "Endpoint added to catalog");
        Ok(())
    }

    /// Remove a service with all its nodes and TLS material.
    /// Returns false when nothing was stored for it.
    pub fn delete_endpoint(&self, service: &str) -> Result<bool, CatalogError> {
        let removed = self.store.delete(&self.prefix.service(service)?)?;
        tracing::info!(service = %service, keys = removed, "Endpoint deleted from catalog");
        Ok(removed > 0)
    }

    pub fn tls_material(&self, service: &str) -> Result<Option<TlsMaterial>, CatalogError> {
        let mut parts = Vec::with_capacity(3);
        for part in TlsPart::ALL {
            parts.push((part, self.store.get_raw(&self.prefix.tls(service, part)?)?));
        }
        if parts.iter().all(|(_, value)| value.is_none()) {
            return Ok(None);
        }
        if let Some((missing, _)) = parts.iter().find(|(_, value)| value.is_none()) {
            return Err(CatalogError::IncompleteTls {
                service: service.to_string(),
                missing: *missing,
            });
        }

        let mut values = parts.into_iter().map(|(_, value)| value.unwrap_or_default());
        Ok(Some(TlsMaterial {
            cert: values.next().unwrap_or_default(),
            chain: values.next().unwrap_or_default(),
            key: values.next().unwrap_or_default(),
        }))
    }

    /// The desired endpoint list described by the catalog.
    pub fn desired_endpoints(&self) -> Result<Vec<Endpoint>, CatalogError> {
        let mut services: BTreeMap<String, Vec<Node>> = BTreeMap::new();

        for (key, value) in self.store.list(&self.prefix.root())? {
            let Some(CatalogKey::Node { service, node }) = self.prefix.parse(&key) else {
                continue;
            };
            match serde_json::from_slice::<NodeValue>(&value) {
                Ok(decoded) => services
                    .entry(service)
                    .or_default()
                    .push(Node::new(node, decoded.into())),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping malformed node value");
                }
            }
        }

        Ok(services
            .into_iter()
            .map(|(name, nodes)| Endpoint::new(name, nodes))
            .collect())
    }

    /// The catalog below the prefix as a nested JSON object.
    pub fn list_tree(&self) -> Result<Value, CatalogError> {
        let root = self.prefix.root();
        let mut tree = Map::new();

        for (key, value) in self.store.list(&root)? {
            let Some(relative) = key.strip_prefix(&root).and_then(|k| k.strip_prefix('/')) else {
                continue;
            };
            let leaf = match self.prefix.parse(&key) {
                Some(CatalogKey::Node { .. }) => serde_json::from_slice(&value)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&value).into_owned())),
                _ => Value::String(String::from_utf8_lossy(&value).into_owned()),
            };
            let segments: Vec<&str> = relative.split('/').collect();
            insert_path(&mut tree, &segments, leaf);
        }

        Ok(Value::Object(tree))
    }
}

fn insert_path(tree: &mut Map<String, Value>, segments: &[&str], leaf: Value) {
    match segments {
        [] => {}
        [last] => {
            tree.insert(last.to_string(), leaf);
        }
        [first, rest @ ..] => {
            let child = tree
                .entry(first.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                insert_path(map, rest, leaf);
            }
        }
    }
}
