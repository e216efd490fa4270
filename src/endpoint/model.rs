//! Endpoint, node and bind value types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// One (address, port) pair a node listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bind {
    pub ip: IpAddr,
    pub port: u16,
}

impl Bind {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Socket address to bind a listener on.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl From<SocketAddr> for Bind {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for Bind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// A named unit within an endpoint, exposing one or more binds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub binds: Vec<Bind>,
}

impl Node {
    pub fn new(name: impl Into<String>, binds: Vec<Bind>) -> Self {
        Self {
            name: name.into(),
            binds,
        }
    }

    fn canonical(&self) -> (&str, Vec<Bind>) {
        let mut binds = self.binds.clone();
        binds.sort();
        (self.name.as_str(), binds)
    }
}

/// How node and bind sequences are compared when diffing endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeOrdering {
    /// Sequences must match element by element.
    #[default]
    Strict,
    /// Sequences are compared as multisets.
    Unordered,
}

/// A named desired network service, composed of nodes.
///
/// `PartialEq` is structural and order-sensitive: two endpoints with the same
/// nodes in a different order are different. Use [`Endpoint::same_topology`]
/// with [`NodeOrdering::Unordered`] to ignore ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            nodes,
        }
    }

    /// Every bind of every node, in declaration order.
    pub fn binds(&self) -> impl Iterator<Item = Bind> + '_ {
        self.nodes.iter().flat_map(|node| node.binds.iter().copied())
    }

    /// Number of listeners this endpoint needs.
    pub fn bind_count(&self) -> usize {
        self.nodes.iter().map(|node| node.binds.len()).sum()
    }

    /// Structural comparison under the given ordering rule.
    pub fn same_topology(&self, other: &Endpoint, ordering: NodeOrdering) -> bool {
        match ordering {
            NodeOrdering::Strict => self == other,
            NodeOrdering::Unordered => {
                if self.name != other.name || self.nodes.len() != other.nodes.len() {
                    return false;
                }
                let mut ours: Vec<_> = self.nodes.iter().map(Node::canonical).collect();
                let mut theirs: Vec<_> = other.nodes.iter().map(Node::canonical).collect();
                ours.sort();
                theirs.sort();
                ours == theirs
            }
        }
    }
}
