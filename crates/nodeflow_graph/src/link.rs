// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link (edge) definitions for the graph.

use crate::value::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkId(pub Uuid);

impl LinkId {
    /// Create a new random link ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A link from an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Unique link ID
    pub id: LinkId,
    /// Source node instance name
    pub from_node: String,
    /// Source output port name
    pub from_port: String,
    /// Destination node instance name
    pub to_node: String,
    /// Destination input port name
    pub to_port: String,
    /// Data type shared by both endpoints
    pub data_type: DataType,
}

impl Link {
    /// Create a new link
    pub fn new(
        from_node: impl Into<String>,
        from_port: impl Into<String>,
        to_node: impl Into<String>,
        to_port: impl Into<String>,
        data_type: DataType,
    ) -> Self {
        Self {
            id: LinkId::new(),
            from_node: from_node.into(),
            from_port: from_port.into(),
            to_node: to_node.into(),
            to_port: to_port.into(),
            data_type,
        }
    }

    /// Check if this link involves a specific node
    pub fn involves_node(&self, node: &str) -> bool {
        self.from_node == node || self.to_node == node
    }

    /// Check if this link ends at a specific input
    pub fn ends_at(&self, node: &str, port: &str) -> bool {
        self.to_node == node && self.to_port == port
    }

    /// Check if this link starts at a specific output
    pub fn starts_at(&self, node: &str, port: &str) -> bool {
        self.from_node == node && self.from_port == port
    }
}
