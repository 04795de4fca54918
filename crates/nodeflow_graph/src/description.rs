// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persisted description of a graph.
//!
//! A description enumerates, per node, its instance name, its type name (the `model`) and
//! its private configuration, and separately the links as
//! `(out_node, out_port, in_node, in_port)` tuples. Loading replays node creation through
//! the factories and link creation through [`crate::Graph::add_link`].

use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current graph description format version
pub const GRAPH_FORMAT_VERSION: u32 = 1;

/// File format of a persisted graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    /// Rusty Object Notation, pretty printed
    Ron,
    /// JSON, pretty printed
    Json,
}

impl GraphFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("ron") => Ok(Self::Ron),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
            _ => Err(GraphError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Persisted node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    /// Instance name
    pub instance: String,
    /// Type name used to find the node creator
    pub model: String,
    /// Node-specific configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    /// Application-specific data (editor position, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl NodeDescription {
    /// Create a description without configuration
    pub fn new(instance: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            model: model.into(),
            config: None,
            metadata: None,
        }
    }

    /// Set the configuration payload
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }
}

/// Persisted link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDescription {
    /// Source node instance name
    pub out_node: String,
    /// Source output port name
    pub out_port: String,
    /// Destination node instance name
    pub in_node: String,
    /// Destination input port name
    pub in_port: String,
}

impl LinkDescription {
    /// Create a link description
    pub fn new(
        out_node: impl Into<String>,
        out_port: impl Into<String>,
        in_node: impl Into<String>,
        in_port: impl Into<String>,
    ) -> Self {
        Self {
            out_node: out_node.into(),
            out_port: out_port.into(),
            in_node: in_node.into(),
            in_port: in_port.into(),
        }
    }
}

/// Persisted graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
    /// Format version
    #[serde(default = "default_version")]
    pub version: u32,
    /// Graph name
    pub name: String,
    /// Nodes, in insertion order
    #[serde(default)]
    pub nodes: Vec<NodeDescription>,
    /// Links, in insertion order
    #[serde(default)]
    pub links: Vec<LinkDescription>,
}

fn default_version() -> u32 {
    GRAPH_FORMAT_VERSION
}

impl GraphDescription {
    /// Create an empty description
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: GRAPH_FORMAT_VERSION,
            name: name.into(),
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Serialize to RON format
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Deserialize from RON format
    pub fn from_ron(s: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(s)
    }

    /// Serialize to JSON format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON format
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Save to a file, the format being picked from the extension
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match GraphFormat::from_path(path)? {
            GraphFormat::Ron => self.to_ron()?,
            GraphFormat::Json => self.to_json()?,
        };
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load from a file, the format being picked from the extension
    pub fn load(path: &Path) -> Result<Self> {
        let format = GraphFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)?;
        let description = match format {
            GraphFormat::Ron => Self::from_ron(&contents)?,
            GraphFormat::Json => Self::from_json(&contents)?,
        };
        if description.version > GRAPH_FORMAT_VERSION {
            tracing::warn!(
                "Graph file {:?} has format version {} (newer than {})",
                path,
                description.version,
                GRAPH_FORMAT_VERSION
            );
        }
        Ok(description)
    }
}
