// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types shared by the graph, its nodes and the factories.

use crate::link::LinkId;
use crate::port::PortDirection;
use crate::value::DataType;
use std::path::PathBuf;

/// Error raised by graph construction, compilation, execution or persistence
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A port with this name already exists on the same side of the node
    #[error("Node {node} already has a port named {port}")]
    DuplicatePortName {
        /// Node instance name
        node: String,
        /// Port name
        port: String,
    },

    /// A node with this instance name already exists in the graph
    #[error("Duplicate node name: {0}")]
    DuplicateNodeName(String),

    /// A creator is already registered for this type name
    #[error("Type {type_name} is already registered in factory {factory}")]
    DuplicateTypeName {
        /// Factory name
        factory: String,
        /// Node type name
        type_name: String,
    },

    /// A factory with this name is already part of the set
    #[error("Duplicate factory name: {0}")]
    DuplicateFactoryName(String),

    /// No attached factory knows how to build this type
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Node not found in the graph
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Port not found on the node
    #[error("Port not found: {node}.{port}")]
    PortNotFound {
        /// Node instance name
        node: String,
        /// Port name
        port: String,
    },

    /// The named port exists, but on the wrong side of the node
    #[error("Port {node}.{port} is not an {expected:?} port")]
    DirectionMismatch {
        /// Node instance name
        node: String,
        /// Port name
        port: String,
        /// Direction the operation requires
        expected: PortDirection,
    },

    /// Link endpoints declare different data types
    #[error("Link type mismatch: {from} ({from_type}) -> {to} ({to_type})")]
    TypeMismatch {
        /// Source endpoint as `node.port`
        from: String,
        /// Source data type
        from_type: DataType,
        /// Destination endpoint as `node.port`
        to: String,
        /// Destination data type
        to_type: DataType,
    },

    /// The destination input already has a source
    #[error("Input {node}.{port} is already linked")]
    AlreadyLinked {
        /// Node instance name
        node: String,
        /// Port name
        port: String,
    },

    /// No link ends at this input
    #[error("No link ends at {node}.{port}")]
    LinkNotFound {
        /// Node instance name
        node: String,
        /// Port name
        port: String,
    },

    /// No link has this ID
    #[error("Link not found: {0}")]
    LinkIdNotFound(LinkId),

    /// The graph contains a cycle
    #[error("Graph contains a cycle through {}", .nodes.join(", "))]
    CyclicGraph {
        /// Nodes that could not be scheduled
        nodes: Vec<String>,
    },

    /// A required input is not linked
    #[error("Required input {node}.{port} is not linked")]
    UnsatisfiedInput {
        /// Node instance name
        node: String,
        /// Port name
        port: String,
    },

    /// The graph must be compiled before it can be executed
    #[error("Graph {0} is not compiled")]
    NotCompiled(String),

    /// A port was read before any value was produced
    #[error("No data available on {node}.{port}")]
    NoData {
        /// Node instance name
        node: String,
        /// Port name
        port: String,
    },

    /// The stored value does not have the requested type
    #[error("Value on {node}.{port} is {found}, not {expected}")]
    ValueTypeMismatch {
        /// Node instance name
        node: String,
        /// Port name
        port: String,
        /// Requested Rust type
        expected: &'static str,
        /// Type of the stored value
        found: DataType,
    },

    /// A node failed to initialize during compilation
    #[error("Initialization of node {node} failed: {source}")]
    NodeInitFailed {
        /// Node instance name
        node: String,
        /// Node-specific cause
        source: Box<NodeError>,
    },

    /// A node failed while the graph was executing
    #[error("Execution failed with node {node} ({type_name}): {source}")]
    NodeExecutionFailed {
        /// Node instance name
        node: String,
        /// Node type name
        type_name: String,
        /// Node-specific cause
        source: Box<NodeError>,
    },

    /// A node could not be saved or restored
    #[error("Unable to persist node {node}: {source}")]
    Persistence {
        /// Node instance name
        node: String,
        /// Node-specific cause
        source: Box<NodeError>,
    },

    /// Nodes and links of this graph are protected from removal
    #[error("Graph {0} is protected")]
    Protected(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RON parse error
    #[error("RON parse error: {0}")]
    RonRead(#[from] ron::error::SpannedError),

    /// RON write error
    #[error("RON write error: {0}")]
    RonWrite(#[from] ron::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File extension is neither `.ron` nor `.json`
    #[error("Unsupported graph file format: {0}")]
    UnsupportedFormat(PathBuf),
}

/// Error raised by a node implementation
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Error from the graph plumbing (missing data, nested graph failure, ...)
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Domain-specific failure
    #[error("{0}")]
    Failed(String),

    /// The node holds state that has no persisted form
    #[error("Nodes of type {0} cannot be persisted")]
    NotPersistable(String),

    /// Malformed configuration payload
    #[error("Invalid node configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl NodeError {
    /// Create a domain-specific failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result type used throughout the crate
pub type Result<T, E = GraphError> = std::result::Result<T, E>;
