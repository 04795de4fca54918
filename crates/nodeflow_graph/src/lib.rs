// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node-based computation graphs.
//!
//! A [`Graph`] holds nodes exchanging typed values through ports. Once assembled it is
//! compiled (cycle detection, required input check, topological ordering, node
//! initialization) and can then be executed any number of times.
//!
//! ## Architecture
//!
//! - [`value`]: data type identifiers and shared, type-erased port values
//! - [`port`] / [`link`]: typed endpoints and the links between them
//! - [`node`]: the [`Node`] trait and the state every node shares
//! - [`factory`]: building nodes from their persisted description
//! - [`graph`]: compilation, execution, data accessors and persistence
//! - [`nodes`]: built-in sources, sinks, closure nodes and nested graphs
//!
//! ```
//! use nodeflow_graph::nodes::{FloatSink, FloatSource};
//! use nodeflow_graph::{Graph, NodeConstructor};
//!
//! let mut graph = Graph::new("example");
//! graph.add_node(Box::new(FloatSource::new("source", 4.0)?))?;
//! graph.add_node(Box::new(FloatSink::construct("sink")?))?;
//! graph.add_link("source", "to", "sink", "from")?;
//! graph.compile()?;
//! graph.execute()?;
//! assert_eq!(graph.output::<f32>("sink", "data")?, &4.0);
//! # Ok::<(), nodeflow_graph::GraphError>(())
//! ```

pub mod description;
pub mod error;
pub mod factory;
pub mod graph;
pub mod link;
pub mod node;
pub mod nodes;
pub mod port;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use description::{GraphDescription, GraphFormat, LinkDescription, NodeDescription};
pub use error::{GraphError, NodeError, Result};
pub use factory::{FactorySet, NodeCreator, NodeFactory};
pub use graph::Graph;
pub use link::{Link, LinkId};
pub use node::{Node, NodeConstructor, NodeCore};
pub use port::{DataAccessor, Port, PortDirection};
pub use value::{DataType, PortValue};
