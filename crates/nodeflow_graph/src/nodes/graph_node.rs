// SPDX-License-Identifier: MIT OR Apache-2.0
//! A node embedding a whole graph.
//!
//! The node's ports mirror the inner graph's accessors: every data setter becomes an
//! input and every data getter an output. Port names are the inner port names, suffixed
//! with `_1`, `_2`, ... when several inner nodes use the same one. An outer input takes
//! over the default value of the inner input it feeds.

use crate::description::{GraphDescription, NodeDescription};
use crate::error::{GraphError, NodeError, Result};
use crate::factory::{FactorySet, NodeCreator};
use crate::graph::Graph;
use crate::node::{Node, NodeCore};
use crate::port::{Port, PortDirection};
use std::sync::Arc;

/// Type name of graph nodes
pub const GRAPH_NODE_TYPE: &str = "Graph";

/// Inner port mirrored by an outer port of the same index
#[derive(Debug, Clone)]
struct Binding {
    node: String,
    port: String,
}

/// Node delegating its lifecycle to an embedded [`Graph`]
pub struct GraphNode {
    core: NodeCore,
    graph: Graph,
    inputs: Vec<Binding>,
    outputs: Vec<Binding>,
}

impl GraphNode {
    /// Wrap `graph`, generating ports from its current accessors.
    ///
    /// The inner inputs turned into ports are marked as fed by this node.
    pub fn new(instance_name: &str, mut graph: Graph) -> Result<Self> {
        let mut core = NodeCore::new(instance_name, GRAPH_NODE_TYPE);

        let mut inputs = Vec::new();
        for accessor in graph.data_setters() {
            let name = unique_port_name(core.inputs(), &accessor.port);
            let mut port = Port::input(name, accessor.data_type);
            if accessor.required {
                port.must_be_linked();
            }
            let default = graph
                .node(&accessor.node)
                .and_then(|node| node.core().input_port(&accessor.port))
                .and_then(Port::default_value)
                .cloned();
            if let Some(default) = default {
                port = port.with_default_value(default);
            }
            core.add_input(port)?;
            graph.expose_input(&accessor.node, &accessor.port, true)?;
            inputs.push(Binding {
                node: accessor.node,
                port: accessor.port,
            });
        }

        let mut outputs = Vec::new();
        for accessor in graph.data_getters() {
            let name = unique_port_name(core.outputs(), &accessor.port);
            core.add_output(Port::output(name, accessor.data_type))?;
            outputs.push(Binding {
                node: accessor.node,
                port: accessor.port,
            });
        }

        tracing::debug!(
            "Graph node {} wraps {} ({} inputs, {} outputs)",
            instance_name,
            graph.name(),
            inputs.len(),
            outputs.len()
        );
        Ok(Self {
            core,
            graph,
            inputs,
            outputs,
        })
    }

    /// Embedded graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Inner `(node, port)` mirrored by an outer port
    pub fn binding(&self, direction: PortDirection, port: &str) -> Option<(&str, &str)> {
        let (index, bindings) = match direction {
            PortDirection::Input => (self.core.input_index(port)?, &self.inputs),
            PortDirection::Output => (self.core.output_index(port)?, &self.outputs),
        };
        bindings
            .get(index)
            .map(|binding| (binding.node.as_str(), binding.port.as_str()))
    }
}

/// `base`, or the first free `base_N`
fn unique_port_name(ports: &[Port], base: &str) -> String {
    let taken = |name: &str| ports.iter().any(|port| port.name() == name);
    if !taken(base) {
        return base.to_string();
    }
    let mut suffix = 1;
    loop {
        let candidate = format!("{base}_{suffix}");
        if !taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

impl Node for GraphNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn init(&mut self) -> Result<(), NodeError> {
        self.graph.compile()?;
        Ok(())
    }

    fn execute(&mut self) -> Result<(), NodeError> {
        for (port, binding) in self.core.inputs().iter().zip(&self.inputs) {
            self.graph
                .feed_input(&binding.node, &binding.port, port.data().cloned())?;
        }
        self.graph.execute()?;
        for (port, binding) in self.core.outputs_mut().iter_mut().zip(&self.outputs) {
            let value = self.graph.output_value(&binding.node, &binding.port).ok().cloned();
            port.replace_data(value);
        }
        Ok(())
    }

    fn destroy(&mut self) {
        self.graph.release();
    }

    fn to_persisted(&self) -> Result<Option<serde_json::Value>, NodeError> {
        let description = self.graph.to_description()?;
        Ok(Some(serde_json::to_value(description)?))
    }

    fn from_persisted(&mut self, _config: &serde_json::Value) -> Result<(), NodeError> {
        Err(NodeError::failed(
            "graph nodes are restored by their factory creator",
        ))
    }

    fn subgraph(&self) -> Option<&Graph> {
        Some(&self.graph)
    }
}

/// Creator rebuilding the embedded graph with the factories of the enclosing one
pub(crate) fn creator() -> NodeCreator {
    Arc::new(
        |description: &NodeDescription, factories: &FactorySet| -> Result<Box<dyn Node>> {
            let graph = match &description.config {
                Some(config) => {
                    let inner: GraphDescription = serde_json::from_value(config.clone())
                        .map_err(|e| GraphError::Persistence {
                            node: description.instance.clone(),
                            source: Box::new(e.into()),
                        })?;
                    Graph::from_description(&inner, factories.clone())?
                }
                None => Graph::with_factories(description.instance.as_str(), factories.clone()),
            };
            Ok(Box::new(GraphNode::new(&description.instance, graph)?))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeConstructor;
    use crate::nodes::{FloatSink, FloatSource};
    use crate::testing::{self, Probe, Scale};
    use crate::value::DataType;

    fn doubler() -> Graph {
        let mut inner = Graph::new("doubler");
        inner.add_node(Box::new(Scale::new("double", 2.0).unwrap())).unwrap();
        inner
    }

    /// `source --> inner(double) --> sink`
    fn nested() -> Graph {
        let mut outer = Graph::new("outer");
        outer.add_node(Box::new(FloatSource::new("source", 3.0).unwrap())).unwrap();
        outer
            .add_node(Box::new(GraphNode::new("inner", doubler()).unwrap()))
            .unwrap();
        outer.add_node(Box::new(FloatSink::construct("sink").unwrap())).unwrap();
        outer.add_link("source", "to", "inner", "in").unwrap();
        outer.add_link("inner", "out", "sink", "from").unwrap();
        outer
    }

    #[test]
    fn test_ports_mirror_accessors() {
        let node = GraphNode::new("inner", doubler()).unwrap();
        let input = node.core().input_port("in").unwrap();
        assert!(input.is_required());
        assert_eq!(input.data_type(), &DataType::of::<f32>());
        assert_eq!(node.core().outputs().len(), 1);
        assert_eq!(node.binding(PortDirection::Input, "in"), Some(("double", "in")));
        assert!(node.graph().data_setters().is_empty());
    }

    #[test]
    fn test_colliding_port_names() {
        let mut inner = Graph::new("pair");
        inner.add_node(Box::new(Scale::new("a", 1.0).unwrap())).unwrap();
        inner.add_node(Box::new(Scale::new("b", 2.0).unwrap())).unwrap();
        let node = GraphNode::new("pair", inner).unwrap();

        let inputs: Vec<_> = node.core().inputs().iter().map(Port::name).collect();
        assert_eq!(inputs, vec!["in", "in_1"]);
        let outputs: Vec<_> = node.core().outputs().iter().map(Port::name).collect();
        assert_eq!(outputs, vec!["out", "out_1"]);
        assert_eq!(node.binding(PortDirection::Output, "out_1"), Some(("b", "out")));
    }

    #[test]
    fn test_nested_execution() {
        let mut outer = nested();
        outer.compile().unwrap();
        assert_eq!(outer.order(), vec!["source", "inner", "sink"]);
        let inner = outer.node_as::<GraphNode>("inner").unwrap();
        assert!(inner.graph().is_ready());

        outer.execute().unwrap();
        assert_eq!(outer.output::<f32>("sink", "data").unwrap(), &6.0);

        outer.set_input("source", "from", 10.0f32).unwrap();
        outer.execute().unwrap();
        assert_eq!(outer.output::<f32>("sink", "data").unwrap(), &20.0);
    }

    /// `inner(probe)` alone, its `in` port carrying the probe's default
    fn wrapped_probe(events: &testing::Events) -> GraphNode {
        let mut inner = Graph::new("wrapped");
        inner
            .add_node(Box::new(Probe::new("probe", events.clone()).unwrap()))
            .unwrap();
        GraphNode::new("inner", inner).unwrap()
    }

    #[test]
    fn test_unlinked_outer_input_uses_inner_default() {
        let node = wrapped_probe(&testing::events());
        let input = node.core().input_port("in").unwrap();
        assert_eq!(
            input.default_value().and_then(|v| v.downcast_ref::<f32>()),
            Some(&0.0)
        );

        let mut outer = Graph::new("outer");
        outer.add_node(Box::new(node)).unwrap();
        outer.compile().unwrap();
        outer.execute().unwrap();
        assert_eq!(outer.output::<f32>("inner", "out").unwrap(), &0.0);

        outer.set_input("inner", "in", 4.0f32).unwrap();
        outer.execute().unwrap();
        assert_eq!(outer.output::<f32>("inner", "out").unwrap(), &4.0);
    }

    #[test]
    fn test_unproduced_outer_value_reads_as_no_data() {
        let events = testing::events();
        let mut silent = Probe::new("silent", events.clone()).unwrap();
        silent.silent = true;

        let mut outer = Graph::new("outer");
        outer.add_node(Box::new(silent)).unwrap();
        outer.add_node(Box::new(wrapped_probe(&events))).unwrap();
        outer.add_node(Box::new(FloatSink::construct("sink").unwrap())).unwrap();
        outer.add_link("silent", "out", "inner", "in").unwrap();
        outer.add_link("inner", "out", "sink", "from").unwrap();
        outer.compile().unwrap();

        match outer.execute().unwrap_err() {
            GraphError::NodeExecutionFailed { node, source, .. } => {
                assert_eq!(node, "inner");
                match *source {
                    NodeError::Graph(GraphError::NodeExecutionFailed { node, source, .. }) => {
                        assert_eq!(node, "probe");
                        assert!(matches!(*source, NodeError::Graph(GraphError::NoData { .. })));
                    }
                    other => panic!("unexpected error: {other}"),
                }
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(outer.output::<f32>("sink", "data"), Err(GraphError::NoData { .. })));
    }

    #[test]
    fn test_unlinked_required_port_fails_outer_compile() {
        let mut outer = Graph::new("outer");
        outer
            .add_node(Box::new(GraphNode::new("inner", doubler()).unwrap()))
            .unwrap();
        match outer.compile().unwrap_err() {
            GraphError::UnsatisfiedInput { node, port } => {
                assert_eq!(node, "inner");
                assert_eq!(port, "in");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_inner_failure_names_graph_node() {
        let events = testing::events();
        let mut inner = Graph::new("failing");
        let mut probe = Probe::new("probe", events.clone()).unwrap();
        probe.fail_execute = true;
        inner.add_node(Box::new(probe)).unwrap();

        let mut outer = Graph::new("outer");
        outer
            .add_node(Box::new(GraphNode::new("inner", inner).unwrap()))
            .unwrap();
        outer.compile().unwrap();
        match outer.execute().unwrap_err() {
            GraphError::NodeExecutionFailed { node, type_name, source } => {
                assert_eq!(node, "inner");
                assert_eq!(type_name, GRAPH_NODE_TYPE);
                assert!(matches!(
                    *source,
                    NodeError::Graph(GraphError::NodeExecutionFailed { .. })
                ));
            }
            other => panic!("unexpected error: {other}"),
        }

        outer.release();
        assert_eq!(testing::take(&events), vec!["init:probe", "destroy:probe"]);
    }

    #[test]
    fn test_recursive_lookup() {
        let outer = nested();
        assert!(outer.contains_node_recursive("inner"));
        assert!(outer.contains_node_recursive("double"));
        assert!(!outer.contains_node_recursive("missing"));
    }

    #[test]
    fn test_nested_description_round_trip() {
        let outer = nested();
        let description = outer.to_description().unwrap();
        assert_eq!(description.nodes[1].model, GRAPH_NODE_TYPE);

        let ron_str = description.to_ron().unwrap();
        let loaded = GraphDescription::from_ron(&ron_str).unwrap();
        let mut graph = Graph::from_description(&loaded, testing::factories()).unwrap();
        graph.compile().unwrap();
        graph.execute().unwrap();
        assert_eq!(graph.output::<f32>("sink", "data").unwrap(), &6.0);
        assert!(graph.contains_node_recursive("double"));
    }

    #[test]
    fn test_empty_graph_node_from_factory() {
        let factories = FactorySet::with_builtins().unwrap();
        let node = factories
            .create_node(&NodeDescription::new("empty", GRAPH_NODE_TYPE))
            .unwrap();
        assert!(node.subgraph().is_some_and(|g| g.node_count() == 0));
        assert!(node.core().inputs().is_empty());
    }
}
