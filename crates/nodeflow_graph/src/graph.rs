// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and links.
//!
//! A [`Graph`] owns its nodes (keyed by instance name, in insertion order) and the links
//! between their ports. Before it can run, a graph is compiled: cycles and unlinked
//! required inputs are rejected, a topological order is computed and every node is
//! initialized. Each call to [`Graph::execute`] then walks that order, pulling upstream
//! output values into linked inputs before running the node.

use crate::description::{GraphDescription, LinkDescription, NodeDescription};
use crate::error::{GraphError, Result};
use crate::factory::{FactorySet, NodeFactory};
use crate::link::{Link, LinkId};
use crate::node::{self, Node};
use crate::port::{DataAccessor, Port, PortDirection};
use crate::value::PortValue;
use indexmap::IndexMap;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Input of a scheduled node fed by an upstream output
#[derive(Debug, Clone, Copy)]
struct Pull {
    input: usize,
    source: usize,
    output: usize,
}

/// A node of the execution order with the pulls to perform before running it
#[derive(Debug, Clone)]
struct Step {
    node: usize,
    pulls: Vec<Pull>,
}

/// A node graph
#[derive(Debug)]
pub struct Graph {
    name: String,
    nodes: IndexMap<String, Box<dyn Node>>,
    links: IndexMap<LinkId, Link>,
    factories: FactorySet,
    schedule: Vec<Step>,
    ready: bool,
    should_save: bool,
    protected: bool,
}

impl Graph {
    /// Create a new empty graph without factories
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_factories(name, FactorySet::new())
    }

    /// Create a new empty graph using the given factories
    pub fn with_factories(name: impl Into<String>, factories: FactorySet) -> Self {
        Self {
            name: name.into(),
            nodes: IndexMap::new(),
            links: IndexMap::new(),
            factories,
            schedule: Vec::new(),
            ready: false,
            should_save: false,
            protected: false,
        }
    }

    /// Graph name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a factory with the lowest priority
    pub fn add_factory(&mut self, factory: Arc<NodeFactory>) -> Result<()> {
        self.factories.add_factory(factory)
    }

    /// Factories used to build nodes from descriptions
    pub fn factories(&self) -> &FactorySet {
        &self.factories
    }

    /// Build a node through the attached factories and add it
    pub fn create_node(&mut self, description: &NodeDescription) -> Result<&mut dyn Node> {
        let node = self.factories.create_node(description)?;
        self.add_node(node)
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Add a node to the graph
    pub fn add_node(&mut self, node: Box<dyn Node>) -> Result<&mut dyn Node> {
        let name = node.instance_name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(GraphError::DuplicateNodeName(name));
        }
        tracing::debug!("Graph {}: add node {} ({})", self.name, name, node.type_name());
        self.invalidate();
        let entry = self.nodes.entry(name).or_insert(node);
        Ok(entry.as_mut())
    }

    /// Remove a node and every link touching it.
    ///
    /// The node is destroyed if it was initialized, then handed back to the caller.
    pub fn remove_node(&mut self, name: &str) -> Result<Box<dyn Node>> {
        self.check_unprotected()?;
        if !self.nodes.contains_key(name) {
            return Err(GraphError::NodeNotFound(name.to_string()));
        }
        let touching: Vec<LinkId> = self
            .links
            .values()
            .filter(|link| link.involves_node(name))
            .map(|link| link.id)
            .collect();
        for id in touching {
            self.drop_link(id);
        }
        let mut node = self
            .nodes
            .shift_remove(name)
            .ok_or_else(|| GraphError::NodeNotFound(name.to_string()))?;
        if node.core().is_initialized() {
            node.destroy();
            node.core_mut().set_initialized(false);
        }
        tracing::debug!("Graph {}: removed node {}", self.name, name);
        self.invalidate();
        Ok(node)
    }

    /// Change the instance name of a node, keeping its links
    pub fn rename_node(&mut self, name: &str, new_name: &str) -> Result<()> {
        if name == new_name {
            return Ok(());
        }
        if !self.nodes.contains_key(name) {
            return Err(GraphError::NodeNotFound(name.to_string()));
        }
        if self.nodes.contains_key(new_name) {
            return Err(GraphError::DuplicateNodeName(new_name.to_string()));
        }
        self.nodes = std::mem::take(&mut self.nodes)
            .into_iter()
            .map(|(key, mut node)| {
                if key == name {
                    node.core_mut().set_instance_name(new_name);
                    (new_name.to_string(), node)
                } else {
                    (key, node)
                }
            })
            .collect();
        for link in self.links.values_mut() {
            if link.from_node == name {
                link.from_node = new_name.to_string();
            }
            if link.to_node == name {
                link.to_node = new_name.to_string();
            }
        }
        self.invalidate();
        Ok(())
    }

    /// Get a node by instance name
    pub fn node(&self, name: &str) -> Option<&dyn Node> {
        self.nodes.get(name).map(|node| node.as_ref())
    }

    /// Get a mutable node by instance name
    pub fn node_mut(&mut self, name: &str) -> Option<&mut dyn Node> {
        match self.nodes.get_mut(name) {
            Some(node) => Some(node.as_mut()),
            None => None,
        }
    }

    /// Get a node as its concrete type
    pub fn node_as<T: Node>(&self, name: &str) -> Option<&T> {
        self.node(name).and_then(node::downcast_ref::<T>)
    }

    /// Get a node as its concrete type, mutably
    pub fn node_as_mut<T: Node>(&mut self, name: &str) -> Option<&mut T> {
        self.node_mut(name).and_then(node::downcast_mut::<T>)
    }

    /// Get all nodes, in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &(dyn Node + 'static)> {
        self.nodes.values().map(|node| node.as_ref())
    }

    /// Get all node names, in insertion order
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check if a node exists in this graph or in any nested graph
    pub fn contains_node_recursive(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
            || self
                .nodes
                .values()
                .filter_map(|node| node.subgraph())
                .any(|graph| graph.contains_node_recursive(name))
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// Link an output port to an input port.
    ///
    /// Both ports must exist on the right side of their node, declare the same data type,
    /// and the input must not be linked yet. Cycles are only detected by [`Graph::compile`].
    pub fn add_link(
        &mut self,
        from_node: &str,
        from_port: &str,
        to_node: &str,
        to_port: &str,
    ) -> Result<LinkId> {
        let source = self
            .nodes
            .get(from_node)
            .ok_or_else(|| GraphError::NodeNotFound(from_node.to_string()))?;
        let target = self
            .nodes
            .get(to_node)
            .ok_or_else(|| GraphError::NodeNotFound(to_node.to_string()))?;
        let output = source.core().require_port(PortDirection::Output, from_port)?;
        let input = target.core().require_port(PortDirection::Input, to_port)?;

        if output.data_type() != input.data_type() {
            return Err(GraphError::TypeMismatch {
                from: format!("{from_node}.{from_port}"),
                from_type: output.data_type().clone(),
                to: format!("{to_node}.{to_port}"),
                to_type: input.data_type().clone(),
            });
        }
        if input.is_linked() {
            return Err(GraphError::AlreadyLinked {
                node: to_node.to_string(),
                port: to_port.to_string(),
            });
        }

        let link = Link::new(from_node, from_port, to_node, to_port, output.data_type().clone());
        let id = link.id;
        self.set_attached(&link, true);
        tracing::debug!(
            "Graph {}: link {}.{} -> {}.{}",
            self.name,
            from_node,
            from_port,
            to_node,
            to_port
        );
        self.links.insert(id, link);
        self.invalidate();
        Ok(id)
    }

    /// Remove the link ending at an input port
    pub fn remove_link(&mut self, to_node: &str, to_port: &str) -> Result<Link> {
        let id = self
            .link_to(to_node, to_port)
            .map(|link| link.id)
            .ok_or_else(|| GraphError::LinkNotFound {
                node: to_node.to_string(),
                port: to_port.to_string(),
            })?;
        self.remove_link_by_id(id)
    }

    /// Remove a link by ID
    pub fn remove_link_by_id(&mut self, id: LinkId) -> Result<Link> {
        self.check_unprotected()?;
        let link = self.drop_link(id).ok_or(GraphError::LinkIdNotFound(id))?;
        tracing::debug!(
            "Graph {}: unlink {}.{} -> {}.{}",
            self.name,
            link.from_node,
            link.from_port,
            link.to_node,
            link.to_port
        );
        self.invalidate();
        Ok(link)
    }

    /// Get a link by ID
    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    /// Get the link ending at an input port
    pub fn link_to(&self, node: &str, port: &str) -> Option<&Link> {
        self.links.values().find(|link| link.ends_at(node, port))
    }

    /// Get the links starting at an output port
    pub fn links_from<'a>(
        &'a self,
        node: &'a str,
        port: &'a str,
    ) -> impl Iterator<Item = &'a Link> {
        self.links.values().filter(move |link| link.starts_at(node, port))
    }

    /// Get all links, in insertion order
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Get the number of links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn drop_link(&mut self, id: LinkId) -> Option<Link> {
        let link = self.links.shift_remove(&id)?;
        self.set_attached(&link, false);
        Some(link)
    }

    fn set_attached(&mut self, link: &Link, attached: bool) {
        if let Some(node) = self.nodes.get_mut(&link.from_node) {
            if let Ok(port) = node.core_mut().output_port_mut(&link.from_port) {
                if attached {
                    port.attach();
                } else {
                    port.detach();
                }
            }
        }
        if let Some(node) = self.nodes.get_mut(&link.to_node) {
            if let Ok(port) = node.core_mut().input_port_mut(&link.to_port) {
                if attached {
                    port.attach();
                } else {
                    port.detach();
                }
                // A pulled value must not outlive its link
                port.clear_data();
            }
        }
    }

    // ========================================================================
    // Compilation
    // ========================================================================

    /// Validate the topology, compute the execution order and initialize every node.
    ///
    /// Does nothing when the graph is already compiled.
    pub fn compile(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }

        let order = self.topological_order()?;
        self.check_required_inputs()?;
        let schedule = self.pull_schedule(&order)?;

        if self.nodes.len() > 1 {
            for (name, node) in &self.nodes {
                let core = node.core();
                if core.is_source() && core.is_sink() {
                    tracing::warn!("Graph {}: node {} is not linked", self.name, name);
                }
            }
        }

        // Nodes still holding resources from a previous compilation
        self.release();
        for node in self.nodes.values_mut() {
            node.core_mut().reset_outputs();
        }
        for &index in &order {
            let Some((name, node)) = self.nodes.get_index_mut(index) else {
                continue;
            };
            if let Err(e) = node.init() {
                let name = name.clone();
                tracing::error!("Graph {}: node {} failed to initialize: {}", self.name, name, e);
                self.release();
                return Err(GraphError::NodeInitFailed {
                    node: name,
                    source: Box::new(e),
                });
            }
            node.core_mut().set_initialized(true);
        }

        self.schedule = schedule;
        self.ready = true;
        tracing::info!(
            "Graph {} compiled: {} nodes, {} links",
            self.name,
            self.nodes.len(),
            self.links.len()
        );
        Ok(())
    }

    /// Kahn traversal, ready nodes taken by smallest insertion index
    fn topological_order(&self) -> Result<Vec<usize>> {
        let count = self.nodes.len();
        let mut in_degree = vec![0usize; count];
        let mut successors = vec![Vec::new(); count];
        for link in self.links.values() {
            let from = self.index_of(&link.from_node)?;
            let to = self.index_of(&link.to_node)?;
            successors[from].push(to);
            in_degree[to] += 1;
        }

        let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(index) = ready.pop_first() {
            order.push(index);
            for &next in &successors[index] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < count {
            let nodes: Vec<String> = self
                .nodes
                .keys()
                .enumerate()
                .filter(|(index, _)| in_degree[*index] > 0)
                .map(|(_, name)| name.clone())
                .collect();
            tracing::error!("Graph {} contains a cycle through {:?}", self.name, nodes);
            return Err(GraphError::CyclicGraph { nodes });
        }
        Ok(order)
    }

    fn check_required_inputs(&self) -> Result<()> {
        for (name, node) in &self.nodes {
            if let Some(port) = node
                .core()
                .inputs()
                .iter()
                .find(|port| port.is_required() && !port.is_satisfied())
            {
                return Err(GraphError::UnsatisfiedInput {
                    node: name.clone(),
                    port: port.name().to_string(),
                });
            }
        }
        Ok(())
    }

    fn pull_schedule(&self, order: &[usize]) -> Result<Vec<Step>> {
        let mut position = vec![0usize; self.nodes.len()];
        for (step, &node) in order.iter().enumerate() {
            position[node] = step;
        }
        let mut steps: Vec<Step> = order
            .iter()
            .map(|&node| Step {
                node,
                pulls: Vec::new(),
            })
            .collect();

        for link in self.links.values() {
            let source = self.index_of(&link.from_node)?;
            let target = self.index_of(&link.to_node)?;
            let output = self.port_index(source, PortDirection::Output, &link.from_port)?;
            let input = self.port_index(target, PortDirection::Input, &link.to_port)?;
            steps[position[target]].pulls.push(Pull {
                input,
                source,
                output,
            });
        }
        Ok(steps)
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.nodes
            .get_index_of(name)
            .ok_or_else(|| GraphError::NodeNotFound(name.to_string()))
    }

    fn port_index(&self, node: usize, direction: PortDirection, port: &str) -> Result<usize> {
        let (name, node) = self
            .nodes
            .get_index(node)
            .ok_or_else(|| GraphError::NodeNotFound(format!("#{node}")))?;
        let core = node.core();
        let index = match direction {
            PortDirection::Input => core.input_index(port),
            PortDirection::Output => core.output_index(port),
        };
        index.ok_or_else(|| GraphError::PortNotFound {
            node: name.clone(),
            port: port.to_string(),
        })
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run every node once, in compiled order.
    ///
    /// On failure the remaining nodes are skipped. Outputs already produced are kept and
    /// the graph stays compiled.
    pub fn execute(&mut self) -> Result<()> {
        if !self.ready {
            return Err(GraphError::NotCompiled(self.name.clone()));
        }

        for step in &self.schedule {
            for pull in &step.pulls {
                let value = self
                    .nodes
                    .get_index(pull.source)
                    .and_then(|(_, source)| source.core().outputs().get(pull.output))
                    .and_then(Port::data)
                    .cloned();
                if let Some((_, node)) = self.nodes.get_index_mut(step.node) {
                    if let Some(port) = node.core_mut().inputs_mut().get_mut(pull.input) {
                        port.replace_data(value);
                    }
                }
            }

            let Some((name, node)) = self.nodes.get_index_mut(step.node) else {
                continue;
            };
            tracing::trace!("Graph {}: execute {}", self.name, name);
            if let Err(e) = node.execute() {
                tracing::error!(
                    "Graph {}: node {} ({}) failed: {}",
                    self.name,
                    name,
                    node.type_name(),
                    e
                );
                return Err(GraphError::NodeExecutionFailed {
                    node: name.clone(),
                    type_name: node.type_name().to_string(),
                    source: Box::new(e),
                });
            }
        }
        Ok(())
    }

    /// Destroy the resources of every initialized node.
    ///
    /// Topology is kept; the graph must be compiled again before the next execution.
    pub fn release(&mut self) {
        for node in self.nodes.values_mut().rev() {
            if node.core().is_initialized() {
                node.destroy();
                node.core_mut().set_initialized(false);
            }
        }
        self.ready = false;
        self.schedule.clear();
    }

    /// Remove every node and link
    pub fn clear(&mut self) -> Result<()> {
        self.check_unprotected()?;
        self.release();
        self.links.clear();
        self.nodes.clear();
        self.should_save = true;
        Ok(())
    }

    /// Whether the graph is compiled and can be executed
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Whether a topology change happened since the last compilation
    pub fn needs_recompile(&self) -> bool {
        !self.ready
    }

    /// Compiled execution order, empty when not compiled
    pub fn order(&self) -> Vec<&str> {
        self.schedule
            .iter()
            .filter_map(|step| self.nodes.get_index(step.node))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Compiled execution order grouped by depth, empty when not compiled.
    ///
    /// Nodes of a level only depend on nodes of previous levels.
    pub fn levels(&self) -> Vec<Vec<&str>> {
        let mut depth = vec![0usize; self.nodes.len()];
        let mut levels: Vec<Vec<&str>> = Vec::new();
        for step in &self.schedule {
            let level = step
                .pulls
                .iter()
                .map(|pull| depth[pull.source] + 1)
                .max()
                .unwrap_or(0);
            depth[step.node] = level;
            let Some((name, _)) = self.nodes.get_index(step.node) else {
                continue;
            };
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(name.as_str());
        }
        levels
    }

    fn invalidate(&mut self) {
        self.ready = false;
        self.schedule.clear();
        self.should_save = true;
    }

    // ========================================================================
    // Data accessors
    // ========================================================================

    /// Inputs the host may feed: not linked and not fed by an enclosing graph
    pub fn data_setters(&self) -> Vec<DataAccessor> {
        self.accessors(PortDirection::Input, |port| {
            !port.is_linked() && !port.is_exposed()
        })
    }

    /// Outputs the host may read: not linked to any input
    pub fn data_getters(&self) -> Vec<DataAccessor> {
        self.accessors(PortDirection::Output, |port| !port.is_linked())
    }

    fn accessors(
        &self,
        direction: PortDirection,
        filter: impl Fn(&Port) -> bool,
    ) -> Vec<DataAccessor> {
        let mut accessors = Vec::new();
        for (name, node) in &self.nodes {
            let ports = match direction {
                PortDirection::Input => node.core().inputs(),
                PortDirection::Output => node.core().outputs(),
            };
            for port in ports {
                if !filter(port) {
                    continue;
                }
                accessors.push(DataAccessor {
                    node: name.clone(),
                    port: port.name().to_string(),
                    data_type: port.data_type().clone(),
                    required: port.is_required(),
                });
            }
        }
        accessors
    }

    /// Inject a value into an unlinked input
    pub fn set_input<T>(&mut self, node: &str, port: &str, value: T) -> Result<()>
    where
        T: Any + Send + Sync + fmt::Debug,
    {
        self.set_input_value(node, port, PortValue::new(value))
    }

    /// Inject an already wrapped value into an unlinked input
    pub fn set_input_value(&mut self, node: &str, port: &str, value: PortValue) -> Result<()> {
        self.nodes
            .get_mut(node)
            .ok_or_else(|| GraphError::NodeNotFound(node.to_string()))?
            .core_mut()
            .set_input_value(port, value)
    }

    /// Typed value of an output
    pub fn output<T: Any>(&self, node: &str, port: &str) -> Result<&T> {
        self.nodes
            .get(node)
            .ok_or_else(|| GraphError::NodeNotFound(node.to_string()))?
            .core()
            .output::<T>(port)
    }

    /// Current value of an output
    pub fn output_value(&self, node: &str, port: &str) -> Result<&PortValue> {
        self.nodes
            .get(node)
            .ok_or_else(|| GraphError::NodeNotFound(node.to_string()))?
            .core()
            .output_value(port)
    }

    /// Mark an input as fed by an enclosing graph
    pub(crate) fn expose_input(&mut self, node: &str, port: &str, exposed: bool) -> Result<()> {
        self.nodes
            .get_mut(node)
            .ok_or_else(|| GraphError::NodeNotFound(node.to_string()))?
            .core_mut()
            .input_port_mut(port)?
            .set_exposed(exposed);
        self.ready = false;
        self.schedule.clear();
        Ok(())
    }

    /// Store a value on an exposed input, `None` clearing it
    pub(crate) fn feed_input(
        &mut self,
        node: &str,
        port: &str,
        value: Option<PortValue>,
    ) -> Result<()> {
        self.nodes
            .get_mut(node)
            .ok_or_else(|| GraphError::NodeNotFound(node.to_string()))?
            .core_mut()
            .input_port_mut(port)?
            .replace_data(value);
        Ok(())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Whether the topology changed since the graph was loaded or saved
    pub fn should_be_saved(&self) -> bool {
        self.should_save
    }

    /// Whether nodes and links are protected from removal
    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// Protect nodes and links from removal
    pub fn set_protected(&mut self, protected: bool) {
        self.protected = protected;
    }

    fn check_unprotected(&self) -> Result<()> {
        if self.protected {
            return Err(GraphError::Protected(self.name.clone()));
        }
        Ok(())
    }

    /// Describe the graph for persistence
    pub fn to_description(&self) -> Result<GraphDescription> {
        let mut description = GraphDescription::new(self.name.as_str());
        for (name, node) in &self.nodes {
            let config = node.to_persisted().map_err(|e| GraphError::Persistence {
                node: name.clone(),
                source: Box::new(e),
            })?;
            description.nodes.push(NodeDescription {
                instance: name.clone(),
                model: node.type_name().to_string(),
                config,
                metadata: node.core().metadata().cloned(),
            });
        }
        description.links = self
            .links
            .values()
            .map(|link| {
                LinkDescription::new(
                    link.from_node.as_str(),
                    link.from_port.as_str(),
                    link.to_node.as_str(),
                    link.to_port.as_str(),
                )
            })
            .collect();
        Ok(description)
    }

    /// Rebuild a graph from its description.
    ///
    /// Nodes are built through `factories`, links go through [`Graph::add_link`].
    pub fn from_description(description: &GraphDescription, factories: FactorySet) -> Result<Self> {
        let mut graph = Self::with_factories(description.name.as_str(), factories);
        for node in &description.nodes {
            graph.create_node(node)?;
        }
        for link in &description.links {
            graph.add_link(&link.out_node, &link.out_port, &link.in_node, &link.in_port)?;
        }
        graph.should_save = false;
        Ok(graph)
    }

    /// Save to a file, the format being picked from the extension
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.to_description()?.save(path)?;
        self.should_save = false;
        tracing::info!("Graph {} saved to {:?}", self.name, path);
        Ok(())
    }

    /// Load from a file, the format being picked from the extension
    pub fn load(path: &Path, factories: FactorySet) -> Result<Self> {
        let description = GraphDescription::load(path)?;
        let graph = Self::from_description(&description, factories)?;
        tracing::info!(
            "Graph {} loaded from {:?}: {} nodes, {} links",
            graph.name,
            path,
            graph.nodes.len(),
            graph.links.len()
        );
        Ok(graph)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.release();
    }
}
