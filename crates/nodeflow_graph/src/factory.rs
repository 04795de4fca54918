// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node factories: building nodes from their persisted description.
//!
//! A [`NodeFactory`] maps a type name to a creator function. Graphs hold a [`FactorySet`],
//! an ordered list of factories consulted in priority order when a description is loaded.
//! Factories are populated at startup and shared behind `Arc`, so they cannot change while
//! a graph uses them.

use crate::description::NodeDescription;
use crate::error::{GraphError, Result};
use crate::node::{Node, NodeConstructor};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Function building a node from its description.
///
/// The factory set is passed along so that nodes embedding a graph can build their
/// content with the same factories.
pub type NodeCreator =
    Arc<dyn Fn(&NodeDescription, &FactorySet) -> Result<Box<dyn Node>> + Send + Sync>;

/// A registered creator
#[derive(Clone)]
pub struct CreatorEntry {
    /// Creator function
    pub creator: NodeCreator,
    /// Category, used by editors to group node types
    pub category: String,
}

impl fmt::Debug for CreatorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreatorEntry")
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Registry of node creators
#[derive(Debug, Clone)]
pub struct NodeFactory {
    name: String,
    creators: IndexMap<String, CreatorEntry>,
}

impl NodeFactory {
    /// Create a new empty factory
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            creators: IndexMap::new(),
        }
    }

    /// Factory name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register the default creator for `T`.
    ///
    /// The created node is built with [`NodeConstructor::construct`], then restored from
    /// the description's configuration when there is one.
    pub fn register_node_creator<T: NodeConstructor>(
        &mut self,
        type_name: impl Into<String>,
        category: impl Into<String>,
    ) -> Result<()> {
        let creator: NodeCreator = Arc::new(
            |desc: &NodeDescription, _: &FactorySet| -> Result<Box<dyn Node>> {
                let mut node = T::construct(&desc.instance)?;
                if let Some(config) = &desc.config {
                    node.from_persisted(config)
                        .map_err(|e| GraphError::Persistence {
                            node: desc.instance.clone(),
                            source: Box::new(e),
                        })?;
                }
                Ok(Box::new(node))
            },
        );
        self.register_creator(type_name, category, creator)
    }

    /// Register a custom creator
    pub fn register_creator(
        &mut self,
        type_name: impl Into<String>,
        category: impl Into<String>,
        creator: NodeCreator,
    ) -> Result<()> {
        let type_name = type_name.into();
        if self.creators.contains_key(&type_name) {
            return Err(GraphError::DuplicateTypeName {
                factory: self.name.clone(),
                type_name,
            });
        }
        tracing::debug!("Factory {} registers {}", self.name, type_name);
        self.creators.insert(
            type_name,
            CreatorEntry {
                creator,
                category: category.into(),
            },
        );
        Ok(())
    }

    /// Check if a creator is registered for a type
    pub fn contains(&self, type_name: &str) -> bool {
        self.creators.contains_key(type_name)
    }

    /// Get a registered creator
    pub fn get(&self, type_name: &str) -> Option<&CreatorEntry> {
        self.creators.get(type_name)
    }

    /// Registered type names, in registration order
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.creators.keys().map(String::as_str)
    }

    /// Registered type names of a category
    pub fn types_in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a str> {
        self.creators
            .iter()
            .filter(move |(_, entry)| entry.category == category)
            .map(|(name, _)| name.as_str())
    }

    /// Number of registered creators
    pub fn len(&self) -> usize {
        self.creators.len()
    }

    /// Check if the factory has no creator
    pub fn is_empty(&self) -> bool {
        self.creators.is_empty()
    }
}

/// Ordered set of factories, first added has the highest priority
#[derive(Debug, Clone, Default)]
pub struct FactorySet {
    factories: Vec<Arc<NodeFactory>>,
}

impl FactorySet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set holding the built-in node factory
    pub fn with_builtins() -> Result<Self> {
        Ok(Self {
            factories: vec![crate::nodes::builtin_factory()?],
        })
    }

    /// Append a factory with the lowest priority
    pub fn add_factory(&mut self, factory: Arc<NodeFactory>) -> Result<()> {
        if self.factory(factory.name()).is_some() {
            return Err(GraphError::DuplicateFactoryName(factory.name().to_string()));
        }
        self.factories.push(factory);
        Ok(())
    }

    /// Remove a factory by name
    pub fn remove_factory(&mut self, name: &str) -> Option<Arc<NodeFactory>> {
        let index = self.factories.iter().position(|f| f.name() == name)?;
        Some(self.factories.remove(index))
    }

    /// Get a factory by name
    pub fn factory(&self, name: &str) -> Option<&Arc<NodeFactory>> {
        self.factories.iter().find(|f| f.name() == name)
    }

    /// Factories, in priority order
    pub fn factories(&self) -> impl Iterator<Item = &Arc<NodeFactory>> {
        self.factories.iter()
    }

    /// Check if any factory knows a type
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.iter().any(|f| f.contains(type_name))
    }

    /// Every known type name, in priority order, without duplicates
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.factories.iter().flat_map(|f| f.type_names()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Every category used by the attached factories, sorted
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = self
            .factories
            .iter()
            .flat_map(|f| f.creators.values())
            .map(|entry| entry.category.as_str())
            .collect();
        categories.sort_unstable();
        categories.dedup();
        categories
    }

    /// Build a node, using the first factory that knows its type
    pub fn create_node(&self, description: &NodeDescription) -> Result<Box<dyn Node>> {
        let entry = self
            .factories
            .iter()
            .find_map(|f| f.get(&description.model))
            .ok_or_else(|| GraphError::UnknownNodeType(description.model.clone()))?;
        let mut node = (entry.creator)(description, self)?;
        let core = node.core_mut();
        if core.instance_name() != description.instance {
            core.set_instance_name(description.instance.clone());
        }
        if core.type_name() != description.model {
            core.set_type_name(description.model.clone());
        }
        if description.metadata.is_some() {
            core.set_metadata(description.metadata.clone());
        }
        Ok(node)
    }

    /// Number of factories
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if the set has no factory
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
