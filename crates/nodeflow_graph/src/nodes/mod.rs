// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in node types.
//!
//! - [`SourceNode`]: publishes a configured value, overridable through its `from` input
//! - [`SinkNode`]: requires a value on `from` and forwards it to its `data` output
//! - [`FunctionNode`] / [`BinaryOpNode`]: wrap a closure (not persistable)
//! - [`TransformNode`] / [`ReduceNode`]: map or fold a `Vec<T>` collection
//! - [`GraphNode`]: embeds a whole graph as a single node

mod functional;
mod graph_node;
mod sinks;
mod sources;

pub use functional::{
    BinaryOpNode, FunctionNode, ReduceNode, ReduceOperator, TransformNode, TransformOperator,
};
pub use graph_node::{GraphNode, GRAPH_NODE_TYPE};
pub use sinks::{
    BoolSink, FloatSink, FloatVectorSink, IntSink, IntVectorSink, SinkNode, StringSink,
};
pub use sources::{
    BoolSource, FloatSource, FloatVectorSource, IntSource, IntVectorSource, SourceNode,
    StringSource,
};

use crate::error::Result;
use crate::factory::NodeFactory;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Name of the factory returned by [`builtin_factory`]
pub const BUILTIN_FACTORY_NAME: &str = "nodeflow.builtins";

/// Value types handled by the generic sources and sinks
pub trait ValueKind:
    Any + Clone + Default + fmt::Debug + Send + Sync + Serialize + DeserializeOwned
{
    /// Prefix of the node type names, e.g. `Float` for `FloatSource`
    const LABEL: &'static str;
}

impl ValueKind for f32 {
    const LABEL: &'static str = "Float";
}

impl ValueKind for i64 {
    const LABEL: &'static str = "Int";
}

impl ValueKind for bool {
    const LABEL: &'static str = "Bool";
}

impl ValueKind for String {
    const LABEL: &'static str = "String";
}

impl ValueKind for Vec<f32> {
    const LABEL: &'static str = "FloatVector";
}

impl ValueKind for Vec<i64> {
    const LABEL: &'static str = "IntVector";
}

fn register_value_kind<T: ValueKind>(factory: &mut NodeFactory) -> Result<()> {
    factory.register_node_creator::<SourceNode<T>>(SourceNode::<T>::model_name(), "Sources")?;
    factory.register_node_creator::<SinkNode<T>>(SinkNode::<T>::model_name(), "Sinks")?;
    Ok(())
}

fn register_functionals<T: ValueKind>(factory: &mut NodeFactory) -> Result<()> {
    factory.register_node_creator::<TransformNode<T>>(
        TransformNode::<T>::model_name(),
        "Functionals",
    )?;
    factory.register_node_creator::<ReduceNode<T>>(ReduceNode::<T>::model_name(), "Functionals")?;
    Ok(())
}

fn register_builtins(factory: &mut NodeFactory) -> Result<()> {
    register_value_kind::<f32>(factory)?;
    register_value_kind::<i64>(factory)?;
    register_value_kind::<bool>(factory)?;
    register_value_kind::<String>(factory)?;
    register_value_kind::<Vec<f32>>(factory)?;
    register_value_kind::<Vec<i64>>(factory)?;
    register_functionals::<f32>(factory)?;
    register_functionals::<i64>(factory)?;
    factory.register_creator(GRAPH_NODE_TYPE, "Graphs", graph_node::creator())?;
    Ok(())
}

/// Factory building every built-in node the factories can restore
pub fn builtin_factory() -> Result<Arc<NodeFactory>> {
    let mut factory = NodeFactory::new(BUILTIN_FACTORY_NAME);
    register_builtins(&mut factory)?;
    tracing::debug!("Registered {} built-in node types", factory.len());
    Ok(Arc::new(factory))
}
