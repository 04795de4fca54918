// SPDX-License-Identifier: MIT OR Apache-2.0
//! Closure-backed nodes.
//!
//! [`FunctionNode`] and [`BinaryOpNode`] own a closure with no persisted form, so they
//! refuse [`Node::to_persisted`] and are not registered in the built-in factory.
//!
//! [`TransformNode`] and [`ReduceNode`] work on `Vec<T>` collections. Their operator is set
//! at construction (identity by default) and can be replaced per pass through their `f`
//! input. The operator is never persisted.

use super::ValueKind;
use crate::error::{NodeError, Result};
use crate::node::{Node, NodeConstructor, NodeCore};
use crate::port::Port;
use crate::value::PortValue;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Computes the output value from the node's current inputs
type Operation = Box<dyn Fn(&NodeCore) -> Result<PortValue, NodeError> + Send>;

fn not_persistable(core: &NodeCore) -> NodeError {
    NodeError::NotPersistable(core.type_name().to_string())
}

/// Applies a unary function: `out = f(in)`
pub struct FunctionNode {
    core: NodeCore,
    operation: Operation,
}

impl FunctionNode {
    /// Type name of function nodes
    pub const TYPE_NAME: &'static str = "Function";

    /// Create a node applying `f` to its required `in` input
    pub fn new<I, O, F>(instance_name: &str, f: F) -> Result<Self>
    where
        I: Any,
        O: Any + Send + Sync + fmt::Debug,
        F: Fn(&I) -> O + Send + 'static,
    {
        let mut core = NodeCore::new(instance_name, Self::TYPE_NAME);
        core.add_input(Port::input_of::<I>("in").required())?;
        core.add_output(Port::output_of::<O>("out"))?;
        let operation: Operation =
            Box::new(move |core: &NodeCore| -> Result<PortValue, NodeError> {
                Ok(PortValue::new(f(core.input::<I>("in")?)))
            });
        Ok(Self { core, operation })
    }
}

impl Node for FunctionNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn execute(&mut self) -> Result<(), NodeError> {
        let value = (self.operation)(&self.core)?;
        self.core.set_output_value("out", value)?;
        Ok(())
    }

    fn to_persisted(&self) -> Result<Option<serde_json::Value>, NodeError> {
        Err(not_persistable(&self.core))
    }

    fn from_persisted(&mut self, _config: &serde_json::Value) -> Result<(), NodeError> {
        Err(not_persistable(&self.core))
    }
}

/// Applies a binary operator: `r = f(a, b)`
pub struct BinaryOpNode {
    core: NodeCore,
    operation: Operation,
}

impl BinaryOpNode {
    /// Type name of binary operator nodes
    pub const TYPE_NAME: &'static str = "BinaryOp";

    /// Create a node applying `f` to its required `a` and `b` inputs
    pub fn new<A, B, R, F>(instance_name: &str, f: F) -> Result<Self>
    where
        A: Any,
        B: Any,
        R: Any + Send + Sync + fmt::Debug,
        F: Fn(&A, &B) -> R + Send + 'static,
    {
        let mut core = NodeCore::new(instance_name, Self::TYPE_NAME);
        core.add_input(Port::input_of::<A>("a").required())?;
        core.add_input(Port::input_of::<B>("b").required())?;
        core.add_output(Port::output_of::<R>("r"))?;
        let operation: Operation =
            Box::new(move |core: &NodeCore| -> Result<PortValue, NodeError> {
                let a = core.input::<A>("a")?;
                let b = core.input::<B>("b")?;
                Ok(PortValue::new(f(a, b)))
            });
        Ok(Self { core, operation })
    }
}

impl Node for BinaryOpNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn execute(&mut self) -> Result<(), NodeError> {
        let value = (self.operation)(&self.core)?;
        self.core.set_output_value("r", value)?;
        Ok(())
    }

    fn to_persisted(&self) -> Result<Option<serde_json::Value>, NodeError> {
        Err(not_persistable(&self.core))
    }

    fn from_persisted(&mut self, _config: &serde_json::Value) -> Result<(), NodeError> {
        Err(not_persistable(&self.core))
    }
}

/// Value of an optional input.
///
/// A linked input whose upstream produced nothing is an error, not an absent value.
fn optional_input<'a, V: Any>(core: &'a NodeCore, name: &str) -> Result<Option<&'a V>> {
    if core.input_port(name).is_some_and(Port::is_linked) {
        core.input::<V>(name).map(Some)
    } else {
        core.try_input::<V>(name)
    }
}

/// Element-wise operator applied by a [`TransformNode`]
pub struct TransformOperator<T>(Arc<dyn Fn(&T) -> T + Send + Sync>);

impl<T> TransformOperator<T> {
    /// Wrap a closure
    pub fn new(f: impl Fn(&T) -> T + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Apply to one element
    pub fn apply(&self, value: &T) -> T {
        (self.0)(value)
    }
}

impl<T> Clone for TransformOperator<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for TransformOperator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransformOperator")
    }
}

/// Folding operator applied by a [`ReduceNode`]: `acc = f(acc, element)`
pub struct ReduceOperator<T>(Arc<dyn Fn(&T, &T) -> T + Send + Sync>);

impl<T> ReduceOperator<T> {
    /// Wrap a closure
    pub fn new(f: impl Fn(&T, &T) -> T + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Fold one element into the accumulator
    pub fn apply(&self, acc: &T, value: &T) -> T {
        (self.0)(acc, value)
    }
}

impl<T> Clone for ReduceOperator<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for ReduceOperator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReduceOperator")
    }
}

/// Maps a collection: `out[i] = f(in[i])`
///
/// Inputs: `in` (`Vec<T>`, required), `f` ([`TransformOperator<T>`], optional).
/// Output: `out` (`Vec<T>`).
pub struct TransformNode<T: ValueKind> {
    core: NodeCore,
    operator: TransformOperator<T>,
}

impl<T: ValueKind> TransformNode<T> {
    /// Type name under which the built-in factory registers this node
    pub fn model_name() -> String {
        format!("{}Transform", T::LABEL)
    }

    /// Create a node applying `operator` unless `f` provides one
    pub fn new(instance_name: &str, operator: TransformOperator<T>) -> Result<Self> {
        let mut core = NodeCore::new(instance_name, Self::model_name());
        core.add_input(Port::input_of::<Vec<T>>("in").required())?;
        core.add_input(Port::input_of::<TransformOperator<T>>("f"))?;
        core.add_output(Port::output_of::<Vec<T>>("out"))?;
        Ok(Self { core, operator })
    }

    /// Replace the operator used when `f` holds none
    pub fn set_operator(&mut self, operator: TransformOperator<T>) {
        self.operator = operator;
    }
}

impl<T: ValueKind> NodeConstructor for TransformNode<T> {
    fn construct(instance_name: &str) -> Result<Self> {
        Self::new(instance_name, TransformOperator::new(T::clone))
    }
}

impl<T: ValueKind> Node for TransformNode<T> {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn execute(&mut self) -> Result<(), NodeError> {
        let operator = optional_input::<TransformOperator<T>>(&self.core, "f")?
            .unwrap_or(&self.operator);
        let values = self.core.input::<Vec<T>>("in")?;
        let result: Vec<T> = values.iter().map(|value| operator.apply(value)).collect();
        self.core.set_output("out", result)?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct ReduceConfig<T> {
    init: T,
}

/// Folds a collection into a single value, starting from an initial value
///
/// Inputs: `in` (`Vec<T>`, required), `f` ([`ReduceOperator<T>`], optional) and `init`
/// (`T`, optional). Output: `out` (`T`). The initial value is persisted.
pub struct ReduceNode<T: ValueKind> {
    core: NodeCore,
    operator: ReduceOperator<T>,
    init: T,
}

impl<T: ValueKind> ReduceNode<T> {
    /// Type name under which the built-in factory registers this node
    pub fn model_name() -> String {
        format!("{}Reduce", T::LABEL)
    }

    /// Create a node folding with `operator` from `init`, unless `f` and `init` override them
    pub fn new(instance_name: &str, operator: ReduceOperator<T>, init: T) -> Result<Self> {
        let mut core = NodeCore::new(instance_name, Self::model_name());
        core.add_input(Port::input_of::<Vec<T>>("in").required())?;
        core.add_input(Port::input_of::<ReduceOperator<T>>("f"))?;
        core.add_input(Port::input_of::<T>("init"))?;
        core.add_output(Port::output_of::<T>("out"))?;
        Ok(Self {
            core,
            operator,
            init,
        })
    }

    /// Replace the operator and initial value used when the inputs hold none
    pub fn set_operator(&mut self, operator: ReduceOperator<T>, init: T) {
        self.operator = operator;
        self.init = init;
    }

    /// Configured initial value
    pub fn init_value(&self) -> &T {
        &self.init
    }
}

impl<T: ValueKind> NodeConstructor for ReduceNode<T> {
    fn construct(instance_name: &str) -> Result<Self> {
        let first = ReduceOperator::new(|acc: &T, _: &T| acc.clone());
        Self::new(instance_name, first, T::default())
    }
}

impl<T: ValueKind> Node for ReduceNode<T> {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn execute(&mut self) -> Result<(), NodeError> {
        let operator =
            optional_input::<ReduceOperator<T>>(&self.core, "f")?.unwrap_or(&self.operator);
        let init = optional_input::<T>(&self.core, "init")?.unwrap_or(&self.init);
        let values = self.core.input::<Vec<T>>("in")?;
        let result = values
            .iter()
            .fold(init.clone(), |acc, value| operator.apply(&acc, value));
        self.core.set_output("out", result)?;
        Ok(())
    }

    fn to_persisted(&self) -> Result<Option<serde_json::Value>, NodeError> {
        let config = ReduceConfig {
            init: self.init.clone(),
        };
        Ok(Some(serde_json::to_value(config)?))
    }

    fn from_persisted(&mut self, config: &serde_json::Value) -> Result<(), NodeError> {
        let config: ReduceConfig<T> = serde_json::from_value(config.clone())?;
        self.init = config.init;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::node::NodeConstructor;
    use crate::description::NodeDescription;
    use crate::factory::FactorySet;
    use crate::nodes::{FloatSink, FloatSource, FloatVectorSink, FloatVectorSource, IntSource};
    use crate::value::DataType;
    use serde_json::json;

    /// `values --> map --> mapped`, `map --> min --> minimum`
    fn collection_pipeline() -> Graph {
        let mut graph = Graph::new("collections");
        graph
            .add_node(Box::new(
                FloatVectorSource::new("values", vec![0.5, 0.25, 0.75]).unwrap(),
            ))
            .unwrap();
        let one_minus = TransformOperator::new(|x: &f32| 1.0 - x);
        graph
            .add_node(Box::new(TransformNode::new("map", one_minus).unwrap()))
            .unwrap();
        let min = ReduceOperator::new(|a: &f32, b: &f32| a.min(*b));
        graph
            .add_node(Box::new(ReduceNode::new("min", min, f32::MAX).unwrap()))
            .unwrap();
        graph.add_node(Box::new(FloatVectorSink::construct("mapped").unwrap())).unwrap();
        graph.add_node(Box::new(FloatSink::construct("minimum").unwrap())).unwrap();
        graph.add_link("values", "to", "map", "in").unwrap();
        graph.add_link("map", "out", "mapped", "from").unwrap();
        graph.add_link("map", "out", "min", "in").unwrap();
        graph.add_link("min", "out", "minimum", "from").unwrap();
        graph
    }

    #[test]
    fn test_function_node() {
        let mut node = FunctionNode::new("len", |s: &String| s.len()).unwrap();
        assert_eq!(node.core().output_port("out").unwrap().data_type(), &DataType::of::<usize>());
        node.core_mut()
            .set_input_value("in", PortValue::new("four".to_string()))
            .unwrap();
        node.execute().unwrap();
        assert_eq!(node.core().output::<usize>("out").unwrap(), &4);
        assert!(matches!(node.to_persisted(), Err(NodeError::NotPersistable(_))));
    }

    #[test]
    fn test_binary_op_in_graph() {
        let mut graph = Graph::new("math");
        graph.add_node(Box::new(FloatSource::new("a", 1.5).unwrap())).unwrap();
        graph.add_node(Box::new(FloatSource::new("b", 2.0).unwrap())).unwrap();
        graph
            .add_node(Box::new(BinaryOpNode::new("mul", |a: &f32, b: &f32| a * b).unwrap()))
            .unwrap();
        graph
            .add_node(Box::new(FunctionNode::new("neg", |x: &f32| -x).unwrap()))
            .unwrap();
        graph.add_node(Box::new(FloatSink::construct("out").unwrap())).unwrap();
        graph.add_link("a", "to", "mul", "a").unwrap();
        graph.add_link("b", "to", "mul", "b").unwrap();
        graph.add_link("mul", "r", "neg", "in").unwrap();
        graph.add_link("neg", "out", "out", "from").unwrap();
        graph.compile().unwrap();
        graph.execute().unwrap();
        assert_eq!(graph.output::<f32>("out", "data").unwrap(), &-3.0);

        graph.set_input("b", "from", 4.0f32).unwrap();
        graph.execute().unwrap();
        assert_eq!(graph.output::<f32>("out", "data").unwrap(), &-6.0);
    }

    #[test]
    fn test_binary_op_rejects_mismatched_operand() {
        let mut graph = Graph::new("math");
        graph.add_node(Box::new(IntSource::new("i", 1).unwrap())).unwrap();
        graph
            .add_node(Box::new(BinaryOpNode::new("add", |a: &f32, b: &f32| a + b).unwrap()))
            .unwrap();
        assert!(matches!(
            graph.add_link("i", "to", "add", "a"),
            Err(crate::error::GraphError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_transform_then_reduce() {
        let mut graph = collection_pipeline();
        graph.compile().unwrap();
        graph.execute().unwrap();
        assert_eq!(graph.output::<Vec<f32>>("mapped", "data").unwrap(), &vec![0.5, 0.75, 0.25]);
        assert_eq!(graph.output::<f32>("minimum", "data").unwrap(), &0.25);

        graph.set_input("min", "init", 0.1f32).unwrap();
        graph.execute().unwrap();
        assert_eq!(graph.output::<f32>("minimum", "data").unwrap(), &0.1);
    }

    #[test]
    fn test_operator_from_input_port() {
        let mut graph = collection_pipeline();
        graph.compile().unwrap();
        graph
            .set_input("map", "f", TransformOperator::new(|x: &f32| 2.0 * x))
            .unwrap();
        graph
            .set_input("min", "f", ReduceOperator::new(|a: &f32, b: &f32| a + b))
            .unwrap();
        graph.set_input("min", "init", 0.0f32).unwrap();
        graph.execute().unwrap();
        assert_eq!(graph.output::<Vec<f32>>("mapped", "data").unwrap(), &vec![1.0, 0.5, 1.5]);
        assert_eq!(graph.output::<f32>("minimum", "data").unwrap(), &3.0);
    }

    #[test]
    fn test_linked_operator() {
        let mut graph = collection_pipeline();
        graph.add_node(Box::new(FloatSource::new("factor", 4.0).unwrap())).unwrap();
        let make_operator = |k: &f32| {
            let k = *k;
            TransformOperator::new(move |x: &f32| x * k)
        };
        graph
            .add_node(Box::new(FunctionNode::new("scale", make_operator).unwrap()))
            .unwrap();
        graph.add_link("factor", "to", "scale", "in").unwrap();
        graph.add_link("scale", "out", "map", "f").unwrap();
        graph.compile().unwrap();
        graph.execute().unwrap();
        assert_eq!(graph.output::<Vec<f32>>("mapped", "data").unwrap(), &vec![2.0, 1.0, 3.0]);
        assert_eq!(graph.output::<f32>("minimum", "data").unwrap(), &1.0);
    }

    #[test]
    fn test_default_operators_from_factory() {
        let factories = FactorySet::with_builtins().unwrap();
        let mut map = factories
            .create_node(&NodeDescription::new("map", "FloatTransform"))
            .unwrap();
        map.core_mut()
            .set_input_value("in", PortValue::new(vec![1.0f32, 2.0]))
            .unwrap();
        map.execute().unwrap();
        assert_eq!(map.core().output::<Vec<f32>>("out").unwrap(), &vec![1.0, 2.0]);

        let description =
            NodeDescription::new("first", "IntReduce").with_config(json!({ "init": 7 }));
        let mut reduce = factories.create_node(&description).unwrap();
        assert_eq!(reduce.to_persisted().unwrap(), Some(json!({ "init": 7 })));
        reduce
            .core_mut()
            .set_input_value("in", PortValue::new(vec![1i64, 2, 3]))
            .unwrap();
        reduce.execute().unwrap();
        assert_eq!(reduce.core().output::<i64>("out").unwrap(), &7);
        let reduce = crate::node::downcast_ref::<ReduceNode<i64>>(reduce.as_ref()).unwrap();
        assert_eq!(reduce.init_value(), &7);
    }

    #[test]
    fn test_reduce_requires_collection() {
        let mut graph = Graph::new("reduce");
        graph
            .add_node(Box::new(ReduceNode::<f32>::construct("sum").unwrap()))
            .unwrap();
        assert!(matches!(
            graph.compile(),
            Err(crate::error::GraphError::UnsatisfiedInput { .. })
        ));
    }
}
