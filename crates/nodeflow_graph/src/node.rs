// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the graph framework.
//!
//! A node is split in two parts: a [`NodeCore`] holding the state the graph manages
//! (names, ports, lifecycle flag, editor metadata) and a [`Node`] implementation holding
//! whatever the node computes with.

use crate::error::{GraphError, NodeError, Result};
use crate::port::{Port, PortDirection};
use crate::value::PortValue;
use std::any::Any;
use std::fmt;

/// State shared by every node: identity and ports
#[derive(Debug, Clone)]
pub struct NodeCore {
    instance_name: String,
    type_name: String,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    initialized: bool,
    metadata: Option<serde_json::Value>,
}

impl NodeCore {
    /// Create a core without ports
    pub fn new(instance_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            type_name: type_name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            initialized: false,
            metadata: None,
        }
    }

    /// Instance name, unique within the owning graph
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Type name, as registered in a node factory
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub(crate) fn set_instance_name(&mut self, name: impl Into<String>) {
        self.instance_name = name.into();
    }

    pub(crate) fn set_type_name(&mut self, name: impl Into<String>) {
        self.type_name = name.into();
    }

    /// Register an input port and return its index
    pub fn add_input(&mut self, port: Port) -> Result<usize> {
        self.add_port(port, PortDirection::Input)
    }

    /// Register an output port and return its index
    pub fn add_output(&mut self, port: Port) -> Result<usize> {
        self.add_port(port, PortDirection::Output)
    }

    fn add_port(&mut self, port: Port, side: PortDirection) -> Result<usize> {
        if port.direction() != side {
            return Err(GraphError::DirectionMismatch {
                node: self.instance_name.clone(),
                port: port.name().to_string(),
                expected: side,
            });
        }
        let ports = match side {
            PortDirection::Input => &mut self.inputs,
            PortDirection::Output => &mut self.outputs,
        };
        if ports.iter().any(|p| p.name() == port.name()) {
            return Err(GraphError::DuplicatePortName {
                node: self.instance_name.clone(),
                port: port.name().to_string(),
            });
        }
        ports.push(port);
        Ok(ports.len() - 1)
    }

    /// Input ports, in declaration order
    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    /// Output ports, in declaration order
    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut [Port] {
        &mut self.inputs
    }

    pub(crate) fn outputs_mut(&mut self) -> &mut [Port] {
        &mut self.outputs
    }

    /// Index of the named input
    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|p| p.name() == name)
    }

    /// Index of the named output
    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|p| p.name() == name)
    }

    /// Get an input port by name
    pub fn input_port(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name() == name)
    }

    /// Get an output port by name
    pub fn output_port(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name() == name)
    }

    /// Get a port by direction and name
    pub fn port(&self, direction: PortDirection, name: &str) -> Option<&Port> {
        match direction {
            PortDirection::Input => self.input_port(name),
            PortDirection::Output => self.output_port(name),
        }
    }

    /// Get all ports
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    pub(crate) fn input_port_mut(&mut self, name: &str) -> Result<&mut Port> {
        match self.input_index(name) {
            Some(index) => Ok(&mut self.inputs[index]),
            None => Err(self.missing_port(name, PortDirection::Input)),
        }
    }

    pub(crate) fn output_port_mut(&mut self, name: &str) -> Result<&mut Port> {
        match self.output_index(name) {
            Some(index) => Ok(&mut self.outputs[index]),
            None => Err(self.missing_port(name, PortDirection::Output)),
        }
    }

    pub(crate) fn require_port(&self, direction: PortDirection, name: &str) -> Result<&Port> {
        self.port(direction, name)
            .ok_or_else(|| self.missing_port(name, direction))
    }

    /// Error for a port missing on the requested side
    fn missing_port(&self, name: &str, expected: PortDirection) -> GraphError {
        let other = match expected {
            PortDirection::Input => PortDirection::Output,
            PortDirection::Output => PortDirection::Input,
        };
        if self.port(other, name).is_some() {
            GraphError::DirectionMismatch {
                node: self.instance_name.clone(),
                port: name.to_string(),
                expected,
            }
        } else {
            GraphError::PortNotFound {
                node: self.instance_name.clone(),
                port: name.to_string(),
            }
        }
    }

    /// Current value of an input (pulled, injected or default)
    pub fn input_value(&self, name: &str) -> Result<&PortValue> {
        let port = self
            .input_port(name)
            .ok_or_else(|| self.missing_port(name, PortDirection::Input))?;
        port.data().ok_or_else(|| self.no_data(name))
    }

    /// Typed value of an input
    pub fn input<T: Any>(&self, name: &str) -> Result<&T> {
        let value = self.input_value(name)?;
        self.typed(name, value)
    }

    /// Typed value of an input, `None` when nothing is available
    pub fn try_input<T: Any>(&self, name: &str) -> Result<Option<&T>> {
        match self.input_value(name) {
            Ok(value) => self.typed(name, value).map(Some),
            Err(GraphError::NoData { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Current value of an output
    pub fn output_value(&self, name: &str) -> Result<&PortValue> {
        let port = self
            .output_port(name)
            .ok_or_else(|| self.missing_port(name, PortDirection::Output))?;
        port.data().ok_or_else(|| self.no_data(name))
    }

    /// Typed value of an output
    pub fn output<T: Any>(&self, name: &str) -> Result<&T> {
        let value = self.output_value(name)?;
        self.typed(name, value)
    }

    /// Publish a value on an output
    pub fn set_output<T>(&mut self, name: &str, value: T) -> Result<()>
    where
        T: Any + Send + Sync + fmt::Debug,
    {
        self.set_output_value(name, PortValue::new(value))
    }

    /// Publish an already wrapped value on an output
    pub fn set_output_value(&mut self, name: &str, value: PortValue) -> Result<()> {
        self.output_port_mut(name)?.set_data(value);
        Ok(())
    }

    /// Inject a value into an unlinked input
    pub fn set_input_value(&mut self, name: &str, value: PortValue) -> Result<()> {
        let node = self.instance_name.clone();
        let port = self.input_port_mut(name)?;
        if port.is_linked() {
            return Err(GraphError::AlreadyLinked {
                node,
                port: name.to_string(),
            });
        }
        port.set_data(value);
        Ok(())
    }

    /// Drop every value published on the outputs
    pub fn reset_outputs(&mut self) {
        for port in &mut self.outputs {
            port.clear_data();
        }
    }

    /// Whether the node went through `init()` since it was last destroyed
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }

    /// Application-specific data attached to the node (e.g. editor position)
    pub fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }

    /// Attach application-specific data to the node
    pub fn set_metadata(&mut self, metadata: Option<serde_json::Value>) {
        self.metadata = metadata;
    }

    /// A node is a source when none of its inputs is linked
    pub fn is_source(&self) -> bool {
        self.inputs.iter().all(|p| !p.is_linked())
    }

    /// A node is a sink when none of its outputs is linked
    pub fn is_sink(&self) -> bool {
        self.outputs.iter().all(|p| !p.is_linked())
    }

    fn no_data(&self, port: &str) -> GraphError {
        GraphError::NoData {
            node: self.instance_name.clone(),
            port: port.to_string(),
        }
    }

    fn typed<'a, T: Any>(&self, port: &str, value: &'a PortValue) -> Result<&'a T> {
        value
            .downcast_ref::<T>()
            .ok_or_else(|| GraphError::ValueTypeMismatch {
                node: self.instance_name.clone(),
                port: port.to_string(),
                expected: std::any::type_name::<T>(),
                found: value.data_type().clone(),
            })
    }
}

/// Upcast helper so concrete node types can be recovered from `dyn Node`
pub trait AsAny: Any {
    /// Borrow as `dyn Any`
    fn as_any(&self) -> &dyn Any;
    /// Mutably borrow as `dyn Any`
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The unit of computation.
///
/// The owning graph calls [`Node::init`] once per successful compilation, [`Node::execute`]
/// once per pass, and [`Node::destroy`] when the node's resources must be released.
pub trait Node: AsAny + Send {
    /// Shared node state
    fn core(&self) -> &NodeCore;

    /// Mutable shared node state
    fn core_mut(&mut self) -> &mut NodeCore;

    /// Allocate per-compile resources.
    ///
    /// Outputs are cleared by the graph right before this call.
    fn init(&mut self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Consume the current input values and publish output values
    fn execute(&mut self) -> Result<(), NodeError>;

    /// Release resources acquired in `init()`
    fn destroy(&mut self) {}

    /// Serialize the node's private configuration.
    ///
    /// Ports and links belong to the graph description and are not part of the payload.
    /// `Ok(None)` means the node has no configuration.
    fn to_persisted(&self) -> Result<Option<serde_json::Value>, NodeError> {
        Ok(None)
    }

    /// Restore the node's private configuration
    fn from_persisted(&mut self, _config: &serde_json::Value) -> Result<(), NodeError> {
        Ok(())
    }

    /// Instance name
    fn instance_name(&self) -> &str {
        self.core().instance_name()
    }

    /// Type name
    fn type_name(&self) -> &str {
        self.core().type_name()
    }

    /// Nested graph, for nodes embedding one
    fn subgraph(&self) -> Option<&crate::graph::Graph> {
        None
    }
}

impl fmt::Debug for dyn Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("instance_name", &self.instance_name())
            .field("type_name", &self.type_name())
            .finish()
    }
}

/// Nodes the default factory creator can build from an instance name alone
pub trait NodeConstructor: Node + Sized {
    /// Build a node with its ports declared
    fn construct(instance_name: &str) -> Result<Self>;
}

/// Recover a concrete node type
pub fn downcast_ref<T: Node>(node: &dyn Node) -> Option<&T> {
    node.as_any().downcast_ref::<T>()
}

/// Recover a concrete node type, mutably
pub fn downcast_mut<T: Node>(node: &mut dyn Node) -> Option<&mut T> {
    node.as_any_mut().downcast_mut::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataType;

    struct Doubler {
        core: NodeCore,
    }

    impl NodeConstructor for Doubler {
        fn construct(instance_name: &str) -> Result<Self> {
            let mut core = NodeCore::new(instance_name, "Doubler");
            core.add_input(Port::input_of::<i32>("in").required())?;
            core.add_output(Port::output_of::<i32>("out"))?;
            Ok(Self { core })
        }
    }

    impl Node for Doubler {
        fn core(&self) -> &NodeCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut NodeCore {
            &mut self.core
        }

        fn execute(&mut self) -> Result<(), NodeError> {
            let value = *self.core.input::<i32>("in")?;
            self.core.set_output("out", value * 2)?;
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_port_name() {
        let mut core = NodeCore::new("n", "T");
        core.add_input(Port::input_of::<f32>("x")).unwrap();
        let err = core.add_input(Port::input_of::<i32>("x")).unwrap_err();
        assert!(matches!(err, GraphError::DuplicatePortName { .. }));

        // Same name on the other side is fine
        assert_eq!(core.add_output(Port::output_of::<f32>("x")).unwrap(), 0);
    }

    #[test]
    fn test_port_side_is_checked() {
        let mut core = NodeCore::new("n", "T");
        let err = core.add_input(Port::output_of::<f32>("x")).unwrap_err();
        assert!(matches!(
            err,
            GraphError::DirectionMismatch { expected: PortDirection::Input, .. }
        ));
    }

    #[test]
    fn test_execute_reads_and_publishes() {
        let mut node = Doubler::construct("double").unwrap();
        let err = node.execute().unwrap_err();
        assert!(matches!(err, NodeError::Graph(GraphError::NoData { .. })));

        node.core_mut().set_input_value("in", PortValue::new(21)).unwrap();
        node.execute().unwrap();
        assert_eq!(node.core().output::<i32>("out").unwrap(), &42);
    }

    #[test]
    fn test_typed_access_mismatch() {
        let mut node = Doubler::construct("double").unwrap();
        node.core_mut().set_input_value("in", PortValue::new(1.5f64)).unwrap();
        let err = node.core().input::<i32>("in").unwrap_err();
        match err {
            GraphError::ValueTypeMismatch { found, .. } => assert_eq!(found, DataType::of::<f64>()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_port_reports_direction() {
        let node = Doubler::construct("double").unwrap();
        assert!(matches!(
            node.core().input_value("out"),
            Err(GraphError::DirectionMismatch { .. })
        ));
        assert!(matches!(
            node.core().input_value("nope"),
            Err(GraphError::PortNotFound { .. })
        ));
    }

    #[test]
    fn test_downcast() {
        let node: Box<dyn Node> = Box::new(Doubler::construct("double").unwrap());
        assert!(downcast_ref::<Doubler>(node.as_ref()).is_some());
        assert_eq!(node.type_name(), "Doubler");
    }
}
