// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value sinks.

use super::ValueKind;
use crate::error::{NodeError, Result};
use crate::node::{Node, NodeConstructor, NodeCore};
use crate::port::Port;
use std::marker::PhantomData;

/// Float sink
pub type FloatSink = SinkNode<f32>;
/// Integer sink
pub type IntSink = SinkNode<i64>;
/// Boolean sink
pub type BoolSink = SinkNode<bool>;
/// String sink
pub type StringSink = SinkNode<String>;
/// Float collection sink
pub type FloatVectorSink = SinkNode<Vec<f32>>;
/// Integer collection sink
pub type IntVectorSink = SinkNode<Vec<i64>>;

/// Requires a value on `from` and forwards it, unchanged, to its `data` output
pub struct SinkNode<T: ValueKind> {
    core: NodeCore,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ValueKind> SinkNode<T> {
    /// Type name under which the built-in factory registers this sink
    pub fn model_name() -> String {
        format!("{}Sink", T::LABEL)
    }

    /// Last value received
    pub fn value(&self) -> Option<&T> {
        self.core.output::<T>("data").ok()
    }
}

impl<T: ValueKind> NodeConstructor for SinkNode<T> {
    fn construct(instance_name: &str) -> Result<Self> {
        let mut core = NodeCore::new(instance_name, Self::model_name());
        core.add_input(Port::input_of::<T>("from").required())?;
        core.add_output(Port::output_of::<T>("data"))?;
        Ok(Self {
            core,
            _marker: PhantomData,
        })
    }
}

impl<T: ValueKind> Node for SinkNode<T> {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn execute(&mut self) -> Result<(), NodeError> {
        let value = self.core.input_value("from")?.clone();
        self.core.set_output_value("data", value)?;
        Ok(())
    }
}
