// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value sources.

use super::ValueKind;
use crate::error::{GraphError, NodeError, Result};
use crate::node::{Node, NodeConstructor, NodeCore};
use crate::port::Port;
use serde::{Deserialize, Serialize};

/// Float source
pub type FloatSource = SourceNode<f32>;
/// Integer source
pub type IntSource = SourceNode<i64>;
/// Boolean source
pub type BoolSource = SourceNode<bool>;
/// String source
pub type StringSource = SourceNode<String>;
/// Float collection source
pub type FloatVectorSource = SourceNode<Vec<f32>>;
/// Integer collection source
pub type IntVectorSource = SourceNode<Vec<i64>>;

#[derive(Serialize, Deserialize)]
struct SourceConfig<T> {
    value: T,
}

/// Publishes its configured value on `to`.
///
/// When the optional `from` input holds a value (linked upstream or injected by the
/// host), that value is published instead.
pub struct SourceNode<T: ValueKind> {
    core: NodeCore,
    value: T,
}

impl<T: ValueKind> SourceNode<T> {
    /// Type name under which the built-in factory registers this source
    pub fn model_name() -> String {
        format!("{}Source", T::LABEL)
    }

    /// Create a source publishing `value`
    pub fn new(instance_name: &str, value: T) -> Result<Self> {
        let mut core = NodeCore::new(instance_name, Self::model_name());
        core.add_input(Port::input_of::<T>("from"))?;
        core.add_output(Port::output_of::<T>("to"))?;
        Ok(Self { core, value })
    }

    /// Configured value
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Change the configured value
    pub fn set_value(&mut self, value: T) {
        self.value = value;
    }
}

impl<T: ValueKind> NodeConstructor for SourceNode<T> {
    fn construct(instance_name: &str) -> Result<Self> {
        Self::new(instance_name, T::default())
    }
}

impl<T: ValueKind> Node for SourceNode<T> {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn execute(&mut self) -> Result<(), NodeError> {
        match self.core.input_value("from") {
            Ok(value) => {
                let value = value.clone();
                self.core.set_output_value("to", value)?;
            }
            Err(GraphError::NoData { .. }) => {
                let value = self.value.clone();
                self.core.set_output("to", value)?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn to_persisted(&self) -> Result<Option<serde_json::Value>, NodeError> {
        let config = SourceConfig {
            value: self.value.clone(),
        };
        Ok(Some(serde_json::to_value(config)?))
    }

    fn from_persisted(&mut self, config: &serde_json::Value) -> Result<(), NodeError> {
        let config: SourceConfig<T> = serde_json::from_value(config.clone())?;
        self.value = config.value;
        Ok(())
    }
}
