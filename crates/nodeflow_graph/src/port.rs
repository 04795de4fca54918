// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node inputs/outputs.

use crate::value::{DataType, PortValue};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    /// Input port (data sink)
    Input,
    /// Output port (data source)
    Output,
}

/// A port on a node.
///
/// An output port stores the value published by its node. An input port stores the value
/// pulled from the output it is linked to, or a value injected by the host when it is not
/// linked, and falls back to its default value otherwise. Inputs fed by an enclosing graph
/// never fall back: the enclosing port carries the default.
#[derive(Debug, Clone)]
pub struct Port {
    name: String,
    direction: PortDirection,
    data_type: DataType,
    required: bool,
    exposed: bool,
    link_count: usize,
    default_value: Option<PortValue>,
    value: Option<PortValue>,
}

impl Port {
    /// Create a new port
    pub fn new(name: impl Into<String>, data_type: DataType, direction: PortDirection) -> Self {
        Self {
            name: name.into(),
            direction,
            data_type,
            required: false,
            exposed: false,
            link_count: 0,
            default_value: None,
            value: None,
        }
    }

    /// Create a new input port
    pub fn input(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, PortDirection::Input)
    }

    /// Create a new output port
    pub fn output(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, PortDirection::Output)
    }

    /// Create an input port carrying values of type `T`
    pub fn input_of<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::input(name, DataType::of::<T>())
    }

    /// Create an output port carrying values of type `T`
    pub fn output_of<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::output(name, DataType::of::<T>())
    }

    /// Mark as required
    pub fn required(mut self) -> Self {
        self.must_be_linked();
        self
    }

    /// Set the default value
    pub fn with_default<T>(mut self, value: T) -> Self
    where
        T: Any + Send + Sync + fmt::Debug,
    {
        self.default_value = Some(PortValue::new(value));
        self
    }

    /// Set the default value from an already wrapped value
    pub fn with_default_value(mut self, value: PortValue) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Declare that this input must be linked for its graph to compile.
    ///
    /// Has no effect on output ports.
    pub fn must_be_linked(&mut self) {
        if self.direction == PortDirection::Input {
            self.required = true;
        }
    }

    /// Port name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Port direction
    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Declared data type
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Whether the port must be linked
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether at least one link touches this port
    pub fn is_linked(&self) -> bool {
        self.link_count > 0
    }

    /// Number of links touching this port
    pub fn link_count(&self) -> usize {
        self.link_count
    }

    /// Whether this input is fed through the boundary of an enclosing graph
    pub fn is_exposed(&self) -> bool {
        self.exposed
    }

    /// Whether a link or the enclosing graph supplies this port
    pub fn is_satisfied(&self) -> bool {
        self.is_linked() || self.exposed
    }

    /// Default value, if any
    pub fn default_value(&self) -> Option<&PortValue> {
        self.default_value.as_ref()
    }

    /// Current value.
    ///
    /// An unlinked, unexposed input without a value yields its default value.
    pub fn data(&self) -> Option<&PortValue> {
        match self.direction {
            PortDirection::Output => self.value.as_ref(),
            PortDirection::Input if self.is_satisfied() => self.value.as_ref(),
            PortDirection::Input => self.value.as_ref().or(self.default_value.as_ref()),
        }
    }

    /// Whether [`Port::data`] would return a value
    pub fn has_data(&self) -> bool {
        self.data().is_some()
    }

    /// Store a value. No type coercion is performed.
    pub fn set_data(&mut self, value: PortValue) {
        self.value = Some(value);
    }

    /// Remove the stored value
    pub fn clear_data(&mut self) {
        self.value = None;
    }

    /// Replace the stored value, `None` clearing it
    pub fn replace_data(&mut self, value: Option<PortValue>) {
        self.value = value;
    }

    /// Check if a link from this port to `other` would be valid
    pub fn can_link_to(&self, other: &Port) -> bool {
        self.direction == PortDirection::Output
            && other.direction == PortDirection::Input
            && self.data_type == other.data_type
            && !other.is_linked()
    }

    pub(crate) fn attach(&mut self) {
        self.link_count += 1;
    }

    pub(crate) fn detach(&mut self) {
        self.link_count = self.link_count.saturating_sub(1);
    }

    pub(crate) fn set_exposed(&mut self, exposed: bool) {
        self.exposed = exposed;
    }
}

/// Public description of a port, as listed by graph accessors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataAccessor {
    /// Owning node instance name
    pub node: String,
    /// Port name
    pub port: String,
    /// Declared data type
    pub data_type: DataType,
    /// Whether the port is a required input
    pub required: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fallback() {
        let mut port = Port::input_of::<f32>("gain").with_default(1.0f32);
        assert_eq!(port.data().and_then(|v| v.downcast_ref::<f32>()), Some(&1.0));

        port.set_data(PortValue::new(4.0f32));
        assert_eq!(port.data().and_then(|v| v.downcast_ref::<f32>()), Some(&4.0));

        port.clear_data();
        assert!(port.has_data());
    }

    #[test]
    fn test_linked_input_ignores_default() {
        let mut port = Port::input_of::<f32>("gain").with_default(1.0f32);
        port.attach();
        assert!(!port.has_data());
        port.detach();
        assert!(port.has_data());
    }

    #[test]
    fn test_exposed_input_ignores_default() {
        let mut port = Port::input_of::<f32>("gain").with_default(1.0f32);
        port.set_exposed(true);
        assert!(!port.has_data());
        port.set_data(PortValue::new(2.0f32));
        assert_eq!(port.data().and_then(|v| v.downcast_ref::<f32>()), Some(&2.0));
        port.set_exposed(false);
        port.clear_data();
        assert!(port.has_data());
    }

    #[test]
    fn test_output_has_no_default() {
        let port = Port::output_of::<f32>("out").with_default(1.0f32);
        assert!(!port.has_data());
    }

    #[test]
    fn test_required_only_on_inputs() {
        let input = Port::input_of::<u32>("in").required();
        let output = Port::output_of::<u32>("out").required();
        assert!(input.is_required());
        assert!(!output.is_required());
    }

    #[test]
    fn test_can_link_to() {
        let out = Port::output_of::<f32>("out");
        let mut input = Port::input_of::<f32>("in");
        let other = Port::input_of::<i32>("other");

        assert!(out.can_link_to(&input));
        assert!(!out.can_link_to(&other));
        assert!(!input.can_link_to(&out));

        input.attach();
        assert!(!out.can_link_to(&input));
    }
}
