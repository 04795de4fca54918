// SPDX-License-Identifier: MIT OR Apache-2.0
//! Data type identifiers and the type-erased values that flow through ports.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Identifier of the data type carried by a port.
///
/// Two ports can only be linked when their data types compare equal. The set of types is
/// open-ended, so the identifier is an interned string key rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataType(Cow<'static, str>);

impl DataType {
    /// Data type of the Rust type `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(Cow::Borrowed(std::any::type_name::<T>()))
    }

    /// Application-defined data type, e.g. `"Texture"`
    pub fn named(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// The key this type is compared by
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type DebugFn = fn(&(dyn Any + Send + Sync), &mut fmt::Formatter<'_>) -> fmt::Result;

/// A value stored on a port.
///
/// Values are shared read-only: cloning a `PortValue` clones the handle, so every
/// downstream input reading the same output sees the same allocation.
#[derive(Clone)]
pub struct PortValue {
    data: Arc<dyn Any + Send + Sync>,
    data_type: DataType,
    debug: DebugFn,
}

impl PortValue {
    /// Wrap a value of type `T`
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync + fmt::Debug,
    {
        Self {
            data: Arc::new(value),
            data_type: DataType::of::<T>(),
            debug: debug_as::<T>,
        }
    }

    /// Data type of the wrapped value
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Typed access to the wrapped value
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Check if the wrapped value has type `T`
    pub fn is<T: Any>(&self) -> bool {
        self.data.is::<T>()
    }

    /// Check if both handles share the same allocation
    pub fn ptr_eq(&self, other: &PortValue) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

fn debug_as<T: Any + fmt::Debug>(
    data: &(dyn Any + Send + Sync),
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    match data.downcast_ref::<T>() {
        Some(value) => fmt::Debug::fmt(value, f),
        None => f.write_str("<?>"),
    }
}

impl fmt::Debug for PortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.debug)(self.data.as_ref(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_identity() {
        assert_eq!(DataType::of::<f32>(), DataType::of::<f32>());
        assert_ne!(DataType::of::<f32>(), DataType::of::<f64>());
        assert_eq!(DataType::named("Texture"), DataType::named("Texture"));
        assert_eq!(DataType::of::<i32>().name(), "i32");
    }

    #[test]
    fn test_value_sharing() {
        let value = PortValue::new(vec![1u8, 2, 3]);
        let shared = value.clone();
        assert!(value.ptr_eq(&shared));
        assert_eq!(shared.downcast_ref::<Vec<u8>>(), Some(&vec![1, 2, 3]));
        assert!(shared.downcast_ref::<String>().is_none());
        assert_eq!(value.data_type(), &DataType::of::<Vec<u8>>());
    }

    #[test]
    fn test_value_debug() {
        let value = PortValue::new(2.5f32);
        assert_eq!(format!("{value:?}"), "2.5");
    }

    #[test]
    fn test_data_type_serialization() {
        let ron_str = ron::to_string(&DataType::named("Color")).unwrap();
        assert_eq!(ron_str, "\"Color\"");
        let loaded: DataType = ron::from_str(&ron_str).unwrap();
        assert_eq!(loaded, DataType::named("Color"));
    }
}
