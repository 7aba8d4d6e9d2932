//! Node capability contract
//!
//! Defines the [`NodeKind`] trait that all processing nodes implement.
//! A node kind is a black-box capability: given a named input assignment
//! it produces a named output assignment. The engine owns wiring, arming
//! and ordering; a kind only sees its own ports.

use std::collections::HashMap;

use super::errors::{WorkError, WorkResult};
use super::ports::PortSpec;
use super::value::{Frame, Value};

/// A unit of computation with fixed, named input and output ports.
///
/// Firing must be a pure function of the input assignment: a kind may keep
/// internal scratch state, but the runtime assumes the same inputs always
/// yield equivalent outputs.
pub trait NodeKind: Send {
    /// Capability tag for this kind (used in logs, errors and the registry).
    fn kind(&self) -> &str;

    /// Input port declarations.
    fn inputs(&self) -> Vec<PortSpec>;

    /// Output port names this kind can produce.
    fn outputs(&self) -> Vec<String>;

    /// Evaluate one firing: read the input assignment, produce outputs.
    fn fire(&mut self, inputs: &FiringInputs) -> WorkResult<FiringOutputs>;
}

/// Named input assignment handed to a node firing.
pub struct FiringInputs {
    values: HashMap<String, Value>,
}

impl FiringInputs {
    pub(crate) fn new(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    /// Look up a port's value, if bound and produced.
    pub fn get(&self, port: &str) -> Option<&Value> {
        self.values.get(port)
    }

    /// Look up a port's value, failing with `MissingInput` when absent.
    pub fn require(&self, port: &str) -> WorkResult<&Value> {
        self.values
            .get(port)
            .ok_or_else(|| WorkError::MissingInput(port.to_string()))
    }

    fn typed<T: 'static>(&self, port: &str) -> WorkResult<&T> {
        let value = self.require(port)?;
        value.get::<T>().ok_or_else(|| WorkError::TypeMismatch {
            port: port.to_string(),
            expected: std::any::type_name::<T>(),
            found: value.type_name(),
        })
    }

    /// A required [`Frame`] input.
    pub fn frame(&self, port: &str) -> WorkResult<&Frame> {
        self.typed::<Frame>(port)
    }

    /// A required integer parameter.
    pub fn int(&self, port: &str) -> WorkResult<i64> {
        self.typed::<i64>(port).copied()
    }

    /// A required float parameter.
    pub fn float(&self, port: &str) -> WorkResult<f64> {
        self.typed::<f64>(port).copied()
    }

    /// A required string parameter.
    pub fn str(&self, port: &str) -> WorkResult<&str> {
        self.typed::<String>(port).map(|s| s.as_str())
    }

    /// A required boolean parameter.
    pub fn flag(&self, port: &str) -> WorkResult<bool> {
        self.typed::<bool>(port).copied()
    }
}

/// Named output assignment produced by a node firing.
#[derive(Default)]
pub struct FiringOutputs {
    values: HashMap<String, Value>,
}

impl FiringOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one output port's value.
    pub fn set(&mut self, port: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(port.into(), value.into());
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(port, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn into_values(self) -> HashMap<String, Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let mut map = HashMap::new();
        map.insert("LENGTH".to_string(), Value::from(512i64));
        map.insert("NAME".to_string(), Value::from("tf.zip"));
        let inputs = FiringInputs::new(map);

        assert_eq!(inputs.int("LENGTH").unwrap(), 512);
        assert_eq!(inputs.str("NAME").unwrap(), "tf.zip");
        assert!(matches!(
            inputs.int("MISSING"),
            Err(WorkError::MissingInput(_))
        ));
        assert!(matches!(
            inputs.float("LENGTH"),
            Err(WorkError::TypeMismatch { .. })
        ));
    }
}
