//! Port declarations and input bindings
//!
//! A node kind declares its input ports as [`PortSpec`]s and its output
//! ports by name. Wiring attaches a [`Binding`] to each input: a literal
//! value, a reference to another node's output port, or a reference to a
//! network boundary port.

use super::value::Value;

/// Unique identifier for a node in a network, assigned in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// Whether a port carries a stream of values or a build-time parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    /// Receives a stream of values over time; gates dispatcher arming.
    Data,
    /// Bound once at build time (literal or producer output), re-read on
    /// every firing.
    Param,
}

/// Declaration of one input port on a node kind.
#[derive(Debug, Clone)]
pub struct PortSpec {
    pub name: String,
    pub kind: PortKind,
    pub required: bool,
    pub default: Option<Value>,
}

impl PortSpec {
    /// A required data port.
    pub fn data(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PortKind::Data,
            required: true,
            default: None,
        }
    }

    /// A required parameter port.
    pub fn param(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PortKind::Param,
            required: true,
            default: None,
        }
    }

    /// Mark the port optional with no default.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Provide a default, making the port optional.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self.required = false;
        self
    }
}

/// Reference to a producer node's output port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputRef {
    pub node: NodeId,
    pub port: String,
}

/// Reference to a network boundary input port.
#[derive(Debug, Clone)]
pub struct ExternalRef {
    pub name: String,
}

/// Wiring attached to one input port.
#[derive(Debug, Clone)]
pub enum Binding {
    /// Fixed value resolved at build time.
    Literal(Value),
    /// Fed by another node's output port.
    Output(OutputRef),
    /// Fed by the owning network's boundary input.
    External(String),
}

/// Conversion into a [`Binding`], so `Network::set` accepts literals,
/// output references and external references uniformly.
pub trait IntoBinding {
    fn into_binding(self) -> Binding;
}

impl IntoBinding for Binding {
    fn into_binding(self) -> Binding {
        self
    }
}

impl IntoBinding for OutputRef {
    fn into_binding(self) -> Binding {
        Binding::Output(self)
    }
}

impl IntoBinding for ExternalRef {
    fn into_binding(self) -> Binding {
        Binding::External(self.name)
    }
}

impl IntoBinding for Value {
    fn into_binding(self) -> Binding {
        Binding::Literal(self)
    }
}

macro_rules! literal_binding {
    ($($ty:ty),* $(,)?) => {
        $(impl IntoBinding for $ty {
            fn into_binding(self) -> Binding {
                Binding::Literal(Value::from(self))
            }
        })*
    };
}

literal_binding!(i64, i32, usize, f64, f32, bool, &str, String, super::value::Frame);
