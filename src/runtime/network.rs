//! Network construction and validation
//!
//! A [`Network`] is a declarative description of a dataflow graph: nodes are
//! created from [`NodeKind`]s, then their input ports are wired with
//! [`Binding`]s. Nothing computes until the network is handed to an
//! execution engine. Reusable graph fragments implement [`NetworkDef`] and
//! can be instantiated either standalone with [`Network::from_def`] or
//! embedded in a parent graph as a single composite node with
//! [`Network::create_subnet`].

use std::any::Any;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use super::dispatch::Dispatch;
use super::engine::{CompositeNode, EntryEvent};
use super::errors::ConfigError;
use super::harness::{CallbackSlot, PublishData, PublisherHandle, SubscribeData, SubscriberHandle};
use super::node::NodeKind;
use super::ports::{Binding, IntoBinding, NodeId, OutputRef, PortKind, PortSpec};

const ENTRY_CAPACITY: usize = 64;

/// Handle to a created node, used for wiring and boundary-handle lookup.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    id: NodeId,
    name: String,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference to one of this node's output ports, for use as a binding.
    pub fn out(&self, port: impl Into<String>) -> OutputRef {
        OutputRef {
            node: self.id,
            port: port.into(),
        }
    }
}

/// One created node: its kind, dispatch policy and input wiring.
pub(crate) struct NodeSlot {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) kind: Box<dyn NodeKind>,
    pub(crate) dispatch: Dispatch,
    pub(crate) input_specs: Vec<PortSpec>,
    pub(crate) output_names: Vec<String>,
    pub(crate) bindings: HashMap<String, Binding>,
    pub(crate) entry: bool,
}

impl NodeSlot {
    pub(crate) fn port_kind(&self, port: &str) -> Option<PortKind> {
        self.input_specs
            .iter()
            .find(|s| s.name == port)
            .map(|s| s.kind)
    }
}

/// Boundary input ports a [`NetworkDef`] exposes to its parent.
#[derive(Default)]
pub struct ExternalInputs {
    pub(crate) names: Vec<String>,
}

impl ExternalInputs {
    /// Declare a boundary input and get a reference usable as a binding
    /// inside the definition.
    pub fn declare(&mut self, name: impl Into<String>) -> super::ports::ExternalRef {
        let name = name.into();
        if !self.names.contains(&name) {
            self.names.push(name.clone());
        }
        super::ports::ExternalRef { name }
    }
}

/// Boundary output ports a [`NetworkDef`] exposes to its parent.
#[derive(Default)]
pub struct ExternalOutputs {
    pub(crate) declared: Vec<String>,
    pub(crate) bound: HashMap<String, OutputRef>,
}

impl ExternalOutputs {
    /// Declare a boundary output. It must be bound before the definition
    /// is instantiated.
    pub fn declare(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.declared.contains(&name) {
            self.declared.push(name);
        }
    }

    /// Bind a boundary output to an inner node's output port. Declares the
    /// name if it was not declared yet.
    pub fn bind(&mut self, name: impl Into<String>, source: OutputRef) {
        let name = name.into();
        if !self.declared.contains(&name) {
            self.declared.push(name.clone());
        }
        self.bound.insert(name, source);
    }
}

/// A reusable graph description.
///
/// `build` populates a fresh network and declares the boundary ports.
/// The same definition can back a standalone network or any number of
/// composite nodes inside parent graphs.
pub trait NetworkDef {
    /// Name for the instantiated network, also used as the composite
    /// node's kind tag.
    fn name(&self) -> &str;

    /// Create nodes, wire them, declare boundary ports. Returns the
    /// handles of every node created.
    fn build(
        &self,
        net: &mut Network,
        inputs: &mut ExternalInputs,
        outputs: &mut ExternalOutputs,
    ) -> Result<Vec<NodeHandle>, ConfigError>;
}

/// A declarative dataflow graph under construction.
pub struct Network {
    name: String,
    pub(crate) nodes: Vec<NodeSlot>,
    names: HashMap<String, NodeId>,
    entry_tx: Sender<EntryEvent>,
    entry_rx: Option<Receiver<EntryEvent>>,
    publishers: HashMap<NodeId, Arc<AtomicBool>>,
    subscribers: HashMap<NodeId, CallbackSlot>,
    pub(crate) declared_inputs: Vec<String>,
    pub(crate) external_outputs: HashMap<String, OutputRef>,
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_entry_capacity(name, ENTRY_CAPACITY)
    }

    /// Create a network with a specific entry-queue capacity. A full queue
    /// makes publishers block, which is the back-pressure mechanism.
    pub fn with_entry_capacity(name: impl Into<String>, capacity: usize) -> Self {
        let (entry_tx, entry_rx) = bounded(capacity);
        Self {
            name: name.into(),
            nodes: Vec::new(),
            names: HashMap::new(),
            entry_tx,
            entry_rx: Some(entry_rx),
            publishers: HashMap::new(),
            subscribers: HashMap::new(),
            declared_inputs: Vec::new(),
            external_outputs: HashMap::new(),
        }
    }

    /// Instantiate a definition as a standalone, validated network.
    pub fn from_def(def: &dyn NetworkDef) -> Result<Network, ConfigError> {
        let mut net = Network::new(def.name());
        let mut inputs = ExternalInputs::default();
        let mut outputs = ExternalOutputs::default();
        let created = def.build(&mut net, &mut inputs, &mut outputs)?;
        debug!(network = %net.name, nodes = created.len(), "built from definition");
        for name in &outputs.declared {
            if !outputs.bound.contains_key(name) {
                return Err(ConfigError::UnboundExternalOutput(name.clone()));
            }
        }
        net.declared_inputs = inputs.names;
        net.external_outputs = outputs.bound;
        net.validate()?;
        Ok(net)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a node with an auto-generated name and default dispatch.
    pub fn create<K: NodeKind + 'static>(&mut self, kind: K) -> Result<NodeHandle, ConfigError> {
        self.create_with(kind, None, Dispatch::SingleShot)
    }

    /// Create a node with an explicit name.
    pub fn create_named<K: NodeKind + 'static>(
        &mut self,
        kind: K,
        name: &str,
    ) -> Result<NodeHandle, ConfigError> {
        self.create_with(kind, Some(name), Dispatch::SingleShot)
    }

    /// Create a node with an explicit dispatch policy.
    pub fn create_dispatched<K: NodeKind + 'static>(
        &mut self,
        kind: K,
        dispatch: Dispatch,
    ) -> Result<NodeHandle, ConfigError> {
        self.create_with(kind, None, dispatch)
    }

    /// Create a node, choosing name and dispatch.
    ///
    /// [`PublishData`] nodes become stream entries: their dispatch is
    /// forced to per-value delivery, and a [`PublisherHandle`] can be
    /// obtained for them. [`SubscribeData`] nodes register their callback
    /// slot so a [`SubscriberHandle`] can be attached.
    pub fn create_with<K: NodeKind + 'static>(
        &mut self,
        kind: K,
        name: Option<&str>,
        dispatch: Dispatch,
    ) -> Result<NodeHandle, ConfigError> {
        let any: &dyn Any = &kind;
        let entry = any.is::<PublishData>();
        let slot = any.downcast_ref::<SubscribeData>().map(SubscribeData::slot);
        let dispatch = if entry {
            match dispatch {
                Dispatch::SingleShot | Dispatch::Repeat => Dispatch::Repeat,
                Dispatch::TriggeredMultiShot { .. } => {
                    return Err(ConfigError::InvalidDispatch {
                        node: name.unwrap_or(kind.kind()).to_string(),
                        reason: "stream entries dispatch once per pushed value".to_string(),
                    })
                }
            }
        } else {
            dispatch
        };
        self.insert(Box::new(kind), name, dispatch, entry, slot)
    }

    /// Create a node from a registered kind tag.
    pub fn create_tagged(&mut self, tag: &str, name: Option<&str>) -> Result<NodeHandle, ConfigError> {
        let kind = crate::nodes::registry::create_node(tag)?;
        self.insert(kind, name, Dispatch::SingleShot, false, None)
    }

    /// Embed a definition as a single composite node. The definition's
    /// boundary inputs and outputs become the node's ports.
    pub fn create_subnet(
        &mut self,
        def: &dyn NetworkDef,
        name: Option<&str>,
    ) -> Result<NodeHandle, ConfigError> {
        let inner = Network::from_def(def)?;
        let composite = CompositeNode::from_network(inner)?;
        self.insert(Box::new(composite), name, Dispatch::SingleShot, false, None)
    }

    fn insert(
        &mut self,
        kind: Box<dyn NodeKind>,
        name: Option<&str>,
        dispatch: Dispatch,
        entry: bool,
        slot: Option<CallbackSlot>,
    ) -> Result<NodeHandle, ConfigError> {
        let id = NodeId::new(self.nodes.len());
        let name = match name {
            Some(n) => n.to_string(),
            None => format!("{}_{}", kind.kind(), id.as_usize()),
        };
        if self.names.contains_key(&name) {
            return Err(ConfigError::DuplicateName(name));
        }
        debug!(network = %self.name, node = %name, kind = kind.kind(), "create node");
        let input_specs = kind.inputs();
        let output_names = kind.outputs();
        if entry {
            self.publishers.insert(id, Arc::new(AtomicBool::new(false)));
        }
        if let Some(slot) = slot {
            self.subscribers.insert(id, slot);
        }
        self.names.insert(name.clone(), id);
        self.nodes.push(NodeSlot {
            id,
            name: name.clone(),
            kind,
            dispatch,
            input_specs,
            output_names,
            bindings: HashMap::new(),
            entry,
        });
        Ok(NodeHandle { id, name })
    }

    /// Wire one input port. Accepts literals, [`OutputRef`]s and external
    /// references; unknown ports and dangling output references fail here
    /// rather than at execution time.
    pub fn set(
        &mut self,
        node: &NodeHandle,
        port: &str,
        binding: impl IntoBinding,
    ) -> Result<(), ConfigError> {
        let binding = binding.into_binding();
        if let Binding::Output(r) = &binding {
            let producer = self
                .nodes
                .get(r.node.as_usize())
                .ok_or_else(|| ConfigError::NodeNotFound(format!("#{}", r.node.as_usize())))?;
            if !producer.output_names.iter().any(|o| o == &r.port) {
                return Err(ConfigError::OutputNotFound {
                    node: producer.name.clone(),
                    port: r.port.clone(),
                });
            }
        }
        let slot = self
            .nodes
            .get_mut(node.id.as_usize())
            .ok_or_else(|| ConfigError::NodeNotFound(node.name.clone()))?;
        if !slot.input_specs.iter().any(|s| s.name == port) {
            return Err(ConfigError::InputNotFound {
                node: slot.name.clone(),
                port: port.to_string(),
            });
        }
        slot.bindings.insert(port.to_string(), binding);
        Ok(())
    }

    /// Handle for pushing values into a [`PublishData`] entry node.
    pub fn publisher(&self, node: &NodeHandle) -> Result<PublisherHandle, ConfigError> {
        let closed = self
            .publishers
            .get(&node.id)
            .cloned()
            .ok_or_else(|| ConfigError::NotAPublisher(node.name.clone()))?;
        Ok(PublisherHandle::new(
            node.id,
            node.name.clone(),
            self.entry_tx.clone(),
            closed,
        ))
    }

    /// Handle for attaching a callback to a [`SubscribeData`] node.
    pub fn subscriber(&self, node: &NodeHandle) -> Result<SubscriberHandle, ConfigError> {
        let slot = self
            .subscribers
            .get(&node.id)
            .cloned()
            .ok_or_else(|| ConfigError::NotASubscriber(node.name.clone()))?;
        Ok(SubscriberHandle::new(node.name.clone(), slot))
    }

    /// Check the wiring is complete and acyclic.
    ///
    /// Run automatically by [`Network::from_def`] and the execution engine;
    /// callers assembling a network by hand can run it early for better
    /// error locality.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for slot in &self.nodes {
            for spec in &slot.input_specs {
                if spec.required
                    && spec.default.is_none()
                    && !slot.bindings.contains_key(&spec.name)
                {
                    return Err(ConfigError::UnboundInput {
                        node: slot.name.clone(),
                        port: spec.name.clone(),
                    });
                }
            }
            if let Dispatch::TriggeredMultiShot { length, advance } = slot.dispatch {
                if length == 0 || advance == 0 {
                    return Err(ConfigError::InvalidDispatch {
                        node: slot.name.clone(),
                        reason: "window length and advance must be positive".to_string(),
                    });
                }
                let bound_data = slot
                    .input_specs
                    .iter()
                    .filter(|s| s.kind == PortKind::Data && slot.bindings.contains_key(&s.name))
                    .count();
                if bound_data != 1 {
                    return Err(ConfigError::InvalidDispatch {
                        node: slot.name.clone(),
                        reason: "triggered multi-shot needs exactly one bound data input"
                            .to_string(),
                    });
                }
            }
            for binding in slot.bindings.values() {
                if let Binding::External(ext) = binding {
                    if !self.declared_inputs.contains(ext) {
                        return Err(ConfigError::UnknownExternalInput {
                            node: slot.name.clone(),
                            port: ext.clone(),
                        });
                    }
                }
            }
        }
        for (name, source) in &self.external_outputs {
            let producer = self
                .nodes
                .get(source.node.as_usize())
                .ok_or_else(|| ConfigError::UnboundExternalOutput(name.clone()))?;
            if !producer.output_names.iter().any(|o| o == &source.port) {
                return Err(ConfigError::OutputNotFound {
                    node: producer.name.clone(),
                    port: source.port.clone(),
                });
            }
        }
        fire_order(&self.nodes)?;
        Ok(())
    }

    pub(crate) fn take_entry_rx(&mut self) -> Option<Receiver<EntryEvent>> {
        self.entry_rx.take()
    }

    pub(crate) fn fire_order(&self) -> Result<Vec<usize>, ConfigError> {
        fire_order(&self.nodes)
    }
}

/// Dependency order over data edges.
///
/// Kahn's algorithm; ties resolve to the earliest-created node so firing
/// order is deterministic. Parameter edges do not constrain the order, the
/// engine's multi-pass rounds resolve those.
fn fire_order(nodes: &[NodeSlot]) -> Result<Vec<usize>, ConfigError> {
    let n = nodes.len();
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];
    for (j, slot) in nodes.iter().enumerate() {
        for (port, binding) in &slot.bindings {
            if let Binding::Output(r) = binding {
                if slot.port_kind(port) == Some(PortKind::Data) {
                    consumers[r.node.as_usize()].push(j);
                    indegree[j] += 1;
                }
            }
        }
    }
    let mut heap: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(i)) = heap.pop() {
        order.push(i);
        for &j in &consumers[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                heap.push(Reverse(j));
            }
        }
    }
    if order.len() != n {
        let culprit = indegree
            .iter()
            .position(|d| *d > 0)
            .map(|i| nodes[i].name.clone())
            .unwrap_or_default();
        return Err(ConfigError::CyclicData(culprit));
    }
    Ok(order)
}
