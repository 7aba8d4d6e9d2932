//! Dependency-ordered execution engine
//!
//! The [`Evaluator`] holds the instantiated node states and runs rounds: a
//! round repeatedly sweeps the dependency order, firing every armed node,
//! until no node fires. The [`ExecutionEngine`] wraps an evaluator with the
//! entry-event queue and drives rounds from pushed values until every
//! stream entry is closed and drained.
//!
//! Sub-networks embed as [`CompositeNode`]s: an entire inner evaluator
//! behind an ordinary node interface, firing one inner round per outer
//! firing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, trace};

use super::dispatch::Dispatcher;
use super::errors::{ConfigError, ExecError, WorkError, WorkResult};
use super::network::Network;
use super::node::{FiringInputs, FiringOutputs, NodeKind};
use super::ports::{Binding, NodeId, PortKind, PortSpec};
use super::value::Value;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Payload pushed into the entry queue by a publisher handle.
pub(crate) enum EntryMessage {
    Sample(Value),
    EndOfStream,
}

/// One entry-queue event, addressed to a stream entry node.
pub(crate) struct EntryEvent {
    pub(crate) node: NodeId,
    pub(crate) message: EntryMessage,
}

struct EvalNode {
    name: String,
    kind_tag: String,
    kind: Box<dyn NodeKind>,
    dispatcher: Dispatcher,
    entry: bool,
    /// Data port queued entry values are injected into.
    entry_port: Option<String>,
    /// Data port the multi-shot window is injected into.
    multishot_port: Option<String>,
    /// Current input assignment (literals, defaults, delivered values).
    values: HashMap<String, Value>,
    /// Data ports holding a not-yet-consumed value.
    fresh: HashSet<String>,
    /// Bound data ports that gate arming.
    data_ports: Vec<String>,
    /// Required parameter ports; all must hold a value before any firing.
    required_params: Vec<String>,
    /// Producer indices of data edges, for completion propagation.
    data_source_nodes: Vec<usize>,
    /// Whether any data port is fed from the network boundary.
    external_data: bool,
    done: bool,
    /// Completed firings, for distinguishing new outputs from latched ones.
    firings: u64,
    /// Last produced output assignment.
    outputs: HashMap<String, Value>,
}

/// Instantiated node graph plus the round-based firing loop.
pub(crate) struct Evaluator {
    nodes: Vec<EvalNode>,
    order: Vec<usize>,
    consumers: HashMap<(usize, String), Vec<(usize, String)>>,
    externals: HashMap<String, Vec<(usize, String)>>,
    external_outputs: HashMap<String, (usize, String)>,
}

impl Evaluator {
    pub(crate) fn new(network: Network, order: Vec<usize>) -> Self {
        let mut consumers: HashMap<(usize, String), Vec<(usize, String)>> = HashMap::new();
        let mut externals: HashMap<String, Vec<(usize, String)>> = HashMap::new();
        for (j, slot) in network.nodes.iter().enumerate() {
            for (port, binding) in &slot.bindings {
                match binding {
                    Binding::Output(r) => consumers
                        .entry((r.node.as_usize(), r.port.clone()))
                        .or_default()
                        .push((j, port.clone())),
                    Binding::External(name) => {
                        externals.entry(name.clone()).or_default().push((j, port.clone()))
                    }
                    Binding::Literal(_) => {}
                }
            }
        }
        let external_outputs = network
            .external_outputs
            .iter()
            .map(|(name, r)| (name.clone(), (r.node.as_usize(), r.port.clone())))
            .collect();

        let nodes = network
            .nodes
            .into_iter()
            .map(|slot| {
                let dispatcher = Dispatcher::new(slot.dispatch);
                let multishot_port = if matches!(dispatcher, Dispatcher::MultiShot { .. }) {
                    slot.input_specs
                        .iter()
                        .find(|s| s.kind == PortKind::Data && slot.bindings.contains_key(&s.name))
                        .map(|s| s.name.clone())
                } else {
                    None
                };
                let entry_port = if slot.entry {
                    slot.input_specs
                        .iter()
                        .find(|s| s.kind == PortKind::Data)
                        .map(|s| s.name.clone())
                } else {
                    None
                };

                let mut values = HashMap::new();
                let mut fresh = HashSet::new();
                let mut data_ports = Vec::new();
                let mut data_source_nodes = Vec::new();
                let mut external_data = false;
                for spec in &slot.input_specs {
                    let bound = slot.bindings.get(&spec.name);
                    match bound {
                        Some(Binding::Literal(v)) => {
                            values.insert(spec.name.clone(), v.clone());
                            if spec.kind == PortKind::Data
                                && multishot_port.as_deref() != Some(spec.name.as_str())
                            {
                                fresh.insert(spec.name.clone());
                                data_ports.push(spec.name.clone());
                            }
                        }
                        Some(Binding::Output(r)) => {
                            if spec.kind == PortKind::Data {
                                data_source_nodes.push(r.node.as_usize());
                                if multishot_port.as_deref() != Some(spec.name.as_str()) {
                                    data_ports.push(spec.name.clone());
                                }
                            }
                        }
                        Some(Binding::External(_)) => {
                            if spec.kind == PortKind::Data {
                                external_data = true;
                                if multishot_port.as_deref() != Some(spec.name.as_str()) {
                                    data_ports.push(spec.name.clone());
                                }
                            }
                        }
                        None => {
                            if let Some(default) = &spec.default {
                                values.insert(spec.name.clone(), default.clone());
                            }
                        }
                    }
                }
                let required_params = slot
                    .input_specs
                    .iter()
                    .filter(|s| s.kind == PortKind::Param && s.required)
                    .map(|s| s.name.clone())
                    .collect();

                EvalNode {
                    name: slot.name,
                    kind_tag: slot.kind.kind().to_string(),
                    kind: slot.kind,
                    dispatcher,
                    entry: slot.entry,
                    entry_port,
                    multishot_port,
                    values,
                    fresh,
                    data_ports,
                    required_params,
                    data_source_nodes,
                    external_data,
                    done: false,
                    firings: 0,
                    outputs: HashMap::new(),
                }
            })
            .collect();

        Self {
            nodes,
            order,
            consumers,
            externals,
            external_outputs,
        }
    }

    /// Queue one pushed value at a stream entry.
    pub(crate) fn offer(&mut self, node: NodeId, value: Value) -> Result<(), ExecError> {
        let idx = node.as_usize();
        if idx >= self.nodes.len() {
            return Ok(());
        }
        let n = &mut self.nodes[idx];
        n.dispatcher.offer(value).map_err(|e| ExecError::NodeFailed {
            node: n.name.clone(),
            kind: n.kind_tag.clone(),
            source: e,
        })
    }

    /// Mark one stream entry closed. No further values will arrive.
    pub(crate) fn close_entry(&mut self, node: NodeId) {
        if let Some(n) = self.nodes.get_mut(node.as_usize()) {
            n.dispatcher.close();
        }
    }

    pub(crate) fn close_all_entries(&mut self) {
        for n in &mut self.nodes {
            if n.entry {
                n.dispatcher.close();
            }
        }
    }

    /// Deliver a value to a boundary input's consumers.
    pub(crate) fn inject_external(&mut self, name: &str, value: Value) -> Result<(), ExecError> {
        let targets = self.externals.get(name).cloned().unwrap_or_default();
        for (tgt, port) in targets {
            self.deliver(tgt, &port, value.clone())?;
        }
        Ok(())
    }

    /// Read the current value of a boundary output.
    pub(crate) fn output(&self, name: &str) -> Option<Value> {
        let (idx, port) = self.external_outputs.get(name)?;
        self.nodes[*idx].outputs.get(port).cloned()
    }

    /// Completed firings of a boundary output's producer.
    pub(crate) fn output_firings(&self, name: &str) -> u64 {
        match self.external_outputs.get(name) {
            Some((idx, _)) => self.nodes[*idx].firings,
            None => 0,
        }
    }

    /// Run one round: sweep the dependency order, firing armed nodes, until
    /// the graph quiesces, then refresh completion flags.
    pub(crate) fn run_round(&mut self) -> Result<(), ExecError> {
        for node in &mut self.nodes {
            if let Dispatcher::Repeat { fired_this_round, .. } = &mut node.dispatcher {
                *fired_this_round = false;
            }
        }
        loop {
            let mut fired_any = false;
            for i in 0..self.order.len() {
                let idx = self.order[i];
                if self.armed(idx) {
                    self.fire_node(idx)?;
                    fired_any = true;
                }
            }
            if !fired_any {
                break;
            }
        }
        self.propagate_done();
        Ok(())
    }

    /// Whether every stream entry is closed and fully drained. Vacuously
    /// true for a network with no entries.
    pub(crate) fn all_done(&self) -> bool {
        self.nodes.iter().filter(|n| n.entry).all(|n| n.done)
    }

    fn armed(&self, idx: usize) -> bool {
        let node = &self.nodes[idx];
        if node.done {
            return false;
        }
        if !node.required_params.iter().all(|p| node.values.contains_key(p)) {
            return false;
        }
        match &node.dispatcher {
            Dispatcher::SingleShot { fired } => {
                if node.data_ports.is_empty() {
                    !fired
                } else {
                    node.data_ports.iter().all(|p| node.fresh.contains(p))
                }
            }
            Dispatcher::Repeat {
                queue,
                closed,
                fired_this_round,
            } => {
                if node.entry {
                    !queue.is_empty()
                } else if node.data_ports.is_empty() {
                    !*fired_this_round && !*closed
                } else {
                    node.data_ports.iter().all(|p| node.fresh.contains(p))
                }
            }
            Dispatcher::MultiShot { window } => window.has_window(),
        }
    }

    fn fire_node(&mut self, idx: usize) -> Result<(), ExecError> {
        let mut deliveries = Vec::new();
        {
            let node = &mut self.nodes[idx];
            let mut assignment = node.values.clone();
            let inject = if node.entry {
                node.entry_port.clone()
            } else {
                node.multishot_port.clone()
            };
            if let Some(port) = inject {
                if let Some(value) = node.dispatcher.take_ready() {
                    assignment.insert(port, value);
                }
            }
            trace!(node = %node.name, kind = %node.kind_tag, "fire");
            let outputs = node
                .kind
                .fire(&FiringInputs::new(assignment))
                .map_err(|e| ExecError::NodeFailed {
                    node: node.name.clone(),
                    kind: node.kind_tag.clone(),
                    source: e,
                })?;
            match &mut node.dispatcher {
                Dispatcher::SingleShot { fired } => *fired = true,
                Dispatcher::Repeat { fired_this_round, .. } => *fired_this_round = true,
                Dispatcher::MultiShot { .. } => {}
            }
            node.fresh.clear();
            node.firings += 1;
            node.outputs = outputs.into_values();
            for (port, value) in &node.outputs {
                if let Some(targets) = self.consumers.get(&(idx, port.clone())) {
                    for (tgt, tport) in targets {
                        deliveries.push((*tgt, tport.clone(), value.clone()));
                    }
                }
            }
        }
        for (tgt, port, value) in deliveries {
            self.deliver(tgt, &port, value)?;
        }
        Ok(())
    }

    fn deliver(&mut self, tgt: usize, port: &str, value: Value) -> Result<(), ExecError> {
        let node = &mut self.nodes[tgt];
        if node.multishot_port.as_deref() == Some(port) {
            node.dispatcher.offer(value).map_err(|e| ExecError::NodeFailed {
                node: node.name.clone(),
                kind: node.kind_tag.clone(),
                source: e,
            })?;
        } else {
            if node.data_ports.iter().any(|p| p == port) {
                node.fresh.insert(port.to_string());
            }
            node.values.insert(port.to_string(), value);
        }
        Ok(())
    }

    /// Completion fixpoint: an entry is done when closed and drained; a
    /// data consumer is done when all its producers are done and its
    /// buffers cannot yield another firing. A trailing partial window is
    /// discarded.
    fn propagate_done(&mut self) {
        loop {
            let mut changed = false;
            for i in 0..self.nodes.len() {
                if self.nodes[i].done {
                    continue;
                }
                let node = &self.nodes[i];
                let done = if node.entry {
                    node.dispatcher.is_closed() && !node.dispatcher.has_ready()
                } else if !node.data_source_nodes.is_empty() || node.external_data {
                    !node.external_data
                        && node
                            .data_source_nodes
                            .iter()
                            .all(|&s| self.nodes[s].done)
                        && !node.dispatcher.has_ready()
                } else {
                    match &node.dispatcher {
                        Dispatcher::SingleShot { fired } => *fired,
                        Dispatcher::Repeat { closed, .. } => *closed,
                        Dispatcher::MultiShot { .. } => false,
                    }
                };
                if done {
                    self.nodes[i].done = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }
}

/// A validated sub-network wrapped behind the node interface.
///
/// Boundary inputs become optional data ports; boundary outputs become
/// output ports. Each firing injects whatever inputs are present, runs the
/// inner evaluator to quiescence, and emits only the boundary outputs
/// produced during that round. A latched value from an earlier round, for
/// instance while an inner window node is still buffering, is not
/// re-emitted.
pub(crate) struct CompositeNode {
    name: String,
    input_ports: Vec<PortSpec>,
    output_ports: Vec<String>,
    evaluator: Evaluator,
}

impl CompositeNode {
    pub(crate) fn from_network(network: Network) -> Result<Self, ConfigError> {
        let order = network.fire_order()?;
        let name = network.name().to_string();
        let input_ports = network
            .declared_inputs
            .iter()
            .map(|n| PortSpec::data(n).optional())
            .collect();
        let output_ports = network.external_outputs.keys().cloned().collect();
        Ok(Self {
            name,
            input_ports,
            output_ports,
            evaluator: Evaluator::new(network, order),
        })
    }
}

impl NodeKind for CompositeNode {
    fn kind(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<PortSpec> {
        self.input_ports.clone()
    }

    fn outputs(&self) -> Vec<String> {
        self.output_ports.clone()
    }

    fn fire(&mut self, inputs: &FiringInputs) -> WorkResult<FiringOutputs> {
        for spec in &self.input_ports {
            if let Some(value) = inputs.get(&spec.name) {
                self.evaluator
                    .inject_external(&spec.name, value.clone())
                    .map_err(|e| WorkError::Node(e.to_string()))?;
            }
        }
        let before: Vec<u64> = self
            .output_ports
            .iter()
            .map(|name| self.evaluator.output_firings(name))
            .collect();
        self.evaluator
            .run_round()
            .map_err(|e| WorkError::Node(e.to_string()))?;
        let mut out = FiringOutputs::new();
        for (name, seen) in self.output_ports.iter().zip(before) {
            if self.evaluator.output_firings(name) > seen {
                if let Some(value) = self.evaluator.output(name) {
                    out.set(name.clone(), value);
                }
            }
        }
        Ok(out)
    }
}

/// Drives one network: pulls entry events from the queue, runs evaluation
/// rounds, and returns once every entry is closed and drained, the stop
/// flag is raised, or every publisher handle is gone.
pub struct ExecutionEngine {
    name: String,
    evaluator: Evaluator,
    entry_rx: Receiver<EntryEvent>,
}

impl ExecutionEngine {
    /// Validate and instantiate a network. A network can back at most one
    /// engine; the entry queue moves in here.
    pub fn new(mut network: Network) -> Result<Self, ConfigError> {
        network.validate()?;
        let entry_rx = network
            .take_entry_rx()
            .ok_or_else(|| ConfigError::AlreadyAttached(network.name().to_string()))?;
        let order = network.fire_order()?;
        let name = network.name().to_string();
        Ok(Self {
            name,
            evaluator: Evaluator::new(network, order),
            entry_rx,
        })
    }

    /// Run to completion. Checks `stop` between entry events. A stop
    /// request only stops the wait for new events: everything already
    /// queued, samples included, is still drained and evaluated, so an
    /// ordered close-stop-join shutdown delivers every value pushed before
    /// the close.
    pub fn execute(&mut self, stop: &AtomicBool) -> Result<(), ExecError> {
        debug!(network = %self.name, "execution started");
        self.evaluator.run_round()?;
        while !self.evaluator.all_done() && !stop.load(Ordering::SeqCst) {
            match self.entry_rx.recv_timeout(POLL_INTERVAL) {
                Ok(event) => self.handle(event)?,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    // All publisher handles dropped without closing.
                    self.evaluator.close_all_entries();
                    self.evaluator.run_round()?;
                    break;
                }
            }
        }
        while let Ok(event) = self.entry_rx.try_recv() {
            self.handle(event)?;
        }
        debug!(network = %self.name, "execution finished");
        Ok(())
    }

    fn handle(&mut self, event: EntryEvent) -> Result<(), ExecError> {
        match event.message {
            EntryMessage::Sample(value) => self.evaluator.offer(event.node, value)?,
            EntryMessage::EndOfStream => self.evaluator.close_entry(event.node),
        }
        self.evaluator.run_round()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::runtime::dispatch::Dispatch;
    use crate::runtime::harness::{PublishData, SubscribeData};
    use crate::runtime::network::{ExternalInputs, ExternalOutputs, NetworkDef};
    use crate::runtime::value::Frame;

    struct Counter {
        fired: Arc<AtomicUsize>,
    }

    impl NodeKind for Counter {
        fn kind(&self) -> &str {
            "counter"
        }

        fn inputs(&self) -> Vec<PortSpec> {
            vec![PortSpec::data("INPUT")]
        }

        fn outputs(&self) -> Vec<String> {
            vec!["OUTPUT".to_string()]
        }

        fn fire(&mut self, inputs: &FiringInputs) -> WorkResult<FiringOutputs> {
            self.fired.fetch_add(1, Ordering::SeqCst);
            Ok(FiringOutputs::new().with("OUTPUT", inputs.require("INPUT")?.clone()))
        }
    }

    struct Failing;

    impl NodeKind for Failing {
        fn kind(&self) -> &str {
            "failing"
        }

        fn inputs(&self) -> Vec<PortSpec> {
            vec![PortSpec::data("INPUT")]
        }

        fn outputs(&self) -> Vec<String> {
            vec![]
        }

        fn fire(&mut self, _inputs: &FiringInputs) -> WorkResult<FiringOutputs> {
            Err(WorkError::Node("boom".to_string()))
        }
    }

    fn evaluator(mut net: Network) -> Evaluator {
        net.validate().unwrap();
        let order = net.fire_order().unwrap();
        Evaluator::new(net, order)
    }

    #[test]
    fn test_values_flow_entry_to_subscriber() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut net = Network::new("t");
        let src = net.create_named(PublishData::new(), "src").unwrap();
        let sub = net.create_named(SubscribeData::new(), "sub").unwrap();
        net.set(&sub, "INPUT", src.out("OUTPUT")).unwrap();
        let handle = net.subscriber(&sub).unwrap();
        let sink = seen.clone();
        handle.on_receive(move |v| {
            if let Some(n) = v.get::<i64>() {
                sink.lock().unwrap().push(*n);
            }
        });

        let mut eval = evaluator(net);
        for n in 0..3i64 {
            eval.offer(src.id(), Value::from(n)).unwrap();
        }
        eval.run_round().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert!(!eval.all_done());
        eval.close_entry(src.id());
        eval.run_round().unwrap();
        assert!(eval.all_done());
    }

    #[test]
    fn test_single_shot_param_node_fires_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut net = Network::new("t");
        let c = net.create_named(
            Counter {
                fired: fired.clone(),
            },
            "c",
        )
        .unwrap();
        net.set(&c, "INPUT", 7i64).unwrap();
        let mut eval = evaluator(net);
        eval.run_round().unwrap();
        eval.run_round().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(eval.all_done());
    }

    #[test]
    fn test_node_failure_names_the_node() {
        let mut net = Network::new("t");
        let src = net.create_named(PublishData::new(), "src").unwrap();
        let bad = net.create_named(Failing, "bad").unwrap();
        net.set(&bad, "INPUT", src.out("OUTPUT")).unwrap();
        let mut eval = evaluator(net);
        eval.offer(src.id(), Value::from(1i64)).unwrap();
        let err = eval.run_round().unwrap_err();
        match err {
            ExecError::NodeFailed { node, kind, .. } => {
                assert_eq!(node, "bad");
                assert_eq!(kind, "failing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_windowed_firing_counts() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut net = Network::new("t");
        let src = net.create_named(PublishData::new(), "src").unwrap();
        let win = net
            .create_with(
                Counter {
                    fired: fired.clone(),
                },
                Some("win"),
                Dispatch::TriggeredMultiShot {
                    length: 512,
                    advance: 512,
                },
            )
            .unwrap();
        net.set(&win, "INPUT", src.out("OUTPUT")).unwrap();
        let mut eval = evaluator(net);

        for _ in 0..4 {
            eval.offer(src.id(), Value::from(Frame::zeros(1, 160))).unwrap();
            eval.run_round().unwrap();
        }
        // 640 samples buffered: one complete window.
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        eval.offer(src.id(), Value::from(Frame::zeros(1, 160))).unwrap();
        eval.run_round().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // The trailing 288 samples are discarded at close.
        eval.close_entry(src.id());
        eval.run_round().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(eval.all_done());
    }

    #[test]
    fn test_one_push_can_complete_several_windows() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut net = Network::new("t");
        let src = net.create_named(PublishData::new(), "src").unwrap();
        let win = net
            .create_with(
                Counter {
                    fired: fired.clone(),
                },
                Some("win"),
                Dispatch::TriggeredMultiShot {
                    length: 512,
                    advance: 512,
                },
            )
            .unwrap();
        net.set(&win, "INPUT", src.out("OUTPUT")).unwrap();
        let mut eval = evaluator(net);

        eval.offer(src.id(), Value::from(Frame::zeros(1, 1200))).unwrap();
        eval.run_round().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    struct Offset;

    impl NodeKind for Offset {
        fn kind(&self) -> &str {
            "offset"
        }

        fn inputs(&self) -> Vec<PortSpec> {
            vec![PortSpec::data("INPUT"), PortSpec::param("AMOUNT")]
        }

        fn outputs(&self) -> Vec<String> {
            vec!["OUTPUT".to_string()]
        }

        fn fire(&mut self, inputs: &FiringInputs) -> WorkResult<FiringOutputs> {
            let n = inputs.int("INPUT")?;
            let amount = inputs.int("AMOUNT")?;
            Ok(FiringOutputs::new().with("OUTPUT", n + amount))
        }
    }

    struct OffsetDef;

    impl NetworkDef for OffsetDef {
        fn name(&self) -> &str {
            "offset_net"
        }

        fn build(
            &self,
            net: &mut Network,
            inputs: &mut ExternalInputs,
            outputs: &mut ExternalOutputs,
        ) -> Result<Vec<crate::runtime::NodeHandle>, ConfigError> {
            let input = inputs.declare("IN");
            let off = net.create_named(Offset, "off")?;
            net.set(&off, "INPUT", input)?;
            net.set(&off, "AMOUNT", 100i64)?;
            outputs.bind("OUT", off.out("OUTPUT"));
            Ok(vec![off])
        }
    }

    #[test]
    fn test_composite_node_runs_inner_network() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut net = Network::new("t");
        let src = net.create_named(PublishData::new(), "src").unwrap();
        let subnet = net.create_subnet(&OffsetDef, Some("offsets")).unwrap();
        let sub = net.create_named(SubscribeData::new(), "sub").unwrap();
        net.set(&subnet, "IN", src.out("OUTPUT")).unwrap();
        net.set(&sub, "INPUT", subnet.out("OUT")).unwrap();
        let handle = net.subscriber(&sub).unwrap();
        let sink = seen.clone();
        handle.on_receive(move |v| {
            if let Some(n) = v.get::<i64>() {
                sink.lock().unwrap().push(*n);
            }
        });

        let mut eval = evaluator(net);
        for n in [1i64, 2, 3] {
            eval.offer(src.id(), Value::from(n)).unwrap();
        }
        eval.run_round().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![101, 102, 103]);
    }

    struct WindowedDef {
        fired: Arc<AtomicUsize>,
    }

    impl NetworkDef for WindowedDef {
        fn name(&self) -> &str {
            "windowed"
        }

        fn build(
            &self,
            net: &mut Network,
            inputs: &mut ExternalInputs,
            outputs: &mut ExternalOutputs,
        ) -> Result<Vec<crate::runtime::NodeHandle>, ConfigError> {
            let input = inputs.declare("IN");
            let win = net.create_with(
                Counter {
                    fired: self.fired.clone(),
                },
                Some("win"),
                Dispatch::TriggeredMultiShot {
                    length: 4,
                    advance: 4,
                },
            )?;
            net.set(&win, "INPUT", input)?;
            outputs.bind("OUT", win.out("OUTPUT"));
            Ok(vec![win])
        }
    }

    #[test]
    fn test_composite_does_not_reemit_latched_outputs() {
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut net = Network::new("t");
        let src = net.create_named(PublishData::new(), "src").unwrap();
        let stage = net
            .create_subnet(
                &WindowedDef {
                    fired: fired.clone(),
                },
                Some("stage"),
            )
            .unwrap();
        let sub = net.create_named(SubscribeData::new(), "sub").unwrap();
        net.set(&stage, "IN", src.out("OUTPUT")).unwrap();
        net.set(&sub, "INPUT", stage.out("OUT")).unwrap();
        let handle = net.subscriber(&sub).unwrap();
        let sink = seen.clone();
        handle.on_receive(move |v| {
            if let Some(f) = v.get::<Frame>() {
                sink.lock().unwrap().push(f.data().to_vec());
            }
        });

        let mut eval = evaluator(net);
        let window = Frame::from_flat(1, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        eval.offer(src.id(), Value::from(window)).unwrap();
        eval.run_round().unwrap();
        // A partial chunk arms the composite but completes no inner window;
        // the earlier window must not be delivered again.
        let partial = Frame::from_flat(1, vec![5.0, 6.0]).unwrap();
        eval.offer(src.id(), Value::from(partial)).unwrap();
        eval.run_round().unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec![vec![1.0, 2.0, 3.0, 4.0]]);
    }

    struct Tagged {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl NodeKind for Tagged {
        fn kind(&self) -> &str {
            "tagged"
        }

        fn inputs(&self) -> Vec<PortSpec> {
            vec![PortSpec::data("INPUT")]
        }

        fn outputs(&self) -> Vec<String> {
            vec![]
        }

        fn fire(&mut self, _inputs: &FiringInputs) -> WorkResult<FiringOutputs> {
            self.log.lock().unwrap().push(self.tag);
            Ok(FiringOutputs::new())
        }
    }

    #[test]
    fn test_simultaneously_armed_siblings_fire_in_creation_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut net = Network::new("t");
        let src = net.create_named(PublishData::new(), "src").unwrap();
        let early = net
            .create_named(
                Tagged {
                    tag: "early",
                    log: log.clone(),
                },
                "early",
            )
            .unwrap();
        let late = net
            .create_named(
                Tagged {
                    tag: "late",
                    log: log.clone(),
                },
                "late",
            )
            .unwrap();
        net.set(&early, "INPUT", src.out("OUTPUT")).unwrap();
        net.set(&late, "INPUT", src.out("OUTPUT")).unwrap();

        let mut eval = evaluator(net);
        eval.offer(src.id(), Value::from(1i64)).unwrap();
        eval.offer(src.id(), Value::from(2i64)).unwrap();
        eval.run_round().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["early", "late", "early", "late"]);
    }

    #[test]
    fn test_engine_without_entries_completes_immediately() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut net = Network::new("t");
        let c = net.create_named(
            Counter {
                fired: fired.clone(),
            },
            "c",
        )
        .unwrap();
        net.set(&c, "INPUT", 1i64).unwrap();
        let mut engine = ExecutionEngine::new(net).unwrap();
        let stop = AtomicBool::new(false);
        engine.execute(&stop).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_network_attaches_to_one_engine_only() {
        let mut net = Network::new("t");
        net.take_entry_rx();
        assert!(matches!(
            ExecutionEngine::new(net),
            Err(ConfigError::AlreadyAttached(_))
        ));
    }
}
