//! Declarative streaming dataflow networks
//!
//! This library builds directed node graphs declaratively and executes them
//! against real-time data streams: describe the graph, wire the ports, then
//! push values in and receive results through callbacks.
//!
//! # Architecture
//!
//! - **Network**: declarative graph builder; nodes, ports and bindings
//! - **Dispatch policies**: single-shot, repeat and triggered multi-shot
//!   windowing decide when each node fires
//! - **ExecutionEngine**: dependency-ordered, round-based evaluation on a
//!   single execution thread
//! - **Harness**: publisher/subscriber handles, the runner thread and the
//!   paced feed loop for streaming recordings
//! - **Sub-networks**: reusable [`NetworkDef`] fragments embed in a parent
//!   graph as one composite node
//!
//! # Example
//!
//! ```no_run
//! use flownet::{shutdown, Network, PublishData, Runner, SubscribeData};
//!
//! let mut net = Network::new("demo");
//! let src = net.create_named(PublishData::new(), "src")?;
//! let sink = net.create_named(SubscribeData::new(), "sink")?;
//! net.set(&sink, "INPUT", src.out("OUTPUT"))?;
//!
//! let publisher = net.publisher(&src)?;
//! net.subscriber(&sink)?.on_receive(|value| println!("{value:?}"));
//!
//! let runner = Runner::spawn(net)?;
//! publisher.push(1i64)?;
//! shutdown(runner, &publisher)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod nodes;
pub mod runtime;

// Re-export built-in node kinds
pub use nodes::registry::{create_node, register_node};
pub use nodes::{AudioStream, Constant, PassThrough, Scale};

// Re-export the streaming runtime components
pub use runtime::{
    frame_pace, frames_of, shutdown, stream_frames, Binding, ConfigError, Dispatch, ExecError,
    ExecutionEngine, ExternalInputs, ExternalOutputs, ExternalRef, FiringInputs, FiringOutputs,
    Frame, IntoBinding, Network, NetworkDef, NodeHandle, NodeId, NodeKind, OutputRef, PortKind,
    PortSpec, PublishData, PublisherHandle, Runner, StreamError, SubscribeData, SubscriberHandle,
    Value, WorkError, WorkResult,
};
