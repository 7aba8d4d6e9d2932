//! Runtime support for streaming dataflow networks

pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod harness;
pub mod network;
pub mod node;
pub mod ports;
pub mod value;

pub use dispatch::Dispatch;
pub use engine::ExecutionEngine;
pub use errors::{ConfigError, ExecError, StreamError, WorkError, WorkResult};
pub use harness::{
    frame_pace, frames_of, shutdown, stream_frames, PublishData, PublisherHandle, Runner,
    SubscribeData, SubscriberHandle,
};
pub use network::{ExternalInputs, ExternalOutputs, Network, NetworkDef, NodeHandle};
pub use node::{FiringInputs, FiringOutputs, NodeKind};
pub use ports::{Binding, ExternalRef, IntoBinding, NodeId, OutputRef, PortKind, PortSpec};
pub use value::{Frame, Value};
