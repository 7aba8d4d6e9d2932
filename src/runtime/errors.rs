//! Error types for the runtime system

use thiserror::Error;

/// Errors raised while building or validating a network.
///
/// All of these surface at graph-construction time, before any execution
/// thread is started.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("node '{0}' not found in network")]
    NodeNotFound(String),

    #[error("duplicate node name '{0}'")]
    DuplicateName(String),

    #[error("node '{node}' has no input port '{port}'")]
    InputNotFound { node: String, port: String },

    #[error("node '{node}' has no output port '{port}'")]
    OutputNotFound { node: String, port: String },

    #[error("required input '{port}' on node '{node}' is unbound")]
    UnboundInput { node: String, port: String },

    #[error("external output '{0}' declared but never bound")]
    UnboundExternalOutput(String),

    #[error("node '{node}' references undeclared external input '{port}'")]
    UnknownExternalInput { node: String, port: String },

    #[error("cyclic data dependency involving node '{0}'")]
    CyclicData(String),

    #[error("no node kind registered for tag '{0}'")]
    UnknownKind(String),

    #[error("invalid dispatch on node '{node}': {reason}")]
    InvalidDispatch { node: String, reason: String },

    #[error("node '{0}' is not a publisher entry")]
    NotAPublisher(String),

    #[error("node '{0}' is not a subscriber")]
    NotASubscriber(String),

    #[error("network '{0}' is already attached to an execution engine")]
    AlreadyAttached(String),
}

/// Errors raised at the harness boundary (publish/close).
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("publish after close")]
    Closed,

    #[error("entry already closed")]
    AlreadyClosed,

    #[error("network is no longer running")]
    Disconnected,

    #[error("entry queue blocked for too long")]
    Stalled,
}

/// Error type returned by a node firing.
#[derive(Debug, Error)]
pub enum WorkError {
    #[error("missing input '{0}'")]
    MissingInput(String),

    #[error("input '{port}' has type {found}, expected {expected}")]
    TypeMismatch {
        port: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{0}")]
    Node(String),
}

/// Result type for node firings.
pub type WorkResult<T = ()> = Result<T, WorkError>;

/// Errors that terminate `execute()`.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("node '{node}' ({kind}) failed: {source}")]
    NodeFailed {
        node: String,
        kind: String,
        #[source]
        source: WorkError,
    },

    #[error("execution thread panicked")]
    Panicked,
}
