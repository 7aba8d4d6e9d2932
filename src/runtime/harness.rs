//! Real-time streaming harness
//!
//! Connects outside code to a running network. [`PublishData`] nodes are
//! stream entries fed through a [`PublisherHandle`]; [`SubscribeData`]
//! nodes hand results to a callback attached through a
//! [`SubscriberHandle`]. A [`Runner`] owns the execution thread. The free
//! functions implement the common feed loop: slice a recording into
//! frames, push them at the stream rate, then close, stop and join.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{SendTimeoutError, Sender};
use tracing::{debug, error};

use super::engine::{EntryEvent, EntryMessage, ExecutionEngine};
use super::errors::{ConfigError, ExecError, StreamError, WorkResult};
use super::network::Network;
use super::node::{FiringInputs, FiringOutputs, NodeKind};
use super::ports::{NodeId, PortSpec};
use super::value::{Frame, Value};

/// How long a push blocks on a full entry queue before giving up.
const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Stream entry node. Emits each pushed value on `OUTPUT`.
///
/// Creating one in a network registers it as an entry; obtain a
/// [`PublisherHandle`] from the network to feed it.
#[derive(Default)]
pub struct PublishData;

impl PublishData {
    pub fn new() -> Self {
        Self
    }
}

impl NodeKind for PublishData {
    fn kind(&self) -> &str {
        "publish_data"
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::data("INPUT").optional()]
    }

    fn outputs(&self) -> Vec<String> {
        vec!["OUTPUT".to_string()]
    }

    fn fire(&mut self, inputs: &FiringInputs) -> WorkResult<FiringOutputs> {
        let mut out = FiringOutputs::new();
        if let Some(value) = inputs.get("INPUT") {
            out.set("OUTPUT", value.clone());
        }
        Ok(out)
    }
}

/// Shared slot holding a subscriber's callback.
#[derive(Clone, Default)]
pub(crate) struct CallbackSlot(Arc<Mutex<Option<Box<dyn FnMut(Value) + Send>>>>);

impl CallbackSlot {
    pub(crate) fn install(&self, callback: impl FnMut(Value) + Send + 'static) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(Box::new(callback));
        }
    }

    pub(crate) fn invoke(&self, value: Value) {
        if let Ok(mut slot) = self.0.lock() {
            if let Some(callback) = slot.as_mut() {
                callback(value);
            }
        }
    }
}

/// Stream exit node. Hands each value on `INPUT` to the attached callback.
///
/// Values arriving before a callback is attached are dropped.
#[derive(Default)]
pub struct SubscribeData {
    slot: CallbackSlot,
}

impl SubscribeData {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn slot(&self) -> CallbackSlot {
        self.slot.clone()
    }
}

impl NodeKind for SubscribeData {
    fn kind(&self) -> &str {
        "subscribe_data"
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::data("INPUT")]
    }

    fn outputs(&self) -> Vec<String> {
        vec![]
    }

    fn fire(&mut self, inputs: &FiringInputs) -> WorkResult<FiringOutputs> {
        self.slot.invoke(inputs.require("INPUT")?.clone());
        Ok(FiringOutputs::new())
    }
}

/// Feed side of one stream entry. Pushes go through the network's bounded
/// entry queue, which is what applies back-pressure to the feeder.
pub struct PublisherHandle {
    node: NodeId,
    name: String,
    tx: Sender<EntryEvent>,
    closed: Arc<AtomicBool>,
}

impl PublisherHandle {
    pub(crate) fn new(
        node: NodeId,
        name: String,
        tx: Sender<EntryEvent>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            node,
            name,
            tx,
            closed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Push one value into the stream. Blocks while the entry queue is
    /// full, up to a timeout.
    pub fn push(&self, value: impl Into<Value>) -> Result<(), StreamError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StreamError::Closed);
        }
        let event = EntryEvent {
            node: self.node,
            message: EntryMessage::Sample(value.into()),
        };
        self.tx
            .send_timeout(event, PUSH_TIMEOUT)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => StreamError::Stalled,
                SendTimeoutError::Disconnected(_) => StreamError::Disconnected,
            })
    }

    /// Close the stream: no more values will follow. Pending values still
    /// drain before the network treats this entry as finished.
    pub fn close(&self) -> Result<(), StreamError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StreamError::AlreadyClosed);
        }
        debug!(entry = %self.name, "closing stream entry");
        let event = EntryEvent {
            node: self.node,
            message: EntryMessage::EndOfStream,
        };
        match self.tx.send_timeout(event, PUSH_TIMEOUT) {
            Ok(()) => Ok(()),
            // An engine that already returned counts as closed.
            Err(SendTimeoutError::Disconnected(_)) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(StreamError::Stalled),
        }
    }
}

/// Result side of one stream exit.
pub struct SubscriberHandle {
    name: String,
    slot: CallbackSlot,
}

impl SubscriberHandle {
    pub(crate) fn new(name: String, slot: CallbackSlot) -> Self {
        Self { name, slot }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach the callback invoked for every value reaching the exit node.
    /// Runs on the execution thread; replaces any previous callback.
    pub fn on_receive(&self, callback: impl FnMut(Value) + Send + 'static) {
        self.slot.install(callback);
    }
}

/// Owns the execution thread of one network.
pub struct Runner {
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<(), ExecError>>>,
}

impl Runner {
    /// Validate the network and start its execution thread. Configuration
    /// problems surface here, before the thread exists.
    pub fn spawn(network: Network) -> Result<Runner, ConfigError> {
        let mut engine = ExecutionEngine::new(network)?;
        let stop = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let thread_stop = stop.clone();
        let thread_alive = alive.clone();
        let handle = thread::spawn(move || {
            let result = engine.execute(&thread_stop);
            if let Err(e) = &result {
                error!(error = %e, "execution failed");
            }
            thread_alive.store(false, Ordering::SeqCst);
            result
        });
        Ok(Runner {
            stop,
            alive,
            handle: Some(handle),
        })
    }

    /// Request the execution thread to finish. Idempotent.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether the execution thread is still running.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Wait for the execution thread and return its result.
    pub fn join(mut self) -> Result<(), ExecError> {
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(Err(ExecError::Panicked)),
            None => Ok(()),
        }
    }
}

/// Slice a recording into consecutive `advance`-sample frames. The last
/// frame may be shorter.
pub fn frames_of(recording: &Frame, advance: usize) -> Vec<Frame> {
    let mut frames = Vec::new();
    if advance == 0 {
        return frames;
    }
    let mut start = 0;
    while start < recording.len() {
        frames.push(recording.slice(start, advance));
        start += advance;
    }
    frames
}

/// Wall-clock interval between frames of `advance` samples at `rate` Hz.
pub fn frame_pace(advance: usize, rate: f64) -> Duration {
    Duration::from_secs_f64(advance as f64 / rate)
}

/// Push frames at a fixed pace, stopping early if the network dies.
pub fn stream_frames(
    runner: &Runner,
    publisher: &PublisherHandle,
    frames: impl IntoIterator<Item = Frame>,
    pace: Duration,
) -> Result<(), StreamError> {
    for frame in frames {
        if !runner.is_alive() {
            return Err(StreamError::Disconnected);
        }
        publisher.push(frame)?;
        thread::sleep(pace);
    }
    Ok(())
}

/// Ordered shutdown: close the stream, request a stop, wait for the
/// execution thread. Pending values queued before the close still drain.
pub fn shutdown(runner: Runner, publisher: &PublisherHandle) -> Result<(), ExecError> {
    if let Err(e) = publisher.close() {
        if !matches!(e, StreamError::AlreadyClosed) {
            debug!(error = %e, "close during shutdown");
        }
    }
    runner.stop();
    runner.join()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::runtime::dispatch::Dispatch;

    fn collecting_net() -> (Network, PublisherHandle, Arc<Mutex<Vec<i64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut net = Network::new("collect");
        let src = net.create_named(PublishData::new(), "src").unwrap();
        let sub = net.create_named(SubscribeData::new(), "sub").unwrap();
        net.set(&sub, "INPUT", src.out("OUTPUT")).unwrap();
        let subscriber = net.subscriber(&sub).unwrap();
        let sink = seen.clone();
        subscriber.on_receive(move |v| {
            if let Some(n) = v.get::<i64>() {
                sink.lock().unwrap().push(*n);
            }
        });
        let publisher = net.publisher(&src).unwrap();
        (net, publisher, seen)
    }

    #[test]
    fn test_pushed_values_arrive_in_order() {
        let (net, publisher, seen) = collecting_net();
        let runner = Runner::spawn(net).unwrap();
        for n in 0..20i64 {
            publisher.push(n).unwrap();
        }
        shutdown(runner, &publisher).unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_close_is_one_shot_and_push_after_close_fails() {
        let (net, publisher, _seen) = collecting_net();
        let runner = Runner::spawn(net).unwrap();
        publisher.close().unwrap();
        assert!(matches!(
            publisher.close(),
            Err(StreamError::AlreadyClosed)
        ));
        assert!(matches!(publisher.push(1i64), Err(StreamError::Closed)));
        runner.stop();
        runner.join().unwrap();
    }

    #[test]
    fn test_runner_finishes_after_close_without_stop() {
        let (net, publisher, seen) = collecting_net();
        let runner = Runner::spawn(net).unwrap();
        publisher.push(5i64).unwrap();
        publisher.close().unwrap();
        runner.join().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![5]);
    }

    #[test]
    fn test_stop_is_idempotent_and_alive_goes_false() {
        let (net, publisher, _seen) = collecting_net();
        let runner = Runner::spawn(net).unwrap();
        assert!(runner.is_alive());
        runner.stop();
        runner.stop();
        publisher.close().ok();
        runner.join().unwrap();
    }

    #[test]
    fn test_streamed_recording_counts_windows() {
        struct WindowCounter {
            fired: Arc<AtomicUsize>,
        }

        impl NodeKind for WindowCounter {
            fn kind(&self) -> &str {
                "window_counter"
            }

            fn inputs(&self) -> Vec<PortSpec> {
                vec![PortSpec::data("INPUT")]
            }

            fn outputs(&self) -> Vec<String> {
                vec!["OUTPUT".to_string()]
            }

            fn fire(&mut self, inputs: &FiringInputs) -> WorkResult<FiringOutputs> {
                let frame = inputs.frame("INPUT")?;
                assert_eq!(frame.len(), 512);
                self.fired.fetch_add(1, Ordering::SeqCst);
                Ok(FiringOutputs::new())
            }
        }

        let fired = Arc::new(AtomicUsize::new(0));
        let mut net = Network::new("windows");
        let src = net.create_named(PublishData::new(), "src").unwrap();
        let win = net
            .create_with(
                WindowCounter {
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
        let publisher = net.publisher(&src).unwrap();
        let runner = Runner::spawn(net).unwrap();

        // 2048 samples in 160-sample chunks: exactly four complete windows,
        // 128 trailing samples discarded.
        let recording = Frame::zeros(1, 2176);
        let frames = frames_of(&recording, 160);
        assert_eq!(frames.len(), 14);
        stream_frames(&runner, &publisher, frames, Duration::from_millis(1)).unwrap();
        shutdown(runner, &publisher).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_passthrough_pipeline_delivers_frames_unmodified() {
        let seen: Arc<Mutex<Vec<Frame>>> = Arc::new(Mutex::new(Vec::new()));
        let mut net = Network::new("passthrough");
        let src = net.create_named(PublishData::new(), "src").unwrap();
        let relay = net
            .create_named(crate::nodes::PassThrough::new(), "relay")
            .unwrap();
        let sink = net.create_named(SubscribeData::new(), "sink").unwrap();
        net.set(&relay, "INPUT", src.out("OUTPUT")).unwrap();
        net.set(&sink, "INPUT", relay.out("OUTPUT")).unwrap();
        let publisher = net.publisher(&src).unwrap();
        let subscriber = net.subscriber(&sink).unwrap();
        let collected = seen.clone();
        subscriber.on_receive(move |v| {
            if let Some(frame) = v.get::<Frame>() {
                collected.lock().unwrap().push(frame.clone());
            }
        });

        let runner = Runner::spawn(net).unwrap();
        let frames: Vec<Frame> = (0..5)
            .map(|i| {
                let rows: Vec<Vec<f32>> = (0..8).map(|c| vec![(i * 8 + c) as f32; 160]).collect();
                Frame::from_rows(&rows).unwrap()
            })
            .collect();
        for frame in &frames {
            publisher.push(frame.clone()).unwrap();
        }
        shutdown(runner, &publisher).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 5);
        for (got, sent) in seen.iter().zip(&frames) {
            assert_eq!(got.channels(), 8);
            assert_eq!(got.len(), 160);
            assert_eq!(got.data(), sent.data());
        }
    }

    #[test]
    fn test_frames_of_and_pace() {
        let recording = Frame::zeros(2, 400);
        let frames = frames_of(&recording, 160);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].len(), 160);
        assert_eq!(frames[2].len(), 80);
        assert_eq!(frame_pace(160, 16000.0), Duration::from_millis(10));
    }
}
