//! Per-node dispatch policies
//!
//! A dispatcher decides when its node fires as new data becomes available.
//! Decoupling "data has arrived" from "node is ready to compute" lets
//! windowed frame assembly and purely reactive pass-through nodes share one
//! scheduling abstraction.
//!
//! Policies:
//! - [`Dispatch::SingleShot`] (default): one firing per trigger. For nodes
//!   with bound data inputs the trigger is a complete fresh input set; a
//!   parameter-only node gets exactly one trigger at engine start.
//! - [`Dispatch::Repeat`]: entry nodes fire once per pushed value until the
//!   entry is closed; parameter-only nodes re-fire once per engine round.
//! - [`Dispatch::TriggeredMultiShot`]: buffers incoming frames and fires
//!   once per complete `length`-sample window, consuming `advance` samples
//!   per firing. Zero or more firings per push; the remainder stays
//!   buffered.

use std::collections::VecDeque;

use super::errors::{WorkError, WorkResult};
use super::value::{Frame, Value};

/// Dispatch policy chosen at node-creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    SingleShot,
    Repeat,
    TriggeredMultiShot { length: usize, advance: usize },
}

impl Default for Dispatch {
    fn default() -> Self {
        Dispatch::SingleShot
    }
}

/// Runtime state machine for one node's dispatcher.
#[derive(Debug)]
pub(crate) enum Dispatcher {
    SingleShot {
        fired: bool,
    },
    Repeat {
        queue: VecDeque<Value>,
        closed: bool,
        fired_this_round: bool,
    },
    MultiShot {
        window: WindowBuffer,
    },
}

impl Dispatcher {
    pub(crate) fn new(policy: Dispatch) -> Self {
        match policy {
            Dispatch::SingleShot => Dispatcher::SingleShot { fired: false },
            Dispatch::Repeat => Dispatcher::Repeat {
                queue: VecDeque::new(),
                closed: false,
                fired_this_round: false,
            },
            Dispatch::TriggeredMultiShot { length, advance } => Dispatcher::MultiShot {
                window: WindowBuffer::new(length, advance),
            },
        }
    }

    /// Hand a newly arrived value to the dispatcher's buffer.
    ///
    /// Repeat queues the value verbatim; multi-shot appends the frame's
    /// samples to its window buffer. Single-shot nodes receive data through
    /// input freshness, never through `offer`.
    pub(crate) fn offer(&mut self, value: Value) -> WorkResult<()> {
        match self {
            Dispatcher::SingleShot { .. } => Err(WorkError::Node(
                "single-shot dispatcher cannot buffer pushed data".to_string(),
            )),
            Dispatcher::Repeat { queue, closed, .. } => {
                if *closed {
                    // A closed publisher port never reopens; late values are
                    // dropped rather than resurrecting the stream.
                    return Ok(());
                }
                queue.push_back(value);
                Ok(())
            }
            Dispatcher::MultiShot { window } => {
                let frame = value.get::<Frame>().ok_or_else(|| WorkError::TypeMismatch {
                    port: "window".to_string(),
                    expected: std::any::type_name::<Frame>(),
                    found: value.type_name(),
                })?;
                window.push(frame)
            }
        }
    }

    /// Take the next ready unit, if any: one queued value (repeat) or one
    /// assembled window (multi-shot).
    pub(crate) fn take_ready(&mut self) -> Option<Value> {
        match self {
            Dispatcher::SingleShot { .. } => None,
            Dispatcher::Repeat { queue, .. } => queue.pop_front(),
            Dispatcher::MultiShot { window } => window.take_window().map(Value::from),
        }
    }

    /// Whether a ready unit is buffered.
    pub(crate) fn has_ready(&self) -> bool {
        match self {
            Dispatcher::SingleShot { .. } => false,
            Dispatcher::Repeat { queue, .. } => !queue.is_empty(),
            Dispatcher::MultiShot { window } => window.has_window(),
        }
    }

    pub(crate) fn close(&mut self) {
        if let Dispatcher::Repeat { closed, .. } = self {
            *closed = true;
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        matches!(self, Dispatcher::Repeat { closed: true, .. })
    }
}

/// Sliding-window sample buffer for the triggered multi-shot policy.
///
/// Accumulates frames channel by channel. A window is ready once `length`
/// samples are buffered; taking it emits a `length`-sample frame and drops
/// `advance` samples from the front, so `advance < length` yields
/// overlapping windows and `advance == length` yields back-to-back ones.
#[derive(Debug)]
pub(crate) struct WindowBuffer {
    length: usize,
    advance: usize,
    bufs: Vec<VecDeque<f32>>,
}

impl WindowBuffer {
    pub(crate) fn new(length: usize, advance: usize) -> Self {
        Self {
            length,
            advance,
            bufs: Vec::new(),
        }
    }

    /// Append one frame's samples.
    pub(crate) fn push(&mut self, frame: &Frame) -> WorkResult<()> {
        if self.bufs.is_empty() {
            self.bufs = vec![VecDeque::new(); frame.channels()];
        }
        if frame.channels() != self.bufs.len() {
            return Err(WorkError::Node(format!(
                "frame has {} channels, window buffer expects {}",
                frame.channels(),
                self.bufs.len()
            )));
        }
        for (c, buf) in self.bufs.iter_mut().enumerate() {
            buf.extend(frame.channel(c).iter().copied());
        }
        Ok(())
    }

    /// Buffered samples per channel.
    pub(crate) fn available(&self) -> usize {
        self.bufs.first().map_or(0, |b| b.len())
    }

    pub(crate) fn has_window(&self) -> bool {
        !self.bufs.is_empty() && self.available() >= self.length
    }

    /// Take the next complete window, leaving the remainder buffered.
    pub(crate) fn take_window(&mut self) -> Option<Frame> {
        if !self.has_window() {
            return None;
        }
        let mut data = Vec::with_capacity(self.bufs.len() * self.length);
        for buf in &self.bufs {
            data.extend(buf.iter().take(self.length).copied());
        }
        let drop = self.advance.min(self.available());
        for buf in &mut self.bufs {
            buf.drain(..drop);
        }
        Frame::from_flat(self.bufs.len(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(len: usize) -> Frame {
        Frame::zeros(1, len)
    }

    #[test]
    fn test_partial_window_yields_no_firing() {
        let mut win = WindowBuffer::new(512, 512);
        win.push(&chunk(160)).unwrap();
        win.push(&chunk(160)).unwrap();
        win.push(&chunk(160)).unwrap();
        assert!(!win.has_window());
        assert!(win.take_window().is_none());
        assert_eq!(win.available(), 480);
    }

    #[test]
    fn test_one_window_per_512_samples() {
        let mut win = WindowBuffer::new(512, 512);
        for _ in 0..4 {
            win.push(&chunk(160)).unwrap();
        }
        // 640 buffered: exactly one window, 128 samples remain.
        let w = win.take_window().unwrap();
        assert_eq!(w.len(), 512);
        assert_eq!(win.available(), 128);
        assert!(!win.has_window());

        // A 5th chunk brings the total to 800; the second window still
        // needs 1024 cumulative samples.
        win.push(&chunk(160)).unwrap();
        assert!(!win.has_window());
    }

    #[test]
    fn test_overlapping_hop() {
        let mut win = WindowBuffer::new(512, 160);
        win.push(&chunk(672)).unwrap();
        let first = win.take_window().unwrap();
        assert_eq!(first.len(), 512);
        // Only the hop is consumed; the next window is already complete.
        assert_eq!(win.available(), 512);
        assert!(win.has_window());
    }

    #[test]
    fn test_fifo_sample_order() {
        let mut win = WindowBuffer::new(4, 4);
        win.push(&Frame::from_rows(&[vec![1.0, 2.0, 3.0]]).unwrap())
            .unwrap();
        win.push(&Frame::from_rows(&[vec![4.0, 5.0, 6.0]]).unwrap())
            .unwrap();
        let w = win.take_window().unwrap();
        assert_eq!(w.channel(0), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(win.available(), 2);
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let mut win = WindowBuffer::new(8, 8);
        win.push(&Frame::zeros(2, 4)).unwrap();
        assert!(win.push(&Frame::zeros(3, 4)).is_err());
    }

    #[test]
    fn test_repeat_dispatcher_queue_and_close() {
        let mut d = Dispatcher::new(Dispatch::Repeat);
        d.offer(Value::from(1i64)).unwrap();
        d.offer(Value::from(2i64)).unwrap();
        assert!(d.has_ready());
        assert_eq!(d.take_ready().unwrap().get::<i64>(), Some(&1));
        d.close();
        assert!(d.is_closed());
        // Values pushed after close are dropped.
        d.offer(Value::from(3i64)).unwrap();
        assert_eq!(d.take_ready().unwrap().get::<i64>(), Some(&2));
        assert!(d.take_ready().is_none());
    }
}
