//! Core payload types carried on ports
//!
//! Ports carry opaque [`Value`]s: type-erased, cheaply clonable payloads.
//! The one structured payload the runtime itself understands is [`Frame`],
//! a fixed-size multichannel block of samples, because the triggered
//! multi-shot dispatcher must be able to buffer and re-window frames.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque payload carried on a port.
///
/// Wraps `Arc<dyn Any + Send + Sync>` so values are cheap to clone across
/// fan-out edges. The payload's type name is kept alongside for diagnostics;
/// consumers downcast with [`Value::get`].
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Value {
    /// Wrap an arbitrary payload.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Downcast to a concrete payload type.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Whether the payload is of type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Type name of the wrapped payload, for error messages.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Value<{}>", self.type_name)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::new(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::new(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::new(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::new(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::new(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::new(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::new(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::new(v)
    }
}

impl From<Frame> for Value {
    fn from(v: Frame) -> Self {
        Value::new(v)
    }
}

/// One fixed-size multichannel block of samples.
///
/// Channel-major layout: channel `c` occupies `data[c*len .. (c+1)*len]`.
/// The sample storage is shared via `Arc` so frames clone cheaply when
/// broadcast to several consumers.
#[derive(Clone, PartialEq)]
pub struct Frame {
    channels: usize,
    len: usize,
    data: Arc<[f32]>,
}

impl Frame {
    /// Build a frame from channel-major flat data. Returns `None` when
    /// `channels` is zero or `data` does not divide evenly into channels.
    pub fn from_flat(channels: usize, data: Vec<f32>) -> Option<Self> {
        if channels == 0 || data.len() % channels != 0 {
            return None;
        }
        let len = data.len() / channels;
        Some(Self {
            channels,
            len,
            data: data.into(),
        })
    }

    /// Build a frame from per-channel rows. All rows must have equal length.
    pub fn from_rows(rows: &[Vec<f32>]) -> Option<Self> {
        let first = rows.first()?;
        if rows.iter().any(|r| r.len() != first.len()) {
            return None;
        }
        let mut data = Vec::with_capacity(rows.len() * first.len());
        for row in rows {
            data.extend_from_slice(row);
        }
        Frame::from_flat(rows.len(), data)
    }

    /// An all-zero frame of the given shape.
    pub fn zeros(channels: usize, len: usize) -> Self {
        Self {
            channels: channels.max(1),
            len,
            data: vec![0.0; channels.max(1) * len].into(),
        }
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the frame carries no samples.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Samples of one channel.
    pub fn channel(&self, c: usize) -> &[f32] {
        &self.data[c * self.len..(c + 1) * self.len]
    }

    /// Flat channel-major sample storage.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Copy out a sub-range along the time axis. The range is clamped to
    /// the frame's bounds.
    pub fn slice(&self, start: usize, len: usize) -> Frame {
        let start = start.min(self.len);
        let end = (start + len).min(self.len);
        let mut data = Vec::with_capacity(self.channels * (end - start));
        for c in 0..self.channels {
            data.extend_from_slice(&self.channel(c)[start..end]);
        }
        Frame {
            channels: self.channels,
            len: end - start,
            data: data.into(),
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Frame[{}ch x {}]", self.channels, self.len)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Frame[{}ch x {}]", self.channels, self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_downcast() {
        let v = Value::from(512i64);
        assert_eq!(v.get::<i64>(), Some(&512));
        assert!(v.get::<f64>().is_none());
        assert!(v.is::<i64>());
    }

    #[test]
    fn test_frame_shape() {
        let f = Frame::from_flat(2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(f.channels(), 2);
        assert_eq!(f.len(), 3);
        assert_eq!(f.channel(0), &[1.0, 2.0, 3.0]);
        assert_eq!(f.channel(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_frame_rejects_ragged_input() {
        assert!(Frame::from_flat(3, vec![0.0; 10]).is_none());
        assert!(Frame::from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_none());
    }

    #[test]
    fn test_frame_slice_clamps() {
        let f = Frame::from_rows(&[vec![0.0, 1.0, 2.0, 3.0]]).unwrap();
        let s = f.slice(1, 2);
        assert_eq!(s.channel(0), &[1.0, 2.0]);
        let tail = f.slice(3, 10);
        assert_eq!(tail.channel(0), &[3.0]);
    }
}
