//! Built-in node kinds
//!
//! General-purpose processing nodes usable in any network:
//! - **PassThrough**: forwards its input unchanged, useful as a named
//!   junction point
//! - **Constant**: emits a fixed parameter value
//! - **Scale**: multiplies frame samples by a factor
//! - **AudioStream**: validates and relabels an incoming audio frame stream
//!
//! Application-specific kinds implement [`NodeKind`] directly; kinds that
//! should be creatable by tag go through [`registry`].

pub mod registry;

use crate::runtime::errors::WorkResult;
use crate::runtime::node::{FiringInputs, FiringOutputs, NodeKind};
use crate::runtime::ports::PortSpec;
use crate::runtime::value::Frame;
use crate::runtime::WorkError;

/// Forwards `INPUT` to `OUTPUT` unchanged.
#[derive(Default)]
pub struct PassThrough;

impl PassThrough {
    pub fn new() -> Self {
        Self
    }
}

impl NodeKind for PassThrough {
    fn kind(&self) -> &str {
        "pass_through"
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::data("INPUT")]
    }

    fn outputs(&self) -> Vec<String> {
        vec!["OUTPUT".to_string()]
    }

    fn fire(&mut self, inputs: &FiringInputs) -> WorkResult<FiringOutputs> {
        Ok(FiringOutputs::new().with("OUTPUT", inputs.require("INPUT")?.clone()))
    }
}

/// Emits the `VALUE` parameter on `OUTPUT`.
#[derive(Default)]
pub struct Constant;

impl Constant {
    pub fn new() -> Self {
        Self
    }
}

impl NodeKind for Constant {
    fn kind(&self) -> &str {
        "constant"
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::param("VALUE")]
    }

    fn outputs(&self) -> Vec<String> {
        vec!["OUTPUT".to_string()]
    }

    fn fire(&mut self, inputs: &FiringInputs) -> WorkResult<FiringOutputs> {
        Ok(FiringOutputs::new().with("OUTPUT", inputs.require("VALUE")?.clone()))
    }
}

/// Multiplies every sample of the `INPUT` frame by `FACTOR`.
#[derive(Default)]
pub struct Scale;

impl Scale {
    pub fn new() -> Self {
        Self
    }
}

impl NodeKind for Scale {
    fn kind(&self) -> &str {
        "scale"
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::data("INPUT"),
            PortSpec::param("FACTOR").with_default(1.0f64),
        ]
    }

    fn outputs(&self) -> Vec<String> {
        vec!["OUTPUT".to_string()]
    }

    fn fire(&mut self, inputs: &FiringInputs) -> WorkResult<FiringOutputs> {
        let frame = inputs.frame("INPUT")?;
        let factor = inputs.float("FACTOR")? as f32;
        let data = frame.data().iter().map(|s| s * factor).collect();
        let scaled = Frame::from_flat(frame.channels(), data)
            .ok_or_else(|| WorkError::Node("scaled frame has invalid shape".to_string()))?;
        Ok(FiringOutputs::new().with("OUTPUT", scaled))
    }
}

/// Relabels an incoming frame stream as `AUDIO`, checking the channel
/// count when `CHANNEL_COUNT` is given.
#[derive(Default)]
pub struct AudioStream;

impl AudioStream {
    pub fn new() -> Self {
        Self
    }
}

impl NodeKind for AudioStream {
    fn kind(&self) -> &str {
        "audio_stream"
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::data("INPUT"),
            PortSpec::param("CHANNEL_COUNT").optional(),
        ]
    }

    fn outputs(&self) -> Vec<String> {
        vec!["AUDIO".to_string()]
    }

    fn fire(&mut self, inputs: &FiringInputs) -> WorkResult<FiringOutputs> {
        let frame = inputs.frame("INPUT")?;
        if inputs.get("CHANNEL_COUNT").is_some() {
            let expected = inputs.int("CHANNEL_COUNT")? as usize;
            if frame.channels() != expected {
                return Err(WorkError::Node(format!(
                    "expected {} channels, frame has {}",
                    expected,
                    frame.channels()
                )));
            }
        }
        Ok(FiringOutputs::new().with("AUDIO", frame.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::runtime::value::Value;

    fn fire(kind: &mut dyn NodeKind, values: Vec<(&str, Value)>) -> WorkResult<FiringOutputs> {
        let map: HashMap<String, Value> =
            values.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        kind.fire(&FiringInputs::new(map))
    }

    #[test]
    fn test_scale_multiplies_samples() {
        let frame = Frame::from_rows(&[vec![1.0, -2.0]]).unwrap();
        let out = fire(
            &mut Scale::new(),
            vec![("INPUT", Value::from(frame)), ("FACTOR", Value::from(0.5f64))],
        )
        .unwrap();
        let scaled = out.into_values().remove("OUTPUT").unwrap();
        assert_eq!(scaled.get::<Frame>().unwrap().channel(0), &[0.5, -1.0]);
    }

    #[test]
    fn test_audio_stream_rejects_wrong_channel_count() {
        let frame = Frame::zeros(2, 8);
        let result = fire(
            &mut AudioStream::new(),
            vec![
                ("INPUT", Value::from(frame)),
                ("CHANNEL_COUNT", Value::from(4i64)),
            ],
        );
        assert!(matches!(result, Err(WorkError::Node(_))));
    }

    #[test]
    fn test_constant_emits_its_parameter() {
        let out = fire(&mut Constant::new(), vec![("VALUE", Value::from(9i64))]).unwrap();
        let value = out.into_values().remove("OUTPUT").unwrap();
        assert_eq!(value.get::<i64>(), Some(&9));
    }
}
