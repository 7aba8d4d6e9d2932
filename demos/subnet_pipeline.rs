//! Example: composing a network from a reusable sub-network
//!
//! A gain stage (channel check plus sample scaling) is described once as a
//! `NetworkDef` and embedded in the parent graph as a single composite
//! node. Frames flow publisher -> gain stage -> subscriber.
//!
//! Usage:
//!   cargo run --release --example subnet_pipeline -- --factor 0.25 --chunks 10

use clap::Parser;
use flownet::{
    shutdown, stream_frames, AudioStream, ConfigError, ExternalInputs, ExternalOutputs, Frame,
    Network, NetworkDef, NodeHandle, PublishData, Runner, Scale, SubscribeData,
};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Gain applied to every sample
    #[arg(long, default_value = "0.5")]
    factor: f64,

    /// Number of channels
    #[arg(long, default_value = "2")]
    channels: usize,

    /// Chunks to push
    #[arg(long, default_value = "10")]
    chunks: usize,

    /// Samples per chunk
    #[arg(long, default_value = "160")]
    advance: usize,
}

/// Channel-checked gain stage: IN -> audio_stream -> scale -> OUT.
struct GainStageDef {
    channels: usize,
    factor: f64,
}

impl NetworkDef for GainStageDef {
    fn name(&self) -> &str {
        "gain_stage"
    }

    fn build(
        &self,
        net: &mut Network,
        inputs: &mut ExternalInputs,
        outputs: &mut ExternalOutputs,
    ) -> Result<Vec<NodeHandle>, ConfigError> {
        let input = inputs.declare("IN");
        let audio = net.create_named(AudioStream::new(), "audio")?;
        net.set(&audio, "INPUT", input)?;
        net.set(&audio, "CHANNEL_COUNT", self.channels as i64)?;
        let gain = net.create_named(Scale::new(), "gain")?;
        net.set(&gain, "INPUT", audio.out("AUDIO"))?;
        net.set(&gain, "FACTOR", self.factor)?;
        outputs.bind("OUT", gain.out("OUTPUT"));
        Ok(vec![audio, gain])
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("=== Sub-network Pipeline Example ===");
    info!("Gain: {}, {} channels", args.factor, args.channels);

    let def = GainStageDef {
        channels: args.channels,
        factor: args.factor,
    };

    let mut net = Network::new("main");
    let src = net.create_named(PublishData::new(), "src")?;
    let stage = net.create_subnet(&def, Some("stage"))?;
    let sink = net.create_named(SubscribeData::new(), "sink")?;
    net.set(&stage, "IN", src.out("OUTPUT"))?;
    net.set(&sink, "INPUT", stage.out("OUT"))?;

    let publisher = net.publisher(&src)?;
    let subscriber = net.subscriber(&sink)?;
    let mut count = 0usize;
    subscriber.on_receive(move |value| {
        if let Some(frame) = value.get::<Frame>() {
            count += 1;
            let peak = frame.data().iter().fold(0.0f32, |m, s| m.max(s.abs()));
            info!("chunk {count}: {frame}, peak = {peak:.3}");
        }
    });

    let runner = Runner::spawn(net)?;

    let chunks = (0..args.chunks).map(|i| {
        let amp = (i + 1) as f32 / args.chunks as f32;
        let rows: Vec<Vec<f32>> = (0..args.channels)
            .map(|_| vec![amp; args.advance])
            .collect();
        Frame::from_rows(&rows).unwrap_or_else(|| Frame::zeros(args.channels, args.advance))
    });
    stream_frames(&runner, &publisher, chunks, Duration::from_millis(10))?;

    shutdown(runner, &publisher)?;
    info!("Done!");

    Ok(())
}
