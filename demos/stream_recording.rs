//! Example: streaming a recording through a windowed analysis network
//!
//! Synthesizes a short multichannel recording, slices it into small chunks
//! and pushes them at the real-time rate. A triggered multi-shot node
//! re-windows the chunk stream and reports an RMS level per window.
//!
//! Usage:
//!   cargo run --release --example stream_recording -- \
//!       --rate 16000 --seconds 2 --length 512 --advance 160

use clap::Parser;
use flownet::{
    frame_pace, frames_of, shutdown, stream_frames, Dispatch, FiringInputs, FiringOutputs, Frame,
    Network, NodeKind, PortSpec, PublishData, Runner, SubscribeData, WorkResult,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sample rate in Hz
    #[arg(long, default_value = "16000")]
    rate: f64,

    /// Recording length in seconds
    #[arg(long, default_value = "2.0")]
    seconds: f64,

    /// Number of channels
    #[arg(long, default_value = "2")]
    channels: usize,

    /// Analysis window length in samples
    #[arg(long, default_value = "512")]
    length: usize,

    /// Samples pushed per chunk
    #[arg(long, default_value = "160")]
    advance: usize,
}

/// Reports the RMS level of each analysis window.
struct RmsMeter;

impl NodeKind for RmsMeter {
    fn kind(&self) -> &str {
        "rms_meter"
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::data("INPUT")]
    }

    fn outputs(&self) -> Vec<String> {
        vec!["LEVEL".to_string()]
    }

    fn fire(&mut self, inputs: &FiringInputs) -> WorkResult<FiringOutputs> {
        let frame = inputs.frame("INPUT")?;
        let count = (frame.channels() * frame.len()).max(1);
        let energy: f32 = frame.data().iter().map(|s| s * s).sum();
        let rms = (energy / count as f32).sqrt() as f64;
        Ok(FiringOutputs::new().with("LEVEL", rms))
    }
}

fn synthesize(rate: f64, seconds: f64, channels: usize) -> Option<Frame> {
    let samples = (rate * seconds) as usize;
    let rows: Vec<Vec<f32>> = (0..channels)
        .map(|c| {
            let freq = 220.0 * (c + 1) as f64;
            (0..samples)
                .map(|i| {
                    let t = i as f64 / rate;
                    (0.5 * (2.0 * std::f64::consts::PI * freq * t).sin()) as f32
                })
                .collect()
        })
        .collect();
    Frame::from_rows(&rows)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("=== Stream Recording Example ===");
    info!(
        "Rate: {} Hz, {} channels, window {} / chunk {}",
        args.rate, args.channels, args.length, args.advance
    );

    let recording =
        synthesize(args.rate, args.seconds, args.channels).ok_or("empty recording")?;
    info!("Recording: {recording}");

    let mut net = Network::new("rms");
    let src = net.create_named(PublishData::new(), "src")?;
    let meter = net.create_with(
        RmsMeter,
        Some("meter"),
        Dispatch::TriggeredMultiShot {
            length: args.length,
            advance: args.length,
        },
    )?;
    let sink = net.create_named(SubscribeData::new(), "sink")?;
    net.set(&meter, "INPUT", src.out("OUTPUT"))?;
    net.set(&sink, "INPUT", meter.out("LEVEL"))?;

    let publisher = net.publisher(&src)?;
    let subscriber = net.subscriber(&sink)?;
    let mut window = 0usize;
    subscriber.on_receive(move |value| {
        if let Some(level) = value.get::<f64>() {
            window += 1;
            info!("window {window}: rms = {level:.4}");
        }
    });

    let runner = Runner::spawn(net)?;

    let frames = frames_of(&recording, args.advance);
    info!("Streaming {} chunks...", frames.len());
    stream_frames(
        &runner,
        &publisher,
        frames,
        frame_pace(args.advance, args.rate),
    )?;

    shutdown(runner, &publisher)?;
    info!("Done!");

    Ok(())
}
