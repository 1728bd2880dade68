use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{debug, info};

use grainfield_core::player::{PlayerSession, RELEASE_TIME};
use grainfield_core::{
    AudioBuffer, AudioClock, Message, OfflineDevice, Param, Scheduler, SynthVoice,
};

/// Renders a WAV file through the granular player offline
#[derive(Parser, Debug)]
#[command(name = "grainfield-render")]
#[command(about = "Re-synthesize a WAV file with the grainfield granular player")]
struct Args {
    /// Source WAV file
    input: PathBuf,

    /// Destination WAV file (32 bit float, mono)
    output: PathBuf,

    /// Length of the rendering in seconds (defaults to the input length)
    #[arg(short, long)]
    seconds: Option<f64>,

    /// Playback position, 0 to 1 across the source
    #[arg(long, default_value_t = 0.5)]
    position: f64,

    /// Grain period in ms
    #[arg(long, default_value_t = 10.0)]
    period: f64,

    /// Grain duration in ms
    #[arg(long, default_value_t = 100.0)]
    duration: f64,

    /// Position jitter in ms
    #[arg(long, default_value_t = 3.0)]
    blur: f64,

    /// Resampling in cents
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pitch: f64,

    /// Resampling jitter in cents
    #[arg(long, default_value_t = 0.0)]
    bubble: f64,

    /// Output gain in dB
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    gain: f64,

    /// Attack in percent of the grain duration
    #[arg(long, default_value_t = 50.0)]
    attack: f64,

    /// Release in percent of the grain duration
    #[arg(long, default_value_t = 50.0)]
    release: f64,

    /// Seed for the grain jitter
    #[arg(long)]
    seed: Option<u64>,

    /// Stop abruptly instead of appending the end-of-session release
    #[arg(long)]
    no_release: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn messages(&self) -> Result<Vec<Message>> {
        let values = [
            (Param::Period, self.period),
            (Param::Duration, self.duration),
            (Param::Blur, self.blur),
            (Param::Pitch, self.pitch),
            (Param::Bubble, self.bubble),
            (Param::Gain, self.gain),
            (Param::Attack, self.attack),
            (Param::Release, self.release),
        ];
        values
            .into_iter()
            .map(|(param, value)| {
                let value = param
                    .validate(&json!(value))
                    .with_context(|| format!("invalid --{param}"))?;
                Ok(Message::Param(param, value))
            })
            .collect()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let source = Arc::new(
        AudioBuffer::from_wav_bytes(&bytes)
            .with_context(|| format!("failed to decode {}", args.input.display()))?,
    );
    let sample_rate = source.sample_rate();
    info!(
        "Loaded {} ({:.2}s at {} Hz)",
        args.input.display(),
        source.duration(),
        sample_rate
    );

    let device = Arc::new(OfflineDevice::new(sample_rate));
    let mut scheduler = Scheduler::new(device.clone());
    let voice = match args.seed {
        Some(seed) => SynthVoice::with_seed(device.clone(), seed),
        None => SynthVoice::new(device.clone()),
    };
    let mut session = PlayerSession::new(voice);

    for message in args.messages()? {
        session.handle(message);
    }
    session.start(&mut scheduler)?;
    session.segment_loaded(&mut scheduler, 0, source.clone())?;
    session.set_touch_position(args.position, 0.5);

    let seconds = args.seconds.unwrap_or_else(|| source.duration());
    let step = scheduler.period();
    let block = ((step * sample_rate as f64).round() as usize).max(1);
    let block_duration = block as f64 / sample_rate as f64;
    let mut rendered = Vec::new();
    let mut released = args.no_release;

    loop {
        let now = device.current_time();
        if now >= seconds {
            if released {
                break;
            }
            info!("Releasing over {RELEASE_TIME}s");
            session.stop();
            released = true;
        }
        if released && !args.no_release && scheduler.is_empty() {
            break;
        }
        if now >= seconds + RELEASE_TIME + 1.0 {
            break;
        }

        scheduler.tick();
        rendered.extend(device.render(now, block));
        device.discard_before(now + block_duration);
        device.set_time(now + block_duration);
    }
    debug!("rendered {} samples", rendered.len());

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&args.output, spec)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    for sample in &rendered {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;

    info!(
        "Wrote {} ({:.2}s)",
        args.output.display(),
        rendered.len() as f64 / sample_rate as f64
    );
    Ok(())
}
