//! Loopback Demo
//!
//! Runs two presence sessions against an in-process relay: "tone"
//! publishes a VAD-gated sine wave and walks a square, "echo" subscribes
//! and plays whatever it hears through the default output device. Useful
//! for exercising the whole pipeline without a network or a microphone.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voicegrid::{
    audio::{
        capture::CaptureFrame,
        output::CpalOutput,
        playback::{AudioClock, JitterPlayback, NullSink, PlaybackSink, SystemClock},
        tone::ToneGenerator,
        vad::VoiceActivityDetector,
    },
    codec::EncodePipeline,
    config::AppConfig,
    presence::{Facing, PresenceSync, SessionOptions},
    transport::{MemoryRelay, Relay},
};

const PREFIX: &str = "voicegrid/demo/";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting loopback demo");

    let config = match AppConfig::default_path() {
        Some(path) if path.exists() => AppConfig::load(&path)?,
        _ => AppConfig::default(),
    };

    let relay: Arc<dyn Relay> = Arc::new(MemoryRelay::new());

    // Listener peer: plays remote audio on the default output device,
    // or silently if no device is available
    let (sink, clock): (Arc<dyn PlaybackSink>, Arc<dyn AudioClock>) =
        match CpalOutput::open(config.audio.sample_rate, u16::from(config.audio.channels)) {
            Ok(output) => {
                let clock = Arc::new(output.clock());
                (Arc::new(output), clock)
            }
            Err(e) => {
                tracing::warn!("No output device ({}); playing into the void", e);
                (Arc::new(NullSink), Arc::new(SystemClock::new()))
            }
        };
    let echo_playback = Arc::new(JitterPlayback::new(
        clock,
        sink,
        config.jitter.lead_seconds,
    ));
    let mut echo = PresenceSync::start(
        relay.clone(),
        SessionOptions {
            identity: "echo".into(),
            prefix: PREFIX.into(),
            config: config.presence.clone(),
        },
        echo_playback.clone(),
    )
    .await?;

    // Speaker peer: tone generator -> VAD gate -> Opus -> audio track
    let tone_playback = Arc::new(JitterPlayback::new(
        Arc::new(SystemClock::new()),
        Arc::new(NullSink),
        config.jitter.lead_seconds,
    ));
    let tone_session = PresenceSync::start(
        relay.clone(),
        SessionOptions {
            identity: "tone".into(),
            prefix: PREFIX.into(),
            config: config.presence.clone(),
        },
        tone_playback,
    )
    .await?;
    let tone_handle = tone_session.handle();
    let audio_writer = tone_session.audio_writer();

    let frame_samples = config.audio.frame_samples();
    let (frame_tx, mut frame_rx) = tokio::sync::mpsc::unbounded_channel::<CaptureFrame>();
    let mut generator = ToneGenerator::spawn(
        &config.tone,
        config.audio.sample_rate,
        frame_samples,
        Box::new(move |frame| {
            let _ = frame_tx.send(frame);
        }),
    )?;
    generator.handle().set_enabled(true);

    // Encode task: gate on voice activity, publish packets
    let vad_config = config.vad.clone();
    let audio_config = config.audio.clone();
    let encode_task = tokio::spawn(async move {
        let mut vad = VoiceActivityDetector::new(
            vad_config.threshold,
            vad_config.release_ms,
            audio_config.sample_rate,
        );
        let mut pipeline = EncodePipeline::new(
            audio_config.sample_rate,
            audio_config.bitrate,
            audio_config.frame_samples(),
        );
        while let Some(frame) = frame_rx.recv().await {
            if let Some(speaking) = vad.push(frame.rms, frame.frame_samples()) {
                let level = if speaking { frame.rms.min(1.0) } else { 0.0 };
                if tone_handle.set_speaking(level).is_err() {
                    return;
                }
                if !speaking {
                    pipeline.reset();
                }
            }
            if !vad.is_speaking() {
                continue;
            }
            match pipeline.push(&frame.channels).await {
                Ok(packets) => {
                    for packet in packets {
                        if let Err(e) = audio_writer.write_frame(packet.to_bytes()) {
                            tracing::warn!("Audio publish failed: {}", e);
                            return;
                        }
                    }
                }
                Err(e) => tracing::error!("Encode failed: {}", e),
            }
        }
    });

    // Walk the speaker around a square so the listener sees movement
    let walk_handle = tone_session.handle();
    let walk_task = tokio::spawn(async move {
        let corners = [
            (0.0_f32, 0.0_f32, Facing::Right),
            (5.0, 0.0, Facing::Down),
            (5.0, 5.0, Facing::Left),
            (0.0, 5.0, Facing::Up),
        ];
        let mut interval = tokio::time::interval(Duration::from_secs(2));
        let mut i = 0usize;
        loop {
            interval.tick().await;
            let (x, y, facing) = corners[i % corners.len()];
            if walk_handle.set_position(x, y, facing).is_err() {
                return;
            }
            i += 1;
        }
    });

    // Drain listener events and print stats until interrupted
    let mut stats = tokio::time::interval(Duration::from_secs(2));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = echo.next_event() => match event {
                Some(event) => tracing::info!(?event, "presence event"),
                None => break,
            },
            _ = stats.tick() => {
                for source in echo_playback.sources() {
                    if let Some(lane) = echo_playback.stats(&source) {
                        tracing::info!(
                            %source,
                            frames = lane.frames_decoded,
                            buffered_ms = lane.buffered_ahead * 1000.0,
                            underruns = lane.underruns,
                            "playback lane"
                        );
                    }
                }
            }
        }
    }

    tracing::info!("Shutting down");
    walk_task.abort();
    generator.stop();
    encode_task.abort();
    tone_session.shutdown().await;
    echo.shutdown().await;
    Ok(())
}
