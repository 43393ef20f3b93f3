//! cpal output mixer
//!
//! Mixes scheduled lane audio into one output stream. Scheduled frames are
//! mix-added into a time-indexed ring at their start offset; the stream
//! callback drains the ring sequentially, applying the master gain.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::audio::playback::{PlaybackSink, SystemClock};
use crate::error::AudioError;

/// Seconds of mix ring; submissions past this horizon are clipped
const RING_SECONDS: usize = 4;

struct MixRing {
    /// Interleaved mix buffer, indexed by absolute frame modulo capacity
    buffer: Vec<f32>,
    capacity_frames: u64,
    channels: usize,
}

struct Shared {
    ring: Mutex<MixRing>,
    /// Absolute frame index the callback will render next
    playhead: AtomicU64,
    /// Master gain as f32 bits
    gain_bits: AtomicU32,
    sample_rate: u32,
}

/// Speaker output shared by all playback lanes
pub struct CpalOutput {
    shared: Arc<Shared>,
    clock: SystemClock,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Open the default output device. The returned clock shares the
    /// stream's epoch, so scheduled start times line up with playback.
    pub fn open(sample_rate: u32, channels: u16) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("default output".into()))?;

        let stream_config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity_frames = (sample_rate as usize * RING_SECONDS) as u64;
        let shared = Arc::new(Shared {
            ring: Mutex::new(MixRing {
                buffer: vec![0.0; capacity_frames as usize * channels as usize],
                capacity_frames,
                channels: channels as usize,
            }),
            playhead: AtomicU64::new(0),
            gain_bits: AtomicU32::new(1.0f32.to_bits()),
            sample_rate,
        });

        let epoch = Instant::now();
        let clock = SystemClock::from_epoch(epoch);

        let running = Arc::new(AtomicBool::new(true));
        let running_loop = running.clone();
        let shared_cb = shared.clone();

        let thread_handle = thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || {
                let stream = device.build_output_stream(
                    &stream_config,
                    move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let gain = f32::from_bits(shared_cb.gain_bits.load(Ordering::Relaxed));
                        let mut ring = shared_cb.ring.lock();
                        let channels = ring.channels;
                        let mut playhead = shared_cb.playhead.load(Ordering::Relaxed);
                        for frame in out.chunks_mut(channels) {
                            let base =
                                (playhead % ring.capacity_frames) as usize * channels;
                            for (c, sample) in frame.iter_mut().enumerate() {
                                *sample = ring.buffer[base + c] * gain;
                                ring.buffer[base + c] = 0.0;
                            }
                            playhead += 1;
                        }
                        shared_cb.playhead.store(playhead, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!("Output stream error: {}", err);
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            tracing::error!("Failed to start output stream: {}", e);
                            return;
                        }
                        while running_loop.load(Ordering::Relaxed) {
                            thread::sleep(std::time::Duration::from_millis(10));
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to build output stream: {}", e);
                    }
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        Ok(Self {
            shared,
            clock,
            running,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn clock(&self) -> SystemClock {
        self.clock.clone()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

impl PlaybackSink for CpalOutput {
    fn submit(&self, _source: &str, channels: &[Vec<f32>], sample_rate: u32, start: f64) {
        let frames = channels.first().map(|c| c.len()).unwrap_or(0);
        if frames == 0 || sample_rate != self.shared.sample_rate {
            return;
        }

        let mut ring = self.shared.ring.lock();
        let playhead = self.shared.playhead.load(Ordering::Relaxed);
        let start_frame = ((start * self.shared.sample_rate as f64) as u64).max(playhead);
        let out_channels = ring.channels;
        let capacity = ring.capacity_frames;

        // Frames past the ring horizon are clipped rather than wrapped onto
        // audio that has not played yet.
        let horizon = playhead + capacity;
        for i in 0..frames {
            let abs = start_frame + i as u64;
            if abs >= horizon {
                break;
            }
            let base = (abs % capacity) as usize * out_channels;
            for c in 0..out_channels {
                // Mono sources fan out to every output channel
                let sample = channels.get(c).or_else(|| channels.first());
                if let Some(channel) = sample {
                    ring.buffer[base + c] += channel[i];
                }
            }
        }
    }

    fn set_gain(&self, gain: f32) {
        self.shared
            .gain_bits
            .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}
