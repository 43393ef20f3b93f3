//! Synthetic sine source
//!
//! Paces out fixed-duration frames like a real input device would, with
//! live-tunable frequency and amplitude. Used for loopback testing and as
//! a capture source on machines without input devices.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::capture::{CaptureFrame, FrameSink};
use crate::audio::rms;
use crate::config::ToneConfig;
use crate::error::AudioError;

pub const MIN_FREQUENCY: f32 = 20.0;
pub const MAX_FREQUENCY: f32 = 5_000.0;

struct ToneParams {
    enabled: bool,
    frequency: f32,
    amplitude: f32,
}

/// Shared control over a running generator
#[derive(Clone)]
pub struct ToneHandle {
    params: Arc<Mutex<ToneParams>>,
}

impl ToneHandle {
    pub fn set_enabled(&self, enabled: bool) {
        self.params.lock().enabled = enabled;
    }

    pub fn set_frequency(&self, frequency: f32) {
        self.params.lock().frequency = frequency.clamp(MIN_FREQUENCY, MAX_FREQUENCY);
    }

    pub fn set_amplitude(&self, amplitude: f32) {
        self.params.lock().amplitude = amplitude.clamp(0.0, 1.0);
    }

    pub fn is_enabled(&self) -> bool {
        self.params.lock().enabled
    }
}

/// Mono sine generator producing frames on its own thread
pub struct ToneGenerator {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    handle: ToneHandle,
}

impl ToneGenerator {
    pub fn spawn(
        config: &ToneConfig,
        sample_rate: u32,
        frame_samples: usize,
        mut sink: FrameSink,
    ) -> Result<Self, AudioError> {
        let params = Arc::new(Mutex::new(ToneParams {
            enabled: config.enabled,
            frequency: config.frequency.clamp(MIN_FREQUENCY, MAX_FREQUENCY),
            amplitude: config.amplitude.clamp(0.0, 1.0),
        }));
        let handle = ToneHandle {
            params: params.clone(),
        };

        let running = Arc::new(AtomicBool::new(true));
        let running_loop = running.clone();
        let frame_duration = Duration::from_secs_f64(frame_samples as f64 / sample_rate as f64);

        let thread_handle = thread::Builder::new()
            .name("tone-generator".into())
            .spawn(move || {
                let mut phase: f32 = 0.0;
                let epoch = Instant::now();
                let mut frames_emitted: u64 = 0;

                while running_loop.load(Ordering::Relaxed) {
                    let (enabled, frequency, amplitude) = {
                        let p = params.lock();
                        (p.enabled, p.frequency, p.amplitude)
                    };

                    let samples: Vec<f32> = if enabled && amplitude > 0.0 {
                        let step = frequency * 2.0 * std::f32::consts::PI / sample_rate as f32;
                        (0..frame_samples)
                            .map(|_| {
                                let s = phase.sin() * amplitude;
                                phase += step;
                                if phase > 2.0 * std::f32::consts::PI {
                                    phase -= 2.0 * std::f32::consts::PI;
                                }
                                s
                            })
                            .collect()
                    } else {
                        phase = 0.0;
                        vec![0.0; frame_samples]
                    };

                    let level = rms(&samples);
                    sink(CaptureFrame {
                        channels: vec![samples],
                        sample_rate,
                        rms: level,
                    });

                    // Pace against the epoch so drift does not accumulate
                    frames_emitted += 1;
                    let due = epoch + frame_duration * frames_emitted as u32;
                    let now = Instant::now();
                    if due > now {
                        thread::sleep(due - now);
                    }
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        Ok(Self {
            running,
            thread_handle: Some(thread_handle),
            handle,
        })
    }

    pub fn handle(&self) -> ToneHandle {
        self.handle.clone()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ToneGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}
