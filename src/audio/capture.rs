//! Live audio capture
//!
//! Captures from a cpal input device on a dedicated thread and pushes
//! fixed-duration planar frames to a sink callback. The consumer never
//! polls; frames arrive with their RMS level already computed.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::rms;
use crate::config::AudioConfig;
use crate::error::AudioError;

/// One fixed-duration capture frame, planar
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
    /// RMS of the primary channel
    pub rms: f32,
}

impl CaptureFrame {
    pub fn frame_samples(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }
}

/// Push-style consumer of capture frames
pub type FrameSink = Box<dyn FnMut(CaptureFrame) + Send>;

/// Live capture from one input device
pub struct AudioCapture {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Receiver<AudioError>,
    sample_rate: u32,
    channels: u16,
}

impl AudioCapture {
    /// Open the named input device (substring match) or the default one and
    /// start pushing frames to `sink`.
    ///
    /// Device resolution failures surface here, synchronously; stream
    /// errors after startup are reported through [`AudioCapture::check_errors`].
    pub fn open(
        device_name: Option<&str>,
        config: &AudioConfig,
        mut sink: FrameSink,
    ) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| AudioError::CpalError(e.to_string()))?
                .find(|d| d.name().map(|n| n.contains(name)).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))?,
            None => host
                .default_input_device()
                .ok_or_else(|| AudioError::DeviceNotFound("default input".into()))?,
        };

        let stream_config = StreamConfig {
            channels: config.channels as u16,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let sample_rate = config.sample_rate;
        let channels = config.channels as u16;
        let frame_samples = config.frame_samples();

        let running = Arc::new(AtomicBool::new(true));
        let running_cb = running.clone();
        let running_loop = running.clone();
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let error_tx_cb = error_tx.clone();

        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                // Interleaved samples pending re-chunking
                let mut pending: Vec<f32> = Vec::with_capacity(frame_samples * channels as usize * 2);

                let stream = device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if !running_cb.load(Ordering::Relaxed) {
                            return;
                        }
                        pending.extend_from_slice(data);

                        let chunk = frame_samples * channels as usize;
                        while pending.len() >= chunk {
                            let interleaved: Vec<f32> = pending.drain(..chunk).collect();
                            let mut planar: Vec<Vec<f32>> = (0..channels as usize)
                                .map(|_| Vec::with_capacity(frame_samples))
                                .collect();
                            for (i, sample) in interleaved.iter().enumerate() {
                                planar[i % channels as usize].push(*sample);
                            }
                            let level = rms(&planar[0]);
                            sink(CaptureFrame {
                                channels: planar,
                                sample_rate,
                                rms: level,
                            });
                        }
                    },
                    move |err| {
                        let _ = error_tx_cb.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            let _ = error_tx.try_send(AudioError::StreamError(e.to_string()));
                            return;
                        }
                        while running_loop.load(Ordering::Relaxed) {
                            thread::sleep(std::time::Duration::from_millis(10));
                        }
                        // Stream is dropped here, stopping capture
                    }
                    Err(e) => {
                        let _ = error_tx.try_send(AudioError::StreamError(e.to_string()));
                    }
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        Ok(Self {
            running,
            thread_handle: Some(handle),
            error_rx,
            sample_rate,
            channels,
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Drain one pending stream error, if any
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.try_recv().ok()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
