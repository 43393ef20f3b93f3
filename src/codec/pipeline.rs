//! Frame assembly and the single-flight async codec pipeline
//!
//! The Opus backend runs on its own worker thread. Requests go through an
//! explicit single-flight FIFO: at most one encode (or decode) may be
//! outstanding per instance, and completions are matched to submissions
//! strictly in order. Tearing an instance down rejects every in-flight
//! request with [`CodecError::Closed`] instead of leaving it dangling.

use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;
use crossbeam_channel::{unbounded, Sender};
use tokio::sync::oneshot;

use crate::codec::opus::{OpusVoiceDecoder, OpusVoiceEncoder};
use crate::codec::packet::AudioPacket;
use crate::error::CodecError;

/// Per-channel sample FIFOs that cut fixed-size frames.
///
/// Samples accumulate per channel; a frame is only produced once every
/// channel holds at least `frame_samples`. A change in channel count
/// discards whatever was buffered.
pub struct FrameAssembler {
    fifos: Vec<VecDeque<f32>>,
    frame_samples: usize,
}

impl FrameAssembler {
    pub fn new(frame_samples: usize) -> Self {
        Self {
            fifos: Vec::new(),
            frame_samples,
        }
    }

    /// Append planar samples. Returns true if the channel layout changed
    /// (and buffered samples were discarded).
    pub fn push(&mut self, channels: &[Vec<f32>]) -> bool {
        let relaid = self.fifos.len() != channels.len();
        if relaid {
            self.fifos = channels.iter().map(|_| VecDeque::new()).collect();
        }
        for (fifo, channel) in self.fifos.iter_mut().zip(channels) {
            fifo.extend(channel.iter().copied());
        }
        relaid
    }

    /// Cut the next full frame, planar, if every channel has one.
    pub fn pop_frame(&mut self) -> Option<Vec<Vec<f32>>> {
        if self.fifos.is_empty() || self.fifos.iter().any(|f| f.len() < self.frame_samples) {
            return None;
        }
        Some(
            self.fifos
                .iter_mut()
                .map(|f| f.drain(..self.frame_samples).collect())
                .collect(),
        )
    }

    pub fn channel_count(&self) -> usize {
        self.fifos.len()
    }

    pub fn buffered_samples(&self) -> usize {
        self.fifos.first().map(|f| f.len()).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.fifos.clear();
    }
}

fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
    let frames = channels.first().map(|c| c.len()).unwrap_or(0);
    let mut out = Vec::with_capacity(frames * channels.len());
    for i in 0..frames {
        for channel in channels {
            out.push(channel[i]);
        }
    }
    out
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    (0..channels)
        .map(|c| (0..frames).map(|i| samples[i * channels + c]).collect())
        .collect()
}

struct EncodeJob {
    frame: Vec<Vec<f32>>,
    sequence: u32,
    timestamp_us: f64,
    done: oneshot::Sender<Result<AudioPacket, CodecError>>,
}

/// Single-flight async Opus encoder.
///
/// `submit` queues exactly one request; a second submit before the
/// completion is consumed is a contract violation and returns
/// [`CodecError::Busy`].
pub struct AsyncEncoder {
    job_tx: Option<Sender<EncodeJob>>,
    pending: VecDeque<oneshot::Receiver<Result<AudioPacket, CodecError>>>,
    sample_rate: u32,
    channels: u8,
    frame_samples: usize,
}

impl AsyncEncoder {
    /// Backend construction happens here so misconfiguration surfaces
    /// synchronously to the caller.
    pub fn new(
        sample_rate: u32,
        channels: u8,
        bitrate: u32,
        frame_samples: usize,
    ) -> Result<Self, CodecError> {
        let mut backend = OpusVoiceEncoder::new(sample_rate, channels, bitrate, frame_samples)?;
        let (job_tx, job_rx) = unbounded::<EncodeJob>();

        std::thread::Builder::new()
            .name("opus-encode".into())
            .spawn(move || {
                for job in job_rx {
                    let interleaved = interleave(&job.frame);
                    let result = backend.encode(&interleaved).map(|payload| {
                        AudioPacket::encoded(
                            payload,
                            channels,
                            sample_rate,
                            frame_samples as u32,
                            job.sequence,
                            job.timestamp_us,
                        )
                    });
                    // Receiver may have been dropped on close
                    let _ = job.done.send(result);
                }
            })
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;

        Ok(Self {
            job_tx: Some(job_tx),
            pending: VecDeque::new(),
            sample_rate,
            channels,
            frame_samples,
        })
    }

    /// Queue one frame for encoding.
    pub fn submit(
        &mut self,
        frame: Vec<Vec<f32>>,
        sequence: u32,
        timestamp_us: f64,
    ) -> Result<(), CodecError> {
        if !self.pending.is_empty() {
            return Err(CodecError::Busy);
        }
        let job_tx = self.job_tx.as_ref().ok_or(CodecError::Closed)?;
        if frame.len() != self.channels as usize
            || frame.iter().any(|c| c.len() != self.frame_samples)
        {
            return Err(CodecError::InvalidFrameSize(
                frame.iter().map(|c| c.len()).sum(),
            ));
        }

        let (done, rx) = oneshot::channel();
        job_tx
            .send(EncodeJob {
                frame,
                sequence,
                timestamp_us,
                done,
            })
            .map_err(|_| CodecError::Closed)?;
        self.pending.push_back(rx);
        Ok(())
    }

    /// Await the oldest outstanding completion.
    pub async fn completed(&mut self) -> Result<AudioPacket, CodecError> {
        let rx = self.pending.pop_front().ok_or(CodecError::Closed)?;
        rx.await.map_err(|_| CodecError::Closed)?
    }

    /// Submit-and-await convenience; keeps the single-flight contract.
    pub async fn encode(
        &mut self,
        frame: Vec<Vec<f32>>,
        sequence: u32,
        timestamp_us: f64,
    ) -> Result<AudioPacket, CodecError> {
        self.submit(frame, sequence, timestamp_us)?;
        self.completed().await
    }

    /// Tear the worker down. In-flight completions resolve with
    /// [`CodecError::Closed`] even if the worker already produced a result.
    pub fn close(&mut self) {
        self.job_tx = None;
        self.pending.clear();
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }
}

impl Drop for AsyncEncoder {
    fn drop(&mut self) {
        self.close();
    }
}

/// A decoded audio frame, planar
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
    pub sequence: u32,
    pub timestamp_us: Option<f64>,
}

impl DecodedFrame {
    pub fn duration_seconds(&self) -> f64 {
        let frames = self.channels.first().map(|c| c.len()).unwrap_or(0);
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f64 / self.sample_rate as f64
    }
}

struct DecodeJob {
    payload: Bytes,
    sequence: u32,
    timestamp_us: Option<f64>,
    done: oneshot::Sender<Result<DecodedFrame, CodecError>>,
}

/// Single-flight async Opus decoder, mirror of [`AsyncEncoder`].
pub struct AsyncDecoder {
    job_tx: Option<Sender<DecodeJob>>,
    pending: VecDeque<oneshot::Receiver<Result<DecodedFrame, CodecError>>>,
    channels: u8,
}

impl AsyncDecoder {
    pub fn new(sample_rate: u32, channels: u8) -> Result<Self, CodecError> {
        let mut backend = OpusVoiceDecoder::new(sample_rate, channels)?;
        let (job_tx, job_rx) = unbounded::<DecodeJob>();

        std::thread::Builder::new()
            .name("opus-decode".into())
            .spawn(move || {
                for job in job_rx {
                    let result = backend.decode(&job.payload).map(|interleaved| DecodedFrame {
                        channels: deinterleave(&interleaved, channels as usize),
                        sample_rate,
                        sequence: job.sequence,
                        timestamp_us: job.timestamp_us,
                    });
                    let _ = job.done.send(result);
                }
            })
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        Ok(Self {
            job_tx: Some(job_tx),
            pending: VecDeque::new(),
            channels,
        })
    }

    pub fn submit(&mut self, packet: &AudioPacket) -> Result<(), CodecError> {
        if !self.pending.is_empty() {
            return Err(CodecError::Busy);
        }
        let job_tx = self.job_tx.as_ref().ok_or(CodecError::Closed)?;

        let (done, rx) = oneshot::channel();
        job_tx
            .send(DecodeJob {
                payload: packet.payload.clone(),
                sequence: packet.sequence,
                timestamp_us: packet.timestamp_us,
                done,
            })
            .map_err(|_| CodecError::Closed)?;
        self.pending.push_back(rx);
        Ok(())
    }

    pub async fn completed(&mut self) -> Result<DecodedFrame, CodecError> {
        let rx = self.pending.pop_front().ok_or(CodecError::Closed)?;
        rx.await.map_err(|_| CodecError::Closed)?
    }

    pub async fn decode(&mut self, packet: &AudioPacket) -> Result<DecodedFrame, CodecError> {
        self.submit(packet)?;
        self.completed().await
    }

    pub fn close(&mut self) {
        self.job_tx = None;
        self.pending.clear();
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }
}

impl Drop for AsyncDecoder {
    fn drop(&mut self) {
        self.close();
    }
}

/// Capture-side pipeline: FIFO assembly plus a lazily created encoder.
///
/// The encoder is created on first full frame and torn down whenever the
/// channel layout changes or `reset` is called.
pub struct EncodePipeline {
    sample_rate: u32,
    bitrate: u32,
    frame_samples: usize,
    assembler: FrameAssembler,
    encoder: Option<AsyncEncoder>,
    sequence: u32,
    epoch: Instant,
}

impl EncodePipeline {
    pub fn new(sample_rate: u32, bitrate: u32, frame_samples: usize) -> Self {
        Self {
            sample_rate,
            bitrate,
            frame_samples,
            assembler: FrameAssembler::new(frame_samples),
            encoder: None,
            sequence: 0,
            epoch: Instant::now(),
        }
    }

    /// Feed planar capture samples; returns every packet that became ready.
    pub async fn push(&mut self, channels: &[Vec<f32>]) -> Result<Vec<AudioPacket>, CodecError> {
        if self.assembler.push(channels) {
            // Channel layout changed: the old encoder state is useless.
            if let Some(mut encoder) = self.encoder.take() {
                encoder.close();
            }
        }

        let mut packets = Vec::new();
        while let Some(frame) = self.assembler.pop_frame() {
            if self.encoder.is_none() {
                self.encoder = Some(AsyncEncoder::new(
                    self.sample_rate,
                    channels.len() as u8,
                    self.bitrate,
                    self.frame_samples,
                )?);
            }
            let encoder = self.encoder.as_mut().ok_or(CodecError::Closed)?;
            let timestamp_us = self.epoch.elapsed().as_micros() as f64;
            let packet = encoder.encode(frame, self.sequence, timestamp_us).await?;
            self.sequence = self.sequence.wrapping_add(1);
            packets.push(packet);
        }
        Ok(packets)
    }

    /// Drop buffered samples and the backend.
    pub fn reset(&mut self) {
        self.assembler.clear();
        if let Some(mut encoder) = self.encoder.take() {
            encoder.close();
        }
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

/// Receive-side pipeline: wire bytes to planar frames.
///
/// PCM packets decode in place; extended packets go through the Opus
/// decoder, which is recreated when the advertised channel count changes.
pub struct DecodePipeline {
    decoder: Option<AsyncDecoder>,
    frames_decoded: u64,
}

impl DecodePipeline {
    pub fn new() -> Self {
        Self {
            decoder: None,
            frames_decoded: 0,
        }
    }

    /// Decode one wire buffer. Malformed packets and backend failures both
    /// yield `None`; a single bad peer frame never tears the stream down.
    pub async fn decode(&mut self, data: &[u8]) -> Option<DecodedFrame> {
        let packet = AudioPacket::from_bytes(data)?;

        let frame = if packet.timestamp_us.is_none() {
            DecodedFrame {
                channels: packet.to_planar()?,
                sample_rate: packet.sample_rate,
                sequence: packet.sequence,
                timestamp_us: None,
            }
        } else {
            match self.decoder {
                Some(ref decoder) if decoder.channels() == packet.channels => {}
                _ => {
                    if let Some(mut old) = self.decoder.take() {
                        old.close();
                    }
                    match AsyncDecoder::new(packet.sample_rate, packet.channels) {
                        Ok(decoder) => self.decoder = Some(decoder),
                        Err(e) => {
                            tracing::warn!("Decoder unavailable: {}", e);
                            return None;
                        }
                    }
                }
            }
            match self.decoder.as_mut()?.decode(&packet).await {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!("Dropping undecodable frame: {}", e);
                    return None;
                }
            }
        };

        self.frames_decoded += 1;
        Some(frame)
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }
}

impl Default for DecodePipeline {
    fn default() -> Self {
        Self::new()
    }
}
