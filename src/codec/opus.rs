//! Opus codec backends tuned for voice
//!
//! Thin wrappers over the `opus` crate with buffers reused across calls.

use bytes::Bytes;
use opus::{Application, Channels, Decoder, Encoder};

use crate::error::CodecError;

fn opus_channels(channels: u8) -> Result<Channels, CodecError> {
    match channels {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        other => Err(CodecError::EncoderInit(format!(
            "Unsupported channel count: {}",
            other
        ))),
    }
}

/// Opus encoder configured for VoIP use
pub struct OpusVoiceEncoder {
    encoder: Encoder,
    channels: u8,
    frame_samples: usize,
    /// Encoding buffer (reused to avoid allocations)
    encode_buffer: Vec<u8>,
    frames_encoded: u64,
    bytes_produced: u64,
}

impl OpusVoiceEncoder {
    /// Create an encoder; `frame_samples` is per channel.
    ///
    /// Backend failures surface here synchronously, never mid-stream.
    pub fn new(
        sample_rate: u32,
        channels: u8,
        bitrate: u32,
        frame_samples: usize,
    ) -> Result<Self, CodecError> {
        let mut encoder = Encoder::new(sample_rate, opus_channels(channels)?, Application::Voip)
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;

        encoder
            .set_bitrate(opus::Bitrate::Bits(bitrate as i32))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set bitrate: {}", e)))?;
        encoder
            .set_inband_fec(true)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set FEC: {}", e)))?;
        encoder
            .set_packet_loss_perc(10)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set packet loss: {}", e)))?;

        Ok(Self {
            encoder,
            channels,
            frame_samples,
            // Max Opus frame is about 1275 bytes
            encode_buffer: vec![0u8; 4000],
            frames_encoded: 0,
            bytes_produced: 0,
        })
    }

    /// Encode one interleaved frame (`frame_samples * channels` floats).
    pub fn encode(&mut self, samples: &[f32]) -> Result<Bytes, CodecError> {
        let expected = self.frame_samples * self.channels as usize;
        if samples.len() != expected {
            return Err(CodecError::InvalidFrameSize(samples.len()));
        }

        let size = self
            .encoder
            .encode_float(samples, &mut self.encode_buffer)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        self.frames_encoded += 1;
        self.bytes_produced += size as u64;

        Ok(Bytes::copy_from_slice(&self.encode_buffer[..size]))
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    pub fn bytes_produced(&self) -> u64 {
        self.bytes_produced
    }
}

/// Opus decoder counterpart
pub struct OpusVoiceDecoder {
    decoder: Decoder,
    channels: u8,
    /// Decoding buffer sized for the largest Opus frame (120ms)
    decode_buffer: Vec<f32>,
    frames_decoded: u64,
}

impl OpusVoiceDecoder {
    pub fn new(sample_rate: u32, channels: u8) -> Result<Self, CodecError> {
        let decoder = Decoder::new(sample_rate, opus_channels(channels)?)
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        Ok(Self {
            decoder,
            channels,
            decode_buffer: vec![0.0f32; sample_rate as usize * channels as usize * 120 / 1000],
            frames_decoded: 0,
        })
    }

    /// Decode one Opus packet to interleaved f32 samples.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>, CodecError> {
        let samples = self
            .decoder
            .decode_float(data, &mut self.decode_buffer, false)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

        self.frames_decoded += 1;
        Ok(self.decode_buffer[..samples * self.channels as usize].to_vec())
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }
}
