//! Binary wire format for audio frames
//!
//! Little-endian layout:
//!
//! ```text
//! offset  field          type
//! 0       version        u8
//! 1       channelCount   u8
//! 2-3     reserved       u16
//! 4-7     sampleRate     u32
//! 8-11    frameCount     u32
//! 12-15   sequence       u32
//! 16-23   timestampUs    f64   (extended variant only)
//! 24-27   payloadLength  u32   (extended variant only)
//! ..      payload
//! ```
//!
//! The version byte selects the variant: `VERSION_PCM` carries planar f32
//! samples with an implied payload length, `VERSION_EXT` carries an
//! explicit payload length and may hold codec-encoded bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::{VERSION_EXT, VERSION_PCM};

const HEADER_LEN_PCM: usize = 16;
const HEADER_LEN_EXT: usize = 28;

/// A single audio frame on the wire
#[derive(Debug, Clone)]
pub struct AudioPacket {
    pub channels: u8,
    pub sample_rate: u32,
    pub frame_count: u32,
    pub sequence: u32,
    /// Capture timestamp in microseconds; present only on the extended variant
    pub timestamp_us: Option<f64>,
    pub payload: Bytes,
}

impl AudioPacket {
    /// Wire version this packet serializes as
    pub fn version(&self) -> u8 {
        if self.timestamp_us.is_some() {
            VERSION_EXT
        } else {
            VERSION_PCM
        }
    }

    /// Frame duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count as f64 / self.sample_rate as f64
    }

    /// Encode equal-length planar channel buffers into a PCM packet.
    ///
    /// Returns `None` (not an error) for an empty channel list, zero-length
    /// frames, or mismatched channel lengths.
    pub fn encode_pcm(channels: &[Vec<f32>], sample_rate: u32, sequence: u32) -> Option<Self> {
        let first_len = channels.first()?.len();
        if first_len == 0 || channels.len() > u8::MAX as usize {
            return None;
        }
        if channels.iter().any(|c| c.len() != first_len) {
            return None;
        }

        let mut payload = BytesMut::with_capacity(channels.len() * first_len * 4);
        for channel in channels {
            for &sample in channel {
                payload.put_f32_le(sample);
            }
        }

        Some(Self {
            channels: channels.len() as u8,
            sample_rate,
            frame_count: first_len as u32,
            sequence,
            timestamp_us: None,
            payload: payload.freeze(),
        })
    }

    /// Build an extended-variant packet around codec-encoded payload bytes.
    pub fn encoded(
        payload: Bytes,
        channels: u8,
        sample_rate: u32,
        frame_count: u32,
        sequence: u32,
        timestamp_us: f64,
    ) -> Self {
        Self {
            channels,
            sample_rate,
            frame_count,
            sequence,
            timestamp_us: Some(timestamp_us),
            payload,
        }
    }

    /// Serialize to the wire format.
    pub fn to_bytes(&self) -> Bytes {
        let header_len = match self.timestamp_us {
            Some(_) => HEADER_LEN_EXT,
            None => HEADER_LEN_PCM,
        };
        let mut buf = BytesMut::with_capacity(header_len + self.payload.len());
        buf.put_u8(self.version());
        buf.put_u8(self.channels);
        buf.put_u16_le(0); // reserved
        buf.put_u32_le(self.sample_rate);
        buf.put_u32_le(self.frame_count);
        buf.put_u32_le(self.sequence);
        if let Some(ts) = self.timestamp_us {
            buf.put_f64_le(ts);
            buf.put_u32_le(self.payload.len() as u32);
        }
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a packet from wire bytes.
    ///
    /// Returns `None` on any structural violation: unrecognized version,
    /// short header, zero channels/frames, or a payload whose length does
    /// not match what the header implies or declares. Never panics.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let mut buf = data;
        if buf.remaining() < HEADER_LEN_PCM {
            return None;
        }

        let version = buf.get_u8();
        let channels = buf.get_u8();
        let _reserved = buf.get_u16_le();
        let sample_rate = buf.get_u32_le();
        let frame_count = buf.get_u32_le();
        let sequence = buf.get_u32_le();

        if channels == 0 || frame_count == 0 {
            return None;
        }

        match version {
            VERSION_PCM => {
                let expected = channels as usize * frame_count as usize * 4;
                if buf.remaining() != expected {
                    return None;
                }
                Some(Self {
                    channels,
                    sample_rate,
                    frame_count,
                    sequence,
                    timestamp_us: None,
                    payload: Bytes::copy_from_slice(buf),
                })
            }
            VERSION_EXT => {
                if buf.remaining() < HEADER_LEN_EXT - HEADER_LEN_PCM {
                    return None;
                }
                let timestamp_us = buf.get_f64_le();
                let declared = buf.get_u32_le() as usize;
                if buf.remaining() != declared {
                    return None;
                }
                Some(Self {
                    channels,
                    sample_rate,
                    frame_count,
                    sequence,
                    timestamp_us: Some(timestamp_us),
                    payload: Bytes::copy_from_slice(buf),
                })
            }
            _ => None,
        }
    }

    /// De-interleave a PCM payload back into planar channel buffers.
    ///
    /// Returns `None` for extended-variant packets, whose payload is
    /// codec-encoded and goes through [`crate::codec::AsyncDecoder`].
    pub fn to_planar(&self) -> Option<Vec<Vec<f32>>> {
        if self.timestamp_us.is_some() {
            return None;
        }
        let frames = self.frame_count as usize;
        if self.payload.len() != self.channels as usize * frames * 4 {
            return None;
        }
        let mut out = Vec::with_capacity(self.channels as usize);
        let mut buf = &self.payload[..];
        for _ in 0..self.channels {
            let mut channel = Vec::with_capacity(frames);
            for _ in 0..frames {
                channel.push(buf.get_f32_le());
            }
            out.push(channel);
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_roundtrip_preserves_header() {
        let channels = vec![vec![0.25f32; 960], vec![-0.25f32; 960]];
        let packet = AudioPacket::encode_pcm(&channels, 48000, 7).unwrap();
        let decoded = AudioPacket::from_bytes(&packet.to_bytes()).unwrap();

        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.sample_rate, 48000);
        assert_eq!(decoded.frame_count, 960);
        assert_eq!(decoded.sequence, 7);
        assert_eq!(decoded.to_planar().unwrap(), channels);
    }

    #[test]
    fn test_empty_inputs_yield_no_packet() {
        assert!(AudioPacket::encode_pcm(&[], 48000, 0).is_none());
        assert!(AudioPacket::encode_pcm(&[vec![]], 48000, 0).is_none());
        assert!(AudioPacket::encode_pcm(&[vec![0.0; 10], vec![0.0; 9]], 48000, 0).is_none());
    }

    #[test]
    fn test_malformed_bytes_yield_no_packet() {
        let packet = AudioPacket::encode_pcm(&[vec![0.0f32; 480]], 48000, 0).unwrap();
        let wire = packet.to_bytes();

        // Truncated
        assert!(AudioPacket::from_bytes(&wire[..wire.len() - 1]).is_none());
        assert!(AudioPacket::from_bytes(&wire[..8]).is_none());
        assert!(AudioPacket::from_bytes(&[]).is_none());

        // Unrecognized version
        let mut bad = wire.to_vec();
        bad[0] = 99;
        assert!(AudioPacket::from_bytes(&bad).is_none());

        // Trailing garbage breaks the implied length
        let mut long = wire.to_vec();
        long.push(0);
        assert!(AudioPacket::from_bytes(&long).is_none());
    }

    #[test]
    fn test_extended_variant_length_check() {
        let packet = AudioPacket::encoded(
            Bytes::from_static(&[1, 2, 3, 4]),
            1,
            48000,
            960,
            3,
            123_456.0,
        );
        let wire = packet.to_bytes();
        let decoded = AudioPacket::from_bytes(&wire).unwrap();
        assert_eq!(decoded.timestamp_us, Some(123_456.0));
        assert_eq!(decoded.payload.len(), 4);

        // Declared length no longer matches actual bytes
        let mut bad = wire.to_vec();
        bad.truncate(bad.len() - 1);
        assert!(AudioPacket::from_bytes(&bad).is_none());
    }
}
