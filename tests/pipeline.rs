//! End-to-end audio pipeline tests
//!
//! Frames travel from planar capture buffers through the wire codec and
//! into scheduled playback. No audio devices involved.

use std::sync::Arc;

use voicegrid::audio::playback::{JitterPlayback, ManualClock, NullSink};
use voicegrid::codec::{AudioPacket, DecodePipeline, EncodePipeline};

const SAMPLE_RATE: u32 = 48_000;
const FRAME_SAMPLES: usize = 960;
const BITRATE: u32 = 32_000;

fn sine_frame(samples: usize, frequency: f32) -> Vec<f32> {
    (0..samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            0.5 * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

#[tokio::test]
async fn test_two_frames_travel_the_pipeline() {
    let mut encode = EncodePipeline::new(SAMPLE_RATE, BITRATE, FRAME_SAMPLES);
    let mut decode = DecodePipeline::new();

    let clock = Arc::new(ManualClock::new());
    let playback = JitterPlayback::new(clock.clone(), Arc::new(NullSink), 0.12);

    let mut last_timestamp = f64::NEG_INFINITY;
    for (i, frequency) in [440.0, 523.25].iter().enumerate() {
        let packets = encode
            .push(&[sine_frame(FRAME_SAMPLES, *frequency)])
            .await
            .unwrap();
        assert_eq!(packets.len(), 1);

        let packet = &packets[0];
        assert_eq!(packet.version(), 2);
        assert_eq!(packet.channels, 1);
        assert_eq!(packet.sample_rate, SAMPLE_RATE);
        assert_eq!(packet.frame_count, FRAME_SAMPLES as u32);
        assert_eq!(packet.sequence, i as u32);
        let ts = packet.timestamp_us.expect("encoded packets carry time");
        assert!(ts >= last_timestamp);
        last_timestamp = ts;

        let frame = decode
            .decode(&packet.to_bytes())
            .await
            .expect("valid wire bytes decode");
        assert_eq!(frame.channels.len(), 1);
        assert_eq!(frame.channels[0].len(), FRAME_SAMPLES);
        assert_eq!(frame.sequence, i as u32);

        let start = playback.enqueue("remote:peer", &frame);
        // First frame anchors at now+lead, the second lands flush after it
        let expected = 0.12 + i as f64 * (FRAME_SAMPLES as f64 / SAMPLE_RATE as f64);
        assert!((start - expected).abs() < 1e-9, "start {start} vs {expected}");
    }

    assert_eq!(decode.frames_decoded(), 2);
    let stats = playback.stats("remote:peer").unwrap();
    assert_eq!(stats.frames_decoded, 2);
    assert_eq!(stats.underruns, 0);
}

#[tokio::test]
async fn test_sub_frame_pushes_accumulate() {
    let mut encode = EncodePipeline::new(SAMPLE_RATE, BITRATE, FRAME_SAMPLES);

    let packets = encode.push(&[sine_frame(500, 440.0)]).await.unwrap();
    assert!(packets.is_empty(), "500 of 960 samples is not a frame yet");

    let packets = encode.push(&[sine_frame(460, 440.0)]).await.unwrap();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].frame_count, FRAME_SAMPLES as u32);
}

#[tokio::test]
async fn test_pcm_packet_roundtrips_exactly() {
    let channels = vec![sine_frame(FRAME_SAMPLES, 440.0)];
    let packet = AudioPacket::encode_pcm(&channels, SAMPLE_RATE, 7).unwrap();
    assert_eq!(packet.version(), 1);

    let mut decode = DecodePipeline::new();
    let frame = decode.decode(&packet.to_bytes()).await.unwrap();
    assert_eq!(frame.sequence, 7);
    assert_eq!(frame.timestamp_us, None);
    // PCM is lossless, unlike the Opus path
    assert_eq!(frame.channels, channels);
}

#[tokio::test]
async fn test_garbage_never_decodes() {
    let mut decode = DecodePipeline::new();
    assert!(decode.decode(&[]).await.is_none());
    assert!(decode.decode(&[0xff; 3]).await.is_none());
    assert!(decode.decode(&[0u8; 64]).await.is_none());
    assert_eq!(decode.frames_decoded(), 0);
}

#[tokio::test]
async fn test_truncated_packet_rejected() {
    let mut encode = EncodePipeline::new(SAMPLE_RATE, BITRATE, FRAME_SAMPLES);
    let packets = encode
        .push(&[sine_frame(FRAME_SAMPLES, 440.0)])
        .await
        .unwrap();
    let bytes = packets[0].to_bytes();

    assert!(AudioPacket::from_bytes(&bytes[..bytes.len() - 1]).is_none());
    assert!(AudioPacket::from_bytes(&bytes[..16]).is_none());
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn planar_frames() -> impl Strategy<Value = Vec<Vec<f32>>> {
        (1usize..=2, 1usize..=64).prop_flat_map(|(channels, frames)| {
            proptest::collection::vec(
                proptest::collection::vec(-1.0f32..=1.0, frames),
                channels,
            )
        })
    }

    proptest! {
        /// A PCM packet decodes back to exactly the header fields and
        /// samples it was built from.
        #[test]
        fn pcm_roundtrip_preserves_everything(
            channels in planar_frames(),
            sample_rate in 8_000u32..=192_000,
            sequence in any::<u32>(),
        ) {
            let packet = AudioPacket::encode_pcm(&channels, sample_rate, sequence).unwrap();
            let decoded = AudioPacket::from_bytes(&packet.to_bytes()).unwrap();
            prop_assert_eq!(decoded.channels as usize, channels.len());
            prop_assert_eq!(decoded.sample_rate, sample_rate);
            prop_assert_eq!(decoded.frame_count as usize, channels[0].len());
            prop_assert_eq!(decoded.sequence, sequence);
            prop_assert_eq!(decoded.timestamp_us, None);
            prop_assert_eq!(decoded.to_planar().unwrap(), channels);
        }

        /// Arbitrary bytes must never panic the wire parser.
        #[test]
        fn parse_handles_any_input(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = AudioPacket::from_bytes(&data);
        }

        /// Flipping any single byte of a valid packet either still parses
        /// or is rejected; it never panics.
        #[test]
        fn parse_survives_corruption(index in 0usize..28, value in any::<u8>()) {
            let packet = AudioPacket::encoded(
                bytes::Bytes::from_static(&[1, 2, 3, 4]),
                1,
                SAMPLE_RATE,
                FRAME_SAMPLES as u32,
                0,
                1000.0,
            );
            let mut data = packet.to_bytes().to_vec();
            data[index] = value;
            let _ = AudioPacket::from_bytes(&data);
        }
    }
}
