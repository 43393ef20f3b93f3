//! Audio subsystem module

pub mod capture;
pub mod output;
pub mod playback;
pub mod tone;
pub mod vad;

pub use capture::{AudioCapture, CaptureFrame, FrameSink};
pub use output::CpalOutput;
pub use playback::{AudioClock, JitterPlayback, LaneStats, ManualClock, NullSink, SystemClock};
pub use tone::{ToneGenerator, ToneHandle};
pub use vad::VoiceActivityDetector;

/// Root-mean-square level of one channel
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}
