//! Voice activity detection
//!
//! Two-state hysteresis on the capture RMS stream. The rising edge fires
//! immediately; the falling edge requires sustained quiet, counted in
//! samples, so the detector does not chatter around the threshold.

/// Speaking/not-speaking detector over per-frame RMS levels
pub struct VoiceActivityDetector {
    threshold: f32,
    release_samples: usize,
    speaking: bool,
    /// Consecutive below-threshold samples observed so far
    quiet_run: usize,
}

impl VoiceActivityDetector {
    pub fn new(threshold: f32, release_ms: u32, sample_rate: u32) -> Self {
        Self {
            threshold,
            release_samples: (release_ms as f64 / 1000.0 * sample_rate as f64).round() as usize,
            speaking: false,
            quiet_run: 0,
        }
    }

    /// Feed one frame's RMS. Returns `Some(speaking)` only on a transition.
    pub fn push(&mut self, rms: f32, frame_samples: usize) -> Option<bool> {
        if rms >= self.threshold {
            self.quiet_run = 0;
            if !self.speaking {
                self.speaking = true;
                return Some(true);
            }
            return None;
        }

        if self.speaking {
            self.quiet_run += frame_samples;
            if self.quiet_run >= self.release_samples {
                self.speaking = false;
                self.quiet_run = 0;
                return Some(false);
            }
        }
        None
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn release_samples(&self) -> usize {
        self.release_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rising_edge_is_immediate() {
        let mut vad = VoiceActivityDetector::new(0.015, 250, 16000);
        assert_eq!(vad.push(0.02, 320), Some(true));
        // Steady state emits nothing
        assert_eq!(vad.push(0.02, 320), None);
    }

    #[test]
    fn test_release_requires_sustained_quiet() {
        let mut vad = VoiceActivityDetector::new(0.015, 250, 16000);
        assert_eq!(vad.push(0.02, 320), Some(true));

        // 250ms at 16kHz = 4000 samples; 320-sample frames need 13 quiet
        // frames before the falling edge.
        assert_eq!(vad.release_samples(), 4000);
        for _ in 0..12 {
            assert_eq!(vad.push(0.001, 320), None);
        }
        assert_eq!(vad.push(0.001, 320), Some(false));
        assert!(!vad.is_speaking());
    }

    #[test]
    fn test_loud_frame_resets_quiet_run() {
        let mut vad = VoiceActivityDetector::new(0.015, 250, 16000);
        vad.push(0.02, 320);

        for _ in 0..10 {
            assert_eq!(vad.push(0.001, 320), None);
        }
        // Back above threshold: the run starts over
        assert_eq!(vad.push(0.02, 320), None);
        for _ in 0..12 {
            assert_eq!(vad.push(0.001, 320), None);
        }
        assert_eq!(vad.push(0.001, 320), Some(false));
    }

    #[test]
    fn test_quiet_input_never_fires() {
        let mut vad = VoiceActivityDetector::new(0.015, 250, 16000);
        for _ in 0..100 {
            assert_eq!(vad.push(0.0, 320), None);
        }
    }
}
