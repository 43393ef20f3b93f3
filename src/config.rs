//! Application configuration
//!
//! All tunables live here with defaults matching the reference protocol
//! timings. Configs round-trip through TOML so a peer can persist its
//! settings across runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub jitter: JitterConfig,
    pub presence: PresenceConfig,
    pub tone: ToneConfig,
}

/// Capture/codec audio parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count for capture
    pub channels: u8,
    /// Frame duration in milliseconds
    pub frame_ms: f32,
    /// Opus bitrate in bits per second
    pub bitrate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            frame_ms: DEFAULT_FRAME_MS,
            bitrate: 32_000,
        }
    }
}

impl AudioConfig {
    /// Samples per channel in one frame
    pub fn frame_samples(&self) -> usize {
        (self.sample_rate as f32 * self.frame_ms / 1000.0) as usize
    }
}

/// Voice activity detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// RMS level at or above which speech starts immediately
    pub threshold: f32,
    /// Sustained-quiet duration required before speech ends
    pub release_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.015,
            release_ms: 250,
        }
    }
}

/// Jitter-buffered playback parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitterConfig {
    /// Forward buffering margin in seconds
    pub lead_seconds: f64,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            lead_seconds: DEFAULT_LEAD_SECONDS,
        }
    }
}

/// Presence protocol timings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Idle re-broadcast interval for the state record
    pub heartbeat_ms: u64,
    /// Broadcast interval for the speaking level
    pub speaking_interval_ms: u64,
    /// Staleness sweep tick
    pub sweep_interval_ms: u64,
    /// Subscriptions with no record for this long are pruned
    pub stale_timeout_ms: u64,
    /// Position delta below this does not trigger an immediate send
    pub position_epsilon: f32,
    pub retry: RetryConfig,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
            speaking_interval_ms: DEFAULT_SPEAKING_INTERVAL_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            stale_timeout_ms: DEFAULT_STALE_TIMEOUT_MS,
            position_epsilon: DEFAULT_POSITION_EPSILON,
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff policy for subscription retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Base delay in milliseconds
    pub base_ms: u64,
    /// Delay cap in milliseconds
    pub cap_ms: u64,
    /// Jitter fraction applied as `(1 ± jitter)`
    pub jitter: f64,
    /// Attempts before the subscription is abandoned
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_ms: 250,
            cap_ms: 5_000,
            jitter: 0.4,
            max_attempts: 10,
        }
    }
}

/// Synthetic tone source parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToneConfig {
    pub enabled: bool,
    /// Tone frequency in Hz, clamped to 20..=5000
    pub frequency: f32,
    /// Amplitude, clamped to 0..=1
    pub amplitude: f32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency: 440.0,
            amplitude: 0.25,
        }
    }
}

impl AppConfig {
    /// Default on-disk location for the config file
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "voicegrid")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load a config from a TOML file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save the config to a TOML file, creating parent directories
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_timings() {
        let config = AppConfig::default();
        assert_eq!(config.audio.frame_samples(), 960);
        assert_eq!(config.presence.heartbeat_ms, 1_000);
        assert_eq!(config.presence.speaking_interval_ms, 150);
        assert_eq!(config.presence.stale_timeout_ms, 5_000);
        assert_eq!(config.presence.retry.max_attempts, 10);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.audio.sample_rate, config.audio.sample_rate);
        assert_eq!(back.presence.position_epsilon, config.presence.position_epsilon);
    }
}
