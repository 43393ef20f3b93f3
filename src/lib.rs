//! # Voicegrid
//!
//! Low-latency voice and live-position presence over a pub/sub relay.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                             LOCAL PEER                               │
//! │  ┌──────────────┐      ┌──────────────────┐                          │
//! │  │ CaptureSource│─rms─▶│ VoiceActivity    │──speaking──┐             │
//! │  │ (mic / tone) │      │ Detector         │            │             │
//! │  └──────┬───────┘      └──────────────────┘            ▼             │
//! │         │ frames                              ┌────────────────┐     │
//! │         ▼                                     │  PresenceSync  │     │
//! │  ┌──────────────┐                             │  (state/rooms/ │     │
//! │  │ PacketCodec  │                             │   speaking)    │     │
//! │  │  encode      │                             └───────┬────────┘     │
//! │  └──────┬───────┘                                     │              │
//! └─────────┼─────────────────────────────────────────────┼──────────────┘
//!           │ audio track (binary)          state tracks (json)
//!           ▼                                             ▼
//!   ╔══════════════════════ pub/sub relay ══════════════════════════╗
//!   ║    announce ── subscribe ── publish, per broadcast path       ║
//!   ╚═══════════════════════════════════════════════════════════════╝
//!           │ announced {path, active}                  │ records
//!           ▼                                           ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            REMOTE PEERS                              │
//! │  PresenceSync: subscribe ─ bind identity ─ dedupe sources ─ prune    │
//! │  PacketCodec.decode ──▶ JitterBufferPlayback (one lane per source)   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod presence;
pub mod transport;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for audio processing
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default channel count (mono voice)
    pub const DEFAULT_CHANNELS: u8 = 1;

    /// Default frame duration in milliseconds
    pub const DEFAULT_FRAME_MS: f32 = 20.0;

    /// Wire format version for raw planar f32 payloads
    pub const VERSION_PCM: u8 = 1;

    /// Wire format version for the extended header (declared payload length)
    pub const VERSION_EXT: u8 = 2;

    /// Forward buffering margin playback keeps ahead of the audio clock
    pub const DEFAULT_LEAD_SECONDS: f64 = 0.12;

    /// Heartbeat interval for local state re-broadcast
    pub const DEFAULT_HEARTBEAT_MS: u64 = 1_000;

    /// Broadcast interval for the speaking level track
    pub const DEFAULT_SPEAKING_INTERVAL_MS: u64 = 150;

    /// Staleness sweep tick
    pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;

    /// A subscription with no record for this long is pruned
    pub const DEFAULT_STALE_TIMEOUT_MS: u64 = 5_000;

    /// Position change below this never triggers an immediate re-broadcast
    pub const DEFAULT_POSITION_EPSILON: f32 = 0.25;
}
