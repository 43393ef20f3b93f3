//! Jitter-buffered playback scheduling
//!
//! One independent lane per remote source key. Each enqueued frame is
//! scheduled against an audio clock with a fixed lead time absorbing
//! delivery jitter; an enqueue that finds its lane already starved counts
//! an underrun and re-anchors, and a lane whose backlog grows past four
//! lead times is clamped back down rather than letting latency drift.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::codec::DecodedFrame;

/// Monotonic playback clock, in seconds
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall clock anchored at construction
#[derive(Clone)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn from_epoch(epoch: Instant) -> Self {
        Self { epoch }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SystemClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock for deterministic tests
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, seconds: f64) {
        *self.now.lock() = seconds;
    }

    pub fn advance(&self, seconds: f64) {
        *self.now.lock() += seconds;
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}

/// Destination for scheduled audio
pub trait PlaybackSink: Send + Sync {
    /// Schedule planar samples to start playing at `start` (clock seconds).
    fn submit(&self, source: &str, channels: &[Vec<f32>], sample_rate: u32, start: f64);

    /// A lane was closed; discard anything scheduled for it.
    fn close(&self, _source: &str) {}

    /// Master gain, 0.0..=1.0.
    fn set_gain(&self, _gain: f32) {}
}

/// Sink that discards audio; for tests and headless peers
pub struct NullSink;

impl PlaybackSink for NullSink {
    fn submit(&self, _source: &str, _channels: &[Vec<f32>], _sample_rate: u32, _start: f64) {}
}

/// Per-lane statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct LaneStats {
    /// Cumulative frames enqueued on this lane
    pub frames_decoded: u64,
    /// Seconds of scheduled-but-not-yet-played audio
    pub buffered_ahead: f64,
    /// Times an enqueue found the lane already starved
    pub underruns: u64,
}

struct Lane {
    next_scheduled_end: f64,
    frames_decoded: u64,
    underruns: u64,
}

/// Jitter-buffered playback over any number of source lanes
pub struct JitterPlayback {
    clock: Arc<dyn AudioClock>,
    sink: Arc<dyn PlaybackSink>,
    lanes: DashMap<String, Lane>,
    lead_seconds: f64,
    muted: AtomicBool,
}

impl JitterPlayback {
    pub fn new(clock: Arc<dyn AudioClock>, sink: Arc<dyn PlaybackSink>, lead_seconds: f64) -> Self {
        Self {
            clock,
            sink,
            lanes: DashMap::new(),
            lead_seconds,
            muted: AtomicBool::new(false),
        }
    }

    /// Schedule one decoded frame on `source`'s lane, creating it on first
    /// use. Returns the scheduled start time.
    pub fn enqueue(&self, source: &str, frame: &DecodedFrame) -> f64 {
        let duration = frame.duration_seconds();
        let now = self.clock.now();
        let lead = self.lead_seconds;

        let mut lane = self.lanes.entry(source.to_string()).or_insert_with(|| Lane {
            // A fresh lane anchors at now + lead without counting an underrun
            next_scheduled_end: now + lead,
            frames_decoded: 0,
            underruns: 0,
        });

        let mut anchor = lane.next_scheduled_end.max(now + lead);
        if lane.frames_decoded > 0 && lane.next_scheduled_end < now {
            // Buffer starved since the last enqueue
            lane.underruns += 1;
            anchor = now + lead;
            tracing::debug!(source, underruns = lane.underruns, "playback underrun");
        }

        // Bound latency growth after a stall-then-burst
        if anchor + duration - now > lead * 4.0 {
            anchor = now + lead;
        }

        lane.next_scheduled_end = anchor + duration;
        lane.frames_decoded += 1;
        drop(lane);

        self.sink
            .submit(source, &frame.channels, frame.sample_rate, anchor);
        anchor
    }

    /// Disconnect and discard a lane immediately.
    pub fn close(&self, source: &str) {
        self.lanes.remove(source);
        self.sink.close(source);
    }

    /// Master mute: silences every lane without destroying any of them.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
        self.sink.set_gain(if muted { 0.0 } else { 1.0 });
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn stats(&self, source: &str) -> Option<LaneStats> {
        let lane = self.lanes.get(source)?;
        let now = self.clock.now();
        Some(LaneStats {
            frames_decoded: lane.frames_decoded,
            buffered_ahead: (lane.next_scheduled_end - now).max(0.0),
            underruns: lane.underruns,
        })
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn sources(&self) -> Vec<String> {
        self.lanes.iter().map(|e| e.key().clone()).collect()
    }
}
