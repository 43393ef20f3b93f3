//! Pub/sub relay boundary
//!
//! The relay itself is an external collaborator; this module only fixes
//! the seam the rest of the crate talks through. A broadcast lives at a
//! path, announces its liveness to subscribers watching a prefix, and
//! carries named tracks of binary frames or JSON records. Track
//! termination is surfaced through the read contract: `Ok(None)` for a
//! clean close, `Err(TransportError::Reset)` for a mid-stream reset.

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

pub use memory::MemoryRelay;

/// Liveness change for one broadcast path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceEvent {
    pub path: String,
    pub active: bool,
}

/// A connection to the relay
#[async_trait]
pub trait Relay: Send + Sync + 'static {
    /// Watch announce events for every path under `prefix`. Paths already
    /// active are replayed as `active=true` before live events.
    async fn announced(
        &self,
        prefix: &str,
    ) -> Result<Box<dyn AnnounceStream>, TransportError>;

    /// Publish a broadcast at `path`, announcing it active.
    async fn publish(&self, path: &str) -> Result<Box<dyn BroadcastPublisher>, TransportError>;

    /// Attach to the broadcast announced at `path`.
    async fn consume(&self, path: &str) -> Result<Box<dyn BroadcastConsumer>, TransportError>;
}

/// Ordered sequence of announce events
#[async_trait]
pub trait AnnounceStream: Send {
    /// `None` means the announce subscription itself ended.
    async fn next(&mut self) -> Option<AnnounceEvent>;
}

/// Publisher side of one broadcast
#[async_trait]
pub trait BroadcastPublisher: Send + Sync {
    /// Names of tracks some subscriber asked for, in request order.
    async fn requested(&mut self) -> Option<String>;

    /// Open a named track for writing.
    fn open_track(&self, name: &str) -> Result<Box<dyn TrackWriter>, TransportError>;
}

/// Subscriber side of one broadcast
#[async_trait]
pub trait BroadcastConsumer: Send + Sync {
    /// Subscribe to a named track. `priority` orders delivery when the
    /// relay must shed load; higher wins.
    async fn subscribe(
        &self,
        track: &str,
        priority: u8,
    ) -> Result<Box<dyn TrackReader>, TransportError>;
}

/// Reader for one track
#[async_trait]
pub trait TrackReader: Send {
    /// Next binary frame; `Ok(None)` on clean close.
    async fn read_frame(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Next JSON record. Frames that are not valid JSON are dropped and
    /// the read continues; shape validation is the caller's concern.
    async fn read_json(&mut self) -> Result<Option<serde_json::Value>, TransportError> {
        loop {
            match self.read_frame().await? {
                None => return Ok(None),
                Some(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(value) => return Ok(Some(value)),
                    Err(e) => {
                        tracing::debug!("Dropping non-JSON record: {}", e);
                    }
                },
            }
        }
    }
}

/// Writer for one track
pub trait TrackWriter: Send + Sync {
    fn write_frame(&self, data: Bytes) -> Result<(), TransportError>;

    fn write_json(&self, value: &serde_json::Value) -> Result<(), TransportError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.write_frame(Bytes::from(bytes))
    }
}
