//! In-process relay
//!
//! A complete implementation of the transport seam over tokio channels.
//! Peers in the same process connect to one `MemoryRelay`; tests use it to
//! drive the presence protocol end to end, including injected resets.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::error::TransportError;
use crate::transport::{
    AnnounceEvent, AnnounceStream, BroadcastConsumer, BroadcastPublisher, Relay, TrackReader,
    TrackWriter,
};

const TRACK_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
enum TrackMessage {
    Frame(Bytes),
    Reset,
}

struct TrackChannel {
    tx: broadcast::Sender<TrackMessage>,
}

struct BroadcastShared {
    tracks: Mutex<HashMap<String, TrackChannel>>,
    requested_tx: mpsc::UnboundedSender<String>,
}

impl BroadcastShared {
    fn track(&self, name: &str) -> broadcast::Sender<TrackMessage> {
        let mut tracks = self.tracks.lock();
        tracks
            .entry(name.to_string())
            .or_insert_with(|| TrackChannel {
                tx: broadcast::channel(TRACK_CHANNEL_CAPACITY).0,
            })
            .tx
            .clone()
    }

    fn reset_all(&self) {
        for channel in self.tracks.lock().values() {
            let _ = channel.tx.send(TrackMessage::Reset);
        }
    }
}

#[derive(Default)]
struct RelayState {
    broadcasts: HashMap<String, Arc<BroadcastShared>>,
    watchers: Vec<(String, mpsc::UnboundedSender<AnnounceEvent>)>,
}

impl RelayState {
    fn announce(&mut self, path: &str, active: bool) {
        self.watchers.retain(|(prefix, tx)| {
            if !path.starts_with(prefix.as_str()) {
                return true;
            }
            tx.send(AnnounceEvent {
                path: path.to_string(),
                active,
            })
            .is_ok()
        });
    }
}

/// Shared in-process relay
#[derive(Clone, Default)]
pub struct MemoryRelay {
    state: Arc<Mutex<RelayState>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a transport-level reset of every track under `path`.
    /// The broadcast stays announced, so subscribers retry.
    pub fn inject_reset(&self, path: &str) {
        let shared = self.state.lock().broadcasts.get(path).cloned();
        if let Some(shared) = shared {
            shared.reset_all();
        }
    }

    /// Paths currently announced active.
    pub fn active_paths(&self) -> Vec<String> {
        self.state.lock().broadcasts.keys().cloned().collect()
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn announced(
        &self,
        prefix: &str,
    ) -> Result<Box<dyn AnnounceStream>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        // Replay currently-active paths before live events
        for path in state.broadcasts.keys() {
            if path.starts_with(prefix) {
                let _ = tx.send(AnnounceEvent {
                    path: path.clone(),
                    active: true,
                });
            }
        }
        state.watchers.push((prefix.to_string(), tx));
        Ok(Box::new(MemoryAnnounceStream { rx }))
    }

    async fn publish(&self, path: &str) -> Result<Box<dyn BroadcastPublisher>, TransportError> {
        let (requested_tx, requested_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(BroadcastShared {
            tracks: Mutex::new(HashMap::new()),
            requested_tx,
        });

        let mut state = self.state.lock();
        if state.broadcasts.contains_key(path) {
            return Err(TransportError::SendFailed(format!(
                "path already published: {}",
                path
            )));
        }
        state.broadcasts.insert(path.to_string(), shared.clone());
        state.announce(path, true);

        Ok(Box::new(MemoryPublisher {
            relay: self.state.clone(),
            path: path.to_string(),
            shared,
            requested_rx,
        }))
    }

    async fn consume(&self, path: &str) -> Result<Box<dyn BroadcastConsumer>, TransportError> {
        let shared = self
            .state
            .lock()
            .broadcasts
            .get(path)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(path.to_string()))?;
        Ok(Box::new(MemoryConsumer { shared }))
    }
}

struct MemoryAnnounceStream {
    rx: mpsc::UnboundedReceiver<AnnounceEvent>,
}

#[async_trait]
impl AnnounceStream for MemoryAnnounceStream {
    async fn next(&mut self) -> Option<AnnounceEvent> {
        self.rx.recv().await
    }
}

struct MemoryPublisher {
    relay: Arc<Mutex<RelayState>>,
    path: String,
    shared: Arc<BroadcastShared>,
    requested_rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl BroadcastPublisher for MemoryPublisher {
    async fn requested(&mut self) -> Option<String> {
        self.requested_rx.recv().await
    }

    fn open_track(&self, name: &str) -> Result<Box<dyn TrackWriter>, TransportError> {
        Ok(Box::new(MemoryTrackWriter {
            tx: self.shared.track(name),
        }))
    }
}

impl Drop for MemoryPublisher {
    fn drop(&mut self) {
        let mut state = self.relay.lock();
        // Dropping the broadcast drops every track sender, which closes
        // subscriber reads cleanly.
        state.broadcasts.remove(&self.path);
        state.announce(&self.path, false);
    }
}

struct MemoryConsumer {
    shared: Arc<BroadcastShared>,
}

#[async_trait]
impl BroadcastConsumer for MemoryConsumer {
    async fn subscribe(
        &self,
        track: &str,
        _priority: u8,
    ) -> Result<Box<dyn TrackReader>, TransportError> {
        let tx = self.shared.track(track);
        let rx = tx.subscribe();
        let _ = self.shared.requested_tx.send(track.to_string());
        Ok(Box::new(MemoryTrackReader { rx }))
    }
}

struct MemoryTrackReader {
    rx: broadcast::Receiver<TrackMessage>,
}

#[async_trait]
impl TrackReader for MemoryTrackReader {
    async fn read_frame(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.rx.recv().await {
                Ok(TrackMessage::Frame(bytes)) => return Ok(Some(bytes)),
                Ok(TrackMessage::Reset) => return Err(TransportError::Reset),
                // A slow reader skips frames rather than erroring out
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Track reader lagged, skipped {} frames", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}

struct MemoryTrackWriter {
    tx: broadcast::Sender<TrackMessage>,
}

impl TrackWriter for MemoryTrackWriter {
    fn write_frame(&self, data: Bytes) -> Result<(), TransportError> {
        // No receivers is not an error; nobody is listening yet
        let _ = self.tx.send(TrackMessage::Frame(data));
        Ok(())
    }
}
